//! Renewal scheduling.
//!
//! The top-level loop: an immediate validity check at startup, then a fixed
//! interval of re-checks for the lifetime of the process. A failed attempt is
//! logged and retried on the next tick — the interval is the only retry
//! cadence. The loop exits only on cancellation.

use std::fs;

use tokio_util::sync::CancellationToken;

use crate::{
    client::{Authority, Issuance},
    config::Config,
    docker::Reloader,
    error::{Error, Result},
    store::CertStore,
};

/// What a single renewal pass did.
#[derive(Debug)]
pub enum RenewOutcome {
    /// The stored certificate still satisfies the validity threshold.
    StillValid,

    /// A new certificate was obtained and persisted.
    Renewed { reload: ReloadOutcome },

    /// Shutdown was requested mid-flight; nothing was persisted.
    Cancelled,
}

/// Best-effort result of signalling the reverse proxy, carried as data so
/// callers and tests can see failures without scraping logs. A failed reload
/// never invalidates the already-persisted certificate.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// No container name configured.
    Disabled,

    Reloaded,

    Failed(Error),
}

/// Drives the whole certificate life cycle for one subject IP.
pub struct Renewer {
    config: Config,
    authority: Authority,
    store: CertStore,
    reloader: Option<Reloader>,
}

impl Renewer {
    /// Builds the scheduler and, when a container name is configured, the
    /// runtime connection used for reloads. Construction failures here are
    /// fatal to the process, unlike renewal attempt failures.
    pub fn new(config: Config, authority: Authority) -> Result<Self> {
        let store = CertStore::new(&config.ssl_dir);

        let reloader = match &config.container_name {
            Some(name) => {
                log::info!("container reload enabled for {name}");
                Some(Reloader::new()?)
            }
            None => {
                log::info!("container reload disabled");
                None
            }
        };

        Ok(Renewer {
            config,
            authority,
            store,
            reloader,
        })
    }

    pub fn store(&self) -> &CertStore {
        &self.store
    }

    /// Runs until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.ensure_directories()?;

        // startup check: renew immediately when the store is invalid
        match self.renew_if_needed(cancel).await {
            Ok(RenewOutcome::Cancelled) => return Ok(()),
            Ok(outcome) => log_outcome(&outcome),
            Err(err) => log::error!("renewal attempt failed: {err}; retrying on the next tick"),
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("shutdown requested, stopping renewal loop");
                    return Ok(());
                }

                _ = tokio::time::sleep(self.config.renewal_interval) => {}
            }

            match self.renew_if_needed(cancel).await {
                Ok(RenewOutcome::Cancelled) => return Ok(()),
                Ok(outcome) => log_outcome(&outcome),
                Err(err) => log::error!("renewal attempt failed: {err}; retrying on the next tick"),
            }
        }
    }

    /// One pass: validity check, then the full request flow if needed.
    pub async fn renew_if_needed(&self, cancel: &CancellationToken) -> Result<RenewOutcome> {
        if self.store.is_valid(self.config.cert_validity_threshold) {
            log::info!("certificate is still valid, skipping renewal");
            return Ok(RenewOutcome::StillValid);
        }

        log::info!(
            "certificate missing, expired, or expiring soon; requesting a new one for {}",
            self.config.client_ip
        );

        let bundle = match self
            .authority
            .request_certificate(
                &self.config.client_ip,
                &self.config.validation_dir,
                self.store.key_path(),
                cancel,
            )
            .await?
        {
            Issuance::Issued(bundle) => bundle,
            Issuance::Cancelled => return Ok(RenewOutcome::Cancelled),
        };

        if let Ok(days) = bundle.valid_days_left() {
            log::info!("new certificate valid for {days} whole days");
        }

        self.store.persist(&bundle)?;

        let reload = self.reload_proxy().await;
        Ok(RenewOutcome::Renewed { reload })
    }

    async fn reload_proxy(&self) -> ReloadOutcome {
        let (Some(reloader), Some(name)) = (&self.reloader, &self.config.container_name) else {
            return ReloadOutcome::Disabled;
        };

        match reloader.reload(name).await {
            Ok(()) => ReloadOutcome::Reloaded,
            Err(err) => ReloadOutcome::Failed(err),
        }
    }

    fn ensure_directories(&self) -> Result<()> {
        let well_known = self
            .config
            .validation_dir
            .join(".well-known")
            .join("pki-validation");

        for dir in [self.config.ssl_dir.as_path(), well_known.as_path()] {
            fs::create_dir_all(dir).map_err(Error::filesystem(dir))?;
        }

        Ok(())
    }
}

fn log_outcome(outcome: &RenewOutcome) {
    match outcome {
        RenewOutcome::StillValid | RenewOutcome::Cancelled => {}
        RenewOutcome::Renewed { reload } => match reload {
            ReloadOutcome::Disabled => {
                log::info!("renewal complete; no container reload configured");
            }
            ReloadOutcome::Reloaded => log::info!("renewal complete; container reloaded"),
            ReloadOutcome::Failed(err) => {
                // the persisted certificate is not rolled back on reload failure
                log::error!("certificate persisted but container reload failed: {err}");
            }
        },
    }
}
