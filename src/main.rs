use eyre::WrapErr as _;
use ipssl::{Authority, Config, Renewer};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().wrap_err("loading configuration")?;
    let authority =
        Authority::new(config.api_key.clone()).wrap_err("constructing authority client")?;

    log::info!("starting renewal agent for {}", config.client_ip);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            log::info!("received shutdown signal, stopping");
            cancel.cancel();
        });
    }

    let renewer = Renewer::new(config, authority).wrap_err("constructing renewal agent")?;
    renewer.run(&cancel).await.wrap_err("renewal agent failed")?;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            log::warn!("failed to install SIGTERM handler: {err}");
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
