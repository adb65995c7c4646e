//! Certificate authority client.
//!
//! A certificate request goes through a fixed life cycle that this client
//! drives end to end:
//!
//! 1. Find a reusable request for the subject IP, or create one from a fresh
//!    key and CSR.
//! 2. Place validation files under the web root and trigger the authority's
//!    HTTP file check.
//! 3. Poll request status until it is issued (or terminally failed).
//! 4. Download the bundle and pair it with the locally held private key.
//!
//! The authority only ever sees the CSR; private keys are generated here and
//! cached in a [`KeyStore`] until they are persisted next to the certificate.

use std::{collections::HashMap, fs, path::Path, time::Duration};

use parking_lot::Mutex;
use pkcs8::DecodePrivateKey as _;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::{
    api,
    cert::{self, CertificateBundle},
    error::{Error, Result},
    poll::{self, PollOutcome},
    req, validation,
};

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.zerossl.com";

/// Validity requested for every new certificate.
const REQUESTED_VALIDITY_DAYS: u32 = 90;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a full issuance attempt.
#[derive(Debug)]
pub enum Issuance {
    Issued(CertificateBundle),
    Cancelled,
}

/// In-memory fallback cache of private keys, keyed by subject IP.
///
/// The authority never receives private keys, so this cache (or the key file
/// on disk) is the only place an issued certificate's key can come from.
/// At most one key is associated with one outstanding request per IP;
/// inserting again abandons the previous request's key.
#[derive(Debug, Default)]
struct KeyStore {
    keys: Mutex<HashMap<String, p256::ecdsa::SigningKey>>,
}

impl KeyStore {
    fn insert(&self, ip: &str, key: p256::ecdsa::SigningKey) {
        self.keys.lock().insert(ip.to_owned(), key);
    }

    fn get(&self, ip: &str) -> Option<p256::ecdsa::SigningKey> {
        self.keys.lock().get(ip).cloned()
    }
}

/// Client for a ZeroSSL-style certificate authority API.
#[derive(Debug)]
pub struct Authority {
    http: reqwest::Client,
    api_url: String,
    access_key: String,
    keys: KeyStore,
    poll_interval: Duration,
}

impl Authority {
    /// Creates a client authenticating with `access_key`.
    pub fn new(access_key: impl Into<String>) -> Result<Self> {
        let access_key = access_key.into();
        if access_key.is_empty() {
            return Err(Error::Config("authority API key is required".to_owned()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Authority {
            http,
            api_url: DEFAULT_API_URL.to_owned(),
            access_key,
            keys: KeyStore::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Points the client at a different API endpoint.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Overrides the issuance polling interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Looks for a reusable certificate request for `ip`.
    ///
    /// Requests that are issued, pending validation, or still drafts qualify;
    /// cancelled or expired ones are skipped. When several qualify, the most
    /// recently created wins — the authority's list order is not contractual.
    pub async fn find_existing(&self, ip: &str) -> Result<Option<String>> {
        let res = self
            .http
            .get(format!("{}/certificates", self.api_url))
            .query(&[("access_key", self.access_key.as_str())])
            .send()
            .await?;

        let list: api::CertificateList = req::read_json(res).await?;

        let mut best: Option<&api::Certificate> = None;
        for request in &list.results {
            if request.common_name != ip {
                continue;
            }

            if !(request.is_issued() || request.is_pending()) {
                log::info!(
                    "skipping request {} with status {}",
                    request.id,
                    request.status
                );
                continue;
            }

            // `created` is a sortable timestamp; ties fall back to the ID
            let newer = match best {
                Some(current) => (&request.created, &request.id) > (&current.created, &current.id),
                None => true,
            };
            if newer {
                best = Some(request);
            }
        }

        Ok(best.map(|request| request.id.clone()))
    }

    /// Creates a new certificate request for `ip`.
    ///
    /// Generates a fresh P-256 key, submits a CSR with the IP as its Common
    /// Name and a 90-day requested validity, and caches the key for later
    /// retrieval.
    pub async fn create_request(&self, ip: &str) -> Result<api::Certificate> {
        log::info!("creating certificate request for {ip}");

        let signing_key = cert::create_p256_key();
        let csr = cert::create_csr(&signing_key, ip)?;
        let csr_pem = cert::csr_to_pem(&csr)?;

        // cache before submitting; an issued certificate without its key is useless
        self.keys.insert(ip, signing_key);

        let validity_days = REQUESTED_VALIDITY_DAYS.to_string();
        let params = [
            ("certificate_domains", ip),
            ("certificate_csr", csr_pem.as_str()),
            ("certificate_validity_days", validity_days.as_str()),
            ("strict_domains", "1"),
        ];

        let res = self
            .http
            .post(format!("{}/certificates", self.api_url))
            .query(&[("access_key", self.access_key.as_str())])
            .form(&params)
            .send()
            .await?;

        let request: api::Certificate = req::read_json(res).await?;
        log::info!(
            "certificate request created: id={} status={}",
            request.id,
            request.status
        );

        Ok(request)
    }

    /// Fetches the current state of a request.
    pub async fn fetch_status(&self, id: &str) -> Result<api::Certificate> {
        let res = self
            .http
            .get(format!("{}/certificates/{id}", self.api_url))
            .query(&[("access_key", self.access_key.as_str())])
            .send()
            .await?;

        req::read_json(res).await
    }

    /// Asks the authority to start its HTTP file check for the request.
    pub async fn trigger_validation(&self, id: &str) -> Result<()> {
        let res = self
            .http
            .post(format!("{}/certificates/{id}/challenges", self.api_url))
            .query(&[("access_key", self.access_key.as_str())])
            .form(&[("validation_method", "HTTP_CSR_HASH")])
            .send()
            .await?;

        let _: api::Certificate = req::read_json(res).await?;
        Ok(())
    }

    /// Downloads the issued bundle, including cross-signed intermediates, as
    /// one PEM sequence (leaf first).
    pub async fn download(&self, id: &str) -> Result<String> {
        let res = self
            .http
            .get(format!("{}/certificates/{id}/download/return", self.api_url))
            .query(&[
                ("access_key", self.access_key.as_str()),
                ("include_cross_signed", "1"),
            ])
            .send()
            .await?;

        let bundle = match req::read_json::<api::DownloadBundle>(res).await {
            Ok(bundle) => bundle,
            Err(Error::Api(problem)) if problem.is_not_ready() => {
                return Err(Error::NotIssued(id.to_owned()));
            }
            Err(err) => return Err(err),
        };

        let chain = bundle.concat();
        if chain.is_empty() {
            return Err(Error::NotIssued(id.to_owned()));
        }

        log::info!(
            "certificate downloaded: id={id} has_intermediates={}",
            !bundle.ca_bundle_crt.is_empty()
        );

        Ok(chain)
    }

    /// Private key PEM for an issued request.
    ///
    /// Resolution order: the in-memory cache keyed by the request's subject
    /// IP, then the key file at `key_path`, then a freshly generated key as a
    /// last resort (best-effort persisted so the next lookup finds it).
    pub async fn retrieve_key(
        &self,
        request: &api::Certificate,
        key_path: &Path,
    ) -> Result<Zeroizing<String>> {
        let ip = &request.common_name;

        if let Some(key) = self.keys.get(ip) {
            return cert::key_to_pem(&key);
        }

        if let Ok(pem) = fs::read_to_string(key_path) {
            if ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&pem).is_ok() {
                log::info!("loaded private key from {}", key_path.display());
                return Ok(Zeroizing::new(pem));
            }
            log::warn!(
                "existing key file {} does not parse, generating a fresh key",
                key_path.display()
            );
        }

        // The authority never received the private key, so a lost cache
        // cannot be recovered from it; a fresh key abandons the old request.
        log::warn!("no private key available for {ip}, generating a new one");
        let key = cert::create_p256_key();
        self.keys.insert(ip, key.clone());
        let pem = cert::key_to_pem(&key)?;

        if let Err(err) = fs::write(key_path, pem.as_bytes()) {
            log::warn!(
                "failed to persist fallback key to {}: {err}",
                key_path.display()
            );
        }

        Ok(pem)
    }

    /// Runs the full request-validate-poll-download sequence for `ip`.
    pub async fn request_certificate(
        &self,
        ip: &str,
        validation_dir: &Path,
        key_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Issuance> {
        log::info!("requesting certificate for {ip}");

        let existing = match self.find_existing(ip).await {
            Ok(existing) => existing,
            Err(err) => {
                log::warn!("failed to check for existing requests: {err}");
                None
            }
        };

        let request = match existing {
            Some(id) => {
                log::info!("reusing existing request {id}");
                self.fetch_status(&id).await?
            }
            None => self.create_request(ip).await?,
        };

        self.prepare_validation(&request.id, validation_dir).await?;

        let issued =
            match poll::wait_for_issuance(self, &request.id, self.poll_interval, cancel).await? {
                PollOutcome::Issued(issued) => issued,
                PollOutcome::Cancelled => return Ok(Issuance::Cancelled),
            };

        let chain = self.download(&issued.id).await?;
        let key_pem = self.retrieve_key(&issued, key_path).await?;

        let bundle = CertificateBundle::new(key_pem, chain);
        match bundle.certificate_chain() {
            Ok(chain) => log::info!("certificate chain received: {} certificate(s)", chain.len()),
            Err(err) => log::warn!("downloaded bundle does not parse as PEM: {err}"),
        }

        Ok(Issuance::Issued(bundle))
    }

    /// Places validation files and asks the authority to start its check.
    ///
    /// Validation data can lag on the authority's side: after triggering, the
    /// request is fetched again and the files written once more. A failed or
    /// incomplete first pass is therefore only fatal when the refreshed
    /// request carries no validation data either.
    async fn prepare_validation(&self, id: &str, validation_dir: &Path) -> Result<()> {
        let details = self.fetch_status(id).await?;

        let first_pass = match &details.validation {
            Some(data) => validation::write_validation_files(validation_dir, data).map(Some),
            None => Ok(None),
        };
        if let Err(err) = &first_pass {
            log::warn!("writing validation files failed: {err}; refreshing request state");
        }

        // soft failure: a later status fetch may still supply usable validation data
        if let Err(err) = self.trigger_validation(id).await {
            log::warn!("triggering validation for {id} failed: {err}");
        }

        let updated = self.fetch_status(id).await?;
        match &updated.validation {
            Some(data) => {
                validation::write_validation_files(validation_dir, data)?;
            }
            None => {
                log::warn!("request {id} carries no validation data");
                first_pass?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{listed_certificate, with_authority_server, SUBJECT_IP};

    fn authority_for(url: &str) -> Authority {
        Authority::new("test-key")
            .unwrap()
            .with_api_url(url)
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn empty_access_key_is_rejected() {
        let err = Authority::new("").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn find_existing_prefers_most_recently_created() {
        let server = with_authority_server();
        server.state.set_listed(vec![
            listed_certificate("older", SUBJECT_IP, "issued", "2024-01-01 00:00:00"),
            listed_certificate("failed", SUBJECT_IP, "cancelled", "2024-03-01 00:00:00"),
            listed_certificate("newer", SUBJECT_IP, "pending_validation", "2024-02-01 00:00:00"),
            listed_certificate("other", "198.51.100.4", "issued", "2024-04-01 00:00:00"),
        ]);

        let authority = authority_for(&server.api_url);
        let found = authority.find_existing(SUBJECT_IP).await.unwrap();
        assert_eq!(found.as_deref(), Some("newer"));
    }

    #[tokio::test]
    async fn find_existing_returns_none_without_matches() {
        let server = with_authority_server();
        let authority = authority_for(&server.api_url);
        assert_eq!(authority.find_existing(SUBJECT_IP).await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_request_submits_csr_and_caches_key() {
        let server = with_authority_server();
        let authority = authority_for(&server.api_url);

        let request = authority.create_request(SUBJECT_IP).await.unwrap();
        assert_eq!(request.id, "abc123");
        assert_eq!(request.status, "draft");

        assert_eq!(server.state.created_requests(), 1);
        assert!(authority.keys.get(SUBJECT_IP).is_some());
    }

    #[tokio::test]
    async fn download_concatenates_leaf_and_chain() {
        let server = with_authority_server();
        let authority = authority_for(&server.api_url);

        let chain = authority.download("abc123").await.unwrap();
        assert_eq!(chain, "LEAF CERT\nINTERMEDIATE CERT");
    }

    #[tokio::test]
    async fn download_before_issuance_is_not_issued() {
        let server = with_authority_server();
        server.state.set_download_not_ready(true);

        let authority = authority_for(&server.api_url);
        let err = authority.download("abc123").await.unwrap_err();
        assert!(matches!(err, Error::NotIssued(id) if id == "abc123"));
    }

    #[tokio::test]
    async fn retrieve_key_prefers_cache_then_disk_then_generates() {
        let server = with_authority_server();
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.pem");
        let request = listed_certificate("abc123", SUBJECT_IP, "issued", "2024-01-01 00:00:00");

        // cache hit after create_request
        let authority = authority_for(&server.api_url);
        authority.create_request(SUBJECT_IP).await.unwrap();
        let cached = authority.retrieve_key(&request, &key_path).await.unwrap();
        assert!(cached.contains("BEGIN PRIVATE KEY"));
        assert!(!key_path.exists());

        // disk hit with a cold cache
        std::fs::write(&key_path, cached.as_bytes()).unwrap();
        let authority = authority_for(&server.api_url);
        let from_disk = authority.retrieve_key(&request, &key_path).await.unwrap();
        assert_eq!(*from_disk, *cached);

        // nothing anywhere: generate and persist
        std::fs::remove_file(&key_path).unwrap();
        let authority = authority_for(&server.api_url);
        let generated = authority.retrieve_key(&request, &key_path).await.unwrap();
        assert!(generated.contains("BEGIN PRIVATE KEY"));
        assert_ne!(*generated, *cached);
        assert!(key_path.exists());
    }

    #[tokio::test]
    async fn request_certificate_end_to_end() {
        let server = with_authority_server();
        server
            .state
            .script_statuses(["draft", "draft", "pending_validation", "issued"]);

        let validation_dir = tempfile::tempdir().unwrap();
        let ssl_dir = tempfile::tempdir().unwrap();
        let key_path = ssl_dir.path().join("key.pem");

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let issuance = authority
            .request_certificate(SUBJECT_IP, validation_dir.path(), &key_path, &cancel)
            .await
            .unwrap();

        let bundle = match issuance {
            Issuance::Issued(bundle) => bundle,
            Issuance::Cancelled => panic!("unexpected cancellation"),
        };

        assert_eq!(bundle.certificate(), "LEAF CERT\nINTERMEDIATE CERT");
        assert!(bundle.private_key().contains("BEGIN PRIVATE KEY"));

        let proof = validation_dir
            .path()
            .join(".well-known")
            .join("pki-validation")
            .join("A1B2C3.txt");
        assert_eq!(std::fs::read_to_string(proof).unwrap(), "abc\ndef");

        assert_eq!(server.state.created_requests(), 1);
        assert_eq!(server.state.challenge_posts(), 1);
    }

    #[tokio::test]
    async fn trigger_validation_failure_is_soft() {
        let server = with_authority_server();
        server.state.set_challenge_fail(true);
        server.state.script_statuses(["draft", "draft", "issued"]);

        let validation_dir = tempfile::tempdir().unwrap();
        let ssl_dir = tempfile::tempdir().unwrap();
        let key_path = ssl_dir.path().join("key.pem");

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let issuance = authority
            .request_certificate(SUBJECT_IP, validation_dir.path(), &key_path, &cancel)
            .await
            .unwrap();
        assert!(matches!(issuance, Issuance::Issued(_)));
    }

    #[tokio::test]
    async fn cancellation_mid_flow_is_reported() {
        let server = with_authority_server();
        server.state.script_statuses(["draft", "draft", "pending_validation"]);

        let validation_dir = tempfile::tempdir().unwrap();
        let ssl_dir = tempfile::tempdir().unwrap();
        let key_path = ssl_dir.path().join("key.pem");

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let issuance = authority
            .request_certificate(SUBJECT_IP, validation_dir.path(), &key_path, &cancel)
            .await
            .unwrap();
        assert!(matches!(issuance, Issuance::Cancelled));
    }
}
