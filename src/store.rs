//! On-disk certificate store.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use time::OffsetDateTime;

use crate::{
    cert::{self, CertificateBundle},
    error::{Error, Result},
};

pub(crate) const CERT_FILE: &str = "cert.pem";
pub(crate) const KEY_FILE: &str = "key.pem";

/// The current certificate/key pair under the configured SSL directory.
///
/// At most one pair is ever considered current; [`CertStore::persist`]
/// replaces both files wholesale.
#[derive(Debug, Clone)]
pub struct CertStore {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertStore {
    pub fn new(ssl_dir: impl AsRef<Path>) -> Self {
        let ssl_dir = ssl_dir.as_ref();
        CertStore {
            cert_path: ssl_dir.join(CERT_FILE),
            key_path: ssl_dir.join(KEY_FILE),
        }
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// True iff both the certificate file and the key file are present.
    pub fn exists(&self) -> bool {
        self.cert_path.is_file() && self.key_path.is_file()
    }

    /// Whether the stored certificate is still usable.
    ///
    /// Requires both files to exist, the chain to parse, and the leaf to
    /// outlive `now + threshold` (renewal triggers before the hard deadline,
    /// not at it). Read or parse failures count as "not valid" and are never
    /// propagated; the caller's fallback is always to request a fresh
    /// certificate.
    pub fn is_valid(&self, threshold: Duration) -> bool {
        if !self.exists() {
            log::info!("certificate or key file missing");
            return false;
        }

        let pem = match fs::read_to_string(&self.cert_path) {
            Ok(pem) => pem,
            Err(err) => {
                log::warn!("failed to read {}: {err}", self.cert_path.display());
                return false;
            }
        };

        let not_after = match cert::chain_not_after(&pem) {
            Ok(not_after) => not_after,
            Err(err) => {
                log::warn!("stored certificate unreadable: {err}");
                return false;
            }
        };

        let now = OffsetDateTime::now_utc();
        if now >= not_after {
            log::info!("certificate expired at {not_after}");
            return false;
        }
        if not_after <= now + threshold {
            log::info!("certificate expires at {not_after}, inside the renewal threshold");
            return false;
        }

        true
    }

    /// Writes the bundle, overwriting the previous generation.
    ///
    /// The certificate is world-readable so servers can pick it up; the key
    /// is owner-only.
    pub fn persist(&self, bundle: &CertificateBundle) -> Result<()> {
        write_file(&self.cert_path, bundle.certificate().as_bytes(), 0o644)?;
        write_file(&self.key_path, bundle.private_key().as_bytes(), 0o600)?;

        log::info!(
            "certificate saved: cert={} key={}",
            self.cert_path.display(),
            self.key_path.display()
        );

        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    fs::write(path, bytes).map_err(Error::filesystem(path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(Error::filesystem(path))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
mod tests {
    use time::Duration as TimeDuration;
    use zeroize::Zeroizing;

    use super::*;
    use crate::test::generate_cert_pair;

    const THRESHOLD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    fn store_with_cert(not_after: OffsetDateTime) -> (tempfile::TempDir, CertStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());

        let (cert_pem, key_pem) = generate_cert_pair(not_after);
        let bundle = CertificateBundle::new(Zeroizing::new(key_pem), cert_pem);
        store.persist(&bundle).unwrap();

        (dir, store)
    }

    #[test]
    fn missing_files_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());
        assert!(!store.exists());
        assert!(!store.is_valid(THRESHOLD));
    }

    #[test]
    fn expired_certificate_is_invalid() {
        let (_dir, store) = store_with_cert(OffsetDateTime::now_utc() - TimeDuration::days(1));
        assert!(!store.is_valid(THRESHOLD));
        // even a zero threshold does not resurrect it
        assert!(!store.is_valid(Duration::ZERO));
    }

    #[test]
    fn far_future_certificate_is_valid() {
        let (_dir, store) = store_with_cert(OffsetDateTime::now_utc() + TimeDuration::days(80));
        assert!(store.is_valid(THRESHOLD));
    }

    #[test]
    fn expiry_inside_threshold_is_invalid() {
        let (_dir, store) = store_with_cert(OffsetDateTime::now_utc() + TimeDuration::days(10));
        assert!(!store.is_valid(THRESHOLD));
    }

    #[test]
    fn unparsable_certificate_is_invalid_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());
        fs::write(store.cert_path(), "not a pem").unwrap();
        fs::write(store.key_path(), "whatever").unwrap();

        assert!(store.exists());
        assert!(!store.is_valid(THRESHOLD));
    }

    #[test]
    fn persist_is_idempotent_and_sets_permissions() {
        let (_dir, store) = store_with_cert(OffsetDateTime::now_utc() + TimeDuration::days(80));
        assert!(store.exists());

        let cert_pem = fs::read_to_string(store.cert_path()).unwrap();
        let key_pem = fs::read_to_string(store.key_path()).unwrap();

        // persisting the same bundle again leaves the store valid and unchanged
        let bundle =
            CertificateBundle::new(Zeroizing::new(key_pem.clone()), cert_pem.clone());
        store.persist(&bundle).unwrap();
        assert!(store.is_valid(THRESHOLD));
        assert_eq!(fs::read_to_string(store.cert_path()).unwrap(), cert_pem);
        assert_eq!(fs::read_to_string(store.key_path()).unwrap(), key_pem);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let cert_mode = fs::metadata(store.cert_path()).unwrap().permissions().mode();
            let key_mode = fs::metadata(store.key_path()).unwrap().permissions().mode();
            assert_eq!(cert_mode & 0o777, 0o644);
            assert_eq!(key_mode & 0o777, 0o600);
        }
    }
}
