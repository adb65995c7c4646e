use std::{io, path::PathBuf};

use crate::api;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while obtaining, persisting, or renewing a
/// certificate.
///
/// Failures inside a single renewal attempt are caught at the [`Renewer`]
/// boundary and retried on the next scheduled tick; only [`Error::Config`]
/// and client construction failures are fatal to the process.
///
/// [`Renewer`]: crate::Renewer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required configuration is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// The authority API was unreachable or the connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority API answered with an error object.
    #[error("authority error: {0}")]
    Api(#[from] api::Problem),

    /// An API payload did not decode as the expected shape.
    #[error("malformed API payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The authority terminally failed the certificate request.
    #[error("certificate request {id} failed with status {status:?}")]
    IssuanceFailed { id: String, status: String },

    /// A bundle download was attempted before the certificate was issued.
    #[error("certificate {0} has not been issued yet")]
    NotIssued(String),

    /// Reading or writing certificate or validation files failed.
    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored certificate could not be parsed.
    #[error("certificate parse error: {0}")]
    CertParse(String),

    /// Encoding local key material failed.
    #[error("key material error: {0}")]
    KeyGen(String),

    /// Building or encoding the signing request failed.
    #[error("CSR error: {0}")]
    Csr(String),

    /// The reload target container does not exist.
    #[error("container {0:?} not found")]
    ContainerNotFound(String),

    /// The reload target container exists but is not running.
    #[error("container {name:?} is not running (state {state:?})")]
    ContainerNotRunning { name: String, state: String },

    /// Talking to the container runtime failed.
    #[error("container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

impl Error {
    pub(crate) fn filesystem(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Filesystem { path, source }
    }
}
