//! JSON API payloads.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{Deserialize, Serialize};

mod certificate;
mod download;
mod list;

pub use self::{
    certificate::{Certificate, Validation, ValidationMethod},
    download::DownloadBundle,
    list::CertificateList,
};

/// The authority's error object.
///
/// The API wraps failures in an [`ErrorEnvelope`], frequently with a `200`
/// HTTP status, so callers must inspect the body rather than the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Problem {
    /// Returns true if the certificate is not far enough along to download.
    pub fn is_not_ready(&self) -> bool {
        self._type == "certificate_not_ready"
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.info) {
            (Some(code), Some(info)) => write!(f, "{} (code {code}): {info}", self._type),
            (Some(code), None) => write!(f, "{} (code {code})", self._type),
            (None, Some(info)) => write!(f, "{}: {info}", self._type),
            (None, None) => write!(f, "{}", self._type),
        }
    }
}

impl std::error::Error for Problem {}

/// Failure envelope the authority wraps around [`Problem`].
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub success: bool,
    pub error: Problem,
}
