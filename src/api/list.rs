use serde::{Deserialize, Serialize};

use crate::api;

/// One page of the authority's certificate request listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateList {
    #[serde(default)]
    pub total_count: u64,

    #[serde(default)]
    pub result_count: u64,

    #[serde(default)]
    pub results: Vec<api::Certificate>,
}
