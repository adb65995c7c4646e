use serde::{Deserialize, Serialize};

/// Inline download payload: leaf certificate and intermediate chain as
/// separate PEM strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadBundle {
    #[serde(rename = "certificate.crt", default)]
    pub certificate_crt: String,

    #[serde(rename = "ca_bundle.crt", default)]
    pub ca_bundle_crt: String,
}

impl DownloadBundle {
    /// Leaf + chain as one PEM sequence, newline separated, omitting either
    /// part when absent.
    pub fn concat(&self) -> String {
        match (
            self.certificate_crt.is_empty(),
            self.ca_bundle_crt.is_empty(),
        ) {
            (false, false) => format!("{}\n{}", self.certificate_crt, self.ca_bundle_crt),
            (false, true) => self.certificate_crt.clone(),
            (true, false) => self.ca_bundle_crt.clone(),
            (true, true) => String::new(),
        }
    }
}
