use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A certificate request as tracked by the authority.
///
/// Created once when the signing request is submitted and mutated only by the
/// authority afterwards; the client merely re-reads its `status` until it is
/// terminal.
///
/// # Example JSON
///
/// ```json
/// {
///   "id": "b4c19e94d35e8a7f03b1b3a2",
///   "common_name": "203.0.113.7",
///   "status": "pending_validation",
///   "created": "2024-01-01 00:00:00",
///   "expires": "2024-04-01 00:00:00",
///   "validation": {
///     "other_methods": {
///       "203.0.113.7": {
///         "file_validation_url_http": "http://203.0.113.7/.well-known/pki-validation/A1B2C3.txt",
///         "file_validation_content": ["token", "comodoca.com", "hash"]
///       }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,

    /// The subject identifier; for this crate always an IP address.
    pub common_name: String,

    /// Life cycle state as reported by the authority.
    ///
    /// Known values are `draft`, `pending_validation`, `issued`, `cancelled`
    /// and `expired`. Kept as the raw string so unrecognized values can be
    /// logged verbatim and treated as transient.
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl Certificate {
    /// The request reached its terminal success state.
    pub fn is_issued(&self) -> bool {
        self.status == "issued"
    }

    /// The request is still working its way towards issuance.
    pub fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "draft" | "pending_validation")
    }

    /// The authority gave up on the request.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.status.as_str(), "cancelled" | "expired")
    }
}

/// Validation data attached to a certificate request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Proof material per validation method. For IP certificates the method
    /// name is the IP address itself rather than a scheme name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_methods: Option<HashMap<String, ValidationMethod>>,
}

/// One method's worth of HTTP file-check material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMethod {
    /// URL the authority will fetch; the last path segment names the file to
    /// place under the validation web root.
    #[serde(default)]
    pub file_validation_url_http: String,

    /// Lines of the proof file, in order.
    #[serde(default)]
    pub file_validation_content: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_predicates() {
        let mut cert = Certificate {
            status: "draft".to_owned(),
            ..Certificate::default()
        };
        assert!(cert.is_pending());

        cert.status = "pending_validation".to_owned();
        assert!(cert.is_pending());
        assert!(!cert.is_issued());

        cert.status = "issued".to_owned();
        assert!(cert.is_issued());
        assert!(!cert.is_terminal_failure());

        cert.status = "cancelled".to_owned();
        assert!(cert.is_terminal_failure());

        // unknown statuses are none of the above; callers treat them as transient
        cert.status = "revoked".to_owned();
        assert!(!cert.is_issued() && !cert.is_pending() && !cert.is_terminal_failure());
    }

    #[test]
    fn deserializes_validation_payload() {
        let json = r#"{
            "id": "abc123",
            "common_name": "203.0.113.7",
            "status": "draft",
            "validation": {
                "other_methods": {
                    "203.0.113.7": {
                        "file_validation_url_http": "http://203.0.113.7/.well-known/pki-validation/XYZ.txt",
                        "file_validation_content": ["abc", "def"]
                    }
                }
            }
        }"#;

        let cert = serde_json::from_str::<Certificate>(json).unwrap();
        let methods = cert.validation.unwrap().other_methods.unwrap();
        let method = &methods["203.0.113.7"];
        assert_eq!(method.file_validation_content, ["abc", "def"]);
        assert!(method.file_validation_url_http.ends_with("XYZ.txt"));
    }
}
