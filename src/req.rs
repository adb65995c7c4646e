use serde::de;

use crate::{
    api,
    error::{Error, Result},
};

/// Decode a response body as `T`, surfacing the authority's error envelope.
///
/// The authority reports failures as `{"success": false, "error": {...}}`,
/// often with a `200` status line, so the body shape is checked before the
/// HTTP status.
pub(crate) async fn read_json<T: de::DeserializeOwned>(res: reqwest::Response) -> Result<T> {
    let status = res.status();
    let body = req_safe_read_body(res).await;
    log::trace!("{body}");

    if let Ok(api::ErrorEnvelope {
        success: false,
        error,
    }) = serde_json::from_str(&body)
    {
        return Err(Error::Api(error));
    }

    if !status.is_success() {
        return Err(Error::Api(api::Problem {
            _type: "http_request_error".to_owned(),
            code: None,
            info: Some(format!("{status} body: {body}")),
        }));
    }

    Ok(serde_json::from_str(&body)?)
}

pub(crate) async fn req_safe_read_body(res: reqwest::Response) -> String {
    // the authority sometimes closes the connection abruptly even though the
    // body made it across; treat that as an empty body rather than an error
    res.text().await.unwrap_or_default()
}
