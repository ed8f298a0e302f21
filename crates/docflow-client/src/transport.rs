//! Single-exchange transport adapter
//!
//! Builds nothing and retries nothing: sends one prepared reqwest request
//! and buffers its response. Timeout handling lives here (reqwest races the
//! exchange against the per-request deadline); retry and refresh decisions
//! belong to the layers above.

use bytes::Bytes;

use crate::error::{Error, Result};

/// One buffered HTTP response, ready for classification.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Map a reqwest send error to the transport taxonomy.
pub(crate) fn map_send_error(url: &str, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            url: url.to_owned(),
        }
    } else {
        Error::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

/// Send a fully built request and buffer the response.
pub(crate) async fn send_buffered(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<RawResponse> {
    let response = request.send().await.map_err(|e| map_send_error(url, e))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await.map_err(|e| Error::Network {
        url: url.to_owned(),
        message: format!("reading response body: {e}"),
    })?;

    Ok(RawResponse {
        status,
        content_type,
        body,
    })
}
