//! Response classification
//!
//! Maps one buffered HTTP exchange to success, business error, or auth
//! error. Classification is a pure function of the response — same input,
//! same outcome. The DocFlow API signals failure on two channels: the HTTP
//! status line, and an envelope `code` inside 2xx JSON bodies.

use bytes::Bytes;
use serde_json::Value;

use crate::error::Error;

/// Envelope codes accepted as success.
///
/// The 2xx range always passes. Some deployments use a bare `0` as the
/// all-purpose success sentinel; that convention is per-deployment, so the
/// sentinel list is configurable rather than assumed.
#[derive(Debug, Clone)]
pub struct SuccessCodes {
    sentinels: Vec<i64>,
}

impl Default for SuccessCodes {
    fn default() -> Self {
        Self { sentinels: vec![0] }
    }
}

impl SuccessCodes {
    /// Accept the given sentinels in addition to the 2xx range.
    pub fn with_sentinels(sentinels: Vec<i64>) -> Self {
        Self { sentinels }
    }

    /// Whether an envelope code counts as success.
    pub fn is_success(&self, code: i64) -> bool {
        (200..300).contains(&code) || self.sentinels.contains(&code)
    }
}

/// Outcome of classifying one buffered response.
#[derive(Debug)]
pub enum Classification {
    /// 2xx JSON: the envelope's `data` field, or the whole body when the
    /// response is JSON but not an envelope.
    Json(Value),
    /// 2xx non-JSON: body passed through untouched (binary, exports).
    Raw(Bytes),
    /// Non-2xx status, or a failing envelope code inside a 2xx.
    Business {
        status: u16,
        code: Option<i64>,
        message: String,
    },
    /// HTTP 401, kept distinct from Business so the refresh coordinator runs.
    Auth { message: String },
}

/// Fallback messages per HTTP status, used when the body carries none.
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 => "unauthorized, please sign in",
        403 => "access denied",
        404 => "resource not found",
        405 => "method not allowed",
        408 => "request timed out",
        409 => "conflicting request",
        422 => "unprocessable request",
        429 => "too many requests",
        500 => "internal server error",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        _ => "request failed",
    }
}

/// Whether a content-type header denotes a JSON body (parameters ignored).
fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.split(';')
            .next()
            .unwrap_or("")
            .trim()
            .eq_ignore_ascii_case("application/json")
    })
}

/// Extract the envelope `message` from an error body, when it is JSON.
fn body_message(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    if !is_json(content_type) {
        return None;
    }
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}

/// Classify one buffered response.
///
/// `Err` only for a malformed JSON body on an ostensibly JSON 2xx response;
/// every HTTP-level failure is a `Classification`, not an `Err`.
pub fn classify(
    url: &str,
    status: u16,
    content_type: Option<&str>,
    body: Bytes,
    success: &SuccessCodes,
) -> Result<Classification, Error> {
    if status == 401 {
        let message = body_message(content_type, &body)
            .unwrap_or_else(|| status_message(401).to_owned());
        return Ok(Classification::Auth { message });
    }

    if !(200..300).contains(&status) {
        let message = body_message(content_type, &body)
            .unwrap_or_else(|| status_message(status).to_owned());
        return Ok(Classification::Business {
            status,
            code: None,
            message,
        });
    }

    if !is_json(content_type) {
        return Ok(Classification::Raw(body));
    }

    if body.is_empty() {
        return Ok(Classification::Json(Value::Null));
    }

    let value: Value = serde_json::from_slice(&body).map_err(|e| Error::Parse {
        url: url.to_owned(),
        message: format!("malformed JSON body: {e}"),
    })?;

    match value.get("code").and_then(Value::as_i64) {
        Some(code) if success.is_success(code) => Ok(Classification::Json(
            value.get("data").cloned().unwrap_or(Value::Null),
        )),
        Some(code) => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| format!("request failed with code {code}"));
            Ok(Classification::Business {
                status,
                code: Some(code),
                message,
            })
        }
        // Not an envelope: pass the JSON body through as-is
        None => Ok(Classification::Json(value)),
    }
}
