//! Session token refresh
//!
//! Single token-endpoint interaction: exchange the long-lived refresh token
//! for a new access/refresh pair. POSTs a JSON body to
//! `{base}/api/v1/auth/refresh` and decodes the standard response envelope.
//! Tokens rotate on every refresh — the old refresh token is spent once the
//! endpoint answers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Refresh endpoint path relative to the API base URL.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Token payload from the refresh endpoint.
///
/// `expires_in` and `refresh_expires_in` are deltas in seconds from the
/// response time. The caller converts them to absolute unix millisecond
/// timestamps when storing the credentials.
#[derive(Debug, Deserialize, Serialize)]
pub struct SessionTokens {
    /// New access token
    pub token: String,
    /// New refresh token (rotated on every refresh)
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: u64,
}

/// Response envelope wrapped around `SessionTokens`.
#[derive(Debug, Deserialize)]
struct RefreshEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<SessionTokens>,
}

/// Envelope codes the refresh endpoint reports as success: the 0 sentinel
/// and the 2xx range.
fn is_success_code(code: i64) -> bool {
    code == 0 || (200..300).contains(&code)
}

/// Exchange a refresh token for a new token pair.
///
/// Called by the refresh coordinator when a request hits a 401. Any non-2xx
/// status or failing envelope code is a refresh failure; 401/403 from the
/// endpoint means the refresh token itself is revoked or expired.
pub async fn refresh_session(
    client: &reqwest::Client,
    base_url: &str,
    refresh_token: &str,
) -> Result<SessionTokens> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH);
    let response = client
        .post(&url)
        .json(&serde_json::json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::RefreshRejected(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::RefreshFailed(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let envelope: RefreshEnvelope = response
        .json()
        .await
        .map_err(|e| Error::Envelope(format!("decoding refresh response: {e}")))?;

    if !is_success_code(envelope.code) {
        return Err(Error::RefreshFailed(format!(
            "refresh endpoint returned code {}: {}",
            envelope.code,
            envelope.message.unwrap_or_default()
        )));
    }

    envelope
        .data
        .ok_or_else(|| Error::Envelope("refresh response carries no token data".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_body(access: &str, refresh: &str) -> String {
        format!(
            r#"{{"code":0,"message":"ok","data":{{"token":"{access}","refresh_token":"{refresh}","expires_in":3600,"refresh_expires_in":86400}},"timestamp":1754500000000}}"#
        )
    }

    #[test]
    fn session_tokens_deserialize() {
        let json = r#"{"token":"at_abc","refresh_token":"rt_def","expires_in":3600,"refresh_expires_in":86400}"#;
        let tokens: SessionTokens = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.token, "at_abc");
        assert_eq!(tokens.refresh_token, "rt_def");
        assert_eq!(tokens.expires_in, 3600);
        assert_eq!(tokens.refresh_expires_in, 86400);
    }

    #[test]
    fn success_codes_accept_sentinel_and_2xx() {
        assert!(is_success_code(0));
        assert!(is_success_code(200));
        assert!(is_success_code(299));
        assert!(!is_success_code(300));
        assert!(!is_success_code(500));
        assert!(!is_success_code(-1));
    }

    #[tokio::test]
    async fn refresh_returns_rotated_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/auth/refresh")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "refresh_token": "rt_old"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(tokens_body("at_new", "rt_new"))
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let tokens = refresh_session(&client, &server.url(), "rt_old")
            .await
            .unwrap();
        assert_eq!(tokens.token, "at_new");
        assert_eq!(tokens.refresh_token, "rt_new");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_accepts_2xx_envelope_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"code":200,"data":{"token":"at","refresh_token":"rt","expires_in":1,"refresh_expires_in":2}}"#,
            )
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let tokens = refresh_session(&client, &server.url(), "rt_old")
            .await
            .unwrap();
        assert_eq!(tokens.token, "at");
    }

    #[tokio::test]
    async fn refresh_401_is_rejected_not_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/refresh")
            .with_status(401)
            .with_body(r#"{"code":401,"message":"refresh token expired"}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.url(), "rt_stale")
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::RefreshRejected(_)),
            "expected RefreshRejected, got: {err:?}"
        );
    }

    #[tokio::test]
    async fn refresh_500_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/refresh")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.url(), "rt")
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::RefreshFailed(_)),
            "expected RefreshFailed, got: {err:?}"
        );
    }

    #[tokio::test]
    async fn refresh_business_failure_inside_2xx() {
        // HTTP 200 but the envelope signals failure — still a refresh failure
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":40101,"message":"invalid refresh token"}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.url(), "rt")
            .await
            .unwrap_err();
        match err {
            Error::RefreshFailed(msg) => assert!(msg.contains("40101"), "got: {msg}"),
            other => panic!("expected RefreshFailed, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_missing_data_is_envelope_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":0,"message":"ok"}"#)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let err = refresh_session(&client, &server.url(), "rt")
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Envelope(_)),
            "expected Envelope, got: {err:?}"
        );
    }
}
