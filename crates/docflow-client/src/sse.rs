//! Server-sent event streaming
//!
//! Long-lived POST connections carrying a `text/event-stream` body (AI chat
//! completions). The connect path shares the client's auth handling: an
//! initial 401 triggers one single-flight refresh and one reconnect before
//! the error surfaces. Callers receive parsed events over a channel plus an
//! abort handle; aborting surfaces `Cancelled` and never re-enters retry or
//! refresh.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{Classification, classify};
use crate::client::{Client, RequestOptions};
use crate::error::{Error, Result};
use crate::transport;

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `event:` field, when the stream names its events.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
    /// `id:` field, when present.
    pub id: Option<String>,
}

/// Incremental SSE frame parser.
///
/// Feed raw chunks in; complete events come out. Partial lines carry across
/// chunk boundaries, so transport chunking never splits an event.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    id: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Consume a chunk and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line terminates the pending event
                if let Some(event) = self.flush() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                // Comment / keepalive
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_owned()),
                "data" => self.data.push(value.to_owned()),
                "id" => self.id = Some(value.to_owned()),
                _ => {}
            }
        }

        events
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.event.is_none() && self.id.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

/// Handle on an open event stream.
///
/// Events arrive through [`SseHandle::next`]; [`SseHandle::abort`] ends the
/// stream, surfacing a terminal `Cancelled` error to the reader.
#[derive(Debug)]
pub struct SseHandle {
    events: mpsc::Receiver<Result<SseEvent>>,
    cancel: CancellationToken,
}

impl SseHandle {
    /// Next event, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<SseEvent>> {
        self.events.recv().await
    }

    /// Abort the stream.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Token tied to this stream's lifetime.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Client {
    /// Open a server-sent event stream.
    ///
    /// Connects with the same bearer resolution as regular requests. An
    /// initial 401 goes through the single-flight refresh once, then one
    /// reconnect; any further failure surfaces as the connect error. The
    /// stream itself does not auto-reconnect — a broken stream surfaces a
    /// terminal `Network` error and ends.
    pub async fn sse(
        &self,
        path: &str,
        body: Value,
        options: RequestOptions,
    ) -> Result<SseHandle> {
        let url = self.url_for(path);
        let cancel = options.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { url });
        }

        let connect = async {
            let initial = match &options.token {
                Some(explicit) => Some(explicit.clone()),
                None => self.credential_store().access_token().await,
            };
            match self.connect_sse(&url, &body, initial.as_deref()).await {
                Err(error) if error.is_auth() && options.token.is_none() => {
                    debug!("event stream unauthorized, refreshing before reconnect");
                    let fresh = self
                        .refresh_coordinator()
                        .refresh_access_token(initial.as_deref())
                        .await?;
                    self.connect_sse(&url, &body, Some(&fresh)).await
                }
                other => other,
            }
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled { url: url.clone() });
            }
            response = connect => response?,
        };

        let (tx, rx) = mpsc::channel(32);
        let read_cancel = cancel.clone();
        let stream_url = url.clone();
        tokio::spawn(async move {
            let mut parser = SseParser::default();
            let mut stream = response.bytes_stream();
            loop {
                tokio::select! {
                    _ = read_cancel.cancelled() => {
                        debug!(url = %stream_url, "event stream aborted by caller");
                        let _ = tx
                            .send(Err(Error::Cancelled {
                                url: stream_url.clone(),
                            }))
                            .await;
                        break;
                    }
                    chunk = stream.next() => match chunk {
                        Some(Ok(bytes)) => {
                            for event in parser.feed(&bytes) {
                                if tx.send(Ok(event)).await.is_err() {
                                    // Reader dropped the handle
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!(url = %stream_url, error = %e, "event stream broken");
                            let _ = tx.send(Err(transport::map_send_error(&stream_url, e))).await;
                            break;
                        }
                        None => break,
                    }
                }
            }
        });

        Ok(SseHandle { events: rx, cancel })
    }

    /// One streaming connect attempt; non-OK statuses classify like regular
    /// responses so 401 is distinguishable from other failures.
    async fn connect_sse(
        &self,
        url: &str,
        body: &Value,
        token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http_client()
            .post(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        // No overall deadline: the stream stays open until either side closes it

        let response = request
            .send()
            .await
            .map_err(|e| transport::map_send_error(url, e))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body_bytes = response.bytes().await.unwrap_or_default();
        match classify(
            url,
            status,
            content_type.as_deref(),
            body_bytes,
            self.success_codes(),
        )? {
            Classification::Auth { message } => Err(Error::Unauthorized {
                url: url.to_owned(),
                message,
            }),
            Classification::Business {
                status,
                code,
                message,
            } => Err(Error::Business {
                url: url.to_owned(),
                status: Some(status),
                code,
                message,
            }),
            // Non-2xx always classifies as an error
            _ => Err(Error::Network {
                url: url.to_owned(),
                message: format!("unexpected status {status} on event stream"),
            }),
        }
    }
}
