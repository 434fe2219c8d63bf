//! Minimal client for the signald socket protocol.
//!
//! signald speaks newline-delimited JSON over a UNIX domain socket. Requests
//! carry a client-chosen `id` which the daemon echoes on the matching
//! response. This module implements only the surface the relay needs:
//! connecting, submitting v1 `send` requests, and pumping the read side so
//! replies find their waiting submitters.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// v1 `JsonAddress`. Only the number form is used by this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonAddress {
    pub number: String,
}

/// A signald v1 `send` request.
///
/// Exactly one of `recipient_address` and `recipient_group_id` should be set;
/// signald rejects requests without a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_address: Option<JsonAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_group_id: Option<String>,
    pub message_body: String,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: &'a str,
    version: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    body: &'a SendRequest,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("not connected to signald")]
    NotConnected,

    #[error("request serialization failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket write failed: {0}")]
    Write(#[from] LinesCodecError),

    #[error("connection to signald lost before a reply arrived")]
    ConnectionLost,

    #[error("signald rejected the request: {0}")]
    Rejected(String),
}

/// One established signald connection.
///
/// The write half is shared by every in-flight submit. The read half is
/// returned separately as an [`EventStream`] and must be pumped through
/// [`Connection::listen`], which the supervisor drives for the lifetime of
/// the connection.
pub struct Connection {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    // None once the read loop has ended; submits then fail fast.
    pending: parking_lot::Mutex<Option<HashMap<String, oneshot::Sender<Envelope>>>>,
}

/// Read side of a [`Connection`].
pub struct EventStream {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
}

impl Connection {
    /// Open the signald socket.
    pub async fn connect(path: &Path) -> std::io::Result<(Arc<Self>, EventStream)> {
        let stream = UnixStream::connect(path).await?;
        let (read, write) = stream.into_split();

        let connection = Arc::new(Self {
            writer: Mutex::new(FramedWrite::new(write, LinesCodec::new())),
            pending: parking_lot::Mutex::new(Some(HashMap::new())),
        });
        let events = EventStream {
            reader: FramedRead::new(read, LinesCodec::new()),
        };
        Ok((connection, events))
    }

    /// Submit one send request and wait for the daemon's reply.
    ///
    /// There is no timeout: a lost connection drops the reply channel, which
    /// fails the wait instead of hanging past a disconnect.
    pub async fn submit(&self, request: &SendRequest) -> Result<(), SubmitError> {
        let id = Uuid::new_v4().to_string();
        let line = serde_json::to_string(&Request {
            id: &id,
            version: "v1",
            kind: "send",
            body: request,
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            match pending.as_mut() {
                Some(waiting) => waiting.insert(id.clone(), reply_tx),
                None => return Err(SubmitError::ConnectionLost),
            };
        }

        let written = {
            let mut writer = self.writer.lock().await;
            writer.send(line).await
        };
        if let Err(e) = written {
            self.forget(&id);
            return Err(e.into());
        }
        trace!(id, "send request written");

        let reply = reply_rx.await.map_err(|_| SubmitError::ConnectionLost)?;
        if let Some(error) = reply.error {
            return Err(SubmitError::Rejected(error.to_string()));
        }
        if reply.kind.ends_with("_error") {
            return Err(SubmitError::Rejected(reply.kind));
        }
        trace!(id, "send request acknowledged");
        Ok(())
    }

    fn forget(&self, id: &str) {
        if let Some(waiting) = self.pending.lock().as_mut() {
            waiting.remove(id);
        }
    }

    /// Pump incoming lines until the socket closes or errors.
    ///
    /// Replies are routed to their waiting submitter. The daemon's `version`
    /// greeting is reported through `on_version`; other pushed events
    /// (incoming messages, receipts) are irrelevant to the relay and dropped.
    /// On return every still-pending submit is failed.
    pub async fn listen<F>(&self, mut events: EventStream, mut on_version: F)
    where
        F: FnMut(&str, &str),
    {
        while let Some(next) = events.reader.next().await {
            let line = match next {
                Ok(line) => line,
                Err(e) => {
                    warn!("reading from signald failed: {e}");
                    break;
                }
            };

            let envelope: Envelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("undecodable line from signald: {e}");
                    continue;
                }
            };

            if let Some(id) = envelope.id.clone() {
                let waiter = self.pending.lock().as_mut().and_then(|w| w.remove(&id));
                match waiter {
                    Some(reply_tx) => {
                        let _ = reply_tx.send(envelope);
                    }
                    None => trace!(id, "reply for unknown request id"),
                }
                continue;
            }

            if envelope.kind == "version" {
                let name = envelope
                    .data
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("signald");
                let version = envelope
                    .data
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                debug!(name, version, "signald identified itself");
                on_version(name, version);
            } else {
                trace!(kind = %envelope.kind, "ignoring pushed event");
            }
        }

        // Fail everything still waiting for a reply.
        self.pending.lock().take();
    }
}
