pub mod api;
pub mod config;
pub mod dispatch;
pub mod message;
pub mod metrics;
pub mod signald;
pub mod supervisor;
pub mod templates;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::Receiver;
use crate::dispatch::{DispatchError, MessageSink};
use crate::message::AlertMessage;
use crate::metrics::Metrics;
use crate::signald::{Connection, SendRequest, SubmitError};
use crate::templates::TemplateSet;

/// Shared state passed to the HTTP layer and the connection supervisor.
///
/// Everything except the connection slot is read-only after startup. The slot
/// is written only by the supervisor and read from request handlers, always
/// as a whole `Arc` swap so a handler never observes a half-built connection.
pub struct AppContext {
    pub receivers: HashMap<String, Receiver>,
    pub templates: TemplateSet,
    pub metrics: Metrics,

    /// Path of the signald UNIX socket, used by the supervisor
    pub socket_path: PathBuf,

    connection: RwLock<Option<Arc<Connection>>>,
    connected: AtomicBool,
}

impl AppContext {
    pub fn new(
        receivers: HashMap<String, Receiver>,
        templates: TemplateSet,
        socket_path: PathBuf,
    ) -> Self {
        Self {
            receivers,
            templates,
            metrics: Metrics::new(),
            socket_path,
            connection: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Current connection, if the supervisor has one established.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Called by the supervisor on every (re)connect.
    pub fn set_connection(&self, connection: Arc<Connection>) {
        *self.connection.write() = Some(connection);
        self.connected.store(true, Ordering::Relaxed);
        self.metrics.set_connected(true);
    }

    /// Called by the supervisor when the connection breaks.
    pub fn clear_connection(&self) {
        *self.connection.write() = None;
        self.connected.store(false, Ordering::Relaxed);
        self.metrics.set_connected(false);
    }

    /// Relay one decoded alert notification.
    pub async fn dispatch(&self, message: &AlertMessage) -> Result<(), DispatchError> {
        dispatch::dispatch(&self.receivers, &self.templates, self, message).await
    }
}

/// Submits over the supervisor's live connection; without one, requests fail
/// as a submit error rather than a crash.
#[async_trait]
impl MessageSink for AppContext {
    async fn submit(&self, request: &SendRequest) -> Result<(), SubmitError> {
        match self.connection() {
            Some(connection) => connection.submit(request).await,
            None => Err(SubmitError::NotConnected),
        }
    }
}
