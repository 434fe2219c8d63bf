//! Keeps the signald connection alive.
//!
//! One background task owns the connection lifecycle: connect, publish the
//! handle, pump the read loop until the connection breaks, reconnect with
//! exponential backoff. Nothing else ever writes the connection slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::AppContext;
use crate::signald::Connection;

/// Exponential backoff between reconnect attempts.
///
/// The delay doubles from `base` up to `max` and resets to `base` after a
/// successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            multiplier: 2.0,
            attempt: 0,
        }
    }

    /// Delay before the next attempt. Each call advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = self.multiplier.powi(self.attempt as i32);
        let delay = Duration::from_millis((self.base.as_millis() as f64 * factor) as u64);
        self.attempt = self.attempt.saturating_add(1);
        delay.min(self.max)
    }

    /// Back to the base delay, called after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Connection supervisor task. Runs for the lifetime of the process.
pub async fn run(context: Arc<AppContext>) {
    let mut backoff = Backoff::default();

    loop {
        let (connection, events) = match Connection::connect(&context.socket_path).await {
            Ok(pair) => pair,
            Err(e) => {
                context.clear_connection();
                let delay = backoff.next_delay();
                warn!("unable to connect to signald: {e}, retry in {delay:?}");
                sleep(delay).await;
                continue;
            }
        };

        backoff.reset();
        info!(path = %context.socket_path.display(), "connected to signald");
        context.set_connection(Arc::clone(&connection));

        connection
            .listen(events, |name, version| {
                context.metrics.record_daemon_info(name, version);
            })
            .await;

        warn!("connection to signald lost");
        context.clear_connection();
    }
}
