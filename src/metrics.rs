//! Prometheus metric registry for the relay.
//!
//! All metrics live under the `signald_webhook` namespace. The error counter
//! labels are pre-seeded so both series are visible at zero from the first
//! scrape.

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// `type` label value for payloads that failed to decode
pub const ERROR_DECODE: &str = "decode";

/// `type` label value for payloads that decoded but failed to dispatch
pub const ERROR_HANDLE: &str = "handle";

#[derive(Debug, Clone)]
pub struct Metrics {
    pub registry: Registry,

    /// Alert notifications received over HTTP, including rejected ones
    pub received: IntCounter,

    /// Failed alert notifications, by failure type
    pub errors: IntCounterVec,

    /// 1 while a signald connection is established
    pub connected: IntGauge,

    /// Identity of the connected daemon, labelled with name and version
    pub signald_info: IntGaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let received = IntCounter::with_opts(
            Opts::new("received_total", "Alert notifications received over HTTP")
                .namespace("signald_webhook")
                .subsystem("alerts"),
        )
        .unwrap();

        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Failed alert notifications by type")
                .namespace("signald_webhook")
                .subsystem("alerts"),
            &["type"],
        )
        .unwrap();
        for error_type in [ERROR_DECODE, ERROR_HANDLE] {
            errors.with_label_values(&[error_type]);
        }

        let connected = IntGauge::with_opts(
            Opts::new("connected", "True if connected to signald.")
                .namespace("signald_webhook")
                .subsystem("signal"),
        )
        .unwrap();

        let signald_info = IntGaugeVec::new(
            Opts::new("info", "Name and version of the connected signald")
                .namespace("signald_webhook")
                .subsystem("signal"),
            &["name", "version"],
        )
        .unwrap();

        registry.register(Box::new(received.clone())).unwrap();
        registry.register(Box::new(errors.clone())).unwrap();
        registry.register(Box::new(connected.clone())).unwrap();
        registry.register(Box::new(signald_info.clone())).unwrap();

        Self {
            registry,
            received,
            errors,
            connected,
            signald_info,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(i64::from(connected));
    }

    /// Record the daemon identity announced on connect.
    pub fn record_daemon_info(&self, name: &str, version: &str) {
        self.signald_info.with_label_values(&[name, version]).set(1);
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}
