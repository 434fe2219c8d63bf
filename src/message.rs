//! Deserialization types for the Alertmanager webhook payload.
//!
//! Field names follow the Alertmanager wire schema (camelCase). Everything
//! except `receiver` is optional on the wire so that minimal or future
//! payloads still decode; templates see the full serialized structure under
//! the same camelCase names.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One webhook notification, grouping one or more alert state changes.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertMessage {
    pub version: String,
    pub group_key: String,

    /// Name of the configured receiver this notification is addressed to
    pub receiver: String,
    pub status: String,
    pub alerts: Vec<Alert>,
    pub group_labels: HashMap<String, String>,
    pub common_labels: HashMap<String, String>,
    pub common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL")]
    pub external_url: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Alert {
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
}
