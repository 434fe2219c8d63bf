//! Receiver resolution and message fan-out.
//!
//! Failures below the receiver lookup are deliberately tolerant so operators
//! still get notified when a template is broken: a failing body template
//! degrades to a fallback message, and a failing or unclassifiable `to`
//! entry only skips that entry.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::config::Receiver;
use crate::message::AlertMessage;
use crate::signald::{Connection, JsonAddress, SendRequest, SubmitError};
use crate::templates::TemplateSet;

/// A Signal recipient parsed from a rendered `to` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientAddress {
    Phone(String),
    Group(String),
}

impl RecipientAddress {
    /// Parse `tel:+15551234567` or `group:abc123`. Anything else is
    /// unclassifiable and yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(number) = raw.strip_prefix("tel:") {
            Some(Self::Phone(number.to_string()))
        } else if let Some(id) = raw.strip_prefix("group:") {
            Some(Self::Group(id.to_string()))
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0:?}: receiver not configured")]
    UnknownReceiver(String),

    #[error("sending to signald failed: {0}")]
    Submit(#[from] SubmitError),
}

/// Sink for fully rendered send requests.
///
/// The live implementation is a signald [`Connection`]; tests substitute a
/// recording fake.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn submit(&self, request: &SendRequest) -> Result<(), SubmitError>;
}

#[async_trait]
impl MessageSink for Connection {
    async fn submit(&self, request: &SendRequest) -> Result<(), SubmitError> {
        Connection::submit(self, request).await
    }
}

/// Relay one decoded alert notification to every recipient of its receiver.
///
/// Every recipient is attempted even when an earlier one fails; the first
/// submit error is returned after the loop so one bad recipient cannot
/// suppress delivery to the rest.
#[instrument(skip_all, fields(receiver = %message.receiver))]
pub async fn dispatch<S: MessageSink + ?Sized>(
    receivers: &HashMap<String, Receiver>,
    templates: &TemplateSet,
    sink: &S,
    message: &AlertMessage,
) -> Result<(), DispatchError> {
    let Some(receiver) = receivers.get(&message.receiver) else {
        return Err(DispatchError::UnknownReceiver(message.receiver.clone()));
    };
    debug!(recipients = receiver.to.len(), "relaying alert");

    let body = match templates.render(&receiver.template, message) {
        Ok(body) => body,
        Err(e) => {
            warn!("body template expansion failed: {e}");
            format!(
                "{:?}: template expansion failed: {e}",
                message.group_labels
            )
        }
    };

    let mut first_error = None;
    for to_template in &receiver.to {
        let to = match templates.render(to_template, message) {
            Ok(to) => to,
            Err(e) => {
                warn!("error expanding to template {to_template:?}: {e}");
                continue;
            }
        };

        let Some(address) = RecipientAddress::parse(&to) else {
            warn!("unknown to: {to:?}, expected tel:+number or group:id");
            continue;
        };

        let request = send_request(receiver, address, body.clone());
        if let Err(e) = sink.submit(&request).await {
            warn!("sending to signald failed: {e}");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn send_request(receiver: &Receiver, address: RecipientAddress, body: String) -> SendRequest {
    let (recipient_address, recipient_group_id) = match address {
        RecipientAddress::Phone(number) => (Some(JsonAddress { number }), None),
        RecipientAddress::Group(id) => (None, Some(id)),
    };

    SendRequest {
        username: receiver.sender.clone(),
        recipient_address,
        recipient_group_id,
        message_body: body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_phone_numbers() {
        assert_eq!(
            RecipientAddress::parse("tel:+15551234567"),
            Some(RecipientAddress::Phone("+15551234567".to_string()))
        );
    }

    #[test]
    fn classifies_group_ids() {
        assert_eq!(
            RecipientAddress::parse("group:abc123"),
            Some(RecipientAddress::Group("abc123".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_prefixes() {
        assert_eq!(RecipientAddress::parse("foo:bar"), None);
        assert_eq!(RecipientAddress::parse("+15551234567"), None);
        assert_eq!(RecipientAddress::parse(""), None);
    }

    #[test]
    fn prefix_only_addresses_parse_empty() {
        // Empty numbers or ids fail later at submit time, in line with the
        // load-time validation policy.
        assert_eq!(
            RecipientAddress::parse("tel:"),
            Some(RecipientAddress::Phone(String::new()))
        );
    }
}
