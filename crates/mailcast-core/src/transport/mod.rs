//! Transports - the wire-level delivery of a single message

mod api;
mod direct;
mod factory;
mod router;
mod smtp;

pub use api::HttpApiTransport;
pub use direct::DirectTransport;
pub use factory::LiveTransportFactory;
pub use router::{LocalAddressSource, NotAvailable, StaticAddresses, SystemAddresses, TransportRouter};
pub use smtp::SmtpRelayTransport;

use async_trait::async_trait;
use chrono::Utc;
use mailcast_common::{Attachment, EmailAddress, TransportEndpoint};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use uuid::Uuid;

/// Everything a transport needs to deliver one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Address the message is actually delivered to
    pub to: String,
    /// Recipient this message was produced for (differs from `to` under a test override)
    pub original_recipient: String,
    pub from_name: String,
    pub from_address: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Envelope {
    /// `Name <address>`, or the bare address when there is no name
    pub fn from_header(&self) -> String {
        if self.from_name.trim().is_empty() {
            self.from_address.clone()
        } else {
            format!("{} <{}>", self.from_name, self.from_address)
        }
    }

    /// Domain of the delivery address
    pub fn recipient_domain(&self) -> Option<String> {
        EmailAddress::parse(&self.to).map(|addr| addr.domain)
    }

    /// The envelope minus its bodies, for test-mode inspection
    pub fn summary(&self) -> EnvelopeSummary {
        EnvelopeSummary {
            to: self.to.clone(),
            original_recipient: self.original_recipient.clone(),
            from: self.from_header(),
            subject: self.subject.clone(),
            attachments: self
                .attachments
                .iter()
                .map(|a| a.filename.clone())
                .collect(),
        }
    }
}

/// Body-less view of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeSummary {
    pub to: String,
    pub original_recipient: String,
    pub from: String,
    pub subject: String,
    pub attachments: Vec<String>,
}

/// Acknowledgement of an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Coarse category of a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Authentication,
    ConnectionRefused,
    Timeout,
    /// Permanent rejection, as with SMTP 550/554
    PolicyRejected,
    /// Temporary refusal, as with SMTP 421
    ServiceUnavailable,
    Unknown,
}

impl TransportErrorKind {
    /// Categorize a raw error message. An SMTP reply code, leading or in
    /// parentheses, takes precedence over the wording.
    pub fn classify(message: &str) -> Self {
        if let Some(kind) = reply_code(message).and_then(Self::from_reply_code) {
            return kind;
        }

        let lower = message.to_lowercase();
        if lower.contains("authentication") || lower.contains("auth failed") {
            TransportErrorKind::Authentication
        } else if lower.contains("timeout") || lower.contains("timed out") {
            TransportErrorKind::Timeout
        } else if lower.contains("connection") {
            TransportErrorKind::ConnectionRefused
        } else {
            TransportErrorKind::Unknown
        }
    }

    /// Kind for a negative SMTP reply code
    pub fn from_reply_code(code: u16) -> Option<Self> {
        match code {
            530 | 534 | 535 => Some(TransportErrorKind::Authentication),
            400..=499 => Some(TransportErrorKind::ServiceUnavailable),
            500..=599 => Some(TransportErrorKind::PolicyRejected),
            _ => None,
        }
    }

    /// Operator-facing explanation
    pub fn describe(&self) -> &'static str {
        match self {
            TransportErrorKind::Authentication => {
                "Authentication failed. Check username and password."
            }
            TransportErrorKind::ConnectionRefused => {
                "Connection issue. Server may be unavailable or blocking connections."
            }
            TransportErrorKind::Timeout => {
                "Connection timed out. Server may be slow or unresponsive."
            }
            TransportErrorKind::PolicyRejected => {
                "Message rejected. Recipient may be invalid or server policy rejection."
            }
            TransportErrorKind::ServiceUnavailable => {
                "Service not available. Server may be blocking due to rate limits."
            }
            TransportErrorKind::Unknown => "Delivery failed.",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Authentication => "authentication",
            TransportErrorKind::ConnectionRefused => "connection_refused",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::PolicyRejected => "policy_rejected",
            TransportErrorKind::ServiceUnavailable => "service_unavailable",
            TransportErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failed delivery
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} ({message})", .kind.describe())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from a raw message, inferring the kind
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: TransportErrorKind::classify(&message),
            message,
        }
    }
}

/// Delivers one envelope
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<SendReceipt, TransportError>;
}

/// Produces the transport for a selected endpoint
pub trait TransportFactory: Send + Sync {
    fn transport_for(&self, endpoint: &TransportEndpoint) -> Result<Arc<dyn Transport>, TransportError>;
}

fn reply_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?:^\s*|\()([45][0-9]{2})\b").unwrap())
}

/// The first 4xx/5xx reply code, as in `550 ...` or `permanent error (550)`
fn reply_code(message: &str) -> Option<u16> {
    reply_code_pattern()
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
}

/// `<uuid.timestamp@domain>`
pub(crate) fn generate_message_id(from_address: &str) -> String {
    let domain = EmailAddress::parse(from_address)
        .map(|addr| addr.domain)
        .unwrap_or_else(|| "mailcast".to_string());
    format!("<{}.{}@{}>", Uuid::new_v4(), Utc::now().timestamp(), domain)
}
