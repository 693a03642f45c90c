//! Common types for Mailcast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// A single campaign recipient. Identity is the email address; duplicates
/// are not collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: String,
}

impl Recipient {
    /// Create a recipient with only an email address
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            company: String::new(),
        }
    }

    /// Set the first and last name
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    /// Set the company
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    /// Get a named field
    pub fn field(&self, field: RecipientField) -> &str {
        match field {
            RecipientField::Email => &self.email,
            RecipientField::FirstName => &self.first_name,
            RecipientField::LastName => &self.last_name,
            RecipientField::Company => &self.company,
        }
    }
}

/// Recipient fields addressable from placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientField {
    Email,
    FirstName,
    LastName,
    Company,
}

impl RecipientField {
    /// Parse the field names used in placeholder files (`firstName`, `first_name`, ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "email" => Some(Self::Email),
            "firstName" | "first_name" => Some(Self::FirstName),
            "lastName" | "last_name" => Some(Self::LastName),
            "company" => Some(Self::Company),
            _ => None,
        }
    }
}

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
            return None;
        }
        let (local, domain) = s.split_once('@')?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return None;
        }
        Some(Self::new(local, domain))
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// How messages leave the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// HTTP mail-send API with a bearer key
    ApiRelay,
    /// SMTP submission through an authenticated relay
    AuthenticatedRelay,
    /// Direct delivery to the recipient MX from one of the host's addresses
    DirectOrigin,
    /// Direct delivery rotating across a configured source-address pool
    AddressRotation,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::ApiRelay => "api_relay",
            DispatchMode::AuthenticatedRelay => "authenticated_relay",
            DispatchMode::DirectOrigin => "direct_origin",
            DispatchMode::AddressRotation => "address_rotation",
        }
    }

    /// Whether this mode selects from a loaded endpoint pool
    pub fn requires_pool(&self) -> bool {
        !matches!(self, DispatchMode::DirectOrigin)
    }
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::AuthenticatedRelay
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "api" | "api_relay" => Ok(DispatchMode::ApiRelay),
            "relay" | "smtp" | "authenticated_relay" => Ok(DispatchMode::AuthenticatedRelay),
            "direct" | "local" | "direct_origin" => Ok(DispatchMode::DirectOrigin),
            "rotation" | "ip_rotation" | "address_rotation" => Ok(DispatchMode::AddressRotation),
            other => Err(crate::Error::Validation(format!(
                "unknown dispatch mode: {}",
                other
            ))),
        }
    }
}

/// Transport-security policy for a relay connection, fixed by port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// TLS from the first byte (465)
    Implicit,
    /// STARTTLS required (587)
    Negotiated,
    /// Plain SMTP (25)
    None,
    /// STARTTLS when offered, plaintext otherwise
    Opportunistic,
}

impl TransportSecurity {
    pub fn for_port(port: u16) -> Self {
        match port {
            465 => TransportSecurity::Implicit,
            587 => TransportSecurity::Negotiated,
            25 => TransportSecurity::None,
            _ => TransportSecurity::Opportunistic,
        }
    }
}

/// One destination/credential bundle used to perform a delivery
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportEndpoint {
    Api {
        base_url: String,
        api_key: String,
    },
    Relay {
        host: String,
        port: u16,
        username: String,
        password: String,
    },
    Origin {
        address: IpAddr,
        port: u16,
    },
}

impl TransportEndpoint {
    /// Identifier reported as `endpoint_used`; never contains secrets
    pub fn label(&self) -> String {
        match self {
            TransportEndpoint::Api { base_url, .. } => format!("api:{}", base_url),
            TransportEndpoint::Relay { host, port, .. } => format!("{}:{}", host, port),
            TransportEndpoint::Origin { address, port } => {
                SocketAddr::new(*address, *port).to_string()
            }
        }
    }

    /// Modes this endpoint can serve
    pub fn serves(&self, mode: DispatchMode) -> bool {
        matches!(
            (self, mode),
            (TransportEndpoint::Api { .. }, DispatchMode::ApiRelay)
                | (TransportEndpoint::Relay { .. }, DispatchMode::AuthenticatedRelay)
                | (TransportEndpoint::Origin { .. }, DispatchMode::DirectOrigin)
                | (TransportEndpoint::Origin { .. }, DispatchMode::AddressRotation)
        )
    }
}

impl fmt::Debug for TransportEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEndpoint::Api { base_url, .. } => f
                .debug_struct("Api")
                .field("base_url", base_url)
                .field("api_key", &"<redacted>")
                .finish(),
            TransportEndpoint::Relay {
                host,
                port,
                username,
                ..
            } => f
                .debug_struct("Relay")
                .field("host", host)
                .field("port", port)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            TransportEndpoint::Origin { address, port } => f
                .debug_struct("Origin")
                .field("address", address)
                .field("port", port)
                .finish(),
        }
    }
}

/// File attached to every outgoing message when attachments are enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_parse() {
        let addr = EmailAddress::parse("a@x.com").unwrap();
        assert_eq!(addr.local, "a");
        assert_eq!(addr.domain, "x.com");
        assert_eq!(addr.to_string(), "a@x.com");

        assert!(EmailAddress::parse("").is_none());
        assert!(EmailAddress::parse("no-at-sign").is_none());
        assert!(EmailAddress::parse("@x.com").is_none());
        assert!(EmailAddress::parse("a@").is_none());
        assert!(EmailAddress::parse("a@b@c").is_none());
        assert!(EmailAddress::parse("a b@x.com").is_none());
    }

    #[test]
    fn test_dispatch_mode_from_str() {
        assert_eq!("api".parse::<DispatchMode>().unwrap(), DispatchMode::ApiRelay);
        assert_eq!(
            "authenticated-relay".parse::<DispatchMode>().unwrap(),
            DispatchMode::AuthenticatedRelay
        );
        assert_eq!("Direct".parse::<DispatchMode>().unwrap(), DispatchMode::DirectOrigin);
        assert_eq!(
            "ip-rotation".parse::<DispatchMode>().unwrap(),
            DispatchMode::AddressRotation
        );
        assert!("carrier-pigeon".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_transport_security_table() {
        assert_eq!(TransportSecurity::for_port(465), TransportSecurity::Implicit);
        assert_eq!(TransportSecurity::for_port(587), TransportSecurity::Negotiated);
        assert_eq!(TransportSecurity::for_port(25), TransportSecurity::None);
        assert_eq!(TransportSecurity::for_port(2525), TransportSecurity::Opportunistic);
    }

    #[test]
    fn test_endpoint_label_hides_secrets() {
        let relay = TransportEndpoint::Relay {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(relay.label(), "smtp.example.com:587");
        assert!(!format!("{:?}", relay).contains("hunter2"));

        let origin = TransportEndpoint::Origin {
            address: "::1".parse().unwrap(),
            port: 25,
        };
        assert_eq!(origin.label(), "[::1]:25");
        assert!(origin.serves(DispatchMode::AddressRotation));
        assert!(!origin.serves(DispatchMode::ApiRelay));
    }

    #[test]
    fn test_recipient_fields() {
        let r = Recipient::new("a@x.com")
            .with_name("Ada", "Lovelace")
            .with_company("Engines");
        assert_eq!(r.field(RecipientField::FirstName), "Ada");
        assert_eq!(r.field(RecipientField::Company), "Engines");
        assert_eq!(RecipientField::parse("lastName"), Some(RecipientField::LastName));
        assert_eq!(RecipientField::parse("nope"), None);
    }
}
