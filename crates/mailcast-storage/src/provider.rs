//! Resource provider abstraction

use async_trait::async_trait;
use mailcast_common::{Attachment, DispatchMode, Recipient, Result, TransportEndpoint};
use std::collections::BTreeMap;

/// Subject lines and sender identities to pick from per message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderPools {
    pub subjects: Vec<String>,
    pub from_names: Vec<String>,
    pub from_addresses: Vec<String>,
}

/// A placeholder definition as written in a placeholder file:
/// `name:path||fallback`.
///
/// The path is kept as text; interpreting it is up to the renderer, which
/// only understands a closed set of paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderDef {
    pub name: String,
    pub path: String,
    pub fallback: Option<String>,
}

impl PlaceholderDef {
    /// Parse one `name:path||fallback` line; `None` for malformed lines
    pub fn parse_line(line: &str) -> Option<Self> {
        let (name, value) = line.trim().split_once(':')?;
        let name = name.trim();
        if name.is_empty() || value.trim().is_empty() {
            return None;
        }

        let (path, fallback) = match value.split_once("||") {
            Some((path, fallback)) => (path.trim(), Some(fallback.trim())),
            None => (value.trim(), None),
        };

        Some(Self {
            name: name.to_string(),
            path: path.to_string(),
            fallback: fallback.filter(|f| !f.is_empty()).map(str::to_string),
        })
    }
}

/// Source of everything a campaign reads before its first task.
///
/// Every loader except [`ResourceProvider::load_recipients`] returns an
/// empty or default collection when its data is absent.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Load recipients; missing or unreadable data is fatal
    async fn load_recipients(&self) -> Result<Vec<Recipient>>;

    /// Load message templates by name
    async fn load_templates(&self) -> Result<BTreeMap<String, String>>;

    /// Load the endpoint pool for a dispatch mode
    async fn load_endpoint_pool(&self, mode: DispatchMode) -> Result<Vec<TransportEndpoint>>;

    /// Load subjects, from-names and from-addresses
    async fn load_senders(&self) -> Result<SenderPools>;

    /// Load content-policy keywords
    async fn load_policy_keywords(&self) -> Result<Vec<String>>;

    /// Load placeholder definitions; empty means "use the built-in set"
    async fn load_placeholders(&self) -> Result<Vec<PlaceholderDef>> {
        Ok(Vec::new())
    }

    /// Load attachments
    async fn load_attachments(&self) -> Result<Vec<Attachment>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_placeholder_line() {
        assert_eq!(
            PlaceholderDef::parse_line("domain:email.split('@')[1]||example.com"),
            Some(PlaceholderDef {
                name: "domain".to_string(),
                path: "email.split('@')[1]".to_string(),
                fallback: Some("example.com".to_string()),
            })
        );
        assert_eq!(
            PlaceholderDef::parse_line("firstName:firstName"),
            Some(PlaceholderDef {
                name: "firstName".to_string(),
                path: "firstName".to_string(),
                fallback: None,
            })
        );
    }

    #[test]
    fn test_parse_placeholder_line_malformed() {
        assert_eq!(PlaceholderDef::parse_line("no separator"), None);
        assert_eq!(PlaceholderDef::parse_line(":path"), None);
        assert_eq!(PlaceholderDef::parse_line("name:"), None);
    }
}
