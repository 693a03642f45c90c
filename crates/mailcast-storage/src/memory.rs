//! In-memory resource provider

use crate::provider::{PlaceholderDef, ResourceProvider, SenderPools};
use async_trait::async_trait;
use mailcast_common::{Attachment, DispatchMode, Error, Recipient, Result, TransportEndpoint};
use std::collections::BTreeMap;

/// Resource provider backed by collections held in memory.
///
/// Used by embedders that already hold their campaign data, and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceProvider {
    recipients: Option<Vec<Recipient>>,
    templates: BTreeMap<String, String>,
    endpoints: Vec<TransportEndpoint>,
    senders: SenderPools,
    policy_keywords: Vec<String>,
    placeholders: Vec<PlaceholderDef>,
    attachments: Vec<Attachment>,
}

impl MemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients(mut self, recipients: Vec<Recipient>) -> Self {
        self.recipients = Some(recipients);
        self
    }

    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    /// Add an endpoint; it is only returned for modes it can serve
    pub fn with_endpoint(mut self, endpoint: TransportEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_senders(mut self, senders: SenderPools) -> Self {
        self.senders = senders;
        self
    }

    pub fn with_policy_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_placeholder(mut self, def: PlaceholderDef) -> Self {
        self.placeholders.push(def);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[async_trait]
impl ResourceProvider for MemoryResourceProvider {
    async fn load_recipients(&self) -> Result<Vec<Recipient>> {
        self.recipients
            .clone()
            .ok_or_else(|| Error::MissingResource("recipients".to_string()))
    }

    async fn load_templates(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.templates.clone())
    }

    async fn load_endpoint_pool(&self, mode: DispatchMode) -> Result<Vec<TransportEndpoint>> {
        Ok(self
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.serves(mode))
            .cloned()
            .collect())
    }

    async fn load_senders(&self) -> Result<SenderPools> {
        Ok(self.senders.clone())
    }

    async fn load_policy_keywords(&self) -> Result<Vec<String>> {
        Ok(self.policy_keywords.clone())
    }

    async fn load_placeholders(&self) -> Result<Vec<PlaceholderDef>> {
        Ok(self.placeholders.clone())
    }

    async fn load_attachments(&self) -> Result<Vec<Attachment>> {
        Ok(self.attachments.clone())
    }
}
