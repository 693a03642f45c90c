//! Campaign - resource loading and a single dispatch run

use super::audit::AuditTrail;
use super::engine::DispatchEngine;
use super::reporter::CampaignSummary;
use crate::random::SharedRng;
use crate::render::{ContentPolicy, ContentRenderer, PlaceholderSet, Renderer, Template};
use crate::transport::{
    LiveTransportFactory, LocalAddressSource, NotAvailable, SystemAddresses, TransportFactory,
    TransportRouter,
};
use mailcast_common::{CampaignConfig, Config, Recipient};
use mailcast_storage::ResourceProvider;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Conditions that stop a campaign before its first task
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("No recipients found")]
    NoRecipients,

    #[error("No templates found")]
    NoTemplates,

    #[error("{0}")]
    EndpointUnavailable(#[from] NotAvailable),

    #[error("{0}")]
    Resource(#[from] mailcast_common::Error),
}

/// How endpoints turn into transports for a run
pub struct DeliverySetup {
    pub factory: Arc<dyn TransportFactory>,
    pub local_addresses: Arc<dyn LocalAddressSource>,
    /// Destination port for direct-from-origin delivery
    pub direct_port: u16,
}

impl DeliverySetup {
    /// The bundled transports, configured from `config`
    pub fn live(config: &Config) -> Self {
        Self {
            factory: Arc::new(LiveTransportFactory::from_config(config)),
            local_addresses: Arc::new(SystemAddresses::new(config.direct.local_addresses.clone())),
            direct_port: config.direct.port,
        }
    }
}

/// A fully loaded campaign, ready to run once
pub struct Campaign {
    engine: Arc<DispatchEngine>,
    recipients: Vec<Recipient>,
    audit: Arc<AuditTrail>,
}

impl Campaign {
    /// Load every resource and check that the run can start
    pub async fn prepare(
        config: CampaignConfig,
        provider: &dyn ResourceProvider,
        delivery: DeliverySetup,
    ) -> Result<Self, CampaignError> {
        let config = config.validated();

        let recipients = provider.load_recipients().await?;
        if recipients.is_empty() {
            return Err(CampaignError::NoRecipients);
        }

        let templates = Template::from_map(provider.load_templates().await?);
        if templates.is_empty() {
            return Err(CampaignError::NoTemplates);
        }

        let endpoints = provider.load_endpoint_pool(config.mode).await?;
        let rng = Arc::new(SharedRng::new(config.seed));
        let router = Arc::new(TransportRouter::new(
            delivery.factory,
            delivery.local_addresses,
            rng.clone(),
            delivery.direct_port,
        ));
        router.check_available(config.mode, &endpoints)?;

        let senders = provider.load_senders().await?;
        let keywords = provider.load_policy_keywords().await?;
        let placeholders = provider.load_placeholders().await?;
        let attachments = if config.include_attachments {
            let attachments = provider.load_attachments().await?;
            if attachments.is_empty() {
                warn!("Attachments enabled but none found");
            }
            attachments
        } else {
            Vec::new()
        };

        info!(
            recipients = recipients.len(),
            templates = templates.len(),
            endpoints = endpoints.len(),
            subjects = senders.subjects.len(),
            policy_keywords = keywords.len(),
            attachments = attachments.len(),
            mode = %config.mode,
            "Campaign resources loaded"
        );

        let renderer: Arc<dyn Renderer> = Arc::new(ContentRenderer::new(
            PlaceholderSet::from_defs(&placeholders),
            ContentPolicy::new(keywords),
        ));
        let audit = Arc::new(AuditTrail::new());
        let engine = DispatchEngine::new(config, renderer, router, rng, audit.clone())
            .with_templates(templates)
            .with_senders(senders)
            .with_endpoints(endpoints)
            .with_attachments(attachments);

        Ok(Self {
            engine: Arc::new(engine),
            recipients,
            audit,
        })
    }

    pub fn config(&self) -> &CampaignConfig {
        self.engine.config()
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// The run's audit trail; subscribe before `run` to follow progress
    pub fn audit(&self) -> Arc<AuditTrail> {
        self.audit.clone()
    }

    /// Run to completion or cancellation
    pub async fn run(self, cancel: CancellationToken) -> CampaignSummary {
        self.engine.run(self.recipients, cancel).await
    }
}
