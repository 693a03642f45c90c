//! Transport construction for live campaigns

use super::{
    DirectTransport, HttpApiTransport, SmtpRelayTransport, Transport, TransportError,
    TransportFactory,
};
use mailcast_common::config::SmtpConfig;
use mailcast_common::{Config, TransportEndpoint};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Builds the bundled transports, one per distinct endpoint
pub struct LiveTransportFactory {
    api_timeout: Duration,
    smtp: SmtpConfig,
    cache: RwLock<HashMap<TransportEndpoint, Arc<dyn Transport>>>,
}

impl LiveTransportFactory {
    pub fn new(api_timeout: Duration, smtp: SmtpConfig) -> Self {
        Self {
            api_timeout,
            smtp,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.api.timeout_secs),
            config.smtp.clone(),
        )
    }

    fn build(&self, endpoint: &TransportEndpoint) -> Result<Arc<dyn Transport>, TransportError> {
        let transport: Arc<dyn Transport> = match endpoint {
            TransportEndpoint::Api { base_url, api_key } => Arc::new(HttpApiTransport::new(
                base_url.clone(),
                api_key.clone(),
                self.api_timeout,
            )?),
            TransportEndpoint::Relay {
                host,
                port,
                username,
                password,
            } => Arc::new(SmtpRelayTransport::new(
                host, *port, username, password, &self.smtp,
            )?),
            TransportEndpoint::Origin { address, port } => {
                Arc::new(DirectTransport::new(*address, *port, self.smtp.clone()))
            }
        };
        debug!(endpoint = %endpoint.label(), "Created transport");
        Ok(transport)
    }
}

impl TransportFactory for LiveTransportFactory {
    fn transport_for(&self, endpoint: &TransportEndpoint) -> Result<Arc<dyn Transport>, TransportError> {
        if let Some(existing) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
        {
            return Ok(existing.clone());
        }

        let transport = self.build(endpoint)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.entry(endpoint.clone()).or_insert(transport).clone())
    }
}
