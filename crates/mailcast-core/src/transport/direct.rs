//! Direct delivery to the recipient's MX

use super::smtp::{build_message, map_smtp_error};
use super::{generate_message_id, Envelope, SendReceipt, Transport, TransportError, TransportErrorKind};
use async_trait::async_trait;
use lettre::message::header::{HeaderName, HeaderValue};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Response;
use lettre::Message;
use mailcast_common::config::SmtpConfig;
use std::net::IpAddr;
use std::time::Duration;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;
use tracing::{debug, warn};

const ORIGINATING_IP: HeaderName = HeaderName::new_from_ascii_str("X-Originating-IP");

/// Delivers straight to the recipient domain's mail exchangers from a
/// fixed local address, with STARTTLS when offered.
pub struct DirectTransport {
    source: IpAddr,
    port: u16,
    settings: SmtpConfig,
    resolver: TokioAsyncResolver,
}

impl DirectTransport {
    pub fn new(source: IpAddr, port: u16, settings: SmtpConfig) -> Self {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self {
            source,
            port,
            settings,
            resolver,
        }
    }

    pub fn source(&self) -> IpAddr {
        self.source
    }

    /// MX hosts by preference; the domain itself when it has none
    async fn resolve_mx(&self, domain: &str) -> Vec<String> {
        match self.resolver.mx_lookup(domain).await {
            Ok(mx) => {
                let mut hosts: Vec<(u16, String)> = mx
                    .iter()
                    .map(|r| (r.preference(), r.exchange().to_string()))
                    .collect();
                hosts.sort_by_key(|(pref, _)| *pref);
                hosts
                    .into_iter()
                    .map(|(_, host)| host.trim_end_matches('.').to_string())
                    .filter(|host| !host.is_empty())
                    .collect()
            }
            Err(e) => {
                warn!("No MX records for {}, falling back to A record: {}", domain, e);
                vec![domain.to_string()]
            }
        }
    }

    fn hello_name(&self) -> ClientId {
        match &self.settings.helo_name {
            Some(name) => ClientId::Domain(name.clone()),
            None => ClientId::default(),
        }
    }

    /// The outgoing message, stamped with the source address
    fn prepare(&self, envelope: &Envelope, message_id: &str) -> Result<Message, TransportError> {
        let mut message = build_message(envelope, message_id)?;
        message
            .headers_mut()
            .insert_raw(HeaderValue::new(ORIGINATING_IP, self.source.to_string()));
        Ok(message)
    }

    /// One SMTP session with `host`, bound to the source address
    async fn deliver_to(
        &self,
        host: &str,
        message: &Message,
    ) -> Result<Response, lettre::transport::smtp::Error> {
        let hello = self.hello_name();
        let mut conn = AsyncSmtpConnection::connect_tokio1(
            (host, self.port),
            Some(Duration::from_secs(self.settings.timeout_secs)),
            &hello,
            None,
            Some(self.source),
        )
        .await?;

        if conn.can_starttls() {
            conn.starttls(TlsParameters::new(host.to_string())?, &hello)
                .await?;
        }

        let result = conn.send(message.envelope(), &message.formatted()).await;
        match &result {
            Ok(_) => {
                if let Err(e) = conn.quit().await {
                    debug!(mx = %host, "QUIT failed after delivery: {}", e);
                }
            }
            Err(_) => conn.abort().await,
        }
        result
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, envelope: &Envelope) -> Result<SendReceipt, TransportError> {
        let domain = envelope.recipient_domain().ok_or_else(|| {
            TransportError::new(
                TransportErrorKind::PolicyRejected,
                format!("Invalid recipient address: {}", envelope.to),
            )
        })?;

        let message_id = generate_message_id(&envelope.from_address);
        let message = self.prepare(envelope, &message_id)?;

        let mut last_error = TransportError::new(
            TransportErrorKind::ConnectionRefused,
            format!("No mail exchanger reachable for {}", domain),
        );

        for host in self.resolve_mx(&domain).await {
            match self.deliver_to(&host, &message).await {
                Ok(response) => {
                    debug!(
                        source = %self.source,
                        mx = %host,
                        code = %response.code(),
                        "Mail exchanger accepted message"
                    );
                    return Ok(SendReceipt { message_id });
                }
                Err(e) => {
                    let err = map_smtp_error(e);
                    warn!(source = %self.source, mx = %host, "Delivery attempt failed: {}", err.message);
                    // A permanent rejection would repeat on every exchanger
                    if err.kind == TransportErrorKind::PolicyRejected {
                        return Err(err);
                    }
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }
}
