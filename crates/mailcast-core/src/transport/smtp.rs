//! SMTP relay transport and MIME assembly shared with direct delivery

use super::{generate_message_id, Envelope, SendReceipt, Transport, TransportError, TransportErrorKind};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::AsyncSmtpTransportBuilder;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailcast_common::config::SmtpConfig;
use mailcast_common::TransportSecurity;
use std::time::Duration;
use tracing::debug;

/// Build the MIME message: alternative plain/html, wrapped in mixed when
/// there are attachments
pub(crate) fn build_message(envelope: &Envelope, message_id: &str) -> Result<Message, TransportError> {
    let from: Address = envelope.from_address.trim().parse().map_err(|e| {
        TransportError::new(
            TransportErrorKind::Unknown,
            format!("Invalid from address: {}", e),
        )
    })?;
    let to: Address = envelope.to.trim().parse().map_err(|e| {
        TransportError::new(
            TransportErrorKind::Unknown,
            format!("Invalid to address: {}", e),
        )
    })?;
    let from_name = Some(envelope.from_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let builder = Message::builder()
        .from(Mailbox::new(from_name, from))
        .to(Mailbox::new(None, to))
        .subject(envelope.subject.clone())
        .message_id(Some(message_id.to_string()));

    let alternative = MultiPart::alternative()
        .singlepart(SinglePart::plain(envelope.text.clone()))
        .singlepart(SinglePart::html(envelope.html.clone()));

    let message = if envelope.attachments.is_empty() {
        builder.multipart(alternative)
    } else {
        let octet_stream = ContentType::parse("application/octet-stream").map_err(|e| {
            TransportError::new(TransportErrorKind::Unknown, e.to_string())
        })?;
        let mut mixed = MultiPart::mixed().multipart(alternative);
        for attachment in &envelope.attachments {
            mixed = mixed.singlepart(
                MimeAttachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), octet_stream.clone()),
            );
        }
        builder.multipart(mixed)
    };

    message.map_err(|e| {
        TransportError::new(
            TransportErrorKind::Unknown,
            format!("Failed to build email: {}", e),
        )
    })
}

/// Map a lettre SMTP error onto the delivery taxonomy
pub(crate) fn map_smtp_error(err: lettre::transport::smtp::Error) -> TransportError {
    let message = err.to_string();
    if err.is_timeout() {
        return TransportError::new(TransportErrorKind::Timeout, message);
    }

    match err
        .status()
        .map(u16::from)
        .and_then(TransportErrorKind::from_reply_code)
    {
        Some(kind) => TransportError::new(kind, message),
        None if err.is_permanent() => TransportError::new(TransportErrorKind::PolicyRejected, message),
        None if err.is_transient() => {
            TransportError::new(TransportErrorKind::ServiceUnavailable, message)
        }
        None => TransportError::classify(message),
    }
}

/// Apply timeout and EHLO name
pub(crate) fn apply_settings(
    builder: AsyncSmtpTransportBuilder,
    settings: &SmtpConfig,
) -> AsyncSmtpTransportBuilder {
    let builder = builder.timeout(Some(Duration::from_secs(settings.timeout_secs)));
    match &settings.helo_name {
        Some(name) => builder.hello_name(ClientId::Domain(name.clone())),
        None => builder,
    }
}

/// Submission through an authenticated relay
pub struct SmtpRelayTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    label: String,
}

impl SmtpRelayTransport {
    /// Connection security follows the port: 465 implicit TLS, 587
    /// STARTTLS, 25 plain, anything else opportunistic
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        settings: &SmtpConfig,
    ) -> Result<Self, TransportError> {
        let builder = match TransportSecurity::for_port(port) {
            TransportSecurity::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            TransportSecurity::Negotiated => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            }
            TransportSecurity::None => {
                Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
            }
            TransportSecurity::Opportunistic => TlsParameters::new(host.to_string()).map(|tls| {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .tls(Tls::Opportunistic(tls))
            }),
        }
        .map_err(|e| {
            TransportError::new(
                TransportErrorKind::ConnectionRefused,
                format!("Failed to create SMTP transport: {}", e),
            )
        })?;

        let mut builder = apply_settings(builder.port(port), settings);
        if !username.is_empty() {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            label: format!("{}:{}", host, port),
        })
    }
}

#[async_trait]
impl Transport for SmtpRelayTransport {
    async fn send(&self, envelope: &Envelope) -> Result<SendReceipt, TransportError> {
        let message_id = generate_message_id(&envelope.from_address);
        let message = build_message(envelope, &message_id)?;

        let response = self.mailer.send(message).await.map_err(map_smtp_error)?;
        debug!(relay = %self.label, code = %response.code(), "Relay accepted message");

        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcast_common::Attachment;

    fn envelope() -> Envelope {
        Envelope {
            to: "a@x.com".to_string(),
            original_recipient: "a@x.com".to_string(),
            from_name: "Team".to_string(),
            from_address: "team@example.com".to_string(),
            subject: "Hello Ada".to_string(),
            html: "<p>Hello Ada</p>".to_string(),
            text: "Hello Ada".to_string(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_build_message_alternative() {
        let message = build_message(&envelope(), "<id.1@example.com>").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/alternative"));
        assert!(!raw.contains("multipart/mixed"));
        assert!(raw.contains("<id.1@example.com>"));
        assert!(raw.contains("Subject: Hello Ada"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let mut env = envelope();
        env.attachments.push(Attachment {
            filename: "report_Ada.pdf".to_string(),
            content: b"%PDF-1.4".to_vec(),
        });
        let message = build_message(&env, "<id.2@example.com>").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("report_Ada.pdf"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mut env = envelope();
        env.to = "not an address".to_string();
        let err = build_message(&env, "<id.3@example.com>").unwrap_err();
        assert!(err.message.starts_with("Invalid to address"));
    }

    #[tokio::test]
    async fn test_relay_construction_per_port() {
        let settings = SmtpConfig::default();
        for port in [465, 587, 25, 2525] {
            let transport =
                SmtpRelayTransport::new("smtp.example.com", port, "user", "pass", &settings)
                    .unwrap();
            assert_eq!(transport.label, format!("smtp.example.com:{}", port));
        }
    }
}
