//! HTTP mail-send API transport

use super::{generate_message_id, Envelope, SendReceipt, Transport, TransportError, TransportErrorKind};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const SEND_PATH: &str = "/v3/mail/send";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ApiAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiAttachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    content_type: &'static str,
    disposition: &'static str,
}

impl<'a> SendRequest<'a> {
    fn from_envelope(envelope: &'a Envelope) -> Self {
        let name = Some(envelope.from_name.trim()).filter(|n| !n.is_empty());
        Self {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &envelope.to,
                    name: None,
                }],
            }],
            from: Address {
                email: &envelope.from_address,
                name,
            },
            subject: &envelope.subject,
            content: vec![
                Content {
                    content_type: "text/plain",
                    value: &envelope.text,
                },
                Content {
                    content_type: "text/html",
                    value: &envelope.html,
                },
            ],
            attachments: envelope
                .attachments
                .iter()
                .map(|a| ApiAttachment {
                    content: BASE64.encode(&a.content),
                    filename: &a.filename,
                    content_type: "application/octet-stream",
                    disposition: "attachment",
                })
                .collect(),
        }
    }
}

/// Map a non-success HTTP status onto the delivery taxonomy
fn classify_status(status: StatusCode) -> TransportErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => TransportErrorKind::ServiceUnavailable,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => TransportErrorKind::Timeout,
        s if s.is_server_error() => TransportErrorKind::ServiceUnavailable,
        s if s.is_client_error() => TransportErrorKind::PolicyRejected,
        _ => TransportErrorKind::Unknown,
    }
}

fn classify_request_error(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else {
        TransportErrorKind::classify(&err.to_string())
    }
}

/// Sends through a mail-send HTTP API with a bearer key
pub struct HttpApiTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpApiTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            TransportError::new(
                TransportErrorKind::Unknown,
                format!("Failed to create HTTP client: {}", e),
            )
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpApiTransport {
    async fn send(&self, envelope: &Envelope) -> Result<SendReceipt, TransportError> {
        let url = format!("{}{}", self.base_url, SEND_PATH);
        let body = SendRequest::from_envelope(envelope);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Mail API request failed: {}", e);
                TransportError::new(
                    classify_request_error(&e),
                    format!("Mail API request failed: {}", e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                warn!("Failed to read mail API error body: {}", e);
                String::new()
            });
            return Err(TransportError::new(
                classify_status(status),
                format!("Mail API returned status {}: {}", status, body),
            ));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| generate_message_id(&envelope.from_address));
        debug!(status = %status, message_id = %message_id, "Mail API accepted message");

        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailcast_common::Attachment;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope() -> Envelope {
        Envelope {
            to: "a@x.com".to_string(),
            original_recipient: "a@x.com".to_string(),
            from_name: "Team".to_string(),
            from_address: "team@example.com".to_string(),
            subject: "Hello".to_string(),
            html: "<p>Hello</p>".to_string(),
            text: "Hello".to_string(),
            attachments: vec![Attachment {
                filename: "a.txt".to_string(),
                content: b"hi".to_vec(),
            }],
        }
    }

    #[tokio::test]
    async fn test_send_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(bearer_token("SG.key"))
            .and(body_partial_json(serde_json::json!({
                "personalizations": [{"to": [{"email": "a@x.com"}]}],
                "from": {"email": "team@example.com", "name": "Team"},
                "subject": "Hello",
                "attachments": [{"content": "aGk=", "filename": "a.txt"}]
            })))
            .respond_with(ResponseTemplate::new(202).insert_header("X-Message-Id", "abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            HttpApiTransport::new(server.uri(), "SG.key", Duration::from_secs(5)).unwrap();
        let receipt = transport.send(&envelope()).await.unwrap();
        assert_eq!(receipt.message_id, "abc123");
    }

    #[tokio::test]
    async fn test_send_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let transport =
            HttpApiTransport::new(format!("{}/", server.uri()), "wrong", Duration::from_secs(5))
                .unwrap();
        let err = transport.send(&envelope()).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Authentication);
        assert!(err.message.contains("bad key"));
    }

    #[tokio::test]
    async fn test_send_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let transport =
            HttpApiTransport::new(server.uri(), "key", Duration::from_secs(5)).unwrap();
        let err = transport.send(&envelope()).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::ServiceUnavailable);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::FORBIDDEN), TransportErrorKind::Authentication);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), TransportErrorKind::PolicyRejected);
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            TransportErrorKind::ServiceUnavailable
        );
    }
}
