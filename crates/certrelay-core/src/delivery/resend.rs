//! Live transport: the Resend transactional email HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DeliveryReceipt, MailTransport, OutgoingEmail};
use crate::error::DeliveryError;

pub const DEFAULT_RESEND_BASE_URL: &str = "https://api.resend.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    attachments: Vec<Attachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    filename: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
    name: Option<String>,
}

/// Sends through `POST {base_url}/emails` with a bearer API key.
pub struct ResendTransport {
    api_key: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for ResendTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ResendTransport {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("certrelay/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key: api_key.into(),
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MailTransport for ResendTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError> {
        let body = SendRequest {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
            attachments: vec![Attachment {
                filename: &email.attachment_name,
                content: BASE64.encode(&email.attachment),
            }],
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Provider {
                status: status.as_u16(),
                message: provider_message(&raw),
            });
        }

        let parsed: SendResponse = response.json().await?;
        debug!(message_id = ?parsed.id, "Resend accepted message");
        Ok(DeliveryReceipt {
            message_id: parsed.id,
            recipients: email.to.len(),
        })
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}

/// Prefer the provider's structured error message over the raw body.
fn provider_message(raw: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(raw) {
        Ok(ErrorResponse {
            message: Some(message),
            name,
        }) => match name {
            Some(name) => format!("{name}: {message}"),
            None => message,
        },
        _ if raw.trim().is_empty() => "empty response body".to_string(),
        _ => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let transport = ResendTransport::new("re_test", "https://api.resend.com/").unwrap();
        assert_eq!(transport.endpoint(), "https://api.resend.com/emails");
        assert!(!format!("{transport:?}").contains("re_test"));
    }

    #[test]
    fn test_provider_message() {
        assert_eq!(
            provider_message(r#"{"statusCode":422,"name":"validation_error","message":"Invalid `to` field"}"#),
            "validation_error: Invalid `to` field"
        );
        assert_eq!(provider_message("upstream down"), "upstream down");
        assert_eq!(provider_message(""), "empty response body");
    }
}
