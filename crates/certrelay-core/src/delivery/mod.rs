//! Delivery of the certificate bundle by email.
//!
//! The [`DeliveryAgent`] composes the message; a [`MailTransport`] moves it.
//! Live sending goes through [`ResendTransport`], test mode through
//! [`DryRunTransport`], which never touches the network.

pub mod dry_run;
pub mod resend;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bundle::Bundle;
use crate::error::DeliveryError;

pub use dry_run::DryRunTransport;
pub use resend::{ResendTransport, DEFAULT_RESEND_BASE_URL};

/// A fully composed message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Formatted From header (`Name <addr>` or bare address).
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

/// What the transport reports back after a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id; `None` for transports that do not assign one.
    pub message_id: Option<String>,
    pub recipients: usize,
}

/// Moves one message. One call is one attempt.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Sender address plus optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub address: String,
    pub display_name: Option<String>,
}

impl SenderIdentity {
    pub fn new(address: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            address: address.into(),
            display_name: display_name.filter(|name| !name.trim().is_empty()),
        }
    }

    /// `Name <addr>` when a display name is set, else the bare address.
    pub fn header(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{} <{}>", name.trim(), self.address),
            None => self.address.clone(),
        }
    }
}

pub fn subject_for(domain: &str) -> String {
    format!("SSL certificate renewal - {domain}")
}

/// Builds messages for a bundle and hands them to the transport.
pub struct DeliveryAgent {
    transport: Arc<dyn MailTransport>,
    sender: SenderIdentity,
}

impl DeliveryAgent {
    pub fn new(transport: Arc<dyn MailTransport>, sender: SenderIdentity) -> Self {
        Self { transport, sender }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// One delivery attempt. The attachment is read from disk on every call.
    pub async fn deliver(
        &self,
        bundle: &Bundle,
        domain: &str,
        recipients: &[String],
    ) -> Result<DeliveryReceipt, DeliveryError> {
        if recipients.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }

        let attachment = tokio::fs::read(&bundle.path)
            .await
            .map_err(|e| DeliveryError::Attachment {
                path: bundle.path.clone(),
                source: e,
            })?;

        let email = self.compose(bundle, domain, recipients, attachment);
        debug!(
            transport = self.transport.name(),
            recipients = email.to.len(),
            attachment = %email.attachment_name,
            "Sending certificate email"
        );
        self.transport.send(&email).await
    }

    fn compose(
        &self,
        bundle: &Bundle,
        domain: &str,
        recipients: &[String],
        attachment: Vec<u8>,
    ) -> OutgoingEmail {
        let size = human_size(attachment.len() as u64);
        let html = format!(
            "<html><body>\
             <h2>SSL certificate for {domain}</h2>\
             <p>The current certificate bundle for <strong>{domain}</strong> is attached.</p>\
             <ul>\
             <li>Domain: {domain}</li>\
             <li>File: {file}</li>\
             <li>Size: {size}</li>\
             </ul>\
             <p>The archive contains the private key and the full certificate chain. \
             Store it securely.</p>\
             </body></html>",
            domain = domain,
            file = bundle.file_name,
            size = size,
        );
        let text = format!(
            "SSL certificate for {domain}\n\n\
             The current certificate bundle for {domain} is attached.\n\n\
             Domain: {domain}\n\
             File: {file}\n\
             Size: {size}\n\n\
             The archive contains the private key and the full certificate chain. \
             Store it securely.\n",
            domain = domain,
            file = bundle.file_name,
            size = size,
        );

        OutgoingEmail {
            from: self.sender.header(),
            to: recipients.to_vec(),
            subject: subject_for(domain),
            html,
            text,
            attachment_name: bundle.file_name.clone(),
            attachment,
        }
    }
}

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingTransport;
    use tempfile::tempdir;

    fn bundle_at(dir: &std::path::Path) -> Bundle {
        let path = dir.join("ssl_cert_example.com_20260314_092653.zip");
        std::fs::write(&path, vec![7u8; 2048]).unwrap();
        Bundle {
            path,
            file_name: "ssl_cert_example.com_20260314_092653.zip".to_string(),
            size_bytes: 2048,
            sha256: String::new(),
            entries: vec!["privkey.pem".to_string(), "fullchain.pem".to_string()],
        }
    }

    #[test]
    fn test_sender_header() {
        let named = SenderIdentity::new("certs@example.com", Some("Cert Bot".to_string()));
        assert_eq!(named.header(), "Cert Bot <certs@example.com>");

        let bare = SenderIdentity::new("certs@example.com", Some("  ".to_string()));
        assert_eq!(bare.header(), "certs@example.com");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[tokio::test]
    async fn test_deliver_composes_message() {
        let dir = tempdir().unwrap();
        let bundle = bundle_at(dir.path());
        let transport = Arc::new(RecordingTransport::new());
        let agent = DeliveryAgent::new(
            transport.clone(),
            SenderIdentity::new("certs@example.com", Some("Cert Bot".to_string())),
        );
        let recipients = vec!["a@example.com".to_string(), "b@example.com".to_string()];

        let receipt = agent.deliver(&bundle, "example.com", &recipients).await.unwrap();
        assert_eq!(receipt.recipients, 2);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let email = &sent[0];
        assert_eq!(email.from, "Cert Bot <certs@example.com>");
        assert_eq!(email.to, recipients);
        assert_eq!(email.subject, "SSL certificate renewal - example.com");
        assert_eq!(email.attachment.len(), 2048);
        assert!(email.html.contains(&bundle.file_name));
        assert!(email.text.contains("Size: 2.0 KiB"));
    }

    #[tokio::test]
    async fn test_no_recipients_never_reaches_transport() {
        let dir = tempdir().unwrap();
        let bundle = bundle_at(dir.path());
        let transport = Arc::new(RecordingTransport::new());
        let agent = DeliveryAgent::new(transport.clone(), SenderIdentity::new("certs@example.com", None));

        let err = agent.deliver(&bundle, "example.com", &[]).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NoRecipients));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_attachment() {
        let dir = tempdir().unwrap();
        let bundle = bundle_at(dir.path());
        std::fs::remove_file(&bundle.path).unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let agent = DeliveryAgent::new(transport.clone(), SenderIdentity::new("certs@example.com", None));

        let err = agent
            .deliver(&bundle, "example.com", &["a@example.com".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Attachment { .. }));
        assert_eq!(transport.calls(), 0);
    }
}
