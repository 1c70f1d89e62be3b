//! Test-mode transport: log what would be sent, send nothing.

use async_trait::async_trait;
use tracing::info;

use super::{DeliveryReceipt, MailTransport, OutgoingEmail};
use crate::error::DeliveryError;

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTransport;

impl DryRunTransport {
    pub fn new() -> Self {
        Self
    }

    /// Human-readable summary of the message, one recipient per line.
    pub fn preview(email: &OutgoingEmail) -> String {
        let mut preview = format!(
            "[TEST MODE] email not sent\n  subject: {}\n  from: {}\n  attachment: {} ({} bytes)\n  recipients ({}):",
            email.subject,
            email.from,
            email.attachment_name,
            email.attachment.len(),
            email.to.len(),
        );
        for recipient in &email.to {
            preview.push_str("\n    - ");
            preview.push_str(recipient);
        }
        preview
    }
}

#[async_trait]
impl MailTransport for DryRunTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError> {
        info!(
            subject = %email.subject,
            from = %email.from,
            recipients = ?email.to,
            attachment = %email.attachment_name,
            attachment_bytes = email.attachment.len(),
            "{}",
            Self::preview(email)
        );
        Ok(DeliveryReceipt {
            message_id: None,
            recipients: email.to.len(),
        })
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}
