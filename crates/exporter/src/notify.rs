//! Email notification seam.
//!
//! The worker only depends on the [`Notifier`] contract: deliver either a
//! download link or the export itself as an attachment, together with a
//! human-readable stats summary. Failures are logged, never propagated —
//! notification problems must not fail a completed job.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

/// Errors constructing a notifier.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid sender address: {0}")]
    InvalidSender(String),

    #[error("smtp transport setup failed: {0}")]
    Transport(String),
}

/// Delivery contract for completed exports.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a completion mail carrying a download link.
    async fn send_download_link(&self, email: &str, download_url: &str, stats: &str);

    /// Sends a completion mail with the export attached.
    async fn send_with_attachment(&self, email: &str, filename: &str, content: Vec<u8>, stats: &str);
}

/// Development notifier that logs instead of sending.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_download_link(&self, email: &str, download_url: &str, stats: &str) {
        tracing::info!(to = email, url = download_url, stats, "email sent");
    }

    async fn send_with_attachment(
        &self,
        email: &str,
        filename: &str,
        content: Vec<u8>,
        stats: &str,
    ) {
        tracing::info!(
            to = email,
            filename,
            size = content.len(),
            stats,
            "email sent with attachment"
        );
    }
}

/// SMTP notifier.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        from: &str,
    ) -> Result<Self, NotifyError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);
        if !user.is_empty() && !password.is_empty() {
            builder = builder.credentials(Credentials::new(user.to_string(), password.to_string()));
        }
        let from: Mailbox = from
            .parse()
            .map_err(|_| NotifyError::InvalidSender(from.to_string()))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn recipient(&self, email: &str) -> Option<Mailbox> {
        match email.parse() {
            Ok(mailbox) => Some(mailbox),
            Err(_) => {
                tracing::error!(to = email, "invalid recipient address, dropping email");
                None
            }
        }
    }

    async fn deliver(&self, email: &str, message: Message) {
        match self.transport.send(message).await {
            Ok(_) => tracing::info!(to = email, "email sent"),
            Err(e) => tracing::error!(to = email, error = %e, "failed to send email"),
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_download_link(&self, email: &str, download_url: &str, stats: &str) {
        let Some(to) = self.recipient(email) else {
            return;
        };
        let body = format!(
            "Hello,\n\nYour export job has completed successfully.\n\nStats: {}\n\n\
             Download Link:\n{}\n\nThis link will expire depending on your storage policy.\n",
            stats, download_url
        );
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your Database Export is Ready")
            .body(body);
        match message {
            Ok(message) => self.deliver(email, message).await,
            Err(e) => tracing::error!(to = email, error = %e, "failed to build email"),
        }
    }

    async fn send_with_attachment(
        &self,
        email: &str,
        filename: &str,
        content: Vec<u8>,
        stats: &str,
    ) {
        let Some(to) = self.recipient(email) else {
            return;
        };
        let body = format!(
            "Hello,\n\nYour export job has completed successfully.\n\nStats: {}\n\n\
             Please find the export attached.\n",
            stats
        );

        let attachment = Attachment::new(filename.to_string())
            .body(content, attachment_content_type(filename));

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your Database Export is Ready (Attached)")
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(attachment),
            );
        match message {
            Ok(message) => self.deliver(email, message).await,
            Err(e) => tracing::error!(to = email, error = %e, "failed to build email"),
        }
    }
}

fn attachment_content_type(filename: &str) -> ContentType {
    let mime = if filename.ends_with(".csv") {
        "text/csv"
    } else if filename.ends_with(".gz") {
        "application/gzip"
    } else {
        "application/octet-stream"
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_content_types() {
        assert_eq!(
            attachment_content_type("exports/a.csv"),
            ContentType::parse("text/csv").unwrap()
        );
        assert_eq!(
            attachment_content_type("exports/a.csv.gz"),
            ContentType::parse("application/gzip").unwrap()
        );
        assert_eq!(
            attachment_content_type("exports/a.xlsx"),
            ContentType::parse("application/octet-stream").unwrap()
        );
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let result = SmtpNotifier::new("localhost", 1025, "", "", "not an address");
        assert!(matches!(result, Err(NotifyError::InvalidSender(_))));
    }

    #[tokio::test]
    async fn test_log_notifier_is_infallible() {
        let notifier = LogNotifier;
        notifier
            .send_download_link("user@example.com", "file:///tmp/x.csv", "rows: 1")
            .await;
        notifier
            .send_with_attachment("user@example.com", "x.csv", b"id\n".to_vec(), "rows: 1")
            .await;
    }
}
