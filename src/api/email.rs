//! Outbound email abstractions and the admin notifier.
//!
//! Delivery is a plain `send(to, subject, body)` collaborator. Admin
//! notifications are best-effort: they are spawned off the request path,
//! and a failure is logged and recorded in the mail audit table without
//! ever failing the caller. Only the out-of-band verification code send is
//! allowed to surface a failure (the endpoint contract requires it).

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{Instrument, error, info};

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    ///
    /// # Errors
    /// Returns an error when delivery fails.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Sends mail and keeps the outbound-mail audit log.
#[derive(Clone)]
pub struct Mailer {
    sender: Arc<dyn EmailSender>,
    admin_email: String,
}

impl Mailer {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>, admin_email: String) -> Self {
        Self {
            sender,
            admin_email,
        }
    }

    /// Fire-and-forget admin notification. Failures are logged and audited,
    /// never surfaced to the request that triggered them.
    pub fn notify_admin(&self, pool: &PgPool, subject: String, body: String) {
        let mailer = self.clone();
        let pool = pool.clone();
        tokio::spawn(async move {
            let message = EmailMessage {
                to: mailer.admin_email.clone(),
                subject,
                body,
            };
            mailer.deliver_and_audit(&pool, &message).await;
        });
    }

    /// Send a verification code to a user. Unlike admin notifications this
    /// is awaited and its failure propagates to the caller.
    ///
    /// # Errors
    /// Returns an error when delivery fails.
    pub async fn send_code(&self, pool: &PgPool, to: &str, code: &str) -> Result<()> {
        let message = EmailMessage {
            to: to.to_string(),
            subject: "Your verification code".to_string(),
            body: format!("Your verification code is {code}. It expires shortly."),
        };

        let result = self.sender.send(&message);
        let status = if result.is_ok() { "sent" } else { "failed" };
        let detail = result.as_ref().err().map(ToString::to_string);
        if let Err(err) = insert_mail_log(pool, &message, status, detail.as_deref()).await {
            error!("failed to write mail audit log: {err}");
        }

        result.context("failed to send verification code")
    }

    async fn deliver_and_audit(&self, pool: &PgPool, message: &EmailMessage) {
        let result = self.sender.send(message);
        let status = if result.is_ok() { "sent" } else { "failed" };
        let detail = result.as_ref().err().map(ToString::to_string);

        if let Err(err) = &result {
            error!("failed to send admin notification: {err}");
        }
        if let Err(err) = insert_mail_log(pool, message, status, detail.as_deref()).await {
            error!("failed to write mail audit log: {err}");
        }
    }
}

async fn insert_mail_log(
    pool: &PgPool,
    message: &EmailMessage,
    status: &str,
    detail: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO mail_log (recipient, subject, status, detail)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&message.to)
        .bind(&message.subject)
        .bind(status)
        .bind(detail)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert mail log row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSender {
        sent: Mutex<Vec<EmailMessage>>,
        fail: bool,
    }

    impl EmailSender for RecordingSender {
        fn send(&self, message: &EmailMessage) -> Result<()> {
            if self.fail {
                anyhow::bail!("smtp unavailable");
            }
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(message.clone());
            }
            Ok(())
        }
    }

    #[test]
    fn log_sender_always_succeeds() {
        let sender = LogEmailSender;
        let message = EmailMessage {
            to: "admin@example.com".to_string(),
            subject: "test".to_string(),
            body: "body".to_string(),
        };
        assert!(sender.send(&message).is_ok());
    }

    #[test]
    fn recording_sender_captures_messages() {
        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: false,
        };
        let message = EmailMessage {
            to: "a@x.com".to_string(),
            subject: "code".to_string(),
            body: "123456".to_string(),
        };
        sender.send(&message).expect("send should succeed");
        let sent = sender.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
    }

    #[test]
    fn failing_sender_reports_error() {
        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: true,
        };
        let message = EmailMessage {
            to: "a@x.com".to_string(),
            subject: "code".to_string(),
            body: "123456".to_string(),
        };
        assert!(sender.send(&message).is_err());
    }
}
