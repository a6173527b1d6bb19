use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use html_escape::encode_text;
use serde::Serialize;
use serde_json::json;

use crate::model::account::Account;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Writes every message to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "email (not delivered, log mailer)");
        Ok(())
    }
}

/// Posts each message as JSON to a mail relay.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpMailer {
    /// `timeout` bounds each request to the relay, connect included.
    pub fn new(
        endpoint: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("failed to build the mail relay client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        self.client
            .post(&self.endpoint)
            .json(&json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .with_context(|| format!("mail relay unreachable at {}", self.endpoint))?
            .error_for_status()
            .context("mail relay rejected the message")?;
        Ok(())
    }
}

/// Sends and forgets. Delivery problems are logged, never returned, and a
/// relay that does not answer within `timeout` is abandoned.
pub async fn deliver(mailer: &dyn Mailer, email: Email, timeout: Duration) {
    match tokio::time::timeout(timeout, mailer.send(&email)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(error = %e, to = %email.to, subject = %email.subject, "email delivery failed")
        }
        Err(_) => tracing::warn!(
            to = %email.to,
            subject = %email.subject,
            timeout_ms = timeout.as_millis() as u64,
            "email delivery timed out"
        ),
    }
}

pub fn approval_required(admin: &Account, client: &Account) -> Email {
    Email {
        to: admin.email.clone(),
        subject: "New Client Registration - Approval Required".to_string(),
        html: format!(
            "<h2>New client registration</h2>\
             <p>Hello {admin},</p>\
             <p><strong>{name}</strong> ({email}) registered as a client and is waiting for approval.</p>\
             <p>Review the request from the admin dashboard.</p>",
            admin = encode_text(&admin.name),
            name = encode_text(&client.name),
            email = encode_text(&client.email),
        ),
    }
}

pub fn account_approved(client: &Account) -> Email {
    Email {
        to: client.email.clone(),
        subject: "Account Approved - Welcome to OfficeSphere!".to_string(),
        html: format!(
            "<h2>Welcome to OfficeSphere</h2>\
             <p>Hello {name},</p>\
             <p>Your account has been approved. You can now sign in with {email}.</p>",
            name = encode_text(&client.name),
            email = encode_text(&client.email),
        ),
    }
}

pub fn registration_rejected(client: &Account) -> Email {
    Email {
        to: client.email.clone(),
        subject: "OfficeSphere - Registration Update".to_string(),
        html: format!(
            "<p>Hello {name},</p>\
             <p>We were unable to approve your registration at this time. \
             Please contact the office administrator for details.</p>",
            name = encode_text(&client.name),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{account::AccountStatus, role::Role};
    use chrono::Utc;
    use tracing_test::traced_test;

    struct Broken;

    #[async_trait]
    impl Mailer for Broken {
        async fn send(&self, _: &Email) -> anyhow::Result<()> {
            anyhow::bail!("relay down")
        }
    }

    struct Silent;

    #[async_trait]
    impl Mailer for Silent {
        async fn send(&self, _: &Email) -> anyhow::Result<()> {
            futures::future::pending().await
        }
    }

    fn client() -> Account {
        Account {
            id: 9,
            name: "Acme Ltd".to_string(),
            email: "ops@acme.test".to_string(),
            password_hash: String::new(),
            role: Role::Client,
            status: AccountStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn approval_mail_goes_to_the_client() {
        let email = account_approved(&client());
        assert_eq!(email.to, "ops@acme.test");
        assert!(email.html.contains("Acme Ltd"));
    }

    #[test]
    fn names_are_escaped_in_the_body() {
        let mut client = client();
        client.name = "<script>alert(1)</script> & Co".to_string();
        let email = approval_required(&client, &client);
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; Co"));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_delivery_is_logged_not_returned() {
        deliver(&Broken, account_approved(&client()), Duration::from_secs(1)).await;
        assert!(logs_contain("email delivery failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn silent_relay_is_abandoned_after_the_timeout() {
        let started = std::time::Instant::now();
        deliver(&Silent, account_approved(&client()), Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(logs_contain("email delivery timed out"));
    }
}
