//! Outbound notifications. Delivery is best effort: callers log failures and
//! carry on.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail service responded with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

/// Posts the message as JSON to an HTTP mail API.
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let response = self.client.post(&self.url).json(&email).send().await?;
        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status()));
        }
        tracing::info!(to = %email.to, subject = %email.subject, "email dispatched");
        Ok(())
    }
}

/// Used when no mail service is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "no mail service configured, email not sent"
        );
        Ok(())
    }
}

pub fn from_config(config: &Config) -> MailerState {
    match &config.mail_webhook_url {
        Some(url) => Arc::new(WebhookMailer::new(url.clone())),
        None => Arc::new(LogMailer),
    }
}

pub fn access_granted(
    config: &Config,
    to: &str,
    student_name: &str,
    course_id: &str,
    course_title: &str,
) -> Email {
    let first_name = student_name.split_whitespace().next().unwrap_or(student_name);
    let classroom_url = format!("{}/classroom/{course_id}", config.frontend_url);

    Email {
        from: config.mail_from.clone(),
        to: to.to_string(),
        subject: format!("Access Granted: {course_title}"),
        html: format!(
            "<h1>Hello {},</h1>\
             <p>Your access to <b>{}</b> has been granted!</p>\
             <a href=\"{}\">Enter Classroom</a>",
            escape_html(first_name),
            escape_html(course_title),
            escape_html(&classroom_url),
        ),
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
