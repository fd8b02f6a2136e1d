// Mail transports: HTTP relay, or the log when no relay is configured

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info};

use crate::core::errors::AppError;
use crate::notify::{Mailer, OutgoingEmail};

/// Posts each message as JSON to a mail relay
pub struct HttpMailer {
    http_client: Client,
    relay_url: String,
}

impl HttpMailer {
    pub fn new(relay_url: &str, timeout_secs: u64) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            relay_url: relay_url.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        let response = self
            .http_client
            .post(&self.relay_url)
            .json(email)
            .send()
            .await
            .map_err(|e| AppError::DependencyFailure {
                service: "mail".to_string(),
                error: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Mail relay returned HTTP error");
            return Err(AppError::DependencyFailure {
                service: "mail".to_string(),
                error: format!("HTTP {}", status),
            });
        }
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            bytes = email.html.len(),
            "Email not delivered (no MAIL_RELAY_URL); logged only"
        );
        Ok(())
    }
}
