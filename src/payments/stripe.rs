// Stripe REST client (form-encoded API, bearer auth)

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::errors::AppError;
use crate::core::resilience::{create_circuit_breaker, execute_with_cb, ServiceCircuitBreaker};
use crate::payments::{CreateIntent, PaymentGateway, PaymentIntent, Refund};

const SERVICE: &str = "stripe";

/// Stripe's error envelope: `{"error": {"type", "message", "code"}}`
#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StripeApiError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

pub struct StripeClient {
    http_client: Client,
    api_base: String,
    secret_key: Secret<String>,
    default_timeout: Duration,
    cb: ServiceCircuitBreaker,
}

impl StripeClient {
    pub fn new(api_base: &str, secret_key: Secret<String>, timeout_secs: u64) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(timeout_secs);

        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
            default_timeout: timeout,
            cb: create_circuit_breaker(),
        })
    }

    /// Declines are reported to the donor, everything else is an upstream failure
    pub(crate) fn map_api_error(status: u16, error: &StripeApiError) -> AppError {
        let message = error
            .message
            .clone()
            .unwrap_or_else(|| "Payment could not be processed".to_string());

        if error.kind == "card_error" {
            AppError::PaymentDeclined(message)
        } else {
            AppError::DependencyFailure {
                service: SERVICE.to_string(),
                error: format!(
                    "HTTP {} {} ({}): {}",
                    status,
                    error.kind,
                    error.code.as_deref().unwrap_or("no code"),
                    message
                ),
            }
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        idempotency_key: &str,
        form: &[(String, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.api_base, path);
        debug!(url = %url, "Calling Stripe");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::TransientError(format!(
                        "Stripe request timeout after {}s",
                        self.default_timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    AppError::DependencyFailure {
                        service: SERVICE.to_string(),
                        error: "Connection failed".to_string(),
                    }
                } else {
                    AppError::DependencyFailure {
                        service: SERVICE.to_string(),
                        error: format!("HTTP request failed: {}", e),
                    }
                }
            })?;

        Self::read_response(path, response).await
    }

    async fn read_response<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, AppError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::DependencyFailure {
            service: SERVICE.to_string(),
            error: format!("Failed to read response: {}", e),
        })?;

        if !status.is_success() {
            return match serde_json::from_str::<StripeErrorBody>(&body) {
                Ok(parsed) => {
                    let err = Self::map_api_error(status.as_u16(), &parsed.error);
                    if matches!(err, AppError::PaymentDeclined(_)) {
                        warn!(path = %path, code = ?parsed.error.code, "Stripe declined the payment");
                    } else {
                        error!(status = %status, path = %path, error = %err, "Stripe returned an error");
                    }
                    Err(err)
                }
                Err(_) => {
                    error!(status = %status, path = %path, "Stripe returned an unreadable error");
                    Err(AppError::DependencyFailure {
                        service: SERVICE.to_string(),
                        error: format!("HTTP {}", status),
                    })
                }
            };
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, path = %path, "Failed to parse Stripe response");
            AppError::DependencyFailure {
                service: SERVICE.to_string(),
                error: format!("Failed to parse response: {}", e),
            }
        })
    }
}

fn intent_form(intent: &CreateIntent) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), intent.amount_cents.to_string()),
        ("currency".to_string(), intent.currency.clone()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ("receipt_email".to_string(), intent.receipt_email.clone()),
        ("description".to_string(), intent.description.clone()),
        ("metadata[donation_id]".to_string(), intent.donation_id.to_string()),
        ("metadata[frequency]".to_string(), intent.frequency.to_string()),
    ];
    if let Some(program_id) = intent.program_id {
        form.push(("metadata[program_id]".to_string(), program_id.to_string()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(&self, intent: CreateIntent) -> Result<PaymentIntent, AppError> {
        let form = intent_form(&intent);
        let key = format!("donation-{}", intent.donation_id);

        let created: PaymentIntent = execute_with_cb(&self.cb, SERVICE, || async {
            self.post_form("/v1/payment_intents", &key, &form).await
        })
        .await?;

        info!(
            donation_id = %intent.donation_id,
            payment_intent_id = %created.id,
            amount_cents = intent.amount_cents,
            "Payment intent created"
        );
        Ok(created)
    }

    async fn refund(&self, payment_intent_id: &str) -> Result<Refund, AppError> {
        let form = vec![("payment_intent".to_string(), payment_intent_id.to_string())];
        let key = format!("refund-{}", payment_intent_id);

        let refund: Refund = execute_with_cb(&self.cb, SERVICE, || async {
            self.post_form("/v1/refunds", &key, &form).await
        })
        .await?;

        info!(
            payment_intent_id = %payment_intent_id,
            refund_id = %refund.id,
            status = %refund.status,
            "Refund created"
        );
        Ok(refund)
    }
}
