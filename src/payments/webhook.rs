// Stripe webhook verification and event classification

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::core::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix>,v1=<hex>` signatures
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed payload, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// The signed payload is `"{t}.{body}"`. Any `v1` entry may match; the
/// timestamp must be within `tolerance_secs` of `now` in either direction.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse().map_err(|_| {
                    AppError::WebhookSignature(format!("Invalid timestamp '{}'", value))
                })?)
            }
            // malformed hex entries are skipped, another v1 may still match
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| AppError::WebhookSignature("Missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::WebhookSignature("No v1 signature".to_string()));
    }
    if (now.timestamp() - timestamp).abs() > tolerance_secs {
        return Err(AppError::WebhookSignature(format!(
            "Timestamp {} outside tolerance of {}s",
            timestamp, tolerance_secs
        )));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::ConfigurationError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok());
    if matched {
        Ok(())
    } else {
        Err(AppError::WebhookSignature(
            "No signature matches the payload".to_string(),
        ))
    }
}

/// Build a header Stripe would send for `payload` at `timestamp`
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::ConfigurationError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))
    }

    /// Map the event onto a donation status change
    pub fn action(&self) -> WebhookAction {
        let object = &self.data.object;
        let field = |name: &str| object.get(name).and_then(|v| v.as_str()).map(str::to_string);

        match self.event_type.as_str() {
            "payment_intent.succeeded" => match field("id") {
                Some(payment_intent_id) => WebhookAction::Complete { payment_intent_id },
                None => WebhookAction::Ignore,
            },
            "payment_intent.payment_failed" => match field("id") {
                Some(payment_intent_id) => WebhookAction::Fail {
                    payment_intent_id,
                    reason: object
                        .pointer("/last_payment_error/message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("Payment failed")
                        .to_string(),
                },
                None => WebhookAction::Ignore,
            },
            "charge.refunded" => match field("payment_intent") {
                Some(payment_intent_id) => WebhookAction::Refund { payment_intent_id },
                None => WebhookAction::Ignore,
            },
            _ => WebhookAction::Ignore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    Complete { payment_intent_id: String },
    Fail { payment_intent_id: String, reason: String },
    Refund { payment_intent_id: String },
    Ignore,
}

impl WebhookAction {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookAction::Complete { .. } => "complete",
            WebhookAction::Fail { .. } => "fail",
            WebhookAction::Refund { .. } => "refund",
            WebhookAction::Ignore => "ignore",
        }
    }
}
