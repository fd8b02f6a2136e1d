// Card payments through Stripe

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::AppError;
use crate::core::models::DonationFrequency;

/// Everything needed to open a payment intent for one pending donation
#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub amount_cents: i64,
    pub currency: String,
    pub donation_id: Uuid,
    pub program_id: Option<Uuid>,
    pub frequency: DonationFrequency,
    pub receipt_email: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub status: String,
}

/// Payment provider seam
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, intent: CreateIntent) -> Result<PaymentIntent, AppError>;

    /// Full refund of the charge behind `payment_intent_id`
    async fn refund(&self, payment_intent_id: &str) -> Result<Refund, AppError>;
}
