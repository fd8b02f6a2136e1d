// Stripe card payments: intent creation, webhook and refunds

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::extract::ValidJson;
use crate::api::handlers::donations::{apply_transition, donatable_program, new_donation};
use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::auth::auth_middleware::{AdminUser, AuthUser};
use crate::core::errors::AppError;
use crate::core::impact::TransitionTrigger;
use crate::core::models::{Donation, DonationStatus, PaymentMethod};
use crate::core::requests::DonationRequest;
use crate::payments::webhook::{verify_signature, StripeEvent, WebhookAction, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER};
use crate::payments::{CreateIntent, Refund};

/// Stripe retries deliveries for up to three days
const EVENT_DEDUP_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

#[derive(Debug, Serialize)]
pub struct StripeConfigResponse {
    pub publishable_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub donation_id: Uuid,
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund: Refund,
    pub donation: Donation,
}

/// GET /api/stripe/config
pub async fn config(State(state): State<AppState>) -> Json<StripeConfigResponse> {
    Json(StripeConfigResponse {
        publishable_key: state.config.stripe_publishable_key.clone(),
    })
}

/// POST /api/stripe/create-payment-intent
///
/// Creates the pending card donation first so the intent metadata can
/// reference it. If Stripe refuses, the donation is marked failed.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    ValidJson(request): ValidJson<DonationRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let request = request.validate()?;
    let program = donatable_program(&state, request.program_id).await?;

    let user_id = user.map(|AuthUser(u)| u.id);
    let donation = state
        .donations
        .create(new_donation(request, user_id, PaymentMethod::Card))
        .await?;

    let intent = CreateIntent {
        amount_cents: donation.amount_cents,
        currency: donation.currency.clone(),
        donation_id: donation.id,
        program_id: donation.program_id,
        frequency: donation.frequency,
        receipt_email: donation.donor_email.clone(),
        description: match &program {
            Some(program) => format!("Donation to {}", program.title),
            None => "Donation to Gifted Giving".to_string(),
        },
    };

    let created = match state.payments.create_payment_intent(intent).await {
        Ok(created) => created,
        Err(e) => {
            error!(donation_id = %donation.id, error = %e, "Payment intent creation failed");
            if let Err(mark_err) = apply_transition(
                &state,
                donation.id,
                DonationStatus::Failed,
                TransitionTrigger::Gateway,
                Some(e.user_message()),
            )
            .await
            {
                warn!(donation_id = %donation.id, error = %mark_err, "Could not mark donation failed");
            }
            return Err(e.into());
        }
    };

    state
        .donations
        .attach_payment_intent(donation.id, &created.id)
        .await?;

    Ok(Json(PaymentIntentResponse {
        client_secret: created.client_secret,
        donation_id: donation.id,
        payment_intent_id: created.id,
    }))
}

/// POST /api/stripe/webhook
///
/// Verified against the raw body. Each event id is processed once; a
/// processing error releases the marker so Stripe's retry is handled.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::WebhookSignature("Missing Stripe-Signature header".to_string()))?;

    verify_signature(
        &body,
        signature,
        state.config.stripe_webhook_secret.expose_secret(),
        DEFAULT_TOLERANCE_SECS,
        Utc::now(),
    )?;
    let event = StripeEvent::parse(&body)?;

    let marker = format!("stripe:event:{}", event.id);
    match state.ephemeral.mark_once(&marker, EVENT_DEDUP_TTL).await {
        Ok(true) => {}
        Ok(false) => {
            info!(event_id = %event.id, "Duplicate webhook event ignored");
            record(&state, &event, "duplicate");
            return Ok(Json(json!({ "received": true })));
        }
        // transitions are idempotent, so processing without the marker is safe
        Err(e) => warn!(event_id = %event.id, error = %e, "Webhook de-duplication unavailable"),
    }

    match handle_event(&state, &event).await {
        Ok(outcome) => {
            info!(event_id = %event.id, event_type = %event.event_type, outcome = outcome, "Webhook processed");
            record(&state, &event, outcome);
            Ok(Json(json!({ "received": true })))
        }
        Err(e) => {
            record(&state, &event, "error");
            if let Err(release_err) = state.ephemeral.release(&marker).await {
                warn!(event_id = %event.id, error = %release_err, "Could not release webhook marker");
            }
            Err(e.into())
        }
    }
}

fn record(state: &AppState, event: &StripeEvent, outcome: &str) {
    state
        .metrics
        .webhook_events
        .with_label_values(&[event.event_type.as_str(), outcome])
        .inc();
}

/// Apply one event; the returned label describes what happened
async fn handle_event(state: &AppState, event: &StripeEvent) -> Result<&'static str, AppError> {
    let (payment_intent_id, to, reason) = match event.action() {
        WebhookAction::Complete { payment_intent_id } => (payment_intent_id, DonationStatus::Completed, None),
        WebhookAction::Fail {
            payment_intent_id,
            reason,
        } => (payment_intent_id, DonationStatus::Failed, Some(reason)),
        WebhookAction::Refund { payment_intent_id } => (payment_intent_id, DonationStatus::Refunded, None),
        WebhookAction::Ignore => return Ok("ignored"),
    };

    let Some(donation) = state.donations.find_by_payment_intent(&payment_intent_id).await? else {
        warn!(payment_intent_id = %payment_intent_id, "Webhook for unknown payment intent");
        return Ok("unknown_intent");
    };

    match apply_transition(state, donation.id, to, TransitionTrigger::Gateway, reason).await {
        Ok(transition) if transition.changed => Ok("applied"),
        Ok(_) => Ok("unchanged"),
        // out-of-order events cannot succeed on retry; acknowledge them
        Err(AppError::Conflict(msg)) => {
            warn!(donation_id = %donation.id, reason = %msg, "Webhook transition rejected");
            Ok("conflict")
        }
        Err(e) => Err(e),
    }
}

/// POST /api/stripe/refund/:id
pub async fn refund(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RefundResponse>, ApiError> {
    let donation = state
        .donations
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Donation".to_string()))?;

    if donation.status != DonationStatus::Completed {
        return Err(AppError::Conflict("Only completed donations can be refunded".to_string()).into());
    }
    let payment_intent_id = match (&donation.payment_method, &donation.stripe_payment_intent_id) {
        (PaymentMethod::Card, Some(pi)) => pi.clone(),
        _ => {
            return Err(AppError::BadRequest("Donation has no card payment to refund".to_string()).into())
        }
    };

    let refund = state.payments.refund(&payment_intent_id).await?;
    let transition = apply_transition(
        &state,
        donation.id,
        DonationStatus::Refunded,
        TransitionTrigger::Manual,
        None,
    )
    .await?;
    info!(donation_id = %donation.id, admin_id = %admin.id, refund_id = %refund.id, "Donation refunded");

    Ok(Json(RefundResponse {
        refund,
        donation: transition.donation,
    }))
}
