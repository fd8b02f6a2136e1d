// Donations: offline pledges, listings, statistics and status changes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::extract::ValidJson;
use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::auth::auth_middleware::{AdminUser, AuthUser};
use crate::core::errors::AppError;
use crate::core::impact::TransitionTrigger;
use crate::core::models::{Donation, DonationStatus, PaymentMethod, Program, PublicDonation};
use crate::core::pagination::{Page, PageParams, PageRequest};
use crate::core::requests::{DonationRequest, DonationStatusRequest};
use crate::core::stats::DonationStats;
use crate::store::{DonationFilter, DonorKey, NewDonation, Transition};

const RECENT_DONATIONS: i64 = 10;
pub(crate) const DEFAULT_CURRENCY: &str = "usd";

/// Load the program a donation targets and make sure it takes donations
pub(crate) async fn donatable_program(state: &AppState, program_id: Option<Uuid>) -> Result<Option<Program>, AppError> {
    let Some(program_id) = program_id else {
        return Ok(None);
    };
    let program = state
        .programs
        .find(program_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Program".to_string()))?;
    if !program.accepts_donations() {
        return Err(AppError::BadRequest(
            "This program is not accepting donations".to_string(),
        ));
    }
    Ok(Some(program))
}

pub(crate) fn new_donation(request: DonationRequest, user_id: Option<Uuid>, method: PaymentMethod) -> NewDonation {
    NewDonation {
        user_id,
        program_id: request.program_id,
        frequency: request.frequency(),
        donor_name: request.donor_name,
        donor_email: request.donor_email,
        amount_cents: request.amount_cents,
        currency: DEFAULT_CURRENCY.to_string(),
        payment_method: method,
        is_anonymous: request.is_anonymous,
        message: request.message,
        dedication: request.dedication,
    }
}

/// Move a donation to `to` and run the side effects of an actual change:
/// stats cache invalidation, metrics and the receipt email on completion.
pub(crate) async fn apply_transition(
    state: &AppState,
    id: Uuid,
    to: DonationStatus,
    trigger: TransitionTrigger,
    failure_reason: Option<String>,
) -> Result<Transition, AppError> {
    let transition = state.donations.transition(id, to, trigger, failure_reason).await?;
    if !transition.changed {
        return Ok(transition);
    }

    state.stats_cache.invalidate().await;
    let donation = &transition.donation;
    info!(donation_id = %donation.id, status = %donation.status, "Donation status changed");

    if donation.status == DonationStatus::Completed {
        state.metrics.record_completed(donation.amount_cents);

        let program_title = match donation.program_id {
            Some(program_id) => match state.programs.find(program_id).await {
                Ok(program) => program.map(|p| p.title),
                Err(e) => {
                    warn!(error = %e, donation_id = %donation.id, "Program lookup for receipt failed");
                    None
                }
            },
            None => None,
        };
        state.notifier.donation_receipt(donation, program_title.as_deref());
    }

    Ok(transition)
}

/// POST /api/donations
///
/// Records a pending pledge paid offline. Card payments go through
/// `/api/stripe/create-payment-intent`.
pub async fn create(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    ValidJson(request): ValidJson<DonationRequest>,
) -> Result<(StatusCode, Json<Donation>), ApiError> {
    let request = request.validate()?;
    let method = match request.payment_method {
        Some(method) if method != PaymentMethod::Card => method,
        _ => {
            return Err(AppError::BadRequest(
                "Card donations must be made through /api/stripe/create-payment-intent".to_string(),
            )
            .into())
        }
    };
    donatable_program(&state, request.program_id).await?;

    let user_id = user.map(|AuthUser(u)| u.id);
    let donation = state.donations.create(new_donation(request, user_id, method)).await?;
    info!(
        donation_id = %donation.id,
        amount_cents = donation.amount_cents,
        payment_method = %donation.payment_method,
        "Offline donation recorded"
    );

    Ok((StatusCode::CREATED, Json(donation)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DonationQuery {
    pub status: Option<DonationStatus>,
    pub program_id: Option<Uuid>,
    pub email: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/donations
pub async fn list(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<DonationQuery>,
) -> Result<Json<Page<Donation>>, ApiError> {
    let filter = DonationFilter {
        status: query.status,
        program_id: query.program_id,
        donor: None,
        email: query.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()),
        from: query.from,
        to: query.to,
    };
    let page = state
        .donations
        .list(&filter, PageRequest::new(query.page, query.limit))
        .await?;
    Ok(Json(page))
}

/// GET /api/donations/mine
pub async fn mine(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Donation>>, ApiError> {
    let filter = DonationFilter {
        donor: Some(DonorKey::from(&user)),
        ..Default::default()
    };
    let page = state.donations.list(&filter, params.into()).await?;
    Ok(Json(page))
}

/// GET /api/donations/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<DonationStats>, ApiError> {
    let stats = state.stats_cache.get().await?;
    Ok(Json(stats.as_ref().clone()))
}

/// GET /api/donations/recent
pub async fn recent(State(state): State<AppState>) -> Result<Json<Vec<PublicDonation>>, ApiError> {
    let donations = state.donations.recent_completed(RECENT_DONATIONS).await?;
    Ok(Json(donations.iter().map(PublicDonation::from).collect()))
}

/// GET /api/donations/:id
pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Donation>, ApiError> {
    let donation = state
        .donations
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Donation".to_string()))?;

    if !donation.is_visible_to(&user) {
        return Err(AppError::Forbidden("Not authorized to view this donation".to_string()).into());
    }
    Ok(Json(donation))
}

/// PUT /api/donations/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<DonationStatusRequest>,
) -> Result<Json<Transition>, ApiError> {
    let request = request.validate()?;
    let transition = apply_transition(
        &state,
        id,
        request.status,
        TransitionTrigger::Manual,
        request.failure_reason,
    )
    .await?;
    info!(
        donation_id = %id,
        admin_id = %admin.id,
        status = %request.status,
        changed = transition.changed,
        "Donation status set by administrator"
    );
    Ok(Json(transition))
}
