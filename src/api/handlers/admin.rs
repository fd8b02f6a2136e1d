// Administrator overview

use axum::{extract::State, response::Json};

use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::auth::auth_middleware::AdminUser;
use crate::core::models::{DonationStatus, FeedbackStatus, PublicDonation, ReviewStatus};
use crate::core::stats::AdminDashboard;

const RECENT_DONATIONS: i64 = 5;

/// GET /api/admin/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<AdminDashboard>, ApiError> {
    let (
        users,
        active_programs,
        stats,
        pending_donations,
        pending_volunteers,
        pending_stories,
        new_feedback,
        newsletter,
        recent,
    ) = tokio::try_join!(
        state.users.count(),
        state.programs.count_active(),
        state.stats_cache.get(),
        state.donations.count_by_status(DonationStatus::Pending),
        state.volunteers.count_by_status(ReviewStatus::Pending),
        state.stories.count_by_status(ReviewStatus::Pending),
        state.feedback.count_by_status(FeedbackStatus::New),
        state.newsletter.stats(),
        state.donations.recent_completed(RECENT_DONATIONS),
    )?;

    Ok(Json(AdminDashboard {
        users,
        active_programs,
        donations: stats.as_ref().clone(),
        pending_donations,
        pending_volunteers,
        pending_stories,
        new_feedback,
        subscribers: newsletter.subscribed,
        recent_donations: recent.iter().map(PublicDonation::from).collect(),
    }))
}
