// Storage seams used by the API
//
// Handlers only see these traits; PostgreSQL implementations live in
// `infra::postgres`, Redis in `state::redis_store`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::opaque_token::TokenHash;
use crate::core::errors::AppError;
use crate::core::impact::TransitionTrigger;
use crate::core::models::{
    Donation, DonationFrequency, DonationStatus, Feedback, FeedbackKind, FeedbackStatus,
    NewsletterSubscription, PaymentMethod, Program, ProgramCategory, ProgramStatus, ReviewStatus,
    SubscriptionStatus, SuccessStory, User, UserRole, VolunteerApplication,
};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::{
    FeedbackRequest, NewsletterRequest, ProgramRequest, StoryRequest, VolunteerRequest,
};
use crate::core::stats::{DonationStats, DonorSummary};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Case-insensitive match on name or email
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Duplicate email is `AppError::Conflict`
    async fn create(&self, user: NewUser) -> Result<User, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn update_profile(&self, id: Uuid, name: Option<String>, phone: Option<String>) -> Result<User, AppError>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;
    async fn record_login(&self, id: Uuid) -> Result<(), AppError>;
    async fn list(&self, filter: &UserFilter, page: PageRequest) -> Result<Page<User>, AppError>;
    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User, AppError>;
    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<User, AppError>;
    async fn count(&self) -> Result<i64, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct ProgramFilter {
    pub category: Option<ProgramCategory>,
    pub status: Option<ProgramStatus>,
    pub featured: Option<bool>,
    /// Case-insensitive match on title or description
    pub search: Option<String>,
}

#[async_trait::async_trait]
pub trait ProgramStore: Send + Sync {
    async fn create(&self, program: ProgramRequest, created_by: Option<Uuid>) -> Result<Program, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<Program>, AppError>;
    /// Featured first, then newest
    async fn list(&self, filter: &ProgramFilter, page: PageRequest) -> Result<Page<Program>, AppError>;
    /// Persist the editable fields of `program`; running totals are untouched
    async fn update(&self, program: &Program) -> Result<Program, AppError>;
    /// Donations keep their history with the program link cleared.
    /// Returns false when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
    async fn count_active(&self) -> Result<i64, AppError>;
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub user_id: Option<Uuid>,
    pub program_id: Option<Uuid>,
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub frequency: DonationFrequency,
    pub payment_method: PaymentMethod,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub dedication: Option<String>,
}

/// A signed-in donor: their donations are matched by user id or email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonorKey {
    pub user_id: Uuid,
    pub email: String,
}

impl From<&User> for DonorKey {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DonationFilter {
    pub status: Option<DonationStatus>,
    pub program_id: Option<Uuid>,
    pub donor: Option<DonorKey>,
    pub email: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Result of a status change; `changed` is false when the donation was
/// already in the requested status
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub donation: Donation,
    pub changed: bool,
}

#[async_trait::async_trait]
pub trait DonationStore: Send + Sync {
    /// Insert with status `pending`
    async fn create(&self, donation: NewDonation) -> Result<Donation, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<Donation>, AppError>;
    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Donation>, AppError>;
    async fn attach_payment_intent(&self, id: Uuid, payment_intent_id: &str) -> Result<Donation, AppError>;
    /// Move to `to` following `core::impact`, adjusting the linked program in
    /// the same transaction. Completing clears any earlier failure reason.
    async fn transition(
        &self,
        id: Uuid,
        to: DonationStatus,
        trigger: TransitionTrigger,
        failure_reason: Option<String>,
    ) -> Result<Transition, AppError>;
    /// Newest first
    async fn list(&self, filter: &DonationFilter, page: PageRequest) -> Result<Page<Donation>, AppError>;
    async fn stats(&self, now: DateTime<Utc>) -> Result<DonationStats, AppError>;
    /// Most recently completed first
    async fn recent_completed(&self, limit: i64) -> Result<Vec<Donation>, AppError>;
    async fn donor_summary(&self, donor: &DonorKey) -> Result<DonorSummary, AppError>;
    async fn count_by_status(&self, status: DonationStatus) -> Result<i64, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct VolunteerFilter {
    pub status: Option<ReviewStatus>,
    pub program_id: Option<Uuid>,
    pub email: Option<String>,
    pub user_id: Option<Uuid>,
}

#[async_trait::async_trait]
pub trait VolunteerStore: Send + Sync {
    async fn create(&self, application: VolunteerRequest, user_id: Option<Uuid>) -> Result<VolunteerApplication, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<VolunteerApplication>, AppError>;
    /// A pending application already exists for this email and program
    async fn has_pending(&self, email: &str, program_id: Option<Uuid>) -> Result<bool, AppError>;
    async fn list(&self, filter: &VolunteerFilter, page: PageRequest) -> Result<Page<VolunteerApplication>, AppError>;
    async fn review(
        &self,
        id: Uuid,
        status: ReviewStatus,
        admin_notes: Option<String>,
        reviewer: Uuid,
    ) -> Result<VolunteerApplication, AppError>;
    async fn count_by_status(&self, status: ReviewStatus) -> Result<i64, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub status: Option<ReviewStatus>,
    pub featured: Option<bool>,
    pub program_id: Option<Uuid>,
}

#[async_trait::async_trait]
pub trait StoryStore: Send + Sync {
    /// Always stored as pending and not featured
    async fn create(&self, story: StoryRequest, submitted_by: Option<Uuid>) -> Result<SuccessStory, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<SuccessStory>, AppError>;
    /// Featured first, then newest
    async fn list(&self, filter: &StoryFilter, page: PageRequest) -> Result<Page<SuccessStory>, AppError>;
    /// Approving sets `published_at` the first time only
    async fn review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        featured: Option<bool>,
    ) -> Result<SuccessStory, AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
    async fn count_by_status(&self, status: ReviewStatus) -> Result<i64, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub status: Option<FeedbackStatus>,
    pub kind: Option<FeedbackKind>,
}

#[async_trait::async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn create(&self, feedback: FeedbackRequest, user_id: Option<Uuid>) -> Result<Feedback, AppError>;
    async fn list(&self, filter: &FeedbackFilter, page: PageRequest) -> Result<Page<Feedback>, AppError>;
    async fn set_status(&self, id: Uuid, status: FeedbackStatus) -> Result<Feedback, AppError>;
    async fn count_by_status(&self, status: FeedbackStatus) -> Result<i64, AppError>;
}

#[derive(Debug, Clone)]
pub enum SubscribeOutcome {
    Created(NewsletterSubscription),
    Resubscribed(NewsletterSubscription),
}

impl SubscribeOutcome {
    pub fn subscription(&self) -> &NewsletterSubscription {
        match self {
            SubscribeOutcome::Created(s) | SubscribeOutcome::Resubscribed(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct NewsletterStats {
    pub subscribed: i64,
    pub unsubscribed: i64,
}

#[async_trait::async_trait]
pub trait NewsletterStore: Send + Sync {
    /// New email is created, an unsubscribed one comes back with the new
    /// token, an active subscription is `AppError::Conflict`
    async fn subscribe(&self, request: &NewsletterRequest, token_hash: &TokenHash) -> Result<SubscribeOutcome, AppError>;
    async fn unsubscribe(&self, token_hash: &TokenHash) -> Result<NewsletterSubscription, AppError>;
    async fn list(&self, status: Option<SubscriptionStatus>, page: PageRequest) -> Result<Page<NewsletterSubscription>, AppError>;
    async fn stats(&self) -> Result<NewsletterStats, AppError>;
}

#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;
}

/// Short-lived counters and markers
#[async_trait::async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn ping(&self) -> Result<(), AppError>;
    /// Count a hit against `key`; the window starts with the first hit
    async fn hit(&self, key: &str, window: Duration) -> Result<u64, AppError>;
    /// True only for the first caller within `ttl`
    async fn mark_once(&self, key: &str, ttl: Duration) -> Result<bool, AppError>;
    /// Drop a marker so the next `mark_once` succeeds again
    async fn release(&self, key: &str) -> Result<(), AppError>;
}
