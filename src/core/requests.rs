// Request bodies accepted by the API
//
// Every body has a `validate` that trims and normalizes its fields and runs
// the field rules, returning the cleaned value or `AppError::Validation`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::core::errors::AppError;
use crate::core::models::{
    DonationFrequency, DonationStatus, FeedbackKind, FeedbackStatus, PaymentMethod, Program,
    ProgramCategory, ProgramStatus, ReviewStatus, UserRole, VolunteerAvailability,
};
use crate::utils::validation::{normalize_email, trim, trim_opt, Validator};

pub const MIN_DONATION_CENTS: i64 = 100;
pub const MAX_DONATION_CENTS: i64 = 10_000_000;
pub const MIN_GOAL_CENTS: i64 = 100;
const MAX_INTERESTS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl RegisterRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.name);
        self.email = normalize_email(&self.email);
        self.phone = trim_opt(self.phone);

        let mut v = Validator::new();
        v.length("name", "Name", &self.name, 2, 50)
            .email("email", &self.email)
            .password("password", &self.password)
            .phone("phone", self.phone.as_deref());
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.email = normalize_email(&self.email);

        let mut v = Validator::new();
        v.email("email", &self.email)
            .check(!self.password.is_empty(), "password", "Password is required");
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.name = self.name.map(|n| n.trim().to_string());
        self.phone = trim_opt(self.phone);

        let mut v = Validator::new();
        if let Some(ref name) = self.name {
            v.length("name", "Name", name, 2, 50);
        }
        v.phone("phone", self.phone.as_deref());
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(self) -> Result<Self, AppError> {
        let mut v = Validator::new();
        v.check(
            !self.current_password.is_empty(),
            "current_password",
            "Current password is required",
        )
        .password("new_password", &self.new_password)
        .check(
            self.new_password != self.current_password,
            "new_password",
            "New password must differ from the current password",
        );
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramRequest {
    pub title: String,
    pub description: String,
    pub category: ProgramCategory,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub goal_cents: i64,
    #[serde(default)]
    pub cost_per_beneficiary_cents: Option<i64>,
    #[serde(default)]
    pub status: Option<ProgramStatus>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl ProgramRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.title);
        trim(&mut self.description);
        self.image_url = trim_opt(self.image_url);
        self.location = trim_opt(self.location);

        let mut v = Validator::new();
        v.length("title", "Title", &self.title, 3, 100)
            .length("description", "Description", &self.description, 10, 5000)
            .at_least("goal_cents", "Goal", self.goal_cents, MIN_GOAL_CENTS)
            .url("image_url", self.image_url.as_deref(), 500)
            .max_length("location", "Location", self.location.as_deref(), 200);
        if let Some(cost) = self.cost_per_beneficiary_cents {
            v.at_least("cost_per_beneficiary_cents", "Cost per beneficiary", cost, 1);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            v.check(end > start, "end_date", "End date must be after start date");
        } else if let Some(end) = self.end_date {
            v.check(end > Utc::now(), "end_date", "End date must be after start date");
        }
        v.finish()?;
        Ok(self)
    }
}

/// Partial program update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<ProgramCategory>,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub goal_cents: Option<i64>,
    pub cost_per_beneficiary_cents: Option<i64>,
    pub status: Option<ProgramStatus>,
    pub featured: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl ProgramPatch {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.title = self.title.map(|t| t.trim().to_string());
        self.description = self.description.map(|d| d.trim().to_string());
        self.image_url = trim_opt(self.image_url);
        self.location = trim_opt(self.location);

        let mut v = Validator::new();
        if let Some(ref title) = self.title {
            v.length("title", "Title", title, 3, 100);
        }
        if let Some(ref description) = self.description {
            v.length("description", "Description", description, 10, 5000);
        }
        if let Some(goal) = self.goal_cents {
            v.at_least("goal_cents", "Goal", goal, MIN_GOAL_CENTS);
        }
        if let Some(cost) = self.cost_per_beneficiary_cents {
            v.at_least("cost_per_beneficiary_cents", "Cost per beneficiary", cost, 1);
        }
        v.url("image_url", self.image_url.as_deref(), 500)
            .max_length("location", "Location", self.location.as_deref(), 200);
        v.finish()?;
        Ok(self)
    }

    /// Merge into `program`, re-checking the schedule on the merged dates
    /// and leaving it untouched when they are rejected
    pub fn apply_to(self, program: &mut Program) -> Result<(), AppError> {
        let start_date = self.start_date.unwrap_or(program.start_date);
        let end_date = self.end_date.or(program.end_date);
        if let Some(end) = end_date {
            if end <= start_date {
                return Err(AppError::invalid_field("end_date", "End date must be after start date"));
            }
        }

        if let Some(title) = self.title {
            program.title = title;
        }
        if let Some(description) = self.description {
            program.description = description;
        }
        if let Some(category) = self.category {
            program.category = category;
        }
        if self.image_url.is_some() {
            program.image_url = self.image_url;
        }
        if self.location.is_some() {
            program.location = self.location;
        }
        if let Some(goal) = self.goal_cents {
            program.goal_cents = goal;
        }
        if self.cost_per_beneficiary_cents.is_some() {
            program.cost_per_beneficiary_cents = self.cost_per_beneficiary_cents;
        }
        if let Some(status) = self.status {
            program.status = status;
        }
        if let Some(featured) = self.featured {
            program.featured = featured;
        }
        program.start_date = start_date;
        program.end_date = end_date;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DonationRequest {
    #[serde(default)]
    pub program_id: Option<Uuid>,
    pub amount_cents: i64,
    pub donor_name: String,
    pub donor_email: String,
    #[serde(default)]
    pub frequency: Option<DonationFrequency>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub dedication: Option<String>,
}

impl DonationRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.donor_name);
        self.donor_email = normalize_email(&self.donor_email);
        self.message = trim_opt(self.message);
        self.dedication = trim_opt(self.dedication);

        let mut v = Validator::new();
        v.range(
            "amount_cents",
            "Amount",
            self.amount_cents,
            MIN_DONATION_CENTS,
            MAX_DONATION_CENTS,
        )
        .length("donor_name", "Donor name", &self.donor_name, 2, 100)
        .email("donor_email", &self.donor_email)
        .max_length("message", "Message", self.message.as_deref(), 500)
        .max_length("dedication", "Dedication", self.dedication.as_deref(), 200);
        v.finish()?;
        Ok(self)
    }

    pub fn frequency(&self) -> DonationFrequency {
        self.frequency.unwrap_or(DonationFrequency::OneTime)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DonationStatusRequest {
    pub status: DonationStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl DonationStatusRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.failure_reason = trim_opt(self.failure_reason);
        let mut v = Validator::new();
        v.max_length("failure_reason", "Failure reason", self.failure_reason.as_deref(), 500);
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolunteerRequest {
    #[serde(default)]
    pub program_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub availability: VolunteerAvailability,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub skills: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    pub motivation: String,
}

impl VolunteerRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.name);
        trim(&mut self.motivation);
        self.email = normalize_email(&self.email);
        self.phone = trim_opt(self.phone);
        self.skills = trim_opt(self.skills);
        self.experience = trim_opt(self.experience);
        self.interests = self
            .interests
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();

        let mut v = Validator::new();
        v.length("name", "Name", &self.name, 2, 100)
            .email("email", &self.email)
            .phone("phone", self.phone.as_deref())
            .length("motivation", "Motivation", &self.motivation, 20, 2000)
            .check(
                self.interests.len() <= MAX_INTERESTS,
                "interests",
                "No more than 10 interests may be listed",
            )
            .check(
                self.interests.iter().all(|i| i.chars().count() <= 50),
                "interests",
                "Each interest cannot exceed 50 characters",
            )
            .max_length("skills", "Skills", self.skills.as_deref(), 1000)
            .max_length("experience", "Experience", self.experience.as_deref(), 1000);
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub status: ReviewStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

impl ReviewRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.admin_notes = trim_opt(self.admin_notes);
        let mut v = Validator::new();
        v.check(
            self.status != ReviewStatus::Pending,
            "status",
            "Status must be approved or rejected",
        )
        .max_length("admin_notes", "Notes", self.admin_notes.as_deref(), 1000);
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoryRequest {
    pub title: String,
    pub content: String,
    pub author_name: String,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub beneficiary_name: Option<String>,
    #[serde(default)]
    pub program_id: Option<Uuid>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl StoryRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.title);
        trim(&mut self.content);
        trim(&mut self.author_name);
        self.author_email = trim_opt(self.author_email).map(|e| normalize_email(&e));
        self.beneficiary_name = trim_opt(self.beneficiary_name);
        self.image_url = trim_opt(self.image_url);

        let mut v = Validator::new();
        v.length("title", "Title", &self.title, 5, 150)
            .length("content", "Content", &self.content, 50, 10_000)
            .length("author_name", "Author name", &self.author_name, 2, 100)
            .optional_email("author_email", self.author_email.as_deref())
            .max_length("beneficiary_name", "Beneficiary name", self.beneficiary_name.as_deref(), 100)
            .url("image_url", self.image_url.as_deref(), 500);
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryReviewRequest {
    #[serde(default)]
    pub status: Option<ReviewStatus>,
    #[serde(default)]
    pub featured: Option<bool>,
}

impl StoryReviewRequest {
    pub fn validate(self) -> Result<Self, AppError> {
        let mut v = Validator::new();
        v.check(
            self.status.is_some() || self.featured.is_some(),
            "status",
            "Provide a status or featured flag",
        );
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub kind: Option<FeedbackKind>,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub rating: Option<i16>,
}

impl FeedbackRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.name);
        trim(&mut self.subject);
        trim(&mut self.message);
        self.email = normalize_email(&self.email);

        let mut v = Validator::new();
        v.length("name", "Name", &self.name, 2, 100)
            .email("email", &self.email)
            .length("subject", "Subject", &self.subject, 3, 150)
            .length("message", "Message", &self.message, 10, 5000);
        if let Some(rating) = self.rating {
            v.range("rating", "Rating", rating as i64, 1, 5);
        }
        v.finish()?;
        Ok(self)
    }

    pub fn kind(&self) -> FeedbackKind {
        self.kind.unwrap_or(FeedbackKind::General)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackStatusRequest {
    pub status: FeedbackStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsletterRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl NewsletterRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.email = normalize_email(&self.email);
        self.name = trim_opt(self.name);
        self.source = trim_opt(self.source);

        let mut v = Validator::new();
        v.email("email", &self.email)
            .max_length("name", "Name", self.name.as_deref(), 100)
            .max_length("source", "Source", self.source.as_deref(), 50);
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeRequest {
    pub token: String,
}

impl UnsubscribeRequest {
    pub fn validate(mut self) -> Result<Self, AppError> {
        trim(&mut self.token);
        let mut v = Validator::new();
        v.check(!self.token.is_empty(), "token", "Unsubscribe token is required");
        v.finish()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveRequest {
    pub is_active: bool,
}
