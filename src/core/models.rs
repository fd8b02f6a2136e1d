// Domain models shared by the API, stores and payment flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a snake_case enum persisted as TEXT.
///
/// The wire form (serde) and the column form (`as_str`/`FromStr`) are the
/// same string so rows and JSON bodies never disagree.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("invalid {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Account role
    UserRole { User => "user", Admin => "admin" }
);

text_enum!(
    ProgramCategory {
        Education => "education",
        Healthcare => "healthcare",
        Environment => "environment",
        Community => "community",
        EmergencyRelief => "emergency_relief",
        Other => "other",
    }
);

text_enum!(
    ProgramStatus { Active => "active", Completed => "completed", Paused => "paused" }
);

text_enum!(
    DonationFrequency {
        OneTime => "one_time",
        Monthly => "monthly",
        Quarterly => "quarterly",
        Annually => "annually",
    }
);

text_enum!(
    PaymentMethod {
        Card => "card",
        BankTransfer => "bank_transfer",
        Check => "check",
        Cash => "cash",
    }
);

text_enum!(
    /// Payment lifecycle of a donation. Transitions are governed by `core::impact`.
    DonationStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
);

text_enum!(
    VolunteerAvailability {
        Weekdays => "weekdays",
        Weekends => "weekends",
        Evenings => "evenings",
        Flexible => "flexible",
    }
);

text_enum!(
    /// Moderation state for volunteer applications and success stories
    ReviewStatus { Pending => "pending", Approved => "approved", Rejected => "rejected" }
);

text_enum!(
    FeedbackKind {
        General => "general",
        Suggestion => "suggestion",
        Bug => "bug",
        Complaint => "complaint",
        Praise => "praise",
    }
);

text_enum!(
    FeedbackStatus { New => "new", Reviewed => "reviewed", Resolved => "resolved" }
);

text_enum!(
    SubscriptionStatus { Subscribed => "subscribed", Unsubscribed => "unsubscribed" }
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ProgramCategory,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub goal_cents: i64,
    pub raised_cents: i64,
    pub donor_count: i64,
    pub cost_per_beneficiary_cents: Option<i64>,
    pub beneficiaries_reached: i64,
    pub status: ProgramStatus,
    pub featured: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    /// Share of the goal raised so far, capped at 100 and rounded to one decimal
    pub fn progress_percentage(&self) -> f64 {
        if self.goal_cents <= 0 {
            return 0.0;
        }
        let pct = self.raised_cents as f64 / self.goal_cents as f64 * 100.0;
        (pct.min(100.0) * 10.0).round() / 10.0
    }

    /// Whole days left before `end_date`; `None` for open-ended programs
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.end_date
            .map(|end| (end - now).num_days().max(0))
    }

    pub fn accepts_donations(&self) -> bool {
        self.status == ProgramStatus::Active
    }
}

/// Program plus its derived fields, as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct ProgramView {
    #[serde(flatten)]
    pub program: Program,
    pub progress_percentage: f64,
    pub days_remaining: Option<i64>,
}

impl ProgramView {
    pub fn new(program: Program, now: DateTime<Utc>) -> Self {
        Self {
            progress_percentage: program.progress_percentage(),
            days_remaining: program.days_remaining(now),
            program,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub program_id: Option<Uuid>,
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub frequency: DonationFrequency,
    pub payment_method: PaymentMethod,
    pub status: DonationStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub dedication: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Donation {
    pub fn display_name(&self) -> &str {
        if self.is_anonymous {
            "Anonymous"
        } else {
            &self.donor_name
        }
    }

    /// Whether `user` may read this donation (owner by id or by email)
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_admin()
            || self.user_id == Some(user.id)
            || self.donor_email.eq_ignore_ascii_case(&user.email)
    }
}

/// Donation as shown on public pages: no email, anonymity applied
#[derive(Debug, Clone, Serialize)]
pub struct PublicDonation {
    pub id: Uuid,
    pub donor_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub program_id: Option<Uuid>,
    pub message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Donation> for PublicDonation {
    fn from(donation: &Donation) -> Self {
        Self {
            id: donation.id,
            donor_name: donation.display_name().to_string(),
            amount_cents: donation.amount_cents,
            currency: donation.currency.clone(),
            program_id: donation.program_id,
            message: donation.message.clone(),
            completed_at: donation.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolunteerApplication {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub program_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub availability: VolunteerAvailability,
    pub interests: Vec<String>,
    pub skills: Option<String>,
    pub experience: Option<String>,
    pub motivation: String,
    pub status: ReviewStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessStory {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub beneficiary_name: Option<String>,
    pub program_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub status: ReviewStatus,
    pub featured: bool,
    pub submitted_by: Option<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SuccessStory {
    pub fn is_public(&self) -> bool {
        self.status == ReviewStatus::Approved
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub kind: FeedbackKind,
    pub subject: String,
    pub message: String,
    pub rating: Option<i16>,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSubscription {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub status: SubscriptionStatus,
    pub source: Option<String>,
    #[serde(skip_serializing, default)]
    pub unsubscribe_token_hash: String,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}
