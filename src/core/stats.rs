// Aggregate views over donations and the rest of the platform

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::models::{Donation, DonationFrequency, PublicDonation, VolunteerApplication};

/// Number of trailing months reported in `DonationStats::by_month`
pub const STATS_MONTHS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramTotal {
    pub program_id: Uuid,
    pub title: String,
    pub total_cents: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    /// `YYYY-MM`
    pub month: String,
    pub total_cents: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyTotal {
    pub frequency: DonationFrequency,
    pub total_cents: i64,
    pub count: i64,
}

/// Totals over completed donations
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DonationStats {
    pub total_raised_cents: i64,
    pub donation_count: i64,
    pub unique_donors: i64,
    pub average_cents: i64,
    pub by_program: Vec<ProgramTotal>,
    pub by_month: Vec<MonthTotal>,
    pub by_frequency: Vec<FrequencyTotal>,
}

/// What a signed-in donor has given
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DonorSummary {
    pub total_given_cents: i64,
    pub donation_count: i64,
    pub programs_supported: i64,
    pub last_donation_at: Option<DateTime<Utc>>,
}

/// Signed-in user's landing page
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboard {
    pub summary: DonorSummary,
    pub recent_donations: Vec<Donation>,
    pub volunteer_applications: Vec<VolunteerApplication>,
}

/// Administrator overview
#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub users: i64,
    pub active_programs: i64,
    pub donations: DonationStats,
    pub pending_donations: i64,
    pub pending_volunteers: i64,
    pub pending_stories: i64,
    pub new_feedback: i64,
    pub subscribers: i64,
    pub recent_donations: Vec<PublicDonation>,
}
