// Donations, their status transitions and the aggregates over them

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{fetch_page, parse_column};
use crate::core::errors::AppError;
use crate::core::impact::{plan_transition, TransitionPlan, TransitionTrigger};
use crate::core::models::{Donation, DonationStatus};
use crate::core::pagination::{Page, PageRequest};
use crate::core::stats::{DonationStats, DonorSummary, FrequencyTotal, MonthTotal, ProgramTotal, STATS_MONTHS};
use crate::store::{DonationFilter, DonationStore, DonorKey, NewDonation, Transition};

const DONATION_COLUMNS: &str = "id, user_id, program_id, donor_name, donor_email, amount_cents, \
     currency, frequency, payment_method, status, stripe_payment_intent_id, is_anonymous, message, \
     dedication, failure_reason, created_at, updated_at, completed_at, refunded_at";

#[derive(FromRow)]
struct DonationRow {
    id: Uuid,
    user_id: Option<Uuid>,
    program_id: Option<Uuid>,
    donor_name: String,
    donor_email: String,
    amount_cents: i64,
    currency: String,
    frequency: String,
    payment_method: String,
    status: String,
    stripe_payment_intent_id: Option<String>,
    is_anonymous: bool,
    message: Option<String>,
    dedication: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

impl TryFrom<DonationRow> for Donation {
    type Error = AppError;

    fn try_from(r: DonationRow) -> Result<Self, Self::Error> {
        Ok(Donation {
            id: r.id,
            user_id: r.user_id,
            program_id: r.program_id,
            donor_name: r.donor_name,
            donor_email: r.donor_email,
            amount_cents: r.amount_cents,
            currency: r.currency,
            frequency: parse_column(&r.frequency, "donations.frequency")?,
            payment_method: parse_column(&r.payment_method, "donations.payment_method")?,
            status: parse_column(&r.status, "donations.status")?,
            stripe_payment_intent_id: r.stripe_payment_intent_id,
            is_anonymous: r.is_anonymous,
            message: r.message,
            dedication: r.dedication,
            failure_reason: r.failure_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
            completed_at: r.completed_at,
            refunded_at: r.refunded_at,
        })
    }
}

#[derive(FromRow)]
struct ProgramTotalRow {
    program_id: Uuid,
    title: String,
    total_cents: i64,
    count: i64,
}

#[derive(FromRow)]
struct MonthTotalRow {
    month: String,
    total_cents: i64,
    count: i64,
}

#[derive(FromRow)]
struct FrequencyTotalRow {
    frequency: String,
    total_cents: i64,
    count: i64,
}

#[derive(FromRow)]
struct SummaryRow {
    total_cents: i64,
    count: i64,
    donors: i64,
}

#[derive(FromRow)]
struct DonorSummaryRow {
    total_cents: i64,
    count: i64,
    programs: i64,
    last_donation_at: Option<DateTime<Utc>>,
}

pub struct PgDonationStore {
    pool: PgPool,
}

impl PgDonationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DonationStore for PgDonationStore {
    async fn create(&self, donation: NewDonation) -> Result<Donation, AppError> {
        let sql = format!(
            "INSERT INTO donations (id, user_id, program_id, donor_name, donor_email, amount_cents, currency,
                                    frequency, payment_method, status, is_anonymous, message, dedication)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {}",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, DonationRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(donation.user_id)
            .bind(donation.program_id)
            .bind(&donation.donor_name)
            .bind(donation.donor_email.to_lowercase())
            .bind(donation.amount_cents)
            .bind(&donation.currency)
            .bind(donation.frequency.as_str())
            .bind(donation.payment_method.as_str())
            .bind(DonationStatus::Pending.as_str())
            .bind(donation.is_anonymous)
            .bind(&donation.message)
            .bind(&donation.dedication)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<Donation>, AppError> {
        let sql = format!("SELECT {} FROM donations WHERE id = $1", DONATION_COLUMNS);
        sqlx::query_as::<_, DonationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Donation::try_from)
            .transpose()
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Donation>, AppError> {
        let sql = format!(
            "SELECT {} FROM donations WHERE stripe_payment_intent_id = $1",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, DonationRow>(&sql)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Donation::try_from)
            .transpose()
    }

    async fn attach_payment_intent(&self, id: Uuid, payment_intent_id: &str) -> Result<Donation, AppError> {
        let sql = format!(
            "UPDATE donations SET stripe_payment_intent_id = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, DonationRow>(&sql)
            .bind(id)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Donation".to_string()))?
            .try_into()
    }

    async fn transition(
        &self,
        id: Uuid,
        to: DonationStatus,
        trigger: TransitionTrigger,
        failure_reason: Option<String>,
    ) -> Result<Transition, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM donations WHERE id = $1 FOR UPDATE", DONATION_COLUMNS);
        let current: Donation = sqlx::query_as::<_, DonationRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Donation".to_string()))?
            .try_into()?;

        // Lock the program row too so concurrent transitions serialize on it
        let cost_per_beneficiary = match current.program_id {
            Some(program_id) => sqlx::query_scalar::<_, Option<i64>>(
                "SELECT cost_per_beneficiary_cents FROM programs WHERE id = $1 FOR UPDATE",
            )
            .bind(program_id)
            .fetch_optional(&mut *tx)
            .await?
            .flatten(),
            None => None,
        };

        let delta = match plan_transition(current.status, to, trigger, current.amount_cents, cost_per_beneficiary)? {
            TransitionPlan::Unchanged => {
                tx.rollback().await?;
                return Ok(Transition {
                    donation: current,
                    changed: false,
                });
            }
            TransitionPlan::Apply { delta } => delta,
        };

        let sql = format!(
            "UPDATE donations
             SET status = $2::TEXT,
                 updated_at = NOW(),
                 completed_at = CASE WHEN $2::TEXT = 'completed' THEN NOW() ELSE completed_at END,
                 refunded_at = CASE WHEN $2::TEXT = 'refunded' THEN NOW() ELSE refunded_at END,
                 failure_reason = CASE $2::TEXT WHEN 'failed' THEN $3 WHEN 'completed' THEN NULL ELSE failure_reason END
             WHERE id = $1
             RETURNING {}",
            DONATION_COLUMNS
        );
        let updated: Donation = sqlx::query_as::<_, DonationRow>(&sql)
            .bind(id)
            .bind(to.as_str())
            .bind(&failure_reason)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

        if let (Some(program_id), false) = (current.program_id, delta.is_zero()) {
            sqlx::query(
                "UPDATE programs
                 SET raised_cents = GREATEST(raised_cents + $2, 0),
                     donor_count = GREATEST(donor_count + $3, 0),
                     beneficiaries_reached = GREATEST(beneficiaries_reached + $4, 0),
                     updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(program_id)
            .bind(delta.raised_cents)
            .bind(delta.donor_count)
            .bind(delta.beneficiaries)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            donation_id = %id,
            from = %current.status,
            to = %to,
            raised_delta = delta.raised_cents,
            "Donation status changed"
        );

        Ok(Transition {
            donation: updated,
            changed: true,
        })
    }

    async fn list(&self, filter: &DonationFilter, page: PageRequest) -> Result<Page<Donation>, AppError> {
        fetch_page::<DonationRow, Donation, _>(
            &self.pool,
            "donations",
            DONATION_COLUMNS,
            "created_at DESC",
            page,
            |qb| {
                if let Some(status) = filter.status {
                    qb.push(" AND status = ").push_bind(status.as_str());
                }
                if let Some(program_id) = filter.program_id {
                    qb.push(" AND program_id = ").push_bind(program_id);
                }
                if let Some(ref donor) = filter.donor {
                    qb.push(" AND (user_id = ")
                        .push_bind(donor.user_id)
                        .push(" OR LOWER(donor_email) = ")
                        .push_bind(donor.email.to_lowercase())
                        .push(")");
                }
                if let Some(ref email) = filter.email {
                    qb.push(" AND LOWER(donor_email) = ").push_bind(email.to_lowercase());
                }
                if let Some(from) = filter.from {
                    qb.push(" AND created_at >= ").push_bind(from);
                }
                if let Some(to) = filter.to {
                    qb.push(" AND created_at <= ").push_bind(to);
                }
            },
        )
        .await
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<DonationStats, AppError> {
        let completed = DonationStatus::Completed.as_str();

        let summary = sqlx::query_as::<_, SummaryRow>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total_cents,
                    COUNT(*) AS count,
                    COUNT(DISTINCT LOWER(donor_email)) AS donors
             FROM donations WHERE status = $1",
        )
        .bind(completed)
        .fetch_one(&self.pool)
        .await?;

        let by_program = sqlx::query_as::<_, ProgramTotalRow>(
            "SELECT p.id AS program_id, p.title, SUM(d.amount_cents)::BIGINT AS total_cents, COUNT(*) AS count
             FROM donations d
             JOIN programs p ON p.id = d.program_id
             WHERE d.status = $1
             GROUP BY p.id, p.title
             ORDER BY total_cents DESC, p.title",
        )
        .bind(completed)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| ProgramTotal {
            program_id: r.program_id,
            title: r.title,
            total_cents: r.total_cents,
            count: r.count,
        })
        .collect();

        let since = now.checked_sub_months(Months::new(STATS_MONTHS)).unwrap_or(now);
        let by_month = sqlx::query_as::<_, MonthTotalRow>(
            "SELECT TO_CHAR(COALESCE(completed_at, created_at) AT TIME ZONE 'UTC', 'YYYY-MM') AS month,
                    SUM(amount_cents)::BIGINT AS total_cents,
                    COUNT(*) AS count
             FROM donations
             WHERE status = $1 AND COALESCE(completed_at, created_at) >= $2
             GROUP BY month
             ORDER BY month",
        )
        .bind(completed)
        .bind(since)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| MonthTotal {
            month: r.month,
            total_cents: r.total_cents,
            count: r.count,
        })
        .collect();

        let by_frequency = sqlx::query_as::<_, FrequencyTotalRow>(
            "SELECT frequency, SUM(amount_cents)::BIGINT AS total_cents, COUNT(*) AS count
             FROM donations
             WHERE status = $1
             GROUP BY frequency
             ORDER BY total_cents DESC, frequency",
        )
        .bind(completed)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| {
            Ok(FrequencyTotal {
                frequency: parse_column(&r.frequency, "donations.frequency")?,
                total_cents: r.total_cents,
                count: r.count,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

        let average_cents = if summary.count > 0 {
            summary.total_cents / summary.count
        } else {
            0
        };

        Ok(DonationStats {
            total_raised_cents: summary.total_cents,
            donation_count: summary.count,
            unique_donors: summary.donors,
            average_cents,
            by_program,
            by_month,
            by_frequency,
        })
    }

    async fn recent_completed(&self, limit: i64) -> Result<Vec<Donation>, AppError> {
        let sql = format!(
            "SELECT {} FROM donations
             WHERE status = $1
             ORDER BY COALESCE(completed_at, created_at) DESC
             LIMIT $2",
            DONATION_COLUMNS
        );
        sqlx::query_as::<_, DonationRow>(&sql)
            .bind(DonationStatus::Completed.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Donation::try_from)
            .collect()
    }

    async fn donor_summary(&self, donor: &DonorKey) -> Result<DonorSummary, AppError> {
        let row = sqlx::query_as::<_, DonorSummaryRow>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT AS total_cents,
                    COUNT(*) AS count,
                    COUNT(DISTINCT program_id) AS programs,
                    MAX(COALESCE(completed_at, created_at)) AS last_donation_at
             FROM donations
             WHERE status = $1 AND (user_id = $2 OR LOWER(donor_email) = LOWER($3))",
        )
        .bind(DonationStatus::Completed.as_str())
        .bind(donor.user_id)
        .bind(&donor.email)
        .fetch_one(&self.pool)
        .await?;

        Ok(DonorSummary {
            total_given_cents: row.total_cents,
            donation_count: row.count,
            programs_supported: row.programs,
            last_donation_at: row.last_donation_at,
        })
    }

    async fn count_by_status(&self, status: DonationStatus) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
