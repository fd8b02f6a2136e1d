// Volunteer applications

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{fetch_page, parse_column};
use crate::core::errors::AppError;
use crate::core::models::{ReviewStatus, VolunteerApplication};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::VolunteerRequest;
use crate::store::{VolunteerFilter, VolunteerStore};

const VOLUNTEER_COLUMNS: &str = "id, user_id, program_id, name, email, phone, availability, \
     interests, skills, experience, motivation, status, admin_notes, reviewed_by, reviewed_at, \
     created_at, updated_at";

#[derive(FromRow)]
struct VolunteerRow {
    id: Uuid,
    user_id: Option<Uuid>,
    program_id: Option<Uuid>,
    name: String,
    email: String,
    phone: Option<String>,
    availability: String,
    interests: Vec<String>,
    skills: Option<String>,
    experience: Option<String>,
    motivation: String,
    status: String,
    admin_notes: Option<String>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VolunteerRow> for VolunteerApplication {
    type Error = AppError;

    fn try_from(r: VolunteerRow) -> Result<Self, Self::Error> {
        Ok(VolunteerApplication {
            id: r.id,
            user_id: r.user_id,
            program_id: r.program_id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            availability: parse_column(&r.availability, "volunteer_applications.availability")?,
            interests: r.interests,
            skills: r.skills,
            experience: r.experience,
            motivation: r.motivation,
            status: parse_column(&r.status, "volunteer_applications.status")?,
            admin_notes: r.admin_notes,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub struct PgVolunteerStore {
    pool: PgPool,
}

impl PgVolunteerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VolunteerStore for PgVolunteerStore {
    async fn create(&self, application: VolunteerRequest, user_id: Option<Uuid>) -> Result<VolunteerApplication, AppError> {
        let sql = format!(
            "INSERT INTO volunteer_applications (id, user_id, program_id, name, email, phone, availability,
                                                 interests, skills, experience, motivation, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {}",
            VOLUNTEER_COLUMNS
        );
        sqlx::query_as::<_, VolunteerRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(application.program_id)
            .bind(&application.name)
            .bind(&application.email)
            .bind(&application.phone)
            .bind(application.availability.as_str())
            .bind(&application.interests)
            .bind(&application.skills)
            .bind(&application.experience)
            .bind(&application.motivation)
            .bind(ReviewStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<VolunteerApplication>, AppError> {
        let sql = format!("SELECT {} FROM volunteer_applications WHERE id = $1", VOLUNTEER_COLUMNS);
        sqlx::query_as::<_, VolunteerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(VolunteerApplication::try_from)
            .transpose()
    }

    async fn has_pending(&self, email: &str, program_id: Option<Uuid>) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM volunteer_applications
                 WHERE LOWER(email) = LOWER($1)
                   AND program_id IS NOT DISTINCT FROM $2
                   AND status = $3
             )",
        )
        .bind(email)
        .bind(program_id)
        .bind(ReviewStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list(&self, filter: &VolunteerFilter, page: PageRequest) -> Result<Page<VolunteerApplication>, AppError> {
        fetch_page::<VolunteerRow, VolunteerApplication, _>(
            &self.pool,
            "volunteer_applications",
            VOLUNTEER_COLUMNS,
            "created_at DESC",
            page,
            |qb| {
                if let Some(status) = filter.status {
                    qb.push(" AND status = ").push_bind(status.as_str());
                }
                if let Some(program_id) = filter.program_id {
                    qb.push(" AND program_id = ").push_bind(program_id);
                }
                if let Some(ref email) = filter.email {
                    qb.push(" AND LOWER(email) = ").push_bind(email.to_lowercase());
                }
                if let Some(user_id) = filter.user_id {
                    qb.push(" AND user_id = ").push_bind(user_id);
                }
            },
        )
        .await
    }

    async fn review(
        &self,
        id: Uuid,
        status: ReviewStatus,
        admin_notes: Option<String>,
        reviewer: Uuid,
    ) -> Result<VolunteerApplication, AppError> {
        let sql = format!(
            "UPDATE volunteer_applications
             SET status = $2, admin_notes = COALESCE($3, admin_notes), reviewed_by = $4,
                 reviewed_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            VOLUNTEER_COLUMNS
        );
        sqlx::query_as::<_, VolunteerRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(admin_notes)
            .bind(reviewer)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Volunteer application".to_string()))?
            .try_into()
    }

    async fn count_by_status(&self, status: ReviewStatus) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM volunteer_applications WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
