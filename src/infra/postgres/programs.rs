// Fundraising programs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{fetch_page, like_pattern, parse_column};
use crate::core::errors::AppError;
use crate::core::models::{Program, ProgramStatus};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::ProgramRequest;
use crate::store::{ProgramFilter, ProgramStore};

const PROGRAM_COLUMNS: &str = "id, title, description, category, image_url, location, \
     goal_cents, raised_cents, donor_count, cost_per_beneficiary_cents, beneficiaries_reached, \
     status, featured, start_date, end_date, created_by, created_at, updated_at";

#[derive(FromRow)]
struct ProgramRow {
    id: Uuid,
    title: String,
    description: String,
    category: String,
    image_url: Option<String>,
    location: Option<String>,
    goal_cents: i64,
    raised_cents: i64,
    donor_count: i64,
    cost_per_beneficiary_cents: Option<i64>,
    beneficiaries_reached: i64,
    status: String,
    featured: bool,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProgramRow> for Program {
    type Error = AppError;

    fn try_from(r: ProgramRow) -> Result<Self, Self::Error> {
        Ok(Program {
            id: r.id,
            title: r.title,
            description: r.description,
            category: parse_column(&r.category, "programs.category")?,
            image_url: r.image_url,
            location: r.location,
            goal_cents: r.goal_cents,
            raised_cents: r.raised_cents,
            donor_count: r.donor_count,
            cost_per_beneficiary_cents: r.cost_per_beneficiary_cents,
            beneficiaries_reached: r.beneficiaries_reached,
            status: parse_column(&r.status, "programs.status")?,
            featured: r.featured,
            start_date: r.start_date,
            end_date: r.end_date,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub struct PgProgramStore {
    pool: PgPool,
}

impl PgProgramStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgramStore for PgProgramStore {
    async fn create(&self, program: ProgramRequest, created_by: Option<Uuid>) -> Result<Program, AppError> {
        let sql = format!(
            "INSERT INTO programs (id, title, description, category, image_url, location, goal_cents,
                                   cost_per_beneficiary_cents, status, featured, start_date, end_date, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {}",
            PROGRAM_COLUMNS
        );
        sqlx::query_as::<_, ProgramRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&program.title)
            .bind(&program.description)
            .bind(program.category.as_str())
            .bind(&program.image_url)
            .bind(&program.location)
            .bind(program.goal_cents)
            .bind(program.cost_per_beneficiary_cents)
            .bind(program.status.unwrap_or(ProgramStatus::Active).as_str())
            .bind(program.featured.unwrap_or(false))
            .bind(program.start_date.unwrap_or_else(Utc::now))
            .bind(program.end_date)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<Program>, AppError> {
        let sql = format!("SELECT {} FROM programs WHERE id = $1", PROGRAM_COLUMNS);
        sqlx::query_as::<_, ProgramRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Program::try_from)
            .transpose()
    }

    async fn list(&self, filter: &ProgramFilter, page: PageRequest) -> Result<Page<Program>, AppError> {
        fetch_page::<ProgramRow, Program, _>(
            &self.pool,
            "programs",
            PROGRAM_COLUMNS,
            "featured DESC, created_at DESC",
            page,
            |qb| {
                if let Some(category) = filter.category {
                    qb.push(" AND category = ").push_bind(category.as_str());
                }
                if let Some(status) = filter.status {
                    qb.push(" AND status = ").push_bind(status.as_str());
                }
                if let Some(featured) = filter.featured {
                    qb.push(" AND featured = ").push_bind(featured);
                }
                if let Some(ref search) = filter.search {
                    let pattern = like_pattern(search);
                    qb.push(" AND (LOWER(title) LIKE ")
                        .push_bind(pattern.clone())
                        .push(" OR LOWER(description) LIKE ")
                        .push_bind(pattern)
                        .push(")");
                }
            },
        )
        .await
    }

    async fn update(&self, program: &Program) -> Result<Program, AppError> {
        let sql = format!(
            "UPDATE programs
             SET title = $2, description = $3, category = $4, image_url = $5, location = $6,
                 goal_cents = $7, cost_per_beneficiary_cents = $8, status = $9, featured = $10,
                 start_date = $11, end_date = $12, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            PROGRAM_COLUMNS
        );
        sqlx::query_as::<_, ProgramRow>(&sql)
            .bind(program.id)
            .bind(&program.title)
            .bind(&program.description)
            .bind(program.category.as_str())
            .bind(&program.image_url)
            .bind(&program.location)
            .bind(program.goal_cents)
            .bind(program.cost_per_beneficiary_cents)
            .bind(program.status.as_str())
            .bind(program.featured)
            .bind(program.start_date)
            .bind(program.end_date)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Program".to_string()))?
            .try_into()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        // donations.program_id is ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM programs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_active(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM programs WHERE status = $1")
            .bind(ProgramStatus::Active.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
