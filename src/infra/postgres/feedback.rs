// Site feedback

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{fetch_page, parse_column};
use crate::core::errors::AppError;
use crate::core::models::{Feedback, FeedbackStatus};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::FeedbackRequest;
use crate::store::{FeedbackFilter, FeedbackStore};

const FEEDBACK_COLUMNS: &str =
    "id, user_id, name, email, kind, subject, message, rating, status, created_at, updated_at";

#[derive(FromRow)]
struct FeedbackRow {
    id: Uuid,
    user_id: Option<Uuid>,
    name: String,
    email: String,
    kind: String,
    subject: String,
    message: String,
    rating: Option<i16>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = AppError;

    fn try_from(r: FeedbackRow) -> Result<Self, Self::Error> {
        Ok(Feedback {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            email: r.email,
            kind: parse_column(&r.kind, "feedback.kind")?,
            subject: r.subject,
            message: r.message,
            rating: r.rating,
            status: parse_column(&r.status, "feedback.status")?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub struct PgFeedbackStore {
    pool: PgPool,
}

impl PgFeedbackStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedbackStore for PgFeedbackStore {
    async fn create(&self, feedback: FeedbackRequest, user_id: Option<Uuid>) -> Result<Feedback, AppError> {
        let sql = format!(
            "INSERT INTO feedback (id, user_id, name, email, kind, subject, message, rating, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            FEEDBACK_COLUMNS
        );
        sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&feedback.name)
            .bind(&feedback.email)
            .bind(feedback.kind().as_str())
            .bind(&feedback.subject)
            .bind(&feedback.message)
            .bind(feedback.rating)
            .bind(FeedbackStatus::New.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn list(&self, filter: &FeedbackFilter, page: PageRequest) -> Result<Page<Feedback>, AppError> {
        fetch_page::<FeedbackRow, Feedback, _>(
            &self.pool,
            "feedback",
            FEEDBACK_COLUMNS,
            "created_at DESC",
            page,
            |qb| {
                if let Some(status) = filter.status {
                    qb.push(" AND status = ").push_bind(status.as_str());
                }
                if let Some(kind) = filter.kind {
                    qb.push(" AND kind = ").push_bind(kind.as_str());
                }
            },
        )
        .await
    }

    async fn set_status(&self, id: Uuid, status: FeedbackStatus) -> Result<Feedback, AppError> {
        let sql = format!(
            "UPDATE feedback SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            FEEDBACK_COLUMNS
        );
        sqlx::query_as::<_, FeedbackRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Feedback".to_string()))?
            .try_into()
    }

    async fn count_by_status(&self, status: FeedbackStatus) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
