// Success stories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{fetch_page, parse_column};
use crate::core::errors::AppError;
use crate::core::models::{ReviewStatus, SuccessStory};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::StoryRequest;
use crate::store::{StoryFilter, StoryStore};

const STORY_COLUMNS: &str = "id, title, content, author_name, author_email, beneficiary_name, \
     program_id, image_url, status, featured, submitted_by, published_at, created_at, updated_at";

#[derive(FromRow)]
struct StoryRow {
    id: Uuid,
    title: String,
    content: String,
    author_name: String,
    author_email: Option<String>,
    beneficiary_name: Option<String>,
    program_id: Option<Uuid>,
    image_url: Option<String>,
    status: String,
    featured: bool,
    submitted_by: Option<Uuid>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoryRow> for SuccessStory {
    type Error = AppError;

    fn try_from(r: StoryRow) -> Result<Self, Self::Error> {
        Ok(SuccessStory {
            id: r.id,
            title: r.title,
            content: r.content,
            author_name: r.author_name,
            author_email: r.author_email,
            beneficiary_name: r.beneficiary_name,
            program_id: r.program_id,
            image_url: r.image_url,
            status: parse_column(&r.status, "success_stories.status")?,
            featured: r.featured,
            submitted_by: r.submitted_by,
            published_at: r.published_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub struct PgStoryStore {
    pool: PgPool,
}

impl PgStoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoryStore for PgStoryStore {
    async fn create(&self, story: StoryRequest, submitted_by: Option<Uuid>) -> Result<SuccessStory, AppError> {
        let sql = format!(
            "INSERT INTO success_stories (id, title, content, author_name, author_email, beneficiary_name,
                                          program_id, image_url, status, featured, submitted_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10)
             RETURNING {}",
            STORY_COLUMNS
        );
        sqlx::query_as::<_, StoryRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&story.title)
            .bind(&story.content)
            .bind(&story.author_name)
            .bind(&story.author_email)
            .bind(&story.beneficiary_name)
            .bind(story.program_id)
            .bind(&story.image_url)
            .bind(ReviewStatus::Pending.as_str())
            .bind(submitted_by)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<SuccessStory>, AppError> {
        let sql = format!("SELECT {} FROM success_stories WHERE id = $1", STORY_COLUMNS);
        sqlx::query_as::<_, StoryRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(SuccessStory::try_from)
            .transpose()
    }

    async fn list(&self, filter: &StoryFilter, page: PageRequest) -> Result<Page<SuccessStory>, AppError> {
        fetch_page::<StoryRow, SuccessStory, _>(
            &self.pool,
            "success_stories",
            STORY_COLUMNS,
            "featured DESC, COALESCE(published_at, created_at) DESC",
            page,
            |qb| {
                if let Some(status) = filter.status {
                    qb.push(" AND status = ").push_bind(status.as_str());
                }
                if let Some(featured) = filter.featured {
                    qb.push(" AND featured = ").push_bind(featured);
                }
                if let Some(program_id) = filter.program_id {
                    qb.push(" AND program_id = ").push_bind(program_id);
                }
            },
        )
        .await
    }

    async fn review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        featured: Option<bool>,
    ) -> Result<SuccessStory, AppError> {
        let sql = format!(
            "UPDATE success_stories
             SET status = COALESCE($2, status),
                 featured = COALESCE($3, featured),
                 published_at = CASE
                     WHEN COALESCE($2, status) = 'approved' AND published_at IS NULL THEN NOW()
                     ELSE published_at
                 END,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            STORY_COLUMNS
        );
        sqlx::query_as::<_, StoryRow>(&sql)
            .bind(id)
            .bind(status.map(|s| s.as_str()))
            .bind(featured)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Success story".to_string()))?
            .try_into()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM success_stories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self, status: ReviewStatus) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM success_stories WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
