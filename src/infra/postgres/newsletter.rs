// Newsletter subscriptions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{fetch_page, parse_column};
use crate::auth::opaque_token::TokenHash;
use crate::core::errors::AppError;
use crate::core::models::{NewsletterSubscription, SubscriptionStatus};
use crate::core::pagination::{Page, PageRequest};
use crate::core::requests::NewsletterRequest;
use crate::store::{NewsletterStats, NewsletterStore, SubscribeOutcome};

const SUBSCRIPTION_COLUMNS: &str =
    "id, email, name, status, source, unsubscribe_token_hash, subscribed_at, unsubscribed_at";

#[derive(FromRow)]
struct SubscriptionRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    status: String,
    source: Option<String>,
    unsubscribe_token_hash: String,
    subscribed_at: DateTime<Utc>,
    unsubscribed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for NewsletterSubscription {
    type Error = AppError;

    fn try_from(r: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(NewsletterSubscription {
            id: r.id,
            email: r.email,
            name: r.name,
            status: parse_column(&r.status, "newsletter_subscriptions.status")?,
            source: r.source,
            unsubscribe_token_hash: r.unsubscribe_token_hash,
            subscribed_at: r.subscribed_at,
            unsubscribed_at: r.unsubscribed_at,
        })
    }
}

#[derive(FromRow)]
struct StatsRow {
    subscribed: i64,
    unsubscribed: i64,
}

pub struct PgNewsletterStore {
    pool: PgPool,
}

impl PgNewsletterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NewsletterStore for PgNewsletterStore {
    async fn subscribe(&self, request: &NewsletterRequest, token_hash: &TokenHash) -> Result<SubscribeOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM newsletter_subscriptions WHERE LOWER(email) = LOWER($1) FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        );
        let existing: Option<NewsletterSubscription> = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(&request.email)
            .fetch_optional(&mut *tx)
            .await?
            .map(NewsletterSubscription::try_from)
            .transpose()?;

        let outcome = match existing {
            Some(sub) if sub.status == SubscriptionStatus::Subscribed => {
                return Err(AppError::Conflict(
                    "This email is already subscribed".to_string(),
                ));
            }
            Some(sub) => {
                let sql = format!(
                    "UPDATE newsletter_subscriptions
                     SET status = $2, name = COALESCE($3, name), source = COALESCE($4, source),
                         unsubscribe_token_hash = $5, subscribed_at = NOW(), unsubscribed_at = NULL
                     WHERE id = $1
                     RETURNING {}",
                    SUBSCRIPTION_COLUMNS
                );
                let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
                    .bind(sub.id)
                    .bind(SubscriptionStatus::Subscribed.as_str())
                    .bind(&request.name)
                    .bind(&request.source)
                    .bind(token_hash.as_str())
                    .fetch_one(&mut *tx)
                    .await?;
                SubscribeOutcome::Resubscribed(row.try_into()?)
            }
            None => {
                let sql = format!(
                    "INSERT INTO newsletter_subscriptions (id, email, name, status, source, unsubscribe_token_hash)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING {}",
                    SUBSCRIPTION_COLUMNS
                );
                let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(request.email.to_lowercase())
                    .bind(&request.name)
                    .bind(SubscriptionStatus::Subscribed.as_str())
                    .bind(&request.source)
                    .bind(token_hash.as_str())
                    .fetch_one(&mut *tx)
                    .await?;
                SubscribeOutcome::Created(row.try_into()?)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn unsubscribe(&self, token_hash: &TokenHash) -> Result<NewsletterSubscription, AppError> {
        let sql = format!(
            "UPDATE newsletter_subscriptions
             SET status = $2, unsubscribed_at = COALESCE(unsubscribed_at, NOW())
             WHERE unsubscribe_token_hash = $1
             RETURNING {}",
            SUBSCRIPTION_COLUMNS
        );
        sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(token_hash.as_str())
            .bind(SubscriptionStatus::Unsubscribed.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription".to_string()))?
            .try_into()
    }

    async fn list(&self, status: Option<SubscriptionStatus>, page: PageRequest) -> Result<Page<NewsletterSubscription>, AppError> {
        fetch_page::<SubscriptionRow, NewsletterSubscription, _>(
            &self.pool,
            "newsletter_subscriptions",
            SUBSCRIPTION_COLUMNS,
            "subscribed_at DESC",
            page,
            |qb| {
                if let Some(status) = status {
                    qb.push(" AND status = ").push_bind(status.as_str());
                }
            },
        )
        .await
    }

    async fn stats(&self) -> Result<NewsletterStats, AppError> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT COUNT(*) FILTER (WHERE status = 'subscribed') AS subscribed,
                    COUNT(*) FILTER (WHERE status = 'unsubscribed') AS unsubscribed
             FROM newsletter_subscriptions",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(NewsletterStats {
            subscribed: row.subscribed,
            unsubscribed: row.unsubscribed,
        })
    }
}
