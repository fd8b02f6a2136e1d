// PostgreSQL-backed stores

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::core::errors::AppError;
use crate::core::pagination::{Page, PageRequest};
use crate::store::HealthCheck;

pub mod donations;
pub mod feedback;
pub mod newsletter;
pub mod programs;
pub mod stories;
pub mod users;
pub mod volunteers;

pub use donations::PgDonationStore;
pub use feedback::PgFeedbackStore;
pub use newsletter::PgNewsletterStore;
pub use programs::PgProgramStore;
pub use stories::PgStoryStore;
pub use users::PgUserStore;
pub use volunteers::PgVolunteerStore;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Open the connection pool, failing fast when the database is unreachable
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

    info!(max_connections, "Database pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
    info!("Database migrations applied");
    Ok(())
}

/// Decode a TEXT column into one of the model enums
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, AppError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| AppError::Database(format!("Bad value in column {}: {}", column, e)))
}

/// `%term%` for LIKE, with the wildcards in `term` escaped
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Count and fetch one page of `table`.
///
/// `push_filters` appends ` AND ...` conditions; it runs once for the count
/// and once for the select so both see the same WHERE clause.
pub(crate) async fn fetch_page<R, T, F>(
    pool: &PgPool,
    table: &str,
    columns: &str,
    order_by: &str,
    page: PageRequest,
    push_filters: F,
) -> Result<Page<T>, AppError>
where
    R: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    T: TryFrom<R, Error = AppError>,
    F: Fn(&mut QueryBuilder<'_, Postgres>),
{
    let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE TRUE", table));
    push_filters(&mut count);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut select = QueryBuilder::new(format!("SELECT {} FROM {} WHERE TRUE", columns, table));
    push_filters(&mut select);
    select
        .push(format!(" ORDER BY {} LIMIT ", order_by))
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<R> = select.build_query_as::<R>().fetch_all(pool).await?;
    let items = rows
        .into_iter()
        .map(T::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(items, total, page))
}

pub struct PgHealthCheck {
    pool: PgPool,
}

impl PgHealthCheck {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HealthCheck for PgHealthCheck {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
