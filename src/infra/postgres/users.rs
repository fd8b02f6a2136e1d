// User accounts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{fetch_page, like_pattern, parse_column};
use crate::core::errors::AppError;
use crate::core::models::{User, UserRole};
use crate::core::pagination::{Page, PageRequest};
use crate::store::{NewUser, UserFilter, UserStore};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, phone, is_active, last_login_at, created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    phone: Option<String>,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: parse_column(&r.role, "users.role")?,
            phone: r.phone,
            is_active: r.is_active,
            last_login_at: r.last_login_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn found(row: Option<UserRow>) -> Result<User, AppError> {
    row.ok_or_else(|| AppError::NotFound("User".to_string()))?
        .try_into()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, role, phone)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(user.email.to_lowercase())
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(&user.phone)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE LOWER(email) = LOWER($1)", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_profile(&self, id: Uuid, name: Option<String>, phone: Option<String>) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users
             SET name = COALESCE($2, name), phone = COALESCE($3, phone), updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(name)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        found(row)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, filter: &UserFilter, page: PageRequest) -> Result<Page<User>, AppError> {
        fetch_page::<UserRow, User, _>(
            &self.pool,
            "users",
            USER_COLUMNS,
            "created_at DESC",
            page,
            |qb| {
                if let Some(ref search) = filter.search {
                    let pattern = like_pattern(search);
                    qb.push(" AND (LOWER(name) LIKE ")
                        .push_bind(pattern.clone())
                        .push(" OR LOWER(email) LIKE ")
                        .push_bind(pattern)
                        .push(")");
                }
                if let Some(role) = filter.role {
                    qb.push(" AND role = ").push_bind(role.as_str());
                }
            },
        )
        .await
    }

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?;
        found(row)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?;
        found(row)
    }

    async fn count(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
