// Security event logging

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Authentication event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Register,
    LoginSuccess,
    LoginFailure { reason: String },
}

impl AuthEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuthEvent::Register => "REGISTER",
            AuthEvent::LoginSuccess => "LOGIN_SUCCESS",
            AuthEvent::LoginFailure { .. } => "LOGIN_FAILURE",
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            AuthEvent::LoginFailure { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Who and where an event came from
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit logger for security events
pub struct AuditLogger {
    db_pool: Option<Arc<PgPool>>,
}

impl AuditLogger {
    /// If `db_pool` is `None`, only structured logging is used
    pub fn new(db_pool: Option<Arc<PgPool>>) -> Self {
        Self { db_pool }
    }

    /// Fire-and-forget: spawns a task and never blocks or fails the request
    pub fn log_auth_event(&self, event: AuthEvent, context: AuthContext) {
        let db_pool = self.db_pool.clone();

        tokio::spawn(async move {
            match &event {
                AuthEvent::LoginFailure { reason } => {
                    warn!(
                        email = ?context.email,
                        ip_address = ?context.ip_address,
                        user_agent = ?context.user_agent,
                        reason = %reason,
                        "Login failed"
                    );
                }
                _ => {
                    info!(
                        event = event.event_type(),
                        user_id = ?context.user_id,
                        ip_address = ?context.ip_address,
                        user_agent = ?context.user_agent,
                        "Authentication event"
                    );
                }
            }

            if let Some(pool) = db_pool {
                // ip_address is validated by client_ip, so the INET cast cannot fail on format
                if let Err(e) = sqlx::query(
                    "INSERT INTO auth_audit_log (user_id, email, event_type, reason, ip_address, user_agent, created_at)
                     VALUES ($1, $2, $3, $4, $5::inet, $6, NOW())",
                )
                .bind(context.user_id)
                .bind(context.email.as_deref())
                .bind(event.event_type())
                .bind(event.reason())
                .bind(context.ip_address.as_deref())
                .bind(context.user_agent.as_deref())
                .execute(pool.as_ref())
                .await
                {
                    warn!(error = %e, "Failed to write audit log to database");
                }
            }
        });
    }
}
