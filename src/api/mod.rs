// Axum web server layer

use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    BoxError, Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod responses;

use crate::auth::audit_logger::AuditLogger;
use crate::auth::auth_middleware::{identify, AuthState};
use crate::auth::token::TokenIssuer;
use crate::infra::uploads::{UploadStore, UPLOADS_PREFIX};
use crate::metrics::Metrics;
use crate::notify::Notifier;
use crate::payments::PaymentGateway;
use crate::state::stats_cache::StatsCache;
use crate::store::{
    DonationStore, EphemeralStore, FeedbackStore, HealthCheck, NewsletterStore, ProgramStore,
    StoryStore, UserStore, VolunteerStore,
};
use middleware::{rate_limit, RateLimitState, RATE_LIMIT_WINDOW};

pub use crate::config::Config;

/// Multipart framing overhead allowed on top of the file limit
const UPLOAD_ENVELOPE_BYTES: usize = 64 * 1024;

/// Application state containing all shared dependencies
///
/// Every component is behind an `Arc` so cloning the state per request is
/// cheap; stores are trait objects so tests can swap in memory versions.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore + Send + Sync>,
    pub programs: Arc<dyn ProgramStore + Send + Sync>,
    pub donations: Arc<dyn DonationStore + Send + Sync>,
    pub volunteers: Arc<dyn VolunteerStore + Send + Sync>,
    pub stories: Arc<dyn StoryStore + Send + Sync>,
    pub feedback: Arc<dyn FeedbackStore + Send + Sync>,
    pub newsletter: Arc<dyn NewsletterStore + Send + Sync>,
    pub database: Arc<dyn HealthCheck + Send + Sync>,
    pub ephemeral: Arc<dyn EphemeralStore + Send + Sync>,
    pub payments: Arc<dyn PaymentGateway + Send + Sync>,
    pub notifier: Arc<Notifier>,
    pub tokens: Arc<TokenIssuer>,
    pub stats_cache: Arc<StatsCache>,
    pub uploads: Arc<UploadStore>,
    pub metrics: Arc<Metrics>,
    pub audit_logger: Arc<AuditLogger>,
    pub config: Arc<Config>,
}

/// Create the Axum router with all routes and middleware
///
/// Middleware stack (outermost to innermost):
/// - request id (set, then propagated to the response)
/// - tracing
/// - CORS for `CLIENT_URL`
/// - request timeout, answered with 408
/// - body size limit (separate, larger limit for uploads)
/// - `identify`: resolves the bearer token, if any, to an `AuthUser`
/// - per-IP rate limit on public POST routes (route layer)
pub fn create_router(app_state: AppState) -> Router {
    let auth_state = AuthState {
        tokens: Arc::clone(&app_state.tokens),
        users: Arc::clone(&app_state.users),
    };
    let rate_limit_state = RateLimitState {
        ephemeral: Arc::clone(&app_state.ephemeral),
        metrics: Arc::clone(&app_state.metrics),
        limit_per_window: app_state.config.rate_limit_per_minute as u64,
        window: RATE_LIMIT_WINDOW,
        trust_proxy: app_state.config.trust_proxy,
    };
    let config = Arc::clone(&app_state.config);

    // Paths with a public POST; GETs on the same paths are not counted
    let limited = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route(
            "/api/donations",
            post(handlers::donations::create).get(handlers::donations::list),
        )
        .route(
            "/api/stripe/create-payment-intent",
            post(handlers::stripe::create_payment_intent),
        )
        .route(
            "/api/volunteers",
            post(handlers::volunteers::create).get(handlers::volunteers::list),
        )
        .route(
            "/api/feedback",
            post(handlers::feedback::create).get(handlers::feedback::list),
        )
        .route(
            "/api/success-stories",
            post(handlers::stories::create).get(handlers::stories::list),
        )
        .route("/api/newsletter/subscribe", post(handlers::newsletter::subscribe))
        .route_layer(from_fn_with_state(rate_limit_state, rate_limit));

    let api = Router::new()
        // auth
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/profile", put(handlers::auth::update_profile))
        .route("/api/auth/password", put(handlers::auth::change_password))
        // programs
        .route(
            "/api/programs",
            get(handlers::programs::list).post(handlers::programs::create),
        )
        .route(
            "/api/programs/:id",
            get(handlers::programs::get)
                .put(handlers::programs::update)
                .delete(handlers::programs::remove),
        )
        // donations
        .route("/api/donations/mine", get(handlers::donations::mine))
        .route("/api/donations/stats", get(handlers::donations::stats))
        .route("/api/donations/recent", get(handlers::donations::recent))
        .route("/api/donations/:id", get(handlers::donations::get))
        .route("/api/donations/:id/status", put(handlers::donations::update_status))
        // stripe
        .route("/api/stripe/config", get(handlers::stripe::config))
        .route("/api/stripe/webhook", post(handlers::stripe::webhook))
        .route("/api/stripe/refund/:id", post(handlers::stripe::refund))
        // volunteers
        .route("/api/volunteers/mine", get(handlers::volunteers::mine))
        .route("/api/volunteers/:id", get(handlers::volunteers::get))
        .route("/api/volunteers/:id/status", put(handlers::volunteers::review))
        // users
        .route("/api/users", get(handlers::users::list))
        .route("/api/users/dashboard", get(handlers::users::dashboard))
        .route("/api/users/:id/role", put(handlers::users::set_role))
        .route("/api/users/:id/active", put(handlers::users::set_active))
        // admin
        .route("/api/admin/dashboard", get(handlers::admin::dashboard))
        // feedback
        .route("/api/feedback/:id/status", put(handlers::feedback::set_status))
        // success stories
        .route(
            "/api/success-stories/:id",
            get(handlers::stories::get).delete(handlers::stories::remove),
        )
        .route("/api/success-stories/:id/review", put(handlers::stories::review))
        // newsletter
        .route("/api/newsletter/unsubscribe", post(handlers::newsletter::unsubscribe))
        .route("/api/newsletter/subscribers", get(handlers::newsletter::subscribers))
        .route("/api/newsletter/stats", get(handlers::newsletter::stats))
        .merge(limited)
        .layer(RequestBodyLimitLayer::new(config.body_size_limit_bytes));

    let upload_limit = config.upload_max_bytes + UPLOAD_ENVELOPE_BYTES;
    let uploads = Router::new()
        .route("/api/upload", post(handlers::upload::upload))
        .route("/api/upload/:filename", delete(handlers::upload::remove))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(RequestBodyLimitLayer::new(upload_limit));

    let router = Router::new()
        .merge(api)
        .merge(uploads)
        .layer(from_fn_with_state(auth_state, identify))
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .nest_service(UPLOADS_PREFIX, ServeDir::new(app_state.uploads.dir()))
        .fallback(not_found)
        .with_state(app_state);

    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors_layer(&config.client_url))
        // HandleErrorLayer must come before the timeout to catch its error
        .layer(HandleErrorLayer::new(|e: BoxError| async move {
            let (status, message) = if e.is::<tower::timeout::error::Elapsed>() {
                (StatusCode::REQUEST_TIMEOUT, "Request timed out".to_string())
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            };
            (status, Json(json!({ "error": message })))
        }))
        .timeout(Duration::from_secs(config.request_timeout_secs));

    router.layer(middleware_stack)
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(client_url.trim_end_matches('/')) {
        Ok(origin) => base.allow_origin(origin),
        Err(e) => {
            warn!(error = %e, client_url = %client_url, "Invalid CLIENT_URL, cross-origin requests disabled");
            base
        }
    }
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Route not found" })))
}
