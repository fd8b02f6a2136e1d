// Main entry point for the Gifted Giving API

use anyhow::Context;
use clap::{Parser, Subcommand};
use gifted_giving::api::{create_router, AppState};
use gifted_giving::auth::audit_logger::AuditLogger;
use gifted_giving::auth::password::hash_password;
use gifted_giving::auth::token::TokenIssuer;
use gifted_giving::config::Config;
use gifted_giving::core::errors::AppError;
use gifted_giving::core::models::UserRole;
use gifted_giving::core::requests::RegisterRequest;
use gifted_giving::infra::postgres::{
    self, PgDonationStore, PgFeedbackStore, PgHealthCheck, PgNewsletterStore, PgProgramStore,
    PgStoryStore, PgUserStore, PgVolunteerStore,
};
use gifted_giving::infra::uploads::UploadStore;
use gifted_giving::metrics::Metrics;
use gifted_giving::notify::mailer::{HttpMailer, LogMailer};
use gifted_giving::notify::{Mailer, Notifier};
use gifted_giving::payments::stripe::StripeClient;
use gifted_giving::state::redis_store::RedisStore;
use gifted_giving::state::stats_cache::{StatsCache, DEFAULT_STATS_TTL};
use gifted_giving::store::{NewUser, UserStore};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "gifted-giving", version, about = "Gifted Giving donation platform API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Create an administrator account, or promote an existing one
    CreateAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.bind_address,
        port = config.port,
        log_level = %config.log_level,
        "Starting Gifted Giving API"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let pool = postgres::connect(&config.database_url, config.database_max_connections).await?;
            postgres::run_migrations(&pool).await?;
            Ok(())
        }
        Command::CreateAdmin { name, email, password } => create_admin(&config, name, email, password).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    // 1. Database
    let pool = postgres::connect(&config.database_url, config.database_max_connections).await?;
    if config.run_migrations {
        postgres::run_migrations(&pool).await?;
    }

    // 2. Redis
    let redis_store = Arc::new(RedisStore::new(&config.redis_url).await.map_err(|e| {
        error!(error = %e, "Failed to connect to Redis");
        e
    })?);
    info!("Redis store initialized");

    // 3. Stores
    let users = Arc::new(PgUserStore::new(pool.clone()));
    let donations = Arc::new(PgDonationStore::new(pool.clone()));

    // 4. Metrics and mail
    let metrics = Arc::new(Metrics::new()?);
    let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
        Some(relay_url) => Arc::new(HttpMailer::new(relay_url, config.mail_timeout_secs)?),
        None => {
            warn!("MAIL_RELAY_URL not set; emails are written to the log only");
            Arc::new(LogMailer)
        }
    };
    let notifier = Arc::new(Notifier::new(
        mailer,
        Arc::clone(&metrics),
        &config.mail_from,
        &config.client_url,
    )?);

    // 5. Payments
    let payments = Arc::new(StripeClient::new(
        &config.stripe_api_base,
        config.stripe_secret_key.clone(),
        config.stripe_timeout_secs,
    )?);
    info!(api_base = %config.stripe_api_base, "Stripe client initialized");

    // 6. Uploads
    let uploads = Arc::new(UploadStore::new(config.upload_dir.clone(), config.upload_max_bytes).await?);

    let app_state = AppState {
        users: users.clone(),
        programs: Arc::new(PgProgramStore::new(pool.clone())),
        donations: donations.clone(),
        volunteers: Arc::new(PgVolunteerStore::new(pool.clone())),
        stories: Arc::new(PgStoryStore::new(pool.clone())),
        feedback: Arc::new(PgFeedbackStore::new(pool.clone())),
        newsletter: Arc::new(PgNewsletterStore::new(pool.clone())),
        database: Arc::new(PgHealthCheck::new(pool.clone())),
        ephemeral: redis_store,
        payments,
        notifier,
        tokens: Arc::new(TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_secs)),
        stats_cache: Arc::new(StatsCache::new(donations, DEFAULT_STATS_TTL)),
        uploads,
        metrics,
        audit_logger: Arc::new(AuditLogger::new(Some(Arc::new(pool)))),
        config: Arc::new(config.clone()),
    };

    let router = create_router(app_state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind to address");
        e
    })?;
    info!(addr = %addr, "Server listening");

    // ConnectInfo backs the client IP used by rate limiting and audit logs
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            e
        })?;

    info!("Server shutdown complete");
    Ok(())
}

async fn create_admin(config: &Config, name: String, email: String, password: String) -> anyhow::Result<()> {
    let request = RegisterRequest {
        name,
        email,
        password,
        phone: None,
    }
    .validate()?;

    let pool = postgres::connect(&config.database_url, config.database_max_connections).await?;
    let users = PgUserStore::new(pool);
    let password_hash = hash_password(&request.password).await?;

    let created = users
        .create(NewUser {
            name: request.name,
            email: request.email.clone(),
            password_hash,
            role: UserRole::Admin,
            phone: None,
        })
        .await;

    match created {
        Ok(user) => info!(user_id = %user.id, email = %user.email, "Administrator created"),
        Err(AppError::Conflict(_)) => {
            let existing = users
                .find_by_email(&request.email)
                .await?
                .context("Conflicting user disappeared")?;
            let user = users.set_role(existing.id, UserRole::Admin).await?;
            info!(user_id = %user.id, email = %user.email, "Existing user promoted to administrator");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides `LOG_LEVEL`
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            info!("SIGTERM received, starting graceful shutdown");
        },
    }
}
