// Prometheus counters exposed on /metrics

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::core::errors::AppError;

pub struct Metrics {
    registry: Registry,
    pub donations_completed: IntCounter,
    pub amount_raised_cents: IntCounter,
    pub webhook_events: IntCounterVec,
    pub emails_sent: IntCounterVec,
    pub rate_limited: IntCounterVec,
}

impl Metrics {
    /// Each instance owns its registry so tests can build many
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new_custom(Some("gifted_giving".to_string()), None).map_err(metrics_error)?;

        let donations_completed = IntCounter::new(
            "donations_completed_total",
            "Donations that reached the completed status",
        )
        .map_err(metrics_error)?;
        let amount_raised_cents = IntCounter::new(
            "donations_raised_cents_total",
            "Sum of completed donation amounts in cents",
        )
        .map_err(metrics_error)?;
        let webhook_events = IntCounterVec::new(
            Opts::new("stripe_webhook_events_total", "Stripe webhook events received"),
            &["event_type", "outcome"],
        )
        .map_err(metrics_error)?;
        let emails_sent = IntCounterVec::new(
            Opts::new("emails_sent_total", "Transactional emails handed to the mailer"),
            &["template", "outcome"],
        )
        .map_err(metrics_error)?;
        let rate_limited = IntCounterVec::new(
            Opts::new("rate_limited_requests_total", "Requests rejected by the per-IP limit"),
            &["route"],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(donations_completed.clone())).map_err(metrics_error)?;
        registry.register(Box::new(amount_raised_cents.clone())).map_err(metrics_error)?;
        registry.register(Box::new(webhook_events.clone())).map_err(metrics_error)?;
        registry.register(Box::new(emails_sent.clone())).map_err(metrics_error)?;
        registry.register(Box::new(rate_limited.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            donations_completed,
            amount_raised_cents,
            webhook_events,
            emails_sent,
            rate_limited,
        })
    }

    pub fn record_completed(&self, amount_cents: i64) {
        self.donations_completed.inc();
        self.amount_raised_cents.inc_by(amount_cents.max(0) as u64);
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(format!("Metrics are not UTF-8: {}", e)))
    }
}

fn metrics_error(e: prometheus::Error) -> AppError {
    AppError::Internal(format!("Metrics error: {}", e))
}
