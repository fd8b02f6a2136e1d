// Transactional email: rendering with tera, delivery in the background

pub mod mailer;
pub mod templates;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tera::{Context, Tera};
use tracing::{error, info};

use crate::core::errors::AppError;
use crate::core::models::{
    Donation, NewsletterSubscription, ReviewStatus, SuccessStory, VolunteerApplication,
};
use crate::metrics::Metrics;
use templates::EmailTemplate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError>;
}

/// `$1,234.50` style amount
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

fn humanize(value: &str) -> String {
    value.replace('_', " ")
}

/// Renders and sends notification emails.
///
/// Delivery runs on a spawned task; failures are logged and counted, never
/// returned to the request that triggered them.
pub struct Notifier {
    tera: Arc<Tera>,
    mailer: Arc<dyn Mailer>,
    metrics: Arc<Metrics>,
    from: String,
    client_url: String,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        metrics: Arc<Metrics>,
        from: &str,
        client_url: &str,
    ) -> Result<Self, AppError> {
        Ok(Self {
            tera: Arc::new(templates::load()?),
            mailer,
            metrics,
            from: from.to_string(),
            client_url: client_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn donation_receipt(&self, donation: &Donation, program_title: Option<&str>) {
        let mut context = Context::new();
        context.insert("donor_name", &donation.donor_name);
        context.insert("amount", &format_cents(donation.amount_cents));
        context.insert("frequency", &humanize(donation.frequency.as_str()));
        context.insert("payment_method", &humanize(donation.payment_method.as_str()));
        context.insert("program_title", &program_title);
        context.insert("donation_id", &donation.id.to_string());
        context.insert(
            "date",
            &donation
                .completed_at
                .unwrap_or(donation.created_at)
                .format("%B %-d, %Y")
                .to_string(),
        );
        context.insert("dedication", &donation.dedication);
        self.dispatch(EmailTemplate::DonationReceipt, &donation.donor_email, context);
    }

    pub fn volunteer_received(&self, application: &VolunteerApplication) {
        let mut context = Context::new();
        context.insert("name", &application.name);
        context.insert("availability", application.availability.as_str());
        context.insert("interests", &application.interests);
        self.dispatch(EmailTemplate::VolunteerReceived, &application.email, context);
    }

    pub fn volunteer_decision(&self, application: &VolunteerApplication) {
        let mut context = Context::new();
        context.insert("name", &application.name);
        context.insert("approved", &(application.status == ReviewStatus::Approved));
        context.insert("notes", &application.admin_notes);
        self.dispatch(EmailTemplate::VolunteerDecision, &application.email, context);
    }

    /// `unsubscribe_token` is the plaintext token; only its hash is stored
    pub fn newsletter_welcome(&self, subscription: &NewsletterSubscription, unsubscribe_token: &str) {
        let mut context = Context::new();
        context.insert("name", &subscription.name);
        context.insert(
            "unsubscribe_url",
            &format!("{}/unsubscribe?token={}", self.client_url, unsubscribe_token),
        );
        self.dispatch(EmailTemplate::NewsletterWelcome, &subscription.email, context);
    }

    /// No-op for stories submitted without an author email
    pub fn story_received(&self, story: &SuccessStory) {
        let Some(to) = story.author_email.as_deref() else {
            return;
        };
        let mut context = Context::new();
        context.insert("author_name", &story.author_name);
        context.insert("title", &story.title);
        self.dispatch(EmailTemplate::StoryReceived, to, context);
    }

    pub(crate) fn render(
        &self,
        template: EmailTemplate,
        to: &str,
        mut context: Context,
    ) -> Result<OutgoingEmail, AppError> {
        context.insert("client_url", &self.client_url);
        let html = self.tera.render(template.name(), &context).map_err(|e| {
            AppError::Internal(format!("Failed to render {}: {}", template.name(), e))
        })?;

        Ok(OutgoingEmail {
            from: self.from.clone(),
            to: to.to_string(),
            subject: template.subject().to_string(),
            html,
        })
    }

    fn dispatch(&self, template: EmailTemplate, to: &str, context: Context) {
        let email = match self.render(template, to, context) {
            Ok(email) => email,
            Err(e) => {
                error!(template = template.label(), error = %e, "Failed to render email");
                self.metrics
                    .emails_sent
                    .with_label_values(&[template.label(), "render_error"])
                    .inc();
                return;
            }
        };

        let mailer = Arc::clone(&self.mailer);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => {
                    info!(template = template.label(), to = %email.to, "Email sent");
                    metrics.emails_sent.with_label_values(&[template.label(), "sent"]).inc();
                }
                Err(e) => {
                    error!(template = template.label(), to = %email.to, error = %e, "Failed to send email");
                    metrics.emails_sent.with_label_values(&[template.label(), "failed"]).inc();
                }
            }
        });
    }
}
