// Common test utilities: in-memory stores, mock gateways and an app builder

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Months, Utc};
use gifted_giving::api::{create_router, AppState};
use gifted_giving::auth::audit_logger::AuditLogger;
use gifted_giving::auth::opaque_token::TokenHash;
use gifted_giving::auth::password::hash_password;
use gifted_giving::auth::token::TokenIssuer;
use gifted_giving::config::Config;
use gifted_giving::core::errors::AppError;
use gifted_giving::core::impact::{plan_transition, TransitionPlan, TransitionTrigger};
use gifted_giving::core::models::*;
use gifted_giving::core::pagination::{Page, PageRequest};
use gifted_giving::core::requests::{
    FeedbackRequest, NewsletterRequest, ProgramRequest, StoryRequest, VolunteerRequest,
};
use gifted_giving::core::stats::{
    DonationStats, DonorSummary, FrequencyTotal, MonthTotal, ProgramTotal, STATS_MONTHS,
};
use gifted_giving::infra::uploads::UploadStore;
use gifted_giving::metrics::Metrics;
use gifted_giving::notify::{Mailer, Notifier, OutgoingEmail};
use gifted_giving::payments::{CreateIntent, PaymentGateway, PaymentIntent, Refund};
use gifted_giving::state::stats_cache::StatsCache;
use gifted_giving::store::*;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-42";

fn page_of<T: Clone>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = items.len() as i64;
    Page::new(page.slice(&items), total, page)
}

/// In-memory version of the Postgres stats query: completed donations only,
/// trailing `STATS_MONTHS` months, groups ordered by total (months by date)
pub fn donation_stats(donations: &[Donation], programs: &[Program], now: DateTime<Utc>) -> DonationStats {
    let completed: Vec<&Donation> = donations
        .iter()
        .filter(|d| d.status == DonationStatus::Completed)
        .collect();

    let total_raised_cents: i64 = completed.iter().map(|d| d.amount_cents).sum();
    let donation_count = completed.len() as i64;
    let unique_donors = completed
        .iter()
        .map(|d| d.donor_email.to_lowercase())
        .collect::<HashSet<_>>()
        .len() as i64;
    let average_cents = if donation_count > 0 {
        total_raised_cents / donation_count
    } else {
        0
    };

    let titles: HashMap<Uuid, &str> = programs.iter().map(|p| (p.id, p.title.as_str())).collect();
    let mut per_program: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for donation in &completed {
        if let Some(program_id) = donation.program_id {
            let entry = per_program.entry(program_id).or_default();
            entry.0 += donation.amount_cents;
            entry.1 += 1;
        }
    }
    let mut by_program: Vec<ProgramTotal> = per_program
        .into_iter()
        .filter_map(|(program_id, (total_cents, count))| {
            titles.get(&program_id).map(|title| ProgramTotal {
                program_id,
                title: title.to_string(),
                total_cents,
                count,
            })
        })
        .collect();
    by_program.sort_by(|a, b| b.total_cents.cmp(&a.total_cents).then(a.title.cmp(&b.title)));

    let since = now
        .checked_sub_months(Months::new(STATS_MONTHS))
        .unwrap_or(now);
    let mut per_month: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for donation in &completed {
        let at = donation.completed_at.unwrap_or(donation.created_at);
        if at >= since {
            let entry = per_month.entry(at.format("%Y-%m").to_string()).or_default();
            entry.0 += donation.amount_cents;
            entry.1 += 1;
        }
    }
    let by_month = per_month
        .into_iter()
        .map(|(month, (total_cents, count))| MonthTotal {
            month,
            total_cents,
            count,
        })
        .collect();

    let mut per_frequency: HashMap<DonationFrequency, (i64, i64)> = HashMap::new();
    for donation in &completed {
        let entry = per_frequency.entry(donation.frequency).or_default();
        entry.0 += donation.amount_cents;
        entry.1 += 1;
    }
    let mut by_frequency: Vec<FrequencyTotal> = per_frequency
        .into_iter()
        .map(|(frequency, (total_cents, count))| FrequencyTotal {
            frequency,
            total_cents,
            count,
        })
        .collect();
    by_frequency.sort_by(|a, b| {
        b.total_cents
            .cmp(&a.total_cents)
            .then(a.frequency.as_str().cmp(b.frequency.as_str()))
    });

    DonationStats {
        total_raised_cents,
        donation_count,
        unique_donors,
        average_cents,
        by_program,
        by_month,
        by_frequency,
    }
}

pub fn donor_summary<'a>(donations: impl IntoIterator<Item = &'a Donation>) -> DonorSummary {
    let mut summary = DonorSummary::default();
    let mut programs = HashSet::new();
    for donation in donations {
        if donation.status != DonationStatus::Completed {
            continue;
        }
        summary.total_given_cents += donation.amount_cents;
        summary.donation_count += 1;
        if let Some(program_id) = donation.program_id {
            programs.insert(program_id);
        }
        let at = donation.completed_at.unwrap_or(donation.created_at);
        if summary.last_donation_at.map_or(true, |last| at > last) {
            summary.last_donation_at = Some(at);
        }
    }
    summary.programs_supported = programs.len() as i64;
    summary
}

/// Newest first, like the SQL stores
fn newest_first<T: Clone>(items: &[T]) -> Vec<T> {
    items.iter().rev().cloned().collect()
}

/// One in-memory database backing every store trait
#[derive(Default)]
pub struct MemoryStore {
    pub users: Mutex<Vec<User>>,
    pub programs: Mutex<Vec<Program>>,
    pub donations: Mutex<Vec<Donation>>,
    pub volunteers: Mutex<Vec<VolunteerApplication>>,
    pub stories: Mutex<Vec<SuccessStory>>,
    pub feedback: Mutex<Vec<Feedback>>,
    pub subscriptions: Mutex<Vec<NewsletterSubscription>>,
}

impl MemoryStore {
    pub fn program(&self, id: Uuid) -> Option<Program> {
        self.programs.lock().unwrap().iter().find(|p| p.id == id).cloned()
    }

    pub fn donation(&self, id: Uuid) -> Option<Donation> {
        self.donations.lock().unwrap().iter().find(|d| d.id == id).cloned()
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict("Email is already in use".to_string()));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email.to_lowercase(),
            password_hash: user.password_hash,
            role: user.role,
            phone: user.phone,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, name: Option<String>, phone: Option<String>) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        if let Some(name) = name {
            user.name = name;
        }
        if phone.is_some() {
            user.phone = phone;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn record_login(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list(&self, filter: &UserFilter, page: PageRequest) -> Result<Page<User>, AppError> {
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let users: Vec<User> = newest_first(&self.users.lock().unwrap())
            .into_iter()
            .filter(|u| filter.role.map_or(true, |r| u.role == r))
            .filter(|u| {
                search.as_ref().map_or(true, |s| {
                    u.name.to_lowercase().contains(s) || u.email.to_lowercase().contains(s)
                })
            })
            .collect();
        Ok(page_of(users, page))
    }

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        user.is_active = is_active;
        Ok(user.clone())
    }

    async fn count(&self) -> Result<i64, AppError> {
        Ok(self.users.lock().unwrap().len() as i64)
    }
}

#[async_trait::async_trait]
impl ProgramStore for MemoryStore {
    async fn create(&self, program: ProgramRequest, created_by: Option<Uuid>) -> Result<Program, AppError> {
        let now = Utc::now();
        let created = Program {
            id: Uuid::new_v4(),
            title: program.title,
            description: program.description,
            category: program.category,
            image_url: program.image_url,
            location: program.location,
            goal_cents: program.goal_cents,
            raised_cents: 0,
            donor_count: 0,
            cost_per_beneficiary_cents: program.cost_per_beneficiary_cents,
            beneficiaries_reached: 0,
            status: program.status.unwrap_or(ProgramStatus::Active),
            featured: program.featured.unwrap_or(false),
            start_date: program.start_date.unwrap_or(now),
            end_date: program.end_date,
            created_by,
            created_at: now,
            updated_at: now,
        };
        self.programs.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Program>, AppError> {
        Ok(self.program(id))
    }

    async fn list(&self, filter: &ProgramFilter, page: PageRequest) -> Result<Page<Program>, AppError> {
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut programs: Vec<Program> = newest_first(&self.programs.lock().unwrap())
            .into_iter()
            .filter(|p| filter.category.map_or(true, |c| p.category == c))
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| filter.featured.map_or(true, |f| p.featured == f))
            .filter(|p| {
                search.as_ref().map_or(true, |s| {
                    p.title.to_lowercase().contains(s) || p.description.to_lowercase().contains(s)
                })
            })
            .collect();
        programs.sort_by_key(|p| !p.featured);
        Ok(page_of(programs, page))
    }

    async fn update(&self, program: &Program) -> Result<Program, AppError> {
        let mut programs = self.programs.lock().unwrap();
        let stored = programs
            .iter_mut()
            .find(|p| p.id == program.id)
            .ok_or_else(|| AppError::NotFound("Program".to_string()))?;
        let (raised, donors, reached) = (stored.raised_cents, stored.donor_count, stored.beneficiaries_reached);
        *stored = program.clone();
        stored.raised_cents = raised;
        stored.donor_count = donors;
        stored.beneficiaries_reached = reached;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut programs = self.programs.lock().unwrap();
        let before = programs.len();
        programs.retain(|p| p.id != id);
        if programs.len() == before {
            return Ok(false);
        }
        for donation in self.donations.lock().unwrap().iter_mut() {
            if donation.program_id == Some(id) {
                donation.program_id = None;
            }
        }
        Ok(true)
    }

    async fn count_active(&self) -> Result<i64, AppError> {
        Ok(self
            .programs
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == ProgramStatus::Active)
            .count() as i64)
    }
}

fn donor_matches(donation: &Donation, donor: &DonorKey) -> bool {
    donation.user_id == Some(donor.user_id) || donation.donor_email.eq_ignore_ascii_case(&donor.email)
}

#[async_trait::async_trait]
impl DonationStore for MemoryStore {
    async fn create(&self, donation: NewDonation) -> Result<Donation, AppError> {
        let now = Utc::now();
        let created = Donation {
            id: Uuid::new_v4(),
            user_id: donation.user_id,
            program_id: donation.program_id,
            donor_name: donation.donor_name,
            donor_email: donation.donor_email,
            amount_cents: donation.amount_cents,
            currency: donation.currency,
            frequency: donation.frequency,
            payment_method: donation.payment_method,
            status: DonationStatus::Pending,
            stripe_payment_intent_id: None,
            is_anonymous: donation.is_anonymous,
            message: donation.message,
            dedication: donation.dedication,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            refunded_at: None,
        };
        self.donations.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Donation>, AppError> {
        Ok(self.donation(id))
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Donation>, AppError> {
        Ok(self
            .donations
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.stripe_payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn attach_payment_intent(&self, id: Uuid, payment_intent_id: &str) -> Result<Donation, AppError> {
        let mut donations = self.donations.lock().unwrap();
        let donation = donations
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound("Donation".to_string()))?;
        donation.stripe_payment_intent_id = Some(payment_intent_id.to_string());
        Ok(donation.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        to: DonationStatus,
        trigger: TransitionTrigger,
        failure_reason: Option<String>,
    ) -> Result<Transition, AppError> {
        let mut donations = self.donations.lock().unwrap();
        let donation = donations
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| AppError::NotFound("Donation".to_string()))?;

        let mut programs = self.programs.lock().unwrap();
        let program = donation
            .program_id
            .and_then(|pid| programs.iter_mut().find(|p| p.id == pid));
        let cost = program.as_ref().and_then(|p| p.cost_per_beneficiary_cents);

        let delta = match plan_transition(donation.status, to, trigger, donation.amount_cents, cost)? {
            TransitionPlan::Unchanged => {
                return Ok(Transition {
                    donation: donation.clone(),
                    changed: false,
                })
            }
            TransitionPlan::Apply { delta } => delta,
        };

        if let Some(program) = program {
            let (raised, donors, reached) =
                delta.apply(program.raised_cents, program.donor_count, program.beneficiaries_reached);
            program.raised_cents = raised;
            program.donor_count = donors;
            program.beneficiaries_reached = reached;
        }

        let now = Utc::now();
        donation.status = to;
        donation.updated_at = now;
        match to {
            DonationStatus::Completed => {
                donation.completed_at = Some(now);
                donation.failure_reason = None;
            }
            DonationStatus::Refunded => donation.refunded_at = Some(now),
            DonationStatus::Failed => donation.failure_reason = failure_reason,
            DonationStatus::Pending => {}
        }

        Ok(Transition {
            donation: donation.clone(),
            changed: true,
        })
    }

    async fn list(&self, filter: &DonationFilter, page: PageRequest) -> Result<Page<Donation>, AppError> {
        let donations: Vec<Donation> = newest_first(&self.donations.lock().unwrap())
            .into_iter()
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| filter.program_id.map_or(true, |p| d.program_id == Some(p)))
            .filter(|d| filter.donor.as_ref().map_or(true, |k| donor_matches(d, k)))
            .filter(|d| {
                filter
                    .email
                    .as_ref()
                    .map_or(true, |e| d.donor_email.eq_ignore_ascii_case(e))
            })
            .filter(|d| filter.from.map_or(true, |from| d.created_at >= from))
            .filter(|d| filter.to.map_or(true, |to| d.created_at <= to))
            .collect();
        Ok(page_of(donations, page))
    }

    async fn stats(&self, now: chrono::DateTime<Utc>) -> Result<DonationStats, AppError> {
        let donations = self.donations.lock().unwrap().clone();
        let programs = self.programs.lock().unwrap().clone();
        Ok(donation_stats(&donations, &programs, now))
    }

    async fn recent_completed(&self, limit: i64) -> Result<Vec<Donation>, AppError> {
        let mut completed: Vec<Donation> = self
            .donations
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.status == DonationStatus::Completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        completed.truncate(limit as usize);
        Ok(completed)
    }

    async fn donor_summary(&self, donor: &DonorKey) -> Result<DonorSummary, AppError> {
        let donations = self.donations.lock().unwrap();
        Ok(donor_summary(donations.iter().filter(|d| donor_matches(d, donor))))
    }

    async fn count_by_status(&self, status: DonationStatus) -> Result<i64, AppError> {
        Ok(self
            .donations
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.status == status)
            .count() as i64)
    }
}

#[async_trait::async_trait]
impl VolunteerStore for MemoryStore {
    async fn create(&self, application: VolunteerRequest, user_id: Option<Uuid>) -> Result<VolunteerApplication, AppError> {
        let now = Utc::now();
        let created = VolunteerApplication {
            id: Uuid::new_v4(),
            user_id,
            program_id: application.program_id,
            name: application.name,
            email: application.email,
            phone: application.phone,
            availability: application.availability,
            interests: application.interests,
            skills: application.skills,
            experience: application.experience,
            motivation: application.motivation,
            status: ReviewStatus::Pending,
            admin_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.volunteers.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<VolunteerApplication>, AppError> {
        Ok(self.volunteers.lock().unwrap().iter().find(|v| v.id == id).cloned())
    }

    async fn has_pending(&self, email: &str, program_id: Option<Uuid>) -> Result<bool, AppError> {
        Ok(self.volunteers.lock().unwrap().iter().any(|v| {
            v.status == ReviewStatus::Pending && v.email.eq_ignore_ascii_case(email) && v.program_id == program_id
        }))
    }

    async fn list(&self, filter: &VolunteerFilter, page: PageRequest) -> Result<Page<VolunteerApplication>, AppError> {
        let applications: Vec<VolunteerApplication> = newest_first(&self.volunteers.lock().unwrap())
            .into_iter()
            .filter(|v| filter.status.map_or(true, |s| v.status == s))
            .filter(|v| filter.program_id.map_or(true, |p| v.program_id == Some(p)))
            .filter(|v| filter.email.as_ref().map_or(true, |e| v.email.eq_ignore_ascii_case(e)))
            .filter(|v| filter.user_id.map_or(true, |u| v.user_id == Some(u)))
            .collect();
        Ok(page_of(applications, page))
    }

    async fn review(
        &self,
        id: Uuid,
        status: ReviewStatus,
        admin_notes: Option<String>,
        reviewer: Uuid,
    ) -> Result<VolunteerApplication, AppError> {
        let mut volunteers = self.volunteers.lock().unwrap();
        let application = volunteers
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| AppError::NotFound("Volunteer application".to_string()))?;
        let now = Utc::now();
        application.status = status;
        if admin_notes.is_some() {
            application.admin_notes = admin_notes;
        }
        application.reviewed_by = Some(reviewer);
        application.reviewed_at = Some(now);
        application.updated_at = now;
        Ok(application.clone())
    }

    async fn count_by_status(&self, status: ReviewStatus) -> Result<i64, AppError> {
        Ok(self
            .volunteers
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.status == status)
            .count() as i64)
    }
}

#[async_trait::async_trait]
impl StoryStore for MemoryStore {
    async fn create(&self, story: StoryRequest, submitted_by: Option<Uuid>) -> Result<SuccessStory, AppError> {
        let now = Utc::now();
        let created = SuccessStory {
            id: Uuid::new_v4(),
            title: story.title,
            content: story.content,
            author_name: story.author_name,
            author_email: story.author_email,
            beneficiary_name: story.beneficiary_name,
            program_id: story.program_id,
            image_url: story.image_url,
            status: ReviewStatus::Pending,
            featured: false,
            submitted_by,
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        self.stories.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<SuccessStory>, AppError> {
        Ok(self.stories.lock().unwrap().iter().find(|s| s.id == id).cloned())
    }

    async fn list(&self, filter: &StoryFilter, page: PageRequest) -> Result<Page<SuccessStory>, AppError> {
        let mut stories: Vec<SuccessStory> = newest_first(&self.stories.lock().unwrap())
            .into_iter()
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| filter.featured.map_or(true, |f| s.featured == f))
            .filter(|s| filter.program_id.map_or(true, |p| s.program_id == Some(p)))
            .collect();
        stories.sort_by_key(|s| !s.featured);
        Ok(page_of(stories, page))
    }

    async fn review(
        &self,
        id: Uuid,
        status: Option<ReviewStatus>,
        featured: Option<bool>,
    ) -> Result<SuccessStory, AppError> {
        let mut stories = self.stories.lock().unwrap();
        let story = stories
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound("Success story".to_string()))?;
        if let Some(status) = status {
            story.status = status;
            if status == ReviewStatus::Approved && story.published_at.is_none() {
                story.published_at = Some(Utc::now());
            }
        }
        if let Some(featured) = featured {
            story.featured = featured;
        }
        story.updated_at = Utc::now();
        Ok(story.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut stories = self.stories.lock().unwrap();
        let before = stories.len();
        stories.retain(|s| s.id != id);
        Ok(stories.len() != before)
    }

    async fn count_by_status(&self, status: ReviewStatus) -> Result<i64, AppError> {
        Ok(self
            .stories
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.status == status)
            .count() as i64)
    }
}

#[async_trait::async_trait]
impl FeedbackStore for MemoryStore {
    async fn create(&self, feedback: FeedbackRequest, user_id: Option<Uuid>) -> Result<Feedback, AppError> {
        let now = Utc::now();
        let created = Feedback {
            id: Uuid::new_v4(),
            user_id,
            kind: feedback.kind(),
            name: feedback.name,
            email: feedback.email,
            subject: feedback.subject,
            message: feedback.message,
            rating: feedback.rating,
            status: FeedbackStatus::New,
            created_at: now,
            updated_at: now,
        };
        self.feedback.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn list(&self, filter: &FeedbackFilter, page: PageRequest) -> Result<Page<Feedback>, AppError> {
        let items: Vec<Feedback> = newest_first(&self.feedback.lock().unwrap())
            .into_iter()
            .filter(|f| filter.status.map_or(true, |s| f.status == s))
            .filter(|f| filter.kind.map_or(true, |k| f.kind == k))
            .collect();
        Ok(page_of(items, page))
    }

    async fn set_status(&self, id: Uuid, status: FeedbackStatus) -> Result<Feedback, AppError> {
        let mut items = self.feedback.lock().unwrap();
        let feedback = items
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| AppError::NotFound("Feedback".to_string()))?;
        feedback.status = status;
        feedback.updated_at = Utc::now();
        Ok(feedback.clone())
    }

    async fn count_by_status(&self, status: FeedbackStatus) -> Result<i64, AppError> {
        Ok(self
            .feedback
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.status == status)
            .count() as i64)
    }
}

#[async_trait::async_trait]
impl NewsletterStore for MemoryStore {
    async fn subscribe(&self, request: &NewsletterRequest, token_hash: &TokenHash) -> Result<SubscribeOutcome, AppError> {
        let mut subs = self.subscriptions.lock().unwrap();
        let now = Utc::now();
        match subs.iter_mut().find(|s| s.email.eq_ignore_ascii_case(&request.email)) {
            Some(sub) if sub.status == SubscriptionStatus::Subscribed => {
                Err(AppError::Conflict("This email is already subscribed".to_string()))
            }
            Some(sub) => {
                sub.status = SubscriptionStatus::Subscribed;
                if request.name.is_some() {
                    sub.name = request.name.clone();
                }
                if request.source.is_some() {
                    sub.source = request.source.clone();
                }
                sub.unsubscribe_token_hash = token_hash.as_str().to_string();
                sub.subscribed_at = now;
                sub.unsubscribed_at = None;
                Ok(SubscribeOutcome::Resubscribed(sub.clone()))
            }
            None => {
                let sub = NewsletterSubscription {
                    id: Uuid::new_v4(),
                    email: request.email.to_lowercase(),
                    name: request.name.clone(),
                    status: SubscriptionStatus::Subscribed,
                    source: request.source.clone(),
                    unsubscribe_token_hash: token_hash.as_str().to_string(),
                    subscribed_at: now,
                    unsubscribed_at: None,
                };
                subs.push(sub.clone());
                Ok(SubscribeOutcome::Created(sub))
            }
        }
    }

    async fn unsubscribe(&self, token_hash: &TokenHash) -> Result<NewsletterSubscription, AppError> {
        let mut subs = self.subscriptions.lock().unwrap();
        let sub = subs
            .iter_mut()
            .find(|s| s.unsubscribe_token_hash == token_hash.as_str())
            .ok_or_else(|| AppError::NotFound("Subscription".to_string()))?;
        sub.status = SubscriptionStatus::Unsubscribed;
        if sub.unsubscribed_at.is_none() {
            sub.unsubscribed_at = Some(Utc::now());
        }
        Ok(sub.clone())
    }

    async fn list(&self, status: Option<SubscriptionStatus>, page: PageRequest) -> Result<Page<NewsletterSubscription>, AppError> {
        let subs: Vec<NewsletterSubscription> = newest_first(&self.subscriptions.lock().unwrap())
            .into_iter()
            .filter(|s| status.map_or(true, |st| s.status == st))
            .collect();
        Ok(page_of(subs, page))
    }

    async fn stats(&self) -> Result<NewsletterStats, AppError> {
        let subs = self.subscriptions.lock().unwrap();
        let subscribed = subs
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Subscribed)
            .count() as i64;
        Ok(NewsletterStats {
            subscribed,
            unsubscribed: subs.len() as i64 - subscribed,
        })
    }
}

#[async_trait::async_trait]
impl HealthCheck for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Mock EphemeralStore; windows and TTLs never expire within a test
#[derive(Default)]
pub struct MockEphemeralStore {
    pub counters: Mutex<HashMap<String, u64>>,
    pub markers: Mutex<HashSet<String>>,
    pub unavailable: AtomicBool,
}

impl MockEphemeralStore {
    fn check(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::StateError("Redis connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EphemeralStore for MockEphemeralStore {
    async fn ping(&self) -> Result<(), AppError> {
        self.check()
    }

    async fn hit(&self, key: &str, _window: Duration) -> Result<u64, AppError> {
        self.check()?;
        let mut counters = self.counters.lock().unwrap();
        let count = counters.entry(key.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn mark_once(&self, key: &str, _ttl: Duration) -> Result<bool, AppError> {
        self.check()?;
        Ok(self.markers.lock().unwrap().insert(key.to_string()))
    }

    async fn release(&self, key: &str) -> Result<(), AppError> {
        self.check()?;
        self.markers.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Mock PaymentGateway recording every call
#[derive(Default)]
pub struct MockPaymentGateway {
    pub intents: Mutex<Vec<CreateIntent>>,
    pub refunds: Mutex<Vec<String>>,
    pub decline: AtomicBool,
    counter: AtomicUsize,
}

#[async_trait::async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_payment_intent(&self, intent: CreateIntent) -> Result<PaymentIntent, AppError> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(AppError::PaymentDeclined("Your card was declined.".to_string()));
        }
        self.intents.lock().unwrap().push(intent);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentIntent {
            id: format!("pi_test_{}", n),
            client_secret: format!("pi_test_{}_secret_abc", n),
            status: "requires_payment_method".to_string(),
        })
    }

    async fn refund(&self, payment_intent_id: &str) -> Result<Refund, AppError> {
        self.refunds.lock().unwrap().push(payment_intent_id.to_string());
        Ok(Refund {
            id: format!("re_{}", payment_intent_id),
            status: "succeeded".to_string(),
        })
    }
}

/// Mock Mailer keeping sent messages in memory
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub ephemeral: Arc<MockEphemeralStore>,
    pub payments: Arc<MockPaymentGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub upload_dir: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

pub async fn test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let upload_dir = TempDir::new().unwrap();
    let mut config = Config::test_config();
    config.upload_dir = upload_dir.path().to_path_buf();
    configure(&mut config);

    let store = Arc::new(MemoryStore::default());
    let ephemeral = Arc::new(MockEphemeralStore::default());
    let payments = Arc::new(MockPaymentGateway::default());
    let mailer = Arc::new(RecordingMailer::default());
    let metrics = Arc::new(Metrics::new().unwrap());

    let notifier = Notifier::new(
        mailer.clone(),
        Arc::clone(&metrics),
        &config.mail_from,
        &config.client_url,
    )
    .unwrap();
    let uploads = UploadStore::new(config.upload_dir.clone(), config.upload_max_bytes)
        .await
        .unwrap();

    let state = AppState {
        users: store.clone(),
        programs: store.clone(),
        donations: store.clone(),
        volunteers: store.clone(),
        stories: store.clone(),
        feedback: store.clone(),
        newsletter: store.clone(),
        database: store.clone(),
        ephemeral: ephemeral.clone(),
        payments: payments.clone(),
        notifier: Arc::new(notifier),
        tokens: Arc::new(TokenIssuer::new(&config.jwt_secret, config.jwt_ttl_secs)),
        stats_cache: Arc::new(StatsCache::new(store.clone(), Duration::from_secs(60))),
        uploads: Arc::new(uploads),
        metrics,
        audit_logger: Arc::new(AuditLogger::new(None)),
        config: Arc::new(config),
    };

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        ephemeral,
        payments,
        mailer,
        upload_dir,
    }
}

/// Socket peer attached to every request built by `json_request`
pub const CLIENT_ADDR: ([u8; 4], u16) = ([203, 0, 113, 10], 40_000);

pub fn json_request(method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from(CLIENT_ADDR)));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::GET, uri, None, token)).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, Some(body), token)).await
    }

    pub async fn put(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::PUT, uri, Some(body), token)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(json_request(Method::DELETE, uri, None, token)).await
    }

    /// Register through the API; returns the token and user id
    pub async fn register(&self, name: &str, email: &str) -> (String, Uuid) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let token = body["token"].as_str().unwrap().to_string();
        let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
        (token, id)
    }

    /// Seed an administrator directly in the store and issue a token
    pub async fn admin(&self) -> (String, Uuid) {
        let user = UserStore::create(
            self.store.as_ref(),
            NewUser {
                name: "Site Admin".to_string(),
                email: format!("admin-{}@giftedgiving.org", Uuid::new_v4().simple()),
                password_hash: hash_password(PASSWORD).await.unwrap(),
                role: UserRole::Admin,
                phone: None,
            },
        )
        .await
        .unwrap();
        (self.state.tokens.issue(&user).unwrap(), user.id)
    }

    pub async fn create_program(&self, admin_token: &str, title: &str, cost_per_beneficiary_cents: Option<i64>) -> Uuid {
        let (status, body) = self
            .post(
                "/api/programs",
                serde_json::json!({
                    "title": title,
                    "description": "Clean water wells for rural schools",
                    "category": "community",
                    "goal_cents": 1_000_000,
                    "cost_per_beneficiary_cents": cost_per_beneficiary_cents,
                }),
                Some(admin_token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "program creation failed: {}", body);
        body["id"].as_str().unwrap().parse().unwrap()
    }

    /// Wait for the fire-and-forget mailer tasks
    pub async fn wait_for_emails(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..200 {
            {
                let sent = self.mailer.sent.lock().unwrap();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = self.mailer.sent.lock().unwrap().clone();
        panic!("expected {} emails, got {}: {:?}", count, sent.len(), sent);
    }
}
