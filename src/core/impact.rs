// Donation status transitions and the program totals they move

use crate::core::errors::AppError;
use crate::core::models::DonationStatus;

/// Who is asking for a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionTrigger {
    /// An administrator or the API acting on its own records
    Manual,
    /// A payment provider reporting the outcome of a charge
    Gateway,
}

impl DonationStatus {
    /// Whether a donation may move from `self` to `next`.
    ///
    /// Staying in the same status is not a transition; callers treat it as a no-op.
    /// A declined card can be confirmed again with the same payment intent, so
    /// the provider may complete a failed donation; nobody else can.
    pub fn can_transition_to(self, next: DonationStatus, trigger: TransitionTrigger) -> bool {
        match (self, next) {
            (DonationStatus::Pending, DonationStatus::Completed)
            | (DonationStatus::Pending, DonationStatus::Failed)
            | (DonationStatus::Completed, DonationStatus::Refunded) => true,
            (DonationStatus::Failed, DonationStatus::Completed) => trigger == TransitionTrigger::Gateway,
            _ => false,
        }
    }
}

/// Signed change to a program's running totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramDelta {
    pub raised_cents: i64,
    pub donor_count: i64,
    pub beneficiaries: i64,
}

impl ProgramDelta {
    pub fn is_zero(&self) -> bool {
        *self == ProgramDelta::default()
    }

    /// Apply to current totals, never going below zero
    pub fn apply(&self, raised_cents: i64, donor_count: i64, beneficiaries: i64) -> (i64, i64, i64) {
        (
            (raised_cents + self.raised_cents).max(0),
            (donor_count + self.donor_count).max(0),
            (beneficiaries + self.beneficiaries).max(0),
        )
    }
}

/// People reached by `amount_cents` at the program's unit cost
pub fn beneficiaries_for(amount_cents: i64, cost_per_beneficiary_cents: Option<i64>) -> i64 {
    match cost_per_beneficiary_cents {
        Some(cost) if cost > 0 => amount_cents / cost,
        _ => 0,
    }
}

/// Outcome of checking a requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Already in the requested status
    Unchanged,
    /// Move to the new status and adjust the program by `delta`
    Apply { delta: ProgramDelta },
}

/// Decide what a `from -> to` change does to the linked program.
///
/// Completing adds the amount, one donor and the derived beneficiaries;
/// refunding a completed donation takes the same quantities back.
pub fn plan_transition(
    from: DonationStatus,
    to: DonationStatus,
    trigger: TransitionTrigger,
    amount_cents: i64,
    cost_per_beneficiary_cents: Option<i64>,
) -> Result<TransitionPlan, AppError> {
    if from == to {
        return Ok(TransitionPlan::Unchanged);
    }

    if !from.can_transition_to(to, trigger) {
        return Err(AppError::Conflict(format!(
            "Cannot change donation status from {} to {}",
            from, to
        )));
    }

    let beneficiaries = beneficiaries_for(amount_cents, cost_per_beneficiary_cents);
    let delta = match to {
        DonationStatus::Completed => ProgramDelta {
            raised_cents: amount_cents,
            donor_count: 1,
            beneficiaries,
        },
        DonationStatus::Refunded => ProgramDelta {
            raised_cents: -amount_cents,
            donor_count: -1,
            beneficiaries: -beneficiaries,
        },
        _ => ProgramDelta::default(),
    };

    Ok(TransitionPlan::Apply { delta })
}
