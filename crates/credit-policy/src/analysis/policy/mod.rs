mod pmt;
mod rates;
mod standard;

pub use pmt::{calculate_pmt, round_cents};
pub use rates::{RateTable, RateTableError};
pub use standard::{StandardPolicy, STANDARD_THRESHOLDS};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use super::bureau::{BureauClient, BureauError};
use super::domain::{LoanApplication, Offer, StakeholderId};

/// Eligibility limits fixed per stakeholder and shared by every evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyThresholds {
    pub valid_terms: &'static [u32],
    pub minimum_age: u32,
    pub minimum_amount: f64,
    pub maximum_amount: f64,
    pub minimum_score: u32,
}

impl PolicyThresholds {
    pub fn amount_within(&self, amount: f64) -> bool {
        self.minimum_amount <= amount && amount <= self.maximum_amount
    }

    pub fn term_allowed(&self, terms: u32) -> bool {
        self.valid_terms.contains(&terms)
    }
}

/// Whole years between two dates, counted as `floor(days / 365)`.
pub fn age_in_years(birthdate: NaiveDate, today: NaiveDate) -> i64 {
    (today - birthdate).num_days().div_euclid(365)
}

/// Walk the candidate terms in ascending order and return the first whose installment
/// fits inside the commitment-free value.
pub fn first_affordable_offer(
    amount: f64,
    commitment_free_value: f64,
    rates: &BTreeMap<u32, f64>,
) -> Option<Offer> {
    for (&terms, &rate) in rates {
        let installment = calculate_pmt(amount, rate, terms);
        let fits = installment <= commitment_free_value;
        debug!(
            terms,
            rate,
            "commitment check: PMT {installment:.2} <= CFV {commitment_free_value:.2} = {fits}"
        );
        if fits {
            return Some(Offer {
                installment,
                terms,
                rate,
            });
        }
    }
    None
}

/// Rules a lending stakeholder applies to a loan application.
///
/// Amount and terms checks depend only on the thresholds, so intake can run them before a
/// record exists. The remaining checks read the application and may call the bureau.
pub trait StakeholderPolicy: Send + Sync {
    fn stakeholder(&self) -> StakeholderId;

    fn thresholds(&self) -> &PolicyThresholds;

    fn run_amount_policy(&self, amount: f64) -> bool {
        self.thresholds().amount_within(amount)
    }

    fn run_terms_policy(&self, terms: u32) -> bool {
        self.thresholds().term_allowed(terms)
    }

    fn run_age_policy(&self, loan: &LoanApplication, today: NaiveDate) -> bool;

    fn run_score_policy(
        &self,
        loan: &LoanApplication,
        bureau: &dyn BureauClient,
    ) -> Result<bool, BureauError>;

    /// On success the application is marked approved with the chosen installment and term;
    /// the caller persists it either way.
    fn run_commitment_policy(
        &self,
        loan: &mut LoanApplication,
        bureau: &dyn BureauClient,
    ) -> Result<bool, BureauError>;

    /// Term to rate mapping for the borrower's score, limited to terms `>= min_term`.
    fn available_rates(&self, score: u32, min_term: u32) -> BTreeMap<u32, f64>;
}

/// Stakeholder policies by identifier, with the one used when none is requested.
#[derive(Clone)]
pub struct StakeholderRegistry {
    policies: HashMap<StakeholderId, Arc<dyn StakeholderPolicy>>,
    default: StakeholderId,
}

impl StakeholderRegistry {
    pub fn new(default_policy: Arc<dyn StakeholderPolicy>) -> Self {
        let default = default_policy.stakeholder();
        let mut policies = HashMap::new();
        policies.insert(default.clone(), default_policy);
        Self { policies, default }
    }

    /// Registry holding only the standard stakeholder.
    pub fn standard(rates: Arc<RateTable>) -> Self {
        Self::new(Arc::new(StandardPolicy::new(rates)))
    }

    pub fn register(mut self, policy: Arc<dyn StakeholderPolicy>) -> Self {
        self.policies.insert(policy.stakeholder(), policy);
        self
    }

    pub fn default_stakeholder(&self) -> &StakeholderId {
        &self.default
    }

    pub fn default_policy(&self) -> Arc<dyn StakeholderPolicy> {
        self.policies[&self.default].clone()
    }

    pub fn resolve(&self, stakeholder: &StakeholderId) -> Option<Arc<dyn StakeholderPolicy>> {
        self.policies.get(stakeholder).cloned()
    }
}

impl std::fmt::Debug for StakeholderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.policies.keys().map(|id| id.0.as_str()).collect();
        ids.sort_unstable();
        f.debug_struct("StakeholderRegistry")
            .field("policies", &ids)
            .field("default", &self.default)
            .finish()
    }
}
