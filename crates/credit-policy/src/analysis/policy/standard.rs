use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use super::super::bureau::{BureauClient, BureauError};
use super::super::domain::{LoanApplication, StakeholderId};
use super::{age_in_years, first_affordable_offer, round_cents, PolicyThresholds, RateTable};

/// Thresholds for the standard stakeholder.
pub const STANDARD_THRESHOLDS: PolicyThresholds = PolicyThresholds {
    valid_terms: &[6, 9, 12],
    minimum_age: 18,
    minimum_amount: 1000.0,
    maximum_amount: 4000.0,
    minimum_score: 600,
};

/// The standard lending stakeholder, priced from a shared rate table.
#[derive(Debug, Clone)]
pub struct StandardPolicy {
    thresholds: PolicyThresholds,
    rates: Arc<RateTable>,
}

impl StandardPolicy {
    pub fn new(rates: Arc<RateTable>) -> Self {
        Self {
            thresholds: STANDARD_THRESHOLDS,
            rates,
        }
    }
}

impl super::StakeholderPolicy for StandardPolicy {
    fn stakeholder(&self) -> StakeholderId {
        StakeholderId::standard()
    }

    fn thresholds(&self) -> &PolicyThresholds {
        &self.thresholds
    }

    fn run_age_policy(&self, loan: &LoanApplication, today: NaiveDate) -> bool {
        let age = age_in_years(loan.birthdate, today);
        let result = age >= i64::from(self.thresholds.minimum_age);
        debug!(
            loan_id = %loan.id,
            "age policy: {age} >= {} = {result}", self.thresholds.minimum_age
        );
        result
    }

    fn run_score_policy(
        &self,
        loan: &LoanApplication,
        bureau: &dyn BureauClient,
    ) -> Result<bool, BureauError> {
        let score = bureau.score(&loan.cpf)?;
        let result = score >= i64::from(self.thresholds.minimum_score);
        debug!(
            loan_id = %loan.id,
            "score policy: {score} >= {} = {result}", self.thresholds.minimum_score
        );
        Ok(result)
    }

    fn run_commitment_policy(
        &self,
        loan: &mut LoanApplication,
        bureau: &dyn BureauClient,
    ) -> Result<bool, BureauError> {
        let commitment = bureau.commitment(&loan.cpf)?;
        let score = bureau.score(&loan.cpf)?;
        let commitment_free_value = round_cents(loan.income * (1.0 - commitment));
        debug!(
            loan_id = %loan.id,
            income = loan.income,
            commitment,
            score,
            "commitment-free value is {commitment_free_value:.2}"
        );

        let rates = match u32::try_from(score) {
            Ok(score) => self.available_rates(score, loan.terms),
            Err(_) => BTreeMap::new(),
        };
        info!(loan_id = %loan.id, ?rates, "available rates");

        match first_affordable_offer(loan.amount, commitment_free_value, &rates) {
            Some(offer) => {
                loan.approve(&offer);
                info!(
                    loan_id = %loan.id,
                    installment = offer.installment,
                    terms = offer.terms,
                    "loan approved"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn available_rates(&self, score: u32, min_term: u32) -> BTreeMap<u32, f64> {
        self.rates.lookup(score, min_term, self.thresholds.valid_terms)
    }
}
