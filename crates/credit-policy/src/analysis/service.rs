use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use super::bureau::{BureauClient, BureauError};
use super::domain::{
    LoanApplication, LoanId, LoanRequest, LoanStatus, RefusedPolicy, StakeholderId, StepResult,
};
use super::intake::{IntakeError, IntakeGuard};
use super::policy::{StakeholderPolicy, StakeholderRegistry};
use super::repository::{LoanRepository, RepositoryError};
use crate::telemetry::{ErrorReporter, TracingErrorReporter};

/// One link of the analysis chain. Steps run in [`AnalysisStep::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStep {
    Age,
    Score,
    Commitment,
}

impl AnalysisStep {
    pub const ORDER: [AnalysisStep; 3] = [
        AnalysisStep::Age,
        AnalysisStep::Score,
        AnalysisStep::Commitment,
    ];

    pub const fn refused_policy(self) -> RefusedPolicy {
        match self {
            AnalysisStep::Age => RefusedPolicy::Age,
            AnalysisStep::Score => RefusedPolicy::Score,
            AnalysisStep::Commitment => RefusedPolicy::Commitment,
        }
    }

    pub const fn label(self) -> &'static str {
        self.refused_policy().label()
    }
}

/// Service composing intake, the stakeholder policies, the bureau, and the loan store.
///
/// Every step re-reads the application, so steps can be triggered independently by an
/// outer scheduler. A step on an application that is no longer processing reports the
/// stored outcome and changes nothing.
pub struct LoanAnalysisService<R, B> {
    repository: Arc<R>,
    bureau: Arc<B>,
    registry: StakeholderRegistry,
    reporter: Arc<dyn ErrorReporter>,
    clock: fn() -> NaiveDate,
}

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

impl<R, B> LoanAnalysisService<R, B>
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    pub fn new(repository: Arc<R>, bureau: Arc<B>, registry: StakeholderRegistry) -> Self {
        Self {
            repository,
            bureau,
            registry,
            reporter: Arc::new(TracingErrorReporter),
            clock: utc_today,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &StakeholderRegistry {
        &self.registry
    }

    /// Validate a request against the default stakeholder and store it as processing.
    pub fn create(&self, request: LoanRequest) -> Result<LoanApplication, AnalysisError> {
        let policy = self.registry.default_policy();
        let application = IntakeGuard::new(policy.as_ref()).admit(request, (self.clock)())?;
        let stored = self.repository.insert(application)?;
        info!(loan_id = %stored.id, stakeholder = %stored.stakeholder, "loan created");
        Ok(stored)
    }

    pub fn get(&self, id: &LoanId) -> Result<LoanApplication, AnalysisError> {
        Ok(self.repository.get(id)?)
    }

    pub fn run_age_step(&self, id: &LoanId) -> Result<StepResult, AnalysisError> {
        self.run_step(id, AnalysisStep::Age)
    }

    pub fn run_score_step(&self, id: &LoanId) -> Result<StepResult, AnalysisError> {
        self.run_step(id, AnalysisStep::Score)
    }

    pub fn run_commitment_step(&self, id: &LoanId) -> Result<StepResult, AnalysisError> {
        self.run_step(id, AnalysisStep::Commitment)
    }

    /// Run the chain in order, stopping at the first step that settles the application.
    pub fn run_pipeline(&self, id: &LoanId) -> Result<StepResult, AnalysisError> {
        let mut last = None;
        for step in AnalysisStep::ORDER {
            let result = self.run_step(id, step)?;
            if result.status != LoanStatus::Processing {
                return Ok(result);
            }
            last = Some(result);
        }
        match last {
            Some(result) => Ok(result),
            None => Ok(self.repository.get(id)?.step_result()),
        }
    }

    /// Move a still-processing application to the error state, e.g. once retries run out.
    pub fn mark_error(&self, id: &LoanId) -> Result<StepResult, AnalysisError> {
        let mut loan = self.repository.get(id)?;
        if loan.status != LoanStatus::Processing {
            return Ok(loan.step_result());
        }
        loan.fail();
        let stored = self.repository.save(loan)?;
        warn!(loan_id = %stored.id, "loan analysis marked as error");
        Ok(stored.step_result())
    }

    pub fn run_step(&self, id: &LoanId, step: AnalysisStep) -> Result<StepResult, AnalysisError> {
        info!(loan_id = %id, step = step.label(), "running policy step");
        let outcome = self.evaluate_step(id, step);
        if let Err(err) = &outcome {
            if !err.is_not_found() {
                self.reporter
                    .capture(&format!("{} policy step for loan {}", step.label(), id), err);
            }
        }
        outcome
    }

    fn evaluate_step(&self, id: &LoanId, step: AnalysisStep) -> Result<StepResult, AnalysisError> {
        let mut loan = self.repository.get(id)?;
        if loan.is_settled() {
            debug!(
                loan_id = %loan.id,
                status = loan.status.label(),
                "loan already settled, step skipped"
            );
            return Ok(loan.step_result());
        }

        let policy = self.policy_for(&loan.stakeholder)?;
        let bureau: &dyn BureauClient = self.bureau.as_ref();
        let passed = match step {
            AnalysisStep::Age => policy.run_age_policy(&loan, (self.clock)()),
            AnalysisStep::Score => policy.run_score_policy(&loan, bureau)?,
            AnalysisStep::Commitment => policy.run_commitment_policy(&mut loan, bureau)?,
        };

        if !passed {
            loan.refuse(step.refused_policy());
            info!(loan_id = %loan.id, policy = step.label(), "loan refused");
        }

        if loan.is_settled() {
            loan = self.repository.save(loan)?;
        }

        Ok(loan.step_result())
    }

    fn policy_for(
        &self,
        stakeholder: &StakeholderId,
    ) -> Result<Arc<dyn StakeholderPolicy>, AnalysisError> {
        self.registry
            .resolve(stakeholder)
            .ok_or_else(|| AnalysisError::UnknownStakeholder(stakeholder.clone()))
    }
}

/// Error raised by the analysis service.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Bureau(#[from] BureauError),
    #[error("no policy registered for stakeholder {0}")]
    UnknownStakeholder(StakeholderId),
}

impl AnalysisError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::Repository(RepositoryError::NotFound(_)))
    }
}
