//! Loan application analysis: intake, the stakeholder policy chain, and its HTTP surface.
//!
//! An application is admitted by [`intake::IntakeGuard`], stored as processing, and then
//! driven through the age, score, and commitment steps. The first failing step refuses the
//! application; the commitment step approves it with the first affordable installment.

pub mod bureau;
pub mod domain;
pub mod intake;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use bureau::{BureauClient, BureauError, HttpBureauClient};
pub use domain::{
    LoanApplication, LoanId, LoanRequest, LoanResult, LoanStatus, LoanStatusView, Offer,
    RefusedPolicy, StakeholderId, StepRequest, StepResult,
};
pub use intake::{parse_request, FieldViolation, IntakeError, IntakeGuard};
pub use policy::{
    calculate_pmt, PolicyThresholds, RateTable, RateTableError, StakeholderPolicy,
    StakeholderRegistry, StandardPolicy, STANDARD_THRESHOLDS,
};
pub use repository::{InMemoryLoanRepository, LoanRepository, RepositoryError};
pub use router::analysis_router;
pub use service::{AnalysisError, AnalysisStep, LoanAnalysisService};
