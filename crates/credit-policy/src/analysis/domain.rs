use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for loan applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl LoanId {
    /// Fresh identifier in the compact hex form used by the record store.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lending entity whose thresholds govern an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StakeholderId(pub String);

impl StakeholderId {
    pub fn standard() -> Self {
        Self("standard".to_string())
    }
}

impl std::fmt::Display for StakeholderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing state of an application inside the analysis chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Processing,
    Completed,
    Error,
}

impl LoanStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LoanStatus::Processing => "processing",
            LoanStatus::Completed => "completed",
            LoanStatus::Error => "error",
        }
    }
}

/// Terminal decision, set once the chain completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanResult {
    Approved,
    Refused,
}

impl LoanResult {
    pub const fn label(self) -> &'static str {
        match self {
            LoanResult::Approved => "approved",
            LoanResult::Refused => "refused",
        }
    }
}

/// Policy that refused an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefusedPolicy {
    Age,
    Score,
    Commitment,
}

impl RefusedPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            RefusedPolicy::Age => "age",
            RefusedPolicy::Score => "score",
            RefusedPolicy::Commitment => "commitment",
        }
    }
}

/// Raw intake payload as submitted by the borrower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub name: String,
    pub cpf: String,
    pub birthdate: String,
    pub amount: f64,
    pub terms: u32,
    pub income: f64,
}

/// Affordable installment chosen by the commitment policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub installment: f64,
    pub terms: u32,
    pub rate: f64,
}

/// Stored loan application, mutated by the analysis steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: LoanId,
    pub stakeholder: StakeholderId,
    pub name: String,
    /// Digits-only national id, used for bureau lookups.
    pub cpf: String,
    pub birthdate: NaiveDate,
    pub amount: f64,
    pub terms: u32,
    pub income: f64,
    pub status: LoanStatus,
    pub result: Option<LoanResult>,
    pub refused_policy: Option<RefusedPolicy>,
    pub allowed_amount: Option<f64>,
    pub allowed_terms: Option<u32>,
    /// Optimistic concurrency token, bumped by the repository on every save.
    pub version: u64,
}

impl LoanApplication {
    /// True once the application can no longer be changed by a policy step.
    pub fn is_settled(&self) -> bool {
        self.status != LoanStatus::Processing
    }

    pub(crate) fn refuse(&mut self, policy: RefusedPolicy) {
        self.status = LoanStatus::Completed;
        self.result = Some(LoanResult::Refused);
        self.refused_policy = Some(policy);
        self.allowed_amount = None;
        self.allowed_terms = None;
    }

    pub(crate) fn approve(&mut self, offer: &Offer) {
        self.status = LoanStatus::Completed;
        self.result = Some(LoanResult::Approved);
        self.refused_policy = None;
        self.allowed_amount = Some(offer.installment);
        self.allowed_terms = Some(offer.terms);
    }

    pub(crate) fn fail(&mut self) {
        self.status = LoanStatus::Error;
    }

    pub fn step_result(&self) -> StepResult {
        StepResult {
            loan_id: self.id.clone(),
            status: self.status,
            result: self.result,
        }
    }

    pub fn status_view(&self) -> LoanStatusView {
        LoanStatusView {
            id: self.id.clone(),
            status: self.status.label(),
            result: self.result.map(LoanResult::label),
            refused_policy: self.refused_policy.map(RefusedPolicy::label),
            amount: self.allowed_amount,
            terms: self.allowed_terms,
        }
    }
}

/// Input to each analysis step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRequest {
    #[serde(rename = "loanId", alias = "loan_id")]
    pub loan_id: LoanId,
}

/// Reply of each analysis step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    #[serde(rename = "loanId")]
    pub loan_id: LoanId,
    pub status: LoanStatus,
    pub result: Option<LoanResult>,
}

/// Public representation of a loan returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanStatusView {
    pub id: LoanId,
    pub status: &'static str,
    pub result: Option<&'static str>,
    pub refused_policy: Option<&'static str>,
    pub amount: Option<f64>,
    pub terms: Option<u32>,
}
