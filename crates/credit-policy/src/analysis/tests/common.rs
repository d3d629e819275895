use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::analysis::bureau::{BureauClient, BureauError};
use crate::analysis::domain::{LoanApplication, LoanId, LoanRequest, LoanStatus, StakeholderId};
use crate::analysis::policy::{
    age_in_years, PolicyThresholds, RateTable, StakeholderPolicy, StakeholderRegistry,
};
use crate::analysis::repository::{InMemoryLoanRepository, LoanRepository, RepositoryError};
use crate::analysis::{analysis_router, LoanAnalysisService};
use crate::telemetry::ErrorReporter;

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).expect("valid date")
}

pub(super) fn years_before_today(years: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026 - years, 10, 18).expect("valid date")
}

pub(super) fn rate_table() -> RateTable {
    RateTable::from_rows([
        (600, vec![(6, 0.08), (9, 0.085), (12, 0.09)]),
        (700, vec![(6, 0.07), (9, 0.075), (12, 0.08)]),
        (800, vec![(6, 0.06), (9, 0.065), (12, 0.07)]),
        (900, vec![(6, 0.05), (9, 0.055), (12, 0.06)]),
    ])
}

pub(super) fn registry() -> StakeholderRegistry {
    StakeholderRegistry::standard(Arc::new(rate_table()))
}

pub(super) fn request() -> LoanRequest {
    LoanRequest {
        name: "Ada Souza".to_string(),
        cpf: "077.244.260-66".to_string(),
        birthdate: "1990-05-17".to_string(),
        amount: 4000.0,
        terms: 9,
        income: 1500.0,
    }
}

pub(super) fn application(suffix: &str) -> LoanApplication {
    LoanApplication {
        id: LoanId(format!("loan-{suffix}")),
        stakeholder: StakeholderId::standard(),
        name: "Ada Souza".to_string(),
        cpf: "07724426066".to_string(),
        birthdate: years_before_today(30),
        amount: 4000.0,
        terms: 9,
        income: 1500.0,
        status: LoanStatus::Processing,
        result: None,
        refused_policy: None,
        allowed_amount: None,
        allowed_terms: None,
        version: 0,
    }
}

/// Bureau double returning fixed answers and counting calls.
pub(super) struct StubBureau {
    score: i64,
    commitment: f64,
    unavailable: bool,
    calls: AtomicUsize,
}

impl StubBureau {
    pub(super) fn new(score: i64, commitment: f64) -> Self {
        Self {
            score,
            commitment,
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(0, 0.0)
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer<T>(&self, value: T) -> Result<T, BureauError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(BureauError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok(value)
    }
}

impl BureauClient for StubBureau {
    fn score(&self, _cpf: &str) -> Result<i64, BureauError> {
        self.answer(self.score)
    }

    fn commitment(&self, _cpf: &str) -> Result<f64, BureauError> {
        self.answer(self.commitment)
    }
}

#[derive(Default)]
pub(super) struct RecordingReporter {
    captured: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub(super) fn captured(&self) -> Vec<String> {
        self.captured.lock().expect("reporter mutex poisoned").clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn capture(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        self.captured
            .lock()
            .expect("reporter mutex poisoned")
            .push(format!("{context}: {error}"));
    }
}

pub(super) type TestService = LoanAnalysisService<InMemoryLoanRepository, StubBureau>;

pub(super) fn build_service(
    bureau: StubBureau,
) -> (
    TestService,
    Arc<InMemoryLoanRepository>,
    Arc<StubBureau>,
    Arc<RecordingReporter>,
) {
    let repository = Arc::new(InMemoryLoanRepository::default());
    let bureau = Arc::new(bureau);
    let reporter = Arc::new(RecordingReporter::default());
    let service = LoanAnalysisService::new(repository.clone(), bureau.clone(), registry())
        .with_reporter(reporter.clone())
        .with_clock(today);
    (service, repository, bureau, reporter)
}

pub(super) fn stored(repository: &InMemoryLoanRepository, application: LoanApplication) -> LoanId {
    repository
        .insert(application)
        .expect("insert succeeds")
        .id
}

/// Stakeholder with a higher age floor, to exercise registry dispatch.
pub(super) struct SeniorOnlyPolicy;

pub(super) const SENIOR_THRESHOLDS: PolicyThresholds = PolicyThresholds {
    valid_terms: &[12],
    minimum_age: 60,
    minimum_amount: 500.0,
    maximum_amount: 2000.0,
    minimum_score: 700,
};

impl StakeholderPolicy for SeniorOnlyPolicy {
    fn stakeholder(&self) -> StakeholderId {
        StakeholderId("senior".to_string())
    }

    fn thresholds(&self) -> &PolicyThresholds {
        &SENIOR_THRESHOLDS
    }

    fn run_age_policy(&self, loan: &LoanApplication, today: NaiveDate) -> bool {
        age_in_years(loan.birthdate, today) >= i64::from(SENIOR_THRESHOLDS.minimum_age)
    }

    fn run_score_policy(
        &self,
        loan: &LoanApplication,
        bureau: &dyn BureauClient,
    ) -> Result<bool, BureauError> {
        Ok(bureau.score(&loan.cpf)? >= i64::from(SENIOR_THRESHOLDS.minimum_score))
    }

    fn run_commitment_policy(
        &self,
        _loan: &mut LoanApplication,
        _bureau: &dyn BureauClient,
    ) -> Result<bool, BureauError> {
        Ok(false)
    }

    fn available_rates(&self, _score: u32, _min_term: u32) -> BTreeMap<u32, f64> {
        BTreeMap::new()
    }
}

pub(super) struct UnavailableRepository;

impl LoanRepository for UnavailableRepository {
    fn insert(&self, _application: LoanApplication) -> Result<LoanApplication, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn get(&self, _id: &LoanId) -> Result<LoanApplication, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _application: LoanApplication) -> Result<LoanApplication, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    analysis_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
