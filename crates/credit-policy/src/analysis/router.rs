use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::error;

use super::bureau::BureauClient;
use super::domain::{LoanId, StepRequest};
use super::intake::parse_request;
use super::repository::{LoanRepository, RepositoryError};
use super::service::{AnalysisError, AnalysisStep, LoanAnalysisService};

/// Router builder exposing intake, status, and the per-step analysis triggers.
pub fn analysis_router<R, B>(service: Arc<LoanAnalysisService<R, B>>) -> Router
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    Router::new()
        .route("/loan", post(create_handler::<R, B>))
        .route("/loan/:loan_id", get(status_handler::<R, B>))
        .route("/analysis/age", post(age_handler::<R, B>))
        .route("/analysis/score", post(score_handler::<R, B>))
        .route("/analysis/commitment", post(commitment_handler::<R, B>))
        .route("/analysis/run", post(pipeline_handler::<R, B>))
        .with_state(service)
}

pub(crate) async fn create_handler<R, B>(
    State(service): State<Arc<LoanAnalysisService<R, B>>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    let request = match payload {
        Ok(Json(payload)) => parse_request(&payload),
        Err(rejection) => return rejection_response(rejection),
    };

    match request
        .map_err(AnalysisError::from)
        .and_then(|request| service.create(request))
    {
        Ok(loan) => (StatusCode::CREATED, Json(json!({ "id": loan.id }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, B>(
    State(service): State<Arc<LoanAnalysisService<R, B>>>,
    Path(loan_id): Path<String>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    match service.get(&LoanId(loan_id)) {
        Ok(loan) => (StatusCode::OK, Json(loan.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

async fn age_handler<R, B>(
    State(service): State<Arc<LoanAnalysisService<R, B>>>,
    payload: Result<Json<StepRequest>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    step_response(service, payload, Some(AnalysisStep::Age)).await
}

async fn score_handler<R, B>(
    State(service): State<Arc<LoanAnalysisService<R, B>>>,
    payload: Result<Json<StepRequest>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    step_response(service, payload, Some(AnalysisStep::Score)).await
}

async fn commitment_handler<R, B>(
    State(service): State<Arc<LoanAnalysisService<R, B>>>,
    payload: Result<Json<StepRequest>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    step_response(service, payload, Some(AnalysisStep::Commitment)).await
}

async fn pipeline_handler<R, B>(
    State(service): State<Arc<LoanAnalysisService<R, B>>>,
    payload: Result<Json<StepRequest>, JsonRejection>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    step_response(service, payload, None).await
}

async fn step_response<R, B>(
    service: Arc<LoanAnalysisService<R, B>>,
    payload: Result<Json<StepRequest>, JsonRejection>,
    step: Option<AnalysisStep>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    match payload {
        Ok(Json(request)) => run_blocking(service, request.loan_id, step).await,
        Err(rejection) => rejection_response(rejection),
    }
}

/// Policy steps block on the bureau and the store, so they leave the async workers.
pub(crate) async fn run_blocking<R, B>(
    service: Arc<LoanAnalysisService<R, B>>,
    loan_id: LoanId,
    step: Option<AnalysisStep>,
) -> Response
where
    R: LoanRepository + 'static,
    B: BureauClient + 'static,
{
    let joined = tokio::task::spawn_blocking(move || match step {
        Some(step) => service.run_step(&loan_id, step),
        None => service.run_pipeline(&loan_id),
    })
    .await;

    match joined {
        Ok(Ok(result)) => (StatusCode::OK, Json(result)).into_response(),
        Ok(Err(err)) => error_response(err),
        Err(join_error) => {
            error!(%join_error, "analysis task aborted");
            let payload = json!({ "errors": [join_error.to_string()] });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

/// Undecodable bodies share the validation error shape.
fn rejection_response(rejection: JsonRejection) -> Response {
    let payload = json!({ "errors": [rejection.body_text()] });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

pub(crate) fn error_response(err: AnalysisError) -> Response {
    let status = match &err {
        AnalysisError::Intake(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
        AnalysisError::Repository(RepositoryError::Conflict(_))
        | AnalysisError::Repository(RepositoryError::VersionConflict { .. }) => {
            StatusCode::CONFLICT
        }
        AnalysisError::Bureau(_) => StatusCode::BAD_GATEWAY,
        AnalysisError::Repository(RepositoryError::Unavailable(_))
        | AnalysisError::UnknownStakeholder(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let errors = match &err {
        AnalysisError::Intake(intake) => intake.messages(),
        other => vec![other.to_string()],
    };

    (status, Json(json!({ "errors": errors }))).into_response()
}
