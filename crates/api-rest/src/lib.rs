//! # API REST
//!
//! REST API for the triage service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, error mapping)
//!
//! The core pipeline is synchronous and does disk and Git I/O, so every handler that touches it
//! runs on tokio's blocking pool.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;

use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use triage_core::{DoctorId, MessagePipeline, PatientId, TriageError};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use dto::{
    ActivityDto, ActivityRes, DiagnosisDto, ErrorRes, HealthRes, RecordDto, RecordsRes,
    SendMessageReq, SendMessageRes,
};
use error::ApiResult;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MessagePipeline>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, send_message, patient_records, doctor_activity, expire_session),
    components(schemas(
        HealthRes,
        ErrorRes,
        SendMessageReq,
        SendMessageRes,
        DiagnosisDto,
        RecordDto,
        RecordsRes,
        ActivityDto,
        ActivityRes,
    ))
)]
pub struct ApiDoc;

/// Build the application router, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/messages", post(send_message))
        .route("/patients/:id/records", get(patient_records))
        .route("/doctors/:id/activity", get(doctor_activity))
        .route("/sessions/:id", delete(expire_session))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Triage REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/messages",
    request_body = SendMessageReq,
    responses(
        (status = 200, description = "Message handled", body = SendMessageRes),
        (status = 400, description = "Invalid doctor identifier or malformed body", body = ErrorRes),
        (status = 415, description = "Body is not `application/json`", body = ErrorRes),
        (status = 422, description = "Body does not match the request schema", body = ErrorRes),
        (status = 500, description = "Persistence or encryption failure", body = ErrorRes)
    )
)]
/// Run one physician message through the triage pipeline.
#[axum::debug_handler]
async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageReq>, JsonRejection>,
) -> ApiResult<Json<SendMessageRes>> {
    let Json(req) = payload?;
    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || {
        pipeline.handle_message(&req.doctor_id, &req.message, req.session_id.as_deref())
    })
    .await??;

    Ok(Json(SendMessageRes::from(result)))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/records",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Patient history in insertion order", body = RecordsRes),
        (status = 400, description = "Invalid patient identifier", body = ErrorRes),
        (status = 500, description = "History could not be read", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn patient_records(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<RecordsRes>> {
    let patient_id = PatientId::parse(&id).map_err(TriageError::from)?;
    let pipeline = Arc::clone(&state.pipeline);
    let lookup = patient_id.clone();
    let records = tokio::task::spawn_blocking(move || pipeline.records().get_records(&lookup))
        .await??;

    Ok(Json(RecordsRes {
        patient_id: patient_id.to_string(),
        records: records.iter().map(RecordDto::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/doctors/{id}/activity",
    params(("id" = String, Path, description = "Doctor identifier")),
    responses(
        (status = 200, description = "Audit trail in insertion order", body = ActivityRes),
        (status = 400, description = "Invalid doctor identifier", body = ErrorRes),
        (status = 500, description = "Audit trail could not be read", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn doctor_activity(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<ActivityRes>> {
    let doctor_id = DoctorId::parse(&id).map_err(TriageError::from)?;
    let pipeline = Arc::clone(&state.pipeline);
    let lookup = doctor_id.clone();
    let entries = tokio::task::spawn_blocking(move || pipeline.activity().entries(&lookup))
        .await??;

    Ok(Json(ActivityRes {
        doctor_id: doctor_id.to_string(),
        entries: entries.iter().map(ActivityDto::from).collect(),
    }))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session token")),
    responses(
        (status = 204, description = "Session expired (idempotent)")
    )
)]
#[axum::debug_handler]
async fn expire_session(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> StatusCode {
    state.pipeline.sessions().expire_session(&id);
    StatusCode::NO_CONTENT
}
