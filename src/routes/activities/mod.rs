pub mod models;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use http::StatusCode;

use crate::modules::extractors::ApiVersion;
use crate::modules::AppState;
use crate::utils::activities::errors::{SubmissionRejection, X_CORRELATION_ID};
use crate::utils::activities::models::{
    ActivityKind, CorrelationId, PipelineMode, RawActivityPayload,
};
use crate::utils::activities::store::ActivityBackend;
use crate::utils::activities::submit_activity;
use crate::utils::auth::models::Claims;

use self::models::CreatedActivityResponse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:trip_id/activities", post(create_activity))
        .route("/:trip_id/proposals/activities", post(propose_activity))
}

/// Create a scheduled activity
#[utoipa::path(
    post,
    path = "/api/trips/{trip_id}/activities",
    tag = "activities",
    request_body = RawActivityPayload,
    responses(
        (status = 201, body = CreatedActivityResponse, description = "Created activity with invites"),
        (status = 400, description = "Validation or membership failure (legacy pipeline)"),
        (status = 404, description = "Unknown trip"),
        (status = 422, description = "Validation failure (v2 pipeline)"),
    )
)]
pub async fn create_activity(
    claims: Claims,
    State(state): State<AppState>,
    Path(trip_id): Path<i32>,
    correlation_id: CorrelationId,
    version: ApiVersion,
    Json(body): Json<RawActivityPayload>,
) -> Result<impl IntoResponse, SubmissionRejection> {
    submit(
        state,
        claims,
        trip_id,
        correlation_id,
        version,
        ActivityKind::Scheduled,
        body,
    )
    .await
}

/// Propose an activity for the group to vote on
#[utoipa::path(
    post,
    path = "/api/trips/{trip_id}/proposals/activities",
    tag = "activities",
    request_body = RawActivityPayload,
    responses(
        (status = 201, body = CreatedActivityResponse, description = "Created proposal with invites"),
        (status = 400, description = "Validation or membership failure (legacy pipeline)"),
        (status = 404, description = "Unknown trip"),
        (status = 422, description = "Validation failure (v2 pipeline)"),
    )
)]
pub async fn propose_activity(
    claims: Claims,
    State(state): State<AppState>,
    Path(trip_id): Path<i32>,
    correlation_id: CorrelationId,
    version: ApiVersion,
    Json(body): Json<RawActivityPayload>,
) -> Result<impl IntoResponse, SubmissionRejection> {
    submit(
        state,
        claims,
        trip_id,
        correlation_id,
        version,
        ActivityKind::Propose,
        body,
    )
    .await
}

async fn submit(
    state: AppState,
    claims: Claims,
    trip_id: i32,
    correlation_id: CorrelationId,
    version: ApiVersion,
    default_kind: ActivityKind,
    body: RawActivityPayload,
) -> Result<impl IntoResponse, SubmissionRejection> {
    let mode = PipelineMode::select(state.features.activities_v2_enabled, version.v2_requested);
    let backend: &ActivityBackend = &state.backend;

    let created = submit_activity(
        backend,
        mode,
        correlation_id,
        &claims.user_id,
        claims.timezone.as_deref(),
        trip_id,
        default_kind,
        body,
    )
    .await
    .map_err(|error| SubmissionRejection {
        mode,
        correlation_id,
        error,
    })?;

    Ok((
        StatusCode::CREATED,
        [(X_CORRELATION_ID, correlation_id.to_string())],
        Json(CreatedActivityResponse::new(created, correlation_id)),
    ))
}
