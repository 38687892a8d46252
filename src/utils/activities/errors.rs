use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::Date;
use utoipa::ToSchema;

use super::models::{CorrelationId, PipelineMode};

pub const X_CORRELATION_ID: &str = "x-correlation-id";

// Shared user-facing messages. Validation and the store must agree on these
// verbatim so the caller cannot tell which layer caught a violation.
pub const MSG_NAME_REQUIRED: &str = "Give this activity a name.";
pub const MSG_DATE_REQUIRED: &str = "Pick a date for this activity.";
pub const MSG_START_TIME_REQUIRED: &str = "Pick a start time for this activity.";
pub const MSG_END_BEFORE_START: &str = "End time must be after the start time.";
pub const MSG_END_WITHOUT_START: &str = "Add a start time before setting an end time.";
pub const MSG_INVALID_DATE: &str = "That date is not valid.";
pub const MSG_INVALID_TIME: &str = "Times must use 24-hour HH:MM format.";
pub const MSG_INVALID_CATEGORY: &str = "Choose a valid activity category.";
pub const MSG_INVALID_COST: &str = "Cost must be a number.";
pub const MSG_NEGATIVE_COST: &str = "Cost cannot be negative.";
pub const MSG_INVALID_CAPACITY: &str = "Max capacity must be a whole number.";
pub const MSG_CAPACITY_NOT_POSITIVE: &str = "Max capacity must be at least 1.";
pub const MSG_CAPACITY_BELOW_ATTENDEES: &str =
    "Max capacity cannot be smaller than the number of invitees.";
pub const MSG_ATTENDEES_REQUIRED: &str = "Invite at least one attendee.";
pub const MSG_INVALID_KIND: &str = "Activity type must be SCHEDULED or PROPOSE.";
pub const MSG_INVITEES_NOT_MEMBERS: &str =
    "One or more invitees are no longer members of this trip.";
pub const MSG_TRIP_NOT_FOUND: &str = "This trip does not exist.";
pub const MSG_UNEXPECTED: &str = "Something went wrong. Please try again.";

const WINDOW_DATE_FORMAT: &[FormatItem<'_>] =
    format_description!("[month repr:short] [day padding:none], [year]");

/// "Pick a date between Jan 1, 2024 and Jan 10, 2024."
pub fn trip_window_message(start: Date, end: Date) -> String {
    let start = start
        .format(WINDOW_DATE_FORMAT)
        .unwrap_or_else(|_| start.to_string());
    let end = end
        .format(WINDOW_DATE_FORMAT)
        .unwrap_or_else(|_| end.to_string());
    format!("Pick a date between {start} and {end}.")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// All field-level failures for one submission, plus a top-level message
/// (the first field message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationReport {
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        let message = errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "Invalid submission.".to_string());
        Self { message, errors }
    }

    pub fn field_message(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("{}", .0.message)]
    Validation(ValidationReport),
    #[error("{MSG_INVITEES_NOT_MEMBERS}")]
    InvalidInvitees {
        invalid_invitee_ids: Vec<String>,
        attempted_invitee_ids: Vec<String>,
    },
    #[error("{MSG_TRIP_NOT_FOUND}")]
    TripNotFound,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ActivityError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation(ValidationReport::from_errors(errors))
    }
}

impl From<sqlx::Error> for ActivityError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unexpected(anyhow::Error::from(e))
    }
}

/// Best-effort extraction of the offending user id from a Postgres
/// foreign-key violation detail. The invite constraint is composite, so the
/// detail reads `Key (trip_id, user_id)=(1, ghost) is not present in table
/// "trip_members".`; only the `user_id` position may be reported back. Used
/// when the membership pre-check raced a member removal and the constraint
/// fired instead.
pub fn invitee_ids_from_fk_detail(detail: &str) -> Vec<String> {
    let Some(key) = detail
        .strip_prefix("Key (")
        .and_then(|rest| rest.split_once(")=("))
    else {
        return Vec::new();
    };
    let (columns, values) = key;
    let Some(values) = values.split(')').next() else {
        return Vec::new();
    };

    let columns: Vec<&str> = columns.split(", ").map(str::trim).collect();
    values
        .split(", ")
        .map(str::trim)
        .zip(&columns)
        .filter(|(value, column)| **column == "user_id" && !value.is_empty())
        .map(|(value, _)| value.to_string())
        .collect()
}

/// A failed submission as the handler surfaces it: the pipeline mode decides
/// the validation status code (400 legacy, 422 v2) and the correlation id is
/// echoed in both the body and the `x-correlation-id` header.
#[derive(Debug)]
pub struct SubmissionRejection {
    pub mode: PipelineMode,
    pub correlation_id: CorrelationId,
    pub error: ActivityError,
}

impl IntoResponse for SubmissionRejection {
    fn into_response(self) -> axum::response::Response {
        let correlation_id = self.correlation_id;
        let (status, body) = match self.error {
            ActivityError::Validation(report) => {
                let status = match self.mode {
                    PipelineMode::Legacy => StatusCode::BAD_REQUEST,
                    PipelineMode::V2 => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (
                    status,
                    json!({
                        "message": report.message,
                        "errors": report.errors,
                        "correlation_id": correlation_id,
                    }),
                )
            }
            ActivityError::InvalidInvitees {
                invalid_invitee_ids,
                ..
            } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "message": MSG_INVITEES_NOT_MEMBERS,
                    "errors": [FieldError::new("attendee_ids", MSG_INVITEES_NOT_MEMBERS)],
                    "invalid_invitee_ids": invalid_invitee_ids,
                    "correlation_id": correlation_id,
                }),
            ),
            ActivityError::TripNotFound => (
                StatusCode::NOT_FOUND,
                json!({
                    "message": MSG_TRIP_NOT_FOUND,
                    "errors": [],
                    "correlation_id": correlation_id,
                }),
            ),
            ActivityError::Unexpected(e) => {
                tracing::error!(%correlation_id, "Internal server error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "message": MSG_UNEXPECTED,
                        "errors": [],
                        "correlation_id": correlation_id,
                    }),
                )
            }
        };

        (
            status,
            [(X_CORRELATION_ID, correlation_id.to_string())],
            Json(body),
        )
            .into_response()
    }
}
