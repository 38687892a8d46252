use tracing::{debug, warn};

use self::errors::ActivityError;
use self::models::{
    ActivityKind, ActivitySubmission, CorrelationId, CreatedActivity, PipelineMode,
    RawActivityPayload,
};
use self::normalize::normalize_submission;
use self::notify::notify_invitees;
use self::store::ActivityBackend;
use self::validate::validate_submission;

pub mod errors;
pub mod mem;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod reconcile;
pub mod store;
pub mod validate;

/// The full server-side pipeline for one submission: trip lookup,
/// normalization, validation, persistence through the selected pipeline, then
/// notification fan-out. Within one request these stages always run in this
/// order; nothing is serialized across concurrent requests beyond what the
/// store's transaction provides.
pub async fn submit_activity(
    backend: &ActivityBackend,
    mode: PipelineMode,
    correlation_id: CorrelationId,
    creator_id: &str,
    user_timezone: Option<&str>,
    trip_id: i32,
    default_kind: ActivityKind,
    raw: RawActivityPayload,
) -> Result<CreatedActivity, ActivityError> {
    let trip = backend
        .trips
        .trip_context(trip_id)
        .await?
        .ok_or(ActivityError::TripNotFound)?;

    let submission = normalize_submission(
        trip_id,
        raw,
        default_kind,
        trip.timezone.as_deref(),
        user_timezone,
    )?;
    validate_submission(&submission, &trip)?;

    let created = backend
        .creator_for(mode)
        .create_activity_with_invites(&submission, creator_id)
        .await
        .map_err(|e| {
            if let ActivityError::InvalidInvitees {
                invalid_invitee_ids,
                ..
            } = &e
            {
                // Validation passed but membership changed before commit.
                warn!(
                    %correlation_id, %mode,
                    "Invite membership violated at commit time, invalid ids {:?}; {}",
                    invalid_invitee_ids,
                    redacted_summary(&submission),
                );
            }
            e
        })?;

    if created.was_deduplicated {
        debug!(
            %correlation_id, %mode,
            "Duplicate submission collapsed onto activity {}",
            created.activity.id
        );
    } else {
        notify_invitees(backend.notifier.as_ref(), &created.activity, creator_id).await;
    }

    Ok(created)
}

/// Log-safe summary of a submission: free-text and schedule fields stay out
/// of the logs entirely.
fn redacted_summary(submission: &ActivitySubmission) -> String {
    format!(
        "submission trip={} category={} type={} attendees={} name/times=[redacted]",
        submission.trip_id,
        submission.category.as_str(),
        submission.kind.as_str(),
        submission.attendee_ids.len(),
    )
}
