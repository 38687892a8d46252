use rust_decimal::Decimal;

use super::errors::{
    trip_window_message, ActivityError, FieldError, MSG_ATTENDEES_REQUIRED,
    MSG_CAPACITY_BELOW_ATTENDEES, MSG_CAPACITY_NOT_POSITIVE, MSG_END_BEFORE_START,
    MSG_END_WITHOUT_START, MSG_NAME_REQUIRED, MSG_NEGATIVE_COST, MSG_START_TIME_REQUIRED,
};
use super::models::{ActivitySubmission, TripContext};

/// Trip-level business rules the normalizer cannot check. Field failures are
/// collected into one report; a membership violation short-circuits into the
/// typed invitee error so it carries the offending ids.
pub fn validate_submission(
    submission: &ActivitySubmission,
    trip: &TripContext,
) -> Result<(), ActivityError> {
    let mut errors: Vec<FieldError> = Vec::new();

    if submission.name.is_empty() {
        errors.push(FieldError::new("name", MSG_NAME_REQUIRED));
    }

    if submission.start_time.is_none() && !submission.kind.is_proposal() {
        errors.push(FieldError::new("start_time", MSG_START_TIME_REQUIRED));
    }

    match (submission.start_time, submission.end_time) {
        (None, Some(_)) => {
            errors.push(FieldError::new("end_time", MSG_END_WITHOUT_START));
        }
        (Some(start), Some(end)) if end <= start => {
            errors.push(FieldError::new("end_time", MSG_END_BEFORE_START));
        }
        _ => {}
    }

    if !trip.window.contains(submission.start_date) {
        errors.push(FieldError::new(
            "start_date",
            trip_window_message(trip.window.start_date, trip.window.end_date),
        ));
    }

    if let Some(cost) = submission.cost {
        if cost < Decimal::ZERO {
            errors.push(FieldError::new("cost", MSG_NEGATIVE_COST));
        }
    }

    if let Some(capacity) = submission.max_capacity {
        if capacity < 1 {
            errors.push(FieldError::new("max_capacity", MSG_CAPACITY_NOT_POSITIVE));
        } else if (capacity as usize) < submission.attendee_ids.len() {
            errors.push(FieldError::new(
                "max_capacity",
                MSG_CAPACITY_BELOW_ATTENDEES,
            ));
        }
    }

    if submission.attendee_ids.is_empty() && !submission.kind.is_proposal() {
        errors.push(FieldError::new("attendee_ids", MSG_ATTENDEES_REQUIRED));
    }

    if !errors.is_empty() {
        return Err(ActivityError::validation(errors));
    }

    let invalid: Vec<String> = submission
        .attendee_ids
        .iter()
        .filter(|id| !trip.can_invite(id))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(ActivityError::InvalidInvitees {
            invalid_invitee_ids: invalid,
            attempted_invitee_ids: submission.attendee_ids.clone(),
        });
    }

    Ok(())
}
