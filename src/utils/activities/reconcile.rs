use rand::Rng;
use time::OffsetDateTime;

use super::errors::ValidationReport;
use super::models::{Activity, ActivityInvite, ActivityStatus, ActivitySubmission, RsvpCounts};
use super::store::initial_invite_status;

/// Client-side optimistic state for an activity list. The submitting client
/// inserts a synthesized placeholder immediately, then either swaps it for the
/// authoritative server record or removes it and surfaces the field errors.
/// Modeled as a reducer over explicit transitions keyed by the placeholder id
/// rather than mutation of shared UI state.
#[derive(Debug, Default)]
pub struct ActivityFeed {
    items: Vec<FeedItem>,
    last_rejection: Option<ValidationReport>,
}

#[derive(Debug)]
enum FeedItem {
    Pending(Activity),
    Committed(Activity),
}

impl FeedItem {
    fn activity(&self) -> &Activity {
        match self {
            FeedItem::Pending(a) | FeedItem::Committed(a) => a,
        }
    }
}

#[derive(Debug)]
pub enum ReconcileTransition {
    /// Submission sent; placeholder becomes visible immediately.
    PendingInsert(Activity),
    /// Server success; the placeholder is replaced in place by the
    /// authoritative record.
    Confirmed {
        placeholder_id: i64,
        activity: Activity,
    },
    /// Server failure; the placeholder disappears and the form shows the
    /// mapped field errors.
    RolledBack {
        placeholder_id: i64,
        report: Option<ValidationReport>,
    },
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, transition: ReconcileTransition) {
        match transition {
            ReconcileTransition::PendingInsert(placeholder) => {
                self.items.push(FeedItem::Pending(placeholder));
            }
            ReconcileTransition::Confirmed {
                placeholder_id,
                activity,
            } => {
                if let Some(item) = self.items.iter_mut().find(
                    |item| matches!(item, FeedItem::Pending(a) if a.id == placeholder_id),
                ) {
                    *item = FeedItem::Committed(activity);
                }
            }
            ReconcileTransition::RolledBack {
                placeholder_id,
                report,
            } => {
                self.items.retain(
                    |item| !matches!(item, FeedItem::Pending(a) if a.id == placeholder_id),
                );
                self.last_rejection = report;
            }
        }
    }

    pub fn visible(&self) -> Vec<&Activity> {
        self.items.iter().map(FeedItem::activity).collect()
    }

    pub fn has_pending(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, FeedItem::Pending(_)))
    }

    pub fn last_rejection(&self) -> Option<&ValidationReport> {
        self.last_rejection.as_ref()
    }
}

/// Synthesizes the locally-visible placeholder from data the client already
/// holds. Ids come from the negative range so a placeholder can never collide
/// with a server-assigned id.
pub fn build_placeholder(submission: &ActivitySubmission, creator_id: &str) -> Activity {
    let id = -rand::thread_rng().gen_range(1..=i32::MAX as i64);
    let now = OffsetDateTime::now_utc();

    let invites = submission
        .attendee_ids
        .iter()
        .map(|user_id| ActivityInvite {
            activity_id: id,
            user_id: user_id.clone(),
            status: initial_invite_status(submission.kind, user_id == creator_id),
            created_at: now,
        })
        .collect();

    Activity {
        id,
        trip_calendar_id: submission.trip_id,
        posted_by: creator_id.to_string(),
        name: submission.name.clone(),
        description: submission.description.clone(),
        starts_at: submission.starts_at().to_offset(time::UtcOffset::UTC),
        ends_at: submission
            .ends_at()
            .map(|t| t.to_offset(time::UtcOffset::UTC)),
        location: submission.location.clone(),
        cost: submission.cost,
        max_capacity: submission.max_capacity,
        category: submission.category,
        kind: submission.kind,
        status: ActivityStatus::Active,
        created_at: now,
        invites,
    }
}

/// Derived RSVP tallies for a placeholder, recomputed from the synthesized
/// invites rather than trusting any cached counter.
pub fn placeholder_counts(placeholder: &Activity) -> RsvpCounts {
    RsvpCounts::from_invites(&placeholder.invites)
}
