use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::errors::ActivityError;
use super::models::{
    Activity, ActivityInvite, ActivityStatus, ActivitySubmission, CreatedActivity, PipelineMode,
    TripContext,
};
use super::notify::{NotificationSink, TracingNotifier};
use super::store::{initial_invite_status, ActivityBackend, ActivityCreator, TripDirectory};

/// In-memory rendition of the store contract, sharing one state blob across
/// the trip directory and both pipelines. Backs the integration tests and
/// local development without Postgres; semantics mirror the Postgres stores.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<MemState>>,
}

#[derive(Default)]
struct MemState {
    trips: HashMap<i32, TripContext>,
    next_activity_id: i64,
    activities: HashMap<PipelineKey, Vec<Activity>>,
    idempotency: HashMap<(PipelineKey, i32, String, String), i64>,
}

type PipelineKey = &'static str;

fn key(mode: PipelineMode) -> PipelineKey {
    match mode {
        PipelineMode::Legacy => "legacy",
        PipelineMode::V2 => "v2",
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.inner.lock().expect("in-memory store mutex poisoned")
    }

    pub fn insert_trip(&self, trip: TripContext) {
        self.lock().trips.insert(trip.trip_id, trip);
    }

    pub fn remove_member(&self, trip_id: i32, user_id: &str) {
        if let Some(trip) = self.lock().trips.get_mut(&trip_id) {
            trip.member_ids.remove(user_id);
        }
    }

    pub fn activity_count(&self, mode: PipelineMode) -> usize {
        self.lock()
            .activities
            .get(key(mode))
            .map_or(0, |list| list.len())
    }

    pub fn into_backend(self) -> ActivityBackend {
        self.into_backend_with_notifier(Arc::new(TracingNotifier))
    }

    pub fn into_backend_with_notifier(self, notifier: Arc<dyn NotificationSink>) -> ActivityBackend {
        ActivityBackend {
            trips: Arc::new(self.clone()),
            legacy: Arc::new(InMemoryActivities {
                backend: self.clone(),
                mode: PipelineMode::Legacy,
            }),
            v2: Arc::new(InMemoryActivities {
                backend: self,
                mode: PipelineMode::V2,
            }),
            notifier,
        }
    }
}

#[async_trait]
impl TripDirectory for InMemoryBackend {
    async fn trip_context(&self, trip_id: i32) -> Result<Option<TripContext>, ActivityError> {
        Ok(self.lock().trips.get(&trip_id).cloned())
    }
}

pub struct InMemoryActivities {
    backend: InMemoryBackend,
    mode: PipelineMode,
}

#[async_trait]
impl ActivityCreator for InMemoryActivities {
    async fn create_activity_with_invites(
        &self,
        submission: &ActivitySubmission,
        creator_id: &str,
    ) -> Result<CreatedActivity, ActivityError> {
        let mut state = self.backend.lock();
        let pipeline = key(self.mode);

        let dedup_key = (
            pipeline,
            submission.trip_id,
            creator_id.to_string(),
            submission.idempotency_key.clone(),
        );
        if let Some(id) = state.idempotency.get(&dedup_key).copied() {
            let activity = state
                .activities
                .get(pipeline)
                .and_then(|list| list.iter().find(|a| a.id == id))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("dangling idempotency entry for activity {id}"))?;
            return Ok(CreatedActivity {
                activity,
                was_deduplicated: true,
            });
        }

        // Same commit-time membership recheck the Postgres stores make inside
        // their transaction; the mutex stands in for isolation here.
        let trip = state
            .trips
            .get(&submission.trip_id)
            .ok_or(ActivityError::TripNotFound)?;
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

        state.next_activity_id += 1;
        let id = state.next_activity_id;
        let now = OffsetDateTime::now_utc();

        let mut invites: Vec<ActivityInvite> = submission
            .attendee_ids
            .iter()
            .map(|user_id| ActivityInvite {
                activity_id: id,
                user_id: user_id.clone(),
                status: initial_invite_status(submission.kind, user_id == creator_id),
                created_at: now,
            })
            .collect();
        invites.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let activity = Activity {
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
        };

        state
            .activities
            .entry(pipeline)
            .or_default()
            .push(activity.clone());
        state.idempotency.insert(dedup_key, id);

        Ok(CreatedActivity {
            activity,
            was_deduplicated: false,
        })
    }
}

#[cfg(test)]
mod mem_tests {
    use std::collections::HashSet;

    use time::macros::{date, datetime, time};

    use super::super::models::{ActivityKind, Category, InviteStatus, TripWindow};
    use super::*;

    fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.insert_trip(TripContext {
            trip_id: 1,
            creator_id: "creator".to_string(),
            member_ids: HashSet::from(["abc".to_string(), "def".to_string()]),
            window: TripWindow {
                start_date: date!(2025 - 07 - 01),
                end_date: date!(2025 - 07 - 31),
            },
            timezone: Some("UTC".to_string()),
        });
        backend
    }

    fn submission() -> ActivitySubmission {
        ActivitySubmission {
            trip_id: 1,
            name: "Sunset Cruise".to_string(),
            description: None,
            start_date: date!(2025 - 07 - 04),
            start_time: Some(time!(18:00)),
            end_time: Some(time!(20:00)),
            location: None,
            cost: None,
            max_capacity: None,
            category: Category::Entertainment,
            attendee_ids: vec!["abc".to_string(), "def".to_string()],
            kind: ActivityKind::Scheduled,
            timezone: "UTC".to_string(),
            idempotency_key: "key-1".to_string(),
        }
    }

    #[tokio::test]
    async fn persists_activity_with_invites() {
        let backend = backend().into_backend();
        let created = backend
            .legacy
            .create_activity_with_invites(&submission(), "creator")
            .await
            .unwrap();

        assert!(!created.was_deduplicated);
        let activity = created.activity;
        assert_eq!(activity.starts_at, datetime!(2025-07-04 18:00 UTC));
        assert_eq!(activity.ends_at, Some(datetime!(2025-07-04 20:00 UTC)));
        assert_eq!(activity.invites.len(), 2);
        assert!(activity
            .invites
            .iter()
            .all(|i| i.status == InviteStatus::Pending));
    }

    #[tokio::test]
    async fn duplicate_key_returns_original_activity() {
        let mem = backend();
        let backend = mem.clone().into_backend();
        let first = backend
            .legacy
            .create_activity_with_invites(&submission(), "creator")
            .await
            .unwrap();
        let second = backend
            .legacy
            .create_activity_with_invites(&submission(), "creator")
            .await
            .unwrap();

        assert!(second.was_deduplicated);
        assert_eq!(second.activity.id, first.activity.id);
        assert_eq!(mem.activity_count(PipelineMode::Legacy), 1);
    }

    #[tokio::test]
    async fn concurrent_submissions_with_same_key_create_one_activity() {
        let mem = backend();
        let backend = mem.clone().into_backend();

        let sub_a = submission();
        let sub_b = submission();
        let (a, b) = tokio::join!(
            backend.v2.create_activity_with_invites(&sub_a, "creator"),
            backend.v2.create_activity_with_invites(&sub_b, "creator"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.activity.id, b.activity.id);
        assert!(a.was_deduplicated || b.was_deduplicated);
        assert_eq!(mem.activity_count(PipelineMode::V2), 1);
    }

    #[tokio::test]
    async fn pipelines_do_not_share_idempotency_scopes() {
        let mem = backend();
        let backend = mem.clone().into_backend();
        backend
            .legacy
            .create_activity_with_invites(&submission(), "creator")
            .await
            .unwrap();
        let v2 = backend
            .v2
            .create_activity_with_invites(&submission(), "creator")
            .await
            .unwrap();

        assert!(!v2.was_deduplicated);
        assert_eq!(mem.activity_count(PipelineMode::Legacy), 1);
        assert_eq!(mem.activity_count(PipelineMode::V2), 1);
    }

    #[tokio::test]
    async fn commit_time_membership_recheck_reports_leaver() {
        let mem = backend();
        let backend = mem.clone().into_backend();
        // "def" leaves between validation and commit
        mem.remove_member(1, "def");

        let err = backend
            .legacy
            .create_activity_with_invites(&submission(), "creator")
            .await
            .unwrap_err();
        match err {
            ActivityError::InvalidInvitees {
                invalid_invitee_ids,
                attempted_invitee_ids,
            } => {
                assert_eq!(invalid_invitee_ids, vec!["def"]);
                assert_eq!(attempted_invitee_ids, vec!["abc", "def"]);
            }
            other => panic!("expected invitee error, got {other:?}"),
        }
        assert_eq!(mem.activity_count(PipelineMode::Legacy), 0);
    }

    #[tokio::test]
    async fn creator_invite_starts_accepted_on_scheduled() {
        let backend = backend().into_backend();
        let mut sub = submission();
        sub.attendee_ids.push("creator".to_string());
        let created = backend
            .legacy
            .create_activity_with_invites(&sub, "creator")
            .await
            .unwrap();
        let creator_invite = created
            .activity
            .invites
            .iter()
            .find(|i| i.user_id == "creator")
            .unwrap();
        assert_eq!(creator_invite.status, InviteStatus::Accepted);
    }
}
