use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgDatabaseError;
use sqlx::{FromRow, PgPool, Row};
use time::OffsetDateTime;
use tracing::trace;

use crate::modules::database::PgQuery;

use super::errors::{invitee_ids_from_fk_detail, ActivityError};
use super::models::{
    Activity, ActivityInvite, ActivityKind, ActivityStatus, ActivitySubmission, Category,
    CreatedActivity, InviteStatus, PipelineMode, TripContext, TripWindow,
};
use super::notify::NotificationSink;

/// Read-only trip lookups the pipeline needs before persisting.
#[async_trait]
pub trait TripDirectory: Send + Sync {
    async fn trip_context(&self, trip_id: i32) -> Result<Option<TripContext>, ActivityError>;
}

/// The persistence contract: activity row and all invite rows in one atomic
/// transaction. Implementations must re-check invitee membership inside that
/// transaction and surface violations as `ActivityError::InvalidInvitees`.
#[async_trait]
pub trait ActivityCreator: Send + Sync {
    async fn create_activity_with_invites(
        &self,
        submission: &ActivitySubmission,
        creator_id: &str,
    ) -> Result<CreatedActivity, ActivityError>;
}

/// Everything the submission dispatcher talks to, bundled for app state.
#[derive(Clone)]
pub struct ActivityBackend {
    pub trips: Arc<dyn TripDirectory>,
    pub legacy: Arc<dyn ActivityCreator>,
    pub v2: Arc<dyn ActivityCreator>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl ActivityBackend {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            trips: Arc::new(PgTripDirectory { pool: pool.clone() }),
            legacy: Arc::new(PgLegacyActivities { pool: pool.clone() }),
            v2: Arc::new(PgActivitiesV2 { pool }),
            notifier: Arc::new(super::notify::TracingNotifier),
        }
    }

    pub fn creator_for(&self, mode: PipelineMode) -> &dyn ActivityCreator {
        match mode {
            PipelineMode::Legacy => self.legacy.as_ref(),
            PipelineMode::V2 => self.v2.as_ref(),
        }
    }
}

pub struct PgTripDirectory {
    pool: PgPool,
}

#[async_trait]
impl TripDirectory for PgTripDirectory {
    async fn trip_context(&self, trip_id: i32) -> Result<Option<TripContext>, ActivityError> {
        let mut conn = self.pool.acquire().await?;
        let mut q = PgQuery::new(TripQuery, &mut conn);
        q.trip_context(trip_id).await
    }
}

pub struct TripQuery;

impl<'c> PgQuery<'c, TripQuery> {
    pub async fn trip_context(
        &mut self,
        trip_id: i32,
    ) -> Result<Option<TripContext>, ActivityError> {
        let trip = sqlx::query(
            r#"
            SELECT creator_id, timezone, start_date, end_date
            FROM trips
            WHERE id = $1
        "#,
        )
        .bind(trip_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        let Some(trip) = trip else {
            return Ok(None);
        };

        let member_ids = member_set(&mut *self.conn, trip_id).await?;
        trace!("Loaded trip {trip_id} with {} members", member_ids.len());

        Ok(Some(TripContext {
            trip_id,
            creator_id: trip.try_get("creator_id").context("trips.creator_id")?,
            member_ids,
            window: TripWindow {
                start_date: trip.try_get("start_date").context("trips.start_date")?,
                end_date: trip.try_get("end_date").context("trips.end_date")?,
            },
            timezone: trip.try_get("timezone").context("trips.timezone")?,
        }))
    }
}

async fn member_set(
    conn: &mut sqlx::PgConnection,
    trip_id: i32,
) -> Result<HashSet<String>, ActivityError> {
    let rows = sqlx::query(
        r#"
        SELECT user_id FROM trip_members WHERE trip_id = $1
    "#,
    )
    .bind(trip_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            row.try_get::<String, _>("user_id")
                .context("trip_members.user_id")
                .map_err(ActivityError::from)
        })
        .collect()
}

/// Legacy single-table pipeline: the idempotency key is a unique column on
/// `activities` itself.
pub struct PgLegacyActivities {
    pool: PgPool,
}

#[async_trait]
impl ActivityCreator for PgLegacyActivities {
    async fn create_activity_with_invites(
        &self,
        submission: &ActivitySubmission,
        creator_id: &str,
    ) -> Result<CreatedActivity, ActivityError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT id FROM activities
            WHERE trip_calendar_id = $1 AND posted_by = $2 AND idempotency_key = $3
        "#,
        )
        .bind(submission.trip_id)
        .bind(creator_id)
        .bind(&submission.idempotency_key)
        .fetch_optional(&mut tx)
        .await?;

        if let Some(row) = existing {
            let id = row.try_get::<i64, _>("id").context("activities.id")?;
            let activity = load_activity(&mut tx, "activities", "activity_invites", id).await?;
            tx.commit().await?;
            trace!("Submission deduplicated onto activity {id}");
            return Ok(CreatedActivity {
                activity,
                was_deduplicated: true,
            });
        }

        check_membership(&mut tx, submission, creator_id).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO activities
                (trip_calendar_id, posted_by, name, description, starts_at, ends_at,
                 location, cost, max_capacity, category, kind, status, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (trip_calendar_id, posted_by, idempotency_key) DO NOTHING
            RETURNING id
        "#,
        )
        .bind(submission.trip_id)
        .bind(creator_id)
        .bind(&submission.name)
        .bind(&submission.description)
        .bind(submission.starts_at())
        .bind(submission.ends_at())
        .bind(&submission.location)
        .bind(submission.cost)
        .bind(submission.max_capacity)
        .bind(submission.category.as_str())
        .bind(submission.kind.as_str())
        .bind(ActivityStatus::Active.as_str())
        .bind(&submission.idempotency_key)
        .fetch_optional(&mut tx)
        .await?;

        let activity_id = match inserted {
            Some(row) => row.try_get::<i64, _>("id").context("activities.id")?,
            None => {
                // Duplicate key: hand back the original record untouched.
                let existing = sqlx::query(
                    r#"
                    SELECT id FROM activities
                    WHERE trip_calendar_id = $1 AND posted_by = $2 AND idempotency_key = $3
                "#,
                )
                .bind(submission.trip_id)
                .bind(creator_id)
                .bind(&submission.idempotency_key)
                .fetch_one(&mut tx)
                .await?;
                let id = existing.try_get::<i64, _>("id").context("activities.id")?;
                let activity = load_activity(&mut tx, "activities", "activity_invites", id).await?;
                tx.commit().await?;
                trace!("Submission deduplicated onto activity {id}");
                return Ok(CreatedActivity {
                    activity,
                    was_deduplicated: true,
                });
            }
        };

        insert_invites(
            &mut tx,
            "activity_invites",
            activity_id,
            submission,
            creator_id,
        )
        .await?;

        let activity =
            load_activity(&mut tx, "activities", "activity_invites", activity_id).await?;
        tx.commit().await?;
        trace!("Created activity {activity_id} via legacy pipeline");

        Ok(CreatedActivity {
            activity,
            was_deduplicated: false,
        })
    }
}

/// Versioned v2 pipeline: rows carry a schema version and idempotency lives in
/// a separate submissions ledger.
pub struct PgActivitiesV2 {
    pool: PgPool,
}

impl PgActivitiesV2 {
    /// Looks the idempotency key up in the ledger and loads the original
    /// record when present. Shared by the fast path and the recovery path
    /// after a concurrent duplicate wins the ledger insert.
    async fn find_deduplicated(
        &self,
        submission: &ActivitySubmission,
        creator_id: &str,
    ) -> Result<Option<CreatedActivity>, ActivityError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT activity_id FROM activity_submissions
            WHERE trip_id = $1 AND created_by = $2 AND idempotency_key = $3
        "#,
        )
        .bind(submission.trip_id)
        .bind(creator_id)
        .bind(&submission.idempotency_key)
        .fetch_optional(&mut tx)
        .await?;

        let Some(row) = existing else {
            return Ok(None);
        };
        let id = row
            .try_get::<i64, _>("activity_id")
            .context("activity_submissions.activity_id")?;
        let activity = load_activity(&mut tx, "activities_v2", "activity_invites_v2", id).await?;
        tx.commit().await?;
        trace!("Submission deduplicated onto activity {id} (v2)");
        Ok(Some(CreatedActivity {
            activity,
            was_deduplicated: true,
        }))
    }
}

#[async_trait]
impl ActivityCreator for PgActivitiesV2 {
    async fn create_activity_with_invites(
        &self,
        submission: &ActivitySubmission,
        creator_id: &str,
    ) -> Result<CreatedActivity, ActivityError> {
        if let Some(original) = self.find_deduplicated(submission, creator_id).await? {
            return Ok(original);
        }

        let mut tx = self.pool.begin().await?;

        check_membership(&mut tx, submission, creator_id).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO activities_v2
                (trip_calendar_id, posted_by, name, description, starts_at, ends_at,
                 location, cost, max_capacity, category, kind, status, schema_version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 2)
            RETURNING id
        "#,
        )
        .bind(submission.trip_id)
        .bind(creator_id)
        .bind(&submission.name)
        .bind(&submission.description)
        .bind(submission.starts_at())
        .bind(submission.ends_at())
        .bind(&submission.location)
        .bind(submission.cost)
        .bind(submission.max_capacity)
        .bind(submission.category.as_str())
        .bind(submission.kind.as_str())
        .bind(ActivityStatus::Active.as_str())
        .fetch_one(&mut tx)
        .await?;
        let activity_id = inserted.try_get::<i64, _>("id").context("activities_v2.id")?;

        let ledger = sqlx::query(
            r#"
            INSERT INTO activity_submissions (trip_id, created_by, idempotency_key, activity_id)
            VALUES ($1, $2, $3, $4)
        "#,
        )
        .bind(submission.trip_id)
        .bind(creator_id)
        .bind(&submission.idempotency_key)
        .bind(activity_id)
        .execute(&mut tx)
        .await;

        if let Err(e) = ledger {
            if is_unique_violation(&e) {
                // A concurrent submission with the same key won the ledger;
                // abandon this row and hand back the original.
                tx.rollback().await?;
                return self
                    .find_deduplicated(submission, creator_id)
                    .await?
                    .ok_or_else(|| {
                        ActivityError::Unexpected(anyhow::anyhow!(
                            "ledger entry vanished after unique violation"
                        ))
                    });
            }
            return Err(e.into());
        }

        insert_invites(
            &mut tx,
            "activity_invites_v2",
            activity_id,
            submission,
            creator_id,
        )
        .await?;

        let activity =
            load_activity(&mut tx, "activities_v2", "activity_invites_v2", activity_id).await?;
        tx.commit().await?;
        trace!("Created activity {activity_id} via v2 pipeline");

        Ok(CreatedActivity {
            activity,
            was_deduplicated: false,
        })
    }
}

/// Membership recheck inside the open transaction; a removal committed after
/// route-level validation is caught here.
async fn check_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    submission: &ActivitySubmission,
    creator_id: &str,
) -> Result<(), ActivityError> {
    let members = member_set(&mut *tx, submission.trip_id).await?;
    let invalid: Vec<String> = submission
        .attendee_ids
        .iter()
        .filter(|id| id.as_str() != creator_id && !members.contains(id.as_str()))
        .cloned()
        .collect();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ActivityError::InvalidInvitees {
            invalid_invitee_ids: invalid,
            attempted_invitee_ids: submission.attendee_ids.clone(),
        })
    }
}

async fn insert_invites(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table: &str,
    activity_id: i64,
    submission: &ActivitySubmission,
    creator_id: &str,
) -> Result<(), ActivityError> {
    for user_id in &submission.attendee_ids {
        let status = initial_invite_status(submission.kind, user_id == creator_id);
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (activity_id, trip_id, user_id, status)
            VALUES ($1, $2, $3, $4)
        "#
        ))
        .bind(activity_id)
        .bind(submission.trip_id)
        .bind(user_id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_invite_error(e, &submission.attendee_ids))?;
    }
    Ok(())
}

/// The creator's own invite starts accepted on a scheduled activity; everyone
/// else (and all proposal invites) start pending.
pub fn initial_invite_status(kind: ActivityKind, is_creator: bool) -> InviteStatus {
    if is_creator && !kind.is_proposal() {
        InviteStatus::Accepted
    } else {
        InviteStatus::Pending
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// The membership check can still lose a race to a concurrent member removal;
/// the invite foreign key then fires and must surface the same way the typed
/// error does.
fn map_invite_error(e: sqlx::Error, attempted: &[String]) -> ActivityError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23503") {
            let mut invalid = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.detail())
                .map(invitee_ids_from_fk_detail)
                .unwrap_or_default();
            if invalid.is_empty() {
                invalid = attempted.to_vec();
            }
            return ActivityError::InvalidInvitees {
                invalid_invitee_ids: invalid,
                attempted_invitee_ids: attempted.to_vec(),
            };
        }
    }
    e.into()
}

#[derive(FromRow)]
struct ActivityRow {
    id: i64,
    trip_calendar_id: i32,
    posted_by: String,
    name: String,
    description: Option<String>,
    starts_at: OffsetDateTime,
    ends_at: Option<OffsetDateTime>,
    location: Option<String>,
    cost: Option<Decimal>,
    max_capacity: Option<i32>,
    category: String,
    kind: String,
    status: String,
    created_at: OffsetDateTime,
}

#[derive(FromRow)]
struct InviteRow {
    activity_id: i64,
    user_id: String,
    status: String,
    created_at: OffsetDateTime,
}

async fn load_activity(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    activities_table: &str,
    invites_table: &str,
    id: i64,
) -> Result<Activity, ActivityError> {
    let row: ActivityRow = sqlx::query_as(&format!(
        r#"
        SELECT id, trip_calendar_id, posted_by, name, description, starts_at, ends_at,
               location, cost, max_capacity, category, kind, status, created_at
        FROM {activities_table}
        WHERE id = $1
    "#
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let invite_rows: Vec<InviteRow> = sqlx::query_as(&format!(
        r#"
        SELECT activity_id, user_id, status, created_at
        FROM {invites_table}
        WHERE activity_id = $1
        ORDER BY user_id
    "#
    ))
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    let invites = invite_rows
        .into_iter()
        .map(|row| {
            Ok(ActivityInvite {
                activity_id: row.activity_id,
                user_id: row.user_id,
                status: row
                    .status
                    .parse()
                    .map_err(|_| anyhow::anyhow!("unknown invite status {:?}", row.status))?,
                created_at: row.created_at,
            })
        })
        .collect::<Result<Vec<_>, anyhow::Error>>()?;

    Ok(Activity {
        id: row.id,
        trip_calendar_id: row.trip_calendar_id,
        posted_by: row.posted_by,
        name: row.name,
        description: row.description,
        starts_at: row.starts_at.to_offset(time::UtcOffset::UTC),
        ends_at: row.ends_at.map(|t| t.to_offset(time::UtcOffset::UTC)),
        location: row.location,
        cost: row.cost,
        max_capacity: row.max_capacity,
        category: row
            .category
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown category {:?}", row.category))?,
        kind: row
            .kind
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown activity kind {:?}", row.kind))?,
        status: row
            .status
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown activity status {:?}", row.status))?,
        created_at: row.created_at,
        invites,
    })
}
