use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use utoipa::ToSchema;
use uuid::Uuid;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(clock_time, Time, "[hour]:[minute]");

pub const FALLBACK_TIMEZONE: &str = "UTC";

/// Raw create-activity body as clients send it. Both the legacy flat shape and
/// the v2 shape deserialize into this one struct; the alias list below is the
/// single lookup table for alternate field names.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RawActivityPayload {
    #[serde(alias = "title")]
    pub name: Option<String>,
    #[serde(alias = "notes")]
    pub description: Option<String>,
    #[serde(alias = "date", alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "startTime")]
    pub start_time: Option<String>,
    #[serde(alias = "endTime")]
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub cost: Option<RawNumber>,
    #[serde(alias = "maxCapacity", alias = "max_participants")]
    pub max_capacity: Option<RawNumber>,
    pub category: Option<String>,
    #[serde(alias = "attendeeIds", alias = "invitee_ids")]
    pub attendee_ids: Option<Vec<RawId>>,
    #[serde(rename = "type", alias = "mode")]
    pub kind: Option<String>,
    #[serde(alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
}

/// Numeric client fields arrive either as JSON numbers or as strings pulled
/// straight out of form inputs.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RawNumber {
    Num(f64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RawId {
    Num(i64),
    Text(String),
}

impl RawId {
    pub fn into_string(self) -> String {
        match self {
            RawId::Num(n) => n.to_string(),
            RawId::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Sightseeing,
    Transport,
    Entertainment,
    Shopping,
    Culture,
    Outdoor,
    Manual,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Sightseeing => "sightseeing",
            Category::Transport => "transport",
            Category::Entertainment => "entertainment",
            Category::Shopping => "shopping",
            Category::Culture => "culture",
            Category::Outdoor => "outdoor",
            Category::Manual => "manual",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "food" => Ok(Category::Food),
            "sightseeing" => Ok(Category::Sightseeing),
            "transport" => Ok(Category::Transport),
            "entertainment" => Ok(Category::Entertainment),
            "shopping" => Ok(Category::Shopping),
            "culture" => Ok(Category::Culture),
            "outdoor" => Ok(Category::Outdoor),
            "manual" => Ok(Category::Manual),
            "other" => Ok(Category::Other),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    Scheduled,
    Propose,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Scheduled => "SCHEDULED",
            ActivityKind::Propose => "PROPOSE",
        }
    }

    pub fn is_proposal(&self) -> bool {
        matches!(self, ActivityKind::Propose)
    }
}

impl FromStr for ActivityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SCHEDULED" => Ok(ActivityKind::Scheduled),
            "PROPOSE" | "PROPOSED" => Ok(ActivityKind::Propose),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Waitlisted,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Declined => "declined",
            InviteStatus::Waitlisted => "waitlisted",
        }
    }
}

impl FromStr for InviteStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "declined" => Ok(InviteStatus::Declined),
            "waitlisted" => Ok(InviteStatus::Waitlisted),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Active,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Active => "active",
            ActivityStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ActivityStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ActivityStatus::Active),
            "cancelled" => Ok(ActivityStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// The canonical, normalized create-activity request. Constructed per request
/// by the normalizer and discarded after the store call.
///
/// Serializing a submission yields the canonical payload shape, which the
/// normalizer accepts back unchanged (normalization is a fixed point).
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ActivitySubmission {
    #[serde(skip)]
    pub trip_id: i32,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "iso_date")]
    #[schema(value_type = String)]
    pub start_date: Date,
    #[serde(with = "clock_time::option")]
    #[schema(value_type = Option<String>)]
    pub start_time: Option<Time>,
    #[serde(with = "clock_time::option")]
    #[schema(value_type = Option<String>)]
    pub end_time: Option<Time>,
    pub location: Option<String>,
    #[schema(value_type = Option<String>)]
    pub cost: Option<Decimal>,
    pub max_capacity: Option<i32>,
    pub category: Category,
    pub attendee_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub timezone: String,
    pub idempotency_key: String,
}

impl ActivitySubmission {
    pub fn utc_offset(&self) -> UtcOffset {
        parse_utc_offset(&self.timezone).unwrap_or(UtcOffset::UTC)
    }

    /// Start instant in the resolved timezone. Proposals without a start time
    /// anchor at midnight of the chosen date.
    pub fn starts_at(&self) -> OffsetDateTime {
        let time = self.start_time.unwrap_or(Time::MIDNIGHT);
        PrimitiveDateTime::new(self.start_date, time).assume_offset(self.utc_offset())
    }

    pub fn ends_at(&self) -> Option<OffsetDateTime> {
        self.end_time.map(|time| {
            PrimitiveDateTime::new(self.start_date, time).assume_offset(self.utc_offset())
        })
    }
}

/// Fixed-offset timezone designators: `UTC`, `Z`, `+HH:MM`, `-HH:MM`, `+HH`.
pub fn parse_utc_offset(tz: &str) -> Option<UtcOffset> {
    let tz = tz.trim();
    if tz.is_empty() {
        return None;
    }
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return Some(UtcOffset::UTC);
    }
    let (sign, rest) = if let Some(rest) = tz.strip_prefix('+') {
        (1i8, rest)
    } else if let Some(rest) = tz.strip_prefix('-') {
        (-1i8, rest)
    } else {
        return None;
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i8>().ok()?, m.parse::<i8>().ok()?),
        None => (rest.parse::<i8>().ok()?, 0),
    };
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}

/// The persisted activity together with its invite rows, as returned by the
/// store and serialized to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Activity {
    pub id: i64,
    pub trip_calendar_id: i32,
    pub posted_by: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>)]
    pub ends_at: Option<OffsetDateTime>,
    pub location: Option<String>,
    #[schema(value_type = Option<String>)]
    pub cost: Option<Decimal>,
    pub max_capacity: Option<i32>,
    pub category: Category,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub created_at: OffsetDateTime,
    pub invites: Vec<ActivityInvite>,
}

impl Activity {
    pub fn rsvp_counts(&self) -> RsvpCounts {
        RsvpCounts::from_invites(&self.invites)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivityInvite {
    pub activity_id: i64,
    pub user_id: String,
    pub status: InviteStatus,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String)]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RsvpCounts {
    pub accepted: usize,
    pub pending: usize,
    pub declined: usize,
    pub waitlisted: usize,
}

impl RsvpCounts {
    pub fn from_invites(invites: &[ActivityInvite]) -> Self {
        let mut counts = Self::default();
        for invite in invites {
            match invite.status {
                InviteStatus::Accepted => counts.accepted += 1,
                InviteStatus::Pending => counts.pending += 1,
                InviteStatus::Declined => counts.declined += 1,
                InviteStatus::Waitlisted => counts.waitlisted += 1,
            }
        }
        counts
    }
}

/// Store result: the persisted record plus whether the idempotency key
/// collapsed this call onto an earlier submission.
#[derive(Debug, Clone)]
pub struct CreatedActivity {
    pub activity: Activity,
    pub was_deduplicated: bool,
}

/// Trip-side context the validator needs: creator, current members, calendar
/// window, and the trip's timezone when one is set.
#[derive(Debug, Clone)]
pub struct TripContext {
    pub trip_id: i32,
    pub creator_id: String,
    pub member_ids: HashSet<String>,
    pub window: TripWindow,
    pub timezone: Option<String>,
}

impl TripContext {
    /// The creator is implicitly inviteable even when absent from the members
    /// table.
    pub fn can_invite(&self, user_id: &str) -> bool {
        user_id == self.creator_id || self.member_ids.contains(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripWindow {
    pub start_date: Date,
    pub end_date: Date,
}

impl TripWindow {
    pub fn contains(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Which persistence pipeline handles a submission. Selected by a pure
/// function of the server rollout flag and the per-request opt-in header, so
/// the v2 pipeline can be trialed per client without a global cutover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    Legacy,
    V2,
}

impl PipelineMode {
    pub fn select(flag_enabled: bool, header_requested: bool) -> Self {
        if flag_enabled && header_requested {
            PipelineMode::V2
        } else {
            PipelineMode::Legacy
        }
    }
}

impl Display for PipelineMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineMode::Legacy => write!(f, "legacy"),
            PipelineMode::V2 => write!(f, "v2"),
        }
    }
}

/// Correlation id attached to every submission, so a user-reported failure can
/// be matched to a server-side log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
