use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use super::models::Activity;

/// What an invitee hears about after a successful commit. Delivery transport
/// (push, e-mail) lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteNotification {
    pub activity_id: i64,
    pub activity_name: String,
    pub trip_id: i32,
    pub user_id: String,
    pub invited_by: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn invite_created(&self, notification: InviteNotification) -> Result<(), anyhow::Error>;
}

/// One notification per invitee other than the creator. Runs strictly after
/// the transaction commits; a failed send never fails the request.
pub async fn notify_invitees(sink: &dyn NotificationSink, activity: &Activity, creator_id: &str) {
    for invite in &activity.invites {
        if invite.user_id == creator_id {
            continue;
        }
        let notification = InviteNotification {
            activity_id: activity.id,
            activity_name: activity.name.clone(),
            trip_id: activity.trip_calendar_id,
            user_id: invite.user_id.clone(),
            invited_by: creator_id.to_string(),
        };
        if let Err(e) = sink.invite_created(notification).await {
            warn!(
                "Failed to notify {} about activity {}: {e:?}",
                invite.user_id, activity.id
            );
        }
    }
}

pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn invite_created(&self, notification: InviteNotification) -> Result<(), anyhow::Error> {
        info!(
            "Invite notification: user {} invited to activity {} ({:?}) by {}",
            notification.user_id,
            notification.activity_id,
            notification.activity_name,
            notification.invited_by
        );
        Ok(())
    }
}

/// Captures notifications instead of delivering them.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<InviteNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<InviteNotification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn invite_created(&self, notification: InviteNotification) -> Result<(), anyhow::Error> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}
