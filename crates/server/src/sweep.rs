//! Periodic maintenance: expire overdue conversations and stale pending
//! actions. Triggered externally (cron hitting the guarded endpoint) and
//! idempotent; terminal rows are never touched twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use venuely_db::repositories::{ActionRepository, ConversationRepository, RepositoryError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_conversations: u64,
    pub expired_actions: u64,
}

pub struct SweepService {
    conversations: Arc<dyn ConversationRepository>,
    actions: Arc<dyn ActionRepository>,
    action_stale_days: i64,
}

impl SweepService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        actions: Arc<dyn ActionRepository>,
        action_stale_days: i64,
    ) -> Self {
        Self { conversations, actions, action_stale_days }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<SweepReport, RepositoryError> {
        let expired_conversations = self.conversations.expire_overdue(now).await?;
        let cutoff = now - Duration::days(self.action_stale_days);
        let expired_actions = self.actions.expire_stale_pending(cutoff).await?;

        let report = SweepReport { expired_conversations, expired_actions };
        info!(
            event_name = "sweep.completed",
            expired_conversations = report.expired_conversations,
            expired_actions = report.expired_actions,
            "sweep completed"
        );
        Ok(report)
    }
}
