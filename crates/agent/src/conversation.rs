//! Conversation lifecycle: resume by explicit handle, fall back to the
//! customer's most recent active session, otherwise open a fresh one. An
//! explicit handle wins over identity lookup so parallel browser tabs only
//! merge when they share the handle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use venuely_core::domain::conversation::{
    CollectedBookingData, Conversation, ConversationId, ConversationStatus, CustomerId,
};
use venuely_core::domain::venue::VenueId;
use venuely_db::repositories::{ConversationRepository, RepositoryError};

pub struct ConversationManager {
    conversations: Arc<dyn ConversationRepository>,
    ttl_days: i64,
}

impl ConversationManager {
    pub fn new(conversations: Arc<dyn ConversationRepository>, ttl_days: i64) -> Self {
        Self { conversations, ttl_days }
    }

    pub async fn resume_or_create(
        &self,
        venue_id: &VenueId,
        conversation_id: Option<&ConversationId>,
        customer_id: Option<&CustomerId>,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        if let Some(id) = conversation_id {
            if let Some(conversation) = self.conversations.find_by_id(id).await? {
                if conversation.venue_id == *venue_id && conversation.is_resumable(now) {
                    return Ok(conversation);
                }
            }
        }

        if let Some(customer) = customer_id {
            if let Some(conversation) =
                self.conversations.find_active_for_customer(venue_id, customer, now).await?
            {
                return Ok(conversation);
            }
        }

        let conversation = Conversation {
            id: ConversationId(Uuid::new_v4().to_string()),
            venue_id: venue_id.clone(),
            customer_id: customer_id.cloned(),
            status: ConversationStatus::Active,
            collected: CollectedBookingData::default(),
            expires_at: now + Duration::days(self.ttl_days),
            created_at: now,
            updated_at: now,
        };
        self.conversations.insert(conversation.clone()).await?;
        Ok(conversation)
    }

    /// One-time customer attach. Returns false when a customer is already
    /// linked, which callers treat as a no-op rather than an error.
    pub async fn link_customer(
        &self,
        id: &ConversationId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.conversations.link_customer(id, customer_id, now).await
    }
}
