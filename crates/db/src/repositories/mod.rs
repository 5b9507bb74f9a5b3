use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use venuely_core::domain::action::{ActionId, ActionStatus, AgentAction, BookingSummary, OwnerResponse};
use venuely_core::domain::booking::{Booking, BookingId};
use venuely_core::domain::conversation::{
    CollectedBookingData, Conversation, ConversationId, ConversationStatus, ConversationTurn,
    CustomerId,
};
use venuely_core::domain::venue::{Venue, VenueId};

pub mod action;
pub mod booking;
pub mod conversation;
pub mod memory;
pub mod venue;

pub use action::SqlActionRepository;
pub use booking::SqlBookingRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryActionRepository, InMemoryBookingRepository, InMemoryConversationRepository,
    InMemoryVenueRepository,
};
pub use venue::SqlVenueRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait VenueRepository: Send + Sync {
    async fn find_by_id(&self, id: &VenueId) -> Result<Option<Venue>, RepositoryError>;
    async fn save(&self, venue: Venue) -> Result<(), RepositoryError>;
    /// Capacity-driven venue lookup for `search_other_venues`; never returns
    /// the excluded venue.
    async fn search(
        &self,
        min_capacity: Option<u32>,
        exclude: Option<&VenueId>,
        limit: u32,
    ) -> Result<Vec<Venue>, RepositoryError>;
}

/// A partial conversation update: only supplied fields are written.
#[derive(Clone, Debug, Default)]
pub struct ConversationPatch {
    pub status: Option<ConversationStatus>,
    pub collected: Option<CollectedBookingData>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConversationPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.collected.is_none() && self.expires_at.is_none()
    }
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: &ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;
    /// Most recent active, non-expired conversation for the (venue, customer)
    /// pair.
    async fn find_active_for_customer(
        &self,
        venue_id: &VenueId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError>;
    async fn update(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// One-time customer attach: writes only when no customer is linked yet.
    /// Returns whether the link was made.
    async fn link_customer(
        &self,
        id: &ConversationId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// Append a completed turn batch; all turns land or none do.
    async fn append_turns(
        &self,
        id: &ConversationId,
        turns: &[ConversationTurn],
    ) -> Result<(), RepositoryError>;
    async fn list_turns(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError>;
    /// Sweep: mark overdue active conversations expired. Returns affected rows.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Everything written when an action leaves `pending`.
#[derive(Clone, Debug)]
pub struct ActionResolution {
    pub status: ActionStatus,
    pub owner_response: Option<OwnerResponse>,
    pub booking_id: Option<BookingId>,
    pub resolved_at: DateTime<Utc>,
}

#[async_trait]
pub trait ActionRepository: Send + Sync {
    async fn find_by_id(&self, id: &ActionId) -> Result<Option<AgentAction>, RepositoryError>;
    async fn insert(&self, action: AgentAction) -> Result<(), RepositoryError>;
    /// Conditional resolution: writes only while the row is still `pending`,
    /// so a concurrent second resolution loses instead of double-executing.
    /// Returns whether this caller won the transition.
    async fn resolve_if_pending(
        &self,
        id: &ActionId,
        resolution: ActionResolution,
    ) -> Result<bool, RepositoryError>;
    async fn list_for_venue(
        &self,
        venue_id: &VenueId,
        status: Option<ActionStatus>,
        limit: u32,
    ) -> Result<Vec<AgentAction>, RepositoryError>;
    async fn find_counter_offer_for(
        &self,
        original_id: &ActionId,
    ) -> Result<Option<AgentAction>, RepositoryError>;
    /// Sweep: expire pending actions created before the cutoff. Returns
    /// affected rows.
    async fn expire_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError>;
    async fn insert(&self, booking: Booking) -> Result<(), RepositoryError>;
    /// Rewrite the negotiated terms of an accepted booking after a
    /// counter-offer is accepted.
    async fn update_terms(
        &self,
        id: &BookingId,
        summary: &BookingSummary,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Mark a booking cancelled, e.g. when a competing resolution won the
    /// action-status race after this booking was written.
    async fn cancel(&self, id: &BookingId, now: DateTime<Utc>) -> Result<(), RepositoryError>;
    async fn list_accepted_on_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError>;
    async fn is_date_blocked(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError>;
    async fn block_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn unblock_date(&self, venue_id: &VenueId, date: NaiveDate)
        -> Result<(), RepositoryError>;
}
