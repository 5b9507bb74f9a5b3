//! In-memory repository doubles for unit tests in the agent and server
//! crates. They mirror the SQL implementations' semantics, including the
//! conditional resolution write and the one-time customer link.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use venuely_core::domain::action::{ActionId, ActionStatus, ActionType, AgentAction, BookingSummary};
use venuely_core::domain::booking::{Booking, BookingId};
use venuely_core::domain::conversation::{
    Conversation, ConversationId, ConversationStatus, ConversationTurn, CustomerId,
};
use venuely_core::domain::venue::{Venue, VenueId};

use super::{
    ActionRepository, ActionResolution, BookingRepository, ConversationPatch,
    ConversationRepository, RepositoryError, VenueRepository,
};

#[derive(Default)]
pub struct InMemoryVenueRepository {
    venues: Mutex<HashMap<String, Venue>>,
}

impl InMemoryVenueRepository {
    pub fn with_venues(venues: Vec<Venue>) -> Self {
        let venues =
            venues.into_iter().map(|venue| (venue.id.0.clone(), venue)).collect::<HashMap<_, _>>();
        Self { venues: Mutex::new(venues) }
    }
}

#[async_trait::async_trait]
impl VenueRepository for InMemoryVenueRepository {
    async fn find_by_id(&self, id: &VenueId) -> Result<Option<Venue>, RepositoryError> {
        Ok(self.venues.lock().expect("venue lock").get(&id.0).cloned())
    }

    async fn save(&self, venue: Venue) -> Result<(), RepositoryError> {
        self.venues.lock().expect("venue lock").insert(venue.id.0.clone(), venue);
        Ok(())
    }

    async fn search(
        &self,
        min_capacity: Option<u32>,
        exclude: Option<&VenueId>,
        limit: u32,
    ) -> Result<Vec<Venue>, RepositoryError> {
        let venues = self.venues.lock().expect("venue lock");
        let mut results: Vec<Venue> = venues
            .values()
            .filter(|venue| venue.capacity >= min_capacity.unwrap_or(0))
            .filter(|venue| exclude.map(|excluded| venue.id != *excluded).unwrap_or(true))
            .cloned()
            .collect();
        results.sort_by(|left, right| {
            left.capacity.cmp(&right.capacity).then_with(|| left.name.cmp(&right.name))
        });
        results.truncate(limit as usize);
        Ok(results)
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: Mutex<HashMap<String, Conversation>>,
    turns: Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryConversationRepository {
    pub fn turn_count(&self, id: &ConversationId) -> usize {
        self.turns.lock().expect("turn lock").get(&id.0).map(Vec::len).unwrap_or(0)
    }

    pub fn total_turn_count(&self) -> usize {
        self.turns.lock().expect("turn lock").values().map(Vec::len).sum()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.conversations.lock().expect("conversation lock").get(&id.0).cloned())
    }

    async fn find_active_for_customer(
        &self,
        venue_id: &VenueId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.lock().expect("conversation lock");
        let mut candidates: Vec<&Conversation> = conversations
            .values()
            .filter(|conversation| {
                conversation.venue_id == *venue_id
                    && conversation.customer_id.as_ref() == Some(customer_id)
                    && conversation.status == ConversationStatus::Active
                    && conversation.expires_at > now
            })
            .collect();
        candidates.sort_by_key(|conversation| conversation.updated_at);
        Ok(candidates.last().map(|conversation| (*conversation).clone()))
    }

    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        self.conversations
            .lock()
            .expect("conversation lock")
            .insert(conversation.id.0.clone(), conversation);
        Ok(())
    }

    async fn update(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.lock().expect("conversation lock");
        if let Some(conversation) = conversations.get_mut(&id.0) {
            if let Some(status) = patch.status {
                conversation.status = status;
            }
            if let Some(collected) = patch.collected {
                conversation.collected = collected;
            }
            if let Some(expires_at) = patch.expires_at {
                conversation.expires_at = expires_at;
            }
            conversation.updated_at = now;
        }
        Ok(())
    }

    async fn link_customer(
        &self,
        id: &ConversationId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.lock().expect("conversation lock");
        match conversations.get_mut(&id.0) {
            Some(conversation) if conversation.customer_id.is_none() => {
                conversation.customer_id = Some(customer_id.clone());
                conversation.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_turns(
        &self,
        id: &ConversationId,
        turns: &[ConversationTurn],
    ) -> Result<(), RepositoryError> {
        self.turns
            .lock()
            .expect("turn lock")
            .entry(id.0.clone())
            .or_default()
            .extend(turns.iter().cloned());
        Ok(())
    }

    async fn list_turns(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        Ok(self.turns.lock().expect("turn lock").get(&id.0).cloned().unwrap_or_default())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut conversations = self.conversations.lock().expect("conversation lock");
        let mut affected = 0;
        for conversation in conversations.values_mut() {
            if conversation.status == ConversationStatus::Active && conversation.expires_at < now {
                conversation.status = ConversationStatus::Expired;
                conversation.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[derive(Default)]
pub struct InMemoryActionRepository {
    actions: Mutex<HashMap<String, AgentAction>>,
}

impl InMemoryActionRepository {
    pub fn all(&self) -> Vec<AgentAction> {
        self.actions.lock().expect("action lock").values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ActionRepository for InMemoryActionRepository {
    async fn find_by_id(&self, id: &ActionId) -> Result<Option<AgentAction>, RepositoryError> {
        Ok(self.actions.lock().expect("action lock").get(&id.0).cloned())
    }

    async fn insert(&self, action: AgentAction) -> Result<(), RepositoryError> {
        self.actions.lock().expect("action lock").insert(action.id.0.clone(), action);
        Ok(())
    }

    async fn resolve_if_pending(
        &self,
        id: &ActionId,
        resolution: ActionResolution,
    ) -> Result<bool, RepositoryError> {
        let mut actions = self.actions.lock().expect("action lock");
        match actions.get_mut(&id.0) {
            Some(action) if action.status == ActionStatus::Pending => {
                action.status = resolution.status;
                action.owner_response = resolution.owner_response;
                if resolution.booking_id.is_some() {
                    action.booking_id = resolution.booking_id;
                }
                action.resolved_at = Some(resolution.resolved_at);
                action.updated_at = resolution.resolved_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_venue(
        &self,
        venue_id: &VenueId,
        status: Option<ActionStatus>,
        limit: u32,
    ) -> Result<Vec<AgentAction>, RepositoryError> {
        let actions = self.actions.lock().expect("action lock");
        let mut results: Vec<AgentAction> = actions
            .values()
            .filter(|action| action.venue_id == *venue_id)
            .filter(|action| status.map(|status| action.status == status).unwrap_or(true))
            .cloned()
            .collect();
        results.sort_by_key(|action| action.created_at);
        results.truncate(limit as usize);
        Ok(results)
    }

    async fn find_counter_offer_for(
        &self,
        original_id: &ActionId,
    ) -> Result<Option<AgentAction>, RepositoryError> {
        let actions = self.actions.lock().expect("action lock");
        let mut counters: Vec<&AgentAction> = actions
            .values()
            .filter(|action| {
                action.action_type == ActionType::CounterOffer
                    && action.original_action_id.as_ref() == Some(original_id)
            })
            .collect();
        counters.sort_by_key(|action| action.created_at);
        Ok(counters.last().map(|action| (*action).clone()))
    }

    async fn expire_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut actions = self.actions.lock().expect("action lock");
        let mut affected = 0;
        for action in actions.values_mut() {
            if action.status == ActionStatus::Pending && action.created_at < cutoff {
                action.status = ActionStatus::Expired;
                action.resolved_at = Some(now);
                action.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: Mutex<HashMap<String, Booking>>,
    blocked: Mutex<HashMap<(String, NaiveDate), Option<String>>>,
}

impl InMemoryBookingRepository {
    pub fn booking_count(&self) -> usize {
        self.bookings.lock().expect("booking lock").len()
    }
}

#[async_trait::async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.bookings.lock().expect("booking lock").get(&id.0).cloned())
    }

    async fn insert(&self, booking: Booking) -> Result<(), RepositoryError> {
        self.bookings.lock().expect("booking lock").insert(booking.id.0.clone(), booking);
        Ok(())
    }

    async fn update_terms(
        &self,
        id: &BookingId,
        summary: &BookingSummary,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.lock().expect("booking lock");
        if let Some(booking) = bookings.get_mut(&id.0) {
            booking.event_date = summary.event_date;
            booking.start_time = summary.start_time;
            booking.end_time = summary.end_time;
            booking.guest_count = summary.guest_count;
            booking.price = summary.price;
            booking.event_type = summary.event_type.clone();
            booking.updated_at = now;
        }
        Ok(())
    }

    async fn cancel(&self, id: &BookingId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.lock().expect("booking lock");
        if let Some(booking) = bookings.get_mut(&id.0) {
            booking.status = venuely_core::domain::booking::BookingStatus::Cancelled;
            booking.updated_at = now;
        }
        Ok(())
    }

    async fn list_accepted_on_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.lock().expect("booking lock");
        let mut results: Vec<Booking> = bookings
            .values()
            .filter(|booking| {
                booking.venue_id == *venue_id
                    && booking.event_date == date
                    && booking.status == venuely_core::domain::booking::BookingStatus::Accepted
            })
            .cloned()
            .collect();
        results.sort_by_key(|booking| booking.start_time);
        Ok(results)
    }

    async fn is_date_blocked(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        Ok(self.blocked.lock().expect("block lock").contains_key(&(venue_id.0.clone(), date)))
    }

    async fn block_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
        reason: Option<&str>,
        _now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.blocked
            .lock()
            .expect("block lock")
            .insert((venue_id.0.clone(), date), reason.map(str::to_string));
        Ok(())
    }

    async fn unblock_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<(), RepositoryError> {
        self.blocked.lock().expect("block lock").remove(&(venue_id.0.clone(), date));
        Ok(())
    }
}
