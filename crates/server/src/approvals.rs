//! The action decision workflow: a venue owner approves, declines, or
//! counter-offers an agent-negotiated proposal, and the non-proposing party
//! resolves counter-offers. Every transition leaves `pending` through a
//! single conditional write, so concurrent resolutions fail closed instead
//! of double-executing side effects.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use venuely_core::approvals::{
    merge_counter_offer, validate_overrides, ModifyRequest, ResolutionError,
};
use venuely_core::domain::action::{
    ActionId, ActionStatus, ActionSummary, ActionType, AgentAction, OwnerResponse, ProposingParty,
};
use venuely_core::domain::booking::BookingId;
use venuely_core::domain::conversation::{ConversationStatus, CustomerId};
use venuely_core::domain::venue::{OwnerId, Venue};
use venuely_db::repositories::{
    ActionRepository, ActionResolution, BookingRepository, ConversationPatch,
    ConversationRepository, RepositoryError, VenueRepository,
};

use crate::collaborators::{
    ActionEvent, BookingWriter, Broadcaster, CollaboratorError, Notification, Notifier,
};

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("action not found")]
    NotFound,
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("booking creation failed: {0}")]
    BookingCreation(String),
    #[error("calendar conflict: {0}")]
    CalendarConflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Who is resolving, as authenticated by the calling surface.
#[derive(Clone, Debug)]
pub enum ResolverIdentity {
    Owner(OwnerId),
    Customer(CustomerId),
}

impl ResolverIdentity {
    fn party(&self) -> ProposingParty {
        match self {
            Self::Owner(_) => ProposingParty::Owner,
            Self::Customer(_) => ProposingParty::Customer,
        }
    }

    fn id(&self) -> &str {
        match self {
            Self::Owner(owner) => &owner.0,
            Self::Customer(customer) => &customer.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecisionOutcome {
    pub action_id: ActionId,
    pub status: ActionStatus,
    pub booking_id: Option<BookingId>,
    pub counter_offer_id: Option<ActionId>,
}

pub struct DecisionService {
    venues: Arc<dyn VenueRepository>,
    conversations: Arc<dyn ConversationRepository>,
    actions: Arc<dyn ActionRepository>,
    bookings: Arc<dyn BookingRepository>,
    writer: Arc<dyn BookingWriter>,
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl DecisionService {
    pub fn new(
        venues: Arc<dyn VenueRepository>,
        conversations: Arc<dyn ConversationRepository>,
        actions: Arc<dyn ActionRepository>,
        bookings: Arc<dyn BookingRepository>,
        writer: Arc<dyn BookingWriter>,
        notifier: Arc<dyn Notifier>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self { venues, conversations, actions, bookings, writer, notifier, broadcaster }
    }

    /// Owner approves a pending booking proposal. The booking is created
    /// first; only then does the action leave `pending`, so a failed
    /// creation leaves everything untouched.
    pub async fn approve(
        &self,
        action_id: &ActionId,
        owner_id: &OwnerId,
        note: Option<String>,
    ) -> Result<DecisionOutcome, DecisionError> {
        let action = self.load_action(action_id).await?;
        let venue = self.load_owned_venue(&action, owner_id).await?;
        action.guard_type(ActionType::BookingApproval)?;
        action.guard_pending()?;

        let summary = action
            .summary
            .as_booking()
            .ok_or(ResolutionError::WrongActionType {
                expected: ActionType::BookingApproval,
                actual: action.action_type,
            })?;

        let booking_id = self
            .writer
            .create_booking(&venue.id, summary)
            .await
            .map_err(|e| DecisionError::BookingCreation(e.to_string()))?;

        let claimed = self
            .actions
            .resolve_if_pending(
                action_id,
                ActionResolution {
                    status: ActionStatus::Approved,
                    owner_response: Some(OwnerResponse { decided_by: owner_id.0.clone(), note }),
                    booking_id: Some(booking_id.clone()),
                    resolved_at: Utc::now(),
                },
            )
            .await?;

        if !claimed {
            if let Err(error) = self.writer.discard_booking(&venue.id, &booking_id).await {
                warn!(
                    event_name = "approval.compensation_failed",
                    action_id = %action_id.0,
                    booking_id = %booking_id.0,
                    error = %error,
                    "could not withdraw booking after losing the resolution race"
                );
            }
            return Err(self.current_status_conflict(action_id).await);
        }

        self.complete_conversation(&action).await;
        self.notify_customer(
            &action,
            "booking_approved",
            "Your booking was approved",
            &format!("{} confirmed your event on {}.", venue.name, summary.event_date),
            owner_id.0.as_str(),
        )
        .await;
        self.broadcast_resolution(&action, ActionStatus::Approved, Some(&booking_id));

        info!(
            event_name = "approval.approved",
            action_id = %action_id.0,
            venue_id = %venue.id.0,
            booking_id = %booking_id.0,
            "booking proposal approved"
        );

        Ok(DecisionOutcome {
            action_id: action_id.clone(),
            status: ActionStatus::Approved,
            booking_id: Some(booking_id),
            counter_offer_id: None,
        })
    }

    /// Owner declines a pending proposal or escalation; the conversation
    /// re-opens for further negotiation.
    pub async fn decline(
        &self,
        action_id: &ActionId,
        owner_id: &OwnerId,
        reason: Option<String>,
    ) -> Result<DecisionOutcome, DecisionError> {
        let action = self.load_action(action_id).await?;
        let venue = self.load_owned_venue(&action, owner_id).await?;
        if action.action_type == ActionType::CounterOffer {
            return Err(ResolutionError::WrongActionType {
                expected: ActionType::BookingApproval,
                actual: action.action_type,
            }
            .into());
        }
        action.guard_pending()?;

        let claimed = self
            .actions
            .resolve_if_pending(
                action_id,
                ActionResolution {
                    status: ActionStatus::Declined,
                    owner_response: Some(OwnerResponse {
                        decided_by: owner_id.0.clone(),
                        note: reason,
                    }),
                    booking_id: None,
                    resolved_at: Utc::now(),
                },
            )
            .await?;
        if !claimed {
            return Err(self.current_status_conflict(action_id).await);
        }

        self.reopen_conversation(&action).await;
        self.broadcast_resolution(&action, ActionStatus::Declined, None);

        info!(
            event_name = "approval.declined",
            action_id = %action_id.0,
            venue_id = %venue.id.0,
            "proposal declined"
        );

        Ok(DecisionOutcome {
            action_id: action_id.clone(),
            status: ActionStatus::Declined,
            booking_id: None,
            counter_offer_id: None,
        })
    }

    /// Owner counters a pending proposal: the original becomes `modified`
    /// and exactly one new pending counter-offer carries the merged terms.
    pub async fn modify(
        &self,
        action_id: &ActionId,
        owner_id: &OwnerId,
        request: ModifyRequest,
    ) -> Result<DecisionOutcome, DecisionError> {
        let action = self.load_action(action_id).await?;
        let venue = self.load_owned_venue(&action, owner_id).await?;
        action.guard_type(ActionType::BookingApproval)?;
        action.guard_pending()?;

        if request.is_empty() {
            return Err(ResolutionError::InvalidField {
                field: "overrides",
                message: "a counter-offer needs at least one changed field".to_string(),
            }
            .into());
        }
        let overrides = validate_overrides(&request)?;
        let original_summary = action
            .summary
            .as_booking()
            .ok_or(ResolutionError::WrongActionType {
                expected: ActionType::BookingApproval,
                actual: action.action_type,
            })?;
        let merged = merge_counter_offer(original_summary, &overrides);

        let claimed = self
            .actions
            .resolve_if_pending(
                action_id,
                ActionResolution {
                    status: ActionStatus::Modified,
                    owner_response: Some(OwnerResponse {
                        decided_by: owner_id.0.clone(),
                        note: overrides.owner_note.clone(),
                    }),
                    booking_id: None,
                    resolved_at: Utc::now(),
                },
            )
            .await?;
        if !claimed {
            return Err(self.current_status_conflict(action_id).await);
        }

        let now = Utc::now();
        let counter = AgentAction {
            id: ActionId(Uuid::new_v4().to_string()),
            venue_id: action.venue_id.clone(),
            conversation_id: action.conversation_id.clone(),
            customer_id: action.customer_id.clone(),
            action_type: ActionType::CounterOffer,
            status: ActionStatus::Pending,
            proposed_by: ProposingParty::Owner,
            summary: ActionSummary::Booking(merged),
            owner_response: None,
            original_action_id: Some(action_id.clone()),
            booking_id: action.booking_id.clone(),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let counter_id = counter.id.clone();
        self.actions.insert(counter).await?;

        self.reopen_conversation(&action).await;
        self.notify_customer(
            &action,
            "counter_offer",
            "The owner sent a counter-offer",
            &format!("{} proposed changed terms for your event.", venue.name),
            owner_id.0.as_str(),
        )
        .await;
        self.broadcast_resolution(&action, ActionStatus::Modified, None);

        info!(
            event_name = "approval.modified",
            action_id = %action_id.0,
            counter_offer_id = %counter_id.0,
            venue_id = %venue.id.0,
            "proposal countered"
        );

        Ok(DecisionOutcome {
            action_id: action_id.clone(),
            status: ActionStatus::Modified,
            booking_id: None,
            counter_offer_id: Some(counter_id),
        })
    }

    /// The non-proposing party accepts or declines a pending counter-offer.
    /// Acceptance creates the booking, or, when the counter targets an
    /// already-accepted booking, moves it (old date unblocked, new date
    /// verified free and blocked).
    pub async fn respond_to_counter_offer(
        &self,
        action_id: &ActionId,
        resolver: &ResolverIdentity,
        accept: bool,
        note: Option<String>,
    ) -> Result<DecisionOutcome, DecisionError> {
        let action = self.load_action(action_id).await?;
        let venue = self.authorize_counter_party(&action, resolver).await?;
        action.guard_type(ActionType::CounterOffer)?;
        action.guard_pending()?;

        if !accept {
            let claimed = self
                .actions
                .resolve_if_pending(
                    action_id,
                    ActionResolution {
                        status: ActionStatus::Declined,
                        owner_response: Some(OwnerResponse {
                            decided_by: resolver.id().to_string(),
                            note,
                        }),
                        booking_id: None,
                        resolved_at: Utc::now(),
                    },
                )
                .await?;
            if !claimed {
                return Err(self.current_status_conflict(action_id).await);
            }

            self.reopen_conversation(&action).await;
            self.broadcast_resolution(&action, ActionStatus::Declined, None);
            return Ok(DecisionOutcome {
                action_id: action_id.clone(),
                status: ActionStatus::Declined,
                booking_id: None,
                counter_offer_id: None,
            });
        }

        let summary = action
            .summary
            .as_booking()
            .ok_or(ResolutionError::WrongActionType {
                expected: ActionType::CounterOffer,
                actual: action.action_type,
            })?
            .clone();

        let existing_booking = match &action.booking_id {
            Some(id) => self.bookings.find_by_id(id).await?,
            None => None,
        };

        let booking_id = match existing_booking {
            Some(booking) => {
                // Moving an accepted booking: the target date must be free
                // of blocks and competing accepted bookings before we claim
                // the action.
                if booking.event_date != summary.event_date {
                    if self.bookings.is_date_blocked(&venue.id, summary.event_date).await? {
                        return Err(DecisionError::CalendarConflict(format!(
                            "{} is blocked",
                            summary.event_date
                        )));
                    }
                    let competing = self
                        .bookings
                        .list_accepted_on_date(&venue.id, summary.event_date)
                        .await?;
                    if competing.iter().any(|other| other.id != booking.id) {
                        return Err(DecisionError::CalendarConflict(format!(
                            "{} already has an accepted booking",
                            summary.event_date
                        )));
                    }
                }

                let claimed = self
                    .actions
                    .resolve_if_pending(
                        action_id,
                        ActionResolution {
                            status: ActionStatus::Approved,
                            owner_response: Some(OwnerResponse {
                                decided_by: resolver.id().to_string(),
                                note,
                            }),
                            booking_id: Some(booking.id.clone()),
                            resolved_at: Utc::now(),
                        },
                    )
                    .await?;
                if !claimed {
                    return Err(self.current_status_conflict(action_id).await);
                }

                let now = Utc::now();
                if booking.event_date != summary.event_date {
                    self.bookings.unblock_date(&venue.id, booking.event_date).await?;
                    self.bookings
                        .block_date(&venue.id, summary.event_date, Some("booking"), now)
                        .await?;
                }
                self.bookings.update_terms(&booking.id, &summary, now).await?;
                booking.id
            }
            None => {
                let booking_id = self
                    .writer
                    .create_booking(&venue.id, &summary)
                    .await
                    .map_err(|e| DecisionError::BookingCreation(e.to_string()))?;

                let claimed = self
                    .actions
                    .resolve_if_pending(
                        action_id,
                        ActionResolution {
                            status: ActionStatus::Approved,
                            owner_response: Some(OwnerResponse {
                                decided_by: resolver.id().to_string(),
                                note,
                            }),
                            booking_id: Some(booking_id.clone()),
                            resolved_at: Utc::now(),
                        },
                    )
                    .await?;
                if !claimed {
                    if let Err(error) = self.writer.discard_booking(&venue.id, &booking_id).await {
                        warn!(
                            event_name = "approval.compensation_failed",
                            action_id = %action_id.0,
                            booking_id = %booking_id.0,
                            error = %error,
                            "could not withdraw booking after losing the resolution race"
                        );
                    }
                    return Err(self.current_status_conflict(action_id).await);
                }
                booking_id
            }
        };

        self.complete_conversation(&action).await;
        self.notify_counterparty(&action, resolver, &venue).await;
        self.broadcast_resolution(&action, ActionStatus::Approved, Some(&booking_id));

        info!(
            event_name = "approval.counter_offer_accepted",
            action_id = %action_id.0,
            venue_id = %venue.id.0,
            booking_id = %booking_id.0,
            "counter-offer accepted"
        );

        Ok(DecisionOutcome {
            action_id: action_id.clone(),
            status: ActionStatus::Approved,
            booking_id: Some(booking_id),
            counter_offer_id: None,
        })
    }

    async fn load_action(&self, action_id: &ActionId) -> Result<AgentAction, DecisionError> {
        self.actions.find_by_id(action_id).await?.ok_or(DecisionError::NotFound)
    }

    /// Ownership check that does not reveal whether the action exists to a
    /// non-owner beyond "not authorized".
    async fn load_owned_venue(
        &self,
        action: &AgentAction,
        owner_id: &OwnerId,
    ) -> Result<Venue, DecisionError> {
        let venue = self
            .venues
            .find_by_id(&action.venue_id)
            .await?
            .ok_or(DecisionError::NotFound)?;
        if venue.owner_id != *owner_id {
            return Err(ResolutionError::NotAuthorized.into());
        }
        Ok(venue)
    }

    /// Counter-offers are resolved by the party that did not propose them.
    async fn authorize_counter_party(
        &self,
        action: &AgentAction,
        resolver: &ResolverIdentity,
    ) -> Result<Venue, DecisionError> {
        if resolver.party() == action.proposed_by {
            return Err(ResolutionError::NotAuthorized.into());
        }

        let venue = self
            .venues
            .find_by_id(&action.venue_id)
            .await?
            .ok_or(DecisionError::NotFound)?;

        match resolver {
            ResolverIdentity::Owner(owner_id) => {
                if venue.owner_id != *owner_id {
                    return Err(ResolutionError::NotAuthorized.into());
                }
            }
            ResolverIdentity::Customer(customer_id) => {
                if action.customer_id.as_ref() != Some(customer_id) {
                    return Err(ResolutionError::NotAuthorized.into());
                }
            }
        }
        Ok(venue)
    }

    async fn current_status_conflict(&self, action_id: &ActionId) -> DecisionError {
        let current = match self.actions.find_by_id(action_id).await {
            Ok(Some(action)) => action.status,
            _ => ActionStatus::Expired,
        };
        ResolutionError::NotPending { current }.into()
    }

    async fn complete_conversation(&self, action: &AgentAction) {
        self.transition_conversation(action, ConversationStatus::Completed).await;
    }

    async fn reopen_conversation(&self, action: &AgentAction) {
        self.transition_conversation(action, ConversationStatus::Active).await;
    }

    async fn transition_conversation(&self, action: &AgentAction, next: ConversationStatus) {
        let result = async {
            let conversation = self
                .conversations
                .find_by_id(&action.conversation_id)
                .await?
                .filter(|conversation| conversation.can_transition_to(next));
            if let Some(conversation) = conversation {
                self.conversations
                    .update(
                        &conversation.id,
                        ConversationPatch { status: Some(next), ..ConversationPatch::default() },
                        Utc::now(),
                    )
                    .await?;
            }
            Ok::<(), RepositoryError>(())
        }
        .await;

        if let Err(error) = result {
            warn!(
                event_name = "approval.conversation_update_failed",
                conversation_id = %action.conversation_id.0,
                error = %error,
                "conversation status update failed after action resolution"
            );
        }
    }

    async fn notify_customer(
        &self,
        action: &AgentAction,
        category: &str,
        headline: &str,
        body: &str,
        author_id: &str,
    ) {
        let Some(customer_id) = &action.customer_id else {
            return;
        };
        self.dispatch_notification(Notification {
            recipient_id: customer_id.0.clone(),
            category: category.to_string(),
            headline: headline.to_string(),
            body: body.to_string(),
            reference: action.id.0.clone(),
            author_id: author_id.to_string(),
        })
        .await;
    }

    async fn notify_counterparty(
        &self,
        action: &AgentAction,
        resolver: &ResolverIdentity,
        venue: &Venue,
    ) {
        let recipient = match resolver {
            ResolverIdentity::Owner(_) => action.customer_id.as_ref().map(|c| c.0.clone()),
            ResolverIdentity::Customer(_) => Some(venue.owner_id.0.clone()),
        };
        let Some(recipient_id) = recipient else {
            return;
        };
        self.dispatch_notification(Notification {
            recipient_id,
            category: "counter_offer_accepted".to_string(),
            headline: "Counter-offer accepted".to_string(),
            body: format!("The revised terms for {} were accepted.", venue.name),
            reference: action.id.0.clone(),
            author_id: resolver.id().to_string(),
        })
        .await;
    }

    async fn dispatch_notification(&self, notification: Notification) {
        if let Err(error) = self.notifier.notify(notification).await {
            warn!(
                event_name = "approval.notification_failed",
                error = %error,
                "notification dispatch failed; transition stands"
            );
        }
    }

    fn broadcast_resolution(
        &self,
        action: &AgentAction,
        status: ActionStatus,
        booking_id: Option<&BookingId>,
    ) {
        let event = ActionEvent {
            action_id: action.id.0.clone(),
            status: status.as_db_str().to_string(),
            conversation_id: action.conversation_id.0.clone(),
            booking_id: booking_id.map(|id| id.0.clone()),
        };
        if let Err(error) = self.broadcaster.broadcast(&action.conversation_id, event) {
            let error: CollaboratorError = error;
            warn!(
                event_name = "approval.broadcast_failed",
                error = %error,
                "broadcast failed; transition stands"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;

    use venuely_core::approvals::{ModifyRequest, ResolutionError};
    use venuely_core::domain::action::{
        ActionId, ActionStatus, ActionSummary, ActionType, AgentAction, BookingSummary,
        ProposingParty,
    };
    use venuely_core::domain::booking::{Booking, BookingId, BookingStatus};
    use venuely_core::domain::conversation::{
        CollectedBookingData, Conversation, ConversationId, ConversationStatus, CustomerId,
    };
    use venuely_core::domain::venue::{DurationPricing, OwnerId, Venue, VenueId};
    use venuely_db::repositories::{
        ActionRepository, BookingRepository, ConversationRepository, InMemoryActionRepository,
        InMemoryBookingRepository, InMemoryConversationRepository, InMemoryVenueRepository,
    };

    use super::{DecisionError, DecisionService, ResolverIdentity};
    use crate::collaborators::{BroadcastHub, RepositoryBookingWriter, TracingNotifier};

    fn venue() -> Venue {
        let now = Utc::now();
        Venue {
            id: VenueId("v-1".to_string()),
            owner_id: OwnerId("owner-1".to_string()),
            name: "Harbor Loft".to_string(),
            description: None,
            capacity: 120,
            amenities: Vec::new(),
            parking_info: None,
            duration_pricing: DurationPricing::default(),
            pricing_rules: None,
            faq: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn summary(date: NaiveDate, price: i64) -> BookingSummary {
        BookingSummary {
            event_date: date,
            start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
            guest_count: 80,
            event_type: "company party".to_string(),
            price: Decimal::from(price),
            customer_name: Some("Dana Reyes".to_string()),
            customer_email: Some("dana@example.com".to_string()),
            company_name: Some("Reyes Media".to_string()),
            extras: vec!["projector".to_string()],
            customer_note: None,
        }
    }

    fn pending_action(id: &str, action_type: ActionType, proposed_by: ProposingParty) -> AgentAction {
        let now = Utc::now();
        AgentAction {
            id: ActionId(id.to_string()),
            venue_id: VenueId("v-1".to_string()),
            conversation_id: ConversationId("c-1".to_string()),
            customer_id: Some(CustomerId("cust-1".to_string())),
            action_type,
            status: ActionStatus::Pending,
            proposed_by,
            summary: ActionSummary::Booking(summary(
                NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date"),
                6_000,
            )),
            owner_response: None,
            original_action_id: None,
            booking_id: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct Harness {
        service: DecisionService,
        actions: Arc<InMemoryActionRepository>,
        conversations: Arc<InMemoryConversationRepository>,
        bookings: Arc<InMemoryBookingRepository>,
    }

    async fn harness() -> Harness {
        let venues = Arc::new(InMemoryVenueRepository::with_venues(vec![venue()]));
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let actions = Arc::new(InMemoryActionRepository::default());
        let bookings = Arc::new(InMemoryBookingRepository::default());
        let writer = Arc::new(RepositoryBookingWriter::new(bookings.clone()));

        let now = Utc::now();
        conversations
            .insert(Conversation {
                id: ConversationId("c-1".to_string()),
                venue_id: VenueId("v-1".to_string()),
                customer_id: Some(CustomerId("cust-1".to_string())),
                status: ConversationStatus::Active,
                collected: CollectedBookingData::default(),
                expires_at: now + Duration::days(7),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed conversation");

        let service = DecisionService::new(
            venues,
            conversations.clone(),
            actions.clone(),
            bookings.clone(),
            writer,
            Arc::new(TracingNotifier),
            Arc::new(BroadcastHub::default()),
        );

        Harness { service, actions, conversations, bookings }
    }

    fn owner() -> OwnerId {
        OwnerId("owner-1".to_string())
    }

    #[tokio::test]
    async fn owner_approval_creates_booking_and_completes_conversation() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-1", ActionType::BookingApproval, ProposingParty::Customer))
            .await
            .expect("seed action");

        let outcome = h
            .service
            .approve(&ActionId("act-1".to_string()), &owner(), None)
            .await
            .expect("approve");

        assert_eq!(outcome.status, ActionStatus::Approved);
        let booking_id = outcome.booking_id.expect("booking created");

        let action = h
            .actions
            .find_by_id(&ActionId("act-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(action.status, ActionStatus::Approved);
        assert_eq!(action.booking_id, Some(booking_id.clone()));

        let conversation = h
            .conversations
            .find_by_id(&ConversationId("c-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(conversation.status, ConversationStatus::Completed);

        let booking = h.bookings.find_by_id(&booking_id).await.expect("find").expect("exists");
        assert_eq!(booking.status, BookingStatus::Accepted);
        assert_eq!(booking.customer_email, "dana@example.com");
    }

    #[tokio::test]
    async fn non_owner_cannot_resolve_and_the_action_stays_pending() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-1", ActionType::BookingApproval, ProposingParty::Customer))
            .await
            .expect("seed action");

        let error = h
            .service
            .decline(&ActionId("act-1".to_string()), &OwnerId("intruder".to_string()), None)
            .await
            .expect_err("stranger must be refused");
        assert!(matches!(error, DecisionError::Resolution(ResolutionError::NotAuthorized)));

        let action = h
            .actions
            .find_by_id(&ActionId("act-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(action.status, ActionStatus::Pending);
    }

    #[tokio::test]
    async fn resolutions_are_monotonic_after_approval() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-1", ActionType::BookingApproval, ProposingParty::Customer))
            .await
            .expect("seed action");

        h.service
            .approve(&ActionId("act-1".to_string()), &owner(), None)
            .await
            .expect("first approval");

        let error = h
            .service
            .decline(&ActionId("act-1".to_string()), &owner(), None)
            .await
            .expect_err("second resolution must fail");
        assert!(matches!(
            error,
            DecisionError::Resolution(ResolutionError::NotPending {
                current: ActionStatus::Approved
            })
        ));
    }

    #[tokio::test]
    async fn blocked_date_aborts_approval_and_leaves_the_action_pending() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-1", ActionType::BookingApproval, ProposingParty::Customer))
            .await
            .expect("seed action");
        h.bookings
            .block_date(
                &VenueId("v-1".to_string()),
                NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date"),
                Some("maintenance"),
                Utc::now(),
            )
            .await
            .expect("block date");

        let error = h
            .service
            .approve(&ActionId("act-1".to_string()), &owner(), None)
            .await
            .expect_err("blocked date must abort");
        assert!(matches!(error, DecisionError::BookingCreation(_)));

        let action = h
            .actions
            .find_by_id(&ActionId("act-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(action.status, ActionStatus::Pending, "no partial transition");
        assert_eq!(h.bookings.booking_count(), 0);
    }

    #[tokio::test]
    async fn modify_spawns_exactly_one_counter_offer_with_merged_terms() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-1", ActionType::BookingApproval, ProposingParty::Customer))
            .await
            .expect("seed action");

        let outcome = h
            .service
            .modify(
                &ActionId("act-1".to_string()),
                &owner(),
                ModifyRequest {
                    adjusted_price: Some(Decimal::from(7_000)),
                    owner_note: Some("Peak-season rate applies.".to_string()),
                    ..ModifyRequest::default()
                },
            )
            .await
            .expect("modify");

        assert_eq!(outcome.status, ActionStatus::Modified);
        let counter_id = outcome.counter_offer_id.expect("counter created");

        let original = h
            .actions
            .find_by_id(&ActionId("act-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(original.status, ActionStatus::Modified);

        let counter = h.actions.find_by_id(&counter_id).await.expect("find").expect("exists");
        assert_eq!(counter.action_type, ActionType::CounterOffer);
        assert_eq!(counter.status, ActionStatus::Pending);
        assert_eq!(counter.proposed_by, ProposingParty::Owner);
        assert_eq!(counter.original_action_id, Some(ActionId("act-1".to_string())));

        let merged = counter.summary.as_booking().expect("booking summary");
        assert_eq!(merged.price, Decimal::from(7_000));
        assert_eq!(merged.guest_count, 80, "unset fields carry over");
        assert_eq!(merged.customer_email.as_deref(), Some("dana@example.com"));

        let counters: Vec<_> = h
            .actions
            .all()
            .into_iter()
            .filter(|action| action.action_type == ActionType::CounterOffer)
            .collect();
        assert_eq!(counters.len(), 1, "exactly one counter-offer");

        let conversation = h
            .conversations
            .find_by_id(&ConversationId("c-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(conversation.status, ConversationStatus::Active, "negotiation re-opens");
    }

    #[tokio::test]
    async fn malformed_overrides_are_rejected_before_any_mutation() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-1", ActionType::BookingApproval, ProposingParty::Customer))
            .await
            .expect("seed action");

        let error = h
            .service
            .modify(
                &ActionId("act-1".to_string()),
                &owner(),
                ModifyRequest {
                    adjusted_price: Some(Decimal::ZERO),
                    ..ModifyRequest::default()
                },
            )
            .await
            .expect_err("zero price must be rejected");
        assert!(matches!(
            error,
            DecisionError::Resolution(ResolutionError::InvalidField { field: "price", .. })
        ));

        let action = h
            .actions
            .find_by_id(&ActionId("act-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(h.actions.all().len(), 1, "no counter-offer spawned");
    }

    #[tokio::test]
    async fn customer_accepts_an_owner_counter_offer() {
        let h = harness().await;
        let mut counter = pending_action("act-counter", ActionType::CounterOffer, ProposingParty::Owner);
        counter.original_action_id = Some(ActionId("act-orig".to_string()));
        h.actions.insert(counter).await.expect("seed counter");

        let outcome = h
            .service
            .respond_to_counter_offer(
                &ActionId("act-counter".to_string()),
                &ResolverIdentity::Customer(CustomerId("cust-1".to_string())),
                true,
                None,
            )
            .await
            .expect("accept");

        assert_eq!(outcome.status, ActionStatus::Approved);
        assert!(outcome.booking_id.is_some());

        let conversation = h
            .conversations
            .find_by_id(&ConversationId("c-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(conversation.status, ConversationStatus::Completed);
    }

    #[tokio::test]
    async fn the_proposing_party_cannot_resolve_its_own_counter_offer() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-counter", ActionType::CounterOffer, ProposingParty::Owner))
            .await
            .expect("seed counter");

        let error = h
            .service
            .respond_to_counter_offer(
                &ActionId("act-counter".to_string()),
                &ResolverIdentity::Owner(owner()),
                true,
                None,
            )
            .await
            .expect_err("proposer must not resolve");
        assert!(matches!(error, DecisionError::Resolution(ResolutionError::NotAuthorized)));
    }

    #[tokio::test]
    async fn accepting_a_counter_against_an_accepted_booking_moves_the_calendar() {
        let h = harness().await;
        let venue_id = VenueId("v-1".to_string());
        let old_date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");
        let new_date = NaiveDate::from_ymd_opt(2026, 9, 19).expect("valid date");
        let now = Utc::now();

        h.bookings
            .insert(Booking {
                id: BookingId("b-1".to_string()),
                venue_id: venue_id.clone(),
                event_date: old_date,
                start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
                end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
                event_type: "company party".to_string(),
                guest_count: 80,
                price: Decimal::from(6_000),
                customer_name: "Dana Reyes".to_string(),
                customer_email: "dana@example.com".to_string(),
                company_name: None,
                status: BookingStatus::Accepted,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed booking");
        h.bookings
            .block_date(&venue_id, old_date, Some("booking"), now)
            .await
            .expect("block old date");

        let mut counter =
            pending_action("act-counter", ActionType::CounterOffer, ProposingParty::Owner);
        counter.booking_id = Some(BookingId("b-1".to_string()));
        counter.summary = ActionSummary::Booking(summary(new_date, 6_500));
        h.actions.insert(counter).await.expect("seed counter");

        let outcome = h
            .service
            .respond_to_counter_offer(
                &ActionId("act-counter".to_string()),
                &ResolverIdentity::Customer(CustomerId("cust-1".to_string())),
                true,
                None,
            )
            .await
            .expect("accept");

        assert_eq!(outcome.booking_id, Some(BookingId("b-1".to_string())));

        let booking = h
            .bookings
            .find_by_id(&BookingId("b-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(booking.event_date, new_date);
        assert_eq!(booking.price, Decimal::from(6_500));

        assert!(!h.bookings.is_date_blocked(&venue_id, old_date).await.expect("old freed"));
        assert!(h.bookings.is_date_blocked(&venue_id, new_date).await.expect("new blocked"));
    }

    #[tokio::test]
    async fn moving_to_a_blocked_date_is_refused() {
        let h = harness().await;
        let venue_id = VenueId("v-1".to_string());
        let old_date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");
        let new_date = NaiveDate::from_ymd_opt(2026, 9, 19).expect("valid date");
        let now = Utc::now();

        h.bookings
            .insert(Booking {
                id: BookingId("b-1".to_string()),
                venue_id: venue_id.clone(),
                event_date: old_date,
                start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
                end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
                event_type: "company party".to_string(),
                guest_count: 80,
                price: Decimal::from(6_000),
                customer_name: "Dana Reyes".to_string(),
                customer_email: "dana@example.com".to_string(),
                company_name: None,
                status: BookingStatus::Accepted,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed booking");
        h.bookings
            .block_date(&venue_id, new_date, Some("maintenance"), now)
            .await
            .expect("block target");

        let mut counter =
            pending_action("act-counter", ActionType::CounterOffer, ProposingParty::Owner);
        counter.booking_id = Some(BookingId("b-1".to_string()));
        counter.summary = ActionSummary::Booking(summary(new_date, 6_500));
        h.actions.insert(counter).await.expect("seed counter");

        let error = h
            .service
            .respond_to_counter_offer(
                &ActionId("act-counter".to_string()),
                &ResolverIdentity::Customer(CustomerId("cust-1".to_string())),
                true,
                None,
            )
            .await
            .expect_err("blocked target must refuse");
        assert!(matches!(error, DecisionError::CalendarConflict(_)));

        let action = h
            .actions
            .find_by_id(&ActionId("act-counter".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(action.status, ActionStatus::Pending);
    }

    #[tokio::test]
    async fn declining_a_counter_offer_reopens_the_negotiation() {
        let h = harness().await;
        h.actions
            .insert(pending_action("act-counter", ActionType::CounterOffer, ProposingParty::Owner))
            .await
            .expect("seed counter");

        let outcome = h
            .service
            .respond_to_counter_offer(
                &ActionId("act-counter".to_string()),
                &ResolverIdentity::Customer(CustomerId("cust-1".to_string())),
                false,
                Some("Too expensive for us.".to_string()),
            )
            .await
            .expect("decline");

        assert_eq!(outcome.status, ActionStatus::Declined);
        assert!(outcome.booking_id.is_none());

        let conversation = h
            .conversations
            .find_by_id(&ConversationId("c-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(conversation.status, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn escalations_can_be_declined_but_not_approved() {
        let h = harness().await;
        let mut escalation =
            pending_action("act-esc", ActionType::Escalation, ProposingParty::Customer);
        escalation.summary = ActionSummary::Escalation(
            venuely_core::domain::action::EscalationSummary {
                reason: "pyrotechnics".to_string(),
                customer_request: "indoor fireworks".to_string(),
                context: None,
            },
        );
        h.actions.insert(escalation).await.expect("seed escalation");

        let error = h
            .service
            .approve(&ActionId("act-esc".to_string()), &owner(), None)
            .await
            .expect_err("escalations are not approvable");
        assert!(matches!(
            error,
            DecisionError::Resolution(ResolutionError::WrongActionType { .. })
        ));

        let outcome = h
            .service
            .decline(&ActionId("act-esc".to_string()), &owner(), Some("No fireworks.".to_string()))
            .await
            .expect("decline escalation");
        assert_eq!(outcome.status, ActionStatus::Declined);
    }
}
