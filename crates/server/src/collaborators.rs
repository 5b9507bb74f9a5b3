//! Collaborator seams the approval workflow drives: booking creation,
//! customer notification, and the per-conversation real-time channel.
//! Notification and broadcast are best-effort; callers log failures and
//! never roll back a state transition over them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use venuely_core::domain::action::BookingSummary;
use venuely_core::domain::booking::{Booking, BookingId};
use venuely_core::domain::conversation::ConversationId;
use venuely_core::domain::venue::VenueId;
use venuely_db::repositories::BookingRepository;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("booking creation failed: {0}")]
    Booking(String),
    #[error("notification dispatch failed: {0}")]
    Notification(String),
    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

#[async_trait]
pub trait BookingWriter: Send + Sync {
    /// Turn an approved summary into a real booking and block its calendar
    /// date. Safe to call exactly once per approval.
    async fn create_booking(
        &self,
        venue_id: &VenueId,
        summary: &BookingSummary,
    ) -> Result<BookingId, CollaboratorError>;

    /// Compensation: withdraw a booking whose approval lost the
    /// action-status race.
    async fn discard_booking(
        &self,
        venue_id: &VenueId,
        id: &BookingId,
    ) -> Result<(), CollaboratorError>;
}

/// Booking writer backed by the marketplace's own store.
pub struct RepositoryBookingWriter {
    bookings: Arc<dyn BookingRepository>,
}

impl RepositoryBookingWriter {
    pub fn new(bookings: Arc<dyn BookingRepository>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl BookingWriter for RepositoryBookingWriter {
    async fn create_booking(
        &self,
        venue_id: &VenueId,
        summary: &BookingSummary,
    ) -> Result<BookingId, CollaboratorError> {
        let date = summary.event_date;

        let blocked = self
            .bookings
            .is_date_blocked(venue_id, date)
            .await
            .map_err(|e| CollaboratorError::Booking(e.to_string()))?;
        if blocked {
            return Err(CollaboratorError::Booking(format!("{date} is no longer available")));
        }

        let competing = self
            .bookings
            .list_accepted_on_date(venue_id, date)
            .await
            .map_err(|e| CollaboratorError::Booking(e.to_string()))?;
        let overlap = competing.iter().any(|existing| {
            existing.start_time < summary.end_time && summary.start_time < existing.end_time
        });
        if overlap {
            return Err(CollaboratorError::Booking(format!(
                "{date} already has an accepted booking in that time range"
            )));
        }

        let now = Utc::now();
        let booking = Booking::from_summary(
            BookingId(Uuid::new_v4().to_string()),
            venue_id.clone(),
            summary,
            now,
        )
        .map_err(|e| CollaboratorError::Booking(e.to_string()))?;
        let booking_id = booking.id.clone();

        self.bookings
            .insert(booking)
            .await
            .map_err(|e| CollaboratorError::Booking(e.to_string()))?;
        self.bookings
            .block_date(venue_id, date, Some("booking"), now)
            .await
            .map_err(|e| CollaboratorError::Booking(e.to_string()))?;

        Ok(booking_id)
    }

    async fn discard_booking(
        &self,
        venue_id: &VenueId,
        id: &BookingId,
    ) -> Result<(), CollaboratorError> {
        let booking = self
            .bookings
            .find_by_id(id)
            .await
            .map_err(|e| CollaboratorError::Booking(e.to_string()))?;

        let now = Utc::now();
        self.bookings
            .cancel(id, now)
            .await
            .map_err(|e| CollaboratorError::Booking(e.to_string()))?;
        if let Some(booking) = booking {
            self.bookings
                .unblock_date(venue_id, booking.event_date)
                .await
                .map_err(|e| CollaboratorError::Booking(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub recipient_id: String,
    pub category: String,
    pub headline: String,
    pub body: String,
    pub reference: String,
    pub author_id: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), CollaboratorError>;
}

/// Ships structured notification events into the log stream; a delivery
/// transport (email, push) subscribes there.
#[derive(Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), CollaboratorError> {
        info!(
            event_name = "notification.dispatched",
            recipient_id = %notification.recipient_id,
            category = %notification.category,
            reference = %notification.reference,
            headline = %notification.headline,
            "notification dispatched"
        );
        Ok(())
    }
}

/// State-change event published on a conversation's channel whenever an
/// action is resolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionEvent {
    pub action_id: String,
    pub status: String,
    pub conversation_id: String,
    pub booking_id: Option<String>,
}

pub trait Broadcaster: Send + Sync {
    fn broadcast(
        &self,
        conversation_id: &ConversationId,
        event: ActionEvent,
    ) -> Result<(), CollaboratorError>;
}

const CHANNEL_CAPACITY: usize = 32;

/// In-process channel registry keyed `agent:{conversation_id}`. Transports
/// (WebSocket fan-out, UI pollers) subscribe per conversation.
#[derive(Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ActionEvent>>>,
}

impl BroadcastHub {
    fn channel_name(conversation_id: &ConversationId) -> String {
        format!("agent:{}", conversation_id.0)
    }

    pub fn subscribe(&self, conversation_id: &ConversationId) -> broadcast::Receiver<ActionEvent> {
        let mut channels = self.channels.lock().expect("channel lock");
        channels
            .entry(Self::channel_name(conversation_id))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

impl Broadcaster for BroadcastHub {
    fn broadcast(
        &self,
        conversation_id: &ConversationId,
        event: ActionEvent,
    ) -> Result<(), CollaboratorError> {
        let channels = self.channels.lock().expect("channel lock");
        if let Some(sender) = channels.get(&Self::channel_name(conversation_id)) {
            // A send only fails when no subscriber is listening, which is
            // not an error for a live-update channel.
            let _ = sender.send(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;

    use venuely_core::domain::action::BookingSummary;
    use venuely_core::domain::booking::BookingStatus;
    use venuely_core::domain::conversation::ConversationId;
    use venuely_core::domain::venue::VenueId;
    use venuely_db::repositories::{BookingRepository, InMemoryBookingRepository};

    use super::{ActionEvent, BookingWriter, Broadcaster, BroadcastHub, RepositoryBookingWriter};

    fn summary(date: NaiveDate) -> BookingSummary {
        BookingSummary {
            event_date: date,
            start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
            guest_count: 60,
            event_type: "reception".to_string(),
            price: Decimal::from(5_000),
            customer_name: Some("Dana Reyes".to_string()),
            customer_email: Some("dana@example.com".to_string()),
            company_name: None,
            extras: Vec::new(),
            customer_note: None,
        }
    }

    #[tokio::test]
    async fn creating_a_booking_blocks_its_date() {
        let bookings = Arc::new(InMemoryBookingRepository::default());
        let writer = RepositoryBookingWriter::new(bookings.clone());
        let venue = VenueId("v-1".to_string());
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        let booking_id = writer.create_booking(&venue, &summary(date)).await.expect("create");

        assert!(bookings.is_date_blocked(&venue, date).await.expect("blocked"));
        let stored = bookings.find_by_id(&booking_id).await.expect("find").expect("exists");
        assert_eq!(stored.status, BookingStatus::Accepted);
    }

    #[tokio::test]
    async fn blocked_dates_refuse_new_bookings() {
        let bookings = Arc::new(InMemoryBookingRepository::default());
        let writer = RepositoryBookingWriter::new(bookings.clone());
        let venue = VenueId("v-1".to_string());
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        bookings.block_date(&venue, date, Some("maintenance"), Utc::now()).await.expect("block");

        let error = writer
            .create_booking(&venue, &summary(date))
            .await
            .expect_err("blocked date must refuse");
        assert!(error.to_string().contains("no longer available"));
    }

    #[tokio::test]
    async fn discarding_a_booking_cancels_and_unblocks() {
        let bookings = Arc::new(InMemoryBookingRepository::default());
        let writer = RepositoryBookingWriter::new(bookings.clone());
        let venue = VenueId("v-1".to_string());
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        let booking_id = writer.create_booking(&venue, &summary(date)).await.expect("create");
        writer.discard_booking(&venue, &booking_id).await.expect("discard");

        assert!(!bookings.is_date_blocked(&venue, date).await.expect("unblocked"));
        let stored = bookings.find_by_id(&booking_id).await.expect("find").expect("exists");
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn hub_delivers_events_to_conversation_subscribers() {
        let hub = BroadcastHub::default();
        let conversation = ConversationId("c-1".to_string());
        let mut receiver = hub.subscribe(&conversation);

        hub.broadcast(
            &conversation,
            ActionEvent {
                action_id: "act-1".to_string(),
                status: "approved".to_string(),
                conversation_id: "c-1".to_string(),
                booking_id: Some("b-1".to_string()),
            },
        )
        .expect("broadcast");

        let event = receiver.try_recv().expect("event delivered");
        assert_eq!(event.status, "approved");

        // Broadcasting to a conversation nobody watches is not an error.
        hub.broadcast(
            &ConversationId("c-quiet".to_string()),
            ActionEvent {
                action_id: "act-2".to_string(),
                status: "declined".to_string(),
                conversation_id: "c-quiet".to_string(),
                booking_id: None,
            },
        )
        .expect("broadcast without subscribers");
    }
}
