//! Executes parsed tool calls against the venue's data. Execution is
//! side-effect-isolated: a failing call produces an error payload for the
//! model instead of aborting the turn, and never touches state written by
//! earlier calls.

use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use venuely_core::approvals::{parse_event_date, parse_event_time};
use venuely_core::domain::action::{
    ActionId, ActionStatus, ActionSummary, ActionType, AgentAction, BookingSummary,
    EscalationSummary, ProposingParty,
};
use venuely_core::domain::conversation::Conversation;
use venuely_core::domain::venue::Venue;
use venuely_core::pricing::{calculate_price, PriceRequest};
use venuely_db::repositories::{ActionRepository, BookingRepository, VenueRepository};

use crate::tools::{
    CalculatePriceArgs, CheckAvailabilityArgs, EscalateToOwnerArgs, GetVenueInfoArgs,
    ProposeBookingArgs, SearchOtherVenuesArgs, ToolCall,
};

const SEARCH_RESULT_LIMIT: u32 = 5;

/// Everything a tool may read about the turn it runs in.
pub struct ToolContext {
    pub venue: Venue,
    pub conversation: Conversation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutcome {
    pub payload: Value,
    pub created_action: Option<ActionId>,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(payload: Value) -> Self {
        Self { payload, created_action: None, is_error: false }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            payload: json!({ "error": message.into() }),
            created_action: None,
            is_error: true,
        }
    }
}

pub struct ToolExecutor {
    venues: Arc<dyn VenueRepository>,
    bookings: Arc<dyn BookingRepository>,
    actions: Arc<dyn ActionRepository>,
}

impl ToolExecutor {
    pub fn new(
        venues: Arc<dyn VenueRepository>,
        bookings: Arc<dyn BookingRepository>,
        actions: Arc<dyn ActionRepository>,
    ) -> Self {
        Self { venues, bookings, actions }
    }

    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutcome {
        match call {
            ToolCall::CheckAvailability(args) => self.check_availability(ctx, args).await,
            ToolCall::CalculatePrice(args) => self.calculate_price(ctx, args),
            ToolCall::GetVenueInfo(args) => self.get_venue_info(ctx, args),
            ToolCall::ProposeBooking(args) => self.propose_booking(ctx, args).await,
            ToolCall::EscalateToOwner(args) => self.escalate_to_owner(ctx, args).await,
            ToolCall::SearchOtherVenues(args) => self.search_other_venues(ctx, args).await,
        }
    }

    async fn check_availability(
        &self,
        ctx: &ToolContext,
        args: &CheckAvailabilityArgs,
    ) -> ToolOutcome {
        let date = match parse_event_date(&args.date) {
            Ok(date) => date,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };
        let window = match parse_optional_window(args.start_time.as_deref(), args.end_time.as_deref())
        {
            Ok(window) => window,
            Err(message) => return ToolOutcome::error(message),
        };

        let blocked = match self.bookings.is_date_blocked(&ctx.venue.id, date).await {
            Ok(blocked) => blocked,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };

        let booked = match self.bookings.list_accepted_on_date(&ctx.venue.id, date).await {
            Ok(booked) => booked,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };

        let conflicts: Vec<Value> = booked
            .iter()
            .filter(|booking| match window {
                Some((start, end)) => booking.start_time < end && start < booking.end_time,
                None => true,
            })
            .map(|booking| {
                json!({
                    "booking_id": booking.id.0,
                    "start_time": booking.start_time.format("%H:%M").to_string(),
                    "end_time": booking.end_time.format("%H:%M").to_string(),
                })
            })
            .collect();

        ToolOutcome::ok(json!({
            "available": !blocked && conflicts.is_empty(),
            "date_blocked": blocked,
            "conflicts": conflicts,
        }))
    }

    fn calculate_price(&self, ctx: &ToolContext, args: &CalculatePriceArgs) -> ToolOutcome {
        if args.guest_count == 0 {
            return ToolOutcome::error("guest_count must be positive");
        }
        if args.duration_hours <= Decimal::ZERO {
            return ToolOutcome::error("duration_hours must be positive");
        }

        let breakdown = calculate_price(
            &PriceRequest {
                guest_count: args.guest_count,
                duration_hours: args.duration_hours,
                event_type: Some(args.event_type.clone()),
                package_name: args.package_name.clone(),
            },
            ctx.venue.pricing_rules.as_ref(),
            &ctx.venue.duration_pricing,
        );

        ToolOutcome::ok(json!({
            "base_price": breakdown.base_price,
            "per_person_cost": breakdown.per_person_cost,
            "package_cost": breakdown.package_cost,
            "platform_fee": breakdown.platform_fee,
            "total_price": breakdown.total_price,
        }))
    }

    fn get_venue_info(&self, ctx: &ToolContext, args: &GetVenueInfoArgs) -> ToolOutcome {
        let venue = &ctx.venue;

        if let Some(entry) = venue.find_faq(&args.topic) {
            return ToolOutcome::ok(json!({
                "found": true,
                "source": "faq",
                "answer": entry.answer,
            }));
        }

        let topic = args.topic.to_ascii_lowercase();
        if topic.contains("parking") {
            let answer = venue
                .parking_info
                .clone()
                .unwrap_or_else(|| "Parking details are not listed for this venue.".to_string());
            return ToolOutcome::ok(json!({"found": true, "source": "venue", "answer": answer}));
        }
        if topic.contains("capacity") || topic.contains("guest") || topic.contains("people") {
            return ToolOutcome::ok(json!({
                "found": true,
                "source": "venue",
                "answer": format!("{} hosts up to {} guests.", venue.name, venue.capacity),
            }));
        }
        if topic.contains("price") || topic.contains("cost") || topic.contains("rate") {
            return ToolOutcome::ok(json!({
                "found": true,
                "source": "venue",
                "answer": describe_pricing(venue),
            }));
        }

        // Unknown topics never fail; the agent relays the question instead.
        ToolOutcome::ok(json!({
            "found": false,
            "answer": "I don't have that on file. I can ask the owner and get back to you.",
        }))
    }

    async fn propose_booking(&self, ctx: &ToolContext, args: &ProposeBookingArgs) -> ToolOutcome {
        let event_date = match parse_event_date(&args.date) {
            Ok(date) => date,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };
        let start_time = match parse_event_time("start time", &args.start_time) {
            Ok(time) => time,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };
        let end_time = match parse_event_time("end time", &args.end_time) {
            Ok(time) => time,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };
        if end_time <= start_time {
            return ToolOutcome::error("end time must be after start time");
        }
        if args.guest_count == 0 {
            return ToolOutcome::error("guest_count must be positive");
        }
        if args.price <= Decimal::ZERO {
            return ToolOutcome::error("price must be positive");
        }

        let collected = &ctx.conversation.collected;
        let summary = BookingSummary {
            event_date,
            start_time,
            end_time,
            guest_count: args.guest_count,
            event_type: args.event_type.clone(),
            price: args.price,
            customer_name: collected.customer_name.clone(),
            customer_email: collected.customer_email.clone(),
            company_name: collected.company_name.clone(),
            extras: args.extras.clone(),
            customer_note: args.customer_note.clone(),
        };

        let action = self.new_action(ctx, ActionType::BookingApproval, ActionSummary::Booking(summary));
        let action_id = action.id.clone();

        if let Err(error) = self.actions.insert(action).await {
            return ToolOutcome::error(error.to_string());
        }

        ToolOutcome {
            payload: json!({
                "action_id": action_id.0,
                "status": "pending",
                "message": "Proposal sent to the venue owner for approval.",
            }),
            created_action: Some(action_id),
            is_error: false,
        }
    }

    async fn escalate_to_owner(&self, ctx: &ToolContext, args: &EscalateToOwnerArgs) -> ToolOutcome {
        let summary = ActionSummary::Escalation(EscalationSummary {
            reason: args.reason.clone(),
            customer_request: args.customer_request.clone(),
            context: args.context.clone(),
        });

        let action = self.new_action(ctx, ActionType::Escalation, summary);
        let action_id = action.id.clone();

        if let Err(error) = self.actions.insert(action).await {
            return ToolOutcome::error(error.to_string());
        }

        ToolOutcome {
            payload: json!({
                "action_id": action_id.0,
                "status": "pending",
                "message": "The owner has been asked and will follow up.",
            }),
            created_action: Some(action_id),
            is_error: false,
        }
    }

    async fn search_other_venues(
        &self,
        ctx: &ToolContext,
        args: &SearchOtherVenuesArgs,
    ) -> ToolOutcome {
        let candidates = match self
            .venues
            .search(args.requirements.min_capacity, Some(&ctx.venue.id), SEARCH_RESULT_LIMIT)
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => return ToolOutcome::error(error.to_string()),
        };

        let wanted_date = match args.requirements.date.as_deref() {
            Some(raw) => match parse_event_date(raw) {
                Ok(date) => Some(date),
                Err(error) => return ToolOutcome::error(error.to_string()),
            },
            None => None,
        };

        let mut results = Vec::new();
        for candidate in candidates {
            if let Some(date) = wanted_date {
                match self.bookings.is_date_blocked(&candidate.id, date).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(error) => return ToolOutcome::error(error.to_string()),
                }
            }
            results.push(json!({
                "venue_id": candidate.id.0,
                "name": candidate.name,
                "capacity": candidate.capacity,
                "description": candidate.description,
            }));
        }

        ToolOutcome::ok(json!({ "venues": results }))
    }

    fn new_action(
        &self,
        ctx: &ToolContext,
        action_type: ActionType,
        summary: ActionSummary,
    ) -> AgentAction {
        let now = Utc::now();
        AgentAction {
            id: ActionId(Uuid::new_v4().to_string()),
            venue_id: ctx.venue.id.clone(),
            conversation_id: ctx.conversation.id.clone(),
            customer_id: ctx.conversation.customer_id.clone(),
            action_type,
            status: ActionStatus::Pending,
            proposed_by: ProposingParty::Customer,
            summary,
            owner_response: None,
            original_action_id: None,
            booking_id: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn parse_optional_window(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(NaiveTime, NaiveTime)>, String> {
    match (start, end) {
        (Some(start), Some(end)) => {
            let start =
                parse_event_time("start time", start).map_err(|error| error.to_string())?;
            let end = parse_event_time("end time", end).map_err(|error| error.to_string())?;
            if end <= start {
                return Err("end time must be after start time".to_string());
            }
            Ok(Some((start, end)))
        }
        (None, None) => Ok(None),
        _ => Err("start_time and end_time must be supplied together".to_string()),
    }
}

fn describe_pricing(venue: &Venue) -> String {
    let pricing = &venue.duration_pricing;
    let mut parts = Vec::new();
    if let Some(hourly) = pricing.price_per_hour {
        parts.push(format!("{hourly} per hour"));
    }
    if let Some(half_day) = pricing.price_half_day {
        parts.push(format!("{half_day} for a half day"));
    }
    if let Some(full_day) = pricing.price_full_day {
        parts.push(format!("{full_day} for a full day"));
    }
    if let Some(evening) = pricing.price_evening {
        parts.push(format!("{evening} for an evening"));
    }
    if let Some(minimum) =
        venue.pricing_rules.as_ref().and_then(|rules| rules.minimum_spend)
    {
        parts.push(format!("minimum spend {minimum}"));
    }

    if parts.is_empty() {
        "Pricing is quoted per event; ask for a quote with your date and guest count.".to_string()
    } else {
        format!("Rates for {}: {}.", venue.name, parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use venuely_core::domain::action::ActionStatus;
    use venuely_core::domain::booking::{Booking, BookingId, BookingStatus};
    use venuely_core::domain::conversation::{
        CollectedBookingData, Conversation, ConversationId, ConversationStatus, CustomerId,
    };
    use venuely_core::domain::venue::{
        DurationPricing, FaqEntry, OwnerId, PricingRules, Venue, VenueId,
    };
    use venuely_db::repositories::{
        BookingRepository, InMemoryActionRepository, InMemoryBookingRepository,
        InMemoryVenueRepository,
    };

    use super::{ToolContext, ToolExecutor};
    use crate::tools::ToolCall;

    fn venue(id: &str, capacity: u32) -> Venue {
        let now = Utc::now();
        Venue {
            id: VenueId(id.to_string()),
            owner_id: OwnerId("owner-1".to_string()),
            name: format!("Venue {id}"),
            description: None,
            capacity,
            amenities: vec!["stage".to_string()],
            parking_info: Some("Garage next door.".to_string()),
            duration_pricing: DurationPricing {
                price_per_hour: Some(Decimal::from(1_000)),
                price_half_day: None,
                price_full_day: Some(Decimal::from(8_000)),
                price_evening: None,
                evening_cutoff_hours: None,
            },
            pricing_rules: Some(PricingRules::default()),
            faq: vec![FaqEntry {
                question: "Is outside catering allowed?".to_string(),
                answer: "Yes, with a licensed caterer.".to_string(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    fn conversation() -> Conversation {
        let now = Utc::now();
        Conversation {
            id: ConversationId("c-1".to_string()),
            venue_id: VenueId("v-1".to_string()),
            customer_id: Some(CustomerId("cust-1".to_string())),
            status: ConversationStatus::Active,
            collected: CollectedBookingData {
                customer_name: Some("Dana Reyes".to_string()),
                customer_email: Some("dana@example.com".to_string()),
                ..CollectedBookingData::default()
            },
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    struct Harness {
        executor: ToolExecutor,
        actions: Arc<InMemoryActionRepository>,
        bookings: Arc<InMemoryBookingRepository>,
        ctx: ToolContext,
    }

    fn harness(extra_venues: Vec<Venue>) -> Harness {
        let mut venues = vec![venue("v-1", 120)];
        venues.extend(extra_venues);
        let venues = Arc::new(InMemoryVenueRepository::with_venues(venues));
        let bookings = Arc::new(InMemoryBookingRepository::default());
        let actions = Arc::new(InMemoryActionRepository::default());

        let executor =
            ToolExecutor::new(venues, bookings.clone(), actions.clone());
        Harness {
            executor,
            actions,
            bookings,
            ctx: ToolContext { venue: venue("v-1", 120), conversation: conversation() },
        }
    }

    fn parse(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall::parse(name, input).expect("valid tool call")
    }

    #[tokio::test]
    async fn availability_reports_blocks_and_conflicts() {
        let h = harness(Vec::new());
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        let free = h
            .executor
            .execute(&h.ctx, &parse("check_availability", json!({"date": "2026-09-12"})))
            .await;
        assert_eq!(free.payload["available"], json!(true));

        h.bookings
            .insert(Booking {
                id: BookingId("b-1".to_string()),
                venue_id: VenueId("v-1".to_string()),
                event_date: date,
                start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
                end_time: NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
                event_type: "reception".to_string(),
                guest_count: 50,
                price: Decimal::from(5_000),
                customer_name: "A".to_string(),
                customer_email: "a@example.com".to_string(),
                company_name: None,
                status: BookingStatus::Accepted,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .expect("seed booking");

        let evening = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "check_availability",
                    json!({"date": "2026-09-12", "start_time": "19:00", "end_time": "23:00"}),
                ),
            )
            .await;
        assert_eq!(evening.payload["available"], json!(false));
        assert_eq!(evening.payload["conflicts"].as_array().expect("conflicts").len(), 1);

        let morning = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "check_availability",
                    json!({"date": "2026-09-12", "start_time": "09:00", "end_time": "12:00"}),
                ),
            )
            .await;
        assert_eq!(morning.payload["available"], json!(true));
    }

    #[tokio::test]
    async fn malformed_date_becomes_an_error_payload_not_a_failure() {
        let h = harness(Vec::new());
        let outcome = h
            .executor
            .execute(&h.ctx, &parse("check_availability", json!({"date": "next friday"})))
            .await;
        assert!(outcome.is_error);
        assert!(outcome.payload["error"].as_str().expect("message").contains("YYYY-MM-DD"));
    }

    #[tokio::test]
    async fn pricing_uses_the_venue_configuration() {
        let h = harness(Vec::new());
        let outcome = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "calculate_price",
                    json!({"guest_count": 50, "duration_hours": 3, "event_type": "party"}),
                ),
            )
            .await;

        assert!(!outcome.is_error);
        assert_eq!(outcome.payload["base_price"], json!("3000"));
        assert_eq!(outcome.payload["total_price"], json!("3360"));
    }

    #[tokio::test]
    async fn venue_info_prefers_faq_then_builtin_topics() {
        let h = harness(Vec::new());

        let faq = h
            .executor
            .execute(&h.ctx, &parse("get_venue_info", json!({"topic": "catering"})))
            .await;
        assert_eq!(faq.payload["source"], json!("faq"));

        let parking = h
            .executor
            .execute(&h.ctx, &parse("get_venue_info", json!({"topic": "where to park"})))
            .await;
        assert_eq!(parking.payload["source"], json!("venue"));
        assert_eq!(parking.payload["answer"], json!("Garage next door."));

        let unknown = h
            .executor
            .execute(&h.ctx, &parse("get_venue_info", json!({"topic": "ghost stories"})))
            .await;
        assert_eq!(unknown.payload["found"], json!(false));
        assert!(!unknown.is_error, "unknown topics never throw");
    }

    #[tokio::test]
    async fn proposal_creates_a_pending_approval_with_collected_contact() {
        let h = harness(Vec::new());
        let outcome = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "propose_booking",
                    json!({
                        "date": "2026-09-12",
                        "start_time": "18:00",
                        "end_time": "23:00",
                        "guest_count": 80,
                        "event_type": "company party",
                        "price": 6000
                    }),
                ),
            )
            .await;

        assert!(!outcome.is_error);
        let action_id = outcome.created_action.expect("action created");
        let actions = h.actions.all();
        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.id, action_id);
        assert_eq!(action.status, ActionStatus::Pending);
        let summary = action.summary.as_booking().expect("booking summary");
        assert_eq!(summary.customer_name.as_deref(), Some("Dana Reyes"));
        assert_eq!(summary.price, Decimal::from(6_000));
    }

    #[tokio::test]
    async fn invalid_proposal_creates_nothing() {
        let h = harness(Vec::new());
        let outcome = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "propose_booking",
                    json!({
                        "date": "2026-09-12",
                        "start_time": "23:00",
                        "end_time": "18:00",
                        "guest_count": 80,
                        "event_type": "company party",
                        "price": 6000
                    }),
                ),
            )
            .await;

        assert!(outcome.is_error);
        assert!(outcome.created_action.is_none());
        assert!(h.actions.all().is_empty());
    }

    #[tokio::test]
    async fn escalation_records_the_request_verbatim() {
        let h = harness(Vec::new());
        let outcome = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "escalate_to_owner",
                    json!({
                        "reason": "pyrotechnics request",
                        "customer_request": "Can we have indoor fireworks?"
                    }),
                ),
            )
            .await;

        assert!(!outcome.is_error);
        assert!(outcome.created_action.is_some());
        let actions = h.actions.all();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0].summary,
            venuely_core::domain::action::ActionSummary::Escalation(ref summary)
                if summary.reason == "pyrotechnics request"
        ));
    }

    #[tokio::test]
    async fn venue_search_excludes_the_current_venue_and_small_rooms() {
        let h = harness(vec![venue("v-big", 300), venue("v-small", 30)]);
        let outcome = h
            .executor
            .execute(
                &h.ctx,
                &parse(
                    "search_other_venues",
                    json!({"requirements": {"min_capacity": 100}}),
                ),
            )
            .await;

        let venues = outcome.payload["venues"].as_array().expect("venues");
        assert_eq!(venues.len(), 1);
        assert_eq!(venues[0]["venue_id"], json!("v-big"));
    }
}
