//! The closed set of capabilities the model may invoke. Each tool is one
//! variant of [`ToolCall`] with a strict argument struct; dispatch in the
//! executor is exhaustive, so adding a tool is a compile-time checklist.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use venuely_core::domain::conversation::CollectedBookingData;

use crate::llm::ToolDefinition;

pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const CALCULATE_PRICE: &str = "calculate_price";
pub const GET_VENUE_INFO: &str = "get_venue_info";
pub const PROPOSE_BOOKING: &str = "propose_booking";
pub const ESCALATE_TO_OWNER: &str = "escalate_to_owner";
pub const SEARCH_OTHER_VENUES: &str = "search_other_venues";

pub const ALL_TOOL_NAMES: &[&str] = &[
    CHECK_AVAILABILITY,
    CALCULATE_PRICE,
    GET_VENUE_INFO,
    PROPOSE_BOOKING,
    ESCALATE_TO_OWNER,
    SEARCH_OTHER_VENUES,
];

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ToolParseError {
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: &'static str, message: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CheckAvailabilityArgs {
    pub date: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CalculatePriceArgs {
    pub guest_count: u32,
    pub duration_hours: Decimal,
    pub event_type: String,
    #[serde(default)]
    pub package_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GetVenueInfoArgs {
    pub topic: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProposeBookingArgs {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub guest_count: u32,
    pub event_type: String,
    pub price: Decimal,
    #[serde(default)]
    pub extras: Vec<String>,
    #[serde(default)]
    pub customer_note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct EscalateToOwnerArgs {
    pub reason: String,
    pub customer_request: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct VenueRequirements {
    #[serde(default)]
    pub min_capacity: Option<u32>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SearchOtherVenuesArgs {
    pub requirements: VenueRequirements,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolCall {
    CheckAvailability(CheckAvailabilityArgs),
    CalculatePrice(CalculatePriceArgs),
    GetVenueInfo(GetVenueInfoArgs),
    ProposeBooking(ProposeBookingArgs),
    EscalateToOwner(EscalateToOwnerArgs),
    SearchOtherVenues(SearchOtherVenuesArgs),
}

impl ToolCall {
    pub fn parse(name: &str, input: Value) -> Result<Self, ToolParseError> {
        fn args<T: serde::de::DeserializeOwned>(
            tool: &'static str,
            input: Value,
        ) -> Result<T, ToolParseError> {
            serde_json::from_value(input)
                .map_err(|e| ToolParseError::InvalidArguments { tool, message: e.to_string() })
        }

        match name {
            CHECK_AVAILABILITY => Ok(Self::CheckAvailability(args(CHECK_AVAILABILITY, input)?)),
            CALCULATE_PRICE => Ok(Self::CalculatePrice(args(CALCULATE_PRICE, input)?)),
            GET_VENUE_INFO => Ok(Self::GetVenueInfo(args(GET_VENUE_INFO, input)?)),
            PROPOSE_BOOKING => Ok(Self::ProposeBooking(args(PROPOSE_BOOKING, input)?)),
            ESCALATE_TO_OWNER => Ok(Self::EscalateToOwner(args(ESCALATE_TO_OWNER, input)?)),
            SEARCH_OTHER_VENUES => Ok(Self::SearchOtherVenues(args(SEARCH_OTHER_VENUES, input)?)),
            other => Err(ToolParseError::UnknownTool { name: other.to_string() }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckAvailability(_) => CHECK_AVAILABILITY,
            Self::CalculatePrice(_) => CALCULATE_PRICE,
            Self::GetVenueInfo(_) => GET_VENUE_INFO,
            Self::ProposeBooking(_) => PROPOSE_BOOKING,
            Self::EscalateToOwner(_) => ESCALATE_TO_OWNER,
            Self::SearchOtherVenues(_) => SEARCH_OTHER_VENUES,
        }
    }

    /// Booking slots this call reveals, merged monotonically into the
    /// conversation's collected data.
    pub fn collected_update(&self) -> CollectedBookingData {
        match self {
            Self::CheckAvailability(args) => CollectedBookingData {
                event_date: Some(args.date.clone()),
                start_time: args.start_time.clone(),
                end_time: args.end_time.clone(),
                ..CollectedBookingData::default()
            },
            Self::CalculatePrice(args) => CollectedBookingData {
                guest_count: Some(args.guest_count),
                event_type: Some(args.event_type.clone()),
                package_name: args.package_name.clone(),
                ..CollectedBookingData::default()
            },
            Self::ProposeBooking(args) => CollectedBookingData {
                event_date: Some(args.date.clone()),
                start_time: Some(args.start_time.clone()),
                end_time: Some(args.end_time.clone()),
                guest_count: Some(args.guest_count),
                event_type: Some(args.event_type.clone()),
                notes: args.customer_note.clone(),
                ..CollectedBookingData::default()
            },
            Self::GetVenueInfo(_) | Self::EscalateToOwner(_) | Self::SearchOtherVenues(_) => {
                CollectedBookingData::default()
            }
        }
    }
}

/// Declarations handed to the model each round.
pub fn tool_declarations() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: CHECK_AVAILABILITY.to_string(),
            description: "Check whether the venue is free on a date, optionally within a time range. Read-only.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "Event date, YYYY-MM-DD"},
                    "start_time": {"type": "string", "description": "Optional start time, HH:MM"},
                    "end_time": {"type": "string", "description": "Optional end time, HH:MM"}
                },
                "required": ["date"]
            }),
        },
        ToolDefinition {
            name: CALCULATE_PRICE.to_string(),
            description: "Compute the exact price for the event from the owner's pricing configuration. Always use this instead of estimating.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "guest_count": {"type": "integer", "minimum": 1},
                    "duration_hours": {"type": "number", "exclusiveMinimum": 0},
                    "event_type": {"type": "string"},
                    "package_name": {"type": "string", "description": "Optional named package the customer asked for"}
                },
                "required": ["guest_count", "duration_hours", "event_type"]
            }),
        },
        ToolDefinition {
            name: GET_VENUE_INFO.to_string(),
            description: "Look up venue details (parking, capacity, pricing, amenities, house rules) by topic.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string", "description": "What the customer asked about"}
                },
                "required": ["topic"]
            }),
        },
        ToolDefinition {
            name: PROPOSE_BOOKING.to_string(),
            description: "Submit a booking proposal for the owner's approval. Only call after the customer has confirmed date, time, guest count and price.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "Event date, YYYY-MM-DD"},
                    "start_time": {"type": "string", "description": "Start time, HH:MM"},
                    "end_time": {"type": "string", "description": "End time, HH:MM"},
                    "guest_count": {"type": "integer", "minimum": 1},
                    "event_type": {"type": "string"},
                    "price": {"type": "number", "description": "Agreed price from calculate_price"},
                    "extras": {"type": "array", "items": {"type": "string"}},
                    "customer_note": {"type": "string"}
                },
                "required": ["date", "start_time", "end_time", "guest_count", "event_type", "price"]
            }),
        },
        ToolDefinition {
            name: ESCALATE_TO_OWNER.to_string(),
            description: "Hand a question or special request to the venue owner when you cannot resolve it yourself.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reason": {"type": "string"},
                    "customer_request": {"type": "string"},
                    "context": {"type": "string"}
                },
                "required": ["reason", "customer_request"]
            }),
        },
        ToolDefinition {
            name: SEARCH_OTHER_VENUES.to_string(),
            description: "Find alternative venues on the marketplace when this venue cannot host the event. Read-only.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "requirements": {
                        "type": "object",
                        "properties": {
                            "min_capacity": {"type": "integer"},
                            "date": {"type": "string", "description": "Desired date, YYYY-MM-DD"},
                            "event_type": {"type": "string"}
                        }
                    }
                },
                "required": ["requirements"]
            }),
        },
    ]
}
