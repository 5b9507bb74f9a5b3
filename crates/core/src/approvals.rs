//! Resolution rules for agent actions: validation of owner overrides,
//! merging a counter-offer summary, and the guard errors shared by every
//! transition out of `pending`.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action::{ActionStatus, ActionType, BookingSummary};

/// Longest note an owner may attach to a decision.
pub const MAX_NOTE_LEN: usize = 2_000;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ResolutionError {
    #[error("action is not pending (current status: {current})")]
    NotPending { current: ActionStatus },
    #[error("a {actual} action cannot be resolved here (expected {expected})")]
    WrongActionType { expected: ActionType, actual: ActionType },
    #[error("not authorized to resolve this action")]
    NotAuthorized,
    #[error("invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },
}

impl ResolutionError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField { field, message: message.into() }
    }
}

/// Raw override payload from the owner's modify request. All fields are
/// optional; unset fields fall back to the original proposal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub guest_count: Option<u32>,
    pub event_type: Option<String>,
    pub adjusted_price: Option<Decimal>,
    pub owner_note: Option<String>,
}

impl ModifyRequest {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Validated form of [`ModifyRequest`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryOverrides {
    pub event_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub guest_count: Option<u32>,
    pub event_type: Option<String>,
    pub price: Option<Decimal>,
    pub owner_note: Option<String>,
}

pub fn parse_event_date(raw: &str) -> Result<NaiveDate, ResolutionError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ResolutionError::invalid("date", format!("`{raw}` is not a YYYY-MM-DD date")))
}

pub fn parse_event_time(field: &'static str, raw: &str) -> Result<NaiveTime, ResolutionError> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ResolutionError::invalid(field, format!("`{raw}` is not an HH:MM time")))
}

/// Reject malformed overrides before any state is touched.
pub fn validate_overrides(request: &ModifyRequest) -> Result<SummaryOverrides, ResolutionError> {
    let event_date = request.event_date.as_deref().map(parse_event_date).transpose()?;
    let start_time =
        request.start_time.as_deref().map(|raw| parse_event_time("start time", raw)).transpose()?;
    let end_time =
        request.end_time.as_deref().map(|raw| parse_event_time("end time", raw)).transpose()?;

    if let Some(price) = request.adjusted_price {
        if price <= Decimal::ZERO {
            return Err(ResolutionError::invalid("price", "adjusted price must be positive"));
        }
    }

    if let Some(guest_count) = request.guest_count {
        if guest_count == 0 {
            return Err(ResolutionError::invalid("guest count", "guest count must be positive"));
        }
    }

    if let Some(note) = request.owner_note.as_deref() {
        if note.chars().count() > MAX_NOTE_LEN {
            return Err(ResolutionError::invalid(
                "note",
                format!("note exceeds {MAX_NOTE_LEN} characters"),
            ));
        }
    }

    Ok(SummaryOverrides {
        event_date,
        start_time,
        end_time,
        guest_count: request.guest_count,
        event_type: request.event_type.clone(),
        price: request.adjusted_price,
        owner_note: request.owner_note.clone(),
    })
}

/// The counter-offer summary is the original overlaid with only the
/// supplied overrides; unset fields carry the original values forward.
pub fn merge_counter_offer(
    original: &BookingSummary,
    overrides: &SummaryOverrides,
) -> BookingSummary {
    BookingSummary {
        event_date: overrides.event_date.unwrap_or(original.event_date),
        start_time: overrides.start_time.unwrap_or(original.start_time),
        end_time: overrides.end_time.unwrap_or(original.end_time),
        guest_count: overrides.guest_count.unwrap_or(original.guest_count),
        event_type: overrides.event_type.clone().unwrap_or_else(|| original.event_type.clone()),
        price: overrides.price.unwrap_or(original.price),
        customer_name: original.customer_name.clone(),
        customer_email: original.customer_email.clone(),
        company_name: original.company_name.clone(),
        extras: original.extras.clone(),
        customer_note: original.customer_note.clone(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use super::{
        merge_counter_offer, parse_event_time, validate_overrides, ModifyRequest, ResolutionError,
        MAX_NOTE_LEN,
    };
    use crate::domain::action::BookingSummary;

    fn original() -> BookingSummary {
        BookingSummary {
            event_date: NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date"),
            start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
            guest_count: 80,
            event_type: "company party".to_string(),
            price: Decimal::from(6_000),
            customer_name: Some("Dana Reyes".to_string()),
            customer_email: Some("dana@example.com".to_string()),
            company_name: Some("Reyes Media".to_string()),
            extras: vec!["projector".to_string()],
            customer_note: Some("prefer the loft side".to_string()),
        }
    }

    #[test]
    fn price_only_override_keeps_everything_else() {
        let overrides = validate_overrides(&ModifyRequest {
            adjusted_price: Some(Decimal::from(7_000)),
            ..ModifyRequest::default()
        })
        .expect("price override is valid");

        let merged = merge_counter_offer(&original(), &overrides);
        assert_eq!(merged.price, Decimal::from(7_000));
        assert_eq!(merged.guest_count, 80);
        assert_eq!(merged.event_date, original().event_date);
        assert_eq!(merged.customer_email, original().customer_email);
        assert_eq!(merged.extras, original().extras);
    }

    #[test]
    fn date_and_time_overrides_are_parsed() {
        let overrides = validate_overrides(&ModifyRequest {
            event_date: Some("2026-09-19".to_string()),
            start_time: Some("19:30".to_string()),
            end_time: Some("23:30:00".to_string()),
            ..ModifyRequest::default()
        })
        .expect("well-formed date/time overrides");

        let merged = merge_counter_offer(&original(), &overrides);
        assert_eq!(merged.event_date, NaiveDate::from_ymd_opt(2026, 9, 19).expect("valid date"));
        assert_eq!(merged.start_time, NaiveTime::from_hms_opt(19, 30, 0).expect("valid time"));
        assert_eq!(merged.end_time, NaiveTime::from_hms_opt(23, 30, 0).expect("valid time"));
    }

    #[test]
    fn malformed_date_is_rejected_before_any_mutation() {
        let error = validate_overrides(&ModifyRequest {
            event_date: Some("12/09/2026".to_string()),
            ..ModifyRequest::default()
        })
        .expect_err("slash dates are rejected");
        assert!(matches!(error, ResolutionError::InvalidField { field: "date", .. }));
    }

    #[test]
    fn non_positive_price_is_rejected() {
        for price in [Decimal::ZERO, Decimal::from(-100)] {
            let error = validate_overrides(&ModifyRequest {
                adjusted_price: Some(price),
                ..ModifyRequest::default()
            })
            .expect_err("non-positive price is rejected");
            assert!(matches!(error, ResolutionError::InvalidField { field: "price", .. }));
        }
    }

    #[test]
    fn oversized_note_is_rejected() {
        let error = validate_overrides(&ModifyRequest {
            owner_note: Some("x".repeat(MAX_NOTE_LEN + 1)),
            ..ModifyRequest::default()
        })
        .expect_err("note over the limit is rejected");
        assert!(matches!(error, ResolutionError::InvalidField { field: "note", .. }));

        validate_overrides(&ModifyRequest {
            owner_note: Some("x".repeat(MAX_NOTE_LEN)),
            ..ModifyRequest::default()
        })
        .expect("note at the limit is accepted");
    }

    #[test]
    fn times_accept_minutes_and_seconds_formats() {
        assert!(parse_event_time("start time", "09:15").is_ok());
        assert!(parse_event_time("start time", "09:15:30").is_ok());
        assert!(parse_event_time("start time", "9pm").is_err());
    }
}
