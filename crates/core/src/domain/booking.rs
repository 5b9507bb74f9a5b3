use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::action::BookingSummary;
use crate::domain::venue::VenueId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Accepted,
    Cancelled,
}

impl BookingStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accepted" => Some(Self::Accepted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub venue_id: VenueId,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub event_type: String,
    pub guest_count: u32,
    pub price: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub company_name: Option<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Build the real booking an approved proposal turns into. Contact
    /// details must have been collected by then.
    pub fn from_summary(
        id: BookingId,
        venue_id: VenueId,
        summary: &BookingSummary,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let customer_name = summary
            .customer_name
            .clone()
            .ok_or_else(|| DomainError::InvariantViolation("booking requires a customer name".to_string()))?;
        let customer_email = summary
            .customer_email
            .clone()
            .ok_or_else(|| DomainError::InvariantViolation("booking requires a customer email".to_string()))?;

        Ok(Self {
            id,
            venue_id,
            event_date: summary.event_date,
            start_time: summary.start_time,
            end_time: summary.end_time,
            event_type: summary.event_type.clone(),
            guest_count: summary.guest_count,
            price: summary.price,
            customer_name,
            customer_email,
            company_name: summary.company_name.clone(),
            status: BookingStatus::Accepted,
            created_at: now,
            updated_at: now,
        })
    }
}
