use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::venue::VenueId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

pub const CONVERSATION_TTL_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Completed,
    Expired,
}

impl ConversationStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Customer,
    Agent,
    Tool,
}

impl TurnRole {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
            Self::Tool => "tool",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "customer" => Some(Self::Customer),
            "agent" => Some(Self::Agent),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }
}

/// A tool invocation requested by the agent within a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// The outcome of one tool invocation, recorded on the following tool turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub name: String,
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub tool_results: Vec<ToolResultRecord>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn customer(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::Customer,
            text: text.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            created_at: at,
        }
    }

    pub fn agent(text: impl Into<String>, tool_calls: Vec<ToolCallRecord>, at: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.into(),
            tool_calls,
            tool_results: Vec::new(),
            created_at: at,
        }
    }

    pub fn tool(tool_results: Vec<ToolResultRecord>, at: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::Tool,
            text: String::new(),
            tool_calls: Vec::new(),
            tool_results,
            created_at: at,
        }
    }
}

/// Booking slots gathered over the course of a negotiation. The record is
/// partial and only ever enriched: a present value is never replaced by an
/// absent one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedBookingData {
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub guest_count: Option<u32>,
    pub event_type: Option<String>,
    pub package_name: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub company_name: Option<String>,
    pub notes: Option<String>,
}

impl CollectedBookingData {
    /// Merge `update` into `self`, keeping existing values wherever the
    /// update is silent.
    pub fn absorb(&mut self, update: CollectedBookingData) {
        if update.event_date.is_some() {
            self.event_date = update.event_date;
        }
        if update.start_time.is_some() {
            self.start_time = update.start_time;
        }
        if update.end_time.is_some() {
            self.end_time = update.end_time;
        }
        if update.guest_count.is_some() {
            self.guest_count = update.guest_count;
        }
        if update.event_type.is_some() {
            self.event_type = update.event_type;
        }
        if update.package_name.is_some() {
            self.package_name = update.package_name;
        }
        if update.customer_name.is_some() {
            self.customer_name = update.customer_name;
        }
        if update.customer_email.is_some() {
            self.customer_email = update.customer_email;
        }
        if update.company_name.is_some() {
            self.company_name = update.company_name;
        }
        if update.notes.is_some() {
            self.notes = update.notes;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub venue_id: VenueId,
    pub customer_id: Option<CustomerId>,
    pub status: ConversationStatus,
    pub collected: CollectedBookingData,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        matches!(
            (&self.status, next),
            (ConversationStatus::Active, ConversationStatus::Completed)
                | (ConversationStatus::Active, ConversationStatus::Active)
                | (ConversationStatus::Active, ConversationStatus::Expired)
        )
    }

    pub fn transition_to(&mut self, next: ConversationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }
        Err(DomainError::InvalidConversationTransition { from: self.status, to: next })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ConversationStatus::Expired || now > self.expires_at
    }

    pub fn is_resumable(&self, now: DateTime<Utc>) -> bool {
        self.status == ConversationStatus::Active && !self.is_expired(now)
    }
}
