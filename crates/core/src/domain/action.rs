use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::ResolutionError;
use crate::domain::booking::BookingId;
use crate::domain::conversation::{ConversationId, CustomerId};
use crate::domain::venue::VenueId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

/// Pending actions older than this are expired by the sweep.
pub const ACTION_STALE_DAYS: i64 = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    BookingApproval,
    CounterOffer,
    Escalation,
}

impl ActionType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::BookingApproval => "booking_approval",
            Self::CounterOffer => "counter_offer",
            Self::Escalation => "escalation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "booking_approval" => Some(Self::BookingApproval),
            "counter_offer" => Some(Self::CounterOffer),
            "escalation" => Some(Self::Escalation),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Declined,
    Modified,
    Expired,
}

impl ActionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::Modified => "modified",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "declined" => Some(Self::Declined),
            "modified" => Some(Self::Modified),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Every status except `pending` is terminal for the action it is on;
    /// `modified` is terminal for the original and continues in the spawned
    /// counter-offer.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Which side of the negotiation created the proposal carried by an action.
/// Counter-offers must be resolved by the other side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposingParty {
    Owner,
    Customer,
}

impl ProposingParty {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Customer => "customer",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "owner" => Some(Self::Owner),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Owner => Self::Customer,
            Self::Customer => Self::Owner,
        }
    }
}

/// The normalized proposal carried by a booking approval or counter-offer.
/// Used both to render the action for the owner and to construct the real
/// booking once approved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub guest_count: u32,
    pub event_type: String,
    pub price: Decimal,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub company_name: Option<String>,
    #[serde(default)]
    pub extras: Vec<String>,
    pub customer_note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationSummary {
    pub reason: String,
    pub customer_request: String,
    pub context: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSummary {
    Booking(BookingSummary),
    Escalation(EscalationSummary),
}

impl ActionSummary {
    pub fn as_booking(&self) -> Option<&BookingSummary> {
        match self {
            Self::Booking(summary) => Some(summary),
            Self::Escalation(_) => None,
        }
    }
}

/// What the resolving human recorded on the action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub decided_by: String,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: ActionId,
    pub venue_id: VenueId,
    pub conversation_id: ConversationId,
    pub customer_id: Option<CustomerId>,
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub proposed_by: ProposingParty,
    pub summary: ActionSummary,
    pub owner_response: Option<OwnerResponse>,
    pub original_action_id: Option<ActionId>,
    pub booking_id: Option<BookingId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentAction {
    /// Status transitions only ever leave `pending`.
    pub fn guard_pending(&self) -> Result<(), ResolutionError> {
        if self.status == ActionStatus::Pending {
            return Ok(());
        }
        Err(ResolutionError::NotPending { current: self.status })
    }

    pub fn guard_type(&self, expected: ActionType) -> Result<(), ResolutionError> {
        if self.action_type == expected {
            return Ok(());
        }
        Err(ResolutionError::WrongActionType { expected, actual: self.action_type })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;

    use super::{
        ActionId, ActionStatus, ActionSummary, ActionType, AgentAction, BookingSummary,
        ProposingParty,
    };
    use crate::approvals::ResolutionError;
    use crate::domain::conversation::ConversationId;
    use crate::domain::venue::VenueId;

    pub(crate) fn booking_summary() -> BookingSummary {
        BookingSummary {
            event_date: NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date"),
            start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
            guest_count: 80,
            event_type: "company party".to_string(),
            price: Decimal::new(600_000, 2),
            customer_name: Some("Dana Reyes".to_string()),
            customer_email: Some("dana@example.com".to_string()),
            company_name: Some("Reyes Media".to_string()),
            extras: vec!["projector".to_string()],
            customer_note: None,
        }
    }

    fn action(status: ActionStatus) -> AgentAction {
        let now = Utc::now();
        AgentAction {
            id: ActionId("act-1".to_string()),
            venue_id: VenueId("v-1".to_string()),
            conversation_id: ConversationId("c-1".to_string()),
            customer_id: None,
            action_type: ActionType::BookingApproval,
            status,
            proposed_by: ProposingParty::Customer,
            summary: ActionSummary::Booking(booking_summary()),
            owner_response: None,
            original_action_id: None,
            booking_id: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_pending_actions_pass_the_guard() {
        assert!(action(ActionStatus::Pending).guard_pending().is_ok());

        for status in [
            ActionStatus::Approved,
            ActionStatus::Declined,
            ActionStatus::Modified,
            ActionStatus::Expired,
        ] {
            let error = action(status).guard_pending().expect_err("terminal status must fail");
            assert!(matches!(error, ResolutionError::NotPending { current } if current == status));
        }
    }

    #[test]
    fn type_guard_names_both_sides() {
        let escalation = AgentAction {
            action_type: ActionType::Escalation,
            ..action(ActionStatus::Pending)
        };
        let error = escalation
            .guard_type(ActionType::BookingApproval)
            .expect_err("escalations are not approvable");
        assert!(matches!(
            error,
            ResolutionError::WrongActionType {
                expected: ActionType::BookingApproval,
                actual: ActionType::Escalation
            }
        ));
    }

    #[test]
    fn status_codec_round_trips() {
        for status in [
            ActionStatus::Pending,
            ActionStatus::Approved,
            ActionStatus::Declined,
            ActionStatus::Modified,
            ActionStatus::Expired,
        ] {
            assert_eq!(ActionStatus::parse(status.as_db_str()), Some(status));
        }
        assert_eq!(ActionStatus::parse("unknown"), None);
    }

    #[test]
    fn proposing_party_flips() {
        assert_eq!(ProposingParty::Owner.other(), ProposingParty::Customer);
        assert_eq!(ProposingParty::Customer.other(), ProposingParty::Owner);
    }
}
