pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use approvals::{
    merge_counter_offer, validate_overrides, ModifyRequest, ResolutionError, SummaryOverrides,
};
pub use domain::action::{
    ActionId, ActionStatus, ActionSummary, ActionType, AgentAction, BookingSummary,
    EscalationSummary, OwnerResponse, ProposingParty,
};
pub use domain::booking::{Booking, BookingId, BookingStatus};
pub use domain::conversation::{
    CollectedBookingData, Conversation, ConversationId, ConversationStatus, ConversationTurn,
    CustomerId, ToolCallRecord, ToolResultRecord, TurnRole,
};
pub use domain::venue::{
    DurationPricing, FaqEntry, OwnerId, PricingPackage, PricingRules, Venue, VenueId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{calculate_price, platform_fee, PriceBreakdown, PriceRequest};
