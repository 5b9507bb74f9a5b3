//! One conversational turn, end to end: load state, round-trip the model,
//! execute requested tools strictly in order, and persist the transcript
//! only when the whole turn succeeded. A failed turn leaves no partial
//! transcript behind.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use venuely_core::domain::action::ActionId;
use venuely_core::domain::conversation::{
    ConversationId, ConversationTurn, CustomerId, ToolCallRecord, ToolResultRecord,
};
use venuely_core::domain::venue::{Venue, VenueId};
use venuely_db::repositories::{
    ActionRepository, BookingRepository, ConversationPatch, ConversationRepository,
    RepositoryError, VenueRepository,
};

use crate::conversation::ConversationManager;
use crate::executor::{ToolContext, ToolExecutor, ToolOutcome};
use crate::llm::{ChatMessage, ContentBlock, LlmClient, LlmError, ToolDefinition};
use crate::tools::{tool_declarations, ToolCall};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("venue not found")]
    VenueNotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub venue_id: VenueId,
    pub conversation_id: Option<ConversationId>,
    pub customer_id: Option<CustomerId>,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub conversation_id: ConversationId,
    pub reply: String,
    pub created_actions: Vec<ActionId>,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    venues: Arc<dyn VenueRepository>,
    conversations: Arc<dyn ConversationRepository>,
    manager: ConversationManager,
    executor: ToolExecutor,
    max_tool_rounds: u32,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        venues: Arc<dyn VenueRepository>,
        conversations: Arc<dyn ConversationRepository>,
        bookings: Arc<dyn BookingRepository>,
        actions: Arc<dyn ActionRepository>,
        max_tool_rounds: u32,
        conversation_ttl_days: i64,
    ) -> Self {
        let manager = ConversationManager::new(conversations.clone(), conversation_ttl_days);
        let executor = ToolExecutor::new(venues.clone(), bookings, actions);
        Self {
            llm,
            venues,
            conversations,
            manager,
            executor,
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    pub async fn handle_message(&self, request: TurnRequest) -> Result<TurnOutcome, AgentError> {
        let venue = self
            .venues
            .find_by_id(&request.venue_id)
            .await?
            .ok_or(AgentError::VenueNotFound)?;

        let now = Utc::now();
        let mut conversation = self
            .manager
            .resume_or_create(
                &request.venue_id,
                request.conversation_id.as_ref(),
                request.customer_id.as_ref(),
                now,
            )
            .await?;

        let history = self.conversations.list_turns(&conversation.id).await?;
        let mut messages = transcript_to_messages(&history);
        messages.push(ChatMessage::user_text(&request.message));

        let mut pending = vec![ConversationTurn::customer(&request.message, now)];
        let mut collected = conversation.collected.clone();
        let mut created_actions: Vec<ActionId> = Vec::new();
        let mut reply_text = String::new();

        let declarations = tool_declarations();
        let system = build_system_prompt(&venue);

        for round in 1..=self.max_tool_rounds {
            // The final round withholds the tools so the model has to answer
            // the customer in text.
            let tools: &[ToolDefinition] =
                if round == self.max_tool_rounds { &[] } else { &declarations };

            let reply = self.llm.complete(&system, &messages, tools).await?;
            let text = reply.text();
            let call_records: Vec<ToolCallRecord> = reply
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| ToolCallRecord {
                    call_id: id.to_string(),
                    name: name.to_string(),
                    arguments: input.clone(),
                })
                .collect();

            pending.push(ConversationTurn::agent(&text, call_records.clone(), now));
            messages.push(ChatMessage::assistant_blocks(reply.blocks.clone()));

            if call_records.is_empty() {
                reply_text = text;
                break;
            }

            // Requested calls run sequentially, in order: later calls may
            // depend on earlier results (price before proposal).
            let mut results = Vec::new();
            for record in &call_records {
                let outcome = match ToolCall::parse(&record.name, record.arguments.clone()) {
                    Ok(call) => {
                        collected.absorb(call.collected_update());
                        conversation.collected = collected.clone();
                        let ctx = ToolContext {
                            venue: venue.clone(),
                            conversation: conversation.clone(),
                        };
                        self.executor.execute(&ctx, &call).await
                    }
                    Err(error) => ToolOutcome {
                        payload: json!({ "error": error.to_string() }),
                        created_action: None,
                        is_error: true,
                    },
                };

                if outcome.is_error {
                    warn!(
                        event_name = "agent.tool.failed",
                        conversation_id = %conversation.id.0,
                        venue_id = %venue.id.0,
                        tool = %record.name,
                        "tool call returned an error payload"
                    );
                }
                if let Some(action_id) = outcome.created_action.clone() {
                    created_actions.push(action_id);
                }

                results.push(ToolResultRecord {
                    call_id: record.call_id.clone(),
                    name: record.name.clone(),
                    output: outcome.payload,
                    is_error: outcome.is_error,
                });
            }

            messages.push(ChatMessage::user_blocks(
                results
                    .iter()
                    .map(|result| ContentBlock::ToolResult {
                        tool_use_id: result.call_id.clone(),
                        content: result.output.to_string(),
                        is_error: result.is_error.then_some(true),
                    })
                    .collect(),
            ));
            pending.push(ConversationTurn::tool(results, now));
        }

        if reply_text.trim().is_empty() {
            reply_text =
                "Thanks — I've passed this along to the venue owner, who will follow up shortly."
                    .to_string();
        }

        // The turn is complete; persist the transcript batch and enriched
        // slots together. Nothing was written if an earlier await failed.
        self.conversations.append_turns(&conversation.id, &pending).await?;
        self.conversations
            .update(
                &conversation.id,
                ConversationPatch { collected: Some(collected), ..ConversationPatch::default() },
                now,
            )
            .await?;

        info!(
            event_name = "agent.turn.completed",
            conversation_id = %conversation.id.0,
            venue_id = %venue.id.0,
            turns_appended = pending.len(),
            actions_created = created_actions.len(),
            "agent turn persisted"
        );

        Ok(TurnOutcome { conversation_id: conversation.id, reply: reply_text, created_actions })
    }
}

fn transcript_to_messages(turns: &[ConversationTurn]) -> Vec<ChatMessage> {
    use venuely_core::domain::conversation::TurnRole;

    let mut messages = Vec::new();
    for turn in turns {
        match turn.role {
            TurnRole::Customer => messages.push(ChatMessage::user_text(&turn.text)),
            TurnRole::Agent => {
                let mut blocks = Vec::new();
                if !turn.text.is_empty() {
                    blocks.push(ContentBlock::Text { text: turn.text.clone() });
                }
                for call in &turn.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.call_id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                if !blocks.is_empty() {
                    messages.push(ChatMessage::assistant_blocks(blocks));
                }
            }
            TurnRole::Tool => {
                let blocks: Vec<ContentBlock> = turn
                    .tool_results
                    .iter()
                    .map(|result| ContentBlock::ToolResult {
                        tool_use_id: result.call_id.clone(),
                        content: result.output.to_string(),
                        is_error: result.is_error.then_some(true),
                    })
                    .collect();
                if !blocks.is_empty() {
                    messages.push(ChatMessage::user_blocks(blocks));
                }
            }
        }
    }
    messages
}

fn build_system_prompt(venue: &Venue) -> String {
    let amenities = if venue.amenities.is_empty() {
        "none listed".to_string()
    } else {
        venue.amenities.join(", ")
    };

    format!(
        "You are the booking agent for {name}, an event venue on the Venuely marketplace. \
         You negotiate bookings on the owner's behalf.\n\
         Venue facts: capacity {capacity} guests; amenities: {amenities}.\n\
         Rules:\n\
         - Use check_availability before promising any date.\n\
         - Never estimate prices; always call calculate_price and quote its total.\n\
         - Collect date, time range, guest count, event type and the customer's \
           name and email before proposing.\n\
         - Only call propose_booking after the customer explicitly confirms the \
           details and the quoted price.\n\
         - Use escalate_to_owner for requests you cannot answer or that need the \
           owner's judgment.\n\
         - If this venue cannot host the event, offer alternatives via \
           search_other_venues.\n\
         Proposals and escalations are reviewed by the owner; never promise that \
         a booking is confirmed.",
        name = venue.name,
        capacity = venue.capacity,
        amenities = amenities,
    )
}
