//! JSON API for the negotiation core.
//!
//! Endpoints:
//! - `POST /api/agent/message`             — run one agent turn
//! - `GET  /api/conversations/{id}`        — transcript and collected slots
//! - `POST /api/conversations/{id}/link`   — one-time customer attach
//! - `GET  /api/actions`                   — list actions for a venue
//! - `POST /api/actions/{id}/approve`      — owner approves a proposal
//! - `POST /api/actions/{id}/decline`      — owner declines a proposal
//! - `POST /api/actions/{id}/modify`       — owner counters a proposal
//! - `POST /api/actions/{id}/respond`      — counter-offer accept/decline
//! - `POST /internal/sweep`                — expiry sweep (bearer secret)
//!
//! Authentication of owners and customers happens upstream (an excluded
//! collaborator); the ids in request bodies are the authenticated
//! principals forwarded by that layer.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::error;

use uuid::Uuid;
use venuely_agent::conversation::ConversationManager;
use venuely_agent::runtime::{AgentError, AgentRuntime, TurnRequest};
use venuely_core::approvals::{ModifyRequest, ResolutionError};
use venuely_core::errors::{ApplicationError, InterfaceError};
use venuely_core::domain::action::{ActionId, ActionStatus, AgentAction};
use venuely_core::domain::conversation::{Conversation, ConversationId, ConversationTurn, CustomerId};
use venuely_core::domain::venue::{OwnerId, VenueId};
use venuely_db::repositories::{ActionRepository, ConversationRepository};

use crate::approvals::{DecisionError, DecisionOutcome, DecisionService, ResolverIdentity};
use crate::sweep::SweepService;

#[derive(Clone)]
pub struct ApiState {
    pub runtime: Arc<AgentRuntime>,
    pub decisions: Arc<DecisionService>,
    pub sweep: Arc<SweepService>,
    pub manager: Arc<ConversationManager>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub actions: Arc<dyn ActionRepository>,
    pub sweep_secret: Option<SecretString>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/agent/message", post(agent_message))
        .route("/api/conversations/{id}", get(get_conversation))
        .route("/api/conversations/{id}/link", post(link_customer))
        .route("/api/actions", get(list_actions))
        .route("/api/actions/{id}/approve", post(approve_action))
        .route("/api/actions/{id}/decline", post(decline_action))
        .route("/api/actions/{id}/modify", post(modify_action))
        .route("/api/actions/{id}/respond", post(respond_to_counter))
        .route("/internal/sweep", post(run_sweep))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

fn error_body(message: impl Into<String>) -> Json<ApiError> {
    Json(ApiError { error: message.into() })
}

// ---------------------------------------------------------------------------
// Agent turn
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AgentMessageRequest {
    pub venue_id: String,
    pub conversation_id: Option<String>,
    pub customer_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AgentMessageResponse {
    pub conversation_id: String,
    pub reply: String,
    pub action_ids: Vec<String>,
}

async fn agent_message(
    State(state): State<ApiState>,
    Json(body): Json<AgentMessageRequest>,
) -> Result<Json<AgentMessageResponse>, (StatusCode, Json<ApiError>)> {
    if body.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, error_body("message must not be empty")));
    }

    let outcome = state
        .runtime
        .handle_message(TurnRequest {
            venue_id: VenueId(body.venue_id),
            conversation_id: body.conversation_id.map(ConversationId),
            customer_id: body.customer_id.map(CustomerId),
            message: body.message,
        })
        .await
        .map_err(agent_error_response)?;

    Ok(Json(AgentMessageResponse {
        conversation_id: outcome.conversation_id.0,
        reply: outcome.reply,
        action_ids: outcome.created_actions.into_iter().map(|id| id.0).collect(),
    }))
}

fn agent_error_response(error: AgentError) -> (StatusCode, Json<ApiError>) {
    match error {
        AgentError::VenueNotFound => (StatusCode::NOT_FOUND, error_body("venue not found")),
        AgentError::Llm(inner) => {
            error!(event_name = "api.agent.llm_failed", error = %inner, "model call failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                error_body("the agent is temporarily unavailable; please retry"),
            )
        }
        AgentError::Repository(inner) => {
            error!(event_name = "api.agent.persistence_failed", error = %inner, "turn persistence failed");
            (StatusCode::SERVICE_UNAVAILABLE, error_body("temporarily unavailable"))
        }
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
    pub turns: Vec<ConversationTurn>,
}

async fn get_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, (StatusCode, Json<ApiError>)> {
    let id = ConversationId(id);
    let conversation = state
        .conversations
        .find_by_id(&id)
        .await
        .map_err(repository_error_response)?
        .ok_or((StatusCode::NOT_FOUND, error_body("conversation not found")))?;
    let turns = state.conversations.list_turns(&id).await.map_err(repository_error_response)?;

    Ok(Json(ConversationResponse { conversation, turns }))
}

#[derive(Debug, Deserialize)]
pub struct LinkCustomerRequest {
    pub customer_id: String,
}

#[derive(Debug, Serialize)]
pub struct LinkCustomerResponse {
    pub linked: bool,
}

async fn link_customer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<LinkCustomerRequest>,
) -> Result<Json<LinkCustomerResponse>, (StatusCode, Json<ApiError>)> {
    let id = ConversationId(id);
    state
        .conversations
        .find_by_id(&id)
        .await
        .map_err(repository_error_response)?
        .ok_or((StatusCode::NOT_FOUND, error_body("conversation not found")))?;

    let linked = state
        .manager
        .link_customer(&id, &CustomerId(body.customer_id), Utc::now())
        .await
        .map_err(repository_error_response)?;

    Ok(Json(LinkCustomerResponse { linked }))
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListActionsQuery {
    pub venue_id: String,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ActionListResponse {
    pub actions: Vec<AgentAction>,
}

async fn list_actions(
    State(state): State<ApiState>,
    Query(query): Query<ListActionsQuery>,
) -> Result<Json<ActionListResponse>, (StatusCode, Json<ApiError>)> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(ActionStatus::parse(raw).ok_or((
            StatusCode::BAD_REQUEST,
            error_body(format!("unknown status `{raw}`")),
        ))?),
        None => None,
    };

    let actions = state
        .actions
        .list_for_venue(&VenueId(query.venue_id), status, query.limit.unwrap_or(50))
        .await
        .map_err(repository_error_response)?;

    Ok(Json(ActionListResponse { actions }))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub owner_id: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeclineRequest {
    pub owner_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModifyActionRequest {
    pub owner_id: String,
    #[serde(flatten)]
    pub overrides: ModifyRequest,
}

#[derive(Debug, Deserialize)]
pub struct CounterResponseRequest {
    pub party: String,
    pub party_id: String,
    pub accept: bool,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub action_id: String,
    pub status: String,
    pub booking_id: Option<String>,
    pub counter_offer_id: Option<String>,
}

impl From<DecisionOutcome> for DecisionResponse {
    fn from(outcome: DecisionOutcome) -> Self {
        Self {
            action_id: outcome.action_id.0,
            status: outcome.status.as_db_str().to_string(),
            booking_id: outcome.booking_id.map(|id| id.0),
            counter_offer_id: outcome.counter_offer_id.map(|id| id.0),
        }
    }
}

async fn approve_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<ApiError>)> {
    state
        .decisions
        .approve(&ActionId(id), &OwnerId(body.owner_id), body.note)
        .await
        .map(|outcome| Json(DecisionResponse::from(outcome)))
        .map_err(decision_error_response)
}

async fn decline_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DeclineRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<ApiError>)> {
    state
        .decisions
        .decline(&ActionId(id), &OwnerId(body.owner_id), body.reason)
        .await
        .map(|outcome| Json(DecisionResponse::from(outcome)))
        .map_err(decision_error_response)
}

async fn modify_action(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ModifyActionRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<ApiError>)> {
    state
        .decisions
        .modify(&ActionId(id), &OwnerId(body.owner_id), body.overrides)
        .await
        .map(|outcome| Json(DecisionResponse::from(outcome)))
        .map_err(decision_error_response)
}

async fn respond_to_counter(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<CounterResponseRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<ApiError>)> {
    let resolver = match body.party.as_str() {
        "owner" => ResolverIdentity::Owner(OwnerId(body.party_id)),
        "customer" => ResolverIdentity::Customer(CustomerId(body.party_id)),
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                error_body(format!("unknown party `{other}` (expected owner|customer)")),
            ))
        }
    };

    state
        .decisions
        .respond_to_counter_offer(&ActionId(id), &resolver, body.accept, body.note)
        .await
        .map(|outcome| Json(DecisionResponse::from(outcome)))
        .map_err(decision_error_response)
}

fn decision_error_response(error: DecisionError) -> (StatusCode, Json<ApiError>) {
    match &error {
        DecisionError::NotFound => (StatusCode::NOT_FOUND, error_body("not found")),
        DecisionError::Resolution(ResolutionError::NotAuthorized) => {
            (StatusCode::FORBIDDEN, error_body("not authorized"))
        }
        DecisionError::Resolution(ResolutionError::NotPending { .. }) => {
            (StatusCode::CONFLICT, error_body(error.to_string()))
        }
        DecisionError::Resolution(_) => (StatusCode::BAD_REQUEST, error_body(error.to_string())),
        DecisionError::BookingCreation(_) | DecisionError::CalendarConflict(_) => {
            (StatusCode::CONFLICT, error_body(error.to_string()))
        }
        DecisionError::Repository(inner) => {
            error!(event_name = "api.decision.persistence_failed", error = %inner, "decision persistence failed");
            (StatusCode::SERVICE_UNAVAILABLE, error_body("temporarily unavailable"))
        }
    }
}

/// Unexpected persistence failures cross the boundary as a generic,
/// correlation-tagged interface error rather than raw detail.
fn repository_error_response(
    error: venuely_db::repositories::RepositoryError,
) -> (StatusCode, Json<ApiError>) {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = ApplicationError::Persistence(error.to_string())
        .into_interface(correlation_id.clone());
    error!(
        event_name = "api.persistence_failed",
        correlation_id = %correlation_id,
        error = %interface,
        "repository call failed"
    );

    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error_body(interface.user_message()))
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

async fn run_sweep(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<crate::sweep::SweepReport>, (StatusCode, Json<ApiError>)> {
    let Some(secret) = &state.sweep_secret else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("sweep is not configured on this deployment"),
        ));
    };

    let supplied = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if supplied != Some(secret.expose_secret()) {
        return Err((StatusCode::UNAUTHORIZED, error_body("invalid sweep credential")));
    }

    let report = state
        .sweep
        .run(Utc::now())
        .await
        .map_err(repository_error_response)?;

    Ok(Json(report))
}
