use chrono::{DateTime, Utc};
use sqlx::Row;

use venuely_core::domain::action::{
    ActionId, ActionStatus, ActionSummary, ActionType, AgentAction, OwnerResponse, ProposingParty,
};
use venuely_core::domain::booking::BookingId;
use venuely_core::domain::conversation::{ConversationId, CustomerId};
use venuely_core::domain::venue::VenueId;

use super::{ActionRepository, ActionResolution, RepositoryError};
use crate::DbPool;

pub struct SqlActionRepository {
    pool: DbPool,
}

impl SqlActionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<AgentAction, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let venue_id: String = row.try_get("venue_id").map_err(decode)?;
    let conversation_id: String = row.try_get("conversation_id").map_err(decode)?;
    let customer_id: Option<String> = row.try_get("customer_id").map_err(decode)?;
    let action_type_raw: String = row.try_get("action_type").map_err(decode)?;
    let status_raw: String = row.try_get("status").map_err(decode)?;
    let proposed_by_raw: String = row.try_get("proposed_by").map_err(decode)?;
    let summary_raw: String = row.try_get("summary").map_err(decode)?;
    let owner_response_raw: Option<String> = row.try_get("owner_response").map_err(decode)?;
    let original_action_id: Option<String> = row.try_get("original_action_id").map_err(decode)?;
    let booking_id: Option<String> = row.try_get("booking_id").map_err(decode)?;
    let resolved_at: Option<String> = row.try_get("resolved_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let action_type = ActionType::parse(&action_type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action type `{action_type_raw}`")))?;
    let status = ActionStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action status `{status_raw}`")))?;
    let proposed_by = ProposingParty::parse(&proposed_by_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown proposing party `{proposed_by_raw}`")))?;
    let summary: ActionSummary = serde_json::from_str(&summary_raw)
        .map_err(|e| RepositoryError::Decode(format!("summary: {e}")))?;
    let owner_response: Option<OwnerResponse> = owner_response_raw
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("owner_response: {e}")))?;

    Ok(AgentAction {
        id: ActionId(id),
        venue_id: VenueId(venue_id),
        conversation_id: ConversationId(conversation_id),
        customer_id: customer_id.map(CustomerId),
        action_type,
        status,
        proposed_by,
        summary,
        owner_response,
        original_action_id: original_action_id.map(ActionId),
        booking_id: booking_id.map(BookingId),
        resolved_at: resolved_at.as_deref().map(parse_timestamp),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

const ACTION_COLUMNS: &str = "id, venue_id, conversation_id, customer_id, action_type, status, \
     proposed_by, summary, owner_response, original_action_id, booking_id, resolved_at, \
     created_at, updated_at";

#[async_trait::async_trait]
impl ActionRepository for SqlActionRepository {
    async fn find_by_id(&self, id: &ActionId) -> Result<Option<AgentAction>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ACTION_COLUMNS} FROM agent_action WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_action(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, action: AgentAction) -> Result<(), RepositoryError> {
        let summary = serde_json::to_string(&action.summary)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let owner_response = action
            .owner_response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO agent_action (id, venue_id, conversation_id, customer_id, action_type,
                                       status, proposed_by, summary, owner_response,
                                       original_action_id, booking_id, resolved_at,
                                       created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&action.id.0)
        .bind(&action.venue_id.0)
        .bind(&action.conversation_id.0)
        .bind(action.customer_id.as_ref().map(|customer| customer.0.as_str()))
        .bind(action.action_type.as_db_str())
        .bind(action.status.as_db_str())
        .bind(action.proposed_by.as_db_str())
        .bind(summary)
        .bind(owner_response)
        .bind(action.original_action_id.as_ref().map(|original| original.0.as_str()))
        .bind(action.booking_id.as_ref().map(|booking| booking.0.as_str()))
        .bind(action.resolved_at.map(|at| at.to_rfc3339()))
        .bind(action.created_at.to_rfc3339())
        .bind(action.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resolve_if_pending(
        &self,
        id: &ActionId,
        resolution: ActionResolution,
    ) -> Result<bool, RepositoryError> {
        let owner_response = resolution
            .owner_response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        // The status predicate makes the transition a compare-and-swap: a
        // concurrent second resolver affects zero rows.
        let result = sqlx::query(
            "UPDATE agent_action
             SET status = ?, owner_response = ?, booking_id = COALESCE(?, booking_id),
                 resolved_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(resolution.status.as_db_str())
        .bind(owner_response)
        .bind(resolution.booking_id.as_ref().map(|booking| booking.0.as_str()))
        .bind(resolution.resolved_at.to_rfc3339())
        .bind(resolution.resolved_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_venue(
        &self,
        venue_id: &VenueId,
        status: Option<ActionStatus>,
        limit: u32,
    ) -> Result<Vec<AgentAction>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {ACTION_COLUMNS} FROM agent_action
                 WHERE venue_id = ? AND status = ?
                 ORDER BY created_at ASC
                 LIMIT ?",
            ))
            .bind(&venue_id.0)
            .bind(status.as_db_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {ACTION_COLUMNS} FROM agent_action
                 WHERE venue_id = ?
                 ORDER BY created_at ASC
                 LIMIT ?",
            ))
            .bind(&venue_id.0)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_action).collect()
    }

    async fn find_counter_offer_for(
        &self,
        original_id: &ActionId,
    ) -> Result<Option<AgentAction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM agent_action
             WHERE original_action_id = ? AND action_type = 'counter_offer'
             ORDER BY created_at DESC
             LIMIT 1",
        ))
        .bind(&original_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_action(row)?)),
            None => Ok(None),
        }
    }

    async fn expire_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE agent_action
             SET status = 'expired', resolved_at = ?, updated_at = ?
             WHERE status = 'pending' AND created_at < ?",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
