use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use venuely_core::domain::conversation::{
    CollectedBookingData, Conversation, ConversationId, ConversationStatus, ConversationTurn,
    CustomerId, ToolCallRecord, ToolResultRecord, TurnRole,
};
use venuely_core::domain::venue::VenueId;

use super::{ConversationPatch, ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let venue_id: String = row.try_get("venue_id").map_err(decode)?;
    let customer_id: Option<String> = row.try_get("customer_id").map_err(decode)?;
    let status_raw: String = row.try_get("status").map_err(decode)?;
    let collected_raw: String = row.try_get("collected_data").map_err(decode)?;
    let expires_at: String = row.try_get("expires_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let status = ConversationStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown conversation status `{status_raw}`")))?;
    let collected: CollectedBookingData = serde_json::from_str(&collected_raw)
        .map_err(|e| RepositoryError::Decode(format!("collected_data: {e}")))?;

    Ok(Conversation {
        id: ConversationId(id),
        venue_id: VenueId(venue_id),
        customer_id: customer_id.map(CustomerId),
        status,
        collected,
        expires_at: parse_timestamp(&expires_at),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let role_raw: String = row.try_get("role").map_err(decode)?;
    let text: String = row.try_get("text").map_err(decode)?;
    let tool_calls_raw: String = row.try_get("tool_calls").map_err(decode)?;
    let tool_results_raw: String = row.try_get("tool_results").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    let role = TurnRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown turn role `{role_raw}`")))?;
    let tool_calls: Vec<ToolCallRecord> = serde_json::from_str(&tool_calls_raw)
        .map_err(|e| RepositoryError::Decode(format!("tool_calls: {e}")))?;
    let tool_results: Vec<ToolResultRecord> = serde_json::from_str(&tool_results_raw)
        .map_err(|e| RepositoryError::Decode(format!("tool_results: {e}")))?;

    Ok(ConversationTurn {
        role,
        text,
        tool_calls,
        tool_results,
        created_at: parse_timestamp(&created_at),
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, venue_id, customer_id, status, collected_data, expires_at, created_at, updated_at";

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversation WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_conversation(row)?)),
            None => Ok(None),
        }
    }

    async fn find_active_for_customer(
        &self,
        venue_id: &VenueId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversation
             WHERE venue_id = ? AND customer_id = ? AND status = 'active' AND expires_at > ?
             ORDER BY updated_at DESC
             LIMIT 1",
        ))
        .bind(&venue_id.0)
        .bind(&customer_id.0)
        .bind(now.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_conversation(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let collected = serde_json::to_string(&conversation.collected)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation (id, venue_id, customer_id, status, collected_data,
                                       expires_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.venue_id.0)
        .bind(conversation.customer_id.as_ref().map(|customer| customer.0.as_str()))
        .bind(conversation.status.as_db_str())
        .bind(collected)
        .bind(conversation.expires_at.to_rfc3339())
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(
        &self,
        id: &ConversationId,
        patch: ConversationPatch,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE conversation SET ");
        let mut first = true;
        let mut push_field = |builder: &mut QueryBuilder<sqlx::Sqlite>, name: &str| {
            if !first {
                builder.push(", ");
            }
            first = false;
            builder.push(name);
            builder.push(" = ");
        };

        if let Some(status) = patch.status {
            push_field(&mut builder, "status");
            builder.push_bind(status.as_db_str());
        }
        if let Some(collected) = patch.collected {
            let raw = serde_json::to_string(&collected)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            push_field(&mut builder, "collected_data");
            builder.push_bind(raw);
        }
        if let Some(expires_at) = patch.expires_at {
            push_field(&mut builder, "expires_at");
            builder.push_bind(expires_at.to_rfc3339());
        }

        push_field(&mut builder, "updated_at");
        builder.push_bind(now.to_rfc3339());
        builder.push(" WHERE id = ");
        builder.push_bind(id.0.clone());

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn link_customer(
        &self,
        id: &ConversationId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversation SET customer_id = ?, updated_at = ?
             WHERE id = ? AND customer_id IS NULL",
        )
        .bind(&customer_id.0)
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_turns(
        &self,
        id: &ConversationId,
        turns: &[ConversationTurn],
    ) -> Result<(), RepositoryError> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let next_turn: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(turn_number), 0) + 1 FROM conversation_turn WHERE conversation_id = ?",
        )
        .bind(&id.0)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, turn) in turns.iter().enumerate() {
            let tool_calls = serde_json::to_string(&turn.tool_calls)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let tool_results = serde_json::to_string(&turn.tool_results)
                .map_err(|e| RepositoryError::Decode(e.to_string()))?;

            sqlx::query(
                "INSERT INTO conversation_turn (id, conversation_id, turn_number, role, text,
                                                tool_calls, tool_results, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id.0)
            .bind(next_turn + offset as i64)
            .bind(turn.role.as_db_str())
            .bind(&turn.text)
            .bind(tool_calls)
            .bind(tool_results)
            .bind(turn.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_turns(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT role, text, tool_calls, tool_results, created_at
             FROM conversation_turn
             WHERE conversation_id = ?
             ORDER BY turn_number ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_turn).collect()
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversation SET status = 'expired', updated_at = ?
             WHERE status = 'active' AND expires_at < ?",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use venuely_core::domain::conversation::{
        CollectedBookingData, Conversation, ConversationId, ConversationStatus, ConversationTurn,
        CustomerId, ToolCallRecord, ToolResultRecord,
    };
    use venuely_core::domain::venue::VenueId;

    use super::SqlConversationRepository;
    use crate::repositories::venue::tests::venue_fixture;
    use crate::repositories::{
        ConversationPatch, ConversationRepository, SqlVenueRepository, VenueRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> crate::DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlVenueRepository::new(pool.clone())
            .save(venue_fixture("v-1", 100))
            .await
            .expect("seed venue");
        pool
    }

    fn conversation(id: &str, customer: Option<&str>) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: ConversationId(id.to_string()),
            venue_id: VenueId("v-1".to_string()),
            customer_id: customer.map(|customer| CustomerId(customer.to_string())),
            status: ConversationStatus::Active,
            collected: CollectedBookingData::default(),
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn partial_update_leaves_unspecified_fields_alone() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);

        let mut seeded = conversation("c-1", Some("cust-1"));
        seeded.collected.event_date = Some("2026-09-12".to_string());
        repo.insert(seeded).await.expect("insert");

        repo.update(
            &ConversationId("c-1".to_string()),
            ConversationPatch {
                status: Some(ConversationStatus::Completed),
                ..ConversationPatch::default()
            },
            Utc::now(),
        )
        .await
        .expect("patch status");

        let found = repo
            .find_by_id(&ConversationId("c-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.status, ConversationStatus::Completed);
        assert_eq!(found.collected.event_date.as_deref(), Some("2026-09-12"));
        assert_eq!(found.customer_id, Some(CustomerId("cust-1".to_string())));
    }

    #[tokio::test]
    async fn customer_link_is_one_time_only() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);
        repo.insert(conversation("c-1", None)).await.expect("insert");

        let linked = repo
            .link_customer(&ConversationId("c-1".to_string()), &CustomerId("cust-1".to_string()), Utc::now())
            .await
            .expect("first link");
        assert!(linked);

        let relinked = repo
            .link_customer(&ConversationId("c-1".to_string()), &CustomerId("cust-2".to_string()), Utc::now())
            .await
            .expect("second link attempt");
        assert!(!relinked, "an already-linked conversation must not be re-linked");

        let found = repo
            .find_by_id(&ConversationId("c-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.customer_id, Some(CustomerId("cust-1".to_string())));
    }

    #[tokio::test]
    async fn identity_lookup_returns_most_recent_active_conversation() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);
        let now = Utc::now();

        let mut older = conversation("c-old", Some("cust-1"));
        older.updated_at = now - Duration::hours(2);
        repo.insert(older).await.expect("insert older");

        let mut newer = conversation("c-new", Some("cust-1"));
        newer.updated_at = now - Duration::minutes(5);
        repo.insert(newer).await.expect("insert newer");

        let mut expired = conversation("c-expired", Some("cust-1"));
        expired.expires_at = now - Duration::minutes(1);
        repo.insert(expired).await.expect("insert expired");

        let found = repo
            .find_active_for_customer(
                &VenueId("v-1".to_string()),
                &CustomerId("cust-1".to_string()),
                now,
            )
            .await
            .expect("lookup")
            .expect("one active conversation");
        assert_eq!(found.id.0, "c-new");
    }

    #[tokio::test]
    async fn turns_append_in_order_and_round_trip_tool_payloads() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);
        repo.insert(conversation("c-1", None)).await.expect("insert");
        let id = ConversationId("c-1".to_string());
        let now = Utc::now();

        repo.append_turns(&id, &[ConversationTurn::customer("hi, is friday free?", now)])
            .await
            .expect("first turn");
        repo.append_turns(
            &id,
            &[
                ConversationTurn::agent(
                    "checking now",
                    vec![ToolCallRecord {
                        call_id: "call-1".to_string(),
                        name: "check_availability".to_string(),
                        arguments: json!({"date": "2026-09-12"}),
                    }],
                    now,
                ),
                ConversationTurn::tool(
                    vec![ToolResultRecord {
                        call_id: "call-1".to_string(),
                        name: "check_availability".to_string(),
                        output: json!({"available": true}),
                        is_error: false,
                    }],
                    now,
                ),
            ],
        )
        .await
        .expect("tool round");

        let turns = repo.list_turns(&id).await.expect("list turns");
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text, "hi, is friday free?");
        assert_eq!(turns[1].tool_calls[0].name, "check_availability");
        assert_eq!(turns[2].tool_results[0].output, json!({"available": true}));
    }

    #[tokio::test]
    async fn sweep_expires_only_overdue_active_conversations() {
        let pool = setup().await;
        let repo = SqlConversationRepository::new(pool);
        let now = Utc::now();

        let mut overdue = conversation("c-overdue", None);
        overdue.expires_at = now - Duration::hours(1);
        repo.insert(overdue).await.expect("insert overdue");

        let mut completed = conversation("c-completed", None);
        completed.status = ConversationStatus::Completed;
        completed.expires_at = now - Duration::hours(1);
        repo.insert(completed).await.expect("insert completed");

        repo.insert(conversation("c-fresh", None)).await.expect("insert fresh");

        let affected = repo.expire_overdue(now).await.expect("sweep");
        assert_eq!(affected, 1);

        let swept = repo
            .find_by_id(&ConversationId("c-overdue".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(swept.status, ConversationStatus::Expired);

        let untouched = repo
            .find_by_id(&ConversationId("c-completed".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(untouched.status, ConversationStatus::Completed);
    }
}
