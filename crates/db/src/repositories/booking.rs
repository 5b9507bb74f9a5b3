use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use venuely_core::domain::action::BookingSummary;
use venuely_core::domain::booking::{Booking, BookingId, BookingStatus};
use venuely_core::domain::venue::VenueId;

use super::{BookingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("event_date `{raw}`: {e}")))
}

fn parse_time(raw: &str) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| RepositoryError::Decode(format!("time `{raw}`: {e}")))
}

fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let venue_id: String = row.try_get("venue_id").map_err(decode)?;
    let event_date: String = row.try_get("event_date").map_err(decode)?;
    let start_time: String = row.try_get("start_time").map_err(decode)?;
    let end_time: String = row.try_get("end_time").map_err(decode)?;
    let event_type: String = row.try_get("event_type").map_err(decode)?;
    let guest_count: i64 = row.try_get("guest_count").map_err(decode)?;
    let price_raw: String = row.try_get("price").map_err(decode)?;
    let customer_name: String = row.try_get("customer_name").map_err(decode)?;
    let customer_email: String = row.try_get("customer_email").map_err(decode)?;
    let company_name: Option<String> = row.try_get("company_name").map_err(decode)?;
    let status_raw: String = row.try_get("status").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let price = price_raw
        .parse::<Decimal>()
        .map_err(|e| RepositoryError::Decode(format!("price: {e}")))?;
    let status = BookingStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown booking status `{status_raw}`")))?;

    Ok(Booking {
        id: BookingId(id),
        venue_id: VenueId(venue_id),
        event_date: parse_date(&event_date)?,
        start_time: parse_time(&start_time)?,
        end_time: parse_time(&end_time)?,
        event_type,
        guest_count: guest_count.max(0) as u32,
        price,
        customer_name,
        customer_email,
        company_name,
        status,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

const BOOKING_COLUMNS: &str = "id, venue_id, event_date, start_time, end_time, event_type, \
     guest_count, price, customer_name, customer_email, company_name, status, created_at, updated_at";

#[async_trait::async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM booking WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_booking(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, booking: Booking) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO booking (id, venue_id, event_date, start_time, end_time, event_type,
                                  guest_count, price, customer_name, customer_email, company_name,
                                  status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&booking.id.0)
        .bind(&booking.venue_id.0)
        .bind(booking.event_date.to_string())
        .bind(booking.start_time.to_string())
        .bind(booking.end_time.to_string())
        .bind(&booking.event_type)
        .bind(booking.guest_count as i64)
        .bind(booking.price.to_string())
        .bind(&booking.customer_name)
        .bind(&booking.customer_email)
        .bind(&booking.company_name)
        .bind(booking.status.as_db_str())
        .bind(booking.created_at.to_rfc3339())
        .bind(booking.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_terms(
        &self,
        id: &BookingId,
        summary: &BookingSummary,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE booking
             SET event_date = ?, start_time = ?, end_time = ?, guest_count = ?, price = ?,
                 event_type = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(summary.event_date.to_string())
        .bind(summary.start_time.to_string())
        .bind(summary.end_time.to_string())
        .bind(summary.guest_count as i64)
        .bind(summary.price.to_string())
        .bind(&summary.event_type)
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel(&self, id: &BookingId, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE booking SET status = 'cancelled', updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_accepted_on_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM booking
             WHERE venue_id = ? AND event_date = ? AND status = 'accepted'
             ORDER BY start_time ASC",
        ))
        .bind(&venue_id.0)
        .bind(date.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn is_date_blocked(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blocked_date WHERE venue_id = ? AND event_date = ?",
        )
        .bind(&venue_id.0)
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn block_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO blocked_date (venue_id, event_date, reason, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(venue_id, event_date) DO UPDATE SET reason = excluded.reason",
        )
        .bind(&venue_id.0)
        .bind(date.to_string())
        .bind(reason)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unblock_date(
        &self,
        venue_id: &VenueId,
        date: NaiveDate,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM blocked_date WHERE venue_id = ? AND event_date = ?")
            .bind(&venue_id.0)
            .bind(date.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;

    use venuely_core::domain::action::BookingSummary;
    use venuely_core::domain::booking::{Booking, BookingId, BookingStatus};
    use venuely_core::domain::venue::VenueId;

    use super::SqlBookingRepository;
    use crate::repositories::venue::tests::venue_fixture;
    use crate::repositories::{BookingRepository, SqlVenueRepository, VenueRepository};
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

    fn booking(id: &str, date: NaiveDate) -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId(id.to_string()),
            venue_id: VenueId("v-1".to_string()),
            event_date: date,
            start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
            event_type: "reception".to_string(),
            guest_count: 60,
            price: Decimal::from(5_000),
            customer_name: "Dana Reyes".to_string(),
            customer_email: "dana@example.com".to_string(),
            company_name: None,
            status: BookingStatus::Accepted,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_schedule_and_price() {
        let pool = setup().await;
        let repo = SqlBookingRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        repo.insert(booking("b-1", date)).await.expect("insert");

        let found = repo
            .find_by_id(&BookingId("b-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.event_date, date);
        assert_eq!(found.price, Decimal::from(5_000));
        assert_eq!(found.status, BookingStatus::Accepted);
    }

    #[tokio::test]
    async fn update_terms_rewrites_the_negotiated_fields() {
        let pool = setup().await;
        let repo = SqlBookingRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");
        repo.insert(booking("b-1", date)).await.expect("insert");

        let new_date = NaiveDate::from_ymd_opt(2026, 9, 19).expect("valid date");
        repo.update_terms(
            &BookingId("b-1".to_string()),
            &BookingSummary {
                event_date: new_date,
                start_time: NaiveTime::from_hms_opt(19, 0, 0).expect("valid time"),
                end_time: NaiveTime::from_hms_opt(23, 30, 0).expect("valid time"),
                guest_count: 75,
                event_type: "reception".to_string(),
                price: Decimal::from(5_500),
                customer_name: Some("Dana Reyes".to_string()),
                customer_email: Some("dana@example.com".to_string()),
                company_name: None,
                extras: Vec::new(),
                customer_note: None,
            },
            Utc::now(),
        )
        .await
        .expect("update terms");

        let found = repo
            .find_by_id(&BookingId("b-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.event_date, new_date);
        assert_eq!(found.guest_count, 75);
        assert_eq!(found.price, Decimal::from(5_500));
        assert_eq!(found.customer_name, "Dana Reyes", "contact fields are untouched");
    }

    #[tokio::test]
    async fn date_blocks_toggle_and_report() {
        let pool = setup().await;
        let repo = SqlBookingRepository::new(pool);
        let venue = VenueId("v-1".to_string());
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        assert!(!repo.is_date_blocked(&venue, date).await.expect("initially free"));

        repo.block_date(&venue, date, Some("booking"), Utc::now()).await.expect("block");
        assert!(repo.is_date_blocked(&venue, date).await.expect("blocked"));

        // Re-blocking the same date is an upsert, not an error.
        repo.block_date(&venue, date, Some("maintenance"), Utc::now()).await.expect("re-block");

        repo.unblock_date(&venue, date).await.expect("unblock");
        assert!(!repo.is_date_blocked(&venue, date).await.expect("free again"));
    }

    #[tokio::test]
    async fn daily_listing_returns_only_accepted_bookings() {
        let pool = setup().await;
        let repo = SqlBookingRepository::new(pool);
        let date = NaiveDate::from_ymd_opt(2026, 9, 12).expect("valid date");

        repo.insert(booking("b-1", date)).await.expect("insert accepted");
        let mut cancelled = booking("b-2", date);
        cancelled.status = BookingStatus::Cancelled;
        repo.insert(cancelled).await.expect("insert cancelled");
        repo.insert(booking("b-3", NaiveDate::from_ymd_opt(2026, 9, 13).expect("valid date")))
            .await
            .expect("insert other day");

        let listed = repo
            .list_accepted_on_date(&VenueId("v-1".to_string()), date)
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id.0, "b-1");
    }
}
