use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use venuely_core::domain::venue::{
    DurationPricing, FaqEntry, OwnerId, PricingRules, Venue, VenueId,
};

use super::{RepositoryError, VenueRepository};
use crate::DbPool;

pub struct SqlVenueRepository {
    pool: DbPool,
}

impl SqlVenueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn parse_decimal_opt(raw: Option<String>, column: &str) -> Result<Option<Decimal>, RepositoryError> {
    raw.map(|value| {
        value
            .parse::<Decimal>()
            .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
    })
    .transpose()
}

fn decimal_to_text(value: Option<Decimal>) -> Option<String> {
    value.map(|value| value.to_string())
}

fn row_to_venue(row: &sqlx::sqlite::SqliteRow) -> Result<Venue, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let owner_id: String = row.try_get("owner_id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let description: Option<String> = row.try_get("description").map_err(decode)?;
    let capacity: i64 = row.try_get("capacity").map_err(decode)?;
    let amenities_raw: String = row.try_get("amenities").map_err(decode)?;
    let parking_info: Option<String> = row.try_get("parking_info").map_err(decode)?;
    let price_per_hour: Option<String> = row.try_get("price_per_hour").map_err(decode)?;
    let price_half_day: Option<String> = row.try_get("price_half_day").map_err(decode)?;
    let price_full_day: Option<String> = row.try_get("price_full_day").map_err(decode)?;
    let price_evening: Option<String> = row.try_get("price_evening").map_err(decode)?;
    let evening_cutoff_hours: Option<i64> = row.try_get("evening_cutoff_hours").map_err(decode)?;
    let pricing_rules_raw: Option<String> = row.try_get("pricing_rules").map_err(decode)?;
    let faq_raw: String = row.try_get("faq").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let amenities: Vec<String> = serde_json::from_str(&amenities_raw)
        .map_err(|e| RepositoryError::Decode(format!("amenities: {e}")))?;
    let faq: Vec<FaqEntry> =
        serde_json::from_str(&faq_raw).map_err(|e| RepositoryError::Decode(format!("faq: {e}")))?;
    let pricing_rules: Option<PricingRules> = pricing_rules_raw
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("pricing_rules: {e}")))?;

    Ok(Venue {
        id: VenueId(id),
        owner_id: OwnerId(owner_id),
        name,
        description,
        capacity: capacity.max(0) as u32,
        amenities,
        parking_info,
        duration_pricing: DurationPricing {
            price_per_hour: parse_decimal_opt(price_per_hour, "price_per_hour")?,
            price_half_day: parse_decimal_opt(price_half_day, "price_half_day")?,
            price_full_day: parse_decimal_opt(price_full_day, "price_full_day")?,
            price_evening: parse_decimal_opt(price_evening, "price_evening")?,
            evening_cutoff_hours: evening_cutoff_hours.map(|value| value.max(0) as u32),
        },
        pricing_rules,
        faq,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

const VENUE_COLUMNS: &str = "id, owner_id, name, description, capacity, amenities, parking_info, \
     price_per_hour, price_half_day, price_full_day, price_evening, evening_cutoff_hours, \
     pricing_rules, faq, created_at, updated_at";

#[async_trait::async_trait]
impl VenueRepository for SqlVenueRepository {
    async fn find_by_id(&self, id: &VenueId) -> Result<Option<Venue>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {VENUE_COLUMNS} FROM venue WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_venue(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, venue: Venue) -> Result<(), RepositoryError> {
        let amenities = serde_json::to_string(&venue.amenities)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let faq = serde_json::to_string(&venue.faq)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let pricing_rules = venue
            .pricing_rules
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO venue (id, owner_id, name, description, capacity, amenities, parking_info,
                                price_per_hour, price_half_day, price_full_day, price_evening,
                                evening_cutoff_hours, pricing_rules, faq, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 name = excluded.name,
                 description = excluded.description,
                 capacity = excluded.capacity,
                 amenities = excluded.amenities,
                 parking_info = excluded.parking_info,
                 price_per_hour = excluded.price_per_hour,
                 price_half_day = excluded.price_half_day,
                 price_full_day = excluded.price_full_day,
                 price_evening = excluded.price_evening,
                 evening_cutoff_hours = excluded.evening_cutoff_hours,
                 pricing_rules = excluded.pricing_rules,
                 faq = excluded.faq,
                 updated_at = excluded.updated_at",
        )
        .bind(&venue.id.0)
        .bind(&venue.owner_id.0)
        .bind(&venue.name)
        .bind(&venue.description)
        .bind(venue.capacity as i64)
        .bind(amenities)
        .bind(&venue.parking_info)
        .bind(decimal_to_text(venue.duration_pricing.price_per_hour))
        .bind(decimal_to_text(venue.duration_pricing.price_half_day))
        .bind(decimal_to_text(venue.duration_pricing.price_full_day))
        .bind(decimal_to_text(venue.duration_pricing.price_evening))
        .bind(venue.duration_pricing.evening_cutoff_hours.map(|value| value as i64))
        .bind(pricing_rules)
        .bind(faq)
        .bind(venue.created_at.to_rfc3339())
        .bind(venue.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn search(
        &self,
        min_capacity: Option<u32>,
        exclude: Option<&VenueId>,
        limit: u32,
    ) -> Result<Vec<Venue>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {VENUE_COLUMNS} FROM venue
             WHERE capacity >= ? AND id != ?
             ORDER BY capacity ASC, name ASC
             LIMIT ?",
        ))
        .bind(min_capacity.unwrap_or(0) as i64)
        .bind(exclude.map(|id| id.0.as_str()).unwrap_or(""))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_venue).collect()
    }
}
