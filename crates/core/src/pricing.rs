//! Deterministic price calculation for a booking request.
//!
//! Precedence, first match wins for the base price:
//! 1. a named package from the owner's pricing rules,
//! 2. the rule-level base price plus any per-person rate,
//! 3. the venue's duration-tier fallback prices.
//!
//! A configured minimum spend then floors the base, and the platform fee is
//! added on top. The same inputs always produce the same breakdown; the
//! calculation is replayed when an owner later authorizes a counter-offer
//! at a different price.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::venue::{DurationPricing, PricingRules};

/// Platform commission applied to every base price.
const PLATFORM_FEE_PCT: u32 = 12;

/// Evening-rate duration ceiling used when the venue did not configure one.
const DEFAULT_EVENING_CEILING_HOURS: u32 = 6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub guest_count: u32,
    pub duration_hours: Decimal,
    pub event_type: Option<String>,
    pub package_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: Decimal,
    pub per_person_cost: Decimal,
    pub package_cost: Decimal,
    pub platform_fee: Decimal,
    pub total_price: Decimal,
}

/// Fee is rounded to the nearest whole unit, halves away from zero.
pub fn platform_fee(base_price: Decimal) -> Decimal {
    (base_price * Decimal::new(PLATFORM_FEE_PCT as i64, 2))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

pub fn calculate_price(
    request: &PriceRequest,
    rules: Option<&PricingRules>,
    fallback: &DurationPricing,
) -> PriceBreakdown {
    let mut base_price = Decimal::ZERO;
    let mut per_person_cost = Decimal::ZERO;
    let mut package_cost = Decimal::ZERO;
    let mut priced = false;

    if let (Some(rules), Some(package_name)) = (rules, request.package_name.as_deref()) {
        if let Some(package) = rules.find_package(package_name) {
            package_cost = if package.per_person {
                package.price * Decimal::from(request.guest_count)
            } else {
                package.price
            };
            base_price = package_cost;
            priced = true;
        }
    }

    if !priced {
        if let Some(rule_base) = rules.and_then(|rules| rules.base_price) {
            base_price = rule_base;
            if let Some(rate) = rules.and_then(|rules| rules.per_person_rate) {
                per_person_cost = rate * Decimal::from(request.guest_count);
                base_price += per_person_cost;
            }
            priced = true;
        }
    }

    if !priced {
        base_price = duration_tier_price(request.duration_hours, fallback);
    }

    if let Some(minimum_spend) = rules.and_then(|rules| rules.minimum_spend) {
        if base_price < minimum_spend {
            base_price = minimum_spend;
        }
    }

    let platform_fee = platform_fee(base_price);

    PriceBreakdown {
        base_price,
        per_person_cost,
        package_cost,
        platform_fee,
        total_price: base_price + platform_fee,
    }
}

/// Duration-threshold selection over the venue's fallback tiers. Missing
/// tiers are skipped in favor of the next available one; no configured tier
/// yields zero.
fn duration_tier_price(duration_hours: Decimal, pricing: &DurationPricing) -> Decimal {
    let evening_ceiling =
        Decimal::from(pricing.evening_cutoff_hours.unwrap_or(DEFAULT_EVENING_CEILING_HOURS));

    if pricing.evening_only() && duration_hours <= evening_ceiling {
        if let Some(evening) = pricing.price_evening {
            return evening;
        }
    }

    if duration_hours <= Decimal::from(4u32) {
        if let Some(hourly) = pricing.price_per_hour {
            return hourly * duration_hours;
        }
    }

    if duration_hours <= Decimal::from(5u32) {
        if let Some(half_day) = pricing.price_half_day {
            return half_day;
        }
    }

    if let Some(full_day) = pricing.price_full_day {
        return full_day;
    }

    if duration_hours <= evening_ceiling {
        if let Some(evening) = pricing.price_evening {
            return evening;
        }
    }

    if let Some(half_day) = pricing.price_half_day {
        return half_day;
    }

    if let Some(hourly) = pricing.price_per_hour {
        return hourly * duration_hours;
    }

    Decimal::ZERO
}
