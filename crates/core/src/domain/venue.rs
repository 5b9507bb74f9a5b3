use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

/// Duration-tier fallback prices configured at the venue level. Any tier may
/// be absent; the pricing engine skips missing tiers in favor of the next
/// available one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationPricing {
    pub price_per_hour: Option<Decimal>,
    pub price_half_day: Option<Decimal>,
    pub price_full_day: Option<Decimal>,
    pub price_evening: Option<Decimal>,
    /// Longest event duration (hours) the evening rate covers.
    pub evening_cutoff_hours: Option<u32>,
}

impl DurationPricing {
    pub fn is_empty(&self) -> bool {
        self.price_per_hour.is_none()
            && self.price_half_day.is_none()
            && self.price_full_day.is_none()
            && self.price_evening.is_none()
    }

    /// The evening rate is the only configured price.
    pub fn evening_only(&self) -> bool {
        self.price_evening.is_some()
            && self.price_per_hour.is_none()
            && self.price_half_day.is_none()
            && self.price_full_day.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingPackage {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub per_person: bool,
}

/// Owner-configured pricing rules. Read-only input to the pricing engine;
/// mutated only by the venue-settings surface.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingRules {
    pub base_price: Option<Decimal>,
    pub per_person_rate: Option<Decimal>,
    pub minimum_spend: Option<Decimal>,
    #[serde(default)]
    pub packages: Vec<PricingPackage>,
}

impl PricingRules {
    pub fn find_package(&self, name: &str) -> Option<&PricingPackage> {
        let wanted = name.trim().to_ascii_lowercase();
        self.packages.iter().find(|package| package.name.trim().to_ascii_lowercase() == wanted)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
    pub capacity: u32,
    pub amenities: Vec<String>,
    pub parking_info: Option<String>,
    pub duration_pricing: DurationPricing,
    pub pricing_rules: Option<PricingRules>,
    pub faq: Vec<FaqEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Venue {
    /// Case-insensitive substring match of the topic against configured
    /// question/answer pairs.
    pub fn find_faq(&self, topic: &str) -> Option<&FaqEntry> {
        let needle = topic.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.faq.iter().find(|entry| {
            let question = entry.question.to_ascii_lowercase();
            question.contains(&needle) || needle.contains(question.trim_end_matches('?'))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{DurationPricing, FaqEntry, OwnerId, PricingPackage, PricingRules, Venue, VenueId};

    fn venue_fixture() -> Venue {
        Venue {
            id: VenueId("v-1".to_string()),
            owner_id: OwnerId("owner-1".to_string()),
            name: "Harbor Loft".to_string(),
            description: Some("Waterfront event loft".to_string()),
            capacity: 120,
            amenities: vec!["projector".to_string(), "stage".to_string()],
            parking_info: Some("Garage next door, 80 spots".to_string()),
            duration_pricing: DurationPricing::default(),
            pricing_rules: None,
            faq: vec![FaqEntry {
                question: "Is outside catering allowed?".to_string(),
                answer: "Yes, with a licensed caterer.".to_string(),
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn faq_lookup_is_case_insensitive_substring() {
        let venue = venue_fixture();
        let entry = venue.find_faq("CATERING").expect("should match");
        assert!(entry.answer.contains("licensed caterer"));
        assert!(venue.find_faq("wifi").is_none());
        assert!(venue.find_faq("").is_none());
    }

    #[test]
    fn package_lookup_ignores_case_and_padding() {
        let rules = PricingRules {
            packages: vec![PricingPackage {
                name: "Gold Evening".to_string(),
                price: Decimal::new(450_000, 2),
                per_person: false,
            }],
            ..PricingRules::default()
        };

        assert!(rules.find_package("gold evening").is_some());
        assert!(rules.find_package("  GOLD EVENING ").is_some());
        assert!(rules.find_package("silver").is_none());
    }

    #[test]
    fn duration_pricing_emptiness_and_evening_only() {
        let mut pricing = DurationPricing::default();
        assert!(pricing.is_empty());
        assert!(!pricing.evening_only());

        pricing.price_evening = Some(Decimal::new(200_000, 2));
        assert!(!pricing.is_empty());
        assert!(pricing.evening_only());

        pricing.price_per_hour = Some(Decimal::new(10_000, 2));
        assert!(!pricing.evening_only());
    }
}
