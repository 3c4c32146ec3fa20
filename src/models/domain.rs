use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub type ListingId = u64;
pub type OwnerId = u64;
pub type MatchId = Uuid;

/// What the listing owner wants to do with the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    Give,
    Swap,
    Request,
}

impl ExchangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Give => "give",
            ExchangeType::Swap => "swap",
            ExchangeType::Request => "request",
        }
    }

    /// Exchange types a listing of this type can be paired with
    pub fn counterparts(&self) -> &'static [ExchangeType] {
        match self {
            ExchangeType::Give => &[ExchangeType::Request],
            ExchangeType::Swap => &[ExchangeType::Swap, ExchangeType::Request],
            ExchangeType::Request => &[ExchangeType::Give, ExchangeType::Swap],
        }
    }

    pub fn is_compatible_with(&self, other: ExchangeType) -> bool {
        self.counterparts().contains(&other)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "give" | "giveaway" | "give_away" | "give-away" => Some(ExchangeType::Give),
            "swap" | "exchange" => Some(ExchangeType::Swap),
            "request" | "wanted" => Some(ExchangeType::Request),
            _ => None,
        }
    }
}

/// Physical condition of an item, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
}

impl Condition {
    /// 0 for `New` up to 3 for `Fair`
    pub fn grade(&self) -> usize {
        match self {
            Condition::New => 0,
            Condition::LikeNew => 1,
            Condition::Good => 2,
            Condition::Fair => 3,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "new" => Some(Condition::New),
            "like_new" => Some(Condition::LikeNew),
            "good" => Some(Condition::Good),
            "fair" => Some(Condition::Fair),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Matched,
    Closed,
}

impl ListingStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "active" | "publish" => Some(ListingStatus::Active),
            "matched" => Some(ListingStatus::Matched),
            "closed" | "draft" | "trash" => Some(ListingStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Estimated value interval in the platform currency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max
    }
}

/// Historical exchange record of a listing owner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OwnerStats {
    #[serde(default)]
    pub completed_exchanges: u32,
    #[serde(default)]
    pub completion_rate: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
}

/// An exchange listing as supplied by the listing repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    #[serde(default)]
    pub title: String,
    pub exchange_type: ExchangeType,
    /// `/`-separated category path, root first
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub value_range: Option<ValueRange>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub urgency: Option<u8>,
    #[serde(default)]
    pub co2_saved_kg: Option<f64>,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub owner_stats: Option<OwnerStats>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Category path split into its non-empty segments
    pub fn category_path(&self) -> Vec<&str> {
        self.category
            .as_deref()
            .map(|c| {
                c.split('/')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    /// Build a listing from a loosely-typed repository document.
    ///
    /// Only `id`, `exchange_type` and `owner_id` are mandatory. Every other
    /// attribute that is missing or malformed becomes `None` (or a sensible
    /// default) so one bad meta value never drops the listing.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let meta = doc.get("meta").unwrap_or(doc);
        let field = |key: &str| meta.get(key).or_else(|| doc.get(key));

        let id = field("id").and_then(as_u64)?;
        let exchange_type = field("exchange_type")
            .and_then(Value::as_str)
            .and_then(ExchangeType::parse)?;
        let owner_id = field("owner_id")
            .or_else(|| doc.get("author"))
            .and_then(as_u64)?;

        let title = match doc.get("title") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(o)) => o
                .get("rendered")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };

        let category = field("category")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let coordinates = match (
            field("latitude").and_then(as_f64),
            field("longitude").and_then(as_f64),
        ) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude })
                .filter(Coordinates::is_valid),
            _ => None,
        };

        let value_range = match (
            field("value_min").and_then(as_f64),
            field("value_max").and_then(as_f64),
        ) {
            (Some(min), Some(max)) => Some(ValueRange { min, max }).filter(ValueRange::is_valid),
            (Some(v), None) | (None, Some(v)) => {
                Some(ValueRange { min: v, max: v }).filter(ValueRange::is_valid)
            }
            _ => None,
        };

        let owner_stats = field("owner_stats")
            .and_then(|v| serde_json::from_value::<OwnerStats>(v.clone()).ok());

        let now = Utc::now();
        let created_at = field("created_at")
            .or_else(|| doc.get("date_gmt"))
            .and_then(as_datetime)
            .unwrap_or(now);
        let updated_at = field("updated_at")
            .or_else(|| doc.get("modified_gmt"))
            .and_then(as_datetime)
            .unwrap_or(created_at);

        Some(Listing {
            id,
            title,
            exchange_type,
            category,
            condition: field("condition")
                .and_then(Value::as_str)
                .and_then(Condition::parse),
            value_range,
            coordinates,
            urgency: field("urgency")
                .and_then(as_u64)
                .and_then(|u| u8::try_from(u).ok()),
            co2_saved_kg: field("co2_saved_kg")
                .and_then(as_f64)
                .filter(|v| *v >= 0.0),
            owner_id,
            owner_stats,
            status: field("status")
                .and_then(Value::as_str)
                .and_then(ListingStatus::parse)
                .unwrap_or(ListingStatus::Active),
            created_at,
            updated_at,
        })
    }
}

// WordPress post meta arrives as strings as often as numbers.
fn as_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_datetime(v: &Value) -> Option<DateTime<Utc>> {
    let raw = v.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
}

/// One dimension of compatibility between two listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CategoryMatch,
    LocationProximity,
    EnvironmentalImpact,
    ConditionCompatibility,
    ValueRangeOverlap,
    Urgency,
    UserCompatibility,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::CategoryMatch,
        Feature::LocationProximity,
        Feature::EnvironmentalImpact,
        Feature::ConditionCompatibility,
        Feature::ValueRangeOverlap,
        Feature::Urgency,
        Feature::UserCompatibility,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::CategoryMatch => "category_match",
            Feature::LocationProximity => "location_proximity",
            Feature::EnvironmentalImpact => "environmental_impact",
            Feature::ConditionCompatibility => "condition_compatibility",
            Feature::ValueRangeOverlap => "value_range_overlap",
            Feature::Urgency => "urgency",
            Feature::UserCompatibility => "user_compatibility",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-pair compatibility features, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub category_match: f64,
    pub location_proximity: f64,
    pub environmental_impact: f64,
    pub condition_compatibility: f64,
    pub value_range_overlap: f64,
    pub urgency: f64,
    pub user_compatibility: f64,
    /// Great-circle distance between the listings when both are located
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::CategoryMatch => self.category_match,
            Feature::LocationProximity => self.location_proximity,
            Feature::EnvironmentalImpact => self.environmental_impact,
            Feature::ConditionCompatibility => self.condition_compatibility,
            Feature::ValueRangeOverlap => self.value_range_overlap,
            Feature::Urgency => self.urgency,
            Feature::UserCompatibility => self.user_compatibility,
        }
    }
}

/// Relative importance of each feature. Committed weights always sum to 1.0.
///
/// Aliases accept the option keys used by the WordPress admin sliders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(alias = "weight_category_match")]
    pub category_match: f64,
    #[serde(alias = "weight_location_proximity")]
    pub location_proximity: f64,
    #[serde(alias = "weight_environmental_impact")]
    pub environmental_impact: f64,
    #[serde(alias = "weight_item_condition")]
    pub condition_compatibility: f64,
    #[serde(alias = "weight_value_range")]
    pub value_range_overlap: f64,
    #[serde(alias = "weight_urgency")]
    pub urgency: f64,
    #[serde(alias = "weight_user_compatibility")]
    pub user_compatibility: f64,
}

impl Weights {
    pub fn zero() -> Self {
        Self {
            category_match: 0.0,
            location_proximity: 0.0,
            environmental_impact: 0.0,
            condition_compatibility: 0.0,
            value_range_overlap: 0.0,
            urgency: 0.0,
            user_compatibility: 0.0,
        }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::CategoryMatch => self.category_match,
            Feature::LocationProximity => self.location_proximity,
            Feature::EnvironmentalImpact => self.environmental_impact,
            Feature::ConditionCompatibility => self.condition_compatibility,
            Feature::ValueRangeOverlap => self.value_range_overlap,
            Feature::Urgency => self.urgency,
            Feature::UserCompatibility => self.user_compatibility,
        }
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        let slot = match feature {
            Feature::CategoryMatch => &mut self.category_match,
            Feature::LocationProximity => &mut self.location_proximity,
            Feature::EnvironmentalImpact => &mut self.environmental_impact,
            Feature::ConditionCompatibility => &mut self.condition_compatibility,
            Feature::ValueRangeOverlap => &mut self.value_range_overlap,
            Feature::Urgency => &mut self.urgency,
            Feature::UserCompatibility => &mut self.user_compatibility,
        };
        *slot = value;
    }

    pub fn sum(&self) -> f64 {
        Feature::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            category_match: 0.25,
            location_proximity: 0.20,
            environmental_impact: 0.15,
            condition_compatibility: 0.10,
            value_range_overlap: 0.10,
            urgency: 0.05,
            user_compatibility: 0.15,
        }
    }
}

/// Weights submitted from the admin sliders; absent entries keep their
/// current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialWeights {
    #[serde(default, alias = "weight_category_match")]
    pub category_match: Option<f64>,
    #[serde(default, alias = "weight_location_proximity")]
    pub location_proximity: Option<f64>,
    #[serde(default, alias = "weight_environmental_impact")]
    pub environmental_impact: Option<f64>,
    #[serde(default, alias = "weight_item_condition")]
    pub condition_compatibility: Option<f64>,
    #[serde(default, alias = "weight_value_range")]
    pub value_range_overlap: Option<f64>,
    #[serde(default, alias = "weight_urgency")]
    pub urgency: Option<f64>,
    #[serde(default, alias = "weight_user_compatibility")]
    pub user_compatibility: Option<f64>,
}

impl PartialWeights {
    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::CategoryMatch => self.category_match,
            Feature::LocationProximity => self.location_proximity,
            Feature::EnvironmentalImpact => self.environmental_impact,
            Feature::ConditionCompatibility => self.condition_compatibility,
            Feature::ValueRangeOverlap => self.value_range_overlap,
            Feature::Urgency => self.urgency,
            Feature::UserCompatibility => self.user_compatibility,
        }
    }

    /// Overlay the provided entries on `base`
    pub fn apply_to(&self, base: &Weights) -> Weights {
        let mut merged = *base;
        for feature in Feature::ALL {
            if let Some(value) = self.get(feature) {
                merged.set(feature, value);
            }
        }
        merged
    }
}

/// A versioned, normalized weight configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub version: u64,
    pub weights: Weights,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a proposed match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchState {
    Proposed,
    Viewed,
    Contacted,
    Completed,
    Declined,
    Expired,
}

impl MatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchState::Completed | MatchState::Declined | MatchState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::Proposed => "proposed",
            MatchState::Viewed => "viewed",
            MatchState::Contacted => "contacted",
            MatchState::Completed => "completed",
            MatchState::Declined => "declined",
            MatchState::Expired => "expired",
        }
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchEvent {
    Viewed,
    Contacted,
    Completed,
    Declined,
    /// Raised by the lifecycle manager itself once the TTL has elapsed
    Expire,
}

impl MatchEvent {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "viewed" | "view" => Some(MatchEvent::Viewed),
            "contacted" | "contact" => Some(MatchEvent::Contacted),
            "completed" | "complete" => Some(MatchEvent::Completed),
            "declined" | "decline" => Some(MatchEvent::Declined),
            _ => None,
        }
    }
}

impl fmt::Display for MatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchEvent::Viewed => "viewed",
            MatchEvent::Contacted => "contacted",
            MatchEvent::Completed => "completed",
            MatchEvent::Declined => "declined",
            MatchEvent::Expire => "expire",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: MatchState,
    pub to: MatchState,
    pub at: DateTime<Utc>,
}

/// A scored, stateful proposal pairing two listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub source_listing_id: ListingId,
    pub candidate_listing_id: ListingId,
    pub score: f64,
    pub features: FeatureVector,
    /// Exact weights the score was computed with
    pub weights: WeightVector,
    pub state: MatchState,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn pair(&self) -> ListingPair {
        ListingPair::new(self.source_listing_id, self.candidate_listing_id)
    }
}

/// Unordered pair of listing ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingPair(ListingId, ListingId);

impl ListingPair {
    pub fn new(a: ListingId, b: ListingId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn contains(&self, id: ListingId) -> bool {
        self.0 == id || self.1 == id
    }

    /// The listing paired with `id`, if `id` is part of this pair
    pub fn other(&self, id: ListingId) -> Option<ListingId> {
        if self.0 == id {
            Some(self.1)
        } else if self.1 == id {
            Some(self.0)
        } else {
            None
        }
    }
}

/// Training example derived from an archived match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub match_id: MatchId,
    pub features: FeatureVector,
    pub weight_version: u64,
    pub final_state: MatchState,
    /// Seconds from proposal to the terminal transition
    pub time_to_close_secs: i64,
    pub closed_at: DateTime<Utc>,
}

impl OutcomeSample {
    pub fn from_archived(m: &Match) -> Self {
        Self {
            match_id: m.id,
            features: m.features,
            weight_version: m.weights.version,
            final_state: m.state,
            time_to_close_secs: (m.updated_at - m.created_at).num_seconds().max(0),
            closed_at: m.updated_at,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.final_state == MatchState::Completed
    }
}
