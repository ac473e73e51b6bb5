//! Ranking vocabulary: categories, periods, entities and persisted entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Temperature (°C) that `coldest` magnitudes are measured down from.
pub const COLD_BASELINE_C: f64 = 25.0;

/// Wind speed (km/h) that `calmest` magnitudes are measured down from.
pub const CALM_BASELINE_KMH: f64 = 60.0;

// ---------------------------------------------------------------------------
// RankingCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingCategory {
    Crime,
    Safest,
    Violent,
    Fun,
    Coldest,
    Hottest,
    Calmest,
    Business,
    Sports,
    Trending,
    Celebrity,
    Gossip,
    Funny,
}

/// What a category ranks: places in the drill-down hierarchy, or
/// extracted subjects of a given entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingBasis {
    Place,
    Topic(EntityType),
}

/// How the display stat of an entry is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatStyle {
    Reports,
    PeakTemperature,
    ColdDepth,
    CalmWind,
    MarketMove,
    Mentions,
}

impl RankingCategory {
    pub const ALL: [RankingCategory; 13] = [
        RankingCategory::Crime,
        RankingCategory::Safest,
        RankingCategory::Violent,
        RankingCategory::Fun,
        RankingCategory::Coldest,
        RankingCategory::Hottest,
        RankingCategory::Calmest,
        RankingCategory::Business,
        RankingCategory::Sports,
        RankingCategory::Trending,
        RankingCategory::Celebrity,
        RankingCategory::Gossip,
        RankingCategory::Funny,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RankingCategory::Crime => "crime",
            RankingCategory::Safest => "safest",
            RankingCategory::Violent => "violent",
            RankingCategory::Fun => "fun",
            RankingCategory::Coldest => "coldest",
            RankingCategory::Hottest => "hottest",
            RankingCategory::Calmest => "calmest",
            RankingCategory::Business => "business",
            RankingCategory::Sports => "sports",
            RankingCategory::Trending => "trending",
            RankingCategory::Celebrity => "celebrity",
            RankingCategory::Gossip => "gossip",
            RankingCategory::Funny => "funny",
        }
    }

    #[must_use]
    pub fn basis(self) -> RankingBasis {
        match self {
            RankingCategory::Trending | RankingCategory::Funny => {
                RankingBasis::Topic(EntityType::Topic)
            }
            RankingCategory::Celebrity | RankingCategory::Gossip => {
                RankingBasis::Topic(EntityType::Person)
            }
            RankingCategory::Sports => RankingBasis::Topic(EntityType::Match),
            _ => RankingBasis::Place,
        }
    }

    #[must_use]
    pub fn stat_style(self) -> StatStyle {
        match self {
            RankingCategory::Hottest => StatStyle::PeakTemperature,
            RankingCategory::Coldest => StatStyle::ColdDepth,
            RankingCategory::Calmest => StatStyle::CalmWind,
            RankingCategory::Business => StatStyle::MarketMove,
            RankingCategory::Crime
            | RankingCategory::Safest
            | RankingCategory::Violent
            | RankingCategory::Fun => StatStyle::Reports,
            _ => StatStyle::Mentions,
        }
    }

    /// Decay constant used when the catalogue does not override it.
    #[must_use]
    pub fn default_decay(self) -> f64 {
        match self {
            RankingCategory::Coldest | RankingCategory::Hottest | RankingCategory::Calmest => 0.5,
            RankingCategory::Business | RankingCategory::Trending => 1.5,
            _ => 1.0,
        }
    }

    /// Cron cadence used when the catalogue does not override it.
    #[must_use]
    pub fn default_cadence(self) -> &'static str {
        match self {
            RankingCategory::Coldest | RankingCategory::Hottest | RankingCategory::Calmest => {
                "0 */30 * * * *"
            }
            RankingCategory::Business => "0 0 * * * *",
            _ => "0 */15 * * * *",
        }
    }

    /// Words that would otherwise resurface as topics for this category.
    #[must_use]
    pub fn stopword_exclusions(self) -> &'static [&'static str] {
        match self {
            RankingCategory::Trending => &["trending", "viral", "news", "update"],
            RankingCategory::Celebrity => &["celebrity", "celebrities", "star", "stars", "hollywood"],
            RankingCategory::Gossip => &["gossip", "rumor", "rumors", "rumour", "drama"],
            RankingCategory::Funny => &["funny", "hilarious", "viral", "video", "watch"],
            RankingCategory::Sports => &["sports", "game", "match", "score", "scores", "live"],
            RankingCategory::Crime => &["crime"],
            RankingCategory::Safest => &["safest"],
            RankingCategory::Violent => &["violent"],
            RankingCategory::Fun => &["fun"],
            RankingCategory::Coldest => &["coldest"],
            RankingCategory::Hottest => &["hottest"],
            RankingCategory::Calmest => &["calmest"],
            RankingCategory::Business => &["business"],
        }
    }
}

impl fmt::Display for RankingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "category",
                value: s.to_string(),
            })
    }
}

impl StatStyle {
    /// Render the display stat for an entry.
    ///
    /// `peak` is the largest single clamped magnitude seen for the entity;
    /// for the baseline styles it is converted back into a reading.
    #[must_use]
    pub fn render(self, signal_count: usize, peak: f64) -> String {
        let plural = |n: usize, word: &str| {
            if n == 1 {
                format!("1 {word}")
            } else {
                format!("{n} {word}s")
            }
        };
        match self {
            StatStyle::Reports => plural(signal_count, "report"),
            StatStyle::Mentions => plural(signal_count, "mention"),
            StatStyle::PeakTemperature => format!("{peak:.1}°C"),
            StatStyle::ColdDepth => format!("{:.1}°C", COLD_BASELINE_C - peak),
            StatStyle::CalmWind => format!("{:.0} km/h wind", (CALM_BASELINE_KMH - peak).max(0.0)),
            StatStyle::MarketMove => format!("±{peak:.2}%"),
        }
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Today, Period::Week, Period::Month, Period::Year];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }

    /// Length of the window this period covers, ending at "now".
    #[must_use]
    pub fn length(self) -> TimeDelta {
        match self {
            Period::Today => TimeDelta::days(1),
            Period::Week => TimeDelta::days(7),
            Period::Month => TimeDelta::days(30),
            Period::Year => TimeDelta::days(365),
        }
    }

    /// Start of the period's window when it ends at `now`.
    #[must_use]
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.length()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "period",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// EntityType / Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Country,
    State,
    City,
    Topic,
    Person,
    Match,
    Show,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Country,
        EntityType::State,
        EntityType::City,
        EntityType::Topic,
        EntityType::Person,
        EntityType::Match,
        EntityType::Show,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Country => "country",
            EntityType::State => "state",
            EntityType::City => "city",
            EntityType::Topic => "topic",
            EntityType::Person => "person",
            EntityType::Match => "match",
            EntityType::Show => "show",
        }
    }

    /// The level a state or city must be nested under.
    #[must_use]
    pub fn parent_type(self) -> Option<EntityType> {
        match self {
            EntityType::State => Some(EntityType::Country),
            EntityType::City => Some(EntityType::State),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "entity type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Same,
}

impl Trend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Same => "same",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Trend::Up),
            "down" => Ok(Trend::Down),
            "same" => Ok(Trend::Same),
            other => Err(CoreError::UnknownVariant {
                kind: "trend",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A rankable subject, identified across cycles by its natural key (all
/// four fields), never by a stored id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub name: String,
    /// ISO-3166 alpha-2. For a country this is its own code; for a state
    /// or city it is the containing country.
    pub country_code: Option<String>,
    /// Name of the enclosing entity: the country's display name for a
    /// state, the state's name for a city.
    pub parent: Option<String>,
}

/// Ranking group within one `(category, period)` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub entity_type: EntityType,
    /// Containing country for state/city groups; `None` for the global
    /// country list and for topic-type groups.
    pub country_code: Option<String>,
    pub parent: Option<String>,
}

impl Entity {
    #[must_use]
    pub fn country(code: &str, name: &str) -> Self {
        Self {
            entity_type: EntityType::Country,
            name: name.to_string(),
            country_code: Some(code.to_string()),
            parent: None,
        }
    }

    #[must_use]
    pub fn state(country_code: &str, country_name: &str, name: &str) -> Self {
        Self {
            entity_type: EntityType::State,
            name: name.to_string(),
            country_code: Some(country_code.to_string()),
            parent: Some(country_name.to_string()),
        }
    }

    #[must_use]
    pub fn city(country_code: &str, state: Option<&str>, name: &str) -> Self {
        Self {
            entity_type: EntityType::City,
            name: name.to_string(),
            country_code: Some(country_code.to_string()),
            parent: state.map(str::to_string),
        }
    }

    #[must_use]
    pub fn subject(entity_type: EntityType, name: &str) -> Self {
        Self {
            entity_type,
            name: name.to_string(),
            country_code: None,
            parent: None,
        }
    }

    /// The group this entity is ranked within.
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        match self.entity_type {
            EntityType::State | EntityType::City => GroupKey {
                entity_type: self.entity_type,
                country_code: self.country_code.clone(),
                parent: self.parent.clone(),
            },
            _ => GroupKey {
                entity_type: self.entity_type,
                country_code: None,
                parent: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RankingEntry
// ---------------------------------------------------------------------------

/// One ranked row of a published snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub category: RankingCategory,
    pub entity: Entity,
    pub period: Period,
    /// 1-based, contiguous within the entry's group.
    pub rank: u32,
    pub stat: String,
    pub score: f64,
    pub trend: Trend,
    pub explanation: Option<String>,
    pub snapshot_at: DateTime<Utc>,
}

impl RankingEntry {
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        self.entity.group_key()
    }
}
