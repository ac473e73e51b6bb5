//! Signals: one normalized observation from a provider, alive for a single
//! refresh cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo;
use crate::ranking::{Entity, Period, RankingCategory};

/// Best-effort attribution of a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribution {
    /// A place. The signal scores at the finest level present.
    Place {
        country_code: String,
        state: Option<String>,
        city: Option<String>,
    },
    /// Free text; the topic extractor turns these into subjects.
    Topic(String),
}

impl Attribution {
    #[must_use]
    pub fn country(code: &str) -> Self {
        Attribution::Place {
            country_code: code.to_string(),
            state: None,
            city: None,
        }
    }

    /// The place entity this attribution scores against, or `None` for
    /// topic attributions.
    ///
    /// A city without a state yields a parent-less city; the assembler
    /// decides what to do with it.
    #[must_use]
    pub fn place_entity(&self) -> Option<Entity> {
        let Attribution::Place {
            country_code,
            state,
            city,
        } = self
        else {
            return None;
        };
        let country_name = geo::country_name(country_code).unwrap_or(country_code.as_str());
        let entity = match (state.as_deref(), city.as_deref()) {
            (state, Some(city)) => Entity::city(country_code, state, city),
            (Some(state), None) => Entity::state(country_code, country_name, state),
            (None, None) => Entity::country(country_code, country_name),
        };
        Some(entity)
    }
}

/// One normalized observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Provider id, e.g. `open_meteo`.
    pub provider: String,
    pub category: RankingCategory,
    /// Headline or metric label.
    pub title: String,
    /// Normalized magnitude (article count, degrees from baseline,
    /// percent move). `None` when the provider omitted it.
    pub magnitude: Option<f64>,
    /// The provider's configured reliability weight.
    pub reliability: f64,
    pub observed_at: DateTime<Utc>,
    pub attribution: Attribution,
}

/// How far back an adapter may look for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub category: RankingCategory,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// A window covering `period` and ending at `now`.
    #[must_use]
    pub fn for_period(category: RankingCategory, period: Period, now: DateTime<Utc>) -> Self {
        Self {
            category,
            start: period.start(now),
            end: now,
        }
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::EntityType;

    fn place(country: &str, state: Option<&str>, city: Option<&str>) -> Attribution {
        Attribution::Place {
            country_code: country.to_string(),
            state: state.map(str::to_string),
            city: city.map(str::to_string),
        }
    }

    #[test]
    fn country_attribution_uses_display_name() {
        let entity = Attribution::country("KW").place_entity().unwrap();
        assert_eq!(entity.entity_type, EntityType::Country);
        assert_eq!(entity.name, "Kuwait");
        assert_eq!(entity.country_code.as_deref(), Some("KW"));
        assert!(entity.parent.is_none());
    }

    #[test]
    fn unknown_country_code_falls_back_to_code() {
        let entity = Attribution::country("ZZ").place_entity().unwrap();
        assert_eq!(entity.name, "ZZ");
    }

    #[test]
    fn state_attribution_points_at_country_name() {
        let entity = place("US", Some("Texas"), None).place_entity().unwrap();
        assert_eq!(entity.entity_type, EntityType::State);
        assert_eq!(entity.parent.as_deref(), Some("United States"));
    }

    #[test]
    fn city_attribution_points_at_state() {
        let entity = place("US", Some("Texas"), Some("Austin"))
            .place_entity()
            .unwrap();
        assert_eq!(entity.entity_type, EntityType::City);
        assert_eq!(entity.parent.as_deref(), Some("Texas"));
    }

    #[test]
    fn city_without_state_has_no_parent() {
        let entity = place("US", None, Some("Austin")).place_entity().unwrap();
        assert!(entity.parent.is_none());
    }

    #[test]
    fn topic_attribution_has_no_place_entity() {
        assert!(Attribution::Topic("Bitcoin".to_string())
            .place_entity()
            .is_none());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc::now();
        let window = TimeWindow::for_period(RankingCategory::Crime, Period::Today, now);
        assert!(window.contains(now));
        assert!(window.contains(window.start));
        assert!(!window.contains(now + chrono::TimeDelta::seconds(1)));
    }
}
