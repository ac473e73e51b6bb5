//! Reading-to-magnitude mapping shared by the weather adapters.

use chrono::{DateTime, Utc};
use pulse_core::{RankingCategory, Signal, WeatherPoint, CALM_BASELINE_KMH, COLD_BASELINE_C};

pub(crate) const CATEGORIES: &[RankingCategory] = &[
    RankingCategory::Hottest,
    RankingCategory::Coldest,
    RankingCategory::Calmest,
];

/// Current conditions at one weather point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Reading {
    pub temperature_c: f64,
    pub wind_kmh: f64,
    pub observed_at: DateTime<Utc>,
}

/// Magnitude of a reading for a weather category.
///
/// Hotter is larger for `hottest`; `coldest` and `calmest` measure the
/// distance below their baselines. A reading at or above the baseline has
/// nothing to measure and yields `None`, so the place is not ranked.
pub(crate) fn magnitude(category: RankingCategory, reading: &Reading) -> Option<f64> {
    let below = |baseline: f64, value: f64| {
        let depth = baseline - value;
        (depth > 0.0).then_some(depth)
    };
    match category {
        RankingCategory::Hottest => Some(reading.temperature_c),
        RankingCategory::Coldest => below(COLD_BASELINE_C, reading.temperature_c),
        RankingCategory::Calmest => below(CALM_BASELINE_KMH, reading.wind_kmh),
        _ => None,
    }
}

pub(crate) fn reading_signal(
    provider: &str,
    category: RankingCategory,
    reliability: f64,
    point: &WeatherPoint,
    reading: &Reading,
) -> Option<Signal> {
    let magnitude = magnitude(category, reading)?;
    Some(Signal {
        provider: provider.to_string(),
        category,
        title: format!(
            "{}: {:.1}°C, wind {:.0} km/h",
            point.label, reading.temperature_c, reading.wind_kmh
        ),
        magnitude: Some(magnitude),
        reliability,
        observed_at: reading.observed_at,
        attribution: point.attribution.clone(),
    })
}

#[cfg(test)]
mod tests {
    use pulse_core::Attribution;

    use super::*;

    fn reading(temperature_c: f64, wind_kmh: f64) -> Reading {
        Reading {
            temperature_c,
            wind_kmh,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn magnitudes_follow_baselines() {
        let r = reading(-5.0, 12.0);
        assert_eq!(magnitude(RankingCategory::Hottest, &r), Some(-5.0));
        assert_eq!(magnitude(RankingCategory::Coldest, &r), Some(30.0));
        assert_eq!(magnitude(RankingCategory::Calmest, &r), Some(48.0));
        assert_eq!(magnitude(RankingCategory::Crime, &r), None);
    }

    #[test]
    fn hot_and_windy_readings_are_not_ranked() {
        let r = reading(40.0, 95.0);
        assert_eq!(magnitude(RankingCategory::Coldest, &r), None);
        assert_eq!(magnitude(RankingCategory::Calmest, &r), None);

        let at_baseline = reading(COLD_BASELINE_C, CALM_BASELINE_KMH);
        assert_eq!(magnitude(RankingCategory::Coldest, &at_baseline), None);
        assert_eq!(magnitude(RankingCategory::Calmest, &at_baseline), None);
    }

    #[test]
    fn hot_place_is_absent_from_coldest() {
        let kuwait = WeatherPoint {
            label: "Kuwait".to_string(),
            lat: 29.3,
            lon: 47.5,
            attribution: Attribution::country("KW"),
        };
        let r = reading(50.0, 10.0);
        assert!(reading_signal("open_meteo", RankingCategory::Coldest, 0.9, &kuwait, &r).is_none());
        assert!(reading_signal("open_meteo", RankingCategory::Hottest, 0.9, &kuwait, &r).is_some());
    }

    #[test]
    fn signal_carries_point_attribution() {
        let point = WeatherPoint {
            label: "Kuwait".to_string(),
            lat: 29.3,
            lon: 47.5,
            attribution: Attribution::country("KW"),
        };
        let signal =
            reading_signal("open_meteo", RankingCategory::Hottest, 0.9, &point, &reading(52.0, 10.0))
                .unwrap();
        assert_eq!(signal.attribution, Attribution::country("KW"));
        assert_eq!(signal.magnitude, Some(52.0));
        assert_eq!(signal.title, "Kuwait: 52.0°C, wind 10 km/h");
    }
}
