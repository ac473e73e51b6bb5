//! Pulse score computation.
//!
//! `H = Σ (V × R) × e^(−λ·t)` where `t` is the signal's age measured in
//! period lengths. Missing, negative or non-finite inputs count as zero.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pulse_core::{Attribution, Entity, EntityType, Period, RankingBasis, RankingCategory, Signal};

use crate::keywords::{extract, title_mentions};

/// Score of one entity for one period, plus what the display needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseScore {
    pub value: f64,
    pub signal_count: usize,
    /// Largest clamped magnitude among the signals.
    pub peak: f64,
    /// Title of the signal with the largest weighted contribution.
    pub top_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntity {
    pub entity: Entity,
    pub score: PulseScore,
}

fn non_negative(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        x
    } else {
        0.0
    }
}

/// Age of an observation in period lengths; future timestamps are age 0.
#[allow(clippy::cast_precision_loss)]
fn age_in_periods(observed_at: DateTime<Utc>, period: Period, now: DateTime<Utc>) -> f64 {
    let elapsed = (now - observed_at).num_milliseconds().max(0) as f64;
    let length = period.length().num_milliseconds() as f64;
    elapsed / length
}

/// Score a set of signals for one entity.
///
/// Returns `None` for an empty set: an entity without signals is dropped,
/// never published with a zero score.
#[must_use]
pub fn score(signals: &[&Signal], period: Period, decay: f64, now: DateTime<Utc>) -> Option<PulseScore> {
    if signals.is_empty() {
        return None;
    }
    let decay = non_negative(decay);

    let mut value = 0.0;
    let mut peak = 0.0_f64;
    let mut top: Option<(f64, &str)> = None;

    for signal in signals {
        let v = non_negative(signal.magnitude.unwrap_or(0.0));
        let r = non_negative(signal.reliability);
        let t = age_in_periods(signal.observed_at, period, now);
        let contribution = v * r * (-decay * t).exp();

        value += contribution;
        peak = peak.max(v);
        if top.is_none_or(|(best, _)| contribution > best) {
            top = Some((contribution, signal.title.as_str()));
        }
    }

    Some(PulseScore {
        value,
        signal_count: signals.len(),
        peak,
        top_title: top.map(|(_, title)| title.to_string()),
    })
}

/// Ranking comparator: score descending, then name ascending, then
/// country code ascending with `None` first.
#[must_use]
pub fn rank_order(a: &ScoredEntity, b: &ScoredEntity) -> Ordering {
    b.score
        .value
        .total_cmp(&a.score.value)
        .then_with(|| a.entity.name.cmp(&b.entity.name))
        .then_with(|| a.entity.country_code.cmp(&b.entity.country_code))
}

/// Group a category's signals by entity and score each group.
///
/// Place categories group by the attributed place, each at its own level.
/// Topic categories extract subjects from the batch first; a subject's
/// signals are those whose text mentions it.
#[must_use]
pub fn score_signals(
    signals: &[Signal],
    category: RankingCategory,
    period: Period,
    decay: f64,
    now: DateTime<Utc>,
) -> Vec<ScoredEntity> {
    let groups = match category.basis() {
        RankingBasis::Place => group_by_place(signals),
        RankingBasis::Topic(entity_type) => group_by_topic(signals, category, entity_type),
    };
    groups
        .into_iter()
        .filter_map(|(entity, members)| {
            score(&members, period, decay, now).map(|score| ScoredEntity { entity, score })
        })
        .collect()
}

fn group_by_place(signals: &[Signal]) -> Vec<(Entity, Vec<&Signal>)> {
    let mut groups: Vec<(Entity, Vec<&Signal>)> = Vec::new();
    let mut index: HashMap<Entity, usize> = HashMap::new();
    for signal in signals {
        let Some(entity) = signal.attribution.place_entity() else {
            continue;
        };
        if let Some(&i) = index.get(&entity) {
            groups[i].1.push(signal);
        } else {
            index.insert(entity.clone(), groups.len());
            groups.push((entity, vec![signal]));
        }
    }
    groups
}

fn topic_text(signal: &Signal) -> Option<&str> {
    match &signal.attribution {
        Attribution::Topic(text) => Some(text.as_str()),
        Attribution::Place { .. } => None,
    }
}

fn group_by_topic(
    signals: &[Signal],
    category: RankingCategory,
    entity_type: EntityType,
) -> Vec<(Entity, Vec<&Signal>)> {
    let texts: Vec<&str> = signals.iter().filter_map(topic_text).collect();
    extract(&texts, category.stopword_exclusions())
        .into_iter()
        .map(|(topic, _)| {
            let members: Vec<&Signal> = signals
                .iter()
                .filter(|s| topic_text(s).is_some_and(|text| title_mentions(text, &topic)))
                .collect();
            (Entity::subject(entity_type, &topic), members)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn signal(
        category: RankingCategory,
        magnitude: Option<f64>,
        reliability: f64,
        age: TimeDelta,
        attribution: Attribution,
    ) -> Signal {
        Signal {
            provider: "test".to_string(),
            category,
            title: format!("reading {magnitude:?}"),
            magnitude,
            reliability,
            observed_at: now() - age,
            attribution,
        }
    }

    fn kw(magnitude: f64, reliability: f64) -> Signal {
        signal(
            RankingCategory::Hottest,
            Some(magnitude),
            reliability,
            TimeDelta::zero(),
            Attribution::country("KW"),
        )
    }

    fn scored(name: &str, code: Option<&str>, value: f64) -> ScoredEntity {
        ScoredEntity {
            entity: Entity {
                entity_type: EntityType::Country,
                name: name.to_string(),
                country_code: code.map(str::to_string),
                parent: None,
            },
            score: PulseScore {
                value,
                signal_count: 1,
                peak: value,
                top_title: None,
            },
        }
    }

    #[test]
    fn kuwait_heat_scenario_sums_weighted_readings() {
        let signals = [kw(52.0, 0.9), kw(54.0, 1.0), signal(
            RankingCategory::Hottest,
            Some(45.0),
            1.0,
            TimeDelta::zero(),
            Attribution::country("SA"),
        )];
        let mut entities = score_signals(&signals, RankingCategory::Hottest, Period::Today, 1.0, now());
        entities.sort_by(rank_order);

        assert_eq!(entities[0].entity.name, "Kuwait");
        assert!((entities[0].score.value - 100.8).abs() < 1e-9);
        assert_eq!(entities[0].score.signal_count, 2);
        assert!((entities[0].score.peak - 54.0).abs() < f64::EPSILON);
        assert_eq!(entities[1].entity.name, "Saudi Arabia");
    }

    #[test]
    fn empty_input_scores_none() {
        assert!(score(&[], Period::Today, 1.0, now()).is_none());
    }

    #[test]
    fn invalid_inputs_clamp_to_zero() {
        let missing = signal(RankingCategory::Crime, None, 1.0, TimeDelta::zero(), Attribution::country("US"));
        let negative = signal(RankingCategory::Crime, Some(-3.0), 1.0, TimeDelta::zero(), Attribution::country("US"));
        let nan = signal(RankingCategory::Crime, Some(f64::NAN), f64::NAN, TimeDelta::zero(), Attribution::country("US"));
        let s = score(&[&missing, &negative, &nan], Period::Today, 1.0, now()).unwrap();
        assert!(s.value.abs() < f64::EPSILON);
        assert_eq!(s.signal_count, 3);
    }

    #[test]
    fn one_period_old_signal_decays_by_e_to_minus_lambda() {
        let old = signal(RankingCategory::Crime, Some(10.0), 1.0, TimeDelta::days(7), Attribution::country("US"));
        let s = score(&[&old], Period::Week, 0.5, now()).unwrap();
        assert!((s.value - 10.0 * (-0.5_f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn future_signals_are_undecayed() {
        let future = signal(RankingCategory::Crime, Some(4.0), 1.0, TimeDelta::hours(-3), Attribution::country("US"));
        let s = score(&[&future], Period::Today, 2.0, now()).unwrap();
        assert!((s.value - 4.0).abs() < 1e-9);
    }

    #[test]
    fn top_title_is_largest_contribution() {
        let small = kw(10.0, 1.0);
        let mut big = kw(30.0, 1.0);
        big.title = "Heatwave peaks".to_string();
        let s = score(&[&small, &big], Period::Today, 1.0, now()).unwrap();
        assert_eq!(s.top_title.as_deref(), Some("Heatwave peaks"));
    }

    #[test]
    fn rank_order_breaks_ties_by_name_then_code() {
        let mut entities = vec![
            scored("Beta", Some("BB"), 5.0),
            scored("Alpha", Some("ZZ"), 5.0),
            scored("Alpha", None, 5.0),
            scored("Gamma", Some("GG"), 9.0),
        ];
        entities.sort_by(rank_order);
        let order: Vec<_> = entities
            .iter()
            .map(|e| (e.entity.name.as_str(), e.entity.country_code.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Gamma", Some("GG")),
                ("Alpha", None),
                ("Alpha", Some("ZZ")),
                ("Beta", Some("BB")),
            ]
        );
    }

    #[test]
    fn places_score_only_at_their_own_level() {
        let city = signal(
            RankingCategory::Crime,
            Some(1.0),
            1.0,
            TimeDelta::zero(),
            Attribution::Place {
                country_code: "US".to_string(),
                state: Some("Texas".to_string()),
                city: Some("Houston".to_string()),
            },
        );
        let entities = score_signals(&[city], RankingCategory::Crime, Period::Today, 1.0, now());
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity.entity_type, EntityType::City);
    }

    #[test]
    fn topic_categories_score_extracted_subjects() {
        let headline = |title: &str| {
            let mut s = signal(
                RankingCategory::Trending,
                Some(1.0),
                0.5,
                TimeDelta::zero(),
                Attribution::Topic(title.to_string()),
            );
            s.title = title.to_string();
            s
        };
        let signals = [
            headline("Bitcoin Surges Past $95K"),
            headline("Bitcoin Hits New High"),
            headline("Trending: Mars Rover Lands"),
        ];
        let mut entities =
            score_signals(&signals, RankingCategory::Trending, Period::Today, 1.0, now());
        entities.sort_by(rank_order);

        assert_eq!(entities[0].entity, Entity::subject(EntityType::Topic, "Bitcoin"));
        assert!((entities[0].score.value - 1.0).abs() < 1e-9);
        assert!(entities
            .iter()
            .all(|e| e.entity.name != "Trending" && e.entity.country_code.is_none()));
    }
}
