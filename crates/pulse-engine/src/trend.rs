//! Trend arrows against the previously published snapshot.

use std::collections::HashMap;

use pulse_core::{Entity, RankingEntry, Trend};

/// Annotate `current` with trends relative to `previous`.
///
/// Entities are matched on their natural key. A better (smaller) rank is
/// `Up`, a worse one `Down`; new entrants and first-ever snapshots are
/// `Same`. Entities present only in `previous` are not emitted.
#[must_use]
pub fn diff(mut current: Vec<RankingEntry>, previous: Option<&[RankingEntry]>) -> Vec<RankingEntry> {
    let previous_ranks: HashMap<&Entity, u32> = previous
        .unwrap_or_default()
        .iter()
        .map(|e| (&e.entity, e.rank))
        .collect();

    for entry in &mut current {
        entry.trend = match previous_ranks.get(&entry.entity) {
            Some(&before) if entry.rank < before => Trend::Up,
            Some(&before) if entry.rank > before => Trend::Down,
            _ => Trend::Same,
        };
    }
    current
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pulse_core::{EntityType, Period, RankingCategory};

    use super::*;

    fn entry(name: &str, rank: u32) -> RankingEntry {
        RankingEntry {
            category: RankingCategory::Trending,
            entity: Entity::subject(EntityType::Topic, name),
            period: Period::Today,
            rank,
            stat: "1 mention".to_string(),
            score: f64::from(10 - rank),
            trend: Trend::Same,
            explanation: None,
            snapshot_at: Utc::now(),
        }
    }

    fn trends(entries: &[RankingEntry]) -> Vec<(&str, Trend)> {
        entries
            .iter()
            .map(|e| (e.entity.name.as_str(), e.trend))
            .collect()
    }

    #[test]
    fn reordered_snapshot_gets_arrows_and_drops_leavers() {
        let previous = vec![entry("A", 1), entry("B", 2), entry("C", 3)];
        let current = vec![entry("B", 1), entry("A", 2), entry("D", 3)];

        let out = diff(current, Some(&previous));

        assert_eq!(
            trends(&out),
            vec![("B", Trend::Up), ("A", Trend::Down), ("D", Trend::Same)]
        );
        assert!(out.iter().all(|e| e.entity.name != "C"));
    }

    #[test]
    fn first_snapshot_is_all_same() {
        let out = diff(vec![entry("A", 1), entry("B", 2)], None);
        assert!(out.iter().all(|e| e.trend == Trend::Same));
    }

    #[test]
    fn unchanged_rank_is_same() {
        let previous = vec![entry("A", 1)];
        let out = diff(vec![entry("A", 1)], Some(&previous));
        assert_eq!(out[0].trend, Trend::Same);
    }

    #[test]
    fn natural_key_includes_parent() {
        let mut prev_city = entry("Springfield", 1);
        prev_city.entity = Entity::city("US", Some("Illinois"), "Springfield");
        let mut cur_city = entry("Springfield", 2);
        cur_city.entity = Entity::city("US", Some("Missouri"), "Springfield");

        let out = diff(vec![cur_city], Some(&[prev_city]));
        assert_eq!(out[0].trend, Trend::Same);
    }
}
