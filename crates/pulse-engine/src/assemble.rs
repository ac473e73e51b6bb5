//! Hierarchy assembly: scored entities into ranked, validated entries.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use pulse_core::{
    EntityType, GroupKey, OrphanPolicy, Period, RankingCategory, RankingEntry, Trend,
};

use crate::error::AssemblyError;
use crate::scorer::{rank_order, ScoredEntity};

/// Longest explanation stored with an entry, in characters.
pub const MAX_EXPLANATION_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblySettings {
    pub top_n: usize,
    pub orphan_policy: OrphanPolicy,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            orphan_policy: OrphanPolicy::Drop,
        }
    }
}

/// `(country_code, name)` of an emitted place, used to resolve children.
type PlaceKey = (Option<String>, String);

/// Rank scored entities into a snapshot.
///
/// Levels are ranked top-down. Countries go first; states are then checked
/// against the countries actually emitted, and cities against the emitted
/// states, so a parent cut by top-N truncation orphans its children.
/// Orphans are dropped or promoted into a parent-less bucket per
/// `settings.orphan_policy`.
///
/// # Errors
///
/// Returns [`AssemblyError::EmptySnapshot`] when entities were scored but
/// none survived, and [`AssemblyError::OrphanedEntity`] if the output fails
/// the final hierarchy check.
pub fn assemble(
    scored: Vec<ScoredEntity>,
    category: RankingCategory,
    period: Period,
    settings: &AssemblySettings,
    snapshot_at: DateTime<Utc>,
) -> Result<Vec<RankingEntry>, AssemblyError> {
    let scored_count = scored.len();
    let mut by_type: BTreeMap<EntityType, Vec<ScoredEntity>> = BTreeMap::new();
    for entity in scored {
        by_type.entry(entity.entity.entity_type).or_default().push(entity);
    }

    let mut entries = Vec::new();
    let mut emitted_countries: HashSet<PlaceKey> = HashSet::new();
    let mut emitted_states: HashSet<PlaceKey> = HashSet::new();

    for (entity_type, members) in by_type {
        let members = match entity_type {
            EntityType::State => {
                resolve_parents(members, &emitted_countries, settings.orphan_policy)
            }
            EntityType::City => resolve_parents(members, &emitted_states, settings.orphan_policy),
            _ => members,
        };

        for group in rank_groups(members, settings.top_n) {
            for entity in &group {
                let key = (entity.entity.country_code.clone(), entity.entity.name.clone());
                match entity_type {
                    EntityType::Country => {
                        emitted_countries.insert(key);
                    }
                    EntityType::State => {
                        emitted_states.insert(key);
                    }
                    _ => {}
                }
            }
            entries.extend(
                group
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| to_entry(e, i, category, period, snapshot_at)),
            );
        }
    }

    if scored_count > 0 && entries.is_empty() {
        return Err(AssemblyError::EmptySnapshot {
            category,
            period,
            scored: scored_count,
        });
    }

    check_hierarchy(&entries)?;
    Ok(entries)
}

/// Keep children whose parent was emitted one level up; handle the rest
/// per policy. A child is matched on `(country_code, parent)`, and a child
/// without a parent field is an orphan.
fn resolve_parents(
    members: Vec<ScoredEntity>,
    emitted: &HashSet<PlaceKey>,
    policy: OrphanPolicy,
) -> Vec<ScoredEntity> {
    members
        .into_iter()
        .filter_map(|mut child| {
            let resolved = child.entity.parent.as_ref().is_some_and(|parent| {
                emitted.contains(&(child.entity.country_code.clone(), parent.clone()))
            });
            if resolved {
                return Some(child);
            }
            match policy {
                OrphanPolicy::Drop => {
                    tracing::debug!(
                        entity_type = %child.entity.entity_type,
                        name = %child.entity.name,
                        parent = ?child.entity.parent,
                        "dropping orphaned entity"
                    );
                    None
                }
                OrphanPolicy::Promote => {
                    child.entity.parent = None;
                    Some(child)
                }
            }
        })
        .collect()
}

/// Partition by group key, sort each group and keep its top `top_n`.
fn rank_groups(members: Vec<ScoredEntity>, top_n: usize) -> Vec<Vec<ScoredEntity>> {
    let mut groups: BTreeMap<GroupKey, Vec<ScoredEntity>> = BTreeMap::new();
    for member in members {
        groups.entry(member.entity.group_key()).or_default().push(member);
    }
    groups
        .into_values()
        .map(|mut group| {
            group.sort_by(rank_order);
            group.truncate(top_n);
            group
        })
        .collect()
}

fn to_entry(
    scored: ScoredEntity,
    index: usize,
    category: RankingCategory,
    period: Period,
    snapshot_at: DateTime<Utc>,
) -> RankingEntry {
    RankingEntry {
        category,
        stat: category
            .stat_style()
            .render(scored.score.signal_count, scored.score.peak),
        score: scored.score.value,
        explanation: scored.score.top_title.as_deref().map(truncate_explanation),
        entity: scored.entity,
        period,
        rank: u32::try_from(index + 1).unwrap_or(u32::MAX),
        trend: Trend::Same,
        snapshot_at,
    }
}

fn truncate_explanation(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_EXPLANATION_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_EXPLANATION_CHARS - 1).collect();
    cut.push('…');
    cut
}

/// Every state or city that names a parent must find it among the
/// entries at the level above.
///
/// # Errors
///
/// Returns [`AssemblyError::OrphanedEntity`] for the first child whose
/// parent is missing.
pub fn check_hierarchy(entries: &[RankingEntry]) -> Result<(), AssemblyError> {
    let places: HashSet<(EntityType, Option<&str>, &str)> = entries
        .iter()
        .map(|e| {
            (
                e.entity.entity_type,
                e.entity.country_code.as_deref(),
                e.entity.name.as_str(),
            )
        })
        .collect();

    for entry in entries {
        let Some(parent_type) = entry.entity.entity_type.parent_type() else {
            continue;
        };
        let Some(parent) = entry.entity.parent.as_deref() else {
            continue;
        };
        let key = (parent_type, entry.entity.country_code.as_deref(), parent);
        if !places.contains(&key) {
            return Err(AssemblyError::OrphanedEntity {
                entity_type: entry.entity.entity_type,
                name: entry.entity.name.clone(),
                parent: parent.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pulse_core::Entity;

    use super::*;
    use crate::scorer::PulseScore;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn scored(entity: Entity, value: f64) -> ScoredEntity {
        ScoredEntity {
            entity,
            score: PulseScore {
                value,
                signal_count: 2,
                peak: value,
                top_title: Some(format!("headline {value}")),
            },
        }
    }

    fn settings(top_n: usize, orphan_policy: OrphanPolicy) -> AssemblySettings {
        AssemblySettings {
            top_n,
            orphan_policy,
        }
    }

    fn run(scored: Vec<ScoredEntity>, s: AssemblySettings) -> Result<Vec<RankingEntry>, AssemblyError> {
        assemble(scored, RankingCategory::Crime, Period::Today, &s, at())
    }

    fn fixture() -> Vec<ScoredEntity> {
        vec![
            scored(Entity::country("US", "United States"), 30.0),
            scored(Entity::country("KW", "Kuwait"), 10.0),
            scored(Entity::country("GB", "United Kingdom"), 20.0),
            scored(Entity::state("US", "United States", "Texas"), 8.0),
            scored(Entity::state("US", "United States", "California"), 9.0),
            scored(Entity::state("KW", "Kuwait", "Al Asimah"), 4.0),
            scored(Entity::city("US", Some("Texas"), "Houston"), 5.0),
            scored(Entity::city("US", Some("Texas"), "Austin"), 6.0),
            scored(Entity::city("KW", Some("Al Asimah"), "Kuwait City"), 3.0),
        ]
    }

    #[test]
    fn ranks_are_contiguous_within_every_group() {
        let entries = run(fixture(), AssemblySettings::default()).unwrap();
        let mut groups: BTreeMap<GroupKey, Vec<u32>> = BTreeMap::new();
        for e in &entries {
            groups.entry(e.group_key()).or_default().push(e.rank);
        }
        for (key, mut ranks) in groups {
            ranks.sort_unstable();
            let expected: Vec<u32> = (1..=u32::try_from(ranks.len()).unwrap()).collect();
            assert_eq!(ranks, expected, "group {key:?}");
        }
    }

    #[test]
    fn scores_are_non_increasing_by_rank() {
        let entries = run(fixture(), AssemblySettings::default()).unwrap();
        let mut groups: BTreeMap<GroupKey, Vec<&RankingEntry>> = BTreeMap::new();
        for e in &entries {
            groups.entry(e.group_key()).or_default().push(e);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|e| e.rank);
            assert!(group.windows(2).all(|w| w[0].score >= w[1].score));
        }
        let countries: Vec<_> = entries
            .iter()
            .filter(|e| e.entity.entity_type == EntityType::Country)
            .map(|e| (e.entity.name.as_str(), e.rank))
            .collect();
        assert_eq!(
            countries,
            vec![("United States", 1), ("United Kingdom", 2), ("Kuwait", 3)]
        );
    }

    #[test]
    fn every_child_resolves_to_an_emitted_parent() {
        let entries = run(fixture(), AssemblySettings::default()).unwrap();
        assert!(check_hierarchy(&entries).is_ok());
        assert_eq!(entries.len(), 9);
    }

    #[test]
    fn truncated_parent_orphans_its_children_under_drop() {
        // top_n = 1 keeps only the US among countries and California among
        // US states, so Texas' cities and all of Kuwait's subtree go.
        let entries = run(fixture(), settings(1, OrphanPolicy::Drop)).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.entity.name.as_str()).collect();
        assert_eq!(names, vec!["United States", "California"]);
        assert!(check_hierarchy(&entries).is_ok());
    }

    #[test]
    fn promote_moves_orphans_into_parentless_bucket() {
        let input = vec![
            scored(Entity::country("US", "United States"), 30.0),
            scored(Entity::city("US", Some("Nowhere"), "Springfield"), 2.0),
            scored(Entity::city("US", None, "Shelbyville"), 3.0),
        ];
        let entries = run(input, settings(10, OrphanPolicy::Promote)).unwrap();
        let cities: Vec<_> = entries
            .iter()
            .filter(|e| e.entity.entity_type == EntityType::City)
            .map(|e| (e.entity.name.as_str(), e.entity.parent.as_deref(), e.rank))
            .collect();
        assert_eq!(
            cities,
            vec![("Shelbyville", None, 1), ("Springfield", None, 2)]
        );
    }

    #[test]
    fn all_orphans_dropped_is_empty_snapshot() {
        let input = vec![scored(Entity::state("US", "United States", "Texas"), 1.0)];
        let err = run(input, AssemblySettings::default()).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::EmptySnapshot {
                category: RankingCategory::Crime,
                period: Period::Today,
                scored: 1,
            }
        );
    }

    #[test]
    fn empty_input_is_an_empty_ok() {
        assert!(run(Vec::new(), AssemblySettings::default()).unwrap().is_empty());
    }

    #[test]
    fn state_parent_must_match_country_code() {
        // "United States" parent but filed under KW: not a child of the US entry.
        let input = vec![
            scored(Entity::country("US", "United States"), 5.0),
            scored(Entity::state("KW", "United States", "Texas"), 1.0),
        ];
        let entries = run(input, AssemblySettings::default()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn topic_entities_are_root_groups() {
        let input = vec![
            scored(Entity::subject(EntityType::Topic, "Bitcoin"), 2.0),
            scored(Entity::subject(EntityType::Topic, "Mars"), 1.0),
        ];
        let entries = assemble(
            input,
            RankingCategory::Trending,
            Period::Week,
            &AssemblySettings::default(),
            at(),
        )
        .unwrap();
        assert_eq!(entries[0].entity.name, "Bitcoin");
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[0].stat, "2 mentions");
        assert_eq!(entries[1].rank, 2);
    }

    #[test]
    fn explanation_is_capped() {
        let long = "x".repeat(400);
        let cut = truncate_explanation(&long);
        assert_eq!(cut.chars().count(), MAX_EXPLANATION_CHARS);
        assert!(cut.ends_with('…'));
        assert_eq!(truncate_explanation(" short "), "short");
    }

    #[test]
    fn check_hierarchy_flags_missing_parent() {
        let entries = run(fixture(), AssemblySettings::default()).unwrap();
        let orphaned: Vec<_> = entries
            .into_iter()
            .filter(|e| e.entity.name != "Texas")
            .collect();
        let err = check_hierarchy(&orphaned).unwrap_err();
        assert!(matches!(err, AssemblyError::OrphanedEntity { ref parent, .. } if parent == "Texas"));
    }
}
