//! Two-tier mention matching
//!
//! The exact tier groups mentions whose normalized keys coincide. The fuzzy
//! tier then joins exact groups under complete linkage: two classes join only
//! when every cross pair of their keys reaches the threshold.

use crate::log::MatchType;
use crate::similarity::complete_linkage;
use medrecon_domain::normalize::normalize_key;
use medrecon_domain::Entity;
use std::collections::HashMap;
use std::time::Instant;

/// A set of mentions judged to describe the same fact
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClass {
    /// Indices into the input slice, in ingestion order
    pub members: Vec<usize>,
    /// Tier that formed the class
    pub match_type: MatchType,
    /// Weakest pairwise similarity for fuzzy classes
    pub similarity: Option<f64>,
}

/// Result of matching one category
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Classes ordered by their earliest member
    pub classes: Vec<MatchClass>,
    /// Whether the fuzzy tier was cut short by the deadline
    pub fuzzy_aborted: bool,
}

/// Earliest (page, line) an entity cites
pub fn earliest_location(entity: &Entity) -> (u32, u32) {
    entity
        .source_locations()
        .iter()
        .map(|l| l.order_key())
        .min()
        .unwrap_or((u32::MAX, u32::MAX))
}

/// Input indices sorted by (page, line, index) of each entity's earliest location
pub fn ingestion_order(entities: &[Entity]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..entities.len()).collect();
    order.sort_by_key(|&i| (earliest_location(&entities[i]), i));
    order
}

/// Normalized keys an entity answers to: its primary text, then alternatives
pub fn match_keys(entity: &Entity) -> Vec<String> {
    let mut keys = Vec::new();
    let candidates = std::iter::once(entity.primary_text())
        .chain(entity.alternative_representations().iter().map(String::as_str));
    for text in candidates {
        let key = normalize_key(text);
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[derive(Debug, Clone)]
struct Group {
    // positions in ingestion order
    positions: Vec<usize>,
    keys: Vec<String>,
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Exact tier: mentions sharing any normalized key collapse into one group
fn exact_groups(entities: &[Entity], order: &[usize]) -> Vec<Group> {
    let mut groups: Vec<Option<Group>> = Vec::new();
    // lookup only; iteration order never depends on it
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (position, &index) in order.iter().enumerate() {
        let keys = match_keys(&entities[index]);
        let mut hits: Vec<usize> = keys.iter().filter_map(|k| by_key.get(k).copied()).collect();
        hits.sort_unstable();
        hits.dedup();

        let target = match hits.first() {
            Some(&first) => first,
            None => {
                groups.push(Some(Group {
                    positions: Vec::new(),
                    keys: Vec::new(),
                }));
                groups.len() - 1
            }
        };

        for &other in hits.iter().skip(1) {
            if let Some(absorbed) = groups[other].take() {
                for key in &absorbed.keys {
                    by_key.insert(key.clone(), target);
                }
                if let Some(group) = groups[target].as_mut() {
                    group.positions.extend(absorbed.positions);
                    for key in absorbed.keys {
                        if !group.keys.contains(&key) {
                            group.keys.push(key);
                        }
                    }
                }
            }
        }

        if let Some(group) = groups[target].as_mut() {
            group.positions.push(position);
            for key in keys {
                by_key.insert(key.clone(), target);
                if !group.keys.contains(&key) {
                    group.keys.push(key);
                }
            }
        }
    }

    let mut groups: Vec<Group> = groups.into_iter().flatten().collect();
    for group in &mut groups {
        group.positions.sort_unstable();
    }
    groups.sort_by_key(|g| g.positions.first().copied().unwrap_or(usize::MAX));
    groups
}

fn to_classes(groups: Vec<(Group, MatchType, Option<f64>)>, order: &[usize]) -> Vec<MatchClass> {
    groups
        .into_iter()
        .map(|(group, match_type, similarity)| MatchClass {
            members: group.positions.iter().map(|&p| order[p]).collect(),
            match_type,
            similarity,
        })
        .collect()
}

#[derive(Debug)]
struct FuzzyClass {
    groups: Vec<usize>,
    keys: Vec<String>,
    weakest: Option<f64>,
}

/// Fuzzy tier over exact groups; `None` when the deadline passed
fn fuzzy_join(
    groups: &[Group],
    threshold: f64,
    deadline: Option<Instant>,
) -> Option<Vec<FuzzyClass>> {
    let n = groups.len();
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for i in 0..n {
        if expired(deadline) {
            return None;
        }
        for j in (i + 1)..n {
            let score = complete_linkage(&groups[i].keys, &groups[j].keys);
            if score >= threshold {
                candidates.push((score, i, j));
            }
        }
    }
    // strongest first; ties resolved by ingestion order of the groups
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut class_of: Vec<usize> = (0..n).collect();
    let mut classes: Vec<Option<FuzzyClass>> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            Some(FuzzyClass {
                groups: vec![i],
                keys: g.keys.clone(),
                weakest: None,
            })
        })
        .collect();

    for (_, i, j) in candidates {
        if expired(deadline) {
            return None;
        }
        let (ci, cj) = (class_of[i], class_of[j]);
        if ci == cj {
            continue;
        }
        let (target, other) = (ci.min(cj), ci.max(cj));
        let link = match (&classes[target], &classes[other]) {
            (Some(a), Some(b)) => complete_linkage(&a.keys, &b.keys),
            _ => continue,
        };
        if link < threshold {
            continue;
        }
        if let Some(absorbed) = classes[other].take() {
            for &g in &absorbed.groups {
                class_of[g] = target;
            }
            if let Some(class) = classes[target].as_mut() {
                class.groups.extend(absorbed.groups);
                class.keys.extend(absorbed.keys);
                let weakest = [class.weakest, absorbed.weakest, Some(link)]
                    .into_iter()
                    .flatten()
                    .fold(f64::INFINITY, f64::min);
                class.weakest = Some(weakest);
            }
        }
    }

    Some(classes.into_iter().flatten().collect())
}

/// Match one category's mentions
///
/// `fuzzy` enables the second tier. When `deadline` passes during the fuzzy
/// tier, exact-tier classes are returned and `fuzzy_aborted` is set.
pub fn match_mentions(
    entities: &[Entity],
    fuzzy: bool,
    threshold: f64,
    deadline: Option<Instant>,
) -> MatchOutcome {
    let order = ingestion_order(entities);
    let groups = exact_groups(entities, &order);

    let exact = |groups: Vec<Group>| -> Vec<(Group, MatchType, Option<f64>)> {
        groups.into_iter().map(|g| (g, MatchType::Exact, None)).collect()
    };

    if !fuzzy || groups.len() < 2 {
        return MatchOutcome {
            classes: to_classes(exact(groups), &order),
            fuzzy_aborted: false,
        };
    }

    match fuzzy_join(&groups, threshold, deadline) {
        None => {
            tracing::warn!(
                "Fuzzy matching aborted at deadline; keeping {} exact groups",
                groups.len()
            );
            MatchOutcome {
                classes: to_classes(exact(groups), &order),
                fuzzy_aborted: true,
            }
        }
        Some(fuzzy_classes) => {
            let mut joined: Vec<(Group, MatchType, Option<f64>)> = fuzzy_classes
                .into_iter()
                .map(|class| {
                    let mut positions: Vec<usize> = class
                        .groups
                        .iter()
                        .flat_map(|&g| groups[g].positions.iter().copied())
                        .collect();
                    positions.sort_unstable();
                    let match_type = if class.groups.len() > 1 {
                        MatchType::Fuzzy
                    } else {
                        MatchType::Exact
                    };
                    (
                        Group {
                            positions,
                            keys: class.keys,
                        },
                        match_type,
                        class.weakest,
                    )
                })
                .collect();
            joined.sort_by_key(|(g, _, _)| g.positions.first().copied().unwrap_or(usize::MAX));
            MatchOutcome {
                classes: to_classes(joined, &order),
                fuzzy_aborted: false,
            }
        }
    }
}
