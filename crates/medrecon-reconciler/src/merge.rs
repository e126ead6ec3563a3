//! Per-category merge rules
//!
//! A class of matched mentions collapses into one canonical entity. The
//! canonical member keeps its identifier and attributes; every other member
//! contributes its source locations, spellings, and any value that disagrees.

use crate::log::{MatchType, MergeAction, MergeLogEntry};
use crate::matcher::{earliest_location, MatchClass};
use crate::measurement::{equivalent, parse_measurement, Measurement};
use medrecon_domain::normalize::{compact_key, looks_abbreviated, normalize_key};
use medrecon_domain::{ConflictingValue, Entity, EntityAttributes, EntityCategory, SourceLocation};

/// Medication fields whose disagreement is a conflict
const MEDICATION_CONFLICT_FIELDS: &[&str] =
    &["dose", "frequency", "route", "start_date", "end_date"];

/// Index of the canonical member within `members` (ingestion order)
pub fn canonical_member(category: EntityCategory, members: &[&Entity]) -> usize {
    match category {
        EntityCategory::Medication => {
            let spelled_out: Vec<usize> = (0..members.len())
                .filter(|&i| !looks_abbreviated(members[i].primary_text()))
                .collect();
            let pool: Vec<usize> = if spelled_out.is_empty() {
                (0..members.len()).collect()
            } else {
                spelled_out
            };
            earliest_max(&pool, |i| (members[i].primary_text().chars().count(), 0, 0))
        }
        EntityCategory::Problem | EntityCategory::PlanItem => {
            let all: Vec<usize> = (0..members.len()).collect();
            earliest_max(&all, |i| {
                (
                    members[i].primary_text().chars().count(),
                    members[i].attributes().populated_count(),
                    0,
                )
            })
        }
        EntityCategory::LabResult | EntityCategory::Vital => {
            let all: Vec<usize> = (0..members.len()).collect();
            earliest_max(&all, |i| {
                let attributes = members[i].attributes();
                let has_unit = attributes.unit().is_some();
                let has_range = match attributes {
                    EntityAttributes::LabResult(a) => a.reference_range.is_some(),
                    _ => false,
                };
                (
                    usize::from(has_unit && has_range),
                    usize::from(has_unit),
                    attributes.populated_count(),
                )
            })
        }
    }
}

/// First index in `pool` with the greatest rank
fn earliest_max(pool: &[usize], rank: impl Fn(usize) -> (usize, usize, usize)) -> usize {
    let mut best = pool.first().copied().unwrap_or(0);
    for &i in pool.iter().skip(1) {
        if rank(i) > rank(best) {
            best = i;
        }
    }
    best
}

fn anchor(entity: &Entity) -> Option<SourceLocation> {
    let earliest = earliest_location(entity);
    entity
        .source_locations()
        .iter()
        .find(|l| l.order_key() == earliest)
        .cloned()
}

/// Distinct values of one field across members, keyed by compact form
fn distinct_values<'a>(
    members: &[&'a Entity],
    value_of: impl Fn(&'a Entity) -> Option<&'a str>,
) -> Vec<(String, SourceLocation)> {
    let mut seen: Vec<String> = Vec::new();
    let mut values = Vec::new();
    for member in members {
        let Some(value) = value_of(*member) else { continue };
        let key = compact_key(value);
        if seen.contains(&key) {
            continue;
        }
        if let Some(location) = anchor(member) {
            seen.push(key);
            values.push((value.to_string(), location));
        }
    }
    values
}

fn optional_value<'a>(entity: &'a Entity, field: &str) -> Option<&'a str> {
    entity
        .attributes()
        .optional_fields()
        .into_iter()
        .find(|(name, _)| *name == field)
        .and_then(|(_, value)| value)
}

fn measured_text(entity: &Entity) -> Option<String> {
    let attributes = entity.attributes();
    let value = attributes.value_text()?;
    match attributes.unit() {
        Some(unit) if !normalize_key(value).contains(&normalize_key(unit)) => {
            Some(format!("{} {}", value, unit))
        }
        _ => Some(value.to_string()),
    }
}

fn measurement_of(entity: &Entity) -> Option<Measurement> {
    let attributes = entity.attributes();
    let kind = match attributes {
        EntityAttributes::Vital(v) => Some(v.kind),
        _ => None,
    };
    attributes
        .value_text()
        .map(|value| parse_measurement(value, attributes.unit(), kind))
}

/// Conflicts between members' measured values; empty when all agree within tolerance
fn measurement_conflicts(
    field: &str,
    members: &[&Entity],
    tolerance: f64,
) -> Vec<ConflictingValue> {
    let mut groups: Vec<(Measurement, String, SourceLocation)> = Vec::new();
    for member in members {
        let (Some(measurement), Some(text), Some(location)) =
            (measurement_of(member), measured_text(member), anchor(member))
        else {
            continue;
        };
        if groups.iter().any(|(m, _, _)| equivalent(m, &measurement, tolerance)) {
            continue;
        }
        groups.push((measurement, text, location));
    }
    if groups.len() < 2 {
        return Vec::new();
    }
    groups
        .into_iter()
        .map(|(_, value, source_location)| ConflictingValue {
            field: field.to_string(),
            value,
            source_location,
        })
        .collect()
}

fn format_conflicts(conflicts: &[ConflictingValue]) -> String {
    let mut fields: Vec<&str> = Vec::new();
    for c in conflicts {
        if !fields.contains(&c.field.as_str()) {
            fields.push(&c.field);
        }
    }
    fields
        .iter()
        .map(|field| {
            let values: Vec<String> = conflicts
                .iter()
                .filter(|c| c.field == *field)
                .map(|c| format!("'{}' (p{})", c.value, c.source_location.page()))
                .collect();
            format!("{}: {}", field, values.join(" vs "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Merge one class into its canonical entity
///
/// Returns the canonical entity and, for classes of two or more, the log
/// entry describing the decision.
pub fn merge_class(
    category: EntityCategory,
    members: &[&Entity],
    class: &MatchClass,
    tolerance: f64,
) -> Option<(Entity, Option<MergeLogEntry>)> {
    let canonical_index = canonical_member(category, members);
    let canonical = members.get(canonical_index)?;
    let mut merged = (*canonical).clone();

    if members.len() < 2 {
        return Some((merged, None));
    }

    let mut absorbed_ids = Vec::new();
    for (i, member) in members.iter().enumerate() {
        if i == canonical_index {
            continue;
        }
        absorbed_ids.push(member.id());
        for location in member.source_locations() {
            merged.add_source_location(location.clone());
        }
        merged.add_alternative(member.primary_text());
        for alternative in member.alternative_representations() {
            merged.add_alternative(alternative.as_str());
        }
        for conflict in member.conflicting_values() {
            merged.add_conflict(conflict.clone());
        }
        merged.merge_uncertainty(member.is_uncertain());
        if member.confidence() < merged.confidence() {
            // both values already validated to lie in [0, 1]
            let _ = merged.set_confidence(member.confidence());
        }
    }
    merged.sort_source_locations();

    let mut conflicts: Vec<ConflictingValue> = Vec::new();
    let fields: Vec<&'static str> =
        merged.attributes().optional_fields().iter().map(|(f, _)| *f).collect();
    for field in fields {
        let values = distinct_values(members, |m| optional_value(m, field));
        let conflict_field =
            category == EntityCategory::Medication && MEDICATION_CONFLICT_FIELDS.contains(&field);
        if conflict_field && values.len() > 1 {
            conflicts.extend(values.into_iter().map(|(value, source_location)| ConflictingValue {
                field: field.to_string(),
                value,
                source_location,
            }));
        } else if let Some((value, _)) = values.first() {
            merged.fill_missing(field, value);
        }
    }

    match category {
        EntityCategory::Vital | EntityCategory::LabResult => {
            let field = match merged.attributes() {
                EntityAttributes::Vital(v) => v.kind.as_str().to_string(),
                other => other.primary_text().to_string(),
            };
            conflicts.extend(measurement_conflicts(&field, members, tolerance));
        }
        _ => {}
    }

    for conflict in &conflicts {
        merged.add_conflict(conflict.clone());
    }

    let action = if conflicts.is_empty() {
        MergeAction::Merged
    } else {
        MergeAction::ConflictRetained
    };
    let source_pages = merged.source_pages();
    let key = normalize_key(merged.primary_text());

    let mut explanation = match class.match_type {
        MatchType::Exact => format!(
            "{} mentions of {} '{}' share key '{}' on pages {:?}",
            members.len(),
            category,
            merged.primary_text(),
            key,
            source_pages
        ),
        MatchType::Fuzzy => format!(
            "{} mentions of {} '{}' matched by similarity {:.4} on pages {:?}",
            members.len(),
            category,
            merged.primary_text(),
            class.similarity.unwrap_or(0.0),
            source_pages
        ),
    };
    if !conflicts.is_empty() {
        explanation.push_str(&format!(
            "; conflicting values retained for review ({})",
            format_conflicts(&conflicts)
        ));
    }

    tracing::debug!("{}", explanation);

    let entry = MergeLogEntry {
        category,
        action,
        match_type: class.match_type,
        similarity_score: match class.match_type {
            MatchType::Exact => None,
            MatchType::Fuzzy => class.similarity,
        },
        surviving_entity_id: merged.id(),
        absorbed_entity_ids: absorbed_ids,
        source_pages,
        explanation,
        conflicts,
    };

    Some((merged, Some(entry)))
}
