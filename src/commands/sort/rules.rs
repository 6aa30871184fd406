use rusqlite::types::Value;

use super::refs::{ReferenceIndexes, value_as_i64, value_as_text};
use super::shape::TableShape;

const TAG_UNKNOWN_VINTAGE: &str = "~vint; ";
const TAG_VINTAGE_AFTER_PERIOD: &str = "v>p; ";
const TAG_LIFETIME_EXPIRED: &str = "v+l<=p; ";
const TAG_NO_EFFICIENCY: &str = "~eff; ";
const TAG_UNKNOWN_PERIOD: &str = "~per; ";
const TAG_NO_EXISTING_CAPACITY: &str = "~exs; ";

/// Positions of the temporal and key columns within a table's column
/// list, looked up once per table.
pub(super) struct TemporalColumns {
    pub region: Option<usize>,
    pub tech: Option<usize>,
    pub period: Option<usize>,
    pub vintage: Option<usize>,
}

impl TemporalColumns {
    pub(super) fn locate(columns: &[String]) -> Self {
        let position = |name: &str| columns.iter().position(|column| column == name);

        Self {
            region: position("region"),
            tech: position("tech"),
            period: position("period"),
            vintage: position("vintage"),
        }
    }
}

/// Evaluates every rule applicable to the row's table shape and returns
/// the concatenated tag string, empty when the row is valid. Rules never
/// short-circuit each other; a reference lookup miss is a tag, not an
/// error.
pub(super) fn classify_row(
    row: &[Value],
    columns: &TemporalColumns,
    shape: TableShape,
    refs: &ReferenceIndexes,
) -> String {
    let mut tags = String::new();

    let region = columns.region.and_then(|index| value_as_text(&row[index]));
    let tech = columns.tech.and_then(|index| value_as_text(&row[index]));
    let period = columns.period.and_then(|index| value_as_i64(&row[index]));
    let vintage = columns.vintage.and_then(|index| value_as_i64(&row[index]));

    match shape {
        TableShape::PeriodVintage => {
            if !vintage.map(|v| refs.all_periods.contains(&v)).unwrap_or(false) {
                tags.push_str(TAG_UNKNOWN_VINTAGE);
            }

            if let (Some(vintage), Some(period)) = (vintage, period) {
                if vintage > period {
                    tags.push_str(TAG_VINTAGE_AFTER_PERIOD);
                }

                if let Some(lifetime) = refs.lifetime(region.as_deref(), tech.as_deref()) {
                    if vintage as f64 + lifetime <= period as f64 {
                        tags.push_str(TAG_LIFETIME_EXPIRED);
                    }
                }
            }

            if !refs.has_efficiency(region.as_deref(), tech.as_deref(), vintage) {
                tags.push_str(TAG_NO_EFFICIENCY);
            }

            if !period.map(|p| refs.model_periods.contains(&p)).unwrap_or(false) {
                tags.push_str(TAG_UNKNOWN_PERIOD);
            }
        }
        TableShape::PeriodOnly { has_tech: true } => {
            if !period.map(|p| refs.model_periods.contains(&p)).unwrap_or(false) {
                tags.push_str(TAG_UNKNOWN_PERIOD);
            }
        }
        // Group tables carry no tech column and are only sorted.
        TableShape::PeriodOnly { has_tech: false } | TableShape::Unclassified => {}
        TableShape::VintageOnly => {
            if !vintage.map(|v| refs.all_periods.contains(&v)).unwrap_or(false) {
                tags.push_str(TAG_UNKNOWN_VINTAGE);
            }

            if !refs.has_efficiency(region.as_deref(), tech.as_deref(), vintage) {
                tags.push_str(TAG_NO_EFFICIENCY);
            }
        }
    }

    tags
}

/// Efficiency-table pre-pass: a row whose vintage is an existing period
/// must be backed by a non-null, non-zero existing capacity entry.
pub(super) fn existing_capacity_tag(
    row: &[Value],
    columns: &TemporalColumns,
    refs: &ReferenceIndexes,
) -> String {
    let Some(vintage) = columns.vintage.and_then(|index| value_as_i64(&row[index])) else {
        return String::new();
    };

    if !refs.existing_periods.contains(&vintage) {
        return String::new();
    }

    let region = columns.region.and_then(|index| value_as_text(&row[index]));
    let tech = columns.tech.and_then(|index| value_as_text(&row[index]));

    let capacity = match (region, tech) {
        (Some(region), Some(tech)) => refs
            .existing_capacity
            .get(&(region, tech, vintage))
            .copied(),
        _ => None,
    };

    match capacity {
        Some(Some(capacity)) if capacity != 0.0 => String::new(),
        _ => TAG_NO_EXISTING_CAPACITY.to_string(),
    }
}
