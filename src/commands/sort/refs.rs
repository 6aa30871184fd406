use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::warn;

pub(super) const DEFAULT_LIFETIME_YEARS: f64 = 40.0;

/// Immutable lookup indexes built from the reference tables before any
/// rewrite begins. A missing or unreadable reference table leaves its
/// index empty; downstream lookups then resolve to "absent".
#[derive(Debug, Default)]
pub(super) struct ReferenceIndexes {
    pub existing_periods: HashSet<i64>,
    pub model_periods: HashSet<i64>,
    pub all_periods: HashSet<i64>,
    pub efficiency_keys: HashSet<(String, String, i64)>,
    pub existing_capacity: HashMap<(String, String, i64), Option<f64>>,
    pub lifetimes: HashMap<(String, String), Option<f64>>,
}

impl ReferenceIndexes {
    /// Lifetime in years for a (region, tech) pair. No entry means the
    /// default applies; an entry with a NULL lifetime disables the
    /// lifetime check for that pair entirely.
    pub(super) fn lifetime(&self, region: Option<&str>, tech: Option<&str>) -> Option<f64> {
        let (Some(region), Some(tech)) = (region, tech) else {
            return Some(DEFAULT_LIFETIME_YEARS);
        };

        match self.lifetimes.get(&(region.to_owned(), tech.to_owned())) {
            Some(lifetime) => *lifetime,
            None => Some(DEFAULT_LIFETIME_YEARS),
        }
    }

    pub(super) fn has_efficiency(
        &self,
        region: Option<&str>,
        tech: Option<&str>,
        vintage: Option<i64>,
    ) -> bool {
        match (region, tech, vintage) {
            (Some(region), Some(tech), Some(vintage)) => self
                .efficiency_keys
                .contains(&(region.to_owned(), tech.to_owned(), vintage)),
            _ => false,
        }
    }
}

pub(super) fn build(conn: &Connection) -> ReferenceIndexes {
    let mut indexes = ReferenceIndexes::default();

    match load_periods(conn) {
        Ok((existing, model)) => {
            indexes.all_periods = existing.union(&model).copied().collect();
            indexes.existing_periods = existing;
            indexes.model_periods = model;
        }
        Err(err) => warn!(
            table = "TimePeriod",
            error = %err,
            "reference table unavailable; period lookups degrade to absent"
        ),
    }

    match load_efficiency_keys(conn) {
        Ok(keys) => indexes.efficiency_keys = keys,
        Err(err) => warn!(
            table = "Efficiency",
            error = %err,
            "reference table unavailable; efficiency lookups degrade to absent"
        ),
    }

    match load_existing_capacity(conn) {
        Ok(capacity) => indexes.existing_capacity = capacity,
        Err(err) => warn!(
            table = "ExistingCapacity",
            error = %err,
            "reference table unavailable; capacity lookups degrade to absent"
        ),
    }

    match load_lifetimes(conn) {
        Ok(lifetimes) => indexes.lifetimes = lifetimes,
        Err(err) => warn!(
            table = "LifetimeTech",
            error = %err,
            "reference table unavailable; lifetimes fall back to the default"
        ),
    }

    indexes
}

fn load_periods(conn: &Connection) -> rusqlite::Result<(HashSet<i64>, HashSet<i64>)> {
    let mut statement = conn.prepare("SELECT period, flag FROM TimePeriod")?;
    let mut rows = statement.query([])?;

    let mut existing = HashSet::new();
    let mut model = HashSet::new();

    while let Some(row) = rows.next()? {
        let Some(period) = value_as_i64(&row.get::<_, Value>(0)?) else {
            continue;
        };

        match value_as_text(&row.get::<_, Value>(1)?).as_deref() {
            Some("e") => {
                existing.insert(period);
            }
            Some("f") => {
                model.insert(period);
            }
            _ => {}
        }
    }

    Ok((existing, model))
}

fn load_efficiency_keys(conn: &Connection) -> rusqlite::Result<HashSet<(String, String, i64)>> {
    let mut statement = conn.prepare("SELECT region, tech, vintage FROM Efficiency")?;
    let mut rows = statement.query([])?;

    let mut keys = HashSet::new();
    while let Some(row) = rows.next()? {
        let region = value_as_text(&row.get::<_, Value>(0)?);
        let tech = value_as_text(&row.get::<_, Value>(1)?);
        let vintage = value_as_i64(&row.get::<_, Value>(2)?);

        if let (Some(region), Some(tech), Some(vintage)) = (region, tech, vintage) {
            keys.insert((region, tech, vintage));
        }
    }

    Ok(keys)
}

fn load_existing_capacity(
    conn: &Connection,
) -> rusqlite::Result<HashMap<(String, String, i64), Option<f64>>> {
    let mut statement = conn.prepare("SELECT region, tech, vintage, capacity FROM ExistingCapacity")?;
    let mut rows = statement.query([])?;

    let mut capacity = HashMap::new();
    while let Some(row) = rows.next()? {
        let region = value_as_text(&row.get::<_, Value>(0)?);
        let tech = value_as_text(&row.get::<_, Value>(1)?);
        let vintage = value_as_i64(&row.get::<_, Value>(2)?);
        let amount = value_as_f64(&row.get::<_, Value>(3)?);

        if let (Some(region), Some(tech), Some(vintage)) = (region, tech, vintage) {
            capacity.insert((region, tech, vintage), amount);
        }
    }

    Ok(capacity)
}

fn load_lifetimes(conn: &Connection) -> rusqlite::Result<HashMap<(String, String), Option<f64>>> {
    let mut statement = conn.prepare("SELECT region, tech, lifetime FROM LifetimeTech")?;
    let mut rows = statement.query([])?;

    let mut lifetimes = HashMap::new();
    while let Some(row) = rows.next()? {
        let region = value_as_text(&row.get::<_, Value>(0)?);
        let tech = value_as_text(&row.get::<_, Value>(1)?);
        let lifetime = value_as_f64(&row.get::<_, Value>(2)?);

        if let (Some(region), Some(tech)) = (region, tech) {
            lifetimes.insert((region, tech), lifetime);
        }
    }

    Ok(lifetimes)
}

pub(super) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(value) => Some(*value),
        Value::Real(value) if value.fract() == 0.0 => Some(*value as i64),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(value) => Some(*value as f64),
        Value::Real(value) => Some(*value),
        _ => None,
    }
}

pub(super) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(value) => Some(value.clone()),
        Value::Integer(value) => Some(value.to_string()),
        Value::Real(value) => Some(value.to_string()),
        _ => None,
    }
}
