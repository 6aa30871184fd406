use rusqlite::Connection;
use rusqlite::types::Value;

use super::refs;
use super::rules::{TemporalColumns, classify_row, existing_capacity_tag};
use super::run::process_database;
use super::shape::TableShape;

fn open_reference_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory database");
    conn.execute_batch(
        "
        CREATE TABLE TimePeriod (period INTEGER, flag TEXT);
        INSERT INTO TimePeriod VALUES (2030, 'f'), (2020, 'e'), (2025, 'f');

        CREATE TABLE Efficiency (region TEXT, tech TEXT, vintage INTEGER, efficiency REAL);
        INSERT INTO Efficiency VALUES ('R2', 'T1', 2020, 0.5);
        INSERT INTO Efficiency VALUES ('R1', 'T1', 2020, 0.42);

        CREATE TABLE ExistingCapacity (region TEXT, tech TEXT, vintage INTEGER, capacity REAL);
        INSERT INTO ExistingCapacity VALUES ('R1', 'T1', 2020, 5.0);

        CREATE TABLE LifetimeTech (region TEXT, tech TEXT, lifetime REAL);
        ",
    )
    .expect("seed reference tables");
    conn
}

fn seed_model_tables(conn: &Connection) {
    conn.execute_batch(
        "
        CREATE TABLE Capacity (region TEXT, tech TEXT, period INTEGER, vintage INTEGER, value REAL);
        INSERT INTO Capacity VALUES ('R2', 'T1', 2025, 2020, 1.0);
        INSERT INTO Capacity VALUES ('R1', 'T1', 2030, 2020, 2.0);
        INSERT INTO Capacity VALUES ('R1', 'T1', 2025, 2020, 3.0);

        CREATE TABLE GroupShare (region TEXT, period INTEGER, share REAL);
        INSERT INTO GroupShare VALUES ('R1', 2025, 0.6);
        INSERT INTO GroupShare VALUES ('R1', 1999, 0.5);

        CREATE TABLE TechInputSplit (region TEXT, tech TEXT, period INTEGER, split REAL);
        INSERT INTO TechInputSplit VALUES ('R1', 'T1', 2025, 0.7);
        INSERT INTO TechInputSplit VALUES ('R1', 'T1', 1999, 0.3);

        CREATE TABLE MetaData (key TEXT, value TEXT);
        INSERT INTO MetaData VALUES ('z', '1');
        INSERT INTO MetaData VALUES ('a', '2');
        ",
    )
    .expect("seed model tables");
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn classify(conn: &Connection, column_names: &[&str], row: Vec<Value>) -> String {
    let columns = columns(column_names);
    let shape = TableShape::classify(&columns);
    let temporal = TemporalColumns::locate(&columns);
    let indexes = refs::build(conn);
    classify_row(&row, &temporal, shape, &indexes)
}

fn period_vintage_row(region: &str, tech: &str, period: i64, vintage: i64) -> Vec<Value> {
    vec![
        text(region),
        text(tech),
        Value::Integer(period),
        Value::Integer(vintage),
    ]
}

const PERIOD_VINTAGE_COLUMNS: &[&str] = &["region", "tech", "period", "vintage"];

#[test]
fn classifies_tables_by_temporal_columns() {
    assert_eq!(
        TableShape::classify(&columns(&["region", "tech", "period", "vintage"])),
        TableShape::PeriodVintage
    );
    assert_eq!(
        TableShape::classify(&columns(&["region", "tech", "period"])),
        TableShape::PeriodOnly { has_tech: true }
    );
    assert_eq!(
        TableShape::classify(&columns(&["region", "period"])),
        TableShape::PeriodOnly { has_tech: false }
    );
    assert_eq!(
        TableShape::classify(&columns(&["region", "tech", "vintage"])),
        TableShape::VintageOnly
    );
    assert_eq!(
        TableShape::classify(&columns(&["key", "value"])),
        TableShape::Unclassified
    );
}

#[test]
fn sort_key_restricts_to_present_columns() {
    let key = TableShape::PeriodVintage.effective_sort_columns(&columns(&[
        "tech", "period", "vintage", "value",
    ]));
    assert_eq!(key, vec!["tech", "period", "vintage"]);

    let key = TableShape::Unclassified.effective_sort_columns(&columns(&["key", "value"]));
    assert!(key.is_empty());
}

#[test]
fn valid_period_vintage_row_has_no_tags() {
    let conn = open_reference_db();
    let tags = classify(
        &conn,
        PERIOD_VINTAGE_COLUMNS,
        period_vintage_row("R1", "T1", 2025, 2020),
    );
    assert_eq!(tags, "");
}

#[test]
fn vintage_outside_known_periods_is_tagged() {
    let conn = open_reference_db();
    conn.execute_batch("INSERT INTO Efficiency VALUES ('R1', 'T1', 1990, 0.4);")
        .expect("insert efficiency row");

    let tags = classify(
        &conn,
        PERIOD_VINTAGE_COLUMNS,
        period_vintage_row("R1", "T1", 2025, 1990),
    );
    assert_eq!(tags, "~vint; ");
}

#[test]
fn failing_rules_accumulate_in_fixed_order() {
    let conn = open_reference_db();
    conn.execute_batch("INSERT INTO Efficiency VALUES ('R1', 'T1', 2035, 0.5);")
        .expect("insert efficiency row");

    let tags = classify(
        &conn,
        PERIOD_VINTAGE_COLUMNS,
        period_vintage_row("R1", "T1", 2025, 2035),
    );
    assert_eq!(tags, "~vint; v>p; ");
}

#[test]
fn lifetime_defaults_to_forty_years_when_absent() {
    let conn = open_reference_db();
    conn.execute_batch(
        "
        INSERT INTO TimePeriod VALUES (2060, 'f');
        INSERT INTO Efficiency VALUES ('R9', 'T9', 2020, 0.5);
        ",
    )
    .expect("insert reference rows");

    // No LifetimeTech entry for (R9, T9): 2020 + 40 <= 2060.
    let tags = classify(
        &conn,
        PERIOD_VINTAGE_COLUMNS,
        period_vintage_row("R9", "T9", 2060, 2020),
    );
    assert_eq!(tags, "v+l<=p; ");
}

#[test]
fn declared_lifetime_overrides_the_default() {
    let conn = open_reference_db();
    conn.execute_batch(
        "
        INSERT INTO LifetimeTech VALUES ('R2', 'T2', 5.0);
        INSERT INTO Efficiency VALUES ('R2', 'T2', 2020, 0.5);
        ",
    )
    .expect("insert reference rows");

    // 2020 + 5 <= 2025 expires, while the default 40 would not.
    let tags = classify(
        &conn,
        PERIOD_VINTAGE_COLUMNS,
        period_vintage_row("R2", "T2", 2025, 2020),
    );
    assert_eq!(tags, "v+l<=p; ");
}

#[test]
fn null_lifetime_disables_the_expiry_check() {
    let conn = open_reference_db();
    conn.execute_batch(
        "
        INSERT INTO TimePeriod VALUES (2060, 'f');
        INSERT INTO LifetimeTech VALUES ('R3', 'T3', NULL);
        INSERT INTO Efficiency VALUES ('R3', 'T3', 2020, 0.5);
        ",
    )
    .expect("insert reference rows");

    let tags = classify(
        &conn,
        PERIOD_VINTAGE_COLUMNS,
        period_vintage_row("R3", "T3", 2060, 2020),
    );
    assert_eq!(tags, "");
}

#[test]
fn missing_efficiency_membership_is_tagged() {
    let conn = open_reference_db();
    let vintage_columns = &["region", "tech", "vintage", "amount"];

    let tags = classify(
        &conn,
        vintage_columns,
        vec![text("R9"), text("T9"), Value::Integer(2020), Value::Real(1.0)],
    );
    assert_eq!(tags, "~eff; ");

    let tags = classify(
        &conn,
        vintage_columns,
        vec![text("R9"), text("T9"), Value::Integer(1955), Value::Real(1.0)],
    );
    assert_eq!(tags, "~vint; ~eff; ");
}

#[test]
fn existing_capacity_gaps_are_tagged_on_efficiency_rows() {
    let conn = open_reference_db();
    conn.execute_batch(
        "
        INSERT INTO ExistingCapacity VALUES ('R3', 'T1', 2020, 0.0);
        INSERT INTO ExistingCapacity VALUES ('R4', 'T1', 2020, NULL);
        ",
    )
    .expect("insert capacity rows");

    let indexes = refs::build(&conn);
    let temporal = TemporalColumns::locate(&columns(&["region", "tech", "vintage", "efficiency"]));
    let row = |region: &str, vintage: i64| {
        vec![text(region), text("T1"), Value::Integer(vintage), Value::Real(0.5)]
    };

    // Backed by a positive capacity entry.
    assert_eq!(existing_capacity_tag(&row("R1", 2020), &temporal, &indexes), "");
    // No entry at all.
    assert_eq!(
        existing_capacity_tag(&row("R2", 2020), &temporal, &indexes),
        "~exs; "
    );
    // Zero and NULL capacities count as missing.
    assert_eq!(
        existing_capacity_tag(&row("R3", 2020), &temporal, &indexes),
        "~exs; "
    );
    assert_eq!(
        existing_capacity_tag(&row("R4", 2020), &temporal, &indexes),
        "~exs; "
    );
    // A non-existing vintage is out of scope for this check.
    assert_eq!(existing_capacity_tag(&row("R2", 2025), &temporal, &indexes), "");
}

fn single_column<T: rusqlite::types::FromSql>(conn: &Connection, sql: &str) -> Vec<T> {
    let mut statement = conn.prepare(sql).expect("prepare query");
    let rows = statement
        .query_map([], |row| row.get(0))
        .expect("run query")
        .collect::<Result<Vec<_>, _>>()
        .expect("read rows");
    rows
}

fn capacity_rows(conn: &Connection) -> Vec<(String, String, i64, i64, f64)> {
    let mut statement = conn
        .prepare("SELECT region, tech, period, vintage, value FROM Capacity")
        .expect("prepare Capacity query");
    let rows = statement
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })
        .expect("query Capacity")
        .collect::<Result<Vec<_>, _>>()
        .expect("read Capacity rows");
    rows
}

fn finding_summaries(report: &super::run::DatabaseReport) -> Vec<(String, String)> {
    report
        .invalid_rows
        .iter()
        .map(|finding| (finding.table.clone(), finding.tags.clone()))
        .collect()
}

#[test]
fn process_database_sorts_tables_and_reports_findings() {
    let mut conn = open_reference_db();
    seed_model_tables(&conn);

    let report = process_database(&mut conn).expect("process database");
    assert_eq!(report.tables_sorted, 5);

    // Missing existing capacity for (R2, T1, 2020) plus one pre-model
    // period on the tech-bearing period table.
    assert_eq!(
        finding_summaries(&report),
        vec![
            ("Efficiency".to_string(), "~exs; ".to_string()),
            ("TechInputSplit".to_string(), "~per; ".to_string()),
        ]
    );

    assert_eq!(
        capacity_rows(&conn),
        vec![
            ("R1".to_string(), "T1".to_string(), 2025, 2020, 3.0),
            ("R1".to_string(), "T1".to_string(), 2030, 2020, 2.0),
            ("R2".to_string(), "T1".to_string(), 2025, 2020, 1.0),
        ]
    );

    let group_periods: Vec<i64> = single_column(&conn, "SELECT period FROM GroupShare");
    assert_eq!(group_periods, vec![1999, 2025]);

    // TimePeriod and unclassified tables keep their original order.
    let mut statement = conn
        .prepare("SELECT period, flag FROM TimePeriod")
        .expect("prepare TimePeriod query");
    let time_periods: Vec<(i64, String)> = statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query TimePeriod")
        .collect::<Result<Vec<_>, _>>()
        .expect("read TimePeriod rows");
    assert_eq!(
        time_periods,
        vec![
            (2030, "f".to_string()),
            (2020, "e".to_string()),
            (2025, "f".to_string()),
        ]
    );

    let metadata_keys: Vec<String> = single_column(&conn, "SELECT key FROM MetaData");
    assert_eq!(metadata_keys, vec!["z".to_string(), "a".to_string()]);
}

#[test]
fn process_database_preserves_row_multiset() {
    let mut conn = open_reference_db();
    seed_model_tables(&conn);

    let report = process_database(&mut conn).expect("process database");
    assert!(report.tables_sorted > 0);

    let rows = capacity_rows(&conn);
    assert_eq!(rows.len(), 3);

    let mut values: Vec<f64> = rows.iter().map(|row| row.4).collect();
    values.sort_by(|a, b| a.partial_cmp(b).expect("total order over values"));
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
}

#[test]
fn process_database_is_idempotent() {
    let mut conn = open_reference_db();
    seed_model_tables(&conn);

    let first = process_database(&mut conn).expect("first pass");
    let rows_after_first = capacity_rows(&conn);

    let second = process_database(&mut conn).expect("second pass");
    let rows_after_second = capacity_rows(&conn);

    assert_eq!(rows_after_first, rows_after_second);
    assert_eq!(finding_summaries(&first), finding_summaries(&second));
}

#[test]
fn missing_reference_tables_degrade_to_absent() {
    let mut conn = Connection::open_in_memory().expect("open in-memory database");
    conn.execute_batch(
        "
        CREATE TABLE Capacity (region TEXT, tech TEXT, period INTEGER, vintage INTEGER, value REAL);
        INSERT INTO Capacity VALUES ('R1', 'T1', 2025, 2020, 1.0);
        ",
    )
    .expect("seed model table");

    let report = process_database(&mut conn).expect("process database");
    assert_eq!(report.tables_sorted, 1);
    assert_eq!(
        finding_summaries(&report),
        vec![("Capacity".to_string(), "~vint; ~eff; ~per; ".to_string())]
    );
}
