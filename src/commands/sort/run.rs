use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::types::Value;
use tracing::{error, info, warn};

use crate::cli::SortArgs;
use crate::commands::inventory;
use crate::model::{
    DatabaseFindings, DatabaseRunRecord, RowFinding, SortPaths, SortRunManifest, ValidationReport,
};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

use super::refs;
use super::rules::{self, TemporalColumns};
use super::shape::TableShape;
use super::table;

const TIME_PERIOD_TABLE: &str = "TimePeriod";
const EFFICIENCY_TABLE: &str = "Efficiency";

pub(super) struct DatabaseReport {
    pub tables_sorted: usize,
    pub invalid_rows: Vec<RowFinding>,
}

pub fn run(args: SortArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    ensure_directory(&args.output_dir)?;
    ensure_directory(&args.manifest_dir)?;

    let run_manifest_path = args.run_manifest_path.clone().unwrap_or_else(|| {
        args.manifest_dir
            .join(format!("sort_run_{}.json", utc_compact_string(started_ts)))
    });
    let validation_report_path = args.validation_report_path.clone().unwrap_or_else(|| {
        args.manifest_dir.join(format!(
            "validation_report_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    info!(
        input_dir = %args.input_dir.display(),
        output_dir = %args.output_dir.display(),
        run_id = %run_id,
        "starting sort"
    );

    let mut database_paths = inventory::discover_databases(&args.input_dir)?;
    database_paths = inventory::filter_databases(database_paths, args.db_filter.as_deref())?;
    database_paths.sort();

    if database_paths.is_empty() {
        bail!("no sqlite databases found in {}", args.input_dir.display());
    }

    let mut records = Vec::with_capacity(database_paths.len());
    let mut findings = Vec::new();
    let mut warnings = Vec::new();
    let mut invalid_total = 0;

    for input_path in &database_paths {
        let database = input_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_path.display().to_string());
        let output_filename = format!("{database}_sorted.sqlite");
        let output_path = args.output_dir.join(&output_filename);

        info!(database = %database, "processing database");

        match sort_database(input_path, &output_path) {
            Ok(report) => {
                info!(
                    database = %database,
                    tables_sorted = report.tables_sorted,
                    invalid_rows = report.invalid_rows.len(),
                    "database processed"
                );
                invalid_total += report.invalid_rows.len();
                records.push(DatabaseRunRecord {
                    database: database.clone(),
                    output_filename,
                    status: "completed".to_string(),
                    tables_sorted: report.tables_sorted,
                    invalid_row_count: report.invalid_rows.len(),
                    failure_reason: None,
                });
                findings.push(DatabaseFindings {
                    database,
                    invalid_row_count: report.invalid_rows.len(),
                    rows: report.invalid_rows,
                });
            }
            Err(err) => {
                error!(database = %database, error = %err, "failed to process database");
                for cause in err.chain().skip(1) {
                    error!(cause = %cause, "caused by");
                }
                warnings.push(format!("{database}: {err:#}"));
                records.push(DatabaseRunRecord {
                    database,
                    output_filename,
                    status: "failed".to_string(),
                    tables_sorted: 0,
                    invalid_row_count: 0,
                    failure_reason: Some(format!("{err:#}")),
                });
            }
        }
    }

    let updated_at = now_utc_string();
    let failed_database_count = records
        .iter()
        .filter(|record| record.status == "failed")
        .count();

    let validation_report = ValidationReport {
        manifest_version: 1,
        run_id: run_id.clone(),
        generated_at: updated_at.clone(),
        database_count: records.len(),
        invalid_row_count: invalid_total,
        databases: findings,
    };
    write_json_pretty(&validation_report_path, &validation_report)?;

    let manifest = SortRunManifest {
        manifest_version: 1,
        run_id,
        status: if failed_database_count == 0 {
            "completed".to_string()
        } else {
            "completed_with_failures".to_string()
        },
        started_at,
        updated_at,
        command: render_sort_command(&args),
        paths: SortPaths {
            input_dir: args.input_dir.display().to_string(),
            output_dir: args.output_dir.display().to_string(),
            manifest_dir: args.manifest_dir.display().to_string(),
            validation_report_path: validation_report_path.display().to_string(),
        },
        database_count: records.len(),
        processed_database_count: records.len() - failed_database_count,
        failed_database_count,
        databases: records,
        warnings,
        notes: vec![
            "Each table is rewritten in canonical key order inside a single transaction."
                .to_string(),
            "Validation findings are advisory; row contents are never modified.".to_string(),
        ],
    };
    write_json_pretty(&run_manifest_path, &manifest)?;

    info!(path = %run_manifest_path.display(), "wrote sort run manifest");
    info!(path = %validation_report_path.display(), "wrote validation report");
    info!(
        databases = manifest.database_count,
        failed = failed_database_count,
        invalid_rows = invalid_total,
        "sort completed"
    );

    Ok(())
}

fn sort_database(input_path: &Path, output_path: &Path) -> Result<DatabaseReport> {
    fs::copy(input_path, output_path).with_context(|| {
        format!(
            "failed to copy {} to {}",
            input_path.display(),
            output_path.display()
        )
    })?;

    let mut conn = Connection::open(output_path)
        .with_context(|| format!("failed to open {}", output_path.display()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;

    process_database(&mut conn)
}

pub(super) fn process_database(conn: &mut Connection) -> Result<DatabaseReport> {
    // Indexes must be complete before the first rewrite: validation reads
    // the Efficiency table's original content, not the rewritten copy.
    let refs = refs::build(conn);

    let tables = table::user_tables(conn)?;
    let mut invalid_rows = Vec::new();

    if tables.iter().any(|name| name == EFFICIENCY_TABLE) {
        let columns = table::table_columns(conn, EFFICIENCY_TABLE)?;
        let data = table::read_rows(conn, EFFICIENCY_TABLE, &columns, &[])?;
        let temporal = TemporalColumns::locate(&columns);

        for row in &data.rows {
            let tags = rules::existing_capacity_tag(row, &temporal, &refs);
            if !tags.is_empty() {
                push_finding(&mut invalid_rows, EFFICIENCY_TABLE, tags, &columns, row);
            }
        }
    }

    let mut tables_sorted = 0;
    for name in &tables {
        // TimePeriod is the source of period validity and stays as-is.
        if name == TIME_PERIOD_TABLE {
            continue;
        }

        let columns = table::table_columns(conn, name)?;
        let shape = TableShape::classify(&columns);
        let sort_columns = shape.effective_sort_columns(&columns);
        if sort_columns.is_empty() {
            continue;
        }

        let data = table::read_rows(conn, name, &columns, &sort_columns)?;
        table::rewrite_sorted(conn, &data)?;
        tables_sorted += 1;

        let temporal = TemporalColumns::locate(&columns);
        for row in &data.rows {
            let tags = rules::classify_row(row, &temporal, shape, &refs);
            if !tags.is_empty() {
                push_finding(&mut invalid_rows, name, tags, &columns, row);
            }
        }
    }

    Ok(DatabaseReport {
        tables_sorted,
        invalid_rows,
    })
}

fn push_finding(
    invalid_rows: &mut Vec<RowFinding>,
    table: &str,
    tags: String,
    columns: &[String],
    row: &[Value],
) {
    let rendered = render_row(columns, row);
    warn!(table = %table, tags = %tags, row = %rendered, "invalid row");
    invalid_rows.push(RowFinding {
        table: table.to_string(),
        tags,
        row: rendered,
    });
}

fn render_row(columns: &[String], row: &[Value]) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (column, value) in columns.iter().zip(row) {
        object.insert(column.clone(), render_value(value));
    }
    serde_json::Value::Object(object)
}

fn render_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(value) => serde_json::Value::from(*value),
        Value::Real(value) => serde_json::Value::from(*value),
        Value::Text(value) => serde_json::Value::from(value.as_str()),
        Value::Blob(value) => serde_json::Value::from(format!("blob({} bytes)", value.len())),
    }
}

fn render_sort_command(args: &SortArgs) -> String {
    let mut command = vec![
        "capsort".to_string(),
        "sort".to_string(),
        "--input-dir".to_string(),
        args.input_dir.display().to_string(),
        "--output-dir".to_string(),
        args.output_dir.display().to_string(),
        "--manifest-dir".to_string(),
        args.manifest_dir.display().to_string(),
    ];

    if let Some(filter) = &args.db_filter {
        command.push("--db-filter".to_string());
        command.push(filter.clone());
    }
    if let Some(path) = &args.run_manifest_path {
        command.push("--run-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.validation_report_path {
        command.push("--validation-report-path".to_string());
        command.push(path.display().to_string());
    }

    command.join(" ")
}
