use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{DatabaseInventoryManifest, SortRunManifest};
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let inventory_path = args.manifest_dir.join("db_inventory.json");

    info!(
        output_dir = %args.output_dir.display(),
        manifest_dir = %args.manifest_dir.display(),
        "status requested"
    );

    if inventory_path.exists() {
        let inventory: DatabaseInventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            database_count = inventory.database_count,
            "loaded inventory manifest"
        );
    } else {
        warn!(path = %inventory_path.display(), "inventory manifest missing");
    }

    let Some(manifest_path) = latest_run_manifest(&args.manifest_dir)? else {
        warn!(manifest_dir = %args.manifest_dir.display(), "no sort run manifest found");
        return Ok(());
    };

    let manifest: SortRunManifest = read_json(&manifest_path)?;
    info!(
        path = %manifest_path.display(),
        run_id = %manifest.run_id,
        status = %manifest.status,
        started_at = %manifest.started_at,
        databases = manifest.database_count,
        processed = manifest.processed_database_count,
        failed = manifest.failed_database_count,
        "loaded sort run manifest"
    );

    for record in &manifest.databases {
        if record.status != "completed" {
            warn!(
                database = %record.database,
                status = %record.status,
                reason = %record.failure_reason.clone().unwrap_or_default(),
                "database did not complete"
            );
            continue;
        }

        let db_path = args.output_dir.join(&record.output_filename);
        if !db_path.exists() {
            warn!(path = %db_path.display(), "output database missing");
            continue;
        }

        let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let table_count = query_count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .unwrap_or(0);

        info!(
            database = %record.database,
            path = %db_path.display(),
            tables = table_count,
            tables_sorted = record.tables_sorted,
            invalid_rows = record.invalid_row_count,
            "database status"
        );
    }

    Ok(())
}

fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    let mut latest: Option<PathBuf> = None;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();

        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("sort_run_") && name.ends_with(".json"))
            .unwrap_or(false);

        // Run manifest names embed a compact UTC timestamp, so the
        // lexicographic maximum is the most recent run.
        if is_run_manifest && latest.as_ref().is_none_or(|current| &path > current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
