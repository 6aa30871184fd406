use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::info;

use crate::cli::InventoryArgs;
use crate::model::{DatabaseEntry, DatabaseInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.input_dir, args.db_filter.as_deref())?;

    if args.dry_run {
        info!(
            database_count = manifest.database_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| PathBuf::from("manifests").join("db_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(database_count = manifest.database_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(
    input_dir: &Path,
    db_filter: Option<&str>,
) -> Result<DatabaseInventoryManifest> {
    let mut database_paths = discover_databases(input_dir)?;
    database_paths = filter_databases(database_paths, db_filter)?;
    database_paths.sort();

    if database_paths.is_empty() {
        bail!("no sqlite databases found in {}", input_dir.display());
    }

    let mut databases = Vec::with_capacity(database_paths.len());
    for path in database_paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        let sha256 = sha256_file(&path)?;
        let size_bytes = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();

        databases.push(DatabaseEntry {
            filename,
            sha256,
            size_bytes,
        });
    }

    Ok(DatabaseInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: input_dir.display().to_string(),
        database_count: databases.len(),
        databases,
    })
}

pub fn discover_databases(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut databases = Vec::new();

    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_sqlite = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("sqlite"))
            .unwrap_or(false);

        if is_sqlite {
            databases.push(path);
        }
    }

    Ok(databases)
}

pub fn filter_databases(paths: Vec<PathBuf>, db_filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let Some(pattern) = db_filter else {
        return Ok(paths);
    };

    let regex = Regex::new(pattern)
        .with_context(|| format!("invalid database filter pattern: {pattern}"))?;

    Ok(paths
        .into_iter()
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(|stem| regex.is_match(stem))
                .unwrap_or(false)
        })
        .collect())
}
