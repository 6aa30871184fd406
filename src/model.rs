use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub database_count: usize,
    pub databases: Vec<DatabaseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortPaths {
    pub input_dir: String,
    pub output_dir: String,
    pub manifest_dir: String,
    pub validation_report_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseRunRecord {
    pub database: String,
    pub output_filename: String,
    pub status: String,
    pub tables_sorted: usize,
    pub invalid_row_count: usize,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub paths: SortPaths,
    pub database_count: usize,
    pub processed_database_count: usize,
    pub failed_database_count: usize,
    pub databases: Vec<DatabaseRunRecord>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFinding {
    pub table: String,
    pub tags: String,
    pub row: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseFindings {
    pub database: String,
    pub invalid_row_count: usize,
    pub rows: Vec<RowFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub database_count: usize,
    pub invalid_row_count: usize,
    pub databases: Vec<DatabaseFindings>,
}
