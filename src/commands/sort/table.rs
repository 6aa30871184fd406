use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

pub(super) struct TableData {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub(super) fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut statement = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
        .context("failed to enumerate tables")?;

    let names = statement
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()
        .context("failed to read table names")?;

    Ok(names)
}

pub(super) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let pragma_sql = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut statement = conn
        .prepare(&pragma_sql)
        .with_context(|| format!("failed to inspect schema for table {table}"))?;

    let mut columns = Vec::new();
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }

    Ok(columns)
}

/// Reads every row of a table, ordered ascending by `sort_columns` when
/// any are given. Values come back untyped so the rewrite can reinsert
/// them bit-for-bit.
pub(super) fn read_rows(
    conn: &Connection,
    table: &str,
    columns: &[String],
    sort_columns: &[&str],
) -> Result<TableData> {
    let mut sql = format!("SELECT * FROM {}", quote_identifier(table));
    if !sort_columns.is_empty() {
        let order_by = sort_columns
            .iter()
            .map(|column| format!("{} ASC", quote_identifier(column)))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {order_by}"));
    }

    let mut statement = conn
        .prepare(&sql)
        .with_context(|| format!("failed to read table {table}"))?;

    let mut rows = Vec::new();
    let mut raw_rows = statement.query([])?;
    while let Some(row) = raw_rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(row.get::<_, Value>(index)?);
        }
        rows.push(values);
    }

    Ok(TableData {
        name: table.to_string(),
        columns: columns.to_vec(),
        rows,
    })
}

/// Replaces the table's contents with `data.rows` in order. Delete and
/// reinsert run inside one transaction, so an interrupted rewrite rolls
/// back and never leaves the table partially empty.
pub(super) fn rewrite_sorted(conn: &mut Connection, data: &TableData) -> Result<()> {
    let tx = conn
        .transaction()
        .with_context(|| format!("failed to begin rewrite of table {}", data.name))?;

    {
        tx.execute(&format!("DELETE FROM {}", quote_identifier(&data.name)), [])
            .with_context(|| format!("failed to clear table {}", data.name))?;

        let column_list = data
            .columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=data.columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_identifier(&data.name)
        );

        let mut statement = tx
            .prepare(&insert_sql)
            .with_context(|| format!("failed to prepare reinsert for table {}", data.name))?;

        for row in &data.rows {
            statement
                .execute(params_from_iter(row.iter()))
                .with_context(|| format!("failed to reinsert row into table {}", data.name))?;
        }
    }

    tx.commit()
        .with_context(|| format!("failed to commit rewrite of table {}", data.name))?;

    Ok(())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
