//! In-memory SQLite execution through sqlx

use std::collections::{HashMap, HashSet};

use csvframe_core::{Row, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row as _, TypeInfo, ValueRef};

use crate::error::Result;
use crate::loader::LoadedTable;

/// Open a private in-memory database, load `tables` and run `sql` once
///
/// The connection lives only for this call and is dropped on every path.
pub async fn run_query(tables: &[LoadedTable], sql: &str) -> Result<Vec<Row>> {
    let options = SqliteConnectOptions::new().in_memory(true);
    let mut conn = SqliteConnection::connect_with(&options).await?;

    for table in tables {
        create_table(&mut conn, table).await?;
    }

    let rows = sqlx::query(sql).fetch_all(&mut conn).await?;
    let result = scan_rows(&rows)?;
    conn.close().await?;
    Ok(result)
}

async fn create_table(conn: &mut SqliteConnection, table: &LoadedTable) -> Result<()> {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql_name()))
        .collect();
    let ddl = format!(
        "CREATE TABLE {} ({})",
        quote_ident(&table.name),
        columns.join(", ")
    );
    sqlx::query(&ddl).execute(&mut *conn).await?;

    if table.rows.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let insert = format!(
        "INSERT INTO {} VALUES ({placeholders})",
        quote_ident(&table.name)
    );

    let mut tx = conn.begin().await?;
    for row in &table.rows {
        let mut query = sqlx::query(&insert);
        for cell in row {
            query = match cell {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Float(f) => query.bind(*f),
                Value::String(s) => query.bind(s.clone()),
            };
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Convert result rows, numbering duplicate column names positionally
fn scan_rows(rows: &[SqliteRow]) -> Result<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let names = positional_names(first.columns().iter().map(|c| c.name()));

    rows.iter()
        .map(|row| {
            let mut out = Row::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                out.insert(name.clone(), decode_cell(row, idx)?);
            }
            Ok(out)
        })
        .collect()
}

/// `col`, `col_1`, `col_2`, ... for repeated names, in projection order
///
/// A generated name never reuses a name already present in the projection,
/// so a real `score_1` column is not shadowed by the second `score`.
pub fn positional_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = names.iter().map(|name| (*name).to_string()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|&name| {
            if seen.insert(name) {
                return name.to_string();
            }
            let count = counts.entry(name).or_insert(0);
            loop {
                *count += 1;
                let candidate = format!("{name}_{count}");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

/// Decode one cell by its storage class
fn decode_cell(row: &SqliteRow, idx: usize) -> Result<Value> {
    let storage = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };
    let value = match storage.as_str() {
        "INTEGER" => Value::Int(row.try_get::<i64, _>(idx)?),
        "REAL" => Value::Float(row.try_get::<f64, _>(idx)?),
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "BLOB" => {
            let bytes = row.try_get::<Vec<u8>, _>(idx)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::String(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
