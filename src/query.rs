use duckdb::Connection;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::time::Instant;
use thiserror::Error;

/// Ad-hoc analytical SQL over log files. Queries reference files by path
/// through DuckDB's readers (`read_json`, `read_ndjson`, ...); this
/// surface is fully independent of the rule-condition evaluator.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{0}")]
    Engine(String),
}

impl From<duckdb::Error> for QueryError {
    fn from(err: duckdb::Error) -> Self {
        QueryError::Engine(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// Execute one SQL statement on a fresh in-memory connection and
/// materialize the full result set. Engine diagnostics pass through
/// verbatim.
pub fn run_query(sql: &str) -> Result<QueryResult, QueryError> {
    let started = Instant::now();
    let conn = Connection::open_in_memory()?;
    let mut stmt = conn.prepare(sql)?;
    let mut rows_iter = stmt.query([])?;

    let column_count = rows_iter
        .as_ref()
        .map_or(0, duckdb::Statement::column_count);
    let columns: Vec<String> = (0..column_count)
        .map(|i| {
            rows_iter
                .as_ref()
                .and_then(|s| s.column_name(i).ok())
                .map_or_else(|| format!("column{}", i), String::clone)
        })
        .collect();

    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut map = Map::with_capacity(column_count);
        for (i, name) in columns.iter().enumerate() {
            let value: duckdb::types::Value = row.get(i)?;
            map.insert(name.clone(), to_json(value));
        }
        rows.push(map);
    }

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        execution_time_ms: started.elapsed().as_millis() as u64,
    })
}

fn to_json(value: duckdb::types::Value) -> Value {
    use duckdb::types::Value as Db;
    match value {
        Db::Null => Value::Null,
        Db::Boolean(b) => Value::Bool(b),
        Db::TinyInt(n) => Value::Number(n.into()),
        Db::SmallInt(n) => Value::Number(n.into()),
        Db::Int(n) => Value::Number(n.into()),
        Db::BigInt(n) => Value::Number(n.into()),
        Db::UTinyInt(n) => Value::Number(n.into()),
        Db::USmallInt(n) => Value::Number(n.into()),
        Db::UInt(n) => Value::Number(n.into()),
        Db::UBigInt(n) => Value::Number(n.into()),
        Db::Float(n) => Number::from_f64(f64::from(n)).map_or(Value::Null, Value::Number),
        Db::Double(n) => Number::from_f64(n).map_or(Value::Null, Value::Number),
        Db::Text(s) => Value::String(s),
        Db::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
        Db::Timestamp(unit, raw) => {
            use duckdb::types::TimeUnit;
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map_or(Value::Null, |dt| Value::String(dt.to_rfc3339()))
        }
        // decimals, intervals, nested types: keep the engine's debug form
        other => Value::String(format!("{:?}", other)),
    }
}
