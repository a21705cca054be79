//! Data Engine
//!
//! Read-only access to the analytics database. Every call opens its own read-only connection, so
//! one engine can be shared across concurrent pipelines.

use crate::error::EngineError;
use crate::state::Row;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// VM instructions between deadline checks
const PROGRESS_INTERVAL: i32 = 1_000;

/// A table or view in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub name: String,
    pub kind: String,
}

/// Query backend used by the executor
pub trait DataEngine: Send + Sync {
    /// Run a read-only query, giving up once `timeout` has elapsed.
    fn run(&self, query: &str, timeout: Duration) -> Result<Vec<Row>, EngineError>;

    /// Compact schema text for the generator prompt.
    fn describe_schema(&self) -> Result<String, EngineError>;

    /// Tables and views present in the database.
    fn list_objects(&self) -> Result<Vec<SchemaObject>, EngineError>;
}

/// SQLite engine over a database file
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    path: PathBuf,
    max_rows: usize,
    tables: Vec<String>,
}

impl SqliteEngine {
    /// `tables` limits the schema description; empty means every table and view.
    pub fn new(path: impl Into<PathBuf>, max_rows: usize, tables: Vec<String>) -> Self {
        Self {
            path: path.into(),
            max_rows,
            tables,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| EngineError::Open {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn columns_of(conn: &Connection, object: &str) -> Result<Vec<(String, String)>, EngineError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(object)))?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

/// Quote an identifier when it is not a plain word.
pub fn quote_ident(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

impl DataEngine for SqliteEngine {
    fn run(&self, query: &str, timeout: Duration) -> Result<Vec<Row>, EngineError> {
        let conn = self.connect()?;
        let deadline = Instant::now() + timeout;
        conn.progress_handler(PROGRESS_INTERVAL, Some(move || Instant::now() >= deadline));

        let timed_out = |err: rusqlite::Error| {
            if Instant::now() >= deadline {
                EngineError::Timeout(timeout)
            } else {
                EngineError::from(err)
            }
        };

        let mut stmt = conn.prepare(query).map_err(timed_out)?;
        if !stmt.readonly() {
            return Err(EngineError::Disallowed(
                "statement would modify the database".to_string(),
            ));
        }
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query([]).map_err(timed_out)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(timed_out)? {
            if out.len() >= self.max_rows {
                debug!(max_rows = self.max_rows, "Row limit reached, truncating result");
                break;
            }
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            out.push(record);
        }
        trace!(rows = out.len(), "Query returned");
        Ok(out)
    }

    fn describe_schema(&self) -> Result<String, EngineError> {
        let conn = self.connect()?;
        let objects = self.list_objects()?;
        let wanted: Vec<&SchemaObject> = if self.tables.is_empty() {
            objects.iter().collect()
        } else {
            let picked: Vec<&SchemaObject> = self
                .tables
                .iter()
                .filter_map(|t| objects.iter().find(|o| o.name.eq_ignore_ascii_case(t)))
                .collect();
            if picked.is_empty() {
                objects.iter().collect()
            } else {
                picked
            }
        };

        let mut lines = Vec::with_capacity(wanted.len());
        for object in wanted {
            let columns = Self::columns_of(&conn, &object.name)?
                .into_iter()
                .map(|(name, ty)| {
                    if ty.is_empty() {
                        quote_ident(&name)
                    } else {
                        format!("{} {}", quote_ident(&name), ty)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("{}({})", quote_ident(&object.name), columns));
        }
        Ok(lines.join("\n"))
    }

    fn list_objects(&self) -> Result<Vec<SchemaObject>, EngineError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let objects = stmt
            .query_map([], |row| {
                Ok(SchemaObject {
                    name: row.get(0)?,
                    kind: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(objects)
    }
}
