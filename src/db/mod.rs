mod journal;
pub(crate) mod predicate;
mod projects;
mod stats;
mod tags;
mod tasks;
mod users;

use crate::errors::{AppError, AppResult};
use crate::models::Metadata;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Single owner of the SQLite connection. Built once at startup and shared by reference.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        Self::open(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open(path: &Path, busy_timeout: Duration) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.busy_timeout(busy_timeout)?;
        predicate::register_functions(&conn)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        tracing::info!(path = %path.display(), "database ready");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AppError::poisoned())
    }
}

/// Projects and tasks are reachable by their owner; tasks also by the owner of their project.
fn owned_project_exists(conn: &Connection, owner: &str, project_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM projects WHERE id = ?1 AND user_id = ?2",
        params![project_id, owner],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fixed-width UTC timestamps keep lexical and chronological order identical.
fn format_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

fn parse_optional_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_time(&raw)).transpose()
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| conversion_error(error.to_string()))
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Folds `update` into `target`, recursing into nested objects so keys the
/// caller did not mention survive.
fn merge_metadata(target: &mut Metadata, update: Metadata) {
    for (key, value) in update {
        merge_json(target.entry(key).or_insert(serde_json::Value::Null), value);
    }
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
