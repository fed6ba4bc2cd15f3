use crate::errors::{AppError, AppResult};
use crate::models::{
    format_time_of_day, parse_date, parse_time_of_day, CreateEvent, Event, Priority, UpdateEvent,
    DATE_FORMAT,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const EVENT_COLUMNS: &str =
    "id, title, description, date, time, priority, completed, created_at, updated_at";

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// Durable keyed storage for events with lookups by date and priority.
///
/// List operations return events ordered by `(date, time)` ascending.
/// `update` is a no-op, leaving `updated_at` untouched, when no field differs
/// from the stored value.
pub trait RecordStore: Send + Sync {
    fn init(&self) -> StoreFuture<'_, ()>;
    fn insert(&self, event: CreateEvent) -> StoreFuture<'_, i64>;
    fn get(&self, id: i64) -> StoreFuture<'_, Option<Event>>;
    fn get_all(&self) -> StoreFuture<'_, Vec<Event>>;
    fn get_by_date(&self, date: NaiveDate) -> StoreFuture<'_, Vec<Event>>;
    fn get_by_priority(&self, priority: Priority) -> StoreFuture<'_, Vec<Event>>;
    fn update(&self, id: i64, changes: UpdateEvent) -> StoreFuture<'_, ()>;
    fn delete(&self, id: i64) -> StoreFuture<'_, ()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

#[derive(Debug)]
pub struct SqliteRecordStore {
    location: DatabaseLocation,
    conn: Mutex<Option<Connection>>,
}

impl SqliteRecordStore {
    pub fn new(path: &Path) -> Self {
        Self {
            location: DatabaseLocation::File(path.to_path_buf()),
            conn: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            conn: Mutex::new(None),
        }
    }

    /// Opens the connection and applies the schema. Calling it again once
    /// open is a no-op.
    pub fn open(&self) -> AppResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        if guard.is_some() {
            return Ok(());
        }

        let conn = match &self.location {
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)
                            .map_err(|err| AppError::StorageUnavailable(err.to_string()))?;
                    }
                }
                Connection::open(path)
            }
            DatabaseLocation::Memory => Connection::open_in_memory(),
        }
        .map_err(|err| AppError::StorageUnavailable(err.to_string()))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|err| AppError::StorageUnavailable(err.to_string()))?;

        *guard = Some(conn);
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let conn = guard.as_ref().ok_or_else(|| {
            AppError::StorageUnavailable("record store has not been initialized".to_string())
        })?;
        f(conn)
    }

    pub fn insert_event(&self, payload: &CreateEvent) -> AppResult<i64> {
        payload.validate()?;
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (title, description, date, time, priority, completed, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, NULL)",
                params![
                    payload.title.trim(),
                    payload.description,
                    payload.date.format(DATE_FORMAT).to_string(),
                    format_time_of_day(payload.time),
                    payload.priority.as_i64(),
                    now.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_event(&self, id: i64) -> AppResult<Option<Event>> {
        self.with_conn(|conn| load_event(conn, id))
    }

    pub fn list_events(&self) -> AppResult<Vec<Event>> {
        self.with_conn(|conn| {
            query_events(
                conn,
                &format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY date ASC, time ASC, id ASC"),
                [],
            )
        })
    }

    pub fn list_events_by_date(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        self.with_conn(|conn| {
            query_events(
                conn,
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE date = ?1 ORDER BY time ASC, id ASC"),
                [date.format(DATE_FORMAT).to_string()],
            )
        })
    }

    pub fn list_events_by_priority(&self, priority: Priority) -> AppResult<Vec<Event>> {
        self.with_conn(|conn| {
            query_events(
                conn,
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE priority = ?1 ORDER BY date ASC, time ASC, id ASC"
                ),
                [priority.as_i64()],
            )
        })
    }

    pub fn update_event(&self, id: i64, changes: &UpdateEvent) -> AppResult<()> {
        changes.validate()?;
        self.with_conn(|conn| {
            let Some(mut event) = load_event(conn, id)? else {
                return Err(AppError::NotFound(format!("event {} not found", id)));
            };
            if !changes.apply_to(&mut event) {
                return Ok(());
            }

            conn.execute(
                "UPDATE events
                 SET title = ?1, description = ?2, date = ?3, time = ?4, priority = ?5,
                     completed = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    event.title,
                    event.description,
                    event.date.format(DATE_FORMAT).to_string(),
                    format_time_of_day(event.time),
                    event.priority.as_i64(),
                    event.completed,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_event(&self, id: i64) -> AppResult<()> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM events WHERE id = ?1", [id])?;
            if removed == 0 {
                return Err(AppError::NotFound(format!("event {} not found", id)));
            }
            Ok(())
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn init(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.open() })
    }

    fn insert(&self, event: CreateEvent) -> StoreFuture<'_, i64> {
        Box::pin(async move { self.insert_event(&event) })
    }

    fn get(&self, id: i64) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move { self.get_event(id) })
    }

    fn get_all(&self) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { self.list_events() })
    }

    fn get_by_date(&self, date: NaiveDate) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { self.list_events_by_date(date) })
    }

    fn get_by_priority(&self, priority: Priority) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move { self.list_events_by_priority(priority) })
    }

    fn update(&self, id: i64, changes: UpdateEvent) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.update_event(id, &changes) })
    }

    fn delete(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.delete_event(id) })
    }
}

fn load_event(conn: &Connection, id: i64) -> AppResult<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            [id],
            map_event_row,
        )
        .optional()?;
    Ok(event)
}

fn query_events<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> AppResult<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map_event_row)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

fn map_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let priority: i64 = row.get(5)?;
    let updated_at: Option<String> = row.get(8)?;
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: parse_date(&row.get::<_, String>(3)?).map_err(|err| conversion_error(3, err))?,
        time: parse_time_of_day(&row.get::<_, String>(4)?).map_err(|err| conversion_error(4, err))?,
        priority: Priority::try_from(priority).map_err(|err| conversion_error(5, err))?,
        completed: row.get(6)?,
        created_at: parse_timestamp(&row.get::<_, String>(7)?, 7)?,
        updated_at: updated_at.map(|raw| parse_timestamp(&raw, 8)).transpose()?,
    })
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(column, error))
}

fn conversion_error(column: usize, error: impl ToString) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
    )
}
