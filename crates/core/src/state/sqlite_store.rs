//! SQLite-backed reingest store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{ReingestRecord, ReingestStatus, ReingestStore, StatusCounts, StoreError};

const SELECT_COLUMNS: &str = "SELECT package_id, pipeline_id, transfer_id, status, message, start_time, end_time, created_at FROM reingests";

/// Row as stored, before status and timestamps are decoded.
struct RawRecord {
    package_id: String,
    pipeline_id: String,
    transfer_id: Option<String>,
    status: String,
    message: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            package_id: row.get(0)?,
            pipeline_id: row.get(1)?,
            transfer_id: row.get(2)?,
            status: row.get(3)?,
            message: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<ReingestRecord, StoreError> {
        let status = self
            .status
            .parse::<ReingestStatus>()
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.package_id, e)))?;

        Ok(ReingestRecord {
            start_time: parse_optional_timestamp(&self.package_id, self.start_time)?,
            end_time: parse_optional_timestamp(&self.package_id, self.end_time)?,
            created_at: parse_timestamp(&self.package_id, &self.created_at)?,
            package_id: self.package_id,
            pipeline_id: self.pipeline_id,
            transfer_id: self.transfer_id,
            status,
            message: self.message,
        })
    }
}

fn parse_timestamp(package_id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{}: bad timestamp {:?}: {}", package_id, value, e)))
}

fn parse_optional_timestamp(
    package_id: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| parse_timestamp(package_id, &v)).transpose()
}

/// SQLite-backed reingest store.
pub struct SqliteReingestStore {
    conn: Mutex<Connection>,
}

impl SqliteReingestStore {
    /// Open (or create) the store at `path`, creating the schema if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS reingests (
                package_id TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL,
                transfer_id TEXT,
                status TEXT NOT NULL,
                message TEXT,
                start_time TEXT,
                end_time TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reingests_pipeline_status ON reingests(pipeline_id, status);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn fetch(conn: &Connection, package_id: &str) -> Result<Option<ReingestRecord>, StoreError> {
        let sql = format!("{} WHERE package_id = ?", SELECT_COLUMNS);
        conn.query_row(&sql, params![package_id], RawRecord::from_row)
            .optional()?
            .map(RawRecord::decode)
            .transpose()
    }

    fn query(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ReingestRecord>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawRecord::from_row)?;

        let mut records = Vec::new();
        for row_result in rows {
            records.push(row_result?.decode()?);
        }
        Ok(records)
    }

    /// Apply a guarded single-row UPDATE. The status guard lives in the
    /// WHERE clause so the check and the write are one atomic statement.
    fn transition(
        &self,
        package_id: &str,
        operation: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<ReingestRecord, StoreError> {
        let conn = self.conn()?;

        let changed = conn.execute(sql, params)?;
        if changed == 0 {
            return match Self::fetch(&conn, package_id)? {
                None => Err(StoreError::NotFound(package_id.to_string())),
                Some(current) => Err(StoreError::InvalidTransition {
                    package_id: package_id.to_string(),
                    current: current.status,
                    operation: operation.to_string(),
                }),
            };
        }

        Self::fetch(&conn, package_id)?
            .ok_or_else(|| StoreError::NotFound(package_id.to_string()))
    }
}

impl ReingestStore for SqliteReingestStore {
    fn upsert_new(&self, package_id: &str, pipeline_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO reingests (package_id, pipeline_id, status, created_at) VALUES (?, ?, ?, ?)",
            params![
                package_id,
                pipeline_id,
                ReingestStatus::New.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get(&self, package_id: &str) -> Result<Option<ReingestRecord>, StoreError> {
        let conn = self.conn()?;
        Self::fetch(&conn, package_id)
    }

    fn set_in_progress(
        &self,
        package_id: &str,
        transfer_id: &str,
        start_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError> {
        self.transition(
            package_id,
            "start",
            "UPDATE reingests SET status = ?, transfer_id = ?, start_time = ?, message = NULL WHERE package_id = ? AND status = ?",
            params![
                ReingestStatus::InProgress.as_str(),
                transfer_id,
                start_time.to_rfc3339(),
                package_id,
                ReingestStatus::New.as_str(),
            ],
        )
    }

    fn set_complete(
        &self,
        package_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError> {
        self.transition(
            package_id,
            "complete",
            "UPDATE reingests SET status = ?, end_time = ?, message = NULL WHERE package_id = ? AND status = ?",
            params![
                ReingestStatus::Complete.as_str(),
                end_time.to_rfc3339(),
                package_id,
                ReingestStatus::InProgress.as_str(),
            ],
        )
    }

    fn set_error(
        &self,
        package_id: &str,
        message: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError> {
        self.transition(
            package_id,
            "fail",
            "UPDATE reingests SET status = ?, message = ?, end_time = ? WHERE package_id = ? AND status = ?",
            params![
                ReingestStatus::Error.as_str(),
                message,
                end_time.to_rfc3339(),
                package_id,
                ReingestStatus::InProgress.as_str(),
            ],
        )
    }

    fn set_initiation_failed(
        &self,
        package_id: &str,
        message: &str,
        end_time: DateTime<Utc>,
    ) -> Result<ReingestRecord, StoreError> {
        self.transition(
            package_id,
            "reject",
            "UPDATE reingests SET status = ?, message = ?, end_time = ? WHERE package_id = ? AND status = ?",
            params![
                ReingestStatus::Error.as_str(),
                message,
                end_time.to_rfc3339(),
                package_id,
                ReingestStatus::New.as_str(),
            ],
        )
    }

    fn count_in_progress(&self, pipeline_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reingests WHERE pipeline_id = ? AND status = ?",
            params![pipeline_id, ReingestStatus::InProgress.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn list_new(&self, pipeline_id: &str, limit: usize) -> Result<Vec<ReingestRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE pipeline_id = ? AND status = ? ORDER BY rowid ASC LIMIT ?",
            SELECT_COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Self::query(
            &conn,
            &sql,
            params![pipeline_id, ReingestStatus::New.as_str(), limit],
        )
    }

    fn list_in_progress(&self, pipeline_id: &str) -> Result<Vec<ReingestRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE pipeline_id = ? AND status = ? ORDER BY rowid ASC",
            SELECT_COLUMNS
        );
        Self::query(
            &conn,
            &sql,
            params![pipeline_id, ReingestStatus::InProgress.as_str()],
        )
    }

    fn list_by_status(&self, status: ReingestStatus) -> Result<Vec<ReingestRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("{} WHERE status = ? ORDER BY rowid ASC", SELECT_COLUMNS);
        Self::query(&conn, &sql, params![status.as_str()])
    }

    fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM reingests GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row_result in rows {
            let (status, count) = row_result?;
            let status = status
                .parse::<ReingestStatus>()
                .map_err(StoreError::Corrupt)?;
            counts.set(status, count.max(0) as usize);
        }
        Ok(counts)
    }

    fn dump(&self) -> Result<Vec<ReingestRecord>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("{} ORDER BY rowid ASC", SELECT_COLUMNS);
        Self::query(&conn, &sql, &[])
    }
}
