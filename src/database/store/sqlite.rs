//! SQLite store backends
//!
//! Same contracts as the JSON-file backends, with each mutation a single
//! SQLite statement. Useful when the server and the resolver run as separate
//! processes against the same data directory.

use super::{MissingAddressStore, ProcessedLedger, ProcessedRecord, ProcessedStatus};
use crate::database::core::{DatabaseConn, SchemaManager, SchemaStatus};
use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::OptionalExtension;
use std::sync::{Mutex, MutexGuard};

/// Open a database and make sure the schema is usable
fn open_initialized(path: Option<&str>) -> Result<DatabaseConn> {
    let db = DatabaseConn::open(path)?;
    let manager = SchemaManager::new(&db.conn);
    match manager.check_status()? {
        SchemaStatus::Current => {}
        SchemaStatus::NotInitialized
        | SchemaStatus::NeedsMigration { .. }
        | SchemaStatus::Corrupted => manager.initialize()?,
        SchemaStatus::Incompatible {
            database_version,
            required_version,
        } => {
            return Err(anyhow!(
                "Database schema version {} is newer than supported version {}",
                database_version,
                required_version
            ))
        }
    }
    Ok(db)
}

fn lock(conn: &Mutex<DatabaseConn>) -> Result<MutexGuard<'_, DatabaseConn>> {
    conn.lock()
        .map_err(|_| anyhow!("Database lock poisoned by an earlier panic"))
}

// =============================================================================
// Missing addresses
// =============================================================================

/// Missing-address set stored in the `missing_ips` table
pub struct SqliteMissingStore {
    conn: Mutex<DatabaseConn>,
}

impl SqliteMissingStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_initialized(Some(path))?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_initialized(None)?),
        })
    }
}

impl MissingAddressStore for SqliteMissingStore {
    fn contains(&self, ip: &str) -> Result<bool> {
        let db = lock(&self.conn)?;
        let found: Option<i64> = db
            .conn
            .query_row("SELECT seq FROM missing_ips WHERE ip = ?1", [ip], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| anyhow!("Failed to query missing IP {}: {}", ip, e))?;
        Ok(found.is_some())
    }

    fn add(&self, ip: &str) -> Result<bool> {
        let db = lock(&self.conn)?;
        let inserted = db.execute_with_params(
            "INSERT OR IGNORE INTO missing_ips (ip, added_at) VALUES (?1, ?2)",
            rusqlite::params![ip, Utc::now().timestamp()],
        )?;
        Ok(inserted > 0)
    }

    fn entries(&self) -> Result<Vec<String>> {
        let db = lock(&self.conn)?;
        let mut stmt = db
            .conn
            .prepare("SELECT ip FROM missing_ips ORDER BY seq")
            .map_err(|e| anyhow!("Failed to prepare missing IP query: {}", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| anyhow!("Failed to query missing IPs: {}", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| anyhow!("Failed to read missing IPs: {}", e))
    }
}

// =============================================================================
// Processed ledger
// =============================================================================

/// Resolver ledger stored in the `processed_ips` table
pub struct SqliteProcessedLedger {
    conn: Mutex<DatabaseConn>,
}

impl SqliteProcessedLedger {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_initialized(Some(path))?),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_initialized(None)?),
        })
    }
}

impl ProcessedLedger for SqliteProcessedLedger {
    fn get(&self, ip: &str) -> Result<Option<ProcessedStatus>> {
        let db = lock(&self.conn)?;
        let comment: Option<String> = db
            .conn
            .query_row(
                "SELECT comment FROM processed_ips WHERE ip = ?1",
                [ip],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| anyhow!("Failed to query processed IP {}: {}", ip, e))?;
        Ok(comment.map(|c| ProcessedStatus::from_comment(&c)))
    }

    fn record(&self, ip: &str, status: ProcessedStatus) -> Result<()> {
        let db = lock(&self.conn)?;
        db.execute_with_params(
            r#"
            INSERT INTO processed_ips (ip, comment, processed_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(ip) DO UPDATE SET comment = excluded.comment, processed_at = excluded.processed_at
            "#,
            rusqlite::params![ip, status.comment(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<ProcessedRecord>> {
        let db = lock(&self.conn)?;
        let mut stmt = db
            .conn
            .prepare("SELECT ip, comment FROM processed_ips ORDER BY seq")
            .map_err(|e| anyhow!("Failed to prepare processed IP query: {}", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProcessedRecord {
                    ip: row.get(0)?,
                    comment: row.get(1)?,
                })
            })
            .map_err(|e| anyhow!("Failed to query processed IPs: {}", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| anyhow!("Failed to read processed IPs: {}", e))
    }
}

// =============================================================================
// Tests
// =============================================================================
