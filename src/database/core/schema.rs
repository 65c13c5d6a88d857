//! Database schema management
//!
//! Schema definitions for the SQLite store backend. The database holds the
//! missing-address set and the resolver ledger.

use anyhow::{anyhow, Result};
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
/// Increment this when making breaking schema changes
pub const SCHEMA_VERSION: u32 = 1;

/// Schema definitions for all tables
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    /// Schema version and global metadata
    pub const META_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS asnmap_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// Address literals that matched no range; `seq` keeps insertion order
    pub const MISSING_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS missing_ips (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            ip TEXT NOT NULL UNIQUE,
            added_at INTEGER NOT NULL
        );
    "#;

    /// Fallback resolver ledger, one row per address
    pub const PROCESSED_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS processed_ips (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            ip TEXT NOT NULL UNIQUE,
            comment TEXT NOT NULL,
            processed_at TEXT NOT NULL
        );
    "#;

    pub const TABLES: &'static [&'static str] = &["asnmap_meta", "missing_ips", "processed_ips"];
}

/// Schema manager for initialization and version checks
pub struct SchemaManager<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaManager<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create all tables (idempotent) and record the schema version
    pub fn initialize(&self) -> Result<()> {
        for (name, sql) in [
            ("asnmap_meta", SchemaDefinitions::META_TABLE),
            ("missing_ips", SchemaDefinitions::MISSING_TABLE),
            ("processed_ips", SchemaDefinitions::PROCESSED_TABLE),
        ] {
            self.conn
                .execute(sql, [])
                .map_err(|e| anyhow!("Failed to create {} table: {}", name, e))?;
        }

        self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    /// Check the schema status
    pub fn check_status(&self) -> Result<SchemaStatus> {
        let meta_exists: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='asnmap_meta'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if meta_exists == 0 {
            return Ok(SchemaStatus::NotInitialized);
        }

        let version = self
            .get_meta("schema_version")?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Ok(SchemaStatus::Incompatible {
                database_version: version,
                required_version: SCHEMA_VERSION,
            });
        }
        if version < SCHEMA_VERSION {
            return Ok(SchemaStatus::NeedsMigration {
                from: version,
                to: SCHEMA_VERSION,
            });
        }

        for table in SchemaDefinitions::TABLES {
            let count: i32 = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .map_err(|e| anyhow!("Failed to check table {}: {}", table, e))?;
            if count == 0 {
                return Ok(SchemaStatus::Corrupted);
            }
        }

        Ok(SchemaStatus::Current)
    }

    /// Set a metadata value
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO asnmap_meta (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))",
                [key, value],
            )
            .map_err(|e| anyhow!("Failed to set meta {}: {}", key, e))?;
        Ok(())
    }

    /// Get a metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM asnmap_meta WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| anyhow!("Failed to get meta {}: {}", key, e))
    }
}

/// Schema status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Fresh database
    NotInitialized,

    /// Schema is current and valid
    Current,

    /// Schema needs migration from an older version
    NeedsMigration { from: u32, to: u32 },

    /// Database is from a newer version
    Incompatible {
        database_version: u32,
        required_version: u32,
    },

    /// Missing tables
    Corrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_and_check() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);

        assert_eq!(manager.check_status().unwrap(), SchemaStatus::NotInitialized);
        manager.initialize().unwrap();
        assert_eq!(manager.check_status().unwrap(), SchemaStatus::Current);

        // initialize is idempotent
        manager.initialize().unwrap();
        assert_eq!(manager.check_status().unwrap(), SchemaStatus::Current);
    }

    #[test]
    fn test_newer_database_is_incompatible() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        manager
            .set_meta("schema_version", &(SCHEMA_VERSION + 1).to_string())
            .unwrap();

        assert_eq!(
            manager.check_status().unwrap(),
            SchemaStatus::Incompatible {
                database_version: SCHEMA_VERSION + 1,
                required_version: SCHEMA_VERSION,
            }
        );
    }

    #[test]
    fn test_dropped_table_is_corrupted() {
        let conn = Connection::open_in_memory().unwrap();
        let manager = SchemaManager::new(&conn);
        manager.initialize().unwrap();
        conn.execute("DROP TABLE processed_ips", []).unwrap();
        assert_eq!(manager.check_status().unwrap(), SchemaStatus::Corrupted);
    }
}
