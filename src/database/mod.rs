//! Database module
//!
//! Persistent state for asnmap, organized into:
//!
//! - **core**: SQLite connection wrapper and schema management
//! - **store**: the missing-address set and the resolver ledger, behind
//!   backend-neutral traits
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # SQLite DatabaseConn wrapper
//! │   └── schema      # SQLite schema definitions and management
//! │
//! └── store/          # Keyed stores
//!     ├── json_file   # missing_ips.json / processed_ips.json (default)
//!     └── sqlite      # missing_ips / processed_ips tables
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use asnmap::database::{JsonMissingStore, MissingAddressStore};
//!
//! let store = JsonMissingStore::new("~/.asnmap/missing_ips.json")?;
//! if store.add("203.0.113.7")? {
//!     println!("recorded as missing");
//! }
//! ```

pub mod core;
pub mod store;

pub use self::core::{DatabaseConn, SchemaDefinitions, SchemaManager, SchemaStatus, SCHEMA_VERSION};
pub use store::{
    JsonMissingStore, JsonProcessedLedger, MissingAddressStore, ProcessedLedger, ProcessedRecord,
    ProcessedStatus, SqliteMissingStore, SqliteProcessedLedger,
};
