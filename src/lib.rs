#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! asnmap - IP range to ASN attribution with NetBox prefix sync
//!
//! asnmap matches IP addresses against a local table of address ranges,
//! derives the minimal CIDR blocks covering the matched range and publishes
//! those blocks to a NetBox IPAM instance. Addresses that match no range are
//! remembered in a missing-address store and can later be resolved in batch
//! through the Team Cymru whois service.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `server` | HTTP API (`GET /iplookup`) | `axum`, `tokio`, `tower-http` |
//! | `cli` | Full CLI binary with server support | All above + `clap`, `indicatif` |
//!
//! # Architecture
//!
//! - **[`database`]**: persistent state
//!   - `core`: SQLite connection management and schema definitions
//!   - `store`: missing-address store and processed ledger (JSON or SQLite)
//!
//! - **[`lens`]**: business logic
//!   - `cidr`: range to minimal CIDR blocks
//!   - `range`: range table loading and matching
//!   - `whois`: routing-registry whois client
//!   - `registry`: NetBox prefix sync
//!   - `lookup`: per-request lookup orchestrator
//!   - `fallback`: batch resolver for missing addresses
//!
//! - **[`config`]**: Configuration management
//!
//! # Quick Start Examples
//!
//! ## CIDR summarization
//!
//! ```rust,ignore
//! use asnmap::lens::cidr::convert_to_cidr;
//!
//! let blocks = convert_to_cidr("192.168.1.0", "192.168.1.255")?;
//! assert_eq!(blocks, vec!["192.168.1.0/24"]);
//! ```
//!
//! ## Lookup
//!
//! ```rust,ignore
//! use asnmap::{AsnmapConfig, LookupLens, RangeTable};
//! use std::sync::Arc;
//!
//! let config = AsnmapConfig::new(&None)?;
//! let table = Arc::new(RangeTable::from_csv_path(&config.range_table)?);
//! let lens = LookupLens::new(
//!     table,
//!     config.missing_store()?,
//!     Arc::new(config.sync_dispatcher()),
//! );
//!
//! let result = lens.lookup(Some("192.0.2.10"))?;
//! println!("{} -> {}", result.ip_address, result.asn);
//! ```
//!
//! ## Fallback resolution with progress
//!
//! ```rust,ignore
//! use asnmap::lens::fallback::{FallbackResolver, ResolveProgress};
//! use std::sync::Arc;
//!
//! let resolver = FallbackResolver::new(
//!     config.missing_store()?,
//!     config.processed_ledger()?,
//!     Arc::new(config.whois_client()),
//!     Arc::new(config.sync_dispatcher()),
//! )
//! .with_progress(Arc::new(|progress: ResolveProgress| {
//!     if let ResolveProgress::Address { ip, status: Some(status) } = progress {
//!         println!("{}: {}", ip, status);
//!     }
//! }));
//!
//! let summary = resolver.run()?;
//! ```

pub mod config;
pub mod database;
pub mod lens;

// Server module - requires server feature
#[cfg(feature = "server")]
pub mod server;

// =============================================================================
// Configuration
// =============================================================================

pub use config::{AsnmapConfig, StorageBackend};

// =============================================================================
// Database Module
// =============================================================================

pub use database::{DatabaseConn, SchemaDefinitions, SchemaManager, SchemaStatus, SCHEMA_VERSION};

pub use database::{
    JsonMissingStore, JsonProcessedLedger, MissingAddressStore, ProcessedLedger, ProcessedRecord,
    ProcessedStatus, SqliteMissingStore, SqliteProcessedLedger,
};

// =============================================================================
// Lens Module
// =============================================================================

pub use lens::cidr::{convert_to_cidr, summarize, CidrError};
pub use lens::fallback::{FallbackResolver, ResolveProgress, ResolveSummary};
pub use lens::lookup::{LookupError, LookupLens, LookupResult};
pub use lens::range::{RangeRecord, RangeTable};
pub use lens::registry::{NetboxClient, RegistryClient, SyncDispatcher, SyncOutcome, SyncReport};
pub use lens::utils::OutputFormat;
pub use lens::whois::{CymruWhois, WhoisClient, WhoisRecord};

// =============================================================================
// Server Module (HTTP API) - requires "server" feature
// =============================================================================

#[cfg(feature = "server")]
pub use server::{create_axum_router, start_server, ServerConfig, ServerState};
