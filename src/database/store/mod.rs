//! Persistent stores for the negative cache and the resolver ledger
//!
//! Two keyed stores back the lookup pipeline:
//!
//! - [`MissingAddressStore`]: the set of address literals that matched no
//!   range. Entries are kept verbatim (no normalization) and never expire.
//! - [`ProcessedLedger`]: the single-attempt ledger of the fallback resolver,
//!   mapping an address literal to its terminal [`ProcessedStatus`].
//!
//! Both have a JSON-file backend ([`json_file`], the default, compatible with
//! the `missing_ips.json` / `processed_ips.json` layout) and a SQLite backend
//! ([`sqlite`]).

pub mod json_file;
pub mod sqlite;

pub use json_file::{JsonMissingStore, JsonProcessedLedger};
pub use sqlite::{SqliteMissingStore, SqliteProcessedLedger};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Missing addresses
// =============================================================================

/// Set of address literals known not to match the range table
pub trait MissingAddressStore: Send + Sync {
    /// Whether the exact literal is recorded
    fn contains(&self, ip: &str) -> Result<bool>;

    /// Record a literal; returns `false` if it was already present
    fn add(&self, ip: &str) -> Result<bool>;

    /// All literals in insertion order
    fn entries(&self) -> Result<Vec<String>>;
}

// =============================================================================
// Processed ledger
// =============================================================================

const COMMENT_SUCCESS: &str = "Processed successfully";
const COMMENT_INVALID_DATA: &str = "Not processed due to invalid data";
const COMMENT_WHOIS_ERROR: &str = "Not processed due to whois error";
const COMMENT_WHOIS_TIMEOUT: &str = "Not processed due to whois timeout";
const COMMENT_NETBOX_ERROR: &str = "Not processed due to NetBox error";
const COMMENT_NETBOX_TIMEOUT: &str = "Not processed due to NetBox timeout";
const COMMENT_EXCEPTION: &str = "Not processed due to exception";

/// Terminal status of one fallback resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessedStatus {
    Success,
    InvalidData,
    WhoisError { timed_out: bool },
    NetboxError { timed_out: bool },
    Exception,
}

impl ProcessedStatus {
    /// Human-readable comment stored in the ledger
    pub fn comment(&self) -> &'static str {
        match self {
            ProcessedStatus::Success => COMMENT_SUCCESS,
            ProcessedStatus::InvalidData => COMMENT_INVALID_DATA,
            ProcessedStatus::WhoisError { timed_out: false } => COMMENT_WHOIS_ERROR,
            ProcessedStatus::WhoisError { timed_out: true } => COMMENT_WHOIS_TIMEOUT,
            ProcessedStatus::NetboxError { timed_out: false } => COMMENT_NETBOX_ERROR,
            ProcessedStatus::NetboxError { timed_out: true } => COMMENT_NETBOX_TIMEOUT,
            ProcessedStatus::Exception => COMMENT_EXCEPTION,
        }
    }

    /// Parse a stored comment; unknown text maps to `Exception`
    pub fn from_comment(comment: &str) -> Self {
        match comment {
            COMMENT_SUCCESS => ProcessedStatus::Success,
            COMMENT_INVALID_DATA => ProcessedStatus::InvalidData,
            COMMENT_WHOIS_ERROR => ProcessedStatus::WhoisError { timed_out: false },
            COMMENT_WHOIS_TIMEOUT => ProcessedStatus::WhoisError { timed_out: true },
            COMMENT_NETBOX_ERROR => ProcessedStatus::NetboxError { timed_out: false },
            COMMENT_NETBOX_TIMEOUT => ProcessedStatus::NetboxError { timed_out: true },
            _ => ProcessedStatus::Exception,
        }
    }
}

impl fmt::Display for ProcessedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessedStatus::Success => "success",
            ProcessedStatus::InvalidData => "invalid-data",
            ProcessedStatus::WhoisError { timed_out: false } => "whois-error",
            ProcessedStatus::WhoisError { timed_out: true } => "whois-timeout",
            ProcessedStatus::NetboxError { timed_out: false } => "netbox-error",
            ProcessedStatus::NetboxError { timed_out: true } => "netbox-timeout",
            ProcessedStatus::Exception => "exception",
        };
        write!(f, "{}", name)
    }
}

/// One ledger entry, serialized as `{"ip": ..., "comment": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub ip: String,
    pub comment: String,
}

impl ProcessedRecord {
    pub fn new(ip: impl Into<String>, status: ProcessedStatus) -> Self {
        Self {
            ip: ip.into(),
            comment: status.comment().to_string(),
        }
    }

    pub fn status(&self) -> ProcessedStatus {
        ProcessedStatus::from_comment(&self.comment)
    }
}

/// Single-attempt ledger of fallback resolutions
pub trait ProcessedLedger: Send + Sync {
    /// Status recorded for `ip`, if any
    fn get(&self, ip: &str) -> Result<Option<ProcessedStatus>>;

    /// Record (or overwrite) the status for `ip` and persist immediately
    fn record(&self, ip: &str, status: ProcessedStatus) -> Result<()>;

    /// All records in first-recorded order
    fn records(&self) -> Result<Vec<ProcessedRecord>>;
}

// =============================================================================
// Tests
// =============================================================================
