//! Range table lens
//!
//! Holds the in-memory table of address ranges and their autonomous-system
//! owners, and matches query addresses against it.
//!
//! Matching is a linear scan in load order and the **first** matching row
//! wins. The table is neither sorted nor required to be non-overlapping, so a
//! broad row that appears early shadows a more specific row further down.
//!
//! The table is read from a CSV file with the header
//! `start_ip,end_ip,asn,as_name,as_domain`. Rows that cannot be used are
//! logged and skipped; they never abort the load.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

// =============================================================================
// Types
// =============================================================================

/// One address range and its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRecord {
    pub start_ip: IpAddr,
    pub end_ip: IpAddr,
    pub asn: String,
    pub as_name: String,
    pub as_domain: String,
}

/// Reasons a table row is rejected during load
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeRowError {
    #[error("unreadable row: {0}")]
    Unreadable(String),

    #[error("invalid {column} address '{value}'")]
    InvalidAddress { column: &'static str, value: String },

    #[error("start_ip {start} and end_ip {end} differ in IP version")]
    VersionMismatch { start: IpAddr, end: IpAddr },

    #[error("start_ip {start} is greater than end_ip {end}")]
    Inverted { start: IpAddr, end: IpAddr },
}

impl RangeRecord {
    /// Build a record, enforcing the same-version and ordering invariants
    pub fn new(
        start_ip: IpAddr,
        end_ip: IpAddr,
        asn: impl Into<String>,
        as_name: impl Into<String>,
        as_domain: impl Into<String>,
    ) -> Result<Self, RangeRowError> {
        if start_ip.is_ipv4() != end_ip.is_ipv4() {
            return Err(RangeRowError::VersionMismatch {
                start: start_ip,
                end: end_ip,
            });
        }
        if start_ip > end_ip {
            return Err(RangeRowError::Inverted {
                start: start_ip,
                end: end_ip,
            });
        }
        Ok(Self {
            start_ip,
            end_ip,
            asn: asn.into(),
            as_name: as_name.into(),
            as_domain: as_domain.into(),
        })
    }

    /// Check whether `ip` falls inside this range (same version only)
    pub fn contains(&self, ip: IpAddr) -> bool {
        ip.is_ipv4() == self.start_ip.is_ipv4() && self.start_ip <= ip && ip <= self.end_ip
    }
}

/// Raw CSV row before address parsing
#[derive(Debug, Deserialize)]
struct RawRangeRow {
    start_ip: String,
    end_ip: String,
    #[serde(default)]
    asn: String,
    #[serde(default)]
    as_name: String,
    #[serde(default)]
    as_domain: String,
}

impl TryFrom<RawRangeRow> for RangeRecord {
    type Error = RangeRowError;

    fn try_from(row: RawRangeRow) -> Result<Self, Self::Error> {
        let start_ip = row
            .start_ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| RangeRowError::InvalidAddress {
                column: "start_ip",
                value: row.start_ip.clone(),
            })?;
        let end_ip = row
            .end_ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| RangeRowError::InvalidAddress {
                column: "end_ip",
                value: row.end_ip.clone(),
            })?;
        RangeRecord::new(start_ip, end_ip, row.asn, row.as_name, row.as_domain)
    }
}

/// Counters collected while loading a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RangeLoadStats {
    pub loaded: usize,
    pub skipped: usize,
}

// =============================================================================
// Table
// =============================================================================

/// Immutable, ordered range table
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    records: Vec<RangeRecord>,
    stats: RangeLoadStats,
}

impl RangeTable {
    /// Build a table from already-validated records, keeping their order
    pub fn from_records(records: Vec<RangeRecord>) -> Self {
        let stats = RangeLoadStats {
            loaded: records.len(),
            skipped: 0,
        };
        Self { records, stats }
    }

    /// Load a table from a CSV file
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow!("Failed to open range table {:?}: {}", path, e))?;
        let table = Self::from_csv_reader(file)?;
        info!(
            "Loaded {} ranges from {:?} ({} rows skipped)",
            table.stats.loaded, path, table.stats.skipped
        );
        Ok(table)
    }

    /// Load a table from any CSV source
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| anyhow!("Failed to read range table header: {}", e))?;
        for column in ["start_ip", "end_ip"] {
            if !headers.iter().any(|h| h == column) {
                return Err(anyhow!("Range table is missing the '{}' column", column));
            }
        }

        let mut records = Vec::new();
        let mut stats = RangeLoadStats::default();

        for (idx, row) in rdr.deserialize::<RawRangeRow>().enumerate() {
            // header is line 1
            let line = idx + 2;
            let parsed = row
                .map_err(|e| RangeRowError::Unreadable(e.to_string()))
                .and_then(RangeRecord::try_from);
            match parsed {
                Ok(record) => {
                    stats.loaded += 1;
                    records.push(record);
                }
                Err(e) => {
                    stats.skipped += 1;
                    warn!("Skipping range table line {}: {}", line, e);
                }
            }
        }

        Ok(Self { records, stats })
    }

    /// Return the first record, in load order, that contains `ip`
    pub fn find(&self, ip: IpAddr) -> Option<&RangeRecord> {
        self.records.iter().find(|r| r.contains(ip))
    }

    pub fn records(&self) -> &[RangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loaded/skipped counts from the last load
    pub fn load_stats(&self) -> RangeLoadStats {
        self.stats
    }
}

// =============================================================================
// Tests
// =============================================================================
