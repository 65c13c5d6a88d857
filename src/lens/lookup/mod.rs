//! Lookup lens
//!
//! The per-request use case: validate an address literal, consult the
//! missing-address store, match it against the range table, summarize the
//! matched range into CIDR blocks and publish those blocks to the registry.
//!
//! Resolution and publication are separate steps so that callers (the HTTP
//! handler) can answer as soon as the result is known and sync afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use asnmap::lens::lookup::LookupLens;
//!
//! let lens = LookupLens::new(table, missing, dispatcher);
//! let result = lens.lookup(Some("192.0.2.10"))?;
//! for prefix in &result.prefixes {
//!     println!("{}", prefix);
//! }
//! ```

use crate::database::MissingAddressStore;
use crate::lens::cidr::{summarize, CidrError};
use crate::lens::range::RangeTable;
use crate::lens::registry::{SyncDispatcher, SyncReport};
use crate::lens::utils::truncate_name;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(feature = "display")]
use tabled::Tabled;

// =============================================================================
// Types
// =============================================================================

/// Successful lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    /// The queried literal, as given
    pub ip_address: String,
    pub start_ip: IpAddr,
    pub end_ip: IpAddr,
    pub asn: String,
    pub as_name: String,
    pub as_domain: String,
    /// Ascending, disjoint blocks exactly covering `start_ip..=end_ip`
    pub prefixes: Vec<IpNet>,
}

impl LookupResult {
    /// Registry description for the live lookup path
    pub fn description(&self) -> String {
        format!("{} ({}), {}", self.as_name, self.asn, self.as_domain)
    }
}

/// Flattened row for table output
#[cfg_attr(feature = "display", derive(Tabled))]
#[derive(Debug, Clone, Serialize)]
pub struct LookupRow {
    pub ip_address: String,
    pub range: String,
    pub asn: String,
    pub as_name: String,
    pub as_domain: String,
    pub prefixes: String,
}

impl From<&LookupResult> for LookupRow {
    fn from(result: &LookupResult) -> Self {
        Self {
            ip_address: result.ip_address.clone(),
            range: format!("{} - {}", result.start_ip, result.end_ip),
            asn: result.asn.clone(),
            as_name: result.as_name.clone(),
            as_domain: result.as_domain.clone(),
            prefixes: result
                .prefixes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl LookupRow {
    /// Shorten the AS name for narrow table output
    pub fn with_name_max_len(mut self, max_len: usize) -> Self {
        self.as_name = truncate_name(&self.as_name, max_len);
        self
    }
}

/// Lookup failures, each with the message returned to API callers
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("IP address is required")]
    MissingParameter,

    #[error("Invalid IP address")]
    InvalidAddress,

    #[error("IP is in missing list, please check later")]
    AlreadyKnownMissing,

    #[error("IP not found in database")]
    NotFoundInTable,

    #[error(transparent)]
    Cidr(#[from] CidrError),

    #[error("{0:#}")]
    Persistence(anyhow::Error),
}

impl LookupError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            LookupError::MissingParameter | LookupError::InvalidAddress => 400,
            LookupError::AlreadyKnownMissing | LookupError::NotFoundInTable => 404,
            LookupError::Cidr(_) | LookupError::Persistence(_) => 500,
        }
    }
}

// =============================================================================
// Lens
// =============================================================================

/// Lookup orchestrator over the shared range table, missing store and dispatcher
#[derive(Clone)]
pub struct LookupLens {
    table: Arc<RangeTable>,
    missing: Arc<dyn MissingAddressStore>,
    dispatcher: Arc<SyncDispatcher>,
}

impl LookupLens {
    pub fn new(
        table: Arc<RangeTable>,
        missing: Arc<dyn MissingAddressStore>,
        dispatcher: Arc<SyncDispatcher>,
    ) -> Self {
        Self {
            table,
            missing,
            dispatcher,
        }
    }

    pub fn table(&self) -> &RangeTable {
        &self.table
    }

    /// Validate, match and summarize, without touching the registry
    ///
    /// An address that matches no range is added to the missing store before
    /// `NotFoundInTable` is returned. A literal already in the store is
    /// rejected without scanning the table.
    pub fn resolve(&self, ip: Option<&str>) -> Result<LookupResult, LookupError> {
        let literal = match ip {
            Some(s) if !s.is_empty() => s,
            _ => return Err(LookupError::MissingParameter),
        };
        let addr: IpAddr = literal.parse().map_err(|_| LookupError::InvalidAddress)?;

        if self.missing.contains(literal).map_err(|e| {
            error!("Failed to read missing IPs: {:#}", e);
            LookupError::Persistence(e)
        })? {
            return Err(LookupError::AlreadyKnownMissing);
        }

        let Some(record) = self.table.find(addr) else {
            self.missing.add(literal).map_err(|e| {
                error!("Failed to record missing IP {}: {:#}", literal, e);
                LookupError::Persistence(e)
            })?;
            info!("IP {} not found in range table, added to missing list", literal);
            return Err(LookupError::NotFoundInTable);
        };

        let prefixes = summarize(record.start_ip, record.end_ip)?;

        Ok(LookupResult {
            ip_address: literal.to_string(),
            start_ip: record.start_ip,
            end_ip: record.end_ip,
            asn: record.asn.clone(),
            as_name: record.as_name.clone(),
            as_domain: record.as_domain.clone(),
            prefixes,
        })
    }

    /// Publish the prefixes of a result to the registry
    pub fn publish(&self, result: &LookupResult) -> SyncReport {
        let report = self
            .dispatcher
            .publish(&result.prefixes, &result.description());
        if !report.all_accepted() {
            warn!(
                "{} of {} prefixes for {} were not synced",
                report.failed_count(),
                result.prefixes.len(),
                result.ip_address
            );
        }
        report
    }

    /// Resolve and publish in one call
    ///
    /// Registry failures are logged by [`publish`](Self::publish) and never
    /// change the returned result.
    pub fn lookup(&self, ip: Option<&str>) -> Result<LookupResult, LookupError> {
        let result = self.resolve(ip)?;
        self.publish(&result);
        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================
