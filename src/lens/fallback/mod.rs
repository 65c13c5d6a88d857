//! Fallback resolver lens
//!
//! Resolves addresses from the missing-address store through the
//! routing-registry whois service and publishes the announced prefix to the
//! registry. Runs as a batch, one address at a time.
//!
//! Every address is attempted at most once: the outcome is written to the
//! processed ledger immediately, and any address already present in the
//! ledger is skipped on this and every later run, whatever its status.
//!
//! # Example
//!
//! ```rust,ignore
//! use asnmap::lens::fallback::{FallbackResolver, ResolveProgress};
//! use std::sync::Arc;
//!
//! let resolver = FallbackResolver::new(missing, ledger, whois, dispatcher)
//!     .with_progress(Arc::new(|p: ResolveProgress| {
//!         if let ResolveProgress::Completed { summary } = p {
//!             println!("{} resolved", summary.success);
//!         }
//!     }));
//! let summary = resolver.run()?;
//! ```

use crate::database::{MissingAddressStore, ProcessedLedger, ProcessedStatus};
use crate::lens::registry::SyncDispatcher;
use crate::lens::whois::{WhoisClient, WhoisError, WhoisRecord};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Progress Tracking Types
// =============================================================================

/// Progress information for a resolver run
#[derive(Debug, Clone, Serialize)]
pub enum ResolveProgress {
    /// The missing-address store has been read
    Started {
        /// Entries in the missing-address store
        total: usize,
        /// Entries not yet in the ledger
        pending: usize,
    },
    /// One address was handled
    Address {
        ip: String,
        /// `None` when the address was already in the ledger
        status: Option<ProcessedStatus>,
    },
    /// The run has finished or was cancelled
    Completed { summary: ResolveSummary },
}

/// Type alias for resolver progress callbacks
pub type ResolveProgressCallback = Arc<dyn Fn(ResolveProgress) + Send + Sync>;

/// Counters for one resolver run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveSummary {
    pub total: usize,
    pub skipped: usize,
    pub success: usize,
    pub invalid_data: usize,
    pub whois_error: usize,
    pub netbox_error: usize,
    pub exception: usize,
    pub cancelled: bool,
}

impl ResolveSummary {
    fn count(&mut self, status: ProcessedStatus) {
        match status {
            ProcessedStatus::Success => self.success += 1,
            ProcessedStatus::InvalidData => self.invalid_data += 1,
            ProcessedStatus::WhoisError { .. } => self.whois_error += 1,
            ProcessedStatus::NetboxError { .. } => self.netbox_error += 1,
            ProcessedStatus::Exception => self.exception += 1,
        }
    }

    /// Addresses attempted in this run
    pub fn attempted(&self) -> usize {
        self.success + self.invalid_data + self.whois_error + self.netbox_error + self.exception
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Batch resolver over the missing-address store
pub struct FallbackResolver {
    missing: Arc<dyn MissingAddressStore>,
    ledger: Arc<dyn ProcessedLedger>,
    whois: Arc<dyn WhoisClient>,
    dispatcher: Arc<SyncDispatcher>,
    cancel: CancellationToken,
    progress: Option<ResolveProgressCallback>,
}

impl FallbackResolver {
    pub fn new(
        missing: Arc<dyn MissingAddressStore>,
        ledger: Arc<dyn ProcessedLedger>,
        whois: Arc<dyn WhoisClient>,
        dispatcher: Arc<SyncDispatcher>,
    ) -> Self {
        Self {
            missing,
            ledger,
            whois,
            dispatcher,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop the batch between addresses once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: ResolveProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn emit(&self, progress: ResolveProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }

    /// Process every missing address not yet in the ledger
    ///
    /// Per-address failures are recorded in the ledger and never abort the
    /// batch. Failing to read the missing store or to write the ledger does.
    pub fn run(&self) -> Result<ResolveSummary> {
        let entries = self
            .missing
            .entries()
            .map_err(|e| anyhow!("Failed to load missing IPs: {}", e))?;

        let mut summary = ResolveSummary {
            total: entries.len(),
            ..Default::default()
        };

        let mut pending = 0;
        for ip in &entries {
            if self.ledger.get(ip)?.is_none() {
                pending += 1;
            }
        }
        self.emit(ResolveProgress::Started {
            total: entries.len(),
            pending,
        });
        info!(
            "Resolving {} of {} missing IPs through whois",
            pending,
            entries.len()
        );

        for ip in &entries {
            if self.cancel.is_cancelled() {
                info!("Resolver cancelled, stopping before {}", ip);
                summary.cancelled = true;
                break;
            }

            if let Some(status) = self.ledger.get(ip)? {
                debug!("IP {} has already been processed ({}), skipping", ip, status);
                summary.skipped += 1;
                self.emit(ResolveProgress::Address {
                    ip: ip.clone(),
                    status: None,
                });
                continue;
            }

            let status = catch_unwind(AssertUnwindSafe(|| self.resolve_one(ip))).unwrap_or_else(|_| {
                warn!("Unexpected failure while processing IP {}", ip);
                ProcessedStatus::Exception
            });

            self.ledger
                .record(ip, status)
                .map_err(|e| anyhow!("Failed to persist status for {}: {}", ip, e))?;
            summary.count(status);
            self.emit(ResolveProgress::Address {
                ip: ip.clone(),
                status: Some(status),
            });
        }

        info!(
            "Resolver finished: {} succeeded, {} failed, {} skipped{}",
            summary.success,
            summary.attempted() - summary.success,
            summary.skipped,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        self.emit(ResolveProgress::Completed {
            summary: summary.clone(),
        });
        Ok(summary)
    }

    /// Resolve one address and return its terminal status
    ///
    /// Does not consult or write the ledger.
    pub fn resolve_one(&self, ip: &str) -> ProcessedStatus {
        let response = match self.whois.query(ip) {
            Ok(response) => response,
            Err(WhoisError::Decode) => {
                warn!("Unreadable whois response for IP {}", ip);
                return ProcessedStatus::Exception;
            }
            Err(e) => {
                warn!("Error retrieving whois data for IP {}: {}", ip, e);
                return ProcessedStatus::WhoisError {
                    timed_out: e.is_timeout(),
                };
            }
        };

        let record = match WhoisRecord::parse(&response) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping IP {} due to invalid data: {}", ip, e);
                return ProcessedStatus::InvalidData;
            }
        };

        let report = self
            .dispatcher
            .publish(&[record.prefix], &record.description());
        if report.all_accepted() {
            ProcessedStatus::Success
        } else {
            ProcessedStatus::NetboxError {
                timed_out: report.any_timed_out(),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
