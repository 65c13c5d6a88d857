//! Lens module
//!
//! High-level "lens" abstractions that combine business logic with output
//! types. Lenses are shared by the CLI and the HTTP API.
//!
//! | Lens | Purpose |
//! |------|---------|
//! | `cidr` | Inclusive address range to minimal CIDR block list |
//! | `range` | Range table loading and first-match address lookup |
//! | `whois` | Routing-registry whois client and response parser |
//! | `registry` | NetBox prefix sync with optional de-duplication |
//! | `lookup` | Per-request lookup: match, summarize, sync |
//! | `fallback` | Batch resolution of missing addresses through whois |
//!
//! # Usage
//!
//! ```rust,ignore
//! use asnmap::lens::cidr::convert_to_cidr;
//! use asnmap::lens::lookup::{LookupLens, LookupError};
//! use asnmap::lens::fallback::{FallbackResolver, ResolveSummary};
//! ```

// =============================================================================
// Utility module
// =============================================================================
pub mod utils;

// =============================================================================
// Building blocks
// =============================================================================

// CIDR summarization
pub mod cidr;

// Range table and matcher
pub mod range;

// Team Cymru whois client
pub mod whois;

// NetBox registry sync
pub mod registry;

// =============================================================================
// Use cases
// =============================================================================

// Live lookup orchestrator
pub mod lookup;

// Fallback resolver over the missing-address store
pub mod fallback;
