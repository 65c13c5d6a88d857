//! HTTP request handlers
//!
//! - `lookup` - address lookup (`GET /iplookup`)

pub mod lookup;

pub use lookup::{iplookup_handler, IpLookupQuery};
