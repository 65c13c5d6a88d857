pub mod cidr;
pub mod config;
pub mod lookup;
pub mod missing;
pub mod resolve;
pub mod serve;

use anyhow::Result;
use asnmap::lens::lookup::LookupLens;
use asnmap::lens::range::RangeTable;
use asnmap::AsnmapConfig;
use std::sync::Arc;

/// Build the lookup lens from the configured range table, store and registry
pub(crate) fn lookup_lens(config: &AsnmapConfig) -> Result<LookupLens> {
    let table = RangeTable::from_csv_path(&config.range_table)?;
    Ok(LookupLens::new(
        Arc::new(table),
        config.missing_store()?,
        Arc::new(config.sync_dispatcher()),
    ))
}
