use anyhow::Result;
use asnmap::lens::utils::{render_json, OutputFormat};
use asnmap::AsnmapConfig;
use clap::Args;
use serde::Serialize;
use std::path::Path;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also show record counts of the range table and stores
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo<'a> {
    config_file: String,
    #[serde(flatten)]
    settings: &'a AsnmapConfig,
    range_table_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<StoreCounts>,
}

#[derive(Debug, Serialize)]
struct StoreCounts {
    ranges: usize,
    ranges_skipped: usize,
    missing: usize,
    processed: usize,
}

fn store_counts(config: &AsnmapConfig) -> Result<StoreCounts> {
    let stats = asnmap::RangeTable::from_csv_path(&config.range_table)?.load_stats();
    Ok(StoreCounts {
        ranges: stats.loaded,
        ranges_skipped: stats.skipped,
        missing: config.missing_store()?.entries()?.len(),
        processed: config.processed_ledger()?.records()?.len(),
    })
}

pub fn run(config: &AsnmapConfig, args: ConfigArgs, output_format: OutputFormat) -> Result<()> {
    let counts = if args.verbose {
        Some(store_counts(config)?)
    } else {
        None
    };

    if output_format.is_json() {
        let info = ConfigInfo {
            config_file: AsnmapConfig::config_file_path(),
            settings: config,
            range_table_exists: Path::new(&config.range_table).exists(),
            counts,
        };
        println!("{}", render_json(&info, output_format));
        return Ok(());
    }

    println!("Config File:        {}", AsnmapConfig::config_file_path());
    println!("{}", config.summary());
    if let Some(c) = counts {
        println!(
            "Ranges Loaded:      {} ({} rows skipped)",
            c.ranges, c.ranges_skipped
        );
        println!("Missing IPs:        {}", c.missing);
        println!("Processed IPs:      {}", c.processed);
    }
    Ok(())
}
