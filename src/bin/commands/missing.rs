use anyhow::Result;
use asnmap::lens::utils::{render_rows, OutputFormat};
use asnmap::AsnmapConfig;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

/// Arguments for the Missing command
#[derive(Args)]
pub struct MissingArgs {
    /// Only list addresses the resolver has not processed yet
    #[clap(long)]
    pub pending: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct MissingRow {
    ip: String,
    status: String,
    comment: String,
}

pub fn run(config: &AsnmapConfig, args: MissingArgs, output_format: OutputFormat) -> Result<()> {
    let missing = config.missing_store()?;
    let ledger = config.processed_ledger()?;

    let mut rows = vec![];
    for ip in missing.entries()? {
        let row = match ledger.get(&ip)? {
            Some(status) if !args.pending => MissingRow {
                ip,
                status: status.to_string(),
                comment: status.comment().to_string(),
            },
            Some(_) => continue,
            None => MissingRow {
                ip,
                status: "pending".to_string(),
                comment: String::new(),
            },
        };
        rows.push(row);
    }

    if rows.is_empty() && !output_format.is_json() {
        eprintln!("no missing IP addresses");
        return Ok(());
    }
    println!("{}", render_rows(&rows, output_format));
    Ok(())
}
