use anyhow::Result;
use asnmap::lens::lookup::LookupRow;
use asnmap::lens::registry::SyncOutcome;
use asnmap::lens::utils::{render_json, render_rows, OutputFormat, DEFAULT_NAME_MAX_LEN};
use asnmap::AsnmapConfig;
use clap::Args;
use serde_json::json;

/// Arguments for the Lookup command
#[derive(Args)]
pub struct LookupArgs {
    /// IP address to look up
    #[clap(name = "IP")]
    pub ip: String,

    /// Do not publish the matched prefixes to the registry
    #[clap(long)]
    pub no_sync: bool,
}

pub fn run(config: &AsnmapConfig, args: LookupArgs, output_format: OutputFormat) -> Result<()> {
    let lens = super::lookup_lens(config)?;
    let result = lens.resolve(Some(args.ip.as_str()))?;

    let report = if args.no_sync {
        None
    } else {
        Some(lens.publish(&result))
    };

    if output_format.is_json() {
        let sync = report.as_ref().map(|r| {
            r.outcomes
                .iter()
                .map(|(prefix, outcome)| {
                    let status = match outcome {
                        SyncOutcome::Created => "created".to_string(),
                        SyncOutcome::Skipped => "skipped".to_string(),
                        SyncOutcome::Rejected { status, .. } => format!("rejected ({})", status),
                        SyncOutcome::Failed { reason, .. } => format!("failed ({})", reason),
                    };
                    json!({ "prefix": prefix.to_string(), "status": status })
                })
                .collect::<Vec<_>>()
        });
        let value = json!({ "result": result, "sync": sync });
        println!("{}", render_json(&value, output_format));
        return Ok(());
    }

    let mut row = LookupRow::from(&result);
    if output_format == OutputFormat::Table {
        row = row.with_name_max_len(DEFAULT_NAME_MAX_LEN);
    }
    println!("{}", render_rows(&[row], output_format));
    if let Some(report) = report {
        eprintln!(
            "synced {} of {} prefixes ({} failed)",
            report.outcomes.len() - report.failed_count(),
            report.outcomes.len(),
            report.failed_count()
        );
    }
    Ok(())
}
