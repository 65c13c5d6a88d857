use anyhow::{anyhow, Result};
use asnmap::lens::fallback::{FallbackResolver, ResolveProgress, ResolveSummary};
use asnmap::lens::utils::{render_rows, OutputFormat};
use asnmap::AsnmapConfig;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

/// Arguments for the Resolve command
#[derive(Args)]
pub struct ResolveArgs {
    /// Do not show a progress bar
    #[clap(long)]
    pub no_progress: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct SummaryRow {
    total: usize,
    skipped: usize,
    success: usize,
    invalid_data: usize,
    whois_error: usize,
    netbox_error: usize,
    exception: usize,
    cancelled: bool,
}

impl From<&ResolveSummary> for SummaryRow {
    fn from(s: &ResolveSummary) -> Self {
        Self {
            total: s.total,
            skipped: s.skipped,
            success: s.success,
            invalid_data: s.invalid_data,
            whois_error: s.whois_error,
            netbox_error: s.netbox_error,
            exception: s.exception,
            cancelled: s.cancelled,
        }
    }
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(sty) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
    {
        pb.set_style(sty.progress_chars("##-"));
    }
    pb
}

pub fn run(config: &AsnmapConfig, args: ResolveArgs, output_format: OutputFormat) -> Result<()> {
    let token = CancellationToken::new();

    // background runtime only watches for Ctrl-C
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|e| anyhow!("Failed to start signal handler: {}", e))?;
    let cancel = token.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing current address");
            cancel.cancel();
        }
    });

    let mut resolver = FallbackResolver::new(
        config.missing_store()?,
        config.processed_ledger()?,
        Arc::new(config.whois_client()),
        Arc::new(config.sync_dispatcher()),
    )
    .with_cancellation(token);

    let pb = if args.no_progress {
        None
    } else {
        Some(progress_bar())
    };
    if let Some(pb) = pb.clone() {
        resolver = resolver.with_progress(Arc::new(move |progress| match progress {
            ResolveProgress::Started { pending, .. } => pb.set_length(pending as u64),
            ResolveProgress::Address {
                ip,
                status: Some(status),
            } => {
                pb.set_message(format!("{} {}", ip, status));
                pb.inc(1);
            }
            ResolveProgress::Address { status: None, .. } => {}
            ResolveProgress::Completed { .. } => pb.finish_and_clear(),
        }));
    }

    let summary = resolver.run();
    runtime.shutdown_background();
    let summary = summary?;

    println!(
        "{}",
        render_rows(&[SummaryRow::from(&summary)], output_format)
    );
    Ok(())
}
