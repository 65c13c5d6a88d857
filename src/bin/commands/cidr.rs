use anyhow::Result;
use asnmap::lens::cidr::summarize;
use asnmap::lens::utils::{render_rows, OutputFormat};
use clap::Args;
use serde::Serialize;
use std::net::IpAddr;
use tabled::Tabled;

/// Arguments for the Cidr command
#[derive(Args)]
pub struct CidrArgs {
    /// First address of the range (inclusive)
    #[clap(name = "START")]
    pub start: IpAddr,

    /// Last address of the range (inclusive)
    #[clap(name = "END")]
    pub end: IpAddr,
}

#[derive(Debug, Serialize, Tabled)]
struct CidrRow {
    prefix: String,
    first: String,
    last: String,
    addresses: String,
}

pub fn run(args: CidrArgs, output_format: OutputFormat) -> Result<()> {
    let blocks = summarize(args.start, args.end)?;

    let rows: Vec<CidrRow> = blocks
        .iter()
        .map(|net| {
            let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
            let addresses = 1u128
                .checked_shl(host_bits)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "2^128".to_string());
            CidrRow {
                prefix: net.to_string(),
                first: net.network().to_string(),
                last: net.broadcast().to_string(),
                addresses,
            }
        })
        .collect();

    println!("{}", render_rows(&rows, output_format));
    Ok(())
}
