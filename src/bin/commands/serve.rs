use anyhow::{anyhow, Result};
use asnmap::server::{start_server, ServerConfig, ServerState};
use asnmap::AsnmapConfig;
use clap::Args;

/// Arguments for the Serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind to (default from config, 127.0.0.1)
    #[clap(long)]
    pub address: Option<String>,

    /// Port to listen on (default from config, 5000)
    #[clap(long)]
    pub port: Option<u16>,
}

pub fn run(config: &AsnmapConfig, args: ServeArgs) -> Result<()> {
    let lens = super::lookup_lens(config)?;

    let server_config = ServerConfig::new()
        .with_address(args.address.unwrap_or_else(|| config.server_address.clone()))
        .with_port(args.port.unwrap_or(config.server_port));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("Failed to start async runtime: {}", e))?;

    runtime.block_on(start_server(ServerState::new(lens), server_config))
}
