use asnmap::lens::utils::OutputFormat;
use asnmap::AsnmapConfig;
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;

use commands::cidr::CidrArgs;
use commands::config::ConfigArgs;
use commands::lookup::LookupArgs;
use commands::missing::MissingArgs;
use commands::resolve::ResolveArgs;
use commands::serve::ServeArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.asnmap/asnmap.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table, json, json-pretty, psv
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP lookup API.
    Serve(ServeArgs),

    /// Look up one IP address in the range table and sync its prefixes.
    Lookup(LookupArgs),

    /// Resolve missing IP addresses through whois and sync their prefixes.
    Resolve(ResolveArgs),

    /// Summarize an inclusive IP range into CIDR blocks.
    Cidr(CidrArgs),

    /// List IP addresses recorded as missing, with their resolver status.
    Missing(MissingArgs),

    /// Show the effective configuration.
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match AsnmapConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(&config, args),
        Commands::Lookup(args) => commands::lookup::run(&config, args, cli.format),
        Commands::Resolve(args) => commands::resolve::run(&config, args, cli.format),
        Commands::Cidr(args) => commands::cidr::run(args, cli.format),
        Commands::Missing(args) => commands::missing::run(&config, args, cli.format),
        Commands::Config(args) => commands::config::run(&config, args, cli.format),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}
