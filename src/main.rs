use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use speedscout::config::Settings;
use speedscout::report;

#[derive(Parser)]
#[command(
    name = "speedscout",
    about = "Find the lowest-latency speed test server",
    version,
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// TOML config file (defaults to $SPEEDSCOUT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Source IP address to bind outgoing connections to
    #[arg(long, global = true)]
    source: Option<IpAddr>,

    /// Use HTTPS for scheme-relative directory URLs
    #[arg(long, global = true)]
    secure: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the best endpoint and print it
    Select {
        /// Use this endpoint id instead of ranking by latency
        #[arg(long)]
        server: Option<u32>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List endpoints from the directory
    List {
        /// Only the closest candidates
        #[arg(long)]
        closest: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_settings(global: &GlobalArgs) -> Result<Settings> {
    let mut settings = Settings::load_or_default(global.config.as_deref())?;
    if let Some(timeout) = global.timeout {
        settings.client.timeout_secs = timeout;
    }
    if let Some(source) = global.source {
        settings.client.source_address = Some(source.to_string());
    }
    if global.secure {
        settings.client.secure = true;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);

    let mut settings = load_settings(&cli.global)?;

    match cli.command {
        Commands::Select { server, json } => {
            if server.is_some() {
                settings.client.endpoint = server;
            }
            let report = speedscout::run_selection(&settings).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Selected: {}", report::format_summary(&report));
            }
        }
        Commands::List { closest } => {
            let endpoints = speedscout::list_endpoints(&settings, closest).await?;
            if endpoints.is_empty() {
                println!("No endpoints found.");
            } else {
                println!(
                    "{:>6} | {:<25} | {:<20} | {:<15} | Distance",
                    "ID", "Sponsor", "Name", "Country"
                );
                println!("{:-<6}-|-{:-<25}-|-{:-<20}-|-{:-<15}-|-{:-<10}", "", "", "", "", "");
                for endpoint in endpoints.iter() {
                    println!("{}", report::format_row(endpoint));
                }
            }
        }
    }

    Ok(())
}
