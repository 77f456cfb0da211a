// Lendwise dashboard
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Live updates ride the server's SSE channels; each event triggers a
// scoped refetch of only the props the current view shows.
// Design Decision: Support text/json/yaml output formats for scripting.

mod client;
mod commands;
mod live;
mod output;

use clap::{Parser, Subcommand};
use lendwise_core::telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "lendwise-dashboard")]
#[command(about = "Lendwise dashboard - lending stats and lists that stay current")]
#[command(version)]
pub struct Cli {
    /// API base URL (including any API prefix)
    #[arg(
        long,
        env = "LENDWISE_API_URL",
        default_value = "http://localhost:9000"
    )]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the loans and transactions channels and refresh on every status change
    Watch {
        /// Which page to keep current
        #[arg(long, value_enum, default_value_t = live::View::Dashboard)]
        view: live::View,

        /// Print a notification line for each status change
        #[arg(long)]
        notify: bool,
    },

    /// Print the current stats once
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::from_env();
    telemetry.service_name = "lendwise-dashboard".to_string();
    telemetry.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    if telemetry.log_filter.is_none() {
        telemetry.log_filter = Some("lendwise_dashboard=warn".to_string());
    }
    init_telemetry(telemetry);

    let client = client::Client::new(&cli.api_url);
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Watch { view, notify } => {
            commands::watch::run(&client, output_format, view, notify).await
        }
        Commands::Stats => commands::stats::run(&client, output_format).await,
    }
}
