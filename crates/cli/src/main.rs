mod channel_commands;
mod config_commands;
mod contact_commands;
mod send_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use wabridge_whatsapp::WhatsAppClient;

#[derive(Parser)]
#[command(name = "wabridge", about = "wabridge: WhatsApp Business messaging client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, env = "WABRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Print collected metrics in Prometheus format before exiting.
    #[cfg(feature = "prometheus")]
    #[arg(long, global = true, default_value_t = false)]
    print_metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration validation.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Send a message to a phone number or contact.
    Send {
        #[command(subcommand)]
        action: send_commands::SendAction,
    },
    /// Provider-side contact records.
    Contact {
        #[command(subcommand)]
        action: contact_commands::ContactAction,
    },
    /// Sending channel discovery.
    Channel {
        #[command(subcommand)]
        action: channel_commands::ChannelAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(feature = "metrics")]
fn init_metrics(enabled: bool) -> anyhow::Result<wabridge_metrics::MetricsHandle> {
    wabridge_metrics::init_metrics(wabridge_metrics::MetricsRecorderConfig {
        enabled,
        global_labels: vec![("service".into(), "wabridge".into())],
    })
}

/// Load configuration (explicit path or discovery) and build a client.
pub(crate) fn build_client(config: Option<&std::path::Path>) -> anyhow::Result<WhatsAppClient> {
    let config = match config {
        Some(path) => wabridge_config::load_config(path)?,
        None => wabridge_config::discover_and_load()?,
    };
    debug!(environment = %config.environment, "configuration loaded");
    Ok(WhatsAppClient::from_config(config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    #[cfg(all(feature = "metrics", feature = "prometheus"))]
    let metrics = init_metrics(cli.print_metrics)?;
    #[cfg(all(feature = "metrics", not(feature = "prometheus")))]
    let _metrics = init_metrics(false)?;

    info!(version = env!("CARGO_PKG_VERSION"), "wabridge starting");

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Config { action } => config_commands::handle_config(action, config),
        Commands::Send { action } => send_commands::handle_send(action, config).await,
        Commands::Contact { action } => contact_commands::handle_contact(action, config).await,
        Commands::Channel { action } => channel_commands::handle_channel(action, config).await,
    };

    #[cfg(all(feature = "metrics", feature = "prometheus"))]
    if cli.print_metrics {
        print!("{}", metrics.render());
    }

    result
}
