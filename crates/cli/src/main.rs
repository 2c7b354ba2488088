mod config_commands;
mod db_commands;
mod schedule_commands;
mod serve;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "agentdesk", about = "agentdesk: scheduled AI agent reports", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (defaults to discovery in ./ then the user config dir).
    #[arg(long, global = true, env = "AGENTDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and admin API (default when no subcommand is provided).
    Serve,
    /// Print the next fire times of a cron expression.
    Next {
        /// Five-field expression or preset, e.g. "0 9 * * 1#1" or "@daily".
        expression: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        /// IANA timezone (defaults to the configured scheduler timezone).
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = agentdesk_config::load_or_discover(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "agentdesk starting");
            let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
            let port = cli.port.unwrap_or(config.server.port);
            serve::run(config, &bind, port).await
        },
        Some(Commands::Next {
            expression,
            count,
            timezone,
        }) => {
            let timezone = timezone.unwrap_or_else(|| config.scheduler.timezone.clone());
            schedule_commands::print_next(&expression, count, &timezone)
        },
        Some(Commands::Db { action }) => db_commands::handle_db(action, &config).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref(), &config)
        },
    }
}
