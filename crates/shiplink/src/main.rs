mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use shiplink::build_info;
use shiplink::config::DEFAULT_CONFIG_FILE;

use commands::Target;

// ============================================================================
// CLI Types
// ============================================================================

/// Shiplink - talk to a ship's web API from the command line
#[derive(Parser, Debug)]
#[command(version = build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: String,

    /// Ship URL (overrides config file)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// User to authenticate as, e.g. ~zod (overrides config file)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Log debug output from shiplink
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Establish a session and print its state
    Status,

    /// Authenticate with the configured login code
    Login,

    /// Authenticate, then deauthenticate the session
    Logout,

    /// Send a one-way command to an app
    Poke {
        /// Target app
        #[arg(long)]
        app: String,

        /// Data format of the payload
        #[arg(long, default_value = "json")]
        mark: String,

        /// Wire to tag the poke with
        #[arg(long, default_value = "/")]
        wire: String,

        /// JSON payload
        #[arg(long)]
        data: String,
    },

    /// Subscribe to a path and print every event as a JSON line
    Watch {
        /// App to subscribe to
        #[arg(long)]
        app: String,

        /// Path on the app, e.g. /inbox
        #[arg(long)]
        path: String,

        /// Wire name (defaults to the path)
        #[arg(long)]
        wire: Option<String>,

        /// Ship running the app (defaults to the session's ship)
        #[arg(long)]
        ship: Option<String>,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    debug!(version = %build_info::version_string(), "Starting shiplink");

    let target = Target {
        config: cli.config,
        server: cli.server,
        user: cli.user,
    };

    match cli.command {
        Commands::Status => commands::status::run(&target).await,
        Commands::Login => commands::login::run(&target).await,
        Commands::Logout => commands::logout::run(&target).await,
        Commands::Poke {
            app,
            mark,
            wire,
            data,
        } => commands::poke::run(&target, &app, &mark, &wire, &data).await,
        Commands::Watch {
            app,
            path,
            wire,
            ship,
        } => commands::watch::run(&target, &app, &path, wire.as_deref(), ship.as_deref()).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing(verbose: bool) {
    let default = if verbose { "info,shiplink=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
