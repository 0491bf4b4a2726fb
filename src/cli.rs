use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "driftnet", about = "Signed-click ingest, URL frontier, and outbox publication router")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the click-ingest HTTP server and its background batcher.
    Serve {
        /// Overrides `BIND_ADDR` / config.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Frontier maintenance operations.
    Frontier {
        #[command(subcommand)]
        action: FrontierAction,
    },
    /// Run the outbox publication router until interrupted.
    Outbox,
    /// Apply database migrations and exit.
    Migrate,
}

#[derive(Subcommand)]
pub enum FrontierAction {
    /// Submit a single URL to the frontier.
    Submit {
        url: String,
        #[arg(long, default_value = "manual")]
        origin: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },
    /// Reset a dead URL back to pending.
    Reset { id: String },
    /// Recover stale claims once and exit.
    RecoverStaleClaims,
}
