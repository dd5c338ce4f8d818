use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "recallroom", version, about = "Recallroom spaced repetition CLI")]
struct Cli {
    /// Learner to act on (defaults to `default_user` from the config)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flip-card deck management and SM-2 reviews
    Card {
        #[command(subcommand)]
        action: commands::card::CardAction,
    },
    /// Concept-level learner memory
    Concept {
        #[command(subcommand)]
        action: commands::concept::ConceptAction,
    },
    /// Study session tracking
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Learning analytics report
    Analytics {
        /// Report time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Learner profile and preferences
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RECALLROOM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let user = cli.user;
    let result = match cli.command {
        Commands::Card { action } => commands::card::run(action),
        Commands::Concept { action } => commands::concept::run(user, action),
        Commands::Session { action } => commands::session::run(user, action),
        Commands::Analytics { at } => commands::analytics::run(user, at),
        Commands::Profile { action } => commands::profile::run(user, action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
