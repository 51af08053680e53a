use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "strava_export")]
#[command(about = "Incrementally export Strava activities to a local CSV file")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to output CSV file
    #[arg(long, value_name = "PATH", global = true)]
    pub csv_path: Option<String>,

    /// Path to the sync checkpoint file
    #[arg(long, value_name = "PATH", global = true)]
    pub checkpoint_path: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Path to config file
    #[arg(long, default_value = "config/config.toml", global = true)]
    pub config: String,

    /// Path to a .env file holding credentials
    #[arg(long, value_name = "PATH", global = true)]
    pub env_file: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch new activities and append them to the CSV (default)
    Sync(SyncArgs),
    /// Print the athlete profile and lifetime stats
    Stats,
    /// Ask a question about the exported activities
    Ask {
        /// Natural-language question
        question: String,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Don't prompt for confirmation before syncing
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Skip the account stats lookup
    #[arg(long)]
    pub skip_stats: bool,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Sync(SyncArgs::default()))
    }
}
