use chrono::{DateTime, Utc};
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use commands::{chapters, cleanup, config, daemon, inbox, library, queue, sources, sync};
use library_sync_config::PathManager;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "feedqueue")]
#[command(about = "feedqueue - Turn subscribed feeds into an inbox and a play queue")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every subscribed feed and place new items (one-time sync)
    #[command(long_about = "Fetch all active sources, triage new items into the inbox or queue according to each source's placement, and place deferred items that are due. Press Ctrl-C to stop after the current source; everything placed so far is kept.")]
    Sync {
        /// Only sync this source (repeatable)
        #[arg(long = "source", value_name = "ID")]
        sources: Vec<String>,

        /// Replay the cached feed results of the last fetch instead of fetching
        #[arg(long, action = ArgAction::SetTrue)]
        use_cache: bool,
    },
    /// Run as daemon with internal scheduler
    #[command(long_about = "Run feedqueue in the foreground and sync on the configured cron schedule. An initial sync runs on startup unless --no-startup-sync is given. Logs go to the daemon log file.")]
    Daemon {
        /// Six-field cron schedule (e.g., '0 0 */6 * * *' for every 6 hours)
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Skip initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },
    /// Manage subscriptions
    Sources {
        #[command(subcommand)]
        cmd: SourceCommands,
    },
    /// Inspect and reorder the play queue
    Queue {
        #[command(subcommand)]
        cmd: QueueCommands,
    },
    /// Inspect and triage the inbox
    Inbox {
        #[command(subcommand)]
        cmd: InboxCommands,
    },
    /// Take an item out of inbox/queue until a later date
    #[command(group(ArgGroup::new("when").required(true).args(["until", "days"])))]
    Defer {
        item: String,

        /// RFC 3339 date, e.g. 2026-11-01T08:00:00Z
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Days from now
        #[arg(long)]
        days: Option<u32>,
    },
    /// Mark items as watched and drop their entries
    Watched {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Remove duplicate sources, items and cached assets and repair entries
    Cleanup {
        /// Also delete the cached feed results
        #[arg(long, action = ArgAction::SetTrue)]
        feed_cache: bool,
    },
    /// Merge external segments into an item's chapters
    #[command(long_about = "Load the external segments known for an item, merge them with its native chapters into one timeline and save it when it changed.")]
    Chapters { item: String },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum SourceCommands {
    /// List subscriptions
    List {
        /// Include archived sources
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
    },
    /// Subscribe to a feed, or revive an archived subscription
    Add {
        /// Channel or playlist id
        id: String,

        /// Feed locator handed to the feed client
        #[arg(long)]
        locator: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, value_enum, default_value = "default")]
        placement: sources::PlacementArg,

        #[arg(long, value_enum, default_value = "default")]
        shorts: sources::ShortsArg,
    },
    /// Archive a subscription and drop its inbox items
    Archive { id: String },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List the queue in play order
    List,
    /// Insert items at a position (negative appends)
    Add {
        #[arg(required = true)]
        items: Vec<String>,

        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        at: i64,
    },
    /// Move entries to a new position
    Move {
        /// Current positions, comma separated
        #[arg(long, required = true, value_delimiter = ',')]
        from: Vec<usize>,

        /// Target position, counted before the move
        #[arg(long)]
        to: usize,

        /// Keep the "new" badge on moved items
        #[arg(long, action = ArgAction::SetTrue)]
        keep_new: bool,
    },
    /// Remove an item's queue entry without clearing it
    Remove { item: String },
    /// Clear entries around a position
    #[command(group(ArgGroup::new("pivot").required(true).args(["above", "below", "at"])))]
    Clear {
        /// Clear every entry before this position
        #[arg(long)]
        above: Option<usize>,

        /// Clear every entry after this position
        #[arg(long)]
        below: Option<usize>,

        /// Clear the entry at this position
        #[arg(long)]
        at: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum InboxCommands {
    /// List the inbox, newest first
    List,
    /// Put items into the inbox
    Add {
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Clear one item from the inbox
    Remove { item: String },
    /// Clear entries newer or older than a date
    #[command(group(ArgGroup::new("pivot").required(true).args(["above", "below"])))]
    Clear {
        /// Clear entries published after this date (RFC 3339)
        #[arg(long)]
        above: Option<DateTime<Utc>>,

        /// Clear entries published before this date (RFC 3339)
        #[arg(long)]
        below: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a configuration file with defaults and create the data directories
    Init {
        /// Overwrite an existing file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let path_manager = PathManager::default();

    // The daemon logs to its rotating file, everything else to stderr
    match &cli.command {
        Commands::Daemon { .. } => {
            let log_file = daemon::log_file(&path_manager);
            logging::init_logging_with_file(cli.verbose, cli.quiet, Some(log_file.as_path()))
                .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
        }
        _ => logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?,
    }

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync { sources, use_cache } => sync::run_sync(&path_manager, sources, use_cache, &output).await,
        Commands::Daemon { schedule, no_startup_sync } => {
            daemon::run_daemon(&path_manager, schedule, no_startup_sync, &output).await
        }
        Commands::Sources { cmd } => sources::run_sources(&path_manager, cmd, &output).await,
        Commands::Queue { cmd } => queue::run_queue(&path_manager, cmd, &output).await,
        Commands::Inbox { cmd } => inbox::run_inbox(&path_manager, cmd, &output).await,
        Commands::Defer { item, until, days } => library::run_defer(&path_manager, item, until, days, &output).await,
        Commands::Watched { items } => library::run_watched(&path_manager, items, &output).await,
        Commands::Cleanup { feed_cache } => cleanup::run_cleanup(&path_manager, feed_cache, &output).await,
        Commands::Chapters { item } => chapters::run_chapters(&path_manager, item, &output).await,
        Commands::Config { cmd } => config::run_config(&path_manager, cmd.unwrap_or(ConfigCommands::Show), &output),
    }
}
