use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "shiki",
    version,
    about = "Ceremony coordination: categorized files, tasks and a schedule",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "shikirc")]
    pub shikirc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// File attachment categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Files within categories
    #[command(subcommand)]
    File(FileCommand),

    /// Prioritized task list
    #[command(subcommand)]
    Task(TaskCommand),

    /// Scheduled events
    #[command(subcommand)]
    Event(EventCommand),

    /// Merged calendar of events and task deadlines
    Calendar,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
    Add {
        name: String,
    },
    List,
    /// Deletes the category and every file inside it
    Delete {
        name: String,
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum FileCommand {
    /// Upload a file into a category; re-uploading the same name bumps the
    /// version
    Upload {
        category: String,
        path: PathBuf,
    },
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Decode a stored file back to disk
    Download {
        category: String,
        name: String,
        /// Output path; defaults to the stored file name
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Delete {
        category: String,
        name: String,
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    Add {
        text: String,
        /// Deadline as YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long, default_value = "general")]
        category: String,
    },
    List {
        /// high, medium, low or all
        #[arg(long, default_value = "all")]
        priority: String,
        #[arg(long, default_value = "all")]
        category: String,
    },
    /// Toggle completion
    Done {
        id: String,
    },
    Delete {
        id: String,
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum EventCommand {
    Add {
        title: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// HH:MM; omitting it makes the event all-day
        #[arg(long)]
        start: Option<String>,
        /// HH:MM
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    /// Open an edit session on the event and submit the new fields
    Edit {
        id: String,
        title: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    Delete {
        id: String,
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
