use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::locale::Language;
use crate::share::SharePlatform;

pub const LOG_FILE: &str = "yearpercent.log";

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
    name = "yearpercent",
    version,
    about = "How much of the year has gone by",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Language for this run only; the saved preference is left alone.
    #[arg(
        long = "lang",
        global = true,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Language>())
    )]
    pub lang: Option<Language>,

    /// Pretend today is this date (YYYY-MM-DD).
    #[arg(long = "date", global = true)]
    pub date: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the progress page once.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Copy the progress summary to the clipboard.
    Copy,
    /// Save the page as an image.
    Export {
        #[arg(long = "out")]
        out: Option<PathBuf>,
    },
    /// Open a share link for a social platform.
    Share {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SharePlatform>()))]
        platform: SharePlatform,
        /// Print the link instead of opening it.
        #[arg(long)]
        print: bool,
    },
    /// Set or toggle the saved language.
    Lang { tag: Option<String> },
    /// Keep the page on screen and refresh it.
    Watch,
    Version,
}

impl GlobalCli {
    #[must_use]
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Show { json: false })
    }
}

/// Installs the global subscriber. With `log_dir` set, events go to a file
/// there instead of stderr; keep the returned guard alive until exit.
pub fn init_tracing(
    verbose: u8,
    quiet: u8,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
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

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true);

    let (init_result, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let result = builder.with_ansi(false).with_writer(writer).try_init();
            (result, Some(guard))
        }
        None => {
            let result = builder
                .with_thread_ids(true)
                .with_ansi(std::io::stderr().is_terminal())
                .try_init();
            (result, None)
        }
    };

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(guard)
}

/// Installs the subscriber, then records the start of the run through it.
pub fn start_logging(
    verbose: u8,
    quiet: u8,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let guard = init_tracing(verbose, quiet, log_dir)?;
    info!(verbose, quiet, version = env!("CARGO_PKG_VERSION"), "starting yearpercent");
    Ok(guard)
}
