use crate::monitor::{DEFAULT_INTERVAL, DEFAULT_MIRROR_ROOT};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Mirror a directory tree and keep reverting every change made to it
#[derive(Parser, Debug)]
#[command(name = "treemend", version, about, long_about = None)]
pub struct Cli {
    /// Monitor this directory instead of the current one
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Where the backup copy of the tree is kept (wiped on start-up)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_MIRROR_ROOT)]
    pub mirror_root: PathBuf,

    /// Pause between two scans of the tree, in microseconds
    #[arg(long, value_name = "MICROS", default_value_t = DEFAULT_INTERVAL.as_micros() as u64)]
    pub interval_us: u64,

    /// Increase log output (-v for info, -vv for debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "log_level")]
    pub verbose: u8,

    /// Set the log level explicitly. Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Filter directive requested on the command line, if any.
    pub fn log_filter(&self) -> Option<&'static str> {
        match (self.log_level, self.verbose) {
            (Some(level), _) => Some(level.as_filter()),
            (None, 0) => None,
            (None, 1) => Some("info"),
            (None, _) => Some("debug"),
        }
    }
}
