mod checksum;
mod cli;
mod mirror;
mod monitor;
mod reconcile;
mod report;
mod snapshot;
mod util;

use cli::Cli;
use monitor::{MonitorConfig, Session};
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Event, Level, Subscriber, error, info};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct MendExitCode;

impl MendExitCode {
    /// Exit code used when the mirror or baseline could not be set up.
    fn bootstrap_failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for anything else that stops the monitor early.
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.log_filter());

    if let Some(directory) = &cli.directory
        && let Err(e) = std::env::set_current_dir(directory)
    {
        error!(
            "Failed to change directory to {}: {}",
            directory.display(),
            e
        );
        return MendExitCode::any_error();
    }

    let config = MonitorConfig {
        root: PathBuf::from("."),
        mirror_root: cli.mirror_root,
        interval: Duration::from_micros(cli.interval_us),
    };

    match monitor_tree(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            MendExitCode::bootstrap_failed()
        }
    }
}

fn monitor_tree(config: MonitorConfig) -> anyhow::Result<()> {
    let mut session = Session::bootstrap(config)?;

    info!(
        "Watching {} ({} files, {} directories mirrored)",
        session.root().display(),
        session.mirrored().files,
        session.mirrored().dirs
    );

    session.run();

    info!("Stopped after {} iterations", session.iterations());
    Ok(())
}

fn init_tracing(cli_filter: Option<&str>) {
    let formatter = LevelPrefixFormatter {
        colored: stderr().is_terminal(),
    };

    // An explicit -v or --log-level wins over RUST_LOG.
    let filter = match cli_filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct LevelPrefixFormatter {
    colored: bool,
}

impl LevelPrefixFormatter {
    fn color(level: Level) -> &'static str {
        match level {
            Level::INFO => "\x1b[36m",
            Level::WARN => "\x1b[33m",
            Level::ERROR => "\x1b[31m",
            _ => "\x1b[2m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LevelPrefixFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let level = *event.metadata().level();

        if self.colored {
            write!(writer, "{}{}:\x1b[0m ", Self::color(level), level.as_str())?;
        } else {
            write!(writer, "{}: ", level.as_str())?;
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
