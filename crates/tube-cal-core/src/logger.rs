//! Stderr logger for calibration runs.
//!
//! Lines look like `[  1.234s  INFO tube_cal::iteration] message`, with the
//! elapsed time since the logger was installed. Install it once at startup
//! with [`init_with_level`]; the `tracing` feature adds [`init_tracing`].

use std::io::Write;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::{
    fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Directive used when `RUST_LOG` is unset or unparsable.
#[cfg(feature = "tracing")]
pub const DEFAULT_TRACING_FILTER: &str = "info";

static RUN_LOGGER: OnceLock<RunLogger> = OnceLock::new();

struct RunLogger {
    max: LevelFilter,
    epoch: Instant,
}

fn format_line(elapsed: Duration, record: &Record) -> String {
    format!(
        "[{:7.3}s {:>5} {}] {}",
        elapsed.as_secs_f64(),
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let line = format_line(self.epoch.elapsed(), record);
            let _ = writeln!(std::io::stderr().lock(), "{line}");
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the stderr logger at `level`.
///
/// Only the first call installs anything; later calls keep the first level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut first = false;
    let logger = RUN_LOGGER.get_or_init(|| {
        first = true;
        RunLogger {
            max: level,
            epoch: Instant::now(),
        }
    });
    if first {
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Map a `-v` count (and a quiet flag) onto a level filter.
pub fn level_from_verbosity(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Install a `tracing` subscriber that reports span timings on close.
///
/// `RUST_LOG` overrides [`DEFAULT_TRACING_FILTER`]. With `json` every event
/// is one flat JSON object per line; otherwise plain text with uptime stamps.
/// A subscriber that is already installed stays in place.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACING_FILTER));
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_span_events(FmtSpan::CLOSE)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_timer(fmt::time::Uptime::default())
            .with_span_events(FmtSpan::CLOSE)
    });
    if tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_err()
    {
        log::debug!("tracing subscriber already installed");
    }
}
