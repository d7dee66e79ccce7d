//! Logging setup: `log` facade, `env_logger` backend, always on stderr.

use std::io::Write;

use chrono::Utc;
use env_logger::fmt::Formatter;
use env_logger::{Builder, Env, Target};
use log::{info, Level, LevelFilter, Record};

/// Overrides the configured level, e.g. `SIGNAL_DESK_LOG=signal_desk::pipeline=debug`.
pub const LOG_ENV: &str = "SIGNAL_DESK_LOG";
/// `never` disables ANSI colours.
pub const LOG_STYLE_ENV: &str = "SIGNAL_DESK_LOG_STYLE";

/// HTTP stack crates that are chatty at debug.
const QUIET_CRATES: [&str; 4] = ["hyper", "reqwest", "rustls", "h2"];

fn level_color(level: Level) -> &'static str {
    match level {
        | Level::Error => "\x1b[31m",
        | Level::Warn => "\x1b[33m",
        | Level::Info => "\x1b[32m",
        | Level::Debug => "\x1b[36m",
        | Level::Trace => "\x1b[35m",
    }
}

fn format_record(buf: &mut Formatter, record: &Record, color: bool) -> std::io::Result<()> {
    let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    if color {
        writeln!(
            buf,
            "{ts} {}{:5}\x1b[0m [{}] {}",
            level_color(record.level()),
            record.level(),
            record.target(),
            record.args()
        )
    } else {
        writeln!(buf, "{ts} {:5} [{}] {}", record.level(), record.target(), record.args())
    }
}

/// Install the global logger. Later calls are no-ops.
///
/// stdout is reserved for the CLI's JSON payloads, so records go to stderr.
pub fn init_logging(level: &str) {
    let color = std::env::var(LOG_STYLE_ENV).map_or(true, |s| s != "never");
    let mut builder = Builder::new();
    for krate in QUIET_CRATES {
        builder.filter_module(krate, LevelFilter::Warn);
    }
    builder
        .parse_env(Env::default().filter_or(LOG_ENV, level))
        .format(move |buf, record| format_record(buf, record, color))
        .target(Target::Stderr);

    if builder.try_init().is_ok() {
        info!("logging initialized at {level}");
    }
}

#[cfg(test)]
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).filter_level(LevelFilter::Debug).try_init();
}
