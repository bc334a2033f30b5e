//! Centralised tracing initialisation for the sizewalk binary.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber with an `EnvFilter` and optional JSON formatting.
//! Later calls are ignored; the global subscriber can only be set once per
//! process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines.
/// * `level`: verbosity of sizewalk's own events when `RUST_LOG` is not
///   set. Other crates log at `warn` and above.
///
/// Logs go to stderr so they never mix with report output on stdout.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output = if json { base.json().boxed() } else { base.boxed() };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .ok();
}

/// Filter used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,sizewalk_core={level},sizewalk={level}")
}
