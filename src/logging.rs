use std::io;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a filter that overrides `-v`.
pub const LOG_ENV: &str = "ORION_LOG";

/// Level for orion's own events at a given `-v` count.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

// Dependencies stay at `warn`; only orion's own targets follow `-v`.
fn directives(verbosity: u8, from_env: Option<&str>) -> String {
    match from_env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) if EnvFilter::try_new(s).is_ok() => s.to_string(),
        _ => format!("warn,orion={}", level_for(verbosity)),
    }
}

/// Install the global subscriber writing human-readable lines to stderr.
///
/// Calling it twice is harmless; the second call does nothing.
pub fn init(verbosity: u8) {
    let from_env = std::env::var(LOG_ENV).ok();
    let filter = EnvFilter::new(directives(verbosity, from_env.as_deref()));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(verbosity >= 2);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
