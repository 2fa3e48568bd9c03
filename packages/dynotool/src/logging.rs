//! Diagnostic logging on stderr.
//!
//! stdout carries command results only, so records piped into another
//! tool are never interleaved with log lines.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a full filter directive, e.g.
/// `DYNOTOOL_LOG=dynotool::scanner=trace`.
pub const LOG_ENV: &str = "DYNOTOOL_LOG";

/// Base level for a `-v` count: warn, info, debug, trace.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn filter_for(verbosity: u8) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)))
        }
        _ => EnvFilter::new(format!(
            "{},aws_config=warn,aws_smithy_runtime=warn,hyper=warn",
            level_for(verbosity)
        )),
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbosity: u8) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbosity))
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
