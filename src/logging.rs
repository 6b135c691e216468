//! Structured logging setup for the `grader` binary.
//!
//! Logs go to stderr so stdout stays clean for JSON results. The filter is
//! taken from `GRADER_LOG` (or `RUST_LOG`) when set, otherwise from the CLI
//! flags.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable that overrides the CLI log level.
pub const LOG_ENV: &str = "GRADER_LOG";

const CRATE_TARGET: &str = "rag_grader";

/// Filter directive for the given CLI flags. A bare level applies to this
/// crate only; anything containing `=` is used as-is.
pub fn filter_directive(verbose: bool, log_level: Option<&str>) -> String {
    match (verbose, log_level) {
        (_, Some(level)) if level.contains('=') => level.to_string(),
        (_, Some(level)) => format!("{}={}", CRATE_TARGET, level),
        (true, None) => format!("{}=debug", CRATE_TARGET),
        (false, None) => format!("{}=info", CRATE_TARGET),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(verbose: bool, log_level: Option<&str>, log_json: bool) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
    {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directive(verbose, log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_span_events(fmt::format::FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
