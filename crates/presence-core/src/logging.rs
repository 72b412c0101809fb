//! Log filtering and subscriber setup for presence client applications
//!
//! The crates only emit `tracing` events. An application installs a
//! subscriber once with [`setup_logging`], driven by the `[logging]` section
//! of its [`PresenceClientConfig`](crate::config::PresenceClientConfig).
//!
//! Output goes to stderr so it never interleaves with the presence lines a
//! [`ConsoleRenderer`](crate::console::ConsoleRenderer) consumer prints to
//! stdout.

use std::str::FromStr;

use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LogSettings};
use crate::error::{PresenceError, PresenceResult};

/// Targets that follow `LogSettings::level`
pub const CRATE_TARGETS: [&str; 2] = ["sipim_presence_core", "sipim_msrp_core"];

/// Parse a level such as `"debug"`, `"WARN"` or `"off"`
pub fn parse_log_level(level: &str) -> PresenceResult<LevelFilter> {
    LevelFilter::from_str(level.trim()).map_err(|_| {
        PresenceError::configuration("logging.level", format!("Invalid log level: {}", level))
    })
}

fn check_directive(field: &str, directive: &str) -> PresenceResult<String> {
    let directive = directive.trim();
    Directive::from_str(directive)
        .map_err(|e| PresenceError::configuration(field, format!("{}: {}", directive, e)))?;
    Ok(directive.to_string())
}

/// Filter directives in application order.
///
/// The fallback level comes first, then one directive per crate target,
/// then the configured extras, then `env` (a `RUST_LOG` style list).
pub fn filter_directives(settings: &LogSettings, env: Option<&str>) -> PresenceResult<Vec<String>> {
    let level = settings.level.trim();
    parse_log_level(level)?;
    let other = settings.other_level.trim();
    parse_log_level(other).map_err(|_| {
        PresenceError::configuration("logging.other_level", format!("Invalid log level: {}", other))
    })?;

    let mut directives = vec![other.to_ascii_lowercase()];
    for target in CRATE_TARGETS {
        directives.push(format!("{}={}", target, level.to_ascii_lowercase()));
    }
    for directive in &settings.directives {
        directives.push(check_directive("logging.directives", directive)?);
    }
    if let Some(env) = env {
        for directive in env.split(',').filter(|d| !d.trim().is_empty()) {
            directives.push(check_directive("RUST_LOG", directive)?);
        }
    }
    Ok(directives)
}

/// Build the subscriber filter for `settings` plus optional `RUST_LOG` text
pub fn build_filter(settings: &LogSettings, env: Option<&str>) -> PresenceResult<EnvFilter> {
    let directives = filter_directives(settings, env)?;
    EnvFilter::try_new(directives.join(","))
        .map_err(|e| PresenceError::configuration("logging", e.to_string()))
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` is applied on top of `settings`. Fails if a global subscriber
/// is already installed.
pub fn setup_logging(settings: &LogSettings) -> PresenceResult<()> {
    let env = std::env::var("RUST_LOG").ok();
    let filter = build_filter(settings, env.as_deref())?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(settings.file_info)
        .with_line_number(settings.file_info);

    let installed = match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| PresenceError::configuration("logging", e.to_string()))?;

    tracing::debug!(version = crate::VERSION, level = %settings.level, "Logging initialized");
    Ok(())
}
