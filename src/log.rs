//! Program-wide logging, built on [`fern`].
//!
//! Messages go to stderr with coloured levels. When an output folder is given, a plain-text copy
//! of the log is also written there.
use anyhow::{Result, bail};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// The default log level for the program
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable which overrides the configured log level
pub const LOG_LEVEL_ENV_VAR: &str = "MGPLAN_LOG_LEVEL";

/// Name of the log file written to the output folder
const LOG_FILE_NAME: &str = "mgplan_info.log";

static LOGGER_INITIALISED: OnceLock<()> = OnceLock::new();

/// Whether [`init`] has been called successfully
pub fn is_logger_initialised() -> bool {
    LOGGER_INITIALISED.get().is_some()
}

/// Whether the user has switched logging off via the environment
pub fn is_logging_disabled() -> bool {
    std::env::var(LOG_LEVEL_ENV_VAR).is_ok_and(|level| level.eq_ignore_ascii_case("off"))
}

/// Initialise the program logger.
///
/// # Arguments
///
/// * `log_level_from_settings` - The log level from the program settings. Overridden by the
///   `MGPLAN_LOG_LEVEL` environment variable if set.
/// * `output_path` - Folder in which to save a log file, if any
pub fn init(log_level_from_settings: &str, output_path: Option<&Path>) -> Result<()> {
    if is_logger_initialised() {
        bail!("Logger already initialised");
    }

    let log_level = std::env::var(LOG_LEVEL_ENV_VAR)
        .unwrap_or_else(|_| log_level_from_settings.to_string());
    let Ok(log_level) = LevelFilter::from_str(&log_level) else {
        bail!("Invalid log level: {log_level}");
    };

    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let console = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}] {}",
                colours.color(record.level()),
                message
            ));
        })
        .chain(std::io::stderr());

    let mut dispatch = fern::Dispatch::new()
        .level(log_level)
        // The solver bindings are chatty at debug level
        .level_for("highs", LevelFilter::Warn)
        .chain(console);

    if let Some(output_path) = output_path {
        let file = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{} {}] {}",
                    record.level(),
                    record.target(),
                    message
                ));
            })
            .chain(fern::log_file(output_path.join(LOG_FILE_NAME))?);
        dispatch = dispatch.chain(file);
    }

    dispatch.apply()?;
    let _ = LOGGER_INITIALISED.set(());

    Ok(())
}
