//! Code for loading program settings.
use crate::get_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use anyhow::Result;
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Environment variable which, if set to `1`, makes the program ignore the settings file
pub const USE_DEFAULT_SETTINGS_ENV_VAR: &str = "MGPLAN_USE_DEFAULT_SETTINGS";

const DEFAULT_SETTINGS_FILE_HEADER: &str = concat!(
    "# Program settings for mgplan.
#
# The default options for mgplan v",
    env!("CARGO_PKG_VERSION"),
    " are shown below, commented out. Uncomment an option to change it.
#
# To show the default options for the current version, run:
# \tmgplan settings show-default
"
);

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// The default program log level
    pub log_level: String,
    /// Whether to overwrite output files by default
    pub overwrite: bool,
    /// Folder in which results are saved. Defaults to `mgplan_results`.
    pub results_root: PathBuf,
    /// Maximum time the solver may run for, in seconds. Unlimited if not set.
    pub solver_time_limit: Option<f64>,
    /// Relative gap at which the solver stops improving a mixed-integer solution
    pub mip_relative_gap: Option<f64>,
    /// Whether to show the solver's own output
    pub solver_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            overwrite: false,
            results_root: PathBuf::from("mgplan_results"),
            solver_time_limit: None,
            mip_relative_gap: None,
            solver_output: false,
        }
    }
}

impl Settings {
    /// Read the settings file from the program's config directory.
    ///
    /// If the file is not present, or `MGPLAN_USE_DEFAULT_SETTINGS=1`, default settings are used.
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if loading fails.
    pub fn load() -> Result<Settings> {
        if std::env::var(USE_DEFAULT_SETTINGS_ENV_VAR).is_ok_and(|value| value == "1") {
            return Ok(Settings::default());
        }

        Self::load_from_path(&get_settings_file_path())
    }

    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        read_toml(file_path)
    }

    /// The contents of the default settings file.
    ///
    /// Options which are unset by default are omitted.
    pub fn default_file_contents() -> String {
        let settings = Settings::default();
        let settings_raw = toml::to_string(&settings).expect("Could not convert settings to TOML");

        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.split('\n') {
            if let Some((field, _)) = line.split_once('=') {
                let field = field.trim();

                // All fields should have doc comments
                let docs = Settings::get_field_docs(field).expect("Missing doc comment for field");
                for line in docs.split('\n') {
                    write!(&mut out, "\n# # {}\n", line.trim()).unwrap();
                }

                writeln!(&mut out, "# {}", line.trim()).unwrap();
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "log_level = \"warn\"\nsolver_time_limit = 60.0").unwrap();
        }

        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings {
                log_level: "warn".to_string(),
                solver_time_limit: Some(60.0),
                ..Settings::default()
            }
        );
    }

    #[test]
    fn default_file_contents() {
        let contents = Settings::default_file_contents();
        assert!(contents.contains("# # Whether to show the solver's own output"));
        assert!(contents.contains("# log_level = \"info\""));

        // Unset options are not written
        assert!(!contents.contains("# solver_time_limit ="));
    }
}
