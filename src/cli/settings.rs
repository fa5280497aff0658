//! The CLI commands for the program settings file.
use crate::settings::{Settings, get_settings_file_path};
use anyhow::Result;
use clap::Subcommand;

/// The subcommands for managing the settings file.
#[derive(Subcommand)]
pub enum SettingsSubcommands {
    /// Print the path to the settings file.
    Path,
    /// Print the contents of the default settings file.
    ShowDefault,
}

impl SettingsSubcommands {
    /// Execute the supplied settings subcommand
    pub fn execute(self) -> Result<()> {
        match self {
            Self::Path => println!("{}", get_settings_file_path().display()),
            Self::ShowDefault => print!("{}", Settings::default_file_contents()),
        }

        Ok(())
    }
}
