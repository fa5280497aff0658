//! Capacity-expansion and dispatch model builder for hybrid microgrids.
//!
//! A project directory describes a microgrid (renewable sources, an optional battery bank, optional
//! generators and an optional grid connection) over a horizon of scenarios, years and intra-year
//! periods. From it we formulate a mixed-integer linear programme, hand it to a solver and expose
//! the solution by variable name.
#![warn(missing_docs)]

use std::path::PathBuf;

pub mod cli;
pub mod formulation;
pub mod id;
pub mod input;
pub mod log;
pub mod output;
pub mod parameter;
pub mod problem;
pub mod project;
pub mod sets;
pub mod settings;
pub mod solver;
pub mod topology;

#[cfg(test)]
mod fixture;

/// Get the directory where program configuration files live.
///
/// Falls back to the current directory if the platform has no notion of a config directory.
pub fn get_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_default();
    path.push("mgplan");

    path
}
