//! The command line interface for the model builder.
use crate::formulation::build_model;
use crate::input::load_project;
use crate::log;
use crate::output::{create_output_directory, get_output_dir, write_summary, write_variables};
use crate::settings::Settings;
use crate::solver::{HighsBackend, SolverBackend};
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the model builder.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for the `run` command
#[derive(Args)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Build and solve the model for a project.
    Run {
        /// Path to the project directory.
        project_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Load a project and build its model without solving it.
    Validate {
        /// Path to the project directory.
        project_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { project_dir, opts } => handle_run_command(&project_dir, &opts, None),
            Self::Validate { project_dir } => handle_validate_command(&project_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        command.execute()?;
    } else {
        // No command provided. Show help.
        Cli::command().print_long_help()?;
    }

    Ok(())
}

/// Load program settings, if not provided
fn settings_or_load(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Handle the `run` command.
pub fn handle_run_command(
    project_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = settings_or_load(settings)?;
    if opts.overwrite {
        settings.overwrite = true;
    }

    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(project_path, settings.results_root.clone())?;
        &pathbuf
    };

    let overwrite =
        create_output_directory(output_path, settings.overwrite).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    log::init(&settings.log_level, Some(output_path)).context("Failed to initialise logging.")?;
    info!("Starting mgplan v{}", env!("CARGO_PKG_VERSION"));

    let project = load_project(project_path).context("Failed to load project.")?;
    info!("Loaded project from {}", project_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let model = build_model(&project).context("Failed to build model.")?;
    let backend = HighsBackend {
        time_limit: settings.solver_time_limit,
        mip_relative_gap: settings.mip_relative_gap,
        output: settings.solver_output,
    };
    let solution = backend
        .solve(&model.problem)
        .context("Failed to solve model.")?;
    info!("Objective value: {}", solution.objective_value());

    write_variables(output_path, &solution)?;
    write_summary(
        output_path,
        &project.config.project.name,
        &solution,
        model.problem.num_rows(),
    )?;
    info!("Results saved to: {}", output_path.display());

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(project_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = settings_or_load(settings)?;

    // We won't save log files when running the validate command
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    let project = load_project(project_path).context("Failed to load project.")?;
    let model = build_model(&project).context("Failed to build model.")?;
    info!(
        "Project validation successful! The model has {} variables and {} constraints.",
        model.problem.num_columns(),
        model.problem.num_rows()
    );

    Ok(())
}
