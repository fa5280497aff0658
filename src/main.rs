use human_panic::setup_panic;
use log::error;
use microgrid_planner::cli::run_cli;
use microgrid_planner::log::is_logger_initialised;

fn main() {
    setup_panic!();

    if let Err(err) = run_cli() {
        if is_logger_initialised() {
            error!("{err:?}");
        } else {
            eprintln!("Error: {err:?}");
        }

        std::process::exit(1);
    }
}
