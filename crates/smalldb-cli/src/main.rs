//! Smalldb CLI - Build state machine definitions from machine sources

mod cli;

use clap::Parser;
use smalldb::core::logging::init_logging;

fn main() {
    let cli_args = cli::Cli::parse();

    // Flags win; unset flags fall back to SMALLDB_LOG_LEVEL / SMALLDB_LOG_FORMAT
    let level = cli_args.log_level.map(|l| l.as_str());
    let format = cli_args.log_format.map(|f| f.as_str());
    if let Err(e) = init_logging(level, format) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let app = cli::SmalldbApp::new();

    if let Err(e) = app.run(cli_args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
