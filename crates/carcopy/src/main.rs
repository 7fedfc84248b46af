//! carcopy: hands CAR files from a batch directory tree to a copy script
//!
//! Commands:
//! - `run`: long-running daemon that scans, dispatches and tracks copy jobs
//! - `scan`: one-shot listing of the files `run` would pick up, in order
//! - `version`: print the build version

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "carcopy", about = "Copy CAR files with an external script")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Directory for log files (defaults to $CARCOPY_HOME/logs)
    #[arg(long, global = true, env = "CARCOPY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the root directory and run the copy script for every CAR file
    #[command(visible_alias = "r")]
    Run(cli::run::RunArgs),

    /// List the CAR files a run would process, oldest first
    Scan {
        /// Root directory of batch subdirectories
        root_car_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = carcopy_logging::init_logging(carcopy_logging::LogConfig {
        app_name: "carcopy",
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    });
    if let Err(err) = &logging {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::run(args),
        Commands::Scan { root_car_dir, json } => cli::scan::run(&root_car_dir, json),
        Commands::Version => cli::version::run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if logging.is_ok() {
                tracing::error!("{:#}", err);
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::from(1)
        }
    }
}
