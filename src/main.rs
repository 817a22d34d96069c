use clap::Parser;
use env_logger::Env;
use log::{debug, LevelFilter};

use layerlens::cli::Cli;
use layerlens::commands;

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity level
    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    debug!("verbosity level: {}", cli.verbose);

    if let Err(err) = commands::run(cli) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
