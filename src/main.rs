//! Pipettor CLI — recipe compiler and runner for liquid-handling robots.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "pipettor",
    version,
    about = "Compile liquid-handling recipes into robot protocols with cross-run tip tracking"
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: pipettor::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    pipettor::cli::init_logging(cli.verbose);
    if let Err(e) = pipettor::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
