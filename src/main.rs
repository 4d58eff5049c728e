mod cli;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::run::{cmd_run, RunArgs};
use cli::traces::{cmd_traces, TracesArgs};

#[derive(Parser)]
#[command(
    name = "dig",
    version,
    about = "Numerical invariant inference from program traces"
)]
struct Cli {
    /// Log filter, e.g. `debug` or `dig::infer=trace` (default: $RUST_LOG, then info)
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Infer invariants from a trace file
    Traces(TracesArgs),
    /// Run a program on generated inputs and infer invariants at its locations
    Run(RunArgs),
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match cli.command {
        Command::Traces(args) => cmd_traces(args),
        Command::Run(args) => cmd_run(args),
    }
}
