use std::path::PathBuf;
use std::process;

use clap::Args;

use super::{print_result, SettingsArgs};

#[derive(Args)]
pub struct TracesArgs {
    /// Trace file: a declaration line per location, then one line per trace
    pub tracefile: PathBuf,
    /// Extra traces used only to test the inferred invariants
    #[arg(long, value_name = "PATH")]
    pub test_traces: Option<PathBuf>,
    #[command(flatten)]
    pub settings: SettingsArgs,
}

pub fn cmd_traces(args: TracesArgs) {
    let settings = args.settings.settings();
    let seed = args.settings.seed();
    let dig = match dig::alg::DigTraces::mk(&args.tracefile, args.test_traces.as_deref(), settings) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    match dig.start(seed, args.settings.maxdeg) {
        Ok(out) => print_result(&args.tracefile, seed, &out, args.settings.json),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
