use std::path::PathBuf;
use std::process;

use clap::Args;

use dig::alg::DigSymStates;
use dig::data::{CommandExecutor, Prog, Symbs};

use super::{print_result, SettingsArgs};

#[derive(Args)]
pub struct RunArgs {
    /// Instrumented executable; takes the inputs as arguments and prints
    /// trace lines on stdout
    pub program: PathBuf,
    /// Names of the program inputs, in argument order
    #[arg(long, value_delimiter = ',', required = true)]
    pub inputs: Vec<String>,
    /// Symbolic states file (JSON); without it only random inputs are used
    #[arg(long, value_name = "PATH")]
    pub sstates: Option<PathBuf>,
    /// Largest magnitude of random inputs
    #[arg(long)]
    pub inp_max_v: Option<i64>,
    /// Number of random inputs in trace-only runs
    #[arg(long)]
    pub n_rand_inps: Option<usize>,
    /// Arguments passed to the program before the inputs
    #[arg(last = true)]
    pub args: Vec<String>,
    #[command(flatten)]
    pub settings: SettingsArgs,
}

pub fn cmd_run(args: RunArgs) {
    let mut settings = args.settings.settings();
    let seed = args.settings.seed();
    if let Some(v) = args.inp_max_v {
        settings.inp_max_v = v;
    }
    if let Some(n) = args.n_rand_inps {
        settings.n_rand_inps = n;
    }
    settings.do_ss = args.sstates.is_some();
    settings.read_sstates = args.sstates.clone();
    if let Err(e) = settings.validate() {
        eprintln!("error: {}", e);
        process::exit(1);
    }

    let mut exe = CommandExecutor::new(&args.program);
    exe.args = args.args.clone();
    let prog = Prog::new(
        Box::new(exe),
        Symbs::new(args.inputs.iter().cloned()),
        settings.inp_max_v,
        settings.do_mp,
    );

    let dig = DigSymStates::new(&args.program, prog, None, settings);
    match dig.start(seed, args.settings.maxdeg) {
        Ok(out) => print_result(&args.program, seed, &out, args.settings.json),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}
