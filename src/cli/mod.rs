pub mod run;
pub mod traces;

use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Args;

use dig::alg::RunOutput;
use dig::config::Settings;
use dig::report::RunResult;

/// Switches shared by every inference command.
#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// JSON settings file; switches below override it
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Random seed (default: derived from the clock)
    #[arg(long)]
    pub seed: Option<u64>,
    /// Maximum degree of equalities (default: chosen from the variable count)
    #[arg(long)]
    pub maxdeg: Option<u32>,
    /// Run everything on the current thread
    #[arg(long)]
    pub no_mp: bool,
    /// Keep redundant invariants
    #[arg(long)]
    pub no_simplify: bool,
    /// Do not pre-filter bound terms
    #[arg(long)]
    pub no_filter: bool,
    /// Skip equalities
    #[arg(long)]
    pub no_eqts: bool,
    /// Skip octagonal bounds
    #[arg(long)]
    pub no_ieqs: bool,
    /// Infer min/max relations
    #[arg(long)]
    pub minmax: bool,
    /// Infer congruences (trace-only runs)
    #[arg(long)]
    pub congruences: bool,
    /// Log solver usage at the end of a run
    #[arg(long)]
    pub solver_stats: bool,
    /// Upper bound magnitude for octagonal terms
    #[arg(long)]
    pub iupper: Option<i64>,
    /// Upper bound magnitude for min/max terms
    #[arg(long)]
    pub iupper_mmp: Option<i64>,
    /// Ratio of traces to template unknowns
    #[arg(long)]
    pub eqt_rate: Option<f64>,
    /// Directory for run scratch files
    #[arg(long, value_name = "DIR")]
    pub tmpdir: Option<PathBuf>,
    /// Directory to save result.json into
    #[arg(long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,
    /// Write the final traces to this file
    #[arg(long, value_name = "PATH")]
    pub write_vtraces: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl SettingsArgs {
    /// Settings from the config file (or defaults) with switches applied.
    /// Exits on an unreadable or invalid configuration.
    pub fn settings(&self) -> Settings {
        let mut s = match &self.config {
            Some(path) => match Settings::load(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            },
            None => Settings::default(),
        };
        s.do_mp &= !self.no_mp;
        s.do_simplify &= !self.no_simplify;
        s.do_filter &= !self.no_filter;
        s.do_eqts &= !self.no_eqts;
        s.do_ieqs &= !self.no_ieqs;
        s.do_minmaxplus |= self.minmax;
        s.do_congruences |= self.congruences;
        s.do_solver_stats |= self.solver_stats;
        if let Some(v) = self.iupper {
            s.iupper = v;
        }
        if let Some(v) = self.iupper_mmp {
            s.iupper_mmp = v;
        }
        if let Some(v) = self.eqt_rate {
            s.eqt_rate = v;
        }
        if let Some(dir) = &self.tmpdir {
            s.tmpdir = Some(dir.clone());
        }
        if let Some(dir) = &self.outdir {
            s.outdir = Some(dir.clone());
        }
        if let Some(path) = &self.write_vtraces {
            s.write_vtraces = Some(path.clone());
        }
        if let Err(e) = s.validate() {
            eprintln!("error: {}", e);
            process::exit(1);
        }
        s
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default()
        })
    }
}

/// Print a finished run to stdout.
pub fn print_result(filename: &Path, seed: u64, out: &RunOutput, json: bool) {
    let result = RunResult::new(filename, seed, out);
    if !json {
        print!("{}", result);
        return;
    }
    match serde_json::to_string_pretty(&result) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("error: cannot serialize result: {}", e);
            process::exit(1);
        }
    }
}
