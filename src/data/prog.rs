use std::process::Command;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, warn};

use super::*;
use crate::runner::{run_mp, RunnerError};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("cannot run '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{}' exited with {code:?}: {stderr}", program.display())]
    Status {
        program: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
    #[error("bad trace output from '{}': {source}", program.display())]
    Output {
        program: PathBuf,
        #[source]
        source: TraceError,
    },
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Runs the program under analysis on one input vector.
///
/// Must be deterministic for a given input.
pub trait Executor: Send + Sync {
    fn run(&self, inps: &[i64]) -> Result<DTraces, ExecError>;
}

/// Spawns an instrumented executable with the inputs as arguments and
/// reads trace-store lines from its stdout.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    pub program: PathBuf,
    /// Arguments passed before the inputs.
    pub args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandExecutor {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

impl Executor for CommandExecutor {
    fn run(&self, inps: &[i64]) -> Result<DTraces, ExecError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(inps.iter().map(|v| v.to_string()))
            .output()
            .map_err(|source| ExecError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ExecError::Status {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        DTraces::parse(&stdout).map_err(|source| ExecError::Output {
            program: self.program.clone(),
            source,
        })
    }
}

/// Observations of one location: name, then `(variable, value)` pairs.
pub type Observation = (String, Vec<(String, i64)>);

/// An in-process program: a closure from inputs to observations.
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&[i64]) -> Vec<Observation> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnExecutor { f }
    }
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&[i64]) -> Vec<Observation> + Send + Sync,
{
    fn run(&self, inps: &[i64]) -> Result<DTraces, ExecError> {
        let mut out = DTraces::new();
        for (loc, assignment) in (self.f)(inps) {
            let vars = Symbs::new(assignment.iter().map(|(n, _)| n.clone()));
            let row = assignment.into_iter().map(|(_, v)| v).collect();
            out.add(&loc, &vars, row)
                .map_err(|e| ExecError::Failed(e.to_string()))?;
        }
        Ok(out)
    }
}

// ─── Program ───────────────────────────────────────────────────────

/// The program under analysis: an executor plus its input declarations.
pub struct Prog {
    exe: Box<dyn Executor>,
    inp_decls: Symbs,
    inp_max_v: i64,
    do_mp: bool,
    valid_ranges: OnceLock<Vec<(i64, i64)>>,
}

impl Prog {
    pub fn new(exe: Box<dyn Executor>, inp_decls: Symbs, inp_max_v: i64, do_mp: bool) -> Self {
        Prog {
            exe,
            inp_decls,
            inp_max_v,
            do_mp,
            valid_ranges: OnceLock::new(),
        }
    }

    pub fn inp_decls(&self) -> &Symbs {
        &self.inp_decls
    }

    /// Run one input vector.
    pub fn run(&self, inps: &[i64]) -> Result<DTraces, ExecError> {
        self.exe.run(inps)
    }

    /// Input ranges that produce traces: `[0, max]` and `[-max, max]`,
    /// each probed once with a midpoint input. Falls back to `[0, max]`.
    fn valid_ranges(&self) -> &[(i64, i64)] {
        self.valid_ranges.get_or_init(|| {
            let max = self.inp_max_v;
            let n = self.inp_decls.len();
            let mut ranges = Vec::new();
            for (lo, hi, probe) in [(0, max, max / 2), (-max, max, -(max / 2))] {
                match self.exe.run(&vec![probe; n]) {
                    Ok(t) if !t.is_empty() => ranges.push((lo, hi)),
                    Ok(_) => debug!("input range [{}, {}] gives no traces", lo, hi),
                    Err(e) => debug!("input range [{}, {}] fails: {}", lo, hi, e),
                }
            }
            if ranges.is_empty() {
                ranges.push((0, max));
            }
            ranges
        })
    }

    /// Draw `n` distinct random input vectors.
    pub fn gen_rand_inps(&self, rng: &mut StdRng, n: usize) -> Inps {
        let mut inps = Inps::new();
        if self.inp_decls.is_empty() {
            inps.merge_rows([Vec::new()]);
            return inps;
        }
        let ranges = self.valid_ranges().to_vec();
        // distinct vectors may run out for tiny ranges
        let max_attempts = n.saturating_mul(10).max(10);
        for attempt in 0..max_attempts {
            if inps.len() >= n {
                break;
            }
            let (lo, hi) = ranges[attempt % ranges.len()];
            let row = (0..self.inp_decls.len())
                .map(|_| rng.gen_range(lo..=hi))
                .collect();
            inps.merge_rows([row]);
        }
        inps
    }

    /// Run every input and collect the traces. A failing input is logged
    /// and contributes nothing.
    pub fn get_traces(&self, inps: &Inps) -> Result<DTraces, ExecError> {
        let tasks: Vec<Vec<i64>> = inps.iter().cloned().collect();
        let results = run_mp(
            "get_traces",
            tasks,
            |batch: Vec<Vec<i64>>| {
                batch
                    .into_iter()
                    .map(|inp| {
                        let r = self.exe.run(&inp);
                        (inp, r)
                    })
                    .collect::<Vec<_>>()
            },
            self.do_mp,
        )?;

        let mut dtraces = DTraces::new();
        for (inp, r) in results {
            match r {
                Ok(t) => {
                    dtraces
                        .merge(&t)
                        .map_err(|e| ExecError::Failed(e.to_string()))?;
                }
                Err(e) => warn!("input {:?}: {}", inp, e),
            }
        }
        Ok(dtraces)
    }
}
