//! Orchestrator: one inference run over a trace file or a program.
//!
//! A run is either trace-only (engines see concrete traces, results are
//! unproved) or symbolic (engines consult an oracle built from symbolic
//! states). The mode is fixed when the run starts. Both end in
//! [`sanitize`]: trace-test every invariant, then simplify.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, Settings};
use crate::data::{DTraces, ExecError, Prog, TraceError, Traces};
use crate::infer::eqt::{self, EqtInfer};
use crate::infer::opt::{self, OptInfer};
use crate::infer::{congruence, DInvs, Found, InferError, Invs};
use crate::poly::auto_deg;
use crate::report::{ReportError, RunResult};
use crate::runner::{run_mp, RunnerError};
use crate::solver::{
    FmSolver, Oracle, OracleError, Prover, SolverStats, SymExecutor, SymStates,
};


#[derive(Debug, thiserror::Error)]
pub enum DigError {
    #[error("maxdeg must be at least 1")]
    InvalidMaxDeg,
    #[error("no program inputs to run")]
    NoInputs,
    #[error("no traces")]
    NoTraces,
    #[error("no symbolic states: give a backend or a states file")]
    NoSymStates,
    #[error("cannot create scratch directory under '{}': {source}", path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Infer(#[from] InferError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Elapsed seconds per phase.
pub type Timings = BTreeMap<String, f64>;

fn record(timings: &mut Timings, phase: &str, start: Instant) {
    *timings.entry(phase.to_string()).or_insert(0.0) += start.elapsed().as_secs_f64();
}

/// Everything a run produces.
#[derive(Clone, Debug, Default)]
pub struct RunOutput {
    pub dinvs: DInvs,
    pub dtraces: DTraces,
    pub stats: SolverStats,
    pub timings: Timings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Eqts,
    Ieqs,
    MinMax,
    Congruence,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Eqts => "eqts",
            Phase::Ieqs => "ieqs",
            Phase::MinMax => "minmax",
            Phase::Congruence => "congruence",
        }
    }

    fn enabled(settings: &Settings, symbolic: bool) -> Vec<Phase> {
        let mut phases = Vec::new();
        if settings.do_eqts {
            phases.push(Phase::Eqts);
        }
        if settings.do_ieqs {
            phases.push(Phase::Ieqs);
        }
        if settings.do_minmaxplus {
            phases.push(Phase::MinMax);
        }
        if settings.do_congruences && !symbolic {
            phases.push(Phase::Congruence);
        }
        phases
    }

    fn rng(self, seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed.wrapping_add(self as u64))
    }
}

fn check_maxdeg(maxdeg: Option<u32>) -> Result<(), DigError> {
    match maxdeg {
        Some(0) => Err(DigError::InvalidMaxDeg),
        _ => Ok(()),
    }
}

// ─── Sanitize ──────────────────────────────────────────────────────

/// Drop invariants some trace violates, then simplify what is left.
///
/// Skipped for an empty set. A simplification batch that fails keeps the
/// tested invariants as they are.
pub fn sanitize(
    dinvs: DInvs,
    dtraces: &DTraces,
    prover: &dyn Prover,
    settings: &Settings,
    stats: &mut SolverStats,
    timings: &mut Timings,
) -> Result<DInvs, DigError> {
    if dinvs.is_empty() {
        return Ok(dinvs);
    }
    let n = dinvs.siz();
    let tested = dinvs.test(dtraces, settings)?;
    if tested.siz() < n {
        debug!("test: removed {} invs", n - tested.siz());
    }
    if tested.is_empty() || !settings.do_simplify {
        return Ok(tested);
    }

    let st = Instant::now();
    let n = tested.siz();
    let out = match tested.simplify(prover, settings) {
        Ok((simplified, s)) => {
            *stats += &s;
            simplified
        }
        Err(InferError::Runner(e)) => {
            warn!("{}", e);
            tested
        }
        Err(e) => return Err(e.into()),
    };
    record(timings, "simplify", st);
    info!(
        "simplify: {} -> {} invs ({:.2}s)",
        n,
        out.siz(),
        timings.get("simplify").copied().unwrap_or_default()
    );
    Ok(out)
}

// ─── Trace-only runs ───────────────────────────────────────────────

/// Inference from recorded traces alone.
pub struct DigTraces {
    dtraces: DTraces,
    test_dtraces: Option<DTraces>,
    settings: Settings,
}

impl DigTraces {
    pub fn new(dtraces: DTraces, test_dtraces: Option<DTraces>, settings: Settings) -> Self {
        DigTraces {
            dtraces,
            test_dtraces,
            settings,
        }
    }

    /// Replay a trace file, optionally with a second file of traces used
    /// only to test the results.
    pub fn mk(
        tracefile: &Path,
        test_tracefile: Option<&Path>,
        settings: Settings,
    ) -> Result<Self, DigError> {
        let dtraces = DTraces::vread(tracefile)?;
        let test_dtraces = test_tracefile.map(DTraces::vread).transpose()?;
        Ok(DigTraces::new(dtraces, test_dtraces, settings))
    }

    pub fn dtraces(&self) -> &DTraces {
        &self.dtraces
    }

    pub fn start(&self, seed: u64, maxdeg: Option<u32>) -> Result<RunOutput, DigError> {
        check_maxdeg(maxdeg)?;
        if self.dtraces.is_empty() {
            return Err(DigError::NoTraces);
        }
        let settings = &self.settings;
        let total = Instant::now();
        info!(
            "seed {}: {} traces at {} locs",
            seed,
            self.dtraces.siz(),
            self.dtraces.locs().count()
        );

        let nvars = self
            .dtraces
            .iter()
            .map(|(_, t)| t.vars().len())
            .max()
            .unwrap_or_default();
        let deg = auto_deg(maxdeg, nvars, settings.max_term);

        let tasks: Vec<(String, Phase)> = self
            .dtraces
            .locs()
            .flat_map(|loc| {
                Phase::enabled(settings, false)
                    .into_iter()
                    .map(move |p| (loc.clone(), p))
            })
            .collect();
        let inner = settings.sequential();
        let results = run_mp(
            "(pure) dynamic inference",
            tasks,
            |batch: Vec<(String, Phase)>| {
                batch
                    .into_iter()
                    .map(|(loc, phase)| {
                        let st = Instant::now();
                        let invs = match self.dtraces.get(&loc) {
                            Some(traces) => infer_from_traces(phase, traces, deg, &inner),
                            None => Invs::new(),
                        };
                        (loc, phase, invs, st.elapsed().as_secs_f64())
                    })
                    .collect::<Vec<_>>()
            },
            settings.do_mp,
        )
        .unwrap_or_else(|e| {
            warn!("{}", e);
            Vec::new()
        });

        let mut out = RunOutput::default();
        for (loc, phase, invs, secs) in results {
            *out.timings.entry(phase.name().to_string()).or_insert(0.0) += secs;
            debug!("{}: {} {}", loc, invs.len(), phase.name());
            for inv in invs.iter() {
                out.dinvs.add(&loc, inv.clone());
            }
        }

        out.dtraces = self.dtraces.clone();
        if let Some(test) = &self.test_dtraces {
            let added = out.dtraces.merge(test)?;
            debug!("test traces: {} new", added.siz());
        }

        let prover = FmSolver::new(settings);
        out.dinvs = sanitize(
            out.dinvs,
            &out.dtraces,
            &prover,
            settings,
            &mut out.stats,
            &mut out.timings,
        )?;
        record(&mut out.timings, "total", total);
        info!(
            "got {} invs at {} locs ({:.2}s)",
            out.dinvs.siz(),
            out.dinvs.locs().count(),
            out.timings.get("total").copied().unwrap_or_default()
        );
        Ok(out)
    }
}

fn infer_from_traces(
    phase: Phase,
    traces: &Traces,
    deg: u32,
    settings: &Settings,
) -> Invs {
    let vars = traces.vars();
    match phase {
        Phase::Eqts => eqt::gen_from_traces(deg, traces, settings),
        Phase::Ieqs => {
            let terms = opt::oct_terms(vars, settings.ideg, settings.iterms, settings.icoefs);
            opt::gen_from_traces(&terms, traces, settings.iupper)
        }
        Phase::MinMax => {
            opt::gen_from_traces(&opt::minmax_terms(vars), traces, settings.iupper_mmp)
        }
        Phase::Congruence => congruence::gen_from_traces(traces, settings),
    }
}

// ─── Program runs ──────────────────────────────────────────────────

/// Inference over a live program, checked against symbolic states.
pub struct DigSymStates {
    filename: PathBuf,
    prog: Prog,
    backend: Option<Box<dyn SymExecutor>>,
    settings: Settings,
}

impl DigSymStates {
    pub fn new(
        filename: impl Into<PathBuf>,
        prog: Prog,
        backend: Option<Box<dyn SymExecutor>>,
        settings: Settings,
    ) -> Self {
        DigSymStates {
            filename: filename.into(),
            prog,
            backend,
            settings,
        }
    }

    pub fn start(&self, seed: u64, maxdeg: Option<u32>) -> Result<RunOutput, DigError> {
        check_maxdeg(maxdeg)?;
        let out = if self.settings.do_ss {
            self.start_symbolic(seed, maxdeg)?
        } else {
            self.start_traces(seed, maxdeg)?
        };
        if let Some(path) = &self.settings.write_vtraces {
            out.dtraces.vwrite(path)?;
            info!("vtraces written to {}", path.display());
        }
        Ok(out)
    }

    fn start_traces(&self, seed: u64, maxdeg: Option<u32>) -> Result<RunOutput, DigError> {
        let st = Instant::now();
        let mut rng = StdRng::seed_from_u64(seed);
        let inps = self.prog.gen_rand_inps(&mut rng, self.settings.n_rand_inps);
        if inps.is_empty() {
            return Err(DigError::NoInputs);
        }
        debug!("gen {} random inps", inps.len());
        let dtraces = self.prog.get_traces(&inps)?;
        if dtraces.is_empty() {
            return Err(DigError::NoTraces);
        }
        let traces_secs = st.elapsed().as_secs_f64();

        let dig = DigTraces::new(dtraces, None, self.settings.clone());
        let mut out = dig.start(seed, maxdeg)?;
        *out.timings.entry("traces".to_string()).or_insert(0.0) += traces_secs;
        *out.timings.entry("total".to_string()).or_insert(0.0) += traces_secs;
        Ok(out)
    }

    fn symbolic_states(&self) -> Result<SymStates, DigError> {
        let solver = FmSolver::new(&self.settings);
        if let Some(path) = &self.settings.read_sstates {
            info!("reading symbolic states from {}", path.display());
            return Ok(SymStates::vread(path, solver)?);
        }
        let backend = self.backend.as_ref().ok_or(DigError::NoSymStates)?;
        let ss = backend.compute()?.with_solver(solver);
        if let Some(path) = &self.settings.write_sstates {
            ss.vwrite(path)?;
            info!("symbolic states written to {}", path.display());
        }
        Ok(ss)
    }

    fn start_symbolic(&self, seed: u64, maxdeg: Option<u32>) -> Result<RunOutput, DigError> {
        let settings = &self.settings;
        let total = Instant::now();
        let base = settings.tmpdir.clone().unwrap_or_else(std::env::temp_dir);
        let scratch = std::fs::create_dir_all(&base)
            .and_then(|_| {
                tempfile::Builder::new()
                    .prefix(&format!("dig_{}_", seed))
                    .tempdir_in(&base)
            })
            .map_err(|source| DigError::Scratch {
                path: base.clone(),
                source,
            })?;
        debug!("scratch dir {}", scratch.path().display());

        let mut out = RunOutput::default();
        let st = Instant::now();
        let ss = self.symbolic_states()?;
        record(&mut out.timings, "symbolic_states", st);
        if ss.is_empty() {
            warn!("no symbolic states");
        }

        let nvars = ss
            .locs()
            .iter()
            .filter_map(|loc| ss.vars(loc).map(|v| v.len()))
            .max()
            .unwrap_or_default();
        let deg = auto_deg(maxdeg, nvars, settings.max_term);

        let phases = Phase::enabled(settings, true);
        let results = run_mp(
            "symbolic inference",
            phases,
            |batch: Vec<Phase>| {
                batch
                    .into_iter()
                    .map(|phase| {
                        let st = Instant::now();
                        let r = self.run_phase(phase, &ss, deg, seed);
                        (phase, r, st.elapsed().as_secs_f64())
                    })
                    .collect::<Vec<_>>()
            },
            settings.do_mp,
        )
        .unwrap_or_else(|e| {
            warn!("{}", e);
            Vec::new()
        });

        let mut traces_secs = 0.0;
        for (phase, r, secs) in results {
            *out.timings.entry(phase.name().to_string()).or_insert(0.0) += secs;
            match r {
                Ok(found) => {
                    info!("{}: got {} invs ({:.2}s)", phase.name(), found.dinvs.siz(), secs);
                    out.dinvs.merge(&found.dinvs);
                    out.dtraces.merge(&found.dtraces)?;
                    out.stats += &found.stats;
                    traces_secs += found.traces_secs;
                }
                Err(e) => warn!("{}: {}", phase.name(), e),
            }
        }
        // program runs happen inside the engines, so this overlaps their times
        out.timings.insert("traces".to_string(), traces_secs);

        let missing: Vec<String> = out
            .dtraces
            .locs()
            .filter(|loc| ss.get(loc.as_str()).is_none())
            .cloned()
            .collect();
        for loc in missing {
            warn!("{}: no symbolic states, skipped", loc);
            out.dtraces.remove(&loc);
        }

        out.dinvs = sanitize(
            out.dinvs,
            &out.dtraces,
            ss.solver(),
            settings,
            &mut out.stats,
            &mut out.timings,
        )?;
        record(&mut out.timings, "total", total);
        info!(
            "got {} invs at {} locs ({:.2}s)",
            out.dinvs.siz(),
            out.dinvs.locs().count(),
            out.timings.get("total").copied().unwrap_or_default()
        );
        if settings.do_solver_stats {
            info!("solver: {}", out.stats);
        }

        let result = RunResult::new(&self.filename, seed, &out);
        let saved = result.save(scratch.path())?;
        debug!("result saved to {}", saved.display());
        if let Some(outdir) = &settings.outdir {
            let saved = result.save(outdir)?;
            info!("result saved to {}", saved.display());
        }
        Ok(out)
    }

    fn run_phase(
        &self,
        phase: Phase,
        ss: &SymStates,
        deg: u32,
        seed: u64,
    ) -> Result<Found, InferError> {
        match phase {
            Phase::Eqts => {
                let mut rng = phase.rng(seed);
                EqtInfer::new(ss, &self.prog, &self.settings).gen(deg, &mut rng)
            }
            Phase::Ieqs => OptInfer::new(ss, &self.settings).gen_octs(),
            Phase::MinMax => OptInfer::new(ss, &self.settings).gen_minmax(),
            Phase::Congruence => Ok(Found::default()),
        }
    }
}
