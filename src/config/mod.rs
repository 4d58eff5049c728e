//! Run settings.
//!
//! `Settings` is an immutable value built once per run (defaults, then an
//! optional JSON file, then command-line switches) and passed by reference
//! to the orchestrator and every engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};


#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Every toggle and constant of an inference run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ─── Toggles ───────────────────────────────────────────────────
    /// Run task batches on the rayon pool instead of sequentially.
    pub do_mp: bool,
    /// Run the simplification pipeline during sanitize.
    pub do_simplify: bool,
    /// Pre-filter bound terms before asking the oracle.
    pub do_filter: bool,
    /// Use symbolic states when running a live program.
    pub do_ss: bool,
    pub do_eqts: bool,
    pub do_ieqs: bool,
    pub do_congruences: bool,
    pub do_minmaxplus: bool,
    /// Log solver statistics at the end of a run.
    pub do_solver_stats: bool,

    // ─── Trace acquisition ─────────────────────────────────────────
    /// Number of random inputs generated per request.
    pub n_rand_inps: usize,
    /// Random inputs are drawn from `[0, inp_max_v]` (or `[-inp_max_v, inp_max_v]`).
    pub inp_max_v: i64,
    /// Traces with any value whose magnitude exceeds this are not tested.
    pub trace_max_val: i64,

    // ─── Equalities ────────────────────────────────────────────────
    /// Equations wanted per template unknown.
    pub eqt_rate: f64,
    /// Equalities with a coefficient above this are "ugly".
    pub ugly_factor: i64,
    /// Equalities with more monomials than this are "ugly".
    pub ugly_nterms: usize,
    /// Template size cap used by automatic degree selection.
    pub max_term: usize,

    // ─── Inequalities ──────────────────────────────────────────────
    /// Bounds are searched in `[-iupper, iupper]`.
    pub iupper: i64,
    /// Upper constant for min/max terms.
    pub iupper_mmp: i64,
    /// Highest monomial degree in octagonal terms.
    pub ideg: u32,
    /// Highest number of monomials in an octagonal term.
    pub iterms: usize,
    /// Coefficients of octagonal terms range over `[-icoefs, icoefs]`.
    pub icoefs: i64,

    // ─── Solver budget ─────────────────────────────────────────────
    pub solver_timeout_ms: u64,
    pub solver_max_constraints: usize,
    pub solver_max_disjuncts: usize,

    // ─── Paths ─────────────────────────────────────────────────────
    /// Parent of the per-run scratch directory (system temp dir if unset).
    pub tmpdir: Option<PathBuf>,
    /// Where the run result is saved.
    pub outdir: Option<PathBuf>,
    pub write_vtraces: Option<PathBuf>,
    pub write_sstates: Option<PathBuf>,
    pub read_sstates: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            do_mp: true,
            do_simplify: true,
            do_filter: true,
            do_ss: true,
            do_eqts: true,
            do_ieqs: true,
            do_congruences: false,
            do_minmaxplus: false,
            do_solver_stats: false,
            n_rand_inps: 100,
            inp_max_v: 300,
            trace_max_val: 1_000_000_000,
            eqt_rate: 1.5,
            ugly_factor: 20,
            ugly_nterms: 10,
            max_term: 200,
            iupper: 128,
            iupper_mmp: 2,
            ideg: 1,
            iterms: 2,
            icoefs: 1,
            solver_timeout_ms: 1000,
            solver_max_constraints: 4000,
            solver_max_disjuncts: 64,
            tmpdir: None,
            outdir: None,
            write_vtraces: None,
            write_sstates: None,
            read_sstates: None,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.eqt_rate.is_nan() || self.eqt_rate < 0.1 {
            return invalid(format!("eqt_rate must be >= 0.1, got {}", self.eqt_rate));
        }
        if self.iupper < 1 {
            return invalid(format!("iupper must be >= 1, got {}", self.iupper));
        }
        if self.iupper_mmp < 0 {
            return invalid(format!("iupper_mmp must be >= 0, got {}", self.iupper_mmp));
        }
        if self.ideg < 1 {
            return invalid("ideg must be >= 1".to_string());
        }
        if self.iterms < 1 {
            return invalid("iterms must be >= 1".to_string());
        }
        if self.icoefs < 1 {
            return invalid(format!("icoefs must be >= 1, got {}", self.icoefs));
        }
        if self.inp_max_v < 1 {
            return invalid(format!("inp_max_v must be >= 1, got {}", self.inp_max_v));
        }
        Ok(())
    }

    /// Settings for a sequential run; used by tests and nested batches.
    pub fn sequential(&self) -> Settings {
        Settings {
            do_mp: false,
            ..self.clone()
        }
    }
}
