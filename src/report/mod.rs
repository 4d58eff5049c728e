//! Persisted result of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alg::{RunOutput, Timings};
use crate::infer::{sorted_for_display, InvKind, Stat};
use crate::solver::SolverStats;


pub const RESULT_FILE: &str = "result.json";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed result '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvRecord {
    pub text: String,
    pub kind: InvKind,
    pub stat: Option<Stat>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub filename: PathBuf,
    pub seed: u64,
    /// Invariants per location, in display order.
    pub locs: BTreeMap<String, Vec<InvRecord>>,
    pub ntraces: usize,
    pub stats: SolverStats,
    pub timings: Timings,
}

impl RunResult {
    pub fn new(filename: &Path, seed: u64, out: &RunOutput) -> Self {
        let locs = out
            .dinvs
            .iter()
            .map(|(loc, invs)| {
                let records = sorted_for_display(invs)
                    .into_iter()
                    .map(|inv| InvRecord {
                        text: inv.to_string(),
                        kind: inv.kind(),
                        stat: inv.stat(),
                    })
                    .collect();
                (loc.clone(), records)
            })
            .collect();
        RunResult {
            filename: filename.to_path_buf(),
            seed,
            locs,
            ntraces: out.dtraces.siz(),
            stats: out.stats.clone(),
            timings: out.timings.clone(),
        }
    }

    pub fn ninvs(&self) -> usize {
        self.locs.values().map(Vec::len).sum()
    }

    /// Write `result.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        let path = dir.join(RESULT_FILE);
        let io_err = |source| ReportError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let json = serde_json::to_string_pretty(self).map_err(|source| ReportError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_err)?;
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<RunResult, ReportError> {
        let path = dir.join(RESULT_FILE);
        let content = std::fs::read_to_string(&path).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ReportError::Json { path, source })
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (loc, records)) in self.locs.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{} ({} invs):", loc, records.len())?;
            for (j, r) in records.iter().enumerate() {
                writeln!(f, "{}. {}", j + 1, r.text)?;
            }
        }
        Ok(())
    }
}
