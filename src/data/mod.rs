//! Traces, inputs and the trace store.
//!
//! A trace is one observed assignment of every variable declared at a
//! location. Traces only grow during a run: merging de-duplicates and
//! reports what was new, nothing is ever removed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};

use crate::poly::{Poly, Template};

mod prog;
#[cfg(test)]
mod tests;

pub use prog::*;

/// A variable assignment returned by the solver.
pub type Model = BTreeMap<String, i64>;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("cannot access trace file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: location '{loc}' has no declaration")]
    Undeclared { line: usize, loc: String },
    #[error("location '{loc}': expected {expected} values, got {got}")]
    Arity {
        loc: String,
        expected: usize,
        got: usize,
    },
    #[error("location '{loc}': variable declarations differ")]
    VarMismatch { loc: String },
}

// ─── Declarations ──────────────────────────────────────────────────

/// Ordered variable names declared at one location.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbs(Vec<String>);

impl Symbs {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Symbs(names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }
}

impl fmt::Display for Symbs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

// ─── Traces ────────────────────────────────────────────────────────

/// Borrowed view of one trace.
#[derive(Clone, Copy, Debug)]
pub struct Trace<'a> {
    vars: &'a Symbs,
    vs: &'a [i64],
}

impl<'a> Trace<'a> {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.vars.index_of(name).map(|i| self.vs[i])
    }

    pub fn values(&self) -> &'a [i64] {
        self.vs
    }

    /// True if some value's magnitude exceeds `limit`.
    pub fn exceeds(&self, limit: i64) -> bool {
        self.vs.iter().any(|v| v.unsigned_abs() > limit.unsigned_abs())
    }

    /// Exact value of `p` at this trace.
    pub fn eval(&self, p: &Poly) -> Option<BigRational> {
        p.eval(&|n: &str| self.get(n))
    }
}

/// All traces observed at one location.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Traces {
    vars: Symbs,
    rows: IndexSet<Vec<i64>>,
}

impl Traces {
    pub fn new(vars: Symbs) -> Self {
        Traces {
            vars,
            rows: IndexSet::new(),
        }
    }

    pub fn vars(&self) -> &Symbs {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Trace<'_>> {
        self.rows.iter().map(move |r| Trace {
            vars: &self.vars,
            vs: r,
        })
    }

    /// Add one row. Returns `false` if it was already present.
    pub fn add(&mut self, loc: &str, row: Vec<i64>) -> Result<bool, TraceError> {
        if row.len() != self.vars.len() {
            return Err(TraceError::Arity {
                loc: loc.to_string(),
                expected: self.vars.len(),
                got: row.len(),
            });
        }
        Ok(self.rows.insert(row))
    }

    /// Import `other`; returns the traces that were not already present.
    pub fn merge(&mut self, loc: &str, other: &Traces) -> Result<Traces, TraceError> {
        if self.vars != other.vars {
            return Err(TraceError::VarMismatch {
                loc: loc.to_string(),
            });
        }
        let mut new = Traces::new(self.vars.clone());
        for row in &other.rows {
            if self.rows.insert(row.clone()) {
                new.rows.insert(row.clone());
            }
        }
        Ok(new)
    }

    /// Traces built from solver models, with unassigned variables set to 0.
    pub fn extract(models: &[Model], vars: &Symbs) -> Traces {
        let mut out = Traces::new(vars.clone());
        for m in models {
            let row = vars
                .names()
                .iter()
                .map(|v| m.get(v).copied().unwrap_or(0))
                .collect();
            out.rows.insert(row);
        }
        out
    }

    /// Instantiate `template` at every trace, keeping distinct rows, at
    /// most `limit` of them.
    pub fn instantiate(&self, template: &Template, limit: Option<usize>) -> Vec<Vec<BigInt>> {
        let mut rows: IndexSet<Vec<BigInt>> = IndexSet::new();
        for t in self.iter() {
            if limit.is_some_and(|l| rows.len() >= l) {
                break;
            }
            if let Some(row) = template.instantiate(&|n: &str| t.get(n)) {
                rows.insert(row);
            }
        }
        rows.into_iter().collect()
    }
}

/// Location to traces.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DTraces(BTreeMap<String, Traces>);

impl DTraces {
    pub fn new() -> Self {
        DTraces::default()
    }

    pub fn get(&self, loc: &str) -> Option<&Traces> {
        self.0.get(loc)
    }

    pub fn locs(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Traces)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Traces::is_empty)
    }

    /// Total number of traces over all locations.
    pub fn siz(&self) -> usize {
        self.0.values().map(Traces::len).sum()
    }

    /// Declare a location. Redeclaring with different variables is an error.
    pub fn declare(&mut self, loc: &str, vars: &Symbs) -> Result<(), TraceError> {
        match self.0.get(loc) {
            Some(t) if t.vars() != vars => Err(TraceError::VarMismatch {
                loc: loc.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.0.insert(loc.to_string(), Traces::new(vars.clone()));
                Ok(())
            }
        }
    }

    pub fn add(&mut self, loc: &str, vars: &Symbs, row: Vec<i64>) -> Result<bool, TraceError> {
        self.declare(loc, vars)?;
        match self.0.get_mut(loc) {
            Some(t) => t.add(loc, row),
            None => Ok(false),
        }
    }

    pub fn remove(&mut self, loc: &str) -> Option<Traces> {
        self.0.remove(loc)
    }

    pub fn insert(&mut self, loc: &str, traces: Traces) -> Result<Traces, TraceError> {
        self.declare(loc, traces.vars())?;
        match self.0.get_mut(loc) {
            Some(t) => t.merge(loc, &traces),
            None => Ok(Traces::new(traces.vars().clone())),
        }
    }

    /// Import `other`; returns only the traces that were new.
    pub fn merge(&mut self, other: &DTraces) -> Result<DTraces, TraceError> {
        let mut new = DTraces::new();
        for (loc, traces) in &other.0 {
            let added = self.insert(loc, traces.clone())?;
            if !added.is_empty() {
                new.0.insert(loc.clone(), added);
            }
        }
        Ok(new)
    }

    // ─── Trace store ───────────────────────────────────────────────

    /// Parse trace-store text.
    ///
    /// ```text
    /// # comment
    /// vtrace1; I x; I y
    /// vtrace1; 1; 2
    /// ```
    pub fn parse(text: &str) -> Result<DTraces, TraceError> {
        let mut out = DTraces::new();
        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(';').map(str::trim);
            let loc = fields.next().unwrap_or_default();
            if loc.is_empty() {
                return Err(TraceError::Syntax {
                    line: line_no,
                    message: "missing location name".to_string(),
                });
            }
            let rest: Vec<&str> = fields.collect();

            let is_decl = match rest.first() {
                Some(f) => f.parse::<i64>().is_err(),
                None => out.get(loc).is_none(),
            };
            if is_decl {
                let vars = rest
                    .iter()
                    .map(|f| parse_decl(f, line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                out.declare(loc, &Symbs(vars))?;
                continue;
            }

            let row = rest
                .iter()
                .map(|f| {
                    f.parse::<i64>().map_err(|_| TraceError::Syntax {
                        line: line_no,
                        message: format!("bad value '{}'", f),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            match out.0.get_mut(loc) {
                Some(t) => {
                    t.add(loc, row)?;
                }
                None => {
                    return Err(TraceError::Undeclared {
                        line: line_no,
                        loc: loc.to_string(),
                    })
                }
            }
        }
        Ok(out)
    }

    /// Render in trace-store format: declaration line, then one line per
    /// trace, locations in name order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (loc, traces) in &self.0 {
            out.push_str(loc);
            for v in traces.vars().names() {
                out.push_str(&format!("; I {}", v));
            }
            out.push('\n');
            for t in traces.iter() {
                out.push_str(loc);
                for v in t.values() {
                    out.push_str(&format!("; {}", v));
                }
                out.push('\n');
            }
        }
        out
    }

    pub fn vread(path: &Path) -> Result<DTraces, TraceError> {
        let text = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        DTraces::parse(&text)
    }

    pub fn vwrite(&self, path: &Path) -> Result<(), TraceError> {
        std::fs::write(path, self.render()).map_err(|source| TraceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl fmt::Display for DTraces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (loc, traces) in &self.0 {
            writeln!(f, "{} ({} traces over {})", loc, traces.len(), traces.vars())?;
        }
        Ok(())
    }
}

fn parse_decl(field: &str, line: usize) -> Result<String, TraceError> {
    let mut parts = field.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("I"), Some(name), None) => Ok(name.to_string()),
        (Some(ty), Some(_), None) => Err(TraceError::Syntax {
            line,
            message: format!("unsupported variable type '{}'", ty),
        }),
        _ => Err(TraceError::Syntax {
            line,
            message: format!("bad declaration '{}'", field),
        }),
    }
}

// ─── Inputs ────────────────────────────────────────────────────────

/// De-duplicated program input vectors, in generation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inps {
    rows: IndexSet<Vec<i64>>,
}

impl Inps {
    pub fn new() -> Self {
        Inps::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<i64>> {
        self.rows.iter()
    }

    pub fn contains(&self, row: &[i64]) -> bool {
        self.rows.contains(row)
    }

    /// Import raw vectors; returns the ones that were new.
    pub fn merge_rows<I>(&mut self, rows: I) -> Inps
    where
        I: IntoIterator<Item = Vec<i64>>,
    {
        let mut new = Inps::new();
        for row in rows {
            if self.rows.insert(row.clone()) {
                new.rows.insert(row);
            }
        }
        new
    }

    /// Import counterexample models projected on the input names; inputs
    /// missing from a model are 0.
    pub fn merge_models(&mut self, models: &[Model], inp_decls: &Symbs) -> Inps {
        let rows: Vec<Vec<i64>> = models
            .iter()
            .map(|m| {
                inp_decls
                    .names()
                    .iter()
                    .map(|v| m.get(v).copied().unwrap_or(0))
                    .collect()
            })
            .collect();
        self.merge_rows(rows)
    }
}

impl FromIterator<Vec<i64>> for Inps {
    fn from_iter<I: IntoIterator<Item = Vec<i64>>>(iter: I) -> Self {
        let mut inps = Inps::new();
        inps.merge_rows(iter);
        inps
    }
}
