//! Invariants and the engines that infer them.
//!
//! An [`Inv`] is a relation ([`Payload`]) plus a verification status.
//! Equality and hashing look at the payload only, so the same relation with
//! a different status is the same invariant. [`Invs`] is a set of
//! invariants at one location and [`DInvs`] maps locations to sets.
//!
//! Engines:
//! - [`eqt`]: polynomial equalities (template solving, CEGIR refinement)
//! - [`opt`]: octagonal and min/max upper bounds (optimization)
//! - [`congruence`]: modular relations from traces
//!
//! [`CInvs`] classifies a set by kind for simplification.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexSet;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Settings;
use crate::data::{DTraces, Trace, Traces};
use crate::poly::{rat, Poly};
use crate::runner::{run_mp, RunnerError};
use crate::solver::{Formula, Objective, Prover, Rel, SolverStats};

mod cinvs;
pub mod congruence;
pub mod eqt;
pub mod opt;
#[cfg(test)]
mod tests;

pub use cinvs::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvError {
    #[error("equality right-hand side must be 0, got {0}")]
    NonZeroRhs(String),
    #[error("trivial relation {0}")]
    Trivial(String),
    #[error("congruence modulus must be at least 2, got {0}")]
    Modulus(i64),
    #[error("{op} needs at least two arguments, got {got}")]
    MinMaxArity { op: MinMaxOp, got: usize },
    #[error("empty array relation")]
    EmptyArrayRel,
    #[error("false invariant at '{0}' cannot be simplified")]
    FalseInSimplify(String),
}

// ─── Status ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Proved,
    Disproved,
    Unknown,
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stat::Proved => "proved",
            Stat::Disproved => "disproved",
            Stat::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

// ─── Payloads ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MinMaxOp {
    Max,
    Min,
}

impl fmt::Display for MinMaxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinMaxOp::Max => write!(f, "max"),
            MinMaxOp::Min => write!(f, "min"),
        }
    }
}

/// `lhs - op(args)` when `lhs_first`, otherwise `op(args) - lhs`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MinMaxTerm {
    pub op: MinMaxOp,
    pub lhs: String,
    pub args: Vec<String>,
    pub lhs_first: bool,
}

impl MinMaxTerm {
    /// The term as a min or max of polynomials:
    /// `a - max(b, c) = min(a - b, a - c)` and so on.
    pub fn objective(&self) -> Objective {
        let a = Poly::var(&self.lhs);
        let diffs: Vec<Poly> = self
            .args
            .iter()
            .map(|b| {
                if self.lhs_first {
                    a.clone() - Poly::var(b)
                } else {
                    Poly::var(b) - a.clone()
                }
            })
            .collect();
        match (self.op, self.lhs_first) {
            (MinMaxOp::Max, true) | (MinMaxOp::Min, false) => Objective::Min(diffs),
            (MinMaxOp::Min, true) | (MinMaxOp::Max, false) => Objective::Max(diffs),
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.lhs.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// The same pair of variables with the subtraction reversed.
    pub fn flipped(&self) -> MinMaxTerm {
        MinMaxTerm {
            lhs_first: !self.lhs_first,
            ..self.clone()
        }
    }
}

impl fmt::Display for MinMaxTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let call = format!("{}({})", self.op, self.args.join(", "));
        if self.lhs_first {
            write!(f, "{} - {}", self.lhs, call)
        } else {
            write!(f, "{} - {}", call, self.lhs)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MinMax {
    /// `term <= bound`
    Bound { term: MinMaxTerm, bound: i64 },
    /// `lhs == op(args)`
    Eq {
        op: MinMaxOp,
        lhs: String,
        args: Vec<String>,
    },
}

/// The relation an invariant states.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Payload {
    False,
    /// `p == 0`, `p` primitive.
    Eqt(Poly),
    /// `term <= bound`
    Oct { term: Poly, bound: i64 },
    MinMax(MinMax),
    /// `term % modulus == residue`, `0 <= residue < modulus`.
    Congruence {
        term: Poly,
        modulus: i64,
        residue: i64,
    },
    /// Array-index relation, kept verbatim.
    NestedArray(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvKind {
    Eqt,
    Oct,
    MinMax,
    Congruence,
    NestedArray,
    False,
}

impl fmt::Display for InvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvKind::Eqt => "eqt",
            InvKind::Oct => "oct",
            InvKind::MinMax => "minmax",
            InvKind::Congruence => "congruence",
            InvKind::NestedArray => "nested_array",
            InvKind::False => "false",
        };
        write!(f, "{}", s)
    }
}

// ─── Invariants ────────────────────────────────────────────────────

/// A relation plus its verification status (`None` until checked).
#[derive(Clone, Debug)]
pub struct Inv {
    payload: Payload,
    stat: Option<Stat>,
}

impl PartialEq for Inv {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for Inv {}

impl Hash for Inv {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}

impl Inv {
    fn mk(payload: Payload) -> Inv {
        Inv {
            payload,
            stat: None,
        }
    }

    /// The location is unreachable.
    pub fn false_inv() -> Inv {
        Inv::mk(Payload::False)
    }

    /// `p == 0`, stored in primitive form.
    pub fn eqt(p: Poly) -> Result<Inv, InvError> {
        if p.is_constant() {
            return Err(InvError::Trivial(format!("{} == 0", p)));
        }
        Ok(Inv::mk(Payload::Eqt(p.primitive())))
    }

    /// `lhs == rhs`; the right-hand side must be zero.
    pub fn eqt_rel(lhs: Poly, rhs: Poly) -> Result<Inv, InvError> {
        if !rhs.is_zero() {
            return Err(InvError::NonZeroRhs(rhs.to_string()));
        }
        Inv::eqt(lhs)
    }

    /// `term <= bound`.
    pub fn oct(term: Poly, bound: i64) -> Result<Inv, InvError> {
        if term.is_constant() {
            return Err(InvError::Trivial(format!("{} <= {}", term, bound)));
        }
        Ok(Inv::mk(Payload::Oct { term, bound }))
    }

    pub fn mmp_bound(term: MinMaxTerm, bound: i64) -> Result<Inv, InvError> {
        if term.args.len() < 2 {
            return Err(InvError::MinMaxArity {
                op: term.op,
                got: term.args.len(),
            });
        }
        Ok(Inv::mk(Payload::MinMax(MinMax::Bound { term, bound })))
    }

    pub fn mmp_eq(op: MinMaxOp, lhs: String, args: Vec<String>) -> Result<Inv, InvError> {
        if args.len() < 2 {
            return Err(InvError::MinMaxArity { op, got: args.len() });
        }
        Ok(Inv::mk(Payload::MinMax(MinMax::Eq { op, lhs, args })))
    }

    /// `term % modulus == residue`; the residue is normalized into
    /// `[0, modulus)`.
    pub fn congruence(term: Poly, modulus: i64, residue: i64) -> Result<Inv, InvError> {
        if modulus < 2 {
            return Err(InvError::Modulus(modulus));
        }
        if term.is_constant() {
            return Err(InvError::Trivial(format!("{} % {}", term, modulus)));
        }
        Ok(Inv::mk(Payload::Congruence {
            term,
            modulus,
            residue: residue.mod_floor(&modulus),
        }))
    }

    pub fn nested_array(rel: impl Into<String>) -> Result<Inv, InvError> {
        let rel = rel.into();
        if rel.trim().is_empty() {
            return Err(InvError::EmptyArrayRel);
        }
        Ok(Inv::mk(Payload::NestedArray(rel)))
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn stat(&self) -> Option<Stat> {
        self.stat
    }

    pub fn set_stat(&mut self, stat: Stat) {
        self.stat = Some(stat);
    }

    pub fn with_stat(&self, stat: Stat) -> Inv {
        Inv {
            payload: self.payload.clone(),
            stat: Some(stat),
        }
    }

    pub fn is_proved(&self) -> bool {
        self.stat == Some(Stat::Proved)
    }

    pub fn is_disproved(&self) -> bool {
        self.stat == Some(Stat::Disproved)
    }

    pub fn is_unknown(&self) -> bool {
        self.stat == Some(Stat::Unknown)
    }

    pub fn kind(&self) -> InvKind {
        match self.payload {
            Payload::False => InvKind::False,
            Payload::Eqt(_) => InvKind::Eqt,
            Payload::Oct { .. } => InvKind::Oct,
            Payload::MinMax(_) => InvKind::MinMax,
            Payload::Congruence { .. } => InvKind::Congruence,
            Payload::NestedArray(_) => InvKind::NestedArray,
        }
    }

    /// Number of monomials (or variables, for min/max relations).
    pub fn nterms(&self) -> usize {
        match &self.payload {
            Payload::False | Payload::NestedArray(_) => 0,
            Payload::Eqt(p) => p.len(),
            Payload::Oct { term, .. } | Payload::Congruence { term, .. } => term.len(),
            Payload::MinMax(MinMax::Bound { term, .. }) => term.args.len() + 1,
            Payload::MinMax(MinMax::Eq { args, .. }) => args.len() + 1,
        }
    }

    /// Does the relation hold at `t`? Traces with a value beyond
    /// `trace_max_val` are not tested and pass.
    pub fn test_single_trace(&self, t: &Trace<'_>, trace_max_val: i64) -> bool {
        if t.exceeds(trace_max_val) {
            return true;
        }
        let lookup = |n: &str| t.get(n);
        let holds = match &self.payload {
            Payload::False => Some(false),
            Payload::NestedArray(_) => Some(true),
            Payload::Eqt(p) => p.eval(&lookup).map(|v| v.is_zero()),
            Payload::Oct { term, bound } => term.eval(&lookup).map(|v| v <= rat(*bound)),
            Payload::MinMax(MinMax::Bound { term, bound }) => {
                term.objective().eval(&lookup).map(|v| v <= rat(*bound))
            }
            Payload::MinMax(MinMax::Eq { op, lhs, args }) => {
                let a = lookup(lhs);
                let vals: Option<Vec<i64>> = args.iter().map(|b| lookup(b)).collect();
                match (a, vals) {
                    (Some(a), Some(vals)) => {
                        let m = match op {
                            MinMaxOp::Max => vals.iter().max().copied(),
                            MinMaxOp::Min => vals.iter().min().copied(),
                        };
                        Some(m == Some(a))
                    }
                    _ => None,
                }
            }
            Payload::Congruence {
                term,
                modulus,
                residue,
            } => term.eval(&lookup).map(|v| {
                v.is_integer()
                    && v.to_integer().mod_floor(&BigInt::from(*modulus)) == BigInt::from(*residue)
            }),
        };
        holds.unwrap_or(false)
    }

    /// True iff the relation holds at every trace.
    pub fn test(&self, traces: &Traces, trace_max_val: i64) -> bool {
        traces
            .iter()
            .all(|t| self.test_single_trace(&t, trace_max_val))
    }

    /// The relation in oracle form; `None` for array relations.
    pub fn to_formula(&self) -> Option<Formula> {
        Some(match &self.payload {
            Payload::False => Formula::False,
            Payload::NestedArray(_) => return None,
            Payload::Eqt(p) => Formula::atom(p.clone(), Rel::Eq),
            Payload::Oct { term, bound } => Formula::le(term.clone(), Poly::from_int(*bound)),
            Payload::MinMax(MinMax::Bound { term, bound }) => term.objective().le(*bound),
            Payload::MinMax(MinMax::Eq { op, lhs, args }) => {
                let a = Poly::var(lhs);
                let sides: Vec<Formula> = args
                    .iter()
                    .map(|b| match op {
                        MinMaxOp::Max => Formula::le(Poly::var(b), a.clone()),
                        MinMaxOp::Min => Formula::le(a.clone(), Poly::var(b)),
                    })
                    .collect();
                let hits: Vec<Formula> = args
                    .iter()
                    .map(|b| Formula::eq(a.clone(), Poly::var(b)))
                    .collect();
                let mut parts = sides;
                parts.push(Formula::or(hits));
                Formula::and(parts)
            }
            Payload::Congruence {
                term,
                modulus,
                residue,
            } => Formula::congruent(term.clone(), *modulus, *residue),
        })
    }

    /// An octagon over a single variable, e.g. `-x <= 3`.
    pub fn is_simple_oct(&self) -> bool {
        match &self.payload {
            Payload::Oct { term, .. } => term.vars().len() == 1,
            _ => false,
        }
    }

    /// Equality with too many terms or too large a coefficient to be
    /// useful as a premise.
    pub fn is_ugly(&self, ugly_factor: i64, ugly_nterms: usize) -> bool {
        match &self.payload {
            Payload::Eqt(p) => p.len() > ugly_nterms || p.max_abs_coef() > rat(ugly_factor),
            _ => false,
        }
    }
}

impl fmt::Display for Inv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::False => write!(f, "False"),
            Payload::Eqt(p) => write!(f, "{} == 0", p),
            Payload::Oct { term, bound } => write!(f, "{} <= {}", term, bound),
            Payload::MinMax(MinMax::Bound { term, bound }) => write!(f, "{} <= {}", term, bound),
            Payload::MinMax(MinMax::Eq { op, lhs, args }) => {
                write!(f, "{} == {}({})", lhs, op, args.join(", "))
            }
            Payload::Congruence {
                term,
                modulus,
                residue,
            } => {
                if term.len() > 1 || term.terms().any(|(_, c)| c.is_negative()) {
                    write!(f, "({}) % {} == {}", term, modulus, residue)
                } else {
                    write!(f, "{} % {} == {}", term, modulus, residue)
                }
            }
            Payload::NestedArray(s) => write!(f, "{}", s),
        }
    }
}

// ─── Invariant sets ────────────────────────────────────────────────

/// Invariants at one location, unique by payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invs(IndexSet<Inv>);

impl Invs {
    pub fn new() -> Self {
        Invs::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Inv> {
        self.0.iter()
    }

    /// Insert unless an invariant with the same payload is present.
    pub fn add(&mut self, inv: Inv) -> bool {
        self.0.insert(inv)
    }

    /// Insert, overwriting the status of an existing equal invariant.
    pub fn replace(&mut self, inv: Inv) {
        self.0.replace(inv);
    }

    pub fn remove(&mut self, inv: &Inv) -> bool {
        self.0.shift_remove(inv)
    }

    pub fn get(&self, inv: &Inv) -> Option<&Inv> {
        self.0.get(inv)
    }

    pub fn contains(&self, inv: &Inv) -> bool {
        self.0.contains(inv)
    }

    /// Keep the invariants that hold at every trace.
    pub fn test(&self, traces: &Traces, settings: &Settings) -> Result<Invs, RunnerError> {
        let tasks: Vec<&Inv> = self.0.iter().collect();
        let results = run_mp(
            "test",
            tasks,
            |batch: Vec<&Inv>| {
                batch
                    .into_iter()
                    .map(|inv| (inv, inv.test(traces, settings.trace_max_val)))
                    .collect::<Vec<_>>()
            },
            settings.do_mp,
        )?;
        let mut kept = Invs::new();
        for (inv, passed) in results {
            if passed {
                kept.add(inv.clone());
            } else {
                debug!("remove {}", inv);
            }
        }
        Ok(kept)
    }

    pub fn cinvs(&self, settings: &Settings) -> CInvs {
        CInvs::classify(self, settings)
    }

    pub fn remove_disproved(&self) -> Invs {
        self.iter().filter(|i| !i.is_disproved()).cloned().collect()
    }
}

impl FromIterator<Inv> for Invs {
    fn from_iter<I: IntoIterator<Item = Inv>>(iter: I) -> Self {
        Invs(iter.into_iter().collect())
    }
}

impl Extend<Inv> for Invs {
    fn extend<I: IntoIterator<Item = Inv>>(&mut self, iter: I) {
        for inv in iter {
            self.add(inv);
        }
    }
}

/// Location to invariants.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DInvs(BTreeMap<String, Invs>);

impl DInvs {
    pub fn new() -> Self {
        DInvs::default()
    }

    /// One set for one location.
    pub fn mk(loc: &str, invs: Invs) -> DInvs {
        let mut d = DInvs::new();
        d.0.insert(loc.to_string(), invs);
        d
    }

    /// `False` at every location, the query for "is this reachable?".
    pub fn mk_false_invs<I, S>(locs: I) -> DInvs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut d = DInvs::new();
        for loc in locs {
            d.add(loc.as_ref(), Inv::false_inv());
        }
        d
    }

    /// Add an invariant at `loc`. Returns `false` if it was present.
    pub fn add(&mut self, loc: &str, inv: Inv) -> bool {
        assert!(!loc.is_empty(), "location name must not be empty");
        self.0.entry(loc.to_string()).or_default().add(inv)
    }

    pub fn get(&self, loc: &str) -> Option<&Invs> {
        self.0.get(loc)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Invs)> {
        self.0.iter()
    }

    pub fn locs(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn invs(&self) -> impl Iterator<Item = &Inv> {
        self.0.values().flat_map(Invs::iter)
    }

    /// Total number of invariants.
    pub fn siz(&self) -> usize {
        self.0.values().map(Invs::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.siz() == 0
    }

    /// Number of invariants of each kind.
    pub fn typ_ctr(&self) -> BTreeMap<InvKind, usize> {
        let mut ctr = BTreeMap::new();
        for inv in self.invs() {
            *ctr.entry(inv.kind()).or_insert(0) += 1;
        }
        ctr
    }

    /// Import `other`. A payload disproved in either operand is absent from
    /// the result; otherwise a definitive status wins over unset/unknown.
    pub fn merge(&mut self, other: &DInvs) {
        for (loc, invs) in &other.0 {
            let mine = self.0.entry(loc.clone()).or_default();
            for inv in invs.iter() {
                match mine.get(inv).map(Inv::stat) {
                    None => {
                        mine.add(inv.clone());
                    }
                    Some(Some(Stat::Disproved)) => {}
                    Some(old) => {
                        if inv.is_disproved() || matches!(old, None | Some(Stat::Unknown)) {
                            mine.replace(inv.clone());
                        }
                    }
                }
            }
        }
        for invs in self.0.values_mut() {
            *invs = invs.remove_disproved();
        }
    }

    pub fn remove_disproved(&self) -> DInvs {
        DInvs(
            self.0
                .iter()
                .map(|(loc, invs)| (loc.clone(), invs.remove_disproved()))
                .filter(|(_, invs)| !invs.is_empty())
                .collect(),
        )
    }

    /// Reconcile this (newer) snapshot with `prior`.
    ///
    /// Invariants unchanged in payload take the prior status when their own
    /// is unset or unknown. The returned delta holds, per location, the
    /// invariants not in `prior` plus those whose definitive status changed.
    /// Afterwards `prior` holds this snapshot.
    pub fn update(&mut self, prior: &mut DInvs) -> DInvs {
        let mut delta = DInvs::new();
        for (loc, invs) in self.0.iter_mut() {
            let old = prior.0.get(loc);
            let mut updated = Invs::new();
            let mut changed = Invs::new();
            for inv in invs.iter() {
                let mut inv = inv.clone();
                match old.and_then(|o| o.get(&inv)) {
                    None => {
                        changed.add(inv.clone());
                    }
                    Some(o) => match (inv.stat(), o.stat()) {
                        (None | Some(Stat::Unknown), Some(s)) => inv.set_stat(s),
                        (Some(new), old) if new != Stat::Unknown && Some(new) != old => {
                            changed.add(inv.clone());
                        }
                        _ => {}
                    },
                }
                updated.add(inv);
            }
            *invs = updated;
            if !changed.is_empty() {
                delta.0.insert(loc.clone(), changed);
            }
            prior.0.insert(loc.clone(), invs.clone());
        }
        delta
    }

    /// Keep only invariants satisfied by every trace at their location.
    /// Locations without traces are kept as they are.
    pub fn test(&self, dtraces: &DTraces, settings: &Settings) -> Result<DInvs, RunnerError> {
        let tasks: Vec<(&String, &Invs)> = self.0.iter().filter(|(_, i)| !i.is_empty()).collect();
        let inner = settings.sequential();
        let results = run_mp(
            "test_dinvs",
            tasks,
            |batch: Vec<(&String, &Invs)>| {
                batch
                    .into_iter()
                    .map(|(loc, invs)| {
                        let r = match dtraces.get(loc) {
                            Some(traces) => invs.test(traces, &inner),
                            None => Ok(invs.clone()),
                        };
                        (loc.clone(), r)
                    })
                    .collect::<Vec<_>>()
            },
            settings.do_mp,
        )?;
        let mut out = DInvs::new();
        for (loc, r) in results {
            let invs = r?;
            if !invs.is_empty() {
                out.0.insert(loc, invs);
            }
        }
        debug!("test_dinvs: {} -> {} invs", self.siz(), out.siz());
        Ok(out)
    }

    /// Simplify every location; empty locations are dropped.
    pub fn simplify(
        &self,
        prover: &dyn Prover,
        settings: &Settings,
    ) -> Result<(DInvs, SolverStats), InferError> {
        let tasks: Vec<(&String, &Invs)> = self.0.iter().collect();
        let results = run_mp(
            "simplify",
            tasks,
            |batch: Vec<(&String, &Invs)>| {
                batch
                    .into_iter()
                    .map(|(loc, invs)| {
                        let mut stats = SolverStats::default();
                        let r = invs
                            .cinvs(settings)
                            .simplify(loc, prover, settings, &mut stats);
                        (loc.clone(), r, stats)
                    })
                    .collect::<Vec<_>>()
            },
            settings.do_mp,
        )?;
        let mut out = DInvs::new();
        let mut stats = SolverStats::default();
        for (loc, r, s) in results {
            stats += &s;
            let invs = r?;
            if !invs.is_empty() {
                out.0.insert(loc, invs);
            }
        }
        debug!("simplify: {} -> {} invs", self.siz(), out.siz());
        Ok((out, stats))
    }
}

/// What an engine produced: invariants, the traces it generated along the
/// way, and its solver usage.
#[derive(Clone, Debug, Default)]
pub struct Found {
    pub dinvs: DInvs,
    pub dtraces: DTraces,
    pub stats: SolverStats,
    /// Seconds spent running the program for traces.
    pub traces_secs: f64,
}

/// Errors of the inference layer.
#[derive(Debug, thiserror::Error)]
pub enum InferError {
    #[error(transparent)]
    Inv(#[from] InvError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Oracle(#[from] crate::solver::OracleError),
    #[error(transparent)]
    Exec(#[from] crate::data::ExecError),
    #[error(transparent)]
    Trace(#[from] crate::data::TraceError),
}

impl fmt::Display for DInvs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (loc, invs)) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{} ({} invs):", loc, invs.len())?;
            for (j, inv) in sorted_for_display(invs).iter().enumerate() {
                write!(f, "{}. {}", j + 1, inv)?;
                if j + 1 < invs.len() {
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

/// Kind first, then rendered length, then text.
pub fn sorted_for_display(invs: &Invs) -> Vec<&Inv> {
    let mut v: Vec<(&Inv, String)> = invs.iter().map(|i| (i, i.to_string())).collect();
    v.sort_by(|(a, sa), (b, sb)| {
        a.kind()
            .cmp(&b.kind())
            .then(sa.len().cmp(&sb.len()))
            .then(sa.cmp(sb))
    });
    v.into_iter().map(|(i, _)| i).collect()
}
