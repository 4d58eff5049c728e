//! Oracle interface and the built-in decision procedure.
//!
//! Candidates travel to the oracle as [`Formula`]s: boolean combinations
//! of polynomial atoms `p <= 0`, `p < 0`, `p == 0` and congruences. The
//! [`FmSolver`] decides implications and maximizes objectives over such
//! formulas by Fourier–Motzkin elimination, treating every non-constant
//! monomial as an integer variable. [`SymStates`] turns per-location path
//! conditions into an [`Oracle`] for the inference engines.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::path::PathBuf;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::data::{Inps, Model, Symbs};
use crate::infer::DInvs;
use crate::poly::{CmpOp, Constraint, ParseError, Poly};

mod fm;
mod symstates;

pub use fm::*;
pub use symstates::*;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("cannot access symbolic states '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed symbolic states '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("location '{loc}': {source}")]
    Constraint {
        loc: String,
        #[source]
        source: ParseError,
    },
    #[error("no symbolic state for location '{0}'")]
    UnknownLoc(String),
    #[error("symbolic execution failed: {0}")]
    Backend(String),
}

// ─── Formulas ──────────────────────────────────────────────────────

/// Relation of an atom against zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rel {
    Le,
    Lt,
    Eq,
}

/// A literal of a conjunction in disjunctive normal form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    /// `lhs rel 0`
    Atom { lhs: Poly, rel: Rel },
    /// `term % modulus == residue`, or its negation.
    Congruent {
        term: Poly,
        modulus: i64,
        residue: i64,
        holds: bool,
    },
}

/// Boolean combination of polynomial constraints.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Formula {
    True,
    False,
    Lit(Literal),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn atom(lhs: Poly, rel: Rel) -> Formula {
        Formula::Lit(Literal::Atom { lhs, rel })
    }

    pub fn le(lhs: Poly, rhs: Poly) -> Formula {
        Formula::atom(lhs - rhs, Rel::Le)
    }

    pub fn eq(lhs: Poly, rhs: Poly) -> Formula {
        Formula::atom(lhs - rhs, Rel::Eq)
    }

    pub fn congruent(term: Poly, modulus: i64, residue: i64) -> Formula {
        Formula::Lit(Literal::Congruent {
            term,
            modulus,
            residue,
            holds: true,
        })
    }

    /// Conjunction, flattened, with `True` dropped and `False` absorbing.
    pub fn and(parts: Vec<Formula>) -> Formula {
        let mut out = Vec::new();
        for p in parts {
            match p {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::True,
            1 => out.pop().unwrap_or(Formula::True),
            _ => Formula::And(out),
        }
    }

    /// Disjunction, flattened, with `False` dropped and `True` absorbing.
    pub fn or(parts: Vec<Formula>) -> Formula {
        let mut out = Vec::new();
        for p in parts {
            match p {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::False,
            1 => out.pop().unwrap_or(Formula::False),
            _ => Formula::Or(out),
        }
    }

    /// From a parsed constraint text.
    pub fn from_constraint(c: Constraint) -> Formula {
        match c {
            Constraint::Bool(true) => Formula::True,
            Constraint::Bool(false) => Formula::False,
            Constraint::Cmp(l, op, r) => match op {
                CmpOp::Le => Formula::atom(l - r, Rel::Le),
                CmpOp::Lt => Formula::atom(l - r, Rel::Lt),
                CmpOp::Ge => Formula::atom(r - l, Rel::Le),
                CmpOp::Gt => Formula::atom(r - l, Rel::Lt),
                CmpOp::Eq => Formula::atom(l - r, Rel::Eq),
            },
        }
    }

    pub fn negate(&self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Lit(Literal::Atom { lhs, rel }) => match rel {
                Rel::Le => Formula::atom(-lhs.clone(), Rel::Lt),
                Rel::Lt => Formula::atom(-lhs.clone(), Rel::Le),
                Rel::Eq => Formula::or(vec![
                    Formula::atom(lhs.clone(), Rel::Lt),
                    Formula::atom(-lhs.clone(), Rel::Lt),
                ]),
            },
            Formula::Lit(Literal::Congruent {
                term,
                modulus,
                residue,
                holds,
            }) => Formula::Lit(Literal::Congruent {
                term: term.clone(),
                modulus: *modulus,
                residue: *residue,
                holds: !holds,
            }),
            Formula::And(parts) => Formula::or(parts.iter().map(Formula::negate).collect()),
            Formula::Or(parts) => Formula::and(parts.iter().map(Formula::negate).collect()),
        }
    }

    /// Disjunctive normal form, or `None` if it has more than
    /// `max_disjuncts` conjunctions.
    pub fn dnf(&self, max_disjuncts: usize) -> Option<Vec<Vec<Literal>>> {
        match self {
            Formula::True => Some(vec![Vec::new()]),
            Formula::False => Some(Vec::new()),
            Formula::Lit(l) => Some(vec![vec![l.clone()]]),
            Formula::Or(parts) => {
                let mut out = Vec::new();
                for p in parts {
                    out.extend(p.dnf(max_disjuncts)?);
                    if out.len() > max_disjuncts {
                        return None;
                    }
                }
                Some(out)
            }
            Formula::And(parts) => {
                let mut acc: Vec<Vec<Literal>> = vec![Vec::new()];
                for p in parts {
                    let rhs = p.dnf(max_disjuncts)?;
                    if acc.len().saturating_mul(rhs.len()) > max_disjuncts {
                        return None;
                    }
                    let mut next = Vec::with_capacity(acc.len() * rhs.len());
                    for a in &acc {
                        for b in &rhs {
                            let mut conj = a.clone();
                            conj.extend(b.iter().cloned());
                            next.push(conj);
                        }
                    }
                    acc = next;
                }
                Some(acc)
            }
        }
    }

    /// Truth value under an assignment; `None` if a variable is unassigned.
    pub fn eval<F>(&self, lookup: &F) -> Option<bool>
    where
        F: Fn(&str) -> Option<i64>,
    {
        match self {
            Formula::True => Some(true),
            Formula::False => Some(false),
            Formula::Lit(l) => l.eval(lookup),
            Formula::And(parts) => {
                let mut all = true;
                for p in parts {
                    all &= p.eval(lookup)?;
                }
                Some(all)
            }
            Formula::Or(parts) => {
                let mut any = false;
                for p in parts {
                    any |= p.eval(lookup)?;
                }
                Some(any)
            }
        }
    }

    pub fn vars(&self) -> std::collections::BTreeSet<String> {
        let mut out = std::collections::BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut std::collections::BTreeSet<String>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Lit(Literal::Atom { lhs, .. }) => out.extend(lhs.vars()),
            Formula::Lit(Literal::Congruent { term, .. }) => out.extend(term.vars()),
            Formula::And(parts) | Formula::Or(parts) => {
                for p in parts {
                    p.collect_vars(out);
                }
            }
        }
    }
}

impl Literal {
    pub fn eval<F>(&self, lookup: &F) -> Option<bool>
    where
        F: Fn(&str) -> Option<i64>,
    {
        match self {
            Literal::Atom { lhs, rel } => {
                let v = lhs.eval(lookup)?;
                Some(match rel {
                    Rel::Le => !v.is_positive(),
                    Rel::Lt => v.is_negative(),
                    Rel::Eq => v.is_zero(),
                })
            }
            Literal::Congruent {
                term,
                modulus,
                residue,
                holds,
            } => {
                let v = term.eval(lookup)?;
                if !v.is_integer() {
                    return Some(!holds);
                }
                let r = v.to_integer().mod_floor(&BigInt::from(*modulus));
                Some((r == BigInt::from(*residue)) == *holds)
            }
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Atom { lhs, rel } => {
                let op = match rel {
                    Rel::Le => "<=",
                    Rel::Lt => "<",
                    Rel::Eq => "==",
                };
                write!(f, "{} {} 0", lhs, op)
            }
            Literal::Congruent {
                term,
                modulus,
                residue,
                holds,
            } => {
                let op = if *holds { "==" } else { "!=" };
                write!(f, "{} % {} {} {}", term, modulus, op, residue)
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[Formula], sep: &str| {
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "({})", p)?;
            }
            Ok(())
        };
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Lit(l) => write!(f, "{}", l),
            Formula::And(parts) => join(f, parts, "&&"),
            Formula::Or(parts) => join(f, parts, "||"),
        }
    }
}

// ─── Objectives ────────────────────────────────────────────────────

/// Quantity to maximize. Terms must be integer-valued on integer inputs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Objective {
    Linear(Poly),
    Max(Vec<Poly>),
    Min(Vec<Poly>),
}

impl Objective {
    /// `self <= k` as a formula.
    pub fn le(&self, k: i64) -> Formula {
        let bound = |t: &Poly| Formula::atom(t.clone() - Poly::from_int(k), Rel::Le);
        match self {
            Objective::Linear(t) => bound(t),
            Objective::Max(ts) => Formula::and(ts.iter().map(bound).collect()),
            Objective::Min(ts) => Formula::or(ts.iter().map(bound).collect()),
        }
    }

    pub fn eval<F>(&self, lookup: &F) -> Option<BigRational>
    where
        F: Fn(&str) -> Option<i64>,
    {
        match self {
            Objective::Linear(t) => t.eval(lookup),
            Objective::Max(ts) => ts
                .iter()
                .map(|t| t.eval(lookup))
                .collect::<Option<Vec<_>>>()?
                .into_iter()
                .max(),
            Objective::Min(ts) => ts
                .iter()
                .map(|t| t.eval(lookup))
                .collect::<Option<Vec<_>>>()?
                .into_iter()
                .min(),
        }
    }
}

// ─── Provers and oracles ───────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Implication {
    Holds,
    Fails,
    Unknown,
}

/// Decides `premises => goal`.
pub trait Prover: Sync {
    fn imply(&self, premises: &[Formula], goal: &Formula) -> Implication;
}

/// Solver usage counters. Workers return their own counters by value and
/// the controller adds them up.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverStats {
    pub checks: usize,
    pub proved: usize,
    pub disproved: usize,
    pub unknown: usize,
    pub maximize_calls: usize,
    pub implications: usize,
}

impl AddAssign<&SolverStats> for SolverStats {
    fn add_assign(&mut self, rhs: &SolverStats) {
        self.checks += rhs.checks;
        self.proved += rhs.proved;
        self.disproved += rhs.disproved;
        self.unknown += rhs.unknown;
        self.maximize_calls += rhs.maximize_calls;
        self.implications += rhs.implications;
    }
}

impl fmt::Display for SolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checks {} (proved {}, disproved {}, unknown {}), maximize {}, implications {}",
            self.checks, self.proved, self.disproved, self.unknown, self.maximize_calls, self.implications
        )
    }
}

/// Result of checking candidate invariants.
#[derive(Clone, Debug, Default)]
pub struct CheckOutcome {
    /// Counterexample models for disproved candidates, per location.
    pub cexs: BTreeMap<String, Vec<Model>>,
    /// The candidates with their status set.
    pub dinvs: DInvs,
    pub stats: SolverStats,
}

/// Proves, refutes and maximizes against reachable program states.
pub trait Oracle: Sync {
    /// Locations with a known symbolic state.
    fn locs(&self) -> Vec<String>;

    /// Variables in scope at a location.
    fn vars(&self, loc: &str) -> Option<&Symbs>;

    fn inp_decls(&self) -> &Symbs;

    /// Set the status of every candidate. Counterexamples avoid the inputs
    /// in `inps` when possible.
    fn check(&self, dinvs: &DInvs, inps: Option<&Inps>) -> Result<CheckOutcome, OracleError>;

    /// Least proven integer upper bound of `obj` at `loc`, if one exists
    /// within `[-upper, upper]`.
    fn maximize(
        &self,
        loc: &str,
        obj: &Objective,
        upper: i64,
    ) -> Result<(Option<i64>, SolverStats), OracleError>;
}

/// Symbolic-execution backend producing per-location path conditions.
pub trait SymExecutor: Send + Sync {
    fn compute(&self) -> Result<SymStates, OracleError>;
}

fn rat_floor_i64(v: &BigRational) -> Option<i64> {
    i64::try_from(v.floor().to_integer()).ok()
}
