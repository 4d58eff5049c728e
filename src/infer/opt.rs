//! Upper bounds of octagonal and min/max terms.
//!
//! Every term `t` first becomes the candidate `t <= U`; candidates the
//! oracle refutes are dropped, and the rest are maximized to their least
//! proven bound. Without an oracle the bound is the largest observed value.

use indexmap::IndexMap;
use tracing::debug;

use super::*;
use crate::data::Symbs;
use crate::poly::{monomials_upto, Monomial};
use crate::solver::Oracle;

/// A term whose upper bound is sought.
pub trait BoundTerm: Clone + fmt::Display + Send + Sync {
    fn objective(&self) -> Objective;

    fn term_vars(&self) -> Vec<String>;

    /// `self <= bound` as an invariant.
    fn mk_le(&self, bound: i64) -> Result<Inv, InvError>;
}

impl BoundTerm for Poly {
    fn objective(&self) -> Objective {
        Objective::Linear(self.clone())
    }

    fn term_vars(&self) -> Vec<String> {
        self.vars().into_iter().collect()
    }

    fn mk_le(&self, bound: i64) -> Result<Inv, InvError> {
        Inv::oct(self.clone(), bound)
    }
}

impl BoundTerm for MinMaxTerm {
    fn objective(&self) -> Objective {
        MinMaxTerm::objective(self)
    }

    fn term_vars(&self) -> Vec<String> {
        self.vars().map(str::to_string).collect()
    }

    fn mk_le(&self, bound: i64) -> Result<Inv, InvError> {
        Inv::mmp_bound(self.clone(), bound)
    }
}

// ─── Term generation ───────────────────────────────────────────────

/// Octagonal terms: sums of 1..=`iterms` distinct monomials of degree
/// 1..=`ideg`, each with a non-zero coefficient in `[-icoefs, icoefs]`.
pub fn oct_terms(vars: &Symbs, ideg: u32, iterms: usize, icoefs: i64) -> Vec<Poly> {
    let monos: Vec<Monomial> = monomials_upto(vars.names(), ideg)
        .into_iter()
        .filter(|m| !m.is_one())
        .collect();
    let coefs: Vec<i64> = (-icoefs..=icoefs).filter(|c| *c != 0).collect();
    let mut out: IndexSet<Poly> = IndexSet::new();
    for size in 1..=iterms.min(monos.len()) {
        for combo in combinations(&monos, size) {
            for cs in products(&coefs, size) {
                let p = Poly::from_terms(combo.iter().cloned().zip(cs.into_iter().map(rat)));
                out.insert(p);
            }
        }
    }
    out.into_iter().collect()
}

/// `a - op(b, c)` and `op(b, c) - a` for every variable `a`, every pair of
/// the other variables and both operators.
pub fn minmax_terms(vars: &Symbs) -> Vec<MinMaxTerm> {
    let names = vars.names();
    let mut out = Vec::new();
    for a in names {
        let others: Vec<String> = names.iter().filter(|v| *v != a).cloned().collect();
        for pair in combinations(&others, 2) {
            for op in [MinMaxOp::Max, MinMaxOp::Min] {
                for lhs_first in [true, false] {
                    out.push(MinMaxTerm {
                        op,
                        lhs: a.clone(),
                        args: pair.clone(),
                        lhs_first,
                    });
                }
            }
        }
    }
    out
}

fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        for mut rest in combinations(&items[i + 1..], k - 1) {
            rest.insert(0, item.clone());
            out.push(rest);
        }
    }
    out
}

fn products(values: &[i64], k: usize) -> Vec<Vec<i64>> {
    let mut out = vec![Vec::new()];
    for _ in 0..k {
        out = out
            .into_iter()
            .flat_map(|prefix: Vec<i64>| {
                values.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(*v);
                    next
                })
            })
            .collect();
    }
    out
}

/// Drop terms over two or more program inputs and nothing else (inputs are
/// unconstrained), and, given sample traces, terms already observed above
/// `upper`.
pub fn filter_terms<T: BoundTerm>(
    terms: Vec<T>,
    inps: &Symbs,
    traces: Option<&Traces>,
    upper: i64,
) -> Vec<T> {
    let n = terms.len();
    let kept: Vec<T> = terms
        .into_iter()
        .filter(|t| {
            let vars = t.term_vars();
            !(vars.len() >= 2 && vars.iter().all(|v| inps.contains(v)))
        })
        .filter(|t| {
            traces.map_or(true, |ts| {
                let obj = t.objective();
                ts.iter()
                    .filter_map(|tr| obj.eval(&|name: &str| tr.get(name)))
                    .all(|v| v <= rat(upper))
            })
        })
        .collect();
    debug!("filter terms: {} -> {}", n, kept.len());
    kept
}

/// Largest observed value of each term, kept if within `[-upper, upper]`.
/// Results have status unknown.
pub fn gen_from_traces<T: BoundTerm>(terms: &[T], traces: &Traces, upper: i64) -> Invs {
    let mut out = Invs::new();
    for term in terms {
        let obj = term.objective();
        let max = traces
            .iter()
            .filter_map(|tr| obj.eval(&|name: &str| tr.get(name)))
            .max();
        let Some(v) = max.and_then(|v| i64::try_from(v.floor().to_integer()).ok()) else {
            continue;
        };
        if !(-upper..=upper).contains(&v) {
            continue;
        }
        if let Ok(inv) = term.mk_le(v) {
            out.add(inv.with_stat(Stat::Unknown));
        }
    }
    out
}

// ─── Oracle-backed inference ───────────────────────────────────────

/// Proven upper bounds at every oracle location.
pub struct OptInfer<'a> {
    oracle: &'a dyn Oracle,
    settings: &'a Settings,
}

impl<'a> OptInfer<'a> {
    pub fn new(oracle: &'a dyn Oracle, settings: &'a Settings) -> Self {
        OptInfer { oracle, settings }
    }

    /// Octagonal bounds within `[-iupper, iupper]`.
    pub fn gen_octs(&self) -> Result<Found, InferError> {
        let s = self.settings;
        self.gen(
            "octs",
            |vars| oct_terms(vars, s.ideg, s.iterms, s.icoefs),
            s.iupper,
        )
    }

    /// Min/max bounds within `[-iupper_mmp, iupper_mmp]`.
    pub fn gen_minmax(&self) -> Result<Found, InferError> {
        self.gen("minmax", minmax_terms, self.settings.iupper_mmp)
    }

    fn gen<T, F>(&self, name: &str, terms_of: F, upper: i64) -> Result<Found, InferError>
    where
        T: BoundTerm,
        F: Fn(&Symbs) -> Vec<T>,
    {
        let mut found = Found::default();
        let mut refs: BTreeMap<String, IndexMap<Inv, T>> = BTreeMap::new();
        let mut candidates = DInvs::new();
        for loc in self.oracle.locs() {
            let Some(vars) = self.oracle.vars(&loc) else {
                continue;
            };
            let mut terms = terms_of(vars);
            if self.settings.do_filter {
                terms = filter_terms(terms, self.oracle.inp_decls(), None, upper);
            }
            let loc_refs = refs.entry(loc.clone()).or_default();
            for term in terms {
                let inv = term.mk_le(upper)?;
                candidates.add(&loc, inv.clone());
                loc_refs.insert(inv, term);
            }
        }
        if candidates.is_empty() {
            return Ok(found);
        }
        debug!(
            "{}: checking upper bounds of {} terms at {} locs",
            name,
            candidates.siz(),
            refs.len()
        );

        let out = self.oracle.check(&candidates, None)?;
        found.stats += &out.stats;
        let survivors = out.dinvs.remove_disproved();
        let tasks: Vec<(String, T)> = survivors
            .iter()
            .flat_map(|(loc, invs)| {
                let loc_refs = refs.get(loc);
                invs.iter().filter_map(move |inv| {
                    loc_refs
                        .and_then(|r| r.get(inv))
                        .map(|t| (loc.clone(), t.clone()))
                })
            })
            .collect();
        debug!("{}: maximizing {} terms", name, tasks.len());

        let oracle = self.oracle;
        let results = run_mp(
            "optimizing upperbound",
            tasks,
            |batch: Vec<(String, T)>| {
                batch
                    .into_iter()
                    .map(|(loc, term)| {
                        let r = oracle.maximize(&loc, &term.objective(), upper);
                        (loc, term, r)
                    })
                    .collect::<Vec<_>>()
            },
            self.settings.do_mp,
        )?;

        for (loc, term, r) in results {
            let (bound, stats) = r?;
            found.stats += &stats;
            let Some(v) = bound else {
                continue;
            };
            let inv = term.mk_le(v)?.with_stat(Stat::Proved);
            found.dinvs.add(&loc, inv);
        }
        Ok(found)
    }
}
