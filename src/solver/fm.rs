use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use tracing::trace;

use super::*;
use crate::config::Settings;
use crate::poly::{in_span, monomials_upto, Monomial};

/// Name of the auxiliary variable carrying the objective value.
const OBJ: &str = "__obj";

/// Cap on the premise products tried by the ideal-membership check.
const MAX_PRODUCTS: usize = 1000;

/// Supremum of an objective under a condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sup {
    /// The condition has no solution.
    Infeasible,
    Bounded(BigRational),
    Unbounded,
    /// Budget exhausted.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
    /// A verified integer model.
    Sat(Model),
    Unsat,
    Unknown,
}

/// Fourier–Motzkin decision procedure over the integers.
///
/// Unsatisfiability is exact for the rational relaxation strengthened by
/// integer tightening (`p < 0` becomes `p + 1 <= 0`, coefficients are
/// divided by their gcd and the constant rounded). Satisfiability is only
/// reported with an integer model that was checked against the formula, so
/// both answers are sound; everything in between is `Unknown`.
#[derive(Clone, Debug)]
pub struct FmSolver {
    pub timeout: Duration,
    pub max_constraints: usize,
    pub max_disjuncts: usize,
}

impl Default for FmSolver {
    fn default() -> Self {
        FmSolver {
            timeout: Duration::from_millis(1000),
            max_constraints: 4000,
            max_disjuncts: 64,
        }
    }
}

struct Budget {
    deadline: Instant,
    max_constraints: usize,
}

impl Budget {
    fn check(&self) -> Result<(), Stop> {
        if Instant::now() > self.deadline {
            return Err(Stop::Budget);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Stop {
    Infeasible,
    Budget,
}

enum Tight {
    True,
    False,
    Le(Poly),
    Eq(Poly),
}

/// Normalize `p rel 0` for integer-valued atoms.
fn tighten(p: Poly, rel: Rel) -> Tight {
    let p = p.integral();
    let (rest, c) = p.split_constant();
    let c = c.to_integer();
    if rest.is_zero() {
        let holds = match rel {
            Rel::Le => !c.is_positive(),
            Rel::Lt => c.is_negative(),
            Rel::Eq => c.is_zero(),
        };
        return if holds { Tight::True } else { Tight::False };
    }
    let g = rest
        .terms()
        .fold(BigInt::zero(), |acc, (_, a)| acc.gcd(&a.to_integer()));
    let rest = rest.scale(&BigRational::new(BigInt::one(), g.clone()));
    match rel {
        Rel::Eq => {
            if !c.is_multiple_of(&g) {
                return Tight::False;
            }
            Tight::Eq(rest + Poly::constant(BigRational::from_integer(c / &g)))
        }
        Rel::Le | Rel::Lt => {
            let c = if rel == Rel::Lt { c + 1 } else { c };
            let k = (-c).div_floor(&g);
            Tight::Le(rest - Poly::constant(BigRational::from_integer(k)))
        }
    }
}

#[derive(Default)]
struct System {
    eqs: Vec<Poly>,
    ieqs: IndexSet<Poly>,
}

impl System {
    fn add(&mut self, p: Poly, rel: Rel) -> Result<(), Stop> {
        match tighten(p, rel) {
            Tight::True => Ok(()),
            Tight::False => Err(Stop::Infeasible),
            Tight::Le(q) => {
                self.ieqs.insert(q);
                Ok(())
            }
            Tight::Eq(q) => {
                self.eqs.push(q);
                Ok(())
            }
        }
    }

    /// Add the atoms of a conjunction. Congruences are dropped, which only
    /// enlarges the solution set.
    fn from_literals(lits: &[Literal]) -> Result<System, Stop> {
        let mut sys = System::default();
        for lit in lits {
            if let Literal::Atom { lhs, rel } = lit {
                sys.add(lhs.clone(), *rel)?;
            }
        }
        Ok(sys)
    }
}

enum Step {
    /// `atom = by`
    Subst { atom: Monomial, by: Poly },
    /// Constraints `a*atom + rest <= 0` that bounded `atom` when it was
    /// projected out.
    Project { atom: Monomial, bounds: Vec<Poly> },
}

struct Elim {
    steps: Vec<Step>,
    /// Remaining constraints, over `keep` only.
    residual: Vec<Poly>,
}

/// Eliminate every atom except `keep`: equalities by substitution, then
/// inequalities by Fourier–Motzkin, cheapest atom first.
fn eliminate(mut sys: System, keep: Option<&Monomial>, budget: &Budget) -> Result<Elim, Stop> {
    let mut steps = Vec::new();

    while let Some(e) = sys.eqs.pop() {
        budget.check()?;
        let pivot = e
            .terms()
            .filter(|(m, _)| !m.is_one() && Some(*m) != keep)
            .min_by(|a, b| a.1.abs().cmp(&b.1.abs()))
            .map(|(m, a)| (m.clone(), a.clone()));
        let Some((atom, a)) = pivot else {
            sys.add(e.clone(), Rel::Le)?;
            sys.add(-e, Rel::Le)?;
            continue;
        };
        let by = (e - Poly::monomial(atom.clone(), a.clone())).scale(&(-a.recip()));
        let eqs = std::mem::take(&mut sys.eqs);
        let ieqs = std::mem::take(&mut sys.ieqs);
        for q in eqs {
            sys.add(q.substitute(&atom, &by), Rel::Eq)?;
        }
        for q in ieqs {
            sys.add(q.substitute(&atom, &by), Rel::Le)?;
        }
        steps.push(Step::Subst { atom, by });
    }

    loop {
        budget.check()?;
        let atoms: BTreeSet<Monomial> = sys
            .ieqs
            .iter()
            .flat_map(|p| p.terms().map(|(m, _)| m.clone()))
            .filter(|m| !m.is_one() && Some(m) != keep)
            .collect();
        let cost = |m: &Monomial| {
            let pos = sys.ieqs.iter().filter(|p| p.coef(m).is_positive()).count();
            let neg = sys.ieqs.iter().filter(|p| p.coef(m).is_negative()).count();
            pos * neg
        };
        let Some(atom) = atoms.iter().min_by_key(|m| cost(m)).cloned() else {
            break;
        };

        let mut pos = Vec::new();
        let mut neg = Vec::new();
        let mut next = System::default();
        for p in sys.ieqs {
            let a = p.coef(&atom);
            if a.is_positive() {
                pos.push(p);
            } else if a.is_negative() {
                neg.push(p);
            } else {
                next.ieqs.insert(p);
            }
        }
        for p in &pos {
            let a = p.coef(&atom);
            for n in &neg {
                let b = n.coef(&atom);
                next.add(p.scale(&-b.clone()) + n.scale(&a), Rel::Le)?;
            }
            if next.ieqs.len() > budget.max_constraints {
                trace!("fm: {} constraints, giving up", next.ieqs.len());
                return Err(Stop::Budget);
            }
        }
        let mut bounds = pos;
        bounds.extend(neg);
        steps.push(Step::Project { atom, bounds });
        sys = next;
    }

    Ok(Elim {
        steps,
        residual: sys.ieqs.into_iter().collect(),
    })
}

/// Value of `p` with monomials read from `assign` (absent atoms are 0).
fn eval_atoms(p: &Poly, assign: &BTreeMap<Monomial, BigInt>) -> BigRational {
    let mut acc = BigRational::zero();
    for (m, c) in p.terms() {
        if m.is_one() {
            acc += c;
        } else if let Some(v) = assign.get(m) {
            acc += c * BigRational::from_integer(v.clone());
        }
    }
    acc
}

fn closest_to_zero(lo: Option<BigInt>, hi: Option<BigInt>) -> Option<BigInt> {
    let zero = BigInt::zero();
    match (lo, hi) {
        (None, None) => Some(zero),
        (Some(l), None) => Some(l.max(zero)),
        (None, Some(h)) => Some(h.min(zero)),
        (Some(l), Some(h)) if l > h => None,
        (Some(l), Some(h)) => Some(zero.max(l).min(h)),
    }
}

/// Integer values for the eliminated atoms, last eliminated first.
fn back_substitute(steps: &[Step]) -> Option<BTreeMap<Monomial, BigInt>> {
    let mut assign: BTreeMap<Monomial, BigInt> = BTreeMap::new();
    for step in steps.iter().rev() {
        match step {
            Step::Project { atom, bounds } => {
                let mut lo: Option<BigInt> = None;
                let mut hi: Option<BigInt> = None;
                for b in bounds {
                    let a = b.coef(atom);
                    let rest = eval_atoms(&b.substitute(atom, &Poly::zero()), &assign);
                    let lim = -rest / &a;
                    if a.is_positive() {
                        let h = lim.floor().to_integer();
                        hi = Some(match hi {
                            Some(x) => x.min(h),
                            None => h,
                        });
                    } else {
                        let l = lim.ceil().to_integer();
                        lo = Some(match lo {
                            Some(x) => x.max(l),
                            None => l,
                        });
                    }
                }
                assign.insert(atom.clone(), closest_to_zero(lo, hi)?);
            }
            Step::Subst { atom, by } => {
                let v = eval_atoms(by, &assign);
                if !v.is_integer() {
                    return None;
                }
                assign.insert(atom.clone(), v.to_integer());
            }
        }
    }
    Some(assign)
}

impl FmSolver {
    pub fn new(settings: &Settings) -> Self {
        FmSolver {
            timeout: Duration::from_millis(settings.solver_timeout_ms),
            max_constraints: settings.solver_max_constraints,
            max_disjuncts: settings.solver_max_disjuncts,
        }
    }

    fn budget(&self) -> Budget {
        Budget {
            deadline: Instant::now() + self.timeout,
            max_constraints: self.max_constraints,
        }
    }

    /// Satisfiability of `f` over the integers.
    pub fn check_sat(&self, f: &Formula) -> SatResult {
        let budget = self.budget();
        let Some(conjs) = f.dnf(self.max_disjuncts) else {
            return SatResult::Unknown;
        };
        let vars = f.vars();
        let mut unknown = false;
        for conj in &conjs {
            let elim = System::from_literals(conj).and_then(|sys| eliminate(sys, None, &budget));
            match elim {
                Err(Stop::Infeasible) => continue,
                Err(Stop::Budget) => return SatResult::Unknown,
                Ok(elim) => {
                    let model = back_substitute(&elim.steps).and_then(|assign| {
                        vars.iter()
                            .map(|v| {
                                let value = assign
                                    .get(&Monomial::var(v))
                                    .cloned()
                                    .unwrap_or_else(BigInt::zero);
                                i64::try_from(value).ok().map(|x| (v.clone(), x))
                            })
                            .collect::<Option<Model>>()
                    });
                    match model {
                        Some(m) if f.eval(&|n: &str| m.get(n).copied()) == Some(true) => {
                            return SatResult::Sat(m);
                        }
                        _ => unknown = true,
                    }
                }
            }
        }
        if unknown {
            SatResult::Unknown
        } else {
            SatResult::Unsat
        }
    }

    /// Supremum of `obj` under `cond`.
    pub fn sup(&self, cond: &Formula, obj: &Objective) -> Sup {
        match obj {
            Objective::Linear(t) => self.sup_min(cond, std::slice::from_ref(t)),
            Objective::Min(ts) => self.sup_min(cond, ts),
            Objective::Max(ts) => {
                let mut best: Option<BigRational> = None;
                for t in ts {
                    match self.sup_min(cond, std::slice::from_ref(t)) {
                        Sup::Infeasible => {}
                        Sup::Bounded(v) => {
                            best = Some(match best {
                                Some(b) => b.max(v),
                                None => v,
                            });
                        }
                        other => return other,
                    }
                }
                best.map_or(Sup::Infeasible, Sup::Bounded)
            }
        }
    }

    /// Supremum of `min(ts)`: maximize `z` subject to `z <= t` for each `t`.
    fn sup_min(&self, cond: &Formula, ts: &[Poly]) -> Sup {
        let budget = self.budget();
        let z = Monomial::var(OBJ);
        let Some(conjs) = cond.dnf(self.max_disjuncts) else {
            return Sup::Unknown;
        };
        let mut best: Option<BigRational> = None;
        for conj in &conjs {
            let sys = System::from_literals(conj).and_then(|mut sys| {
                for t in ts {
                    sys.add(Poly::var(OBJ) - t.clone(), Rel::Le)?;
                }
                Ok(sys)
            });
            let elim = sys.and_then(|sys| eliminate(sys, Some(&z), &budget));
            let residual = match elim {
                Err(Stop::Infeasible) => continue,
                Err(Stop::Budget) => return Sup::Unknown,
                Ok(e) => e.residual,
            };
            let upper = residual
                .iter()
                .filter(|p| p.coef(&z).is_positive())
                .map(|p| -p.constant_term() / p.coef(&z))
                .min();
            let Some(upper) = upper else {
                return Sup::Unbounded;
            };
            best = Some(match best {
                Some(b) => b.max(upper),
                None => upper,
            });
        }
        best.map_or(Sup::Infeasible, Sup::Bounded)
    }

    /// `goal == 0` follows when `goal` is a combination of `m * p` over the
    /// premise equalities `p == 0` and monomials `m` in the goal's variables.
    /// Elimination alone sees every nonlinear monomial as a fresh variable.
    fn imply_by_products(&self, premises: &[Formula], goal: &Poly) -> bool {
        let mut eqs = Vec::new();
        collect_equalities(premises, &mut eqs);
        let deg = goal.degree();
        let vars = goal.vars();
        let names: Vec<String> = vars.iter().cloned().collect();
        let mut gens = Vec::new();
        for p in eqs {
            if p.degree() > deg || !p.vars().is_subset(&vars) {
                continue;
            }
            for m in monomials_upto(&names, deg - p.degree()) {
                if gens.len() >= MAX_PRODUCTS {
                    trace!("ideal check: product cap reached");
                    return false;
                }
                gens.push(Poly::monomial(m, BigRational::one()) * p.clone());
            }
        }
        !gens.is_empty() && in_span(goal, &gens)
    }

    /// `premises => term % modulus == residue`.
    fn imply_congruence(&self, premises: &[Formula], term: &Poly, modulus: i64, residue: i64) -> Implication {
        let m = BigInt::from(modulus);
        for p in premises {
            if let Formula::Lit(Literal::Congruent {
                term: t2,
                modulus: m2,
                residue: r2,
                holds: true,
            }) = p
            {
                if m2 % modulus != 0 {
                    continue;
                }
                let diff = term.clone() - t2.clone();
                let c = diff.constant_term();
                if diff.is_constant() && c.is_integer() {
                    let r = (BigInt::from(*r2) + c.to_integer()).mod_floor(&m);
                    if r == BigInt::from(residue) {
                        return Implication::Holds;
                    }
                }
            }
        }

        let linear: Vec<Formula> = premises
            .iter()
            .filter(|p| !matches!(p, Formula::Lit(Literal::Congruent { .. })))
            .cloned()
            .collect();
        let cond = Formula::and(linear);
        let hi = self.sup(&cond, &Objective::Linear(term.clone()));
        let lo = self.sup(&cond, &Objective::Linear(-term.clone()));
        match (hi, lo) {
            (Sup::Infeasible, _) | (_, Sup::Infeasible) => Implication::Holds,
            (Sup::Bounded(h), Sup::Bounded(l)) if h == -&l && h.is_integer() => {
                if h.to_integer().mod_floor(&m) == BigInt::from(residue) {
                    Implication::Holds
                } else {
                    Implication::Unknown
                }
            }
            _ => Implication::Unknown,
        }
    }
}

impl Prover for FmSolver {
    fn imply(&self, premises: &[Formula], goal: &Formula) -> Implication {
        match goal {
            Formula::True => return Implication::Holds,
            Formula::Lit(Literal::Congruent {
                term,
                modulus,
                residue,
                holds: true,
            }) => return self.imply_congruence(premises, term, *modulus, *residue),
            Formula::Lit(Literal::Atom { lhs, rel: Rel::Eq })
                if self.imply_by_products(premises, lhs) =>
            {
                return Implication::Holds
            }
            _ => {}
        }
        let mut parts = premises.to_vec();
        parts.push(goal.negate());
        match self.check_sat(&Formula::and(parts)) {
            SatResult::Unsat => Implication::Holds,
            SatResult::Sat(_) => Implication::Fails,
            SatResult::Unknown => Implication::Unknown,
        }
    }
}

fn collect_equalities(fs: &[Formula], out: &mut Vec<Poly>) {
    for f in fs {
        match f {
            Formula::Lit(Literal::Atom { lhs, rel: Rel::Eq }) => out.push(lhs.clone()),
            Formula::And(parts) => collect_equalities(parts, out),
            _ => {}
        }
    }
}
