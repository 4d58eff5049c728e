use std::path::Path;

use tracing::debug;

use super::*;
use crate::infer::{Inv, Stat};
use crate::poly::parse_constraint;

/// Path conditions of one location. The location is reachable exactly when
/// one of the conjunctions holds.
#[derive(Clone, Debug, PartialEq)]
pub struct LocState {
    pub vars: Symbs,
    pub pcs: Vec<Vec<Formula>>,
}

impl LocState {
    /// Disjunction of all path conditions.
    pub fn reach(&self) -> Formula {
        Formula::or(
            self.pcs
                .iter()
                .map(|pc| Formula::and(pc.clone()))
                .collect(),
        )
    }
}

/// Symbolic states of a program: per-location path conditions over the
/// inputs and the location's variables.
#[derive(Clone, Debug)]
pub struct SymStates {
    inp_decls: Symbs,
    locs: BTreeMap<String, LocState>,
    solver: FmSolver,
}

#[derive(Serialize, Deserialize)]
struct SymStatesFile {
    inp_decls: Symbs,
    locs: BTreeMap<String, LocStateFile>,
}

#[derive(Serialize, Deserialize)]
struct LocStateFile {
    vars: Symbs,
    pcs: Vec<Vec<String>>,
}

impl SymStates {
    pub fn new(inp_decls: Symbs, solver: FmSolver) -> Self {
        SymStates {
            inp_decls,
            locs: BTreeMap::new(),
            solver,
        }
    }

    pub fn solver(&self) -> &FmSolver {
        &self.solver
    }

    pub fn with_solver(mut self, solver: FmSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn get(&self, loc: &str) -> Option<&LocState> {
        self.locs.get(loc)
    }

    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    /// Add one path to `loc`, given as constraint texts such as `0 <= x`.
    pub fn add_path(&mut self, loc: &str, vars: &Symbs, constraints: &[&str]) -> Result<(), OracleError> {
        let pc = constraints
            .iter()
            .map(|c| {
                parse_constraint(c)
                    .map(Formula::from_constraint)
                    .map_err(|source| OracleError::Constraint {
                        loc: loc.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.locs
            .entry(loc.to_string())
            .or_insert_with(|| LocState {
                vars: vars.clone(),
                pcs: Vec::new(),
            })
            .pcs
            .push(pc);
        Ok(())
    }

    // ─── Persistence ───────────────────────────────────────────────

    pub fn from_json(text: &str, path: &Path, solver: FmSolver) -> Result<SymStates, OracleError> {
        let file: SymStatesFile = serde_json::from_str(text).map_err(|source| OracleError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let mut ss = SymStates::new(file.inp_decls, solver);
        for (loc, st) in file.locs {
            // a location without paths is unreachable
            ss.locs.entry(loc.clone()).or_insert_with(|| LocState {
                vars: st.vars.clone(),
                pcs: Vec::new(),
            });
            for pc in &st.pcs {
                let texts: Vec<&str> = pc.iter().map(String::as_str).collect();
                ss.add_path(&loc, &st.vars, &texts)?;
            }
        }
        Ok(ss)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let file = SymStatesFile {
            inp_decls: self.inp_decls.clone(),
            locs: self
                .locs
                .iter()
                .map(|(loc, st)| {
                    let pcs = st
                        .pcs
                        .iter()
                        .map(|pc| pc.iter().map(|f| f.to_string()).collect())
                        .collect();
                    (
                        loc.clone(),
                        LocStateFile {
                            vars: st.vars.clone(),
                            pcs,
                        },
                    )
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file)
    }

    pub fn vread(path: &Path, solver: FmSolver) -> Result<SymStates, OracleError> {
        let text = std::fs::read_to_string(path).map_err(|source| OracleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        SymStates::from_json(&text, path, solver)
    }

    pub fn vwrite(&self, path: &Path) -> Result<(), OracleError> {
        let text = self.to_json().map_err(|source| OracleError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| OracleError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    // ─── Checking ──────────────────────────────────────────────────

    fn check_inv(
        &self,
        st: &LocState,
        inv: &Inv,
        inps: Option<&Inps>,
        stats: &mut SolverStats,
    ) -> (Stat, Option<Model>) {
        stats.checks += 1;
        let Some(goal) = inv.to_formula() else {
            stats.unknown += 1;
            return (Stat::Unknown, None);
        };
        // elimination alone cannot settle these; `imply` has dedicated checks
        let retry = matches!(
            goal,
            Formula::Lit(Literal::Congruent { .. }) | Formula::Lit(Literal::Atom { rel: Rel::Eq, .. })
        );
        let not_goal = goal.negate();
        let mut unknown = false;
        for pc in &st.pcs {
            let mut parts = pc.clone();
            parts.push(not_goal.clone());
            let cond = Formula::and(parts);
            match self.solver.check_sat(&cond) {
                SatResult::Unsat => {}
                SatResult::Sat(m) => {
                    stats.disproved += 1;
                    return (Stat::Disproved, Some(self.prefer_new(&cond, m, inps)));
                }
                SatResult::Unknown => {
                    stats.implications += usize::from(retry);
                    if !(retry && self.solver.imply(pc, &goal) == Implication::Holds) {
                        unknown = true;
                    }
                }
            }
        }
        if unknown {
            stats.unknown += 1;
            (Stat::Unknown, None)
        } else {
            stats.proved += 1;
            (Stat::Proved, None)
        }
    }

    /// Look for a model whose inputs are not already in `inps` by pushing
    /// one input at a time just past its current value.
    fn prefer_new(&self, cond: &Formula, model: Model, inps: Option<&Inps>) -> Model {
        let Some(inps) = inps else {
            return model;
        };
        let project = |m: &Model| -> Vec<i64> {
            self.inp_decls
                .names()
                .iter()
                .map(|v| m.get(v).copied().unwrap_or(0))
                .collect()
        };
        if !inps.contains(&project(&model)) {
            return model;
        }
        for v in self.inp_decls.names() {
            let x = model.get(v).copied().unwrap_or(0);
            for block in [
                Formula::le(Poly::from_int(x.saturating_add(1)), Poly::var(v)),
                Formula::le(Poly::var(v), Poly::from_int(x.saturating_sub(1))),
            ] {
                let f = Formula::and(vec![cond.clone(), block]);
                if let SatResult::Sat(m) = self.solver.check_sat(&f) {
                    if !inps.contains(&project(&m)) {
                        return m;
                    }
                }
            }
        }
        debug!("no counterexample with fresh inputs");
        model
    }
}

impl Oracle for SymStates {
    fn locs(&self) -> Vec<String> {
        self.locs.keys().cloned().collect()
    }

    fn vars(&self, loc: &str) -> Option<&Symbs> {
        self.locs.get(loc).map(|st| &st.vars)
    }

    fn inp_decls(&self) -> &Symbs {
        &self.inp_decls
    }

    fn check(&self, dinvs: &DInvs, inps: Option<&Inps>) -> Result<CheckOutcome, OracleError> {
        let mut out = CheckOutcome::default();
        for (loc, invs) in dinvs.iter() {
            let st = self
                .locs
                .get(loc)
                .ok_or_else(|| OracleError::UnknownLoc(loc.clone()))?;
            for inv in invs.iter() {
                let (stat, cex) = self.check_inv(st, inv, inps, &mut out.stats);
                out.dinvs.add(loc, inv.with_stat(stat));
                if let Some(m) = cex {
                    out.cexs.entry(loc.clone()).or_default().push(m);
                }
            }
        }
        Ok(out)
    }

    fn maximize(
        &self,
        loc: &str,
        obj: &Objective,
        upper: i64,
    ) -> Result<(Option<i64>, SolverStats), OracleError> {
        let st = self
            .locs
            .get(loc)
            .ok_or_else(|| OracleError::UnknownLoc(loc.to_string()))?;
        let stats = SolverStats {
            maximize_calls: 1,
            ..SolverStats::default()
        };
        let bound = match self.solver.sup(&st.reach(), obj) {
            Sup::Bounded(v) => rat_floor_i64(&v),
            _ => None,
        };
        Ok((bound.filter(|k| (-upper..=upper).contains(k)), stats))
    }
}
