//! Polynomial equalities.
//!
//! A template over all monomials up to some degree is instantiated at
//! traces; the null space of the resulting system spans the equalities the
//! traces satisfy. With an oracle the candidates are checked and every
//! counterexample becomes another row, until no new candidate appears.

use std::time::Instant;

use indexmap::IndexSet;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::*;
use crate::data::{Inps, Prog};
use crate::poly::{init_terms, solve_eqts, Template};
use crate::solver::Oracle;

/// Equalities holding at every trace, found without an oracle.
///
/// Starts from the first `n_eqts_needed` distinct rows and adds the row of
/// any trace that violates a candidate, re-solving until every candidate
/// holds. The degree is lowered whenever there are too few traces or no
/// solution. Results have status unknown.
pub fn gen_from_traces(deg: u32, traces: &Traces, settings: &Settings) -> Invs {
    let vars = traces.vars().names();
    let mut mydeg = deg;
    while mydeg > 0 {
        let tmpl = init_terms(vars, mydeg, settings.eqt_rate);
        let nuks = tmpl.n_unknowns();
        if traces.len() < nuks {
            mydeg -= 1;
            warn!("{} traces < {} uks, reducing to deg {}", traces.len(), nuks, mydeg);
            continue;
        }
        let rows = traces.instantiate(&tmpl, Some(tmpl.n_eqts_needed));
        if rows.len() < nuks {
            mydeg -= 1;
            warn!("{} exprs < {} uks, reducing deg to {}", rows.len(), nuks, mydeg);
            continue;
        }
        let eqts = solve_to_fixpoint(rows, &tmpl, traces, settings.trace_max_val);
        if !eqts.is_empty() {
            return eqts
                .into_iter()
                .filter_map(|p| Inv::eqt(p).ok())
                .map(|inv| inv.with_stat(Stat::Unknown))
                .collect();
        }
        mydeg -= 1;
        debug!("no equalities, reducing deg to {}", mydeg);
    }
    Invs::new()
}

fn solve_to_fixpoint(
    rows: Vec<Vec<BigInt>>,
    tmpl: &Template,
    traces: &Traces,
    trace_max_val: i64,
) -> Vec<Poly> {
    let mut rows: IndexSet<Vec<BigInt>> = rows.into_iter().collect();
    loop {
        let rows_vec: Vec<Vec<BigInt>> = rows.iter().cloned().collect();
        let eqts = solve_eqts(&rows_vec, &tmpl.terms);
        let violated: Vec<Vec<BigInt>> = traces
            .iter()
            .filter(|t| !t.exceeds(trace_max_val))
            .filter(|t| {
                eqts.iter()
                    .any(|p| t.eval(p).map_or(true, |v| !v.is_zero()))
            })
            .filter_map(|t| tmpl.instantiate(&|n: &str| t.get(n)))
            .collect();
        let before = rows.len();
        rows.extend(violated);
        if rows.len() == before {
            return eqts;
        }
    }
}

/// Counterexample-guided equality inference against an oracle.
pub struct EqtInfer<'a> {
    oracle: &'a dyn Oracle,
    prog: &'a Prog,
    settings: &'a Settings,
}

impl<'a> EqtInfer<'a> {
    pub fn new(oracle: &'a dyn Oracle, prog: &'a Prog, settings: &'a Settings) -> Self {
        EqtInfer {
            oracle,
            prog,
            settings,
        }
    }

    /// Equalities of degree at most `deg` at every oracle location.
    ///
    /// Traces are gathered location by location first, since all locations
    /// share one pool of inputs; the refinement loops then run in parallel.
    pub fn gen(&self, deg: u32, rng: &mut StdRng) -> Result<Found, InferError> {
        assert!(deg >= 1, "degree must be at least 1");
        let mut found = Found::default();
        let mut inps = Inps::new();

        let mut tasks = Vec::new();
        for loc in self.oracle.locs() {
            match self.init_traces(&loc, deg, &mut found, &mut inps, rng)? {
                Some((tmpl, rows)) => tasks.push((loc, tmpl, rows)),
                None => debug!("{}: no equalities", loc),
            }
        }

        let results = run_mp(
            "find eqts",
            tasks,
            |batch: Vec<(String, Template, Vec<Vec<BigInt>>)>| {
                batch
                    .into_iter()
                    .map(|(loc, tmpl, rows)| {
                        let r = self.refine(&loc, &tmpl, rows);
                        (loc, r)
                    })
                    .collect::<Vec<_>>()
            },
            self.settings.do_mp,
        )?;

        for (loc, r) in results {
            let (invs, stats) = r?;
            found.stats += &stats;
            debug!("{}: got {} eqts", loc, invs.len());
            for inv in invs.iter() {
                found.dinvs.add(&loc, inv.clone());
            }
        }
        Ok(found)
    }

    /// Enough distinct rows to solve a template at `loc`, lowering the
    /// degree when traces run out. `None` if even degree 1 fails.
    fn init_traces(
        &self,
        loc: &str,
        deg: u32,
        found: &mut Found,
        inps: &mut Inps,
        rng: &mut StdRng,
    ) -> Result<Option<(Template, Vec<Vec<BigInt>>)>, InferError> {
        let Some(vars) = self.oracle.vars(loc) else {
            return Ok(None);
        };
        let mut deg = deg;
        loop {
            let tmpl = init_terms(vars.names(), deg, self.settings.eqt_rate);
            if let Some(rows) = self.collect_rows(loc, &tmpl, found, inps, rng)? {
                return Ok(Some((tmpl, rows)));
            }
            if deg <= 1 {
                warn!("{}: deg {}, unable to generate sufficient traces", loc, deg);
                return Ok(None);
            }
            deg -= 1;
            info!("{}: reduce polynomial degree to {}", loc, deg);
        }
    }

    /// Random inputs first; once they stop producing traces at `loc`, ask
    /// the oracle for inputs reaching it.
    fn collect_rows(
        &self,
        loc: &str,
        tmpl: &Template,
        found: &mut Found,
        inps: &mut Inps,
        rng: &mut StdRng,
    ) -> Result<Option<Vec<Vec<BigInt>>>, InferError> {
        let needed = tmpl.n_eqts_needed;
        let mut rows: IndexSet<Vec<BigInt>> = found
            .dtraces
            .get(loc)
            .map(|t| t.instantiate(tmpl, Some(needed)))
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut do_rand = true;
        while rows.len() < needed {
            debug!(
                "{}: need more traces ({} eqts, need >= {}, inps {})",
                loc,
                rows.len(),
                needed,
                inps.len()
            );
            let mut new_traces = DTraces::new();
            if do_rand {
                let rinps = self.prog.gen_rand_inps(rng, needed - rows.len());
                let rinps = inps.merge_rows(rinps.iter().cloned());
                if !rinps.is_empty() {
                    new_traces = self.get_traces(&rinps, found)?;
                }
            }

            if new_traces.get(loc).map_or(true, Traces::is_empty) {
                do_rand = false;
                let probe = DInvs::mk_false_invs([loc]);
                let out = self.oracle.check(&probe, Some(&*inps))?;
                found.stats += &out.stats;
                let Some(models) = out.cexs.get(loc) else {
                    debug!("{}: cannot find new inps ({} inps)", loc, inps.len());
                    return Ok(None);
                };
                let new_inps = inps.merge_models(models, self.oracle.inp_decls());
                new_traces = self.get_traces(&new_inps, found)?;
                if new_traces.get(loc).map_or(true, Traces::is_empty) {
                    debug!("{}: cannot find new traces (need {})", loc, needed);
                    return Ok(None);
                }
            }

            if let Some(t) = new_traces.get(loc) {
                let before = rows.len();
                rows.extend(t.instantiate(tmpl, Some(needed - rows.len())));
                if rows.len() == before {
                    return Ok(None);
                }
            }
        }
        Ok(Some(rows.into_iter().collect()))
    }

    /// Run `inps` and keep the traces not seen before.
    fn get_traces(&self, inps: &Inps, found: &mut Found) -> Result<DTraces, InferError> {
        let st = Instant::now();
        let traces = self.prog.get_traces(inps);
        found.traces_secs += st.elapsed().as_secs_f64();
        Ok(found.dtraces.merge(&traces?)?)
    }

    fn refine(
        &self,
        loc: &str,
        tmpl: &Template,
        rows: Vec<Vec<BigInt>>,
    ) -> Result<(Invs, SolverStats), InferError> {
        let mut rows = rows;
        let mut cache: IndexSet<Inv> = IndexSet::new();
        let mut eqts = Invs::new();
        let mut stats = SolverStats::default();
        let vars = self.oracle.vars(loc).cloned().unwrap_or_default();

        for iter in 1.. {
            debug!("{}, iter {} infer using {} exprs", loc, iter, rows.len());
            let unchecks: Invs = solve_eqts(&rows, &tmpl.terms)
                .into_iter()
                .filter_map(|p| Inv::eqt(p).ok())
                .filter(|inv| !cache.contains(inv))
                .collect();
            if unchecks.is_empty() {
                debug!("{}: no new results", loc);
                break;
            }
            debug!("{}: check {} candidates", loc, unchecks.len());

            let out = self.oracle.check(&DInvs::mk(loc, unchecks), None)?;
            stats += &out.stats;
            if let Some(checked) = out.dinvs.get(loc) {
                for inv in checked.iter() {
                    if !inv.is_disproved() {
                        eqts.replace(inv.clone());
                    }
                    if inv.stat().is_some() {
                        cache.insert(inv.clone());
                    }
                }
            }

            let Some(models) = out.cexs.get(loc) else {
                debug!("{}: no disproved candidates", loc);
                break;
            };
            let cexs = Traces::extract(models, &vars);
            let new_rows = cexs.instantiate(tmpl, None);
            debug!("{}: {} new cex exprs", loc, new_rows.len());
            rows.extend(new_rows);
        }
        Ok((eqts, stats))
    }
}
