use tracing::debug;

use super::*;
use crate::solver::Implication;

/// The invariants of one location, grouped by kind for simplification.
#[derive(Clone, Debug, Default)]
pub struct CInvs {
    pub eqts: Vec<Inv>,
    /// Equalities with many terms or large coefficients.
    pub eqts_largecoefs: Vec<Inv>,
    pub octs: Vec<Inv>,
    pub mps: Vec<Inv>,
    pub congruences: Vec<Inv>,
    pub nested_arrays: Vec<Inv>,
    pub falseinvs: Vec<Inv>,
}

impl CInvs {
    pub fn classify(invs: &Invs, settings: &Settings) -> CInvs {
        let mut c = CInvs::default();
        for inv in invs.iter() {
            let bucket = match inv.kind() {
                InvKind::Eqt if inv.is_ugly(settings.ugly_factor, settings.ugly_nterms) => {
                    &mut c.eqts_largecoefs
                }
                InvKind::Eqt => &mut c.eqts,
                InvKind::Oct => &mut c.octs,
                InvKind::MinMax => &mut c.mps,
                InvKind::Congruence => &mut c.congruences,
                InvKind::NestedArray => &mut c.nested_arrays,
                InvKind::False => &mut c.falseinvs,
            };
            bucket.push(inv.clone());
        }
        c
    }

    /// Remove invariants implied by the others.
    ///
    /// Equalities are reduced among themselves. Congruences are reduced by
    /// the equalities and then among themselves. Min/max bounds that pair up
    /// into an equation become that equation. The remaining bounds are first
    /// screened against everything already kept, then reduced one by one.
    /// Single-variable octagons are never checked against equalities.
    /// Large-coefficient equalities never serve as premises. They are kept
    /// as they are unless the reduced equalities imply them.
    pub fn simplify(
        self,
        loc: &str,
        prover: &dyn Prover,
        settings: &Settings,
        stats: &mut SolverStats,
    ) -> Result<Invs, InferError> {
        if !self.falseinvs.is_empty() {
            return Err(InvError::FalseInSimplify(loc.to_string()).into());
        }
        let mut pass = Pass {
            prover,
            settings,
            stats,
        };

        let mut done = Vec::new();

        let eqts = pass.slow(self.eqts, &[], "eqts");
        done.extend(eqts.iter().cloned());
        let eqts_largecoefs = pass.fast(self.eqts_largecoefs, &eqts, "eqts_largecoefs");

        let congruences = pass.fast(self.congruences, &eqts, "congruences");
        let congruences = pass.slow(congruences, &[], "congruences");
        done.extend(congruences);

        let (octs_simple, octs_not_simple): (Vec<Inv>, Vec<Inv>) =
            self.octs.iter().cloned().partition(Inv::is_simple_oct);

        let (mps_eqt, mps_ieq): (Vec<Inv>, Vec<Inv>) = merge_minmax(self.mps)
            .into_iter()
            .partition(|i| matches!(i.payload(), Payload::MinMax(MinMax::Eq { .. })));
        done.extend(mps_eqt.iter().cloned());

        let premises: Vec<Inv> = done.iter().chain(&self.octs).cloned().collect();
        let mps_ieq = pass.fast(mps_ieq, &premises, "mps_ieq");
        let premises: Vec<Inv> = done
            .iter()
            .chain(&octs_simple)
            .chain(&mps_ieq)
            .cloned()
            .collect();
        let octs_not_simple = pass.fast(octs_not_simple, &premises, "octs");

        let mut octs_mps: Vec<Inv> = octs_not_simple.into_iter().chain(mps_ieq).collect();
        if !octs_mps.is_empty() {
            let premises: Vec<Inv> = done.iter().chain(&octs_simple).cloned().collect();
            octs_mps = pass.slow(octs_mps, &premises, "octs+mps");
        }

        let premises: Vec<Inv> = mps_eqt.iter().chain(&octs_mps).cloned().collect();
        let octs_simple = pass.slow(octs_simple, &premises, "octs_simple");

        let mut out: Invs = eqts_largecoefs.into_iter().collect();
        out.extend(done);
        out.extend(octs_simple);
        out.extend(octs_mps);
        out.extend(self.nested_arrays);
        Ok(out)
    }
}

/// Pair `a - op(b, c) <= 0` with `op(b, c) - a <= 0` into `a == op(b, c)`.
fn merge_minmax(mps: Vec<Inv>) -> Vec<Inv> {
    let zero_bound = |inv: &Inv| match inv.payload() {
        Payload::MinMax(MinMax::Bound { term, bound: 0 }) => Some(term.clone()),
        _ => None,
    };
    let terms: Vec<MinMaxTerm> = mps.iter().filter_map(zero_bound).collect();
    let mut merged: Vec<MinMaxTerm> = Vec::new();
    let mut out = Vec::new();
    for inv in &mps {
        let Some(term) = zero_bound(inv) else {
            out.push(inv.clone());
            continue;
        };
        if merged.contains(&term) {
            continue;
        }
        let flipped = term.flipped();
        if !terms.contains(&flipped) {
            out.push(inv.clone());
            continue;
        }
        let partner = mps
            .iter()
            .find(|i| zero_bound(i).as_ref() == Some(&flipped));
        match Inv::mmp_eq(term.op, term.lhs.clone(), term.args.clone()) {
            Ok(eq) => {
                let stat = match (inv.stat(), partner.and_then(Inv::stat)) {
                    (Some(Stat::Proved), Some(Stat::Proved)) => Some(Stat::Proved),
                    (None, None) => None,
                    _ => Some(Stat::Unknown),
                };
                out.push(match stat {
                    Some(s) => eq.with_stat(s),
                    None => eq,
                });
                merged.push(term);
                merged.push(flipped);
            }
            Err(_) => out.push(inv.clone()),
        }
    }
    out
}

struct Pass<'a> {
    prover: &'a dyn Prover,
    settings: &'a Settings,
    stats: &'a mut SolverStats,
}

impl Pass<'_> {
    /// Drop each `p` in `ps` with `others => p`, checking all in parallel.
    fn fast(&mut self, ps: Vec<Inv>, others: &[Inv], msg: &str) -> Vec<Inv> {
        if ps.is_empty() || others.is_empty() {
            return ps;
        }
        let conj: Vec<Formula> = others.iter().filter_map(Inv::to_formula).collect();
        let n = ps.len();
        let prover = self.prover;
        let results = run_mp(
            msg,
            ps.clone(),
            |batch: Vec<Inv>| {
                batch
                    .into_iter()
                    .map(|p| {
                        let implied = p
                            .to_formula()
                            .is_some_and(|g| prover.imply(&conj, &g) == Implication::Holds);
                        (p, implied)
                    })
                    .collect::<Vec<_>>()
            },
            self.settings.do_mp,
        );
        self.stats.implications += n;
        let kept: Vec<Inv> = match results {
            Ok(rs) => rs.into_iter().filter(|(_, implied)| !implied).map(|(p, _)| p).collect(),
            Err(e) => {
                debug!("{}: keeping all after {}", msg, e);
                return ps;
            }
        };
        debug!("simplify_fast {}: {} -> {}", msg, n, kept.len());
        // keep the input order
        ps.into_iter().filter(|p| kept.contains(p)).collect()
    }

    /// Drop each `p` implied by `others` plus the survivors among `ps`,
    /// trying the most complex candidates first.
    fn slow(&mut self, ps: Vec<Inv>, others: &[Inv], msg: &str) -> Vec<Inv> {
        if ps.is_empty() || (ps.len() < 2 && others.is_empty()) {
            return ps;
        }
        let n = ps.len();
        let mut ps: Vec<(Inv, String)> = ps
            .into_iter()
            .map(|p| {
                let s = p.to_string();
                (p, s)
            })
            .collect();
        ps.sort_by(|(a, sa), (b, sb)| {
            a.nterms()
                .cmp(&b.nterms())
                .then(sa.len().cmp(&sb.len()))
                .then(sa.cmp(sb))
        });
        let base: Vec<Formula> = others.iter().filter_map(Inv::to_formula).collect();
        let mut alive = vec![true; ps.len()];
        for i in (0..ps.len()).rev() {
            let Some(goal) = ps[i].0.to_formula() else {
                continue;
            };
            let mut conj = base.clone();
            conj.extend(
                ps.iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i && alive[j])
                    .filter_map(|(_, (p, _))| p.to_formula()),
            );
            self.stats.implications += 1;
            if self.prover.imply(&conj, &goal) == Implication::Holds {
                alive[i] = false;
            }
        }
        let kept: Vec<Inv> = ps
            .into_iter()
            .zip(alive)
            .filter(|(_, a)| *a)
            .map(|((p, _), _)| p)
            .collect();
        debug!("simplify_slow {}: {} -> {}", msg, n, kept.len());
        kept
    }
}
