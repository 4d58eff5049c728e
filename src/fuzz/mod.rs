//! Adapter for a byte-level fuzzer.
//!
//! The host hands over, per sample, the input bytes at a fixed set of
//! positions and the program's integer outputs. They become traces at
//! [`LOC`], invariants are inferred from them, and the mutator steers the
//! tracked bytes toward the edges those invariants describe.

use std::collections::{BTreeMap, BTreeSet};

use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::alg::{DigError, DigTraces};
use crate::config::Settings;
use crate::data::{DTraces, Symbs, TraceError};
use crate::infer::{DInvs, Payload};
use crate::poly::{rat, rat_to_i64, Poly};

#[cfg(test)]
mod tests;

/// Location of every sample.
pub const LOC: &str = "vtrace1";

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    #[error("{xs} input samples but {ys} output samples")]
    SampleCount { xs: usize, ys: usize },
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Dig(#[from] DigError),
}

fn input_var(pos: usize) -> String {
    format!("x_{}", pos)
}

/// One trace per sample: `x_<p>` for each tracked position `p`, then
/// `y_<i>` for each output.
pub fn samples_to_dtraces(
    xs: &[Vec<i64>],
    ys: &[Vec<i64>],
    pos: &[usize],
) -> Result<DTraces, FuzzError> {
    if xs.len() != ys.len() {
        return Err(FuzzError::SampleCount {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    let mut dtraces = DTraces::new();
    let Some(first) = ys.first() else {
        return Ok(dtraces);
    };
    let names = pos
        .iter()
        .map(|p| input_var(*p))
        .chain((0..first.len()).map(|i| format!("y_{}", i)));
    let vars = Symbs::new(names);
    for (x, y) in xs.iter().zip(ys) {
        let row: Vec<i64> = x.iter().chain(y).copied().collect();
        dtraces.add(LOC, &vars, row)?;
    }
    Ok(dtraces)
}

/// Trace-only inference over fuzzer samples. No samples, no invariants.
pub fn infer_from_samples(
    xs: &[Vec<i64>],
    ys: &[Vec<i64>],
    pos: &[usize],
    settings: &Settings,
    seed: u64,
) -> Result<DInvs, FuzzError> {
    let dtraces = samples_to_dtraces(xs, ys, pos)?;
    if dtraces.is_empty() {
        return Ok(DInvs::new());
    }
    let out = DigTraces::new(dtraces, None, settings.clone()).start(seed, None)?;
    debug!("fuzz: {} invs from {} samples", out.dinvs.siz(), xs.len());
    Ok(out.dinvs)
}

// ─── Mutation ──────────────────────────────────────────────────────

/// `a*v + c` as `(v, a, c)`.
fn single_var(term: &Poly) -> Option<(String, BigRational, BigRational)> {
    let (rest, c) = term.split_constant();
    if rest.len() != 1 {
        return None;
    }
    let (m, a) = rest.leading()?;
    let v = m.as_var()?;
    Some((v.to_string(), a.clone(), c))
}

/// Interesting values per variable: both sides of single-variable bounds,
/// solutions of single-variable equalities and members of residue classes.
pub fn targets(dinvs: &DInvs, lo: i64, hi: i64) -> BTreeMap<String, Vec<i64>> {
    let mut out: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
    let Some(invs) = dinvs.get(LOC) else {
        return BTreeMap::new();
    };
    for inv in invs.iter() {
        let mut add = |v: &str, vals: Vec<i64>| {
            out.entry(v.to_string())
                .or_default()
                .extend(vals.into_iter().filter(|x| (lo..=hi).contains(x)));
        };
        match inv.payload() {
            Payload::Oct { term, bound } => {
                let Some((v, a, c)) = single_var(term) else {
                    continue;
                };
                let edge = (rat(*bound) - c) / &a;
                if a.is_positive() {
                    if let Some(e) = rat_to_i64(&edge.floor()) {
                        add(&v, vec![e, e.saturating_add(1)]);
                    }
                } else if let Some(e) = rat_to_i64(&edge.ceil()) {
                    add(&v, vec![e, e.saturating_sub(1)]);
                }
            }
            Payload::Eqt(p) => {
                let Some((v, a, c)) = single_var(p) else {
                    continue;
                };
                let sol = -c / a;
                if let Some(e) = rat_to_i64(&sol) {
                    add(&v, vec![e.saturating_sub(1), e, e.saturating_add(1)]);
                }
            }
            Payload::Congruence {
                term,
                modulus,
                residue,
            } => {
                let Some((v, a, c)) = single_var(term) else {
                    continue;
                };
                if !a.is_one() || !c.is_zero() {
                    continue;
                }
                let start = lo + (residue - lo).mod_floor(modulus);
                add(&v, (start..=hi).step_by(*modulus as usize).collect());
            }
            _ => {}
        }
    }
    out.into_iter()
        .filter(|(_, vals)| !vals.is_empty())
        .map(|(v, vals)| (v, vals.into_iter().collect()))
        .collect()
}

/// Rewrites tracked input bytes with values taken from invariants.
#[derive(Clone, Debug)]
pub struct Mutator {
    /// Chance of rewriting each tracked byte that has a target.
    pub rate: f64,
}

impl Default for Mutator {
    fn default() -> Self {
        Mutator { rate: 0.5 }
    }
}

impl Mutator {
    /// Mutate `buf` in place; returns how many bytes were rewritten.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        buf: &mut [u8],
        pos: &[usize],
        dinvs: &DInvs,
        rng: &mut R,
    ) -> usize {
        let targets = targets(dinvs, 0, u8::MAX as i64);
        let rate = if self.rate.is_finite() {
            self.rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut n = 0;
        for p in pos {
            if *p >= buf.len() {
                continue;
            }
            let Some(vals) = targets.get(&input_var(*p)) else {
                continue;
            };
            if !rng.gen_bool(rate) {
                continue;
            }
            if let Some(v) = vals.choose(rng).and_then(|v| u8::try_from(*v).ok()) {
                buf[*p] = v;
                n += 1;
            }
        }
        n
    }
}
