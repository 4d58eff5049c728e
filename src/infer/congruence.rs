//! Modular relations observed in traces.

use std::collections::BTreeSet;

use super::*;
use crate::data::Symbs;

/// Every variable plus every pairwise sum and difference.
pub fn congruence_terms(vars: &Symbs) -> Vec<Poly> {
    let names = vars.names();
    let mut out: Vec<Poly> = names.iter().map(|v| Poly::var(v)).collect();
    for (i, x) in names.iter().enumerate() {
        for y in &names[i + 1..] {
            out.push(Poly::var(x) + Poly::var(y));
            out.push(Poly::var(x) - Poly::var(y));
        }
    }
    out
}

/// `t % g == v0 mod g` where `g >= 2` is the gcd of the differences of the
/// distinct values of `t`. Terms with fewer than three distinct values are
/// skipped. Results have status unknown.
pub fn gen_from_traces(traces: &Traces, settings: &Settings) -> Invs {
    let mut out = Invs::new();
    for term in congruence_terms(traces.vars()) {
        let values: BTreeSet<BigInt> = traces
            .iter()
            .filter(|t| !t.exceeds(settings.trace_max_val))
            .filter_map(|t| t.eval(&term))
            .filter(|v| v.is_integer())
            .map(|v| v.to_integer())
            .collect();
        if values.len() < 3 {
            continue;
        }
        let mut it = values.iter();
        let Some(v0) = it.next() else {
            continue;
        };
        let g = it.fold(BigInt::zero(), |g, v| g.gcd(&(v - v0)));
        let Ok(modulus) = i64::try_from(g) else {
            continue;
        };
        if modulus < 2 {
            continue;
        }
        let residue = v0.mod_floor(&BigInt::from(modulus));
        let Ok(residue) = i64::try_from(residue) else {
            continue;
        };
        if let Ok(inv) = Inv::congruence(term, modulus, residue) {
            out.add(inv.with_stat(Stat::Unknown));
        }
    }
    out
}
