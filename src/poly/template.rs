use super::*;

/// Highest degree the automatic degree selection will pick.
pub const MAX_AUTO_DEG: u32 = 12;

/// A polynomial template `sum c_i * t_i` with unknown coefficients `c_i`.
///
/// Instantiating the template against a trace gives one linear equation in
/// the unknowns; enough independent equations pin the coefficient space
/// down to the equalities the traces satisfy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    /// Terms of the template, lowest first. Always contains `1`.
    pub terms: Vec<Monomial>,
    /// How many distinct instantiations are wanted before solving.
    pub n_eqts_needed: usize,
}

impl Template {
    pub fn n_unknowns(&self) -> usize {
        self.terms.len()
    }

    /// One equation row: the value of every term under `lookup`.
    pub fn instantiate<F>(&self, lookup: &F) -> Option<Vec<BigInt>>
    where
        F: Fn(&str) -> Option<i64>,
    {
        self.terms.iter().map(|t| t.eval(lookup)).collect()
    }
}

/// All monomials of total degree `<= deg` over `vars`, including `1`,
/// in monomial order.
pub fn monomials_upto(vars: &[String], deg: u32) -> Vec<Monomial> {
    let mut out = Vec::new();
    let mut factors: Vec<(String, u32)> = Vec::new();
    collect_monomials(vars, deg, &mut factors, &mut out);
    out.sort();
    out.dedup();
    out
}

fn collect_monomials(
    vars: &[String],
    budget: u32,
    factors: &mut Vec<(String, u32)>,
    out: &mut Vec<Monomial>,
) {
    match vars.split_first() {
        None => out.push(Monomial::from_factors(factors.iter().cloned())),
        Some((v, rest)) => {
            for e in 0..=budget {
                factors.push((v.clone(), e));
                collect_monomials(rest, budget - e, factors, out);
                factors.pop();
            }
        }
    }
}

/// Build the degree-`deg` template over `vars`. The number of wanted
/// equations is `ceil(rate * terms)`.
pub fn init_terms(vars: &[String], deg: u32, rate: f64) -> Template {
    assert!(deg >= 1, "template degree must be at least 1, got {}", deg);
    assert!(rate >= 0.1, "equation rate must be at least 0.1, got {}", rate);
    let terms = monomials_upto(vars, deg);
    let n_eqts_needed = (rate * terms.len() as f64).ceil() as usize;
    Template {
        terms,
        n_eqts_needed,
    }
}

/// Number of monomials of degree `<= deg` over `nvars` variables,
/// `C(nvars + deg, deg)`. Saturates instead of overflowing.
pub fn n_terms(nvars: usize, deg: u32) -> u128 {
    let mut acc: u128 = 1;
    for i in 1..=deg as u128 {
        acc = acc.saturating_mul(nvars as u128 + i) / i;
    }
    acc
}

/// Template degree to use. An explicit `maxdeg` wins; otherwise the largest
/// degree whose template has at most `max_term` terms, but never below 1.
pub fn auto_deg(maxdeg: Option<u32>, nvars: usize, max_term: usize) -> u32 {
    if let Some(d) = maxdeg {
        return d.max(1);
    }
    if nvars == 0 {
        return 1;
    }
    let mut deg = 1;
    while deg < MAX_AUTO_DEG && n_terms(nvars, deg + 1) <= max_term as u128 {
        deg += 1;
    }
    deg
}
