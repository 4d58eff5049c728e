//! Exact multivariate polynomials over the rationals.
//!
//! Everything numeric in the engine is built from [`Poly`]: invariant
//! payloads, the unknown-coefficient templates of the equality engine, and
//! the linear constraints handed to the solver (where every non-constant
//! [`Monomial`] is treated as an opaque integer variable).
//!
//! Coefficients are `BigRational` so that template solving and elimination
//! never round. Trace values are `i64`; evaluation widens them to `BigInt`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

mod linalg;
mod parse;
mod template;
#[cfg(test)]
mod tests;

pub use linalg::*;
pub use parse::*;
pub use template::*;

/// Rational from a machine integer.
pub fn rat(v: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(v))
}

/// Convert an integral rational back to `i64`, if it fits.
pub fn rat_to_i64(v: &BigRational) -> Option<i64> {
    if !v.is_integer() {
        return None;
    }
    i64::try_from(v.to_integer()).ok()
}

// ─── Monomials ─────────────────────────────────────────────────────

/// A product of variables raised to positive powers, e.g. `x^2*y`.
///
/// Factors are sorted by variable name. The empty product is the constant
/// monomial `1`. Monomials order by total degree first, then
/// lexicographically by their factors.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Monomial(Vec<(String, u32)>);

impl Monomial {
    pub fn one() -> Self {
        Monomial(Vec::new())
    }

    pub fn var(name: &str) -> Self {
        Monomial(vec![(name.to_string(), 1)])
    }

    /// Build from arbitrary factors; repeated variables are combined and
    /// zero exponents dropped.
    pub fn from_factors<I>(factors: I) -> Self
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let mut acc: BTreeMap<String, u32> = BTreeMap::new();
        for (name, exp) in factors {
            if exp > 0 {
                *acc.entry(name).or_insert(0) += exp;
            }
        }
        Monomial(acc.into_iter().collect())
    }

    pub fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    /// Total degree.
    pub fn degree(&self) -> u32 {
        self.0.iter().map(|(_, e)| *e).sum()
    }

    pub fn factors(&self) -> &[(String, u32)] {
        &self.0
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(v, _)| v.as_str())
    }

    /// The variable name if this monomial is a single variable of degree 1.
    pub fn as_var(&self) -> Option<&str> {
        match self.0.as_slice() {
            [(name, 1)] => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn mul(&self, other: &Monomial) -> Monomial {
        Monomial::from_factors(self.0.iter().chain(other.0.iter()).cloned())
    }

    /// Evaluate under an assignment. `None` if a variable is unassigned.
    pub fn eval<F>(&self, lookup: &F) -> Option<BigInt>
    where
        F: Fn(&str) -> Option<i64>,
    {
        let mut acc = BigInt::one();
        for (name, exp) in &self.0 {
            let v = BigInt::from(lookup(name)?);
            acc *= num_traits::pow(v, *exp as usize);
        }
        Some(acc)
    }
}

impl Ord for Monomial {
    fn cmp(&self, other: &Self) -> Ordering {
        self.degree()
            .cmp(&other.degree())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Monomial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "1");
        }
        for (i, (name, exp)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "*")?;
            }
            if *exp == 1 {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{}^{}", name, exp)?;
            }
        }
        Ok(())
    }
}

// ─── Polynomials ───────────────────────────────────────────────────

/// A polynomial with rational coefficients. Zero coefficients are never
/// stored, so structural equality is polynomial equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Poly {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly::default()
    }

    pub fn constant(c: BigRational) -> Self {
        Poly::monomial(Monomial::one(), c)
    }

    pub fn from_int(c: i64) -> Self {
        Poly::constant(rat(c))
    }

    pub fn var(name: &str) -> Self {
        Poly::monomial(Monomial::var(name), BigRational::one())
    }

    pub fn monomial(m: Monomial, c: BigRational) -> Self {
        let mut terms = BTreeMap::new();
        if !c.is_zero() {
            terms.insert(m, c);
        }
        Poly { terms }
    }

    /// Sum of `coef * monomial` pairs; like terms are combined.
    pub fn from_terms<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = (Monomial, BigRational)>,
    {
        let mut p = Poly::zero();
        for (m, c) in terms {
            p.add_term(m, c);
        }
        p
    }

    fn add_term(&mut self, m: Monomial, c: BigRational) {
        if c.is_zero() {
            return;
        }
        let entry = self.terms.entry(m).or_insert_with(BigRational::zero);
        *entry += c;
        if entry.is_zero() {
            self.terms.retain(|_, v| !v.is_zero());
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// True if the polynomial has no non-constant monomial.
    pub fn is_constant(&self) -> bool {
        self.terms.keys().all(Monomial::is_one)
    }

    pub fn constant_term(&self) -> BigRational {
        self.terms
            .get(&Monomial::one())
            .cloned()
            .unwrap_or_else(BigRational::zero)
    }

    /// Number of monomials with a non-zero coefficient.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &BigRational)> {
        self.terms.iter()
    }

    pub fn coef(&self, m: &Monomial) -> BigRational {
        self.terms.get(m).cloned().unwrap_or_else(BigRational::zero)
    }

    /// Highest monomial and its coefficient.
    pub fn leading(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms.iter().next_back()
    }

    pub fn vars(&self) -> BTreeSet<String> {
        self.terms
            .keys()
            .flat_map(|m| m.vars().map(str::to_string))
            .collect()
    }

    pub fn degree(&self) -> u32 {
        self.terms.keys().map(Monomial::degree).max().unwrap_or(0)
    }

    pub fn is_linear(&self) -> bool {
        self.degree() <= 1
    }

    /// Split into the non-constant part and the constant term.
    pub fn split_constant(&self) -> (Poly, BigRational) {
        let mut rest = self.clone();
        let c = rest
            .terms
            .remove(&Monomial::one())
            .unwrap_or_else(BigRational::zero);
        (rest, c)
    }

    pub fn scale(&self, c: &BigRational) -> Poly {
        if c.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, v)| (m.clone(), v * c))
                .collect(),
        }
    }

    /// Replace the monomial `m` (treated as an atom) by `by`.
    pub fn substitute(&self, m: &Monomial, by: &Poly) -> Poly {
        let a = self.coef(m);
        if a.is_zero() {
            return self.clone();
        }
        let mut rest = self.clone();
        rest.terms.remove(m);
        rest + by.scale(&a)
    }

    pub fn has_integer_coefs(&self) -> bool {
        self.terms.values().all(|c| c.is_integer())
    }

    pub fn max_abs_coef(&self) -> BigRational {
        self.terms
            .values()
            .map(|c| c.abs())
            .max()
            .unwrap_or_else(BigRational::zero)
    }

    /// Scale to coprime integer coefficients with a positive leading
    /// coefficient. This is the canonical form of `p == 0`.
    pub fn primitive(&self) -> Poly {
        let p = self.integral();
        match p.leading() {
            Some((_, c)) if c.is_negative() => -p,
            _ => p,
        }
    }

    /// Scale by a positive factor to coprime integer coefficients. Unlike
    /// [`Poly::primitive`] the sign is preserved, so `p <= 0` keeps its
    /// meaning.
    pub fn integral(&self) -> Poly {
        if self.is_zero() {
            return Poly::zero();
        }
        let lcm = self
            .terms
            .values()
            .fold(BigInt::one(), |acc, c| acc.lcm(c.denom()));
        let scaled: Vec<(Monomial, BigInt)> = self
            .terms
            .iter()
            .map(|(m, c)| (m.clone(), (c * BigRational::from_integer(lcm.clone())).to_integer()))
            .collect();
        let gcd = scaled
            .iter()
            .fold(BigInt::zero(), |acc, (_, c)| acc.gcd(c));
        Poly {
            terms: scaled
                .into_iter()
                .map(|(m, c)| (m, BigRational::from_integer(c / &gcd)))
                .collect(),
        }
    }

    /// Evaluate exactly under an assignment. `None` if a variable is
    /// unassigned.
    pub fn eval<F>(&self, lookup: &F) -> Option<BigRational>
    where
        F: Fn(&str) -> Option<i64>,
    {
        let mut acc = BigRational::zero();
        for (m, c) in &self.terms {
            acc += c * BigRational::from_integer(m.eval(lookup)?);
        }
        Some(acc)
    }

    pub fn pow(&self, exp: u32) -> Poly {
        let mut acc = Poly::from_int(1);
        for _ in 0..exp {
            acc = acc * self.clone();
        }
        acc
    }
}

impl Add for Poly {
    type Output = Poly;

    fn add(mut self, rhs: Poly) -> Poly {
        for (m, c) in rhs.terms {
            self.add_term(m, c);
        }
        self
    }
}

impl Sub for Poly {
    type Output = Poly;

    fn sub(self, rhs: Poly) -> Poly {
        self + (-rhs)
    }
}

impl Neg for Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        Poly {
            terms: self.terms.into_iter().map(|(m, c)| (m, -c)).collect(),
        }
    }
}

impl Mul for Poly {
    type Output = Poly;

    fn mul(self, rhs: Poly) -> Poly {
        let mut out = Poly::zero();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                out.add_term(ma.mul(mb), ca * cb);
            }
        }
        out
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (i, (m, c)) in self.terms.iter().rev().enumerate() {
            let neg = c.is_negative();
            match (i, neg) {
                (0, true) => write!(f, "-")?,
                (0, false) => {}
                (_, true) => write!(f, " - ")?,
                (_, false) => write!(f, " + ")?,
            }
            let a = c.abs();
            if m.is_one() {
                write!(f, "{}", a)?;
            } else if a.is_one() {
                write!(f, "{}", m)?;
            } else {
                write!(f, "{}*{}", a, m)?;
            }
        }
        Ok(())
    }
}
