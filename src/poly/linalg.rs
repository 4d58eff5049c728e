use super::*;

/// Basis of the null space of the matrix given by `rows`, each of length
/// `ncols`. Computed by exact reduced row echelon form.
pub fn nullspace(rows: &[Vec<BigInt>], ncols: usize) -> Vec<Vec<BigRational>> {
    let mut m: Vec<Vec<BigRational>> = rows
        .iter()
        .map(|r| {
            (0..ncols)
                .map(|j| {
                    r.get(j)
                        .cloned()
                        .map(BigRational::from_integer)
                        .unwrap_or_else(BigRational::zero)
                })
                .collect()
        })
        .collect();

    let mut pivots: Vec<usize> = Vec::new();
    let mut r = 0;
    for c in 0..ncols {
        if r >= m.len() {
            break;
        }
        let Some(p) = (r..m.len()).find(|&i| !m[i][c].is_zero()) else {
            continue;
        };
        m.swap(r, p);
        let inv = m[r][c].recip();
        for v in m[r].iter_mut() {
            *v *= &inv;
        }
        let pivot_row = m[r].clone();
        for (i, row) in m.iter_mut().enumerate() {
            if i == r || row[c].is_zero() {
                continue;
            }
            let f = row[c].clone();
            for (v, pv) in row.iter_mut().zip(pivot_row.iter()) {
                *v -= &f * pv;
            }
        }
        pivots.push(c);
        r += 1;
    }

    let mut basis = Vec::new();
    for free in (0..ncols).filter(|c| !pivots.contains(c)) {
        let mut v = vec![BigRational::zero(); ncols];
        v[free] = BigRational::one();
        for (k, &pc) in pivots.iter().enumerate() {
            v[pc] = -m[k][free].clone();
        }
        basis.push(v);
    }
    basis
}

/// Equalities `p == 0` over `terms` that hold on every row, where each row
/// holds the values of `terms` at one trace. Each result is primitive.
pub fn solve_eqts(rows: &[Vec<BigInt>], terms: &[Monomial]) -> Vec<Poly> {
    nullspace(rows, terms.len())
        .into_iter()
        .map(|v| Poly::from_terms(terms.iter().cloned().zip(v)).primitive())
        .filter(|p| !p.is_zero())
        .collect()
}

/// Whether `target` is a rational linear combination of `gens`.
pub fn in_span(target: &Poly, gens: &[Poly]) -> bool {
    if target.is_zero() {
        return true;
    }
    let cols: Vec<Poly> = gens
        .iter()
        .chain(std::iter::once(target))
        .map(Poly::integral)
        .collect();
    let monos: BTreeSet<&Monomial> = cols
        .iter()
        .flat_map(|p| p.terms().map(|(m, _)| m))
        .collect();
    let rows: Vec<Vec<BigInt>> = monos
        .iter()
        .map(|m| cols.iter().map(|p| p.coef(m).to_integer()).collect())
        .collect();
    let last = cols.len() - 1;
    // the target column is free exactly when it depends on the others
    nullspace(&rows, cols.len())
        .iter()
        .any(|v| !v[last].is_zero())
}
