use super::*;

fn vars(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn p(s: &str) -> Poly {
    parse_poly(s).expect("test polynomial parses")
}

// -- Monomials --

#[test]
fn test_monomial_order_degree_first() {
    let one = Monomial::one();
    let x = Monomial::var("x");
    let y = Monomial::var("y");
    let xx = Monomial::from_factors(vec![("x".to_string(), 2)]);
    let xy = x.mul(&y);
    let mut ms = vec![xy.clone(), y.clone(), xx.clone(), one.clone(), x.clone()];
    ms.sort();
    assert_eq!(ms, vec![one, x, y, xx, xy]);
}

#[test]
fn test_monomial_display() {
    let m = Monomial::from_factors(vec![
        ("y".to_string(), 1),
        ("x".to_string(), 2),
        ("z".to_string(), 0),
    ]);
    assert_eq!(m.to_string(), "x^2*y");
    assert_eq!(Monomial::one().to_string(), "1");
    assert_eq!(m.degree(), 3);
    assert_eq!(Monomial::var("a").as_var(), Some("a"));
    assert_eq!(m.as_var(), None);
}

// -- Polynomial arithmetic --

#[test]
fn test_poly_display() {
    assert_eq!(p("y - 2*x").to_string(), "y - 2*x");
    assert_eq!(p("3 + y*x^2").to_string(), "x^2*y + 3");
    assert_eq!(p("-x - 1").to_string(), "-x - 1");
    assert_eq!(p("x - x").to_string(), "0");
}

#[test]
fn test_poly_cancellation_drops_terms() {
    let q = p("x + y") - p("y");
    assert_eq!(q, Poly::var("x"));
    assert_eq!(q.len(), 1);
}

#[test]
fn test_poly_mul_and_pow() {
    assert_eq!(p("(x + 1)^2"), p("x^2 + 2*x + 1"));
    assert_eq!(p("(x - y)*(x + y)"), p("x^2 - y^2"));
}

#[test]
fn test_poly_eval() {
    let q = p("x^2*y - 3*z + 1");
    let v = q.eval(&|n: &str| match n {
        "x" => Some(2),
        "y" => Some(5),
        "z" => Some(7),
        _ => None,
    });
    assert_eq!(v, Some(rat(20 - 21 + 1)));
    assert_eq!(q.eval(&|_: &str| None), None);
}

#[test]
fn test_primitive_normalizes_scale_and_sign() {
    let q = Poly::from_terms(vec![
        (Monomial::var("y"), BigRational::new(BigInt::from(-1), BigInt::from(2))),
        (Monomial::var("x"), rat(1)),
    ]);
    assert_eq!(q.primitive().to_string(), "y - 2*x");
    assert_eq!(p("-4*y + 8*x").primitive().to_string(), "y - 2*x");
}

#[test]
fn test_integral_keeps_sign() {
    let q = p("-4*y + 8*x");
    assert_eq!(q.integral().to_string(), "-y + 2*x");
}

#[test]
fn test_substitute_monomial() {
    let q = p("2*x + y");
    let r = q.substitute(&Monomial::var("x"), &p("y - 1"));
    assert_eq!(r, p("3*y - 2"));
}

// -- Parsing --

#[test]
fn test_parse_constraint_forms() {
    let c = parse_constraint("0 <= x").expect("parses");
    assert_eq!(c, Constraint::Cmp(Poly::zero(), CmpOp::Le, Poly::var("x")));
    let c = parse_constraint("y == 2*x").expect("parses");
    assert_eq!(c, Constraint::Cmp(Poly::var("y"), CmpOp::Eq, p("2*x")));
    assert_eq!(parse_constraint("true"), Ok(Constraint::Bool(true)));
    assert_eq!(parse_constraint(" False "), Ok(Constraint::Bool(false)));
}

#[test]
fn test_parse_errors() {
    assert!(parse_poly("x +").is_err());
    assert!(parse_poly("x y").is_err());
    assert!(parse_constraint("x + 1").is_err());
    assert!(parse_constraint("x = 1").is_err());
    let err = parse_poly("x $ 1").unwrap_err();
    assert_eq!(err.column, 2);
}

#[test]
fn test_parse_dotted_identifiers() {
    let q = p("a.len + x_1");
    assert_eq!(q.vars().len(), 2);
}

// -- Templates --

#[test]
fn test_monomials_upto() {
    let ms = monomials_upto(&vars(&["x", "y"]), 2);
    let shown: Vec<String> = ms.iter().map(|m| m.to_string()).collect();
    assert_eq!(shown, vec!["1", "x", "y", "x^2", "x*y", "y^2"]);
}

#[test]
fn test_init_terms_rate() {
    let t = init_terms(&vars(&["x", "y"]), 1, 1.5);
    assert_eq!(t.n_unknowns(), 3);
    assert_eq!(t.n_eqts_needed, 5);
}

#[test]
#[should_panic]
fn test_init_terms_rejects_degree_zero() {
    init_terms(&vars(&["x"]), 0, 1.5);
}

#[test]
fn test_n_terms_binomial() {
    assert_eq!(n_terms(2, 1), 3);
    assert_eq!(n_terms(2, 2), 6);
    assert_eq!(n_terms(3, 3), 20);
}

#[test]
fn test_auto_deg() {
    assert_eq!(auto_deg(Some(3), 5, 10), 3);
    // C(4,2)=6, C(5,3)=10, C(6,4)=15
    assert_eq!(auto_deg(None, 2, 10), 3);
    assert_eq!(auto_deg(None, 50, 10), 1);
    assert_eq!(auto_deg(None, 1, 200), MAX_AUTO_DEG);
}

// -- Null space --

#[test]
fn test_solve_eqts_linear() {
    let t = init_terms(&vars(&["x", "y"]), 1, 1.5);
    let rows: Vec<Vec<BigInt>> = [(1, 2), (2, 4), (3, 6)]
        .iter()
        .filter_map(|&(x, y)| {
            t.instantiate(&|n: &str| match n {
                "x" => Some(x),
                "y" => Some(y),
                _ => None,
            })
        })
        .collect();
    let eqts = solve_eqts(&rows, &t.terms);
    let shown: Vec<String> = eqts.iter().map(|e| e.to_string()).collect();
    assert_eq!(shown, vec!["y - 2*x"]);
}

#[test]
fn test_solve_eqts_full_rank_is_empty() {
    let rows = vec![
        vec![BigInt::from(1), BigInt::from(0)],
        vec![BigInt::from(1), BigInt::from(1)],
    ];
    let terms = vec![Monomial::one(), Monomial::var("x")];
    assert!(solve_eqts(&rows, &terms).is_empty());
}

#[test]
fn test_solve_eqts_quadratic() {
    let t = init_terms(&vars(&["x", "y"]), 2, 1.0);
    let rows: Vec<Vec<BigInt>> = (0..8)
        .filter_map(|x: i64| {
            t.instantiate(&|n: &str| match n {
                "x" => Some(x),
                "y" => Some(x * x),
                _ => None,
            })
        })
        .collect();
    let eqts = solve_eqts(&rows, &t.terms);
    assert!(!eqts.is_empty());
    for e in &eqts {
        for x in 0..8i64 {
            let v = e.eval(&|n: &str| match n {
                "x" => Some(x),
                "y" => Some(x * x),
                _ => None,
            });
            assert_eq!(v, Some(BigRational::zero()), "{} fails at x={}", e, x);
        }
    }
}

#[test]
fn test_nullspace_no_rows() {
    let basis = nullspace(&[], 3);
    assert_eq!(basis.len(), 3);
}

#[test]
fn test_in_span() {
    let gens = vec![p("x*y - 2*x^2"), p("y^2 - 2*x*y")];
    assert!(in_span(&p("y^2 - 4*x^2"), &gens));
    assert!(!in_span(&p("x^2"), &gens));
    assert!(in_span(&Poly::zero(), &[]));
    assert!(!in_span(&p("x"), &[]));
}

proptest::proptest! {
    #[test]
    fn prop_primitive_is_idempotent(a in -50i64..50, b in -50i64..50, c in -50i64..50) {
        let q = Poly::from_terms(vec![
            (Monomial::var("x"), rat(a)),
            (Monomial::var("y"), rat(b)),
            (Monomial::one(), rat(c)),
        ]);
        let once = q.primitive();
        proptest::prop_assert_eq!(once.primitive(), once);
    }

    #[test]
    fn prop_display_reparses(a in -20i64..20, b in -20i64..20, c in -20i64..20) {
        let q = Poly::from_terms(vec![
            (Monomial::from_factors(vec![("x".to_string(), 2)]), rat(a)),
            (Monomial::var("y"), rat(b)),
            (Monomial::one(), rat(c)),
        ]);
        let again = parse_poly(&q.to_string()).expect("display output parses");
        proptest::prop_assert_eq!(again, q);
    }

    #[test]
    fn prop_lower_degree_monomials_are_kept(nvars in 1usize..4, deg in 1u32..5) {
        let names = vars(&["x", "y", "z"][..nvars]);
        let lower = monomials_upto(&names, deg - 1);
        let upper = monomials_upto(&names, deg);
        proptest::prop_assert!(lower.len() < upper.len());
        proptest::prop_assert!(lower.iter().all(|m| upper.contains(m)));
    }
}
