use super::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{FnExecutor, Prog, Symbs};
use crate::poly::parse_poly;
use crate::solver::{FmSolver, SymStates};

fn p(text: &str) -> Poly {
    parse_poly(text).expect("polynomial parses")
}

fn eqt(text: &str) -> Inv {
    Inv::eqt(p(text)).expect("valid equality")
}

fn oct(text: &str, bound: i64) -> Inv {
    Inv::oct(p(text), bound).expect("valid octagon")
}

fn traces(vars: &[&str], rows: &[&[i64]]) -> Traces {
    let mut t = Traces::new(Symbs::new(vars.iter().copied()));
    for row in rows {
        t.add("L", row.to_vec()).expect("arity matches");
    }
    t
}

fn settings() -> Settings {
    Settings {
        do_mp: false,
        ..Settings::default()
    }
}

fn mmp(op: MinMaxOp, lhs_first: bool, bound: i64) -> Inv {
    let term = MinMaxTerm {
        op,
        lhs: "a".to_string(),
        args: vec!["b".to_string(), "c".to_string()],
        lhs_first,
    };
    Inv::mmp_bound(term, bound).expect("two arguments")
}

// -- Construction --

#[test]
fn test_malformed_payloads_are_rejected() {
    assert!(matches!(Inv::eqt(Poly::from_int(3)), Err(InvError::Trivial(_))));
    assert!(matches!(
        Inv::eqt_rel(p("x"), p("1")),
        Err(InvError::NonZeroRhs(_))
    ));
    assert!(matches!(
        Inv::congruence(p("x"), 1, 0),
        Err(InvError::Modulus(1))
    ));
    assert!(matches!(
        Inv::mmp_eq(MinMaxOp::Max, "a".into(), vec!["b".into()]),
        Err(InvError::MinMaxArity { got: 1, .. })
    ));
    assert_eq!(Inv::nested_array("  "), Err(InvError::EmptyArrayRel));
}

#[test]
fn test_congruence_residue_is_normalized() {
    let inv = Inv::congruence(p("x"), 4, -1).expect("valid");
    assert_eq!(inv.to_string(), "x % 4 == 3");
}

#[test]
fn test_identity_ignores_status() {
    let a = eqt("y - 2*x");
    let b = eqt("4*x - 2*y").with_stat(Stat::Proved);
    assert_eq!(a, b);
    let mut invs = Invs::new();
    assert!(invs.add(a));
    assert!(!invs.add(b));
    assert_eq!(invs.len(), 1);
}

#[test]
fn test_rendering() {
    assert_eq!(eqt("y - 2*x").to_string(), "y - 2*x == 0");
    assert_eq!(oct("x", 5).to_string(), "x <= 5");
    assert_eq!(mmp(MinMaxOp::Max, true, 0).to_string(), "a - max(b, c) <= 0");
    assert_eq!(mmp(MinMaxOp::Min, false, 2).to_string(), "min(b, c) - a <= 2");
    let eq = Inv::mmp_eq(MinMaxOp::Max, "a".into(), vec!["b".into(), "c".into()]).expect("valid");
    assert_eq!(eq.to_string(), "a == max(b, c)");
    let c = Inv::congruence(p("x + y"), 3, 1).expect("valid");
    assert_eq!(c.to_string(), "(y + x) % 3 == 1");
    assert_eq!(Inv::false_inv().to_string(), "False");
}

#[test]
fn test_dinvs_display() {
    let mut d = DInvs::new();
    d.add("L", oct("x", 10));
    d.add("L", eqt("y - 2*x"));
    d.add("L", oct("-x", 0));
    insta::assert_snapshot!(d.to_string(), @r"
    L (3 invs):
    1. y - 2*x == 0
    2. -x <= 0
    3. x <= 10
    ");
}

// -- Trace testing --

#[test]
fn test_single_trace() {
    let t = traces(&["x", "y"], &[&[1, 2], &[3, 5], &[2_000_000_000, 0]]);
    let rows: Vec<_> = t.iter().collect();
    let inv = eqt("y - 2*x");
    assert!(inv.test_single_trace(&rows[0], 1_000_000_000));
    assert!(!inv.test_single_trace(&rows[1], 1_000_000_000));
    // too large to test
    assert!(inv.test_single_trace(&rows[2], 1_000_000_000));
    assert!(!Inv::false_inv().test_single_trace(&rows[0], 1_000_000_000));
}

#[test]
fn test_minmax_trace_semantics() {
    let t = traces(&["a", "b", "c"], &[&[5, 5, 3], &[7, 2, 7]]);
    let eq = Inv::mmp_eq(MinMaxOp::Max, "a".into(), vec!["b".into(), "c".into()]).expect("valid");
    assert!(eq.test(&t, 1000));
    assert!(mmp(MinMaxOp::Max, true, 0).test(&t, 1000));
    assert!(!mmp(MinMaxOp::Min, true, 0).test(&t, 1000));
    let f = eq.to_formula().expect("has a formula");
    let lookup = |v: &str| match v {
        "a" => Some(4),
        "b" => Some(4),
        "c" => Some(1),
        _ => None,
    };
    assert_eq!(f.eval(&lookup), Some(true));
}

#[test]
fn test_dinvs_test_keeps_untraced_locations() {
    let mut d = DInvs::new();
    d.add("L", eqt("y - 2*x"));
    d.add("L", oct("x", 1));
    d.add("M", oct("z", 0));
    let mut dt = DTraces::new();
    dt.insert("L", traces(&["x", "y"], &[&[1, 2], &[2, 4]]))
        .expect("inserts");
    let kept = d.test(&dt, &settings()).expect("tests");
    assert_eq!(kept.siz(), 2);
    assert!(kept.get("L").is_some_and(|i| i.contains(&eqt("y - 2*x"))));
    assert!(kept.get("M").is_some());
}

proptest::proptest! {
    #[test]
    fn prop_test_is_conjunction_of_single_traces(
        rows in proptest::collection::vec((-50i64..50, -50i64..50), 0..30),
        bound in -60i64..60,
    ) {
        let mut t = Traces::new(Symbs::new(["x", "y"]));
        for (x, y) in rows {
            t.add("L", vec![x, y]).expect("arity matches");
        }
        let inv = oct("x + y", bound);
        let each = t.iter().all(|tr| inv.test_single_trace(&tr, 1000));
        proptest::prop_assert_eq!(inv.test(&t, 1000), each);
    }
}

// -- Merge and update --

#[test]
fn test_merge_disproved_wins() {
    let mut a = DInvs::new();
    a.add("L", eqt("x - 1").with_stat(Stat::Proved));
    let mut b = DInvs::new();
    b.add("L", eqt("x - 1").with_stat(Stat::Disproved));
    b.add("L", oct("x", 3));

    let mut ab = a.clone();
    ab.merge(&b);
    let mut ba = b.clone();
    ba.merge(&a);
    for merged in [ab, ba] {
        assert!(!merged.get("L").is_some_and(|i| i.contains(&eqt("x - 1"))));
        assert!(merged.get("L").is_some_and(|i| i.contains(&oct("x", 3))));
    }
}

fn with_stat(inv: Inv, k: u8) -> Inv {
    match k % 4 {
        0 => inv,
        1 => inv.with_stat(Stat::Proved),
        2 => inv.with_stat(Stat::Disproved),
        _ => inv.with_stat(Stat::Unknown),
    }
}

proptest::proptest! {
    #[test]
    fn prop_merge_never_keeps_a_disproof(
        left in proptest::collection::vec(0u8..4, 4),
        right in proptest::collection::vec(0u8..4, 4),
    ) {
        let pool = [eqt("x - 1"), eqt("y - 2*x"), oct("x", 3), oct("x + y", 7)];
        let mut a = DInvs::new();
        let mut b = DInvs::new();
        for (inv, (l, r)) in pool.iter().zip(left.iter().zip(&right)) {
            a.add("L", with_stat(inv.clone(), *l));
            b.add("L", with_stat(inv.clone(), *r));
        }
        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        for (inv, (l, r)) in pool.iter().zip(left.iter().zip(&right)) {
            let disproved = l % 4 == 2 || r % 4 == 2;
            for merged in [&ab, &ba] {
                let present = merged.get("L").is_some_and(|i| i.contains(inv));
                proptest::prop_assert_eq!(present, !disproved, "{}", inv);
            }
        }
    }
}

#[test]
fn test_merge_prefers_definitive_status() {
    let mut a = DInvs::new();
    a.add("L", oct("x", 3).with_stat(Stat::Unknown));
    let mut b = DInvs::new();
    b.add("L", oct("x", 3).with_stat(Stat::Proved));
    a.merge(&b);
    let inv = a.get("L").and_then(|i| i.get(&oct("x", 3))).cloned();
    assert_eq!(inv.and_then(|i| i.stat()), Some(Stat::Proved));
}

#[test]
fn test_update_delta_and_carried_status() {
    let mut prior = DInvs::new();
    prior.add("L", eqt("y - 2*x").with_stat(Stat::Proved));
    prior.add("L", oct("x", 10).with_stat(Stat::Unknown));

    let mut new = DInvs::new();
    new.add("L", eqt("y - 2*x"));
    new.add("L", oct("x", 10).with_stat(Stat::Proved));
    new.add("L", oct("-x", 0));

    let delta = new.update(&mut prior);
    let d = delta.get("L").expect("changes at L");
    assert_eq!(d.len(), 2);
    assert!(d.contains(&oct("x", 10)) && d.contains(&oct("-x", 0)));

    let carried = new.get("L").and_then(|i| i.get(&eqt("y - 2*x"))).cloned();
    assert_eq!(carried.and_then(|i| i.stat()), Some(Stat::Proved));
    assert_eq!(prior, new);
}

// -- Simplification --

fn simplify_one(invs: Vec<Inv>) -> Result<Invs, InferError> {
    let prover = FmSolver::default();
    let mut stats = SolverStats::default();
    invs.into_iter()
        .collect::<Invs>()
        .cinvs(&settings())
        .simplify("L", &prover, &settings(), &mut stats)
}

#[test]
fn test_classify_buckets() {
    let invs: Invs = vec![
        eqt("y - 2*x"),
        eqt("y - 100*x"),
        oct("x", 3),
        oct("x + y", 3),
        mmp(MinMaxOp::Max, true, 0),
        Inv::congruence(p("x"), 2, 1).expect("valid"),
        Inv::nested_array("A[i] = B[i]").expect("valid"),
        Inv::false_inv(),
    ]
    .into_iter()
    .collect();
    let c = invs.cinvs(&settings());
    assert_eq!(c.eqts.len(), 1);
    assert_eq!(c.eqts_largecoefs.len(), 1);
    assert_eq!(c.octs.len(), 2);
    assert_eq!(c.mps.len(), 1);
    assert_eq!(c.congruences.len(), 1);
    assert_eq!(c.nested_arrays.len(), 1);
    assert_eq!(c.falseinvs.len(), 1);
}

#[test]
fn test_simplify_removes_implied() {
    let out = simplify_one(vec![
        eqt("y - x"),
        eqt("z - y"),
        eqt("z - x"),
        oct("x", 5),
        oct("x", 7),
        oct("y", 5),
        oct("x + y", 10),
        Inv::nested_array("A[i] = B[i]").expect("valid"),
    ])
    .expect("simplifies");
    assert_eq!(out.iter().filter(|i| i.kind() == InvKind::Eqt).count(), 2);
    assert!(out.contains(&oct("x", 5)));
    assert!(!out.contains(&oct("x", 7)));
    assert!(!out.contains(&oct("x + y", 10)));
    assert!(out.contains(&Inv::nested_array("A[i] = B[i]").expect("valid")));
}

#[test]
fn test_simplify_is_idempotent() {
    let once = simplify_one(vec![
        eqt("y - 2*x"),
        oct("x", 10),
        oct("-x", 0),
        oct("y", 20),
        oct("x - y", 0),
    ])
    .expect("simplifies");
    let twice = simplify_one(once.iter().cloned().collect()).expect("simplifies");
    assert_eq!(once.len(), twice.len());
    assert!(once.iter().all(|i| twice.contains(i)));
}

#[test]
fn test_simplify_drops_products_of_equalities() {
    let out = simplify_one(vec![
        eqt("y - 2*x"),
        eqt("2*x^2 - x*y"),
        eqt("y^2 - 2*x*y"),
        eqt("64*x^7 - x*y^6"),
        eqt("z - 100*x"),
    ])
    .expect("simplifies");
    assert_eq!(out.len(), 2);
    assert!(out.contains(&eqt("y - 2*x")));
    assert!(out.contains(&eqt("z - 100*x")));
}

fn holds_at(inv: &Inv, x: i64, y: i64) -> bool {
    let lookup = |v: &str| match v {
        "x" => Some(x),
        "y" => Some(y),
        _ => None,
    };
    inv.to_formula()
        .and_then(|f| f.eval(&lookup))
        .unwrap_or(true)
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(64))]

    #[test]
    fn prop_simplify_drops_only_implied(
        picks in proptest::collection::vec((0usize..6, -8i64..8), 1..8),
        with_eqt in proptest::bool::ANY,
    ) {
        let terms = ["x", "-x", "y", "-y", "x + y", "x - y"];
        let mut invs: Vec<Inv> = picks.iter().map(|&(t, b)| oct(terms[t], b)).collect();
        if with_eqt {
            invs.push(eqt("y - 2*x"));
        }
        let kept = simplify_one(invs.clone()).expect("simplifies");
        for x in -20i64..=20 {
            for y in -20i64..=20 {
                if !kept.iter().all(|i| holds_at(i, x, y)) {
                    continue;
                }
                for dropped in invs.iter().filter(|i| !kept.contains(i)) {
                    proptest::prop_assert!(
                        holds_at(dropped, x, y),
                        "{} dropped but fails at ({}, {})", dropped, x, y
                    );
                }
            }
        }
    }
}

#[test]
fn test_simplify_merges_minmax_pairs() {
    let out = simplify_one(vec![mmp(MinMaxOp::Max, true, 0), mmp(MinMaxOp::Max, false, 0)])
        .expect("simplifies");
    let eq = Inv::mmp_eq(MinMaxOp::Max, "a".into(), vec!["b".into(), "c".into()]).expect("valid");
    assert_eq!(out.len(), 1);
    assert!(out.contains(&eq));
}

#[test]
fn test_simplify_rejects_false() {
    assert!(matches!(
        simplify_one(vec![Inv::false_inv(), oct("x", 1)]),
        Err(InferError::Inv(InvError::FalseInSimplify(_)))
    ));
}

#[test]
fn test_dinvs_simplify_drops_empty_locations() {
    let mut d = DInvs::new();
    d.add("L", oct("x", 1));
    d.add("L", oct("x", 2));
    d.0.insert("M".to_string(), Invs::new());
    let (out, stats) = d
        .simplify(&FmSolver::default(), &settings())
        .expect("simplifies");
    assert_eq!(out.siz(), 1);
    assert!(out.get("M").is_none());
    assert!(stats.implications > 0);
}

// -- Equalities from traces --

#[test]
fn test_eqt_from_traces() {
    let t = traces(&["x", "y"], &[&[1, 2], &[2, 4], &[3, 6]]);
    let invs = eqt::gen_from_traces(1, &t, &settings());
    assert_eq!(invs.len(), 1);
    let inv = invs.iter().next().expect("one equality");
    assert_eq!(inv.to_string(), "y - 2*x == 0");
    assert_eq!(inv.stat(), Some(Stat::Unknown));
}

#[test]
fn test_eqt_from_too_few_traces() {
    let t = traces(&["x", "y"], &[&[1, 2], &[2, 4]]);
    assert!(eqt::gen_from_traces(1, &t, &settings()).is_empty());
}

#[test]
fn test_eqt_from_traces_reduces_degree() {
    let rows: Vec<Vec<i64>> = (0..8).map(|x| vec![x, 3 * x + 1]).collect();
    let refs: Vec<&[i64]> = rows.iter().map(Vec::as_slice).collect();
    let t = traces(&["x", "y"], &refs);
    let invs = eqt::gen_from_traces(3, &t, &settings());
    assert!(invs.contains(&eqt("y - 3*x - 1")));
}

#[test]
fn test_eqt_from_traces_rechecks_every_trace() {
    // the first five rows fit y == x, the sixth does not
    let t = traces(
        &["x", "y"],
        &[&[0, 0], &[1, 1], &[2, 2], &[3, 3], &[4, 4], &[5, 7]],
    );
    assert!(eqt::gen_from_traces(1, &t, &settings()).is_empty());
}

// -- Bounds from traces --

#[test]
fn test_oct_terms() {
    let terms = opt::oct_terms(&Symbs::new(["x", "y"]), 1, 2, 1);
    assert_eq!(terms.len(), 8);
    assert!(terms.contains(&p("x - y")));
    assert!(terms.contains(&p("-x")));
}

#[test]
fn test_minmax_terms() {
    let terms = opt::minmax_terms(&Symbs::new(["a", "b", "c"]));
    assert_eq!(terms.len(), 12);
}

#[test]
fn test_filter_terms() {
    let inps = Symbs::new(["x", "y"]);
    let terms = vec![p("x"), p("x + y"), p("x + z")];
    let kept = opt::filter_terms(terms, &inps, None, 128);
    assert_eq!(kept, vec![p("x"), p("x + z")]);

    let t = traces(&["x", "z"], &[&[1, 200], &[2, 3]]);
    let kept = opt::filter_terms(vec![p("x"), p("x + z")], &Symbs::default(), Some(&t), 128);
    assert_eq!(kept, vec![p("x")]);
}

#[test]
fn test_bounds_from_traces() {
    let t = traces(&["x", "y"], &[&[10, 40], &[25, 25], &[1, 2], &[200, -200]]);
    let invs = opt::gen_from_traces(&[p("x + y"), p("x"), p("-y")], &t, 128);
    // max x and max -y are 200, outside [-128, 128]
    assert_eq!(invs.len(), 1);
    let inv = invs.get(&oct("x + y", 50)).expect("x + y <= 50");
    assert_eq!(inv.stat(), Some(Stat::Unknown));
}

// -- Congruences --

#[test]
fn test_congruence_from_traces() {
    let t = traces(&["x", "y"], &[&[1, 0], &[5, 0], &[9, 1]]);
    let invs = congruence::gen_from_traces(&t, &settings());
    assert!(invs.contains(&Inv::congruence(p("x"), 4, 1).expect("valid")));
    // y has two distinct values only
    assert!(!invs
        .iter()
        .any(|i| matches!(i.payload(), Payload::Congruence { term, .. } if *term == p("y"))));
}

// -- Oracle-backed engines --

fn oracle() -> SymStates {
    let mut ss = SymStates::new(Symbs::new(["x"]), FmSolver::default());
    ss.add_path("L", &Symbs::new(["x", "y"]), &["0 <= x", "x <= 10", "y == 2*x"])
        .expect("path parses");
    ss
}

fn doubler() -> Prog {
    let exe = FnExecutor::new(|inps: &[i64]| {
        let x = inps[0];
        vec![(
            "L".to_string(),
            vec![("x".to_string(), x), ("y".to_string(), 2 * x)],
        )]
    });
    Prog::new(Box::new(exe), Symbs::new(["x"]), 10, false)
}

#[test]
fn test_cegir_equalities() {
    let ss = oracle();
    let prog = doubler();
    let s = settings();
    let found = eqt::EqtInfer::new(&ss, &prog, &s)
        .gen(1, &mut StdRng::seed_from_u64(0))
        .expect("infers");
    let invs = found.dinvs.get("L").expect("equalities at L");
    let inv = invs.get(&eqt("y - 2*x")).expect("y == 2x found");
    assert_eq!(inv.stat(), Some(Stat::Proved));
    assert!(found.dtraces.get("L").is_some_and(|t| t.len() >= 5));
    assert!(found.stats.checks >= 1);
    assert!(found.traces_secs > 0.0);
}

#[test]
fn test_cegir_without_new_traces_yields_nothing() {
    // every input reports the same state, so no template can be solved
    let exe = FnExecutor::new(|_: &[i64]| {
        vec![(
            "L".to_string(),
            vec![("x".to_string(), 0), ("y".to_string(), 0)],
        )]
    });
    let prog = Prog::new(Box::new(exe), Symbs::new(["x"]), 10, false);
    let ss = oracle();
    let s = settings();
    let found = eqt::EqtInfer::new(&ss, &prog, &s)
        .gen(1, &mut StdRng::seed_from_u64(1))
        .expect("infers");
    assert!(found.dinvs.is_empty());
    assert_eq!(found.dtraces.siz(), 1);
}

#[test]
fn test_optimized_bounds() {
    let ss = oracle();
    let s = settings();
    let found = opt::OptInfer::new(&ss, &s).gen_octs().expect("infers");
    let invs = found.dinvs.get("L").expect("bounds at L");
    let bound = |t: &str| {
        invs.iter().find_map(|i| match i.payload() {
            Payload::Oct { term, bound } if *term == p(t) => Some(*bound),
            _ => None,
        })
    };
    assert_eq!(bound("x + y"), Some(30));
    assert_eq!(bound("y"), Some(20));
    assert_eq!(bound("-x"), Some(0));
    assert!(invs.iter().all(Inv::is_proved));
}
