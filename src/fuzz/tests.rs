use super::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::infer::Inv;
use crate::poly::parse_poly;

fn p(text: &str) -> Poly {
    parse_poly(text).expect("parses")
}

fn samples() -> (Vec<Vec<i64>>, Vec<Vec<i64>>) {
    let xs = (1..=6).map(|i| vec![i, 10 * i]).collect();
    let ys = (1..=6).map(|i| vec![2 * i]).collect();
    (xs, ys)
}

#[test]
fn test_samples_to_dtraces() {
    let (xs, ys) = samples();
    let d = samples_to_dtraces(&xs, &ys, &[3, 7]).expect("converts");
    let traces = d.get(LOC).expect("one location");
    assert_eq!(traces.vars(), &Symbs::new(["x_3", "x_7", "y_0"]));
    assert_eq!(traces.len(), 6);
    assert_eq!(traces.iter().next().map(|t| t.values().to_vec()), Some(vec![1, 10, 2]));
}

#[test]
fn test_samples_errors() {
    let (xs, ys) = samples();
    assert!(matches!(
        samples_to_dtraces(&xs, &ys[..2], &[3, 7]),
        Err(FuzzError::SampleCount { xs: 6, ys: 2 })
    ));
    assert!(matches!(
        samples_to_dtraces(&xs, &ys, &[3]),
        Err(FuzzError::Trace(_))
    ));
    let empty = samples_to_dtraces(&[], &[], &[3]).expect("converts");
    assert!(empty.is_empty());
}

#[test]
fn test_infer_from_samples() {
    let (xs, ys) = samples();
    let s = Settings {
        do_mp: false,
        ..Settings::default()
    };
    let dinvs = infer_from_samples(&xs, &ys, &[3, 7], &s, 0).expect("infers");
    let invs = dinvs.get(LOC).expect("invariants");
    assert!(invs.contains(&Inv::eqt(p("x_7 - 10*x_3")).expect("valid")));
    assert!(invs.contains(&Inv::eqt(p("y_0 - 2*x_3")).expect("valid")));

    let none = infer_from_samples(&[], &[], &[3, 7], &s, 0).expect("infers");
    assert!(none.is_empty());
}

fn fixed_invs() -> DInvs {
    let mut d = DInvs::new();
    d.add(LOC, Inv::oct(p("x_0"), 100).expect("valid"));
    d.add(LOC, Inv::oct(p("-x_0"), -3).expect("valid"));
    d.add(LOC, Inv::eqt(p("x_1 - 7")).expect("valid"));
    d.add(LOC, Inv::congruence(p("x_2"), 64, 5).expect("valid"));
    d.add(LOC, Inv::eqt(p("x_0 - x_1")).expect("valid"));
    d
}

#[test]
fn test_targets() {
    let t = targets(&fixed_invs(), 0, 255);
    assert_eq!(t["x_0"], vec![2, 3, 100, 101]);
    assert_eq!(t["x_1"], vec![6, 7, 8]);
    assert_eq!(t["x_2"], vec![5, 69, 133, 197]);
    assert_eq!(t.len(), 3);
}

#[test]
fn test_mutate() {
    let mut buf = vec![0u8; 4];
    let mut rng = StdRng::seed_from_u64(0);
    let always = Mutator { rate: 1.0 };
    let n = always.mutate(&mut buf, &[0, 1, 2, 3, 9], &fixed_invs(), &mut rng);
    assert_eq!(n, 3);
    assert!([2, 3, 100, 101].contains(&buf[0]));
    assert!([6, 7, 8].contains(&buf[1]));
    assert_eq!(buf[2] % 64, 5);
    assert_eq!(buf[3], 0);

    let mut untouched = vec![0u8; 4];
    let never = Mutator { rate: 0.0 };
    assert_eq!(never.mutate(&mut untouched, &[0, 1, 2], &fixed_invs(), &mut rng), 0);
    assert_eq!(untouched, vec![0u8; 4]);
}

#[test]
fn test_mutate_with_non_finite_rate() {
    let mut rng = StdRng::seed_from_u64(0);
    for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let mut buf = vec![0u8; 4];
        let m = Mutator { rate };
        assert_eq!(m.mutate(&mut buf, &[0, 1, 2], &fixed_invs(), &mut rng), 0);
        assert_eq!(buf, vec![0u8; 4]);
    }
}
