use super::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::poly::init_terms;

fn xy() -> Symbs {
    Symbs::new(["x", "y"])
}

fn traces(rows: &[(i64, i64)]) -> Traces {
    let mut t = Traces::new(xy());
    for &(x, y) in rows {
        t.add("L", vec![x, y]).expect("arity matches");
    }
    t
}

// -- Traces --

#[test]
fn test_trace_lookup() {
    let t = traces(&[(1, 2)]);
    let tr = t.iter().next().expect("one trace");
    assert_eq!(tr.get("x"), Some(1));
    assert_eq!(tr.get("y"), Some(2));
    assert_eq!(tr.get("z"), None);
}

#[test]
fn test_add_deduplicates_and_checks_arity() {
    let mut t = traces(&[(1, 2)]);
    assert!(!t.add("L", vec![1, 2]).expect("ok"));
    assert!(t.add("L", vec![2, 4]).expect("ok"));
    assert_eq!(t.len(), 2);
    assert!(matches!(
        t.add("L", vec![1]),
        Err(TraceError::Arity { expected: 2, got: 1, .. })
    ));
}

#[test]
fn test_merge_returns_only_new() {
    let mut a = traces(&[(1, 2), (2, 4)]);
    let b = traces(&[(2, 4), (3, 6)]);
    let new = a.merge("L", &b).expect("same vars");
    assert_eq!(new.len(), 1);
    assert_eq!(a.len(), 3);
    let other = Traces::new(Symbs::new(["z"]));
    assert!(a.merge("L", &other).is_err());
}

#[test]
fn test_extract_pads_missing_with_zero() {
    let mut m = Model::new();
    m.insert("y".to_string(), 7);
    let t = Traces::extract(&[m], &xy());
    let row: Vec<i64> = t.iter().next().expect("one").values().to_vec();
    assert_eq!(row, vec![0, 7]);
}

#[test]
fn test_instantiate_distinct_rows_with_limit() {
    let t = traces(&[(1, 2), (2, 4), (3, 6)]);
    let tmpl = init_terms(xy().names(), 1, 1.5);
    let rows = t.instantiate(&tmpl, None);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec![BigInt::from(1), BigInt::from(1), BigInt::from(2)]);
    assert_eq!(t.instantiate(&tmpl, Some(2)).len(), 2);
}

// -- Trace store --

#[test]
fn test_parse_store() {
    let text = "# header\nvtrace1; I x; I y\n\nvtrace1; 1; 2\nvtrace1; 2; 4\nvtrace2; I n\nvtrace2; -5\n";
    let d = DTraces::parse(text).expect("parses");
    assert_eq!(d.siz(), 3);
    assert_eq!(d.get("vtrace1").map(|t| t.len()), Some(2));
    assert_eq!(
        d.get("vtrace2").map(|t| t.vars().names().to_vec()),
        Some(vec!["n".to_string()])
    );
}

#[test]
fn test_parse_store_errors() {
    assert!(matches!(
        DTraces::parse("vtrace1; 1; 2"),
        Err(TraceError::Undeclared { line: 1, .. })
    ));
    assert!(matches!(
        DTraces::parse("vtrace1; I x\nvtrace1; 1; 2"),
        Err(TraceError::Arity { .. })
    ));
    assert!(matches!(
        DTraces::parse("vtrace1; D x"),
        Err(TraceError::Syntax { line: 1, .. })
    ));
    assert!(matches!(
        DTraces::parse("vtrace1; I x\nvtrace1; abc"),
        Err(TraceError::Syntax { line: 2, .. })
    ));
}

#[test]
fn test_render_store() {
    let mut d = DTraces::new();
    d.insert("vtrace1", traces(&[(1, 2), (2, 4)])).expect("inserts");
    insta::assert_snapshot!(d.render(), @r"
    vtrace1; I x; I y
    vtrace1; 1; 2
    vtrace1; 2; 4
    ");
}

#[test]
fn test_vwrite_vread_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("traces.tcs");
    let mut d = DTraces::new();
    d.insert("L", traces(&[(3, -1), (0, 0)])).expect("inserts");
    d.vwrite(&path).expect("writes");
    assert_eq!(DTraces::vread(&path).expect("reads"), d);
}

#[test]
fn test_dtraces_merge_new_only() {
    let mut a = DTraces::new();
    a.insert("L", traces(&[(1, 2)])).expect("inserts");
    let mut b = DTraces::new();
    b.insert("L", traces(&[(1, 2), (5, 10)])).expect("inserts");
    b.insert("M", traces(&[(0, 0)])).expect("inserts");
    let new = a.merge(&b).expect("merges");
    assert_eq!(new.siz(), 2);
    assert_eq!(a.siz(), 3);
    assert!(a.merge(&b).expect("merges").is_empty());
}

proptest::proptest! {
    #[test]
    fn prop_store_round_trip(
        rows in proptest::collection::vec((-1000i64..1000, -1000i64..1000, -1000i64..1000), 0..20)
    ) {
        let vars = Symbs::new(["b", "a", "c"]);
        let mut t = Traces::new(vars.clone());
        for (a, b, c) in rows {
            t.add("loc", vec![a, b, c]).expect("arity matches");
        }
        let mut d = DTraces::new();
        d.insert("loc", t).expect("inserts");
        let back = DTraces::parse(&d.render()).expect("parses");
        proptest::prop_assert_eq!(back, d);
    }
}

// -- Inputs --

#[test]
fn test_inps_merge_models() {
    let mut inps = Inps::new();
    let mut m = Model::new();
    m.insert("x".to_string(), 4);
    m.insert("y".to_string(), 9);
    let new = inps.merge_models(&[m.clone(), m], &Symbs::new(["x", "n"]));
    assert_eq!(new.len(), 1);
    assert!(inps.contains(&[4, 0]));
}

#[test]
fn test_inps_merge_rows_reports_new() {
    let mut inps: Inps = vec![vec![1], vec![2]].into_iter().collect();
    let new = inps.merge_rows(vec![vec![2], vec![3]]);
    assert_eq!(new.len(), 1);
    assert_eq!(inps.len(), 3);
}

// -- Programs --

fn doubler() -> Prog {
    let exe = FnExecutor::new(|inps: &[i64]| {
        let x = inps[0];
        vec![(
            "vtrace1".to_string(),
            vec![("x".to_string(), x), ("y".to_string(), 2 * x)],
        )]
    });
    Prog::new(Box::new(exe), Symbs::new(["x"]), 300, false)
}

#[test]
fn test_gen_rand_inps_is_seeded() {
    let prog = doubler();
    let a = prog.gen_rand_inps(&mut StdRng::seed_from_u64(7), 20);
    let b = prog.gen_rand_inps(&mut StdRng::seed_from_u64(7), 20);
    assert_eq!(a, b);
    assert_eq!(a.len(), 20);
    assert!(a.iter().all(|r| r[0].abs() <= 300));
}

#[test]
fn test_get_traces() {
    let prog = doubler();
    let inps: Inps = vec![vec![1], vec![2], vec![3]].into_iter().collect();
    let d = prog.get_traces(&inps).expect("runs");
    let t = d.get("vtrace1").expect("location traced");
    assert_eq!(t.len(), 3);
    assert!(t.iter().all(|tr| tr.get("y") == tr.get("x").map(|x| 2 * x)));
}

#[test]
fn test_get_traces_skips_failing_inputs() {
    struct Picky;
    impl Executor for Picky {
        fn run(&self, inps: &[i64]) -> Result<DTraces, ExecError> {
            if inps[0] < 0 {
                return Err(ExecError::Failed("negative".to_string()));
            }
            let mut d = DTraces::new();
            d.add("L", &Symbs::new(["x"]), vec![inps[0]])
                .map_err(|e| ExecError::Failed(e.to_string()))?;
            Ok(d)
        }
    }
    let prog = Prog::new(Box::new(Picky), Symbs::new(["x"]), 10, true);
    let inps: Inps = vec![vec![-1], vec![1], vec![2]].into_iter().collect();
    assert_eq!(prog.get_traces(&inps).expect("runs").siz(), 2);
}

#[test]
fn test_command_executor_missing_program() {
    let exe = CommandExecutor::new("/nonexistent/dig-test-program");
    assert!(matches!(exe.run(&[1]), Err(ExecError::Spawn { .. })));
}
