use super::*;

use std::collections::BTreeMap;

fn square_keyed(batch: Vec<u32>) -> Vec<(u32, u64)> {
    batch.into_iter().map(|t| (t, (t as u64) * (t as u64))).collect()
}

#[test]
fn test_empty_tasks() {
    let out = run_mp("empty", Vec::<u32>::new(), square_keyed, true).expect("runs");
    assert!(out.is_empty());
}

#[test]
fn test_sequential_and_parallel_agree() {
    let tasks: Vec<u32> = (0..37).collect();
    let seq: BTreeMap<u32, u64> = run_mp("seq", tasks.clone(), square_keyed, false)
        .expect("runs")
        .into_iter()
        .collect();
    let par: BTreeMap<u32, u64> = run_mp("par", tasks, square_keyed, true)
        .expect("runs")
        .into_iter()
        .collect();
    assert_eq!(seq, par);
    assert_eq!(seq.len(), 37);
    assert_eq!(seq[&6], 36);
}

#[test]
fn test_sequential_sees_one_batch() {
    let out = run_mp("count", vec![1, 2, 3], |b: Vec<i32>| vec![b.len()], false).expect("runs");
    assert_eq!(out, vec![3]);
}

#[test]
fn test_panicking_batch_fails_whole_call() {
    let tasks: Vec<u32> = (0..16).collect();
    let f = |batch: Vec<u32>| {
        if batch.contains(&7) {
            panic!("task 7 exploded");
        }
        square_keyed(batch)
    };
    let err = run_mp("boom", tasks.clone(), f, true).unwrap_err();
    assert_eq!(err.name, "boom");
    assert!(err.message.contains("task 7"));
    assert!(run_mp("boom", tasks, f, false).is_err());
}
