//! Task runner: a parallel map over independent tasks.
//!
//! Tasks are grouped into batches and a batch function is applied to each
//! batch, either on the current thread or on the rayon pool. The batch
//! function is expected to return results tagged with their task key, so
//! callers never rely on positional association.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{debug, warn};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: worker batch failed: {message}")]
pub struct RunnerError {
    pub name: String,
    pub message: String,
}

/// Apply `f` to `tasks` in batches.
///
/// With `do_mp` the tasks are split into `min(len, threads)` strided
/// batches run on the rayon pool; otherwise `f` sees all tasks in one
/// batch. A panicking batch fails the whole call; no partial results are
/// returned.
pub fn run_mp<T, R, F>(name: &str, tasks: Vec<T>, f: F, do_mp: bool) -> Result<Vec<R>, RunnerError>
where
    T: Send,
    R: Send,
    F: Fn(Vec<T>) -> Vec<R> + Sync,
{
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let ntasks = tasks.len();
    if !do_mp || ntasks == 1 {
        debug!("{}: running {} tasks sequentially", name, ntasks);
        return catch_unwind(AssertUnwindSafe(|| f(tasks))).map_err(|e| failed(name, e));
    }

    let nbatches = ntasks.min(rayon::current_num_threads()).max(1);
    let mut batches: Vec<Vec<T>> = (0..nbatches).map(|_| Vec::new()).collect();
    for (i, task) in tasks.into_iter().enumerate() {
        batches[i % nbatches].push(task);
    }
    debug!("{}: running {} tasks in {} batches", name, ntasks, nbatches);

    let outcomes: Vec<Result<Vec<R>, Box<dyn Any + Send>>> = batches
        .into_par_iter()
        .map(|batch| catch_unwind(AssertUnwindSafe(|| f(batch))))
        .collect();

    let mut results = Vec::new();
    for outcome in outcomes {
        results.extend(outcome.map_err(|e| failed(name, e))?);
    }
    Ok(results)
}

fn failed(name: &str, payload: Box<dyn Any + Send>) -> RunnerError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    };
    warn!("{}: worker batch panicked: {}", name, message);
    RunnerError {
        name: name.to_string(),
        message,
    }
}
