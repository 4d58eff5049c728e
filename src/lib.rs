pub mod alg;
pub mod config;
pub mod data;
pub mod fuzz;
pub mod infer;
pub mod poly;
pub mod report;
pub mod runner;
pub mod solver;

// Re-exports: the entry points most callers need
pub use alg::{DigError, DigSymStates, DigTraces, RunOutput};
pub use config::Settings;
pub use data::{DTraces, Prog};
pub use infer::{DInvs, Inv, Invs, Stat};
pub use report::RunResult;
