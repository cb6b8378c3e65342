pub mod concall_sync;

pub use concall_sync::{run, RunOptions, RunSummary};
