//! ID prefix constants.
//!
//! Every persisted record gets a prefixed random hex ID, e.g. `job-3fa81c02b9d4`.
//! The prefix makes IDs self-describing in logs and support tooling.

pub const PREFIX_LICENSE: &str = "lic";
pub const PREFIX_SYNC_JOB: &str = "job";
pub const PREFIX_QUEUE_ITEM: &str = "qit";
pub const PREFIX_CHECKPOINT: &str = "chk";

/// All prefixes in use, for exhaustive tests.
pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_LICENSE,
    PREFIX_SYNC_JOB,
    PREFIX_QUEUE_ITEM,
    PREFIX_CHECKPOINT,
];
