//! Reconciliation comparison settings.

use serde::{Deserialize, Serialize};

const fn default_ignore_case() -> bool {
    true
}

const fn default_max_discrepancies() -> u32 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconciliationConfig {
    /// Compare string fields case-insensitively.
    #[serde(default = "default_ignore_case")]
    pub ignore_case: bool,

    /// Field names excluded from field-level comparison (e.g. timestamps the
    /// regulator rewrites).
    #[serde(default)]
    pub ignored_fields: Vec<String>,

    /// Cap on discrepancy details listed per entity type.
    #[serde(default = "default_max_discrepancies")]
    pub max_discrepancies_per_type: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            ignore_case: default_ignore_case(),
            ignored_fields: Vec::new(),
            max_discrepancies_per_type: default_max_discrepancies(),
        }
    }
}
