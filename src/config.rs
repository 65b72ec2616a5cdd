//! Engine configuration.

use crate::decimal::Money;

/// What to do with a consumer whose demand exceeds prior supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderfundedPolicy {
    /// Link what is available and record a warning.
    #[default]
    Flag,
    /// Reject the customer's whole partition.
    Reject,
}

/// Knobs for a matching run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on transactions held in one invocation.
    pub max_transactions: Option<usize>,

    /// Worker count for the matching pool. `None` uses rayon's global pool.
    pub threads: Option<usize>,

    pub underfunded: UnderfundedPolicy,

    /// Largest balance disagreement tolerated before a mismatch is flagged.
    pub tolerance: Money,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_transactions: None,
            threads: None,
            underfunded: UnderfundedPolicy::Flag,
            tolerance: Money::from_cents(1),
        }
    }
}
