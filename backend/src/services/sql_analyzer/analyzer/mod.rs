//! Rule evaluation engines
//!
//! Sequential, deterministic evaluation: the static engine applies text
//! rules in registration order, the plan engine walks the tree pre-order
//! and applies every rule at every node. A failing rule is contained at
//! its single call site and logged; everything else keeps running.

pub mod rule_engine;
pub mod static_engine;

pub use rule_engine::PlanRuleEngine;
pub use static_engine::StaticAnalyzer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag.
///
/// Engines check it between rule and node evaluations, so a caller-imposed
/// timeout can abort a pathological regex or an oversized plan tree
/// without unbounded blocking. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
