//! Analysis rules
//!
//! Two independent rule sets: static rules over raw SQL text and plan
//! rules over parsed EXPLAIN trees. Every rule is a pure predicate with a
//! fixed code, category and default severity; the active sets are the
//! explicit registration lists at the bottom of this module, so what runs
//! is closed and inspectable per build.

pub mod aggregate;
pub mod common;
pub mod join;
pub mod query;
pub mod scan;
pub mod sort;

use super::models::{
    ExplainRootPlan, PlanFinding, PlanNode, PlanRuleCode, RecommendationCategory, Severity,
    SqlQuery, StaticCheckFinding, StaticRuleCode,
};

// ============================================================================
// Rule traits
// ============================================================================

/// A check over raw SQL text.
pub trait StaticRule: Send + Sync {
    fn code(&self) -> StaticRuleCode;
    fn category(&self) -> RecommendationCategory;
    fn default_severity(&self) -> Severity;

    /// Evaluate the rule; `None` means the rule has no opinion.
    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding>;
}

/// A check over one plan node, with the root plan available as context.
///
/// Rules may read overall timings or settings from the root but must not
/// rely on traversal state; the engine calls them once per node.
pub trait PlanRule: Send + Sync {
    fn code(&self) -> PlanRuleCode;
    fn category(&self) -> RecommendationCategory;
    fn default_severity(&self) -> Severity;

    fn evaluate(&self, node: &PlanNode, root: &ExplainRootPlan) -> Option<PlanFinding>;
}

// ============================================================================
// Thresholds
// ============================================================================

/// Tunable limits used by the plan rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleThresholds {
    /// Fraction of rows a Seq Scan filter must discard before the scan is
    /// flagged as poorly selective.
    pub seq_scan_removed_fraction: f64,
    /// Estimated rows above which a sequential scan is "large".
    pub large_scan_rows: f64,
    /// Estimated rows above which a nested loop is "large".
    pub large_loop_rows: f64,
    /// Estimated rows above which a sort is "large".
    pub large_sort_rows: f64,
    /// Estimated rows above which an aggregate is "large".
    pub large_aggregate_rows: f64,
    /// actual/estimated above this ratio means underestimation.
    pub misestimate_under_ratio: f64,
    /// actual/estimated below this ratio means overestimation.
    pub misestimate_over_ratio: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            seq_scan_removed_fraction: 0.5,
            large_scan_rows: 100_000.0,
            large_loop_rows: 100_000.0,
            large_sort_rows: 50_000.0,
            large_aggregate_rows: 100_000.0,
            misestimate_under_ratio: 5.0,
            misestimate_over_ratio: 0.2,
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Objects a plan finding should point at: the node's relation, if known.
pub(crate) fn affected_objects(node: &PlanNode) -> Vec<String> {
    node.relation_name().map(|r| vec![r.to_string()]).unwrap_or_default()
}

/// Display label for a node in finding messages.
pub(crate) fn node_label(node: &PlanNode) -> String {
    match node.relation_name() {
        Some(rel) => format!("{} on {}", node.node_type, rel),
        None => node.node_type.clone(),
    }
}

// ============================================================================
// Rule registries
// ============================================================================

/// All static rules, in evaluation order.
pub fn default_static_rules() -> Vec<Box<dyn StaticRule>> {
    query::get_rules()
}

/// All plan rules, in registration order, built against `thresholds`.
pub fn default_plan_rules(thresholds: &RuleThresholds) -> Vec<Box<dyn PlanRule>> {
    let mut rules: Vec<Box<dyn PlanRule>> = Vec::new();
    rules.extend(scan::get_rules(thresholds));
    rules.extend(join::get_rules(thresholds));
    rules.extend(sort::get_rules(thresholds));
    rules.extend(aggregate::get_rules(thresholds));
    rules.extend(common::get_rules(thresholds));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_have_unique_codes() {
        use std::collections::HashSet;

        let static_rules = default_static_rules();
        let codes: HashSet<_> = static_rules.iter().map(|r| r.code()).collect();
        assert_eq!(codes.len(), static_rules.len());
        assert_eq!(static_rules.len(), 10);

        let plan_rules = default_plan_rules(&RuleThresholds::default());
        let codes: HashSet<_> = plan_rules.iter().map(|r| r.code()).collect();
        assert_eq!(codes.len(), plan_rules.len());
        assert_eq!(plan_rules.len(), 10);
    }
}
