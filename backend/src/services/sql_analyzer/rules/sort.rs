//! Sort rules

use std::collections::BTreeMap;

use super::{PlanRule, RuleThresholds};
use crate::services::sql_analyzer::models::{
    ExplainRootPlan, PlanFinding, PlanNode, PlanRuleCode, RecommendationCategory, ScalarValue,
    Severity,
};

/// Explicit sort over a large estimated row count; an index providing the
/// order would remove the sort node entirely.
pub struct LargeSortRule {
    large_sort_rows: f64,
}

impl LargeSortRule {
    pub fn new(large_sort_rows: f64) -> Self {
        Self { large_sort_rows }
    }
}

impl PlanRule for LargeSortRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::LargeSort
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Sorting
    }
    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if !node.node_type.contains("Sort") {
            return None;
        }
        let plan_rows = node.plan_rows?;
        if plan_rows <= self.large_sort_rows {
            return None;
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("plan_rows".into(), ScalarValue::Number(plan_rows));
        if let Some(key) = node.node_specific.get("Sort Key") {
            metadata.insert("sort_key".into(), key.clone());
        }
        Some(PlanFinding {
            code: self.code(),
            message: format!(
                "Sort over ~{:.0} estimated rows; an index on the sort key would avoid the \
                 explicit sort",
                plan_rows
            ),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: Vec::new(),
            metadata,
        })
    }
}

pub fn get_rules(thresholds: &RuleThresholds) -> Vec<Box<dyn PlanRule>> {
    vec![Box::new(LargeSortRule::new(thresholds.large_sort_rows))]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort_node(plan_rows: Option<f64>) -> PlanNode {
        PlanNode {
            node_type: "Sort".into(),
            short_node_type: "Sort".into(),
            startup_cost: None,
            total_cost: None,
            plan_rows,
            plan_width: None,
            actual_startup_time_ms: None,
            actual_total_time_ms: None,
            actual_rows: None,
            actual_loops: None,
            buffers: None,
            node_specific: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    fn root() -> ExplainRootPlan {
        ExplainRootPlan {
            command_type: None,
            root: sort_node(None),
            planning_time_ms: None,
            execution_time_ms: None,
            settings: None,
        }
    }

    #[test]
    fn fires_above_threshold_only() {
        let rule = LargeSortRule::new(50_000.0);
        assert!(rule.evaluate(&sort_node(Some(60_000.0)), &root()).is_some());
        assert!(rule.evaluate(&sort_node(Some(50_000.0)), &root()).is_none());
        assert!(rule.evaluate(&sort_node(None), &root()).is_none());
    }

    #[test]
    fn covers_incremental_sort() {
        let mut node = sort_node(Some(80_000.0));
        node.node_type = "Incremental Sort".into();
        assert!(LargeSortRule::new(50_000.0).evaluate(&node, &root()).is_some());
    }
}
