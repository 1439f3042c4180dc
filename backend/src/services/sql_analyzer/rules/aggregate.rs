//! Aggregate rules

use std::collections::BTreeMap;

use super::{PlanRule, RuleThresholds};
use crate::services::sql_analyzer::models::{
    ExplainRootPlan, PlanFinding, PlanNode, PlanRuleCode, RecommendationCategory, ScalarValue,
    Severity,
};

/// Aggregation over a large estimated input; pre-aggregation or an index
/// supporting the grouping usually pays off.
pub struct LargeAggregateRule {
    large_aggregate_rows: f64,
}

impl LargeAggregateRule {
    pub fn new(large_aggregate_rows: f64) -> Self {
        Self { large_aggregate_rows }
    }
}

impl PlanRule for LargeAggregateRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::LargeAggregate
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Aggregations
    }
    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if !node.node_type.contains("Aggregate") {
            return None;
        }
        let plan_rows = node.plan_rows?;
        if plan_rows <= self.large_aggregate_rows {
            return None;
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("plan_rows".into(), ScalarValue::Number(plan_rows));
        if let Some(strategy) = node.node_specific.get("Strategy") {
            metadata.insert("strategy".into(), strategy.clone());
        }
        Some(PlanFinding {
            code: self.code(),
            message: format!(
                "Aggregate over ~{:.0} estimated rows; consider pre-aggregating or \
                 indexing the grouped columns",
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
    vec![Box::new(LargeAggregateRule::new(thresholds.large_aggregate_rows))]
}
