//! Join rules

use std::collections::BTreeMap;

use super::{affected_objects, PlanRule, RuleThresholds};
use crate::services::sql_analyzer::models::{
    ExplainRootPlan, PlanFinding, PlanNode, PlanRuleCode, RecommendationCategory, ScalarValue,
    Severity,
};

/// Nested Loop joins scale with outer × inner rows; past the threshold the
/// planner should have picked a hash or merge join.
pub struct NestedLoopOnLargeTablesRule {
    large_loop_rows: f64,
}

impl NestedLoopOnLargeTablesRule {
    pub fn new(large_loop_rows: f64) -> Self {
        Self { large_loop_rows }
    }
}

impl PlanRule for NestedLoopOnLargeTablesRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::NestedLoopOnLargeTables
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Joins
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if node.short_node_type != "NestedLoop" {
            return None;
        }
        let plan_rows = node.plan_rows?;
        if plan_rows <= self.large_loop_rows {
            return None;
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("plan_rows".into(), ScalarValue::Number(plan_rows));
        Some(PlanFinding {
            code: self.code(),
            message: format!(
                "Nested Loop with ~{:.0} estimated rows; a Hash Join or Merge Join \
                 would likely be cheaper",
                plan_rows
            ),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata,
        })
    }
}

/// Informational note on hash joins: sane default, but the join keys
/// should be indexed for the alternatives to stay available.
pub struct HashJoinAdvisoryRule;

impl PlanRule for HashJoinAdvisoryRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::HashJoinAdvisory
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Joins
    }
    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if node.short_node_type != "HashJoin" {
            return None;
        }
        let mut metadata = BTreeMap::new();
        if let Some(rows) = node.plan_rows {
            metadata.insert("plan_rows".into(), ScalarValue::Number(rows));
        }
        if let Some(cond) = node.node_specific.get("Hash Cond") {
            metadata.insert("hash_cond".into(), cond.clone());
        }
        Some(PlanFinding {
            code: self.code(),
            message: "Hash Join detected; ensure the join keys are indexed".to_string(),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata,
        })
    }
}

/// Informational note on merge joins: inputs must arrive sorted, which is
/// free only when an index provides the order.
pub struct MergeJoinAdvisoryRule;

impl PlanRule for MergeJoinAdvisoryRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::MergeJoinAdvisory
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Joins
    }
    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if node.short_node_type != "MergeJoin" {
            return None;
        }
        let mut metadata = BTreeMap::new();
        if let Some(rows) = node.plan_rows {
            metadata.insert("plan_rows".into(), ScalarValue::Number(rows));
        }
        Some(PlanFinding {
            code: self.code(),
            message: "Merge Join detected; ensure the inputs are sorted or indexed".to_string(),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata,
        })
    }
}

pub fn get_rules(thresholds: &RuleThresholds) -> Vec<Box<dyn PlanRule>> {
    vec![
        Box::new(NestedLoopOnLargeTablesRule::new(thresholds.large_loop_rows)),
        Box::new(HashJoinAdvisoryRule),
        Box::new(MergeJoinAdvisoryRule),
    ]
}
