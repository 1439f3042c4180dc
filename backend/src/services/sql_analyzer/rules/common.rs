//! Rules that apply to every node type

use std::collections::BTreeMap;

use super::{affected_objects, node_label, PlanRule, RuleThresholds};
use crate::services::sql_analyzer::models::{
    ExplainRootPlan, PlanFinding, PlanNode, PlanRuleCode, RecommendationCategory, ScalarValue,
    Severity,
};

/// Temp blocks read or written mean the node spilled past its memory
/// budget (sort/hash spill).
pub struct TempFilesRule;

impl PlanRule for TempFilesRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::TempFiles
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Memory
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        let buffers = node.buffers?;
        if buffers.temp_written == 0 && buffers.temp_read == 0 {
            return None;
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("temp_written".into(), ScalarValue::Number(buffers.temp_written as f64));
        metadata.insert("temp_read".into(), ScalarValue::Number(buffers.temp_read as f64));
        Some(PlanFinding {
            code: self.code(),
            message: format!(
                "{} spills to disk (temp blocks written: {}, read: {}); the operation \
                 exceeded its memory budget",
                node_label(node),
                buffers.temp_written,
                buffers.temp_read
            ),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata,
        })
    }
}

/// Actual row count far from the estimate: the planner chose this plan on
/// wrong cardinalities.
///
/// Both counts must be known and positive; plans without ANALYZE have no
/// opinion here.
pub struct MisestimatedRowsRule {
    under_ratio: f64,
    over_ratio: f64,
}

impl MisestimatedRowsRule {
    pub fn new(under_ratio: f64, over_ratio: f64) -> Self {
        Self { under_ratio, over_ratio }
    }
}

impl PlanRule for MisestimatedRowsRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::MisestimatedRows
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Cardinality
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        let plan_rows = node.plan_rows?;
        let actual_rows = node.actual_rows?;
        if plan_rows <= 0.0 || actual_rows <= 0.0 {
            return None;
        }

        let ratio = actual_rows / plan_rows;
        let direction = if ratio > self.under_ratio {
            "underestimation"
        } else if ratio < self.over_ratio {
            "overestimation"
        } else {
            return None;
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("plan_rows".into(), ScalarValue::Number(plan_rows));
        metadata.insert("actual_rows".into(), ScalarValue::Number(actual_rows));
        metadata.insert("ratio".into(), ScalarValue::Number(ratio));
        Some(PlanFinding {
            code: self.code(),
            message: format!(
                "{}: estimated {:.0} rows, got {:.0} ({}); statistics are likely stale",
                node_label(node),
                plan_rows,
                actual_rows,
                direction
            ),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata,
        })
    }
}

/// Parallel-aware node: worth surfacing so the reader knows workers are in
/// play for this subtree.
pub struct ParallelismRule;

impl PlanRule for ParallelismRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::Parallelism
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Parallelism
    }
    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        let parallel = node
            .node_specific
            .get("Parallel Aware")
            .and_then(ScalarValue::as_bool)
            .unwrap_or(false);
        if !parallel {
            return None;
        }
        Some(PlanFinding {
            code: self.code(),
            message: format!("{} runs parallel-aware", node_label(node)),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata: BTreeMap::new(),
        })
    }
}

pub fn get_rules(thresholds: &RuleThresholds) -> Vec<Box<dyn PlanRule>> {
    vec![
        Box::new(TempFilesRule),
        Box::new(MisestimatedRowsRule::new(
            thresholds.misestimate_under_ratio,
            thresholds.misestimate_over_ratio,
        )),
        Box::new(ParallelismRule),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sql_analyzer::models::BufferStats;

    fn node() -> PlanNode {
        PlanNode {
            node_type: "Sort".into(),
            short_node_type: "Sort".into(),
            startup_cost: None,
            total_cost: None,
            plan_rows: None,
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
            root: node(),
            planning_time_ms: None,
            execution_time_ms: None,
            settings: None,
        }
    }

    #[test]
    fn temp_files_truth_table() {
        // all four combinations of {zero, positive} temp counters
        let cases = [
            (0u64, 0u64, false),
            (0, 64, true),
            (64, 0, true),
            (64, 64, true),
        ];
        for (temp_read, temp_written, expect) in cases {
            let mut n = node();
            n.buffers = Some(BufferStats { temp_read, temp_written, ..Default::default() });
            let fired = TempFilesRule.evaluate(&n, &root()).is_some();
            assert_eq!(fired, expect, "temp_read={temp_read} temp_written={temp_written}");
        }
    }

    #[test]
    fn temp_files_needs_buffer_stats() {
        assert!(TempFilesRule.evaluate(&node(), &root()).is_none());
    }

    #[test]
    fn misestimation_boundaries() {
        let rule = MisestimatedRowsRule::new(5.0, 0.2);
        let eval = |plan: f64, actual: f64| {
            let mut n = node();
            n.plan_rows = Some(plan);
            n.actual_rows = Some(actual);
            rule.evaluate(&n, &root()).is_some()
        };

        assert!(eval(100.0, 1000.0), "ratio 10 is an underestimation");
        assert!(eval(1000.0, 100.0), "ratio 0.1 is an overestimation");
        assert!(!eval(100.0, 500.0), "ratio 5 is inside the tolerated band");
        assert!(!eval(500.0, 100.0), "ratio 0.2 is inside the tolerated band");
        assert!(!eval(100.0, 100.0));
    }

    #[test]
    fn misestimation_ignores_missing_or_zero_counts() {
        let rule = MisestimatedRowsRule::new(5.0, 0.2);
        let mut n = node();
        n.plan_rows = Some(100.0);
        assert!(rule.evaluate(&n, &root()).is_none(), "no actuals, no opinion");
        n.actual_rows = Some(0.0);
        assert!(rule.evaluate(&n, &root()).is_none(), "zero actual rows is not evidence");
    }

    #[test]
    fn parallel_aware_flag() {
        let mut n = node();
        assert!(ParallelismRule.evaluate(&n, &root()).is_none());
        n.node_specific.insert("Parallel Aware".into(), ScalarValue::Bool(true));
        let f = ParallelismRule.evaluate(&n, &root()).unwrap();
        assert_eq!(f.severity, Severity::Info);
        n.node_specific.insert("Parallel Aware".into(), ScalarValue::Bool(false));
        assert!(ParallelismRule.evaluate(&n, &root()).is_none());
    }
}
