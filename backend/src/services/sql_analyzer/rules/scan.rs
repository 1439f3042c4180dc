//! Sequential-scan rules

use std::collections::BTreeMap;

use super::{affected_objects, node_label, PlanRule, RuleThresholds};
use crate::services::sql_analyzer::models::{
    ExplainRootPlan, PlanFinding, PlanNode, PlanRuleCode, RecommendationCategory, ScalarValue,
    Severity,
};

/// Seq Scan whose filter discards most of the rows it reads.
///
/// With ANALYZE data present the removed fraction is
/// `removed / (removed + actual)`; at or above the threshold the scan
/// clearly wanted an index. Without filter counters, positive shared or
/// temp block reads still mark the scan as I/O-heavy, at lower severity.
pub struct SeqScanSelectiveRule {
    removed_fraction_threshold: f64,
}

impl SeqScanSelectiveRule {
    pub fn new(removed_fraction_threshold: f64) -> Self {
        Self {
            removed_fraction_threshold,
        }
    }
}

impl PlanRule for SeqScanSelectiveRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::SeqScanSelective
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Indexing
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if !node.is_seq_scan() {
            return None;
        }

        let removed = node.node_specific_f64("Rows Removed by Filter");
        match (removed, node.actual_rows) {
            (Some(removed), Some(actual)) => {
                let total = removed + actual;
                if total <= 0.0 {
                    return None;
                }
                let removed_fraction = removed / total;
                if removed_fraction < self.removed_fraction_threshold {
                    return None;
                }
                let mut metadata = BTreeMap::new();
                metadata.insert("removed_fraction".into(), ScalarValue::Number(removed_fraction));
                metadata.insert("rows_removed_by_filter".into(), ScalarValue::Number(removed));
                metadata.insert("actual_rows".into(), ScalarValue::Number(actual));
                Some(PlanFinding {
                    code: self.code(),
                    message: format!(
                        "{} filters out {:.0}% of the rows it reads; an index on the \
                         filter predicate would avoid the scan",
                        node_label(node),
                        removed_fraction * 100.0
                    ),
                    category: self.category(),
                    severity: self.default_severity(),
                    affected_objects: affected_objects(node),
                    metadata,
                })
            }
            _ => {
                let buffers = node.buffers?;
                if buffers.shared_read == 0 && buffers.temp_read == 0 {
                    return None;
                }
                let mut metadata = BTreeMap::new();
                metadata
                    .insert("shared_read".into(), ScalarValue::Number(buffers.shared_read as f64));
                metadata.insert("temp_read".into(), ScalarValue::Number(buffers.temp_read as f64));
                Some(PlanFinding {
                    code: self.code(),
                    message: format!(
                        "{} reads many blocks from disk; check predicate selectivity and \
                         index coverage",
                        node_label(node)
                    ),
                    category: self.category(),
                    severity: Severity::Warning,
                    affected_objects: affected_objects(node),
                    metadata,
                })
            }
        }
    }
}

/// Seq Scan whose estimated row count alone says the table is too big to
/// scan sequentially.
pub struct SeqScanOnLargeTableRule {
    large_scan_rows: f64,
}

impl SeqScanOnLargeTableRule {
    pub fn new(large_scan_rows: f64) -> Self {
        Self { large_scan_rows }
    }
}

impl PlanRule for SeqScanOnLargeTableRule {
    fn code(&self) -> PlanRuleCode {
        PlanRuleCode::SeqScanOnLargeTable
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Indexing
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, node: &PlanNode, _root: &ExplainRootPlan) -> Option<PlanFinding> {
        if !node.is_seq_scan() {
            return None;
        }
        let plan_rows = node.plan_rows?;
        if plan_rows <= self.large_scan_rows {
            return None;
        }
        let mut metadata = BTreeMap::new();
        metadata.insert("plan_rows".into(), ScalarValue::Number(plan_rows));
        Some(PlanFinding {
            code: self.code(),
            message: format!(
                "{} over ~{:.0} estimated rows; consider an index for the predicate",
                node_label(node),
                plan_rows
            ),
            category: self.category(),
            severity: self.default_severity(),
            affected_objects: affected_objects(node),
            metadata,
        })
    }
}

pub fn get_rules(thresholds: &RuleThresholds) -> Vec<Box<dyn PlanRule>> {
    vec![
        Box::new(SeqScanSelectiveRule::new(thresholds.seq_scan_removed_fraction)),
        Box::new(SeqScanOnLargeTableRule::new(thresholds.large_scan_rows)),
    ]
}
