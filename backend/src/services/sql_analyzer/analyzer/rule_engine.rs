//! Plan rule engine

use std::panic::{self, AssertUnwindSafe};

use crate::services::sql_analyzer::models::{ExplainRootPlan, PlanFinding, PlanNode};
use crate::services::sql_analyzer::rules::{default_plan_rules, PlanRule, RuleThresholds};
use crate::utils::error::AnalyzeError;

use super::CancelFlag;

/// Walks a plan tree depth-first (node before children) and applies every
/// registered rule at every node.
///
/// Output order is traversal order × rule registration order, which makes
/// repeated runs over the same plan byte-identical.
pub struct PlanRuleEngine {
    rules: Vec<Box<dyn PlanRule>>,
}

impl PlanRuleEngine {
    pub fn new() -> Self {
        Self::with_thresholds(&RuleThresholds::default())
    }

    pub fn with_thresholds(thresholds: &RuleThresholds) -> Self {
        Self { rules: default_plan_rules(thresholds) }
    }

    pub fn with_rules(rules: Vec<Box<dyn PlanRule>>) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, root: &ExplainRootPlan) -> Vec<PlanFinding> {
        self.evaluate_with_cancel(root, &CancelFlag::default())
            .expect("default flag never cancels")
    }

    pub fn evaluate_with_cancel(
        &self,
        root: &ExplainRootPlan,
        cancel: &CancelFlag,
    ) -> Result<Vec<PlanFinding>, AnalyzeError> {
        let mut findings = Vec::new();
        self.traverse(&root.root, root, cancel, &mut findings)?;
        Ok(findings)
    }

    fn traverse(
        &self,
        node: &PlanNode,
        root: &ExplainRootPlan,
        cancel: &CancelFlag,
        findings: &mut Vec<PlanFinding>,
    ) -> Result<(), AnalyzeError> {
        if cancel.is_cancelled() {
            return Err(AnalyzeError::Cancelled);
        }

        for rule in &self.rules {
            // One bad rule on one node must not abort the traversal or
            // hide the remaining rules.
            match panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(node, root))) {
                Ok(Some(finding)) => findings.push(finding),
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(
                        code = ?rule.code(),
                        node_type = %node.node_type,
                        "plan rule failed on node; treating as no finding"
                    );
                }
            }
        }

        for child in &node.children {
            self.traverse(child, root, cancel, findings)?;
        }
        Ok(())
    }
}

impl Default for PlanRuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
