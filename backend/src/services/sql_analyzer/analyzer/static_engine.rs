//! Static SQL analyzer

use std::panic::{self, AssertUnwindSafe};

use crate::services::sql_analyzer::models::{SqlQuery, StaticCheckFinding};
use crate::services::sql_analyzer::rules::{default_static_rules, StaticRule};
use crate::utils::error::AnalyzeError;

use super::CancelFlag;

/// Applies the static rule set to one query in registration order.
pub struct StaticAnalyzer {
    rules: Vec<Box<dyn StaticRule>>,
}

impl StaticAnalyzer {
    pub fn new() -> Self {
        Self { rules: default_static_rules() }
    }

    pub fn with_rules(rules: Vec<Box<dyn StaticRule>>) -> Self {
        Self { rules }
    }

    /// Findings in registration order; no sorting at this stage.
    pub fn analyze(&self, query: &SqlQuery) -> Vec<StaticCheckFinding> {
        self.analyze_with_cancel(query, &CancelFlag::default())
            .expect("default flag never cancels")
    }

    pub fn analyze_with_cancel(
        &self,
        query: &SqlQuery,
        cancel: &CancelFlag,
    ) -> Result<Vec<StaticCheckFinding>, AnalyzeError> {
        let mut findings = Vec::new();

        for rule in &self.rules {
            if cancel.is_cancelled() {
                return Err(AnalyzeError::Cancelled);
            }
            // Contain a misbehaving rule at this single call site; the
            // remaining rules still run.
            match panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(query))) {
                Ok(Some(finding)) => findings.push(finding),
                Ok(None) => {}
                Err(_) => {
                    tracing::warn!(code = ?rule.code(), "static rule failed; treating as no finding");
                }
            }
        }

        Ok(findings)
    }
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sql_analyzer::models::{
        RecommendationCategory, Severity, StaticRuleCode,
    };

    struct PanickingRule;

    impl StaticRule for PanickingRule {
        fn code(&self) -> StaticRuleCode {
            StaticRuleCode::SelectStar
        }
        fn category(&self) -> RecommendationCategory {
            RecommendationCategory::General
        }
        fn default_severity(&self) -> Severity {
            Severity::Info
        }
        fn evaluate(&self, _query: &SqlQuery) -> Option<StaticCheckFinding> {
            panic!("broken rule");
        }
    }

    #[test]
    fn analyzer_is_deterministic() {
        let analyzer = StaticAnalyzer::new();
        let query = SqlQuery::new("SELECT * FROM a, b OFFSET 100");
        let first = analyzer.analyze(&query);
        let second = analyzer.analyze(&query);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn a_panicking_rule_does_not_abort_the_run() {
        let mut rules = vec![Box::new(PanickingRule) as Box<dyn StaticRule>];
        rules.extend(default_static_rules());
        let analyzer = StaticAnalyzer::with_rules(rules);

        let findings = analyzer.analyze(&SqlQuery::new("SELECT * FROM t"));
        assert!(
            findings.iter().any(|f| f.code == StaticRuleCode::SelectStar),
            "rules after the broken one still run"
        );
    }

    #[test]
    fn cancellation_aborts_between_rules() {
        let analyzer = StaticAnalyzer::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = analyzer
            .analyze_with_cancel(&SqlQuery::new("SELECT 1"), &cancel)
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Cancelled));
    }
}
