//! Recommendation engine
//!
//! Providers turn finding streams into recommendations; the engine
//! concatenates everything and orders it by severity. Two rules firing on
//! the same root cause intentionally yield two recommendations; merging
//! near-duplicates would hide which checks agreed.

use crate::services::sql_analyzer::models::{
    PlanFinding, PlanRuleCode, Recommendation, StaticCheckFinding, StaticRuleCode,
};

/// Turns findings into zero or more recommendations. A provider usually
/// handles one of the two streams and ignores the other.
pub trait RecommendationProvider: Send + Sync {
    fn from_static_findings(&self, findings: &[StaticCheckFinding]) -> Vec<Recommendation>;
    fn from_plan_findings(&self, findings: &[PlanFinding]) -> Vec<Recommendation>;
}

/// Fixed advisory text per static rule code.
fn static_suggestion(code: StaticRuleCode) -> &'static str {
    match code {
        StaticRuleCode::SelectStar => {
            "List the needed columns explicitly so covering indexes stay usable"
        }
        StaticRuleCode::CartesianJoin => {
            "Add explicit JOIN ... ON clauses or a join condition in WHERE"
        }
        StaticRuleCode::FunctionOnColumn => {
            "Create an expression index, or move the function to the literal side"
        }
        StaticRuleCode::LeadingWildcardLike => {
            "Use a pg_trgm GIN/GiST index or full-text search for substring matching"
        }
        StaticRuleCode::NonSargableExpression => {
            "Rewrite the predicate so the bare column is compared, or index the expression"
        }
        StaticRuleCode::OffsetPagination => {
            "Switch to keyset pagination: WHERE (key) > (last seen key) ORDER BY key"
        }
        StaticRuleCode::NotInNulls => {
            "Rewrite as NOT EXISTS, which handles NULLs and can use an anti-join"
        }
        StaticRuleCode::TypeMismatchComparison => {
            "Cast the literal to the column's type explicitly to keep the index usable"
        }
        StaticRuleCode::MissingWhereDelete => {
            "Add a WHERE clause, or make the full-table intent explicit"
        }
        StaticRuleCode::SubqueryInsteadOfJoin => {
            "Consider rewriting the subquery as a JOIN and compare the plans"
        }
    }
}

/// Fixed advisory text per plan rule code.
fn plan_suggestion(code: PlanRuleCode) -> &'static str {
    match code {
        PlanRuleCode::SeqScanSelective => {
            "Create an index matching the filter predicate, or refresh statistics with ANALYZE"
        }
        PlanRuleCode::SeqScanOnLargeTable => {
            "Add an index for the scan predicate so the planner can avoid the full scan"
        }
        PlanRuleCode::NestedLoopOnLargeTables => {
            "Index the join keys or refresh statistics so the planner can pick a hash/merge join"
        }
        PlanRuleCode::MisestimatedRows => {
            "Run ANALYZE on the affected tables; consider raising the statistics target"
        }
        PlanRuleCode::LargeSort => "Add an index providing the sort order",
        PlanRuleCode::LargeAggregate => {
            "Pre-aggregate into a materialized view or index the grouped columns"
        }
        PlanRuleCode::HashJoinAdvisory => "Make sure the join keys are indexed",
        PlanRuleCode::MergeJoinAdvisory => {
            "Make sure the join inputs are sorted by an index, not an explicit sort"
        }
        PlanRuleCode::TempFiles => {
            "Raise work_mem for this workload, or shrink the sorted/hashed data set"
        }
        PlanRuleCode::Parallelism => {
            "No action needed; verify parallel workers are actually launched under load"
        }
    }
}

fn with_objects(suggestion: &str, objects: &[String]) -> String {
    if objects.is_empty() {
        suggestion.to_string()
    } else {
        format!("{} (affected: {})", suggestion, objects.join(", "))
    }
}

/// Maps static findings one-to-one into recommendations.
pub struct StaticFindingProvider;

impl RecommendationProvider for StaticFindingProvider {
    fn from_static_findings(&self, findings: &[StaticCheckFinding]) -> Vec<Recommendation> {
        findings
            .iter()
            .map(|f| Recommendation {
                category: f.category,
                severity: f.severity,
                message: f.message.clone(),
                suggestion: with_objects(static_suggestion(f.code), &f.affected_columns),
            })
            .collect()
    }

    fn from_plan_findings(&self, _findings: &[PlanFinding]) -> Vec<Recommendation> {
        Vec::new()
    }
}

/// Maps plan findings one-to-one into recommendations.
pub struct PlanFindingProvider;

impl RecommendationProvider for PlanFindingProvider {
    fn from_static_findings(&self, _findings: &[StaticCheckFinding]) -> Vec<Recommendation> {
        Vec::new()
    }

    fn from_plan_findings(&self, findings: &[PlanFinding]) -> Vec<Recommendation> {
        findings
            .iter()
            .map(|f| Recommendation {
                category: f.category,
                severity: f.severity,
                message: f.message.clone(),
                suggestion: with_objects(plan_suggestion(f.code), &f.affected_objects),
            })
            .collect()
    }
}

/// Builds the final recommendation list from both finding streams.
pub struct RecommendationEngine {
    providers: Vec<Box<dyn RecommendationProvider>>,
}

impl RecommendationEngine {
    pub fn new() -> Self {
        Self {
            providers: vec![Box::new(StaticFindingProvider), Box::new(PlanFindingProvider)],
        }
    }

    pub fn with_providers(providers: Vec<Box<dyn RecommendationProvider>>) -> Self {
        Self { providers }
    }

    /// Concatenate every provider's output, then stable-sort descending by
    /// severity only, so equal-severity items keep their original order.
    pub fn build(
        &self,
        static_findings: &[StaticCheckFinding],
        plan_findings: &[PlanFinding],
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        for provider in &self.providers {
            recommendations.extend(provider.from_static_findings(static_findings));
            recommendations.extend(provider.from_plan_findings(plan_findings));
        }
        recommendations.sort_by(|a, b| b.severity.cmp(&a.severity));
        recommendations
    }
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sql_analyzer::models::{RecommendationCategory, Severity};
    use std::collections::BTreeMap;

    fn static_finding(code: StaticRuleCode, severity: Severity, message: &str) -> StaticCheckFinding {
        StaticCheckFinding {
            code,
            message: message.into(),
            category: RecommendationCategory::General,
            severity,
            affected_columns: Vec::new(),
        }
    }

    fn plan_finding(code: PlanRuleCode, severity: Severity, message: &str) -> PlanFinding {
        PlanFinding {
            code,
            message: message.into(),
            category: RecommendationCategory::Indexing,
            severity,
            affected_objects: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn sorted_descending_by_severity_only() {
        let statics = vec![
            static_finding(StaticRuleCode::SelectStar, Severity::Info, "s-info"),
            static_finding(StaticRuleCode::NotInNulls, Severity::Critical, "s-critical"),
        ];
        let plans = vec![
            plan_finding(PlanRuleCode::LargeSort, Severity::Warning, "p-warning"),
            plan_finding(PlanRuleCode::TempFiles, Severity::Critical, "p-critical"),
        ];

        let recs = RecommendationEngine::new().build(&statics, &plans);
        let severities: Vec<_> = recs.iter().map(|r| r.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::Critical, Severity::Warning, Severity::Info]
        );
        // stable: the static critical came through a provider registered
        // before the plan provider, so it stays first
        assert_eq!(recs[0].message, "s-critical");
        assert_eq!(recs[1].message, "p-critical");
    }

    #[test]
    fn no_deduplication_across_rules() {
        let statics = vec![
            static_finding(StaticRuleCode::LeadingWildcardLike, Severity::Critical, "wildcard"),
        ];
        let plans = vec![
            plan_finding(PlanRuleCode::SeqScanSelective, Severity::Critical, "seq scan"),
        ];
        let recs = RecommendationEngine::new().build(&statics, &plans);
        assert_eq!(recs.len(), 2, "both findings survive even if they share a root cause");
    }

    #[test]
    fn suggestion_mentions_affected_objects() {
        let mut finding = plan_finding(PlanRuleCode::SeqScanOnLargeTable, Severity::Critical, "m");
        finding.affected_objects = vec!["orders".into()];
        let recs = RecommendationEngine::new().build(&[], &[finding]);
        assert!(recs[0].suggestion.contains("orders"));
    }

    #[test]
    fn empty_inputs_give_empty_output() {
        assert!(RecommendationEngine::new().build(&[], &[]).is_empty());
    }
}
