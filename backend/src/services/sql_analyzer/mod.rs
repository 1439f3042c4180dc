//! SQL Analyzer
//!
//! Rule-based analysis of PostgreSQL queries: static antipattern checks
//! over raw SQL text, structural checks over `EXPLAIN (FORMAT JSON)`
//! plans, and aggregation of both into a prioritized recommendation list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       SqlAnalyzer                        │
//! │  SQL text ──▶ StaticAnalyzer ──▶ StaticCheckFinding[] ─┐ │
//! │                                                        ▼ │
//! │  EXPLAIN ──▶ ExplainParser ──▶ PlanRuleEngine ──▶      │ │
//! │  JSON                           PlanFinding[] ─────────┤ │
//! │                                                        ▼ │
//! │                              RecommendationEngine        │
//! │                                    │                     │
//! │                                    ▼                     │
//! │                            Recommendation[]              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The pipeline is synchronous and deterministic: identical input always
//! produces an identical ordered result. Nothing here touches a database:
//! EXPLAIN output is handed in as text by the caller.
//!
//! # Usage
//!
//! ```ignore
//! use pg_advisor::services::sql_analyzer::SqlAnalyzer;
//!
//! let analyzer = SqlAnalyzer::new();
//! let report = analyzer.analyze(&SqlQuery::new(sql), Some(explain_json))?;
//! for rec in &report.recommendations {
//!     println!("[{:?}] {}", rec.severity, rec.message);
//! }
//! ```

pub mod analyzer;
pub mod compare;
pub mod models;
pub mod parser;
pub mod recommend;
pub mod rules;


pub use analyzer::{CancelFlag, PlanRuleEngine, StaticAnalyzer};
pub use compare::PlanComparator;
pub use models::*;
pub use parser::ExplainParser;
pub use recommend::{RecommendationEngine, RecommendationProvider};
pub use rules::{PlanRule, RuleThresholds, StaticRule};

use chrono::Utc;

use crate::utils::error::AnalyzeError;

/// Facade over the analysis pipeline.
///
/// Construction wires up the rule registries; every analysis call is then
/// free of shared mutable state, so one instance can serve unrelated
/// requests concurrently.
pub struct SqlAnalyzer {
    static_analyzer: StaticAnalyzer,
    plan_engine: PlanRuleEngine,
    recommendation_engine: RecommendationEngine,
    parser: ExplainParser,
}

impl SqlAnalyzer {
    /// Analyzer with the default rule sets and thresholds.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SqlAnalyzerBuilder {
        SqlAnalyzerBuilder::default()
    }

    /// Run the static rule set; findings come back in registration order.
    pub fn analyze_static(&self, sql: &str) -> Vec<StaticCheckFinding> {
        self.static_analyzer.analyze(&SqlQuery::new(sql))
    }

    /// Parse EXPLAIN JSON and run the plan rule set over the tree.
    pub fn analyze_explain(
        &self,
        sql: &str,
        explain_json: &str,
    ) -> Result<Vec<PlanFinding>, AnalyzeError> {
        tracing::debug!(sql_len = sql.len(), "analyzing explain output");
        let root = self.parser.parse(explain_json)?;
        Ok(self.plan_engine.evaluate(&root))
    }

    /// Merge both finding streams into a severity-ordered recommendation
    /// list.
    pub fn build_recommendations(
        &self,
        static_findings: &[StaticCheckFinding],
        plan_findings: &[PlanFinding],
    ) -> Vec<Recommendation> {
        self.recommendation_engine.build(static_findings, plan_findings)
    }

    /// Compare two EXPLAIN documents; `None` when either side is missing
    /// or unparseable (nothing to compare, not an error).
    pub fn compare_plans(&self, old_json: &str, new_json: &str) -> Option<PlanComparison> {
        let parse = |json: &str| match self.parser.parse(json) {
            Ok(plan) => Some(plan),
            Err(err) => {
                tracing::warn!(%err, "plan skipped in comparison");
                None
            }
        };
        PlanComparator::compare(parse(old_json).as_ref(), parse(new_json).as_ref())
    }

    /// One-shot pipeline: static analysis, plan analysis when EXPLAIN text
    /// is given, recommendations from both.
    ///
    /// A malformed EXPLAIN document surfaces as a typed error; the caller
    /// can fall back to [`analyze_static`](Self::analyze_static).
    pub fn analyze(
        &self,
        query: &SqlQuery,
        explain_json: Option<&str>,
    ) -> Result<AnalysisReport, AnalyzeError> {
        self.analyze_with_cancel(query, explain_json, &CancelFlag::default())
    }

    pub fn analyze_with_cancel(
        &self,
        query: &SqlQuery,
        explain_json: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<AnalysisReport, AnalyzeError> {
        let static_findings = self.static_analyzer.analyze_with_cancel(query, cancel)?;

        let plan_findings = match explain_json {
            Some(json) => {
                let root = self.parser.parse(json)?;
                self.plan_engine.evaluate_with_cancel(&root, cancel)?
            }
            None => Vec::new(),
        };

        let recommendations = self.build_recommendations(&static_findings, &plan_findings);

        Ok(AnalysisReport {
            query: query.clone(),
            static_findings,
            plan_findings,
            recommendations,
            analyzed_at: Utc::now(),
        })
    }
}

impl Default for SqlAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit construction of the analyzer: rule sets and providers are
/// closed lists fixed at build time.
#[derive(Default)]
pub struct SqlAnalyzerBuilder {
    thresholds: Option<RuleThresholds>,
    static_rules: Option<Vec<Box<dyn StaticRule>>>,
    plan_rules: Option<Vec<Box<dyn PlanRule>>>,
    providers: Option<Vec<Box<dyn RecommendationProvider>>>,
}

impl SqlAnalyzerBuilder {
    pub fn with_thresholds(mut self, thresholds: RuleThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Replace the static rule set entirely.
    pub fn with_static_rules(mut self, rules: Vec<Box<dyn StaticRule>>) -> Self {
        self.static_rules = Some(rules);
        self
    }

    /// Replace the plan rule set entirely.
    pub fn with_plan_rules(mut self, rules: Vec<Box<dyn PlanRule>>) -> Self {
        self.plan_rules = Some(rules);
        self
    }

    pub fn with_providers(mut self, providers: Vec<Box<dyn RecommendationProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn build(self) -> SqlAnalyzer {
        let thresholds = self.thresholds.unwrap_or_default();
        SqlAnalyzer {
            static_analyzer: match self.static_rules {
                Some(rules) => StaticAnalyzer::with_rules(rules),
                None => StaticAnalyzer::new(),
            },
            plan_engine: match self.plan_rules {
                Some(rules) => PlanRuleEngine::with_rules(rules),
                None => PlanRuleEngine::with_thresholds(&thresholds),
            },
            recommendation_engine: match self.providers {
                Some(providers) => RecommendationEngine::with_providers(providers),
                None => RecommendationEngine::new(),
            },
            parser: ExplainParser::new(),
        }
    }
}
