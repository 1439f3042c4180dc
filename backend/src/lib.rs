//! pg-advisor: rule-based PostgreSQL query performance analysis
//!
//! The core is a pure, deterministic pipeline from (SQL text, EXPLAIN
//! JSON text) to a prioritized list of recommendations. It never touches
//! a database: executing EXPLAIN, persisting results and serving HTTP
//! belong to the caller.

pub mod config;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::sql_analyzer::{
    AnalysisReport, CancelFlag, ExplainParser, PlanComparator, PlanComparison, PlanFinding,
    PlanRuleEngine, Recommendation, RuleThresholds, SqlAnalyzer, SqlQuery, StaticAnalyzer,
    StaticCheckFinding,
};
pub use utils::error::{AnalyzeError, AnalyzeResult};
