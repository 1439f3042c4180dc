//! Data model for SQL analysis
//!
//! Everything here is built fresh per analysis call and never mutated
//! afterwards. Plan nodes own their children exclusively, so a parsed
//! plan is a finite acyclic tree bounded by the EXPLAIN output size.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Query
// ============================================================================

/// A SQL query submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl SqlQuery {
    /// Create a query, trimming surrounding whitespace.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            database: None,
            schema: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

// ============================================================================
// Severity and categories
// ============================================================================

/// Severity ranking shared by findings and recommendations.
///
/// The derived order is `Info < Warning < Critical`; sorting code relies
/// on this being a strict total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Category a recommendation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendationCategory {
    Indexing,
    Joins,
    Aggregations,
    Subqueries,
    Sorting,
    Filtering,
    Cardinality,
    Statistics,
    ExecutionPlan,
    Parallelism,
    Memory,
    Safety,
    Rewrite,
    General,
}

// ============================================================================
// Rule codes
// ============================================================================

/// Codes of the static SQL-text rules. One variant per registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StaticRuleCode {
    SelectStar,
    CartesianJoin,
    FunctionOnColumn,
    LeadingWildcardLike,
    NonSargableExpression,
    OffsetPagination,
    NotInNulls,
    TypeMismatchComparison,
    MissingWhereDelete,
    SubqueryInsteadOfJoin,
}

/// Codes of the execution-plan rules. One variant per registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanRuleCode {
    SeqScanSelective,
    SeqScanOnLargeTable,
    NestedLoopOnLargeTables,
    MisestimatedRows,
    LargeSort,
    LargeAggregate,
    HashJoinAdvisory,
    MergeJoinAdvisory,
    TempFiles,
    Parallelism,
}

// ============================================================================
// Plan tree
// ============================================================================

/// A single value from the open node-specific map.
///
/// PostgreSQL plan fields vary across server versions and cannot be fully
/// enumerated in advance, so unrecognized keys keep their raw value kind
/// instead of being coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Raw(serde_json::Value),
}

impl ScalarValue {
    /// Numeric view of the value; text is parsed, booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            ScalarValue::Text(s) => s.trim().parse().ok(),
            ScalarValue::Bool(_) => None,
            ScalarValue::Raw(v) => v.as_f64(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Buffer counters for one plan node, present when EXPLAIN ran with BUFFERS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    pub shared_hit: u64,
    pub shared_read: u64,
    pub local_hit: u64,
    pub local_read: u64,
    pub temp_read: u64,
    pub temp_written: u64,
}

/// One node of the parsed EXPLAIN tree.
///
/// All estimate/actual fields are optional: a plan produced without
/// ANALYZE simply has no actuals, and rules must treat absence as
/// "no opinion", never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Node type as reported by PostgreSQL, e.g. "Seq Scan", "Hash Join".
    pub node_type: String,
    /// Normalized tag ("SeqScan", "HashJoin", ...); equals `node_type`
    /// when no short form is known.
    pub short_node_type: String,
    pub startup_cost: Option<f64>,
    pub total_cost: Option<f64>,
    pub plan_rows: Option<f64>,
    pub plan_width: Option<f64>,
    pub actual_startup_time_ms: Option<f64>,
    pub actual_total_time_ms: Option<f64>,
    pub actual_rows: Option<f64>,
    pub actual_loops: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffers: Option<BufferStats>,
    /// Every top-level key not folded into a typed field, with its
    /// original name and value kind preserved.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_specific: BTreeMap<String, ScalarValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// Numeric lookup into the node-specific map.
    pub fn node_specific_f64(&self, key: &str) -> Option<f64> {
        self.node_specific.get(key).and_then(ScalarValue::as_f64)
    }

    /// Relation the node operates on, when PostgreSQL reports one.
    pub fn relation_name(&self) -> Option<&str> {
        self.node_specific.get("Relation Name").and_then(ScalarValue::as_str)
    }

    pub fn is_seq_scan(&self) -> bool {
        self.short_node_type == "SeqScan"
    }
}

/// Root of a parsed `EXPLAIN (FORMAT JSON)` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRootPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    pub root: PlanNode,
    pub planning_time_ms: Option<f64>,
    pub execution_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, String>>,
}

// ============================================================================
// Findings and recommendations
// ============================================================================

/// Result of one static rule firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticCheckFinding {
    pub code: StaticRuleCode,
    pub message: String,
    pub category: RecommendationCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_columns: Vec<String>,
}

/// Result of one plan rule firing on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFinding {
    pub code: PlanRuleCode,
    pub message: String,
    pub category: RecommendationCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_objects: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, ScalarValue>,
}

/// A prioritized recommendation, built from findings by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub severity: Severity,
    pub message: String,
    pub suggestion: String,
}

// ============================================================================
// Plan comparison
// ============================================================================

/// Old/new values of one plan metric with the percent delta.
///
/// `percent_delta` is `(old - new) / old * 100`: positive means the new
/// plan reduced the metric. `None` when `old == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub old: f64,
    pub new: f64,
    pub percent_delta: Option<f64>,
}

/// Aggregated comparison of two plans for the same logical query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanComparison {
    pub cost: MetricComparison,
    pub rows: MetricComparison,
    pub width: MetricComparison,
    pub seq_scan_count: MetricComparison,
    pub node_count: MetricComparison,
    pub old_join_types: String,
    pub new_join_types: String,
}

// ============================================================================
// Report
// ============================================================================

/// One-shot result of the analysis facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub query: SqlQuery,
    pub static_findings: Vec<StaticCheckFinding>,
    pub plan_findings: Vec<PlanFinding>,
    pub recommendations: Vec<Recommendation>,
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_total() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn sql_query_normalizes_whitespace() {
        let q = SqlQuery::new("  SELECT 1  \n");
        assert_eq!(q.text, "SELECT 1");
    }

    #[test]
    fn scalar_value_numeric_views() {
        assert_eq!(ScalarValue::Number(2.5).as_f64(), Some(2.5));
        assert_eq!(ScalarValue::Text("120".into()).as_f64(), Some(120.0));
        assert_eq!(ScalarValue::Bool(true).as_f64(), None);
    }
}
