//! Static SQL-text rules
//!
//! Regex-driven antipattern checks over the raw query text. Each rule is
//! independent and keeps no state; patterns are compiled once.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{StaticRule, StaticRuleCode};
use crate::services::sql_analyzer::models::{
    RecommendationCategory, Severity, SqlQuery, StaticCheckFinding,
};

fn finding(rule: &dyn StaticRule, message: impl Into<String>) -> StaticCheckFinding {
    StaticCheckFinding {
        code: rule.code(),
        message: message.into(),
        category: rule.category(),
        severity: rule.default_severity(),
        affected_columns: Vec::new(),
    }
}

/// `SELECT *` pulls every column through the executor and defeats
/// covering indexes.
pub struct SelectStarRule;

static SELECT_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bSELECT\s+\*").unwrap());

impl StaticRule for SelectStarRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::SelectStar
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::General
    }
    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if SELECT_STAR.is_match(&query.text) {
            Some(finding(
                self,
                "SELECT * fetches every column; list the columns the query actually needs",
            ))
        } else {
            None
        }
    }
}

/// Comma-separated FROM list with no JOIN keyword and no cross-alias
/// equality after WHERE is almost always an accidental Cartesian product.
pub struct CartesianJoinRule;

static FROM_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bFROM\s+[^;]+,").unwrap());
static JOIN_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bJOIN\b").unwrap());
static WHERE_ALIAS_EQUALITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bWHERE\b.*\w+\.\w+\s*=\s*\w+\.\w+").unwrap());

impl StaticRule for CartesianJoinRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::CartesianJoin
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Joins
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        let text = &query.text;
        if FROM_COMMA.is_match(text)
            && !JOIN_KEYWORD.is_match(text)
            && !WHERE_ALIAS_EQUALITY.is_match(text)
        {
            Some(finding(
                self,
                "FROM lists tables comma-separated without JOIN or a join condition; \
                 this produces a Cartesian product",
            ))
        } else {
            None
        }
    }
}

/// A function wrapped around a column in a predicate stops the planner
/// from using a plain btree index on that column.
pub struct FunctionOnColumnRule;

static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:LOWER|UPPER|DATE_TRUNC|CAST|EXTRACT|TO_CHAR|TO_TIMESTAMP|COALESCE)\s*\(")
        .unwrap()
});

impl StaticRule for FunctionOnColumnRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::FunctionOnColumn
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Indexing
    }
    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if FUNCTION_CALL.is_match(&query.text) {
            Some(finding(
                self,
                "a function is applied to a column inside an expression, which prevents \
                 plain index usage",
            ))
        } else {
            None
        }
    }
}

/// `LIKE '%...'` cannot use a btree index because the prefix is unknown.
pub struct LeadingWildcardLikeRule;

static LEADING_WILDCARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:LIKE|ILIKE)\s+'%[^']*'").unwrap());

impl StaticRule for LeadingWildcardLikeRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::LeadingWildcardLike
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Indexing
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if LEADING_WILDCARD.is_match(&query.text) {
            Some(finding(
                self,
                "LIKE/ILIKE pattern starts with '%'; a btree index cannot serve this predicate",
            ))
        } else {
            None
        }
    }
}

/// Arithmetic on a column (`col + 1`, `ts - INTERVAL '1 day'`) makes the
/// predicate non-sargable.
pub struct NonSargableExpressionRule;

static ARITHMETIC_ON_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b\w+\.\w+\s*[+\-*/%]\s*[\w'"]|\b\w+\s*[+\-*/%]\s*['"]"#).unwrap()
});
static INTERVAL_ARITHMETIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\w+\s*[+\-]\s*INTERVAL\s+'[^']+'").unwrap());

impl StaticRule for NonSargableExpressionRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::NonSargableExpression
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Indexing
    }
    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if ARITHMETIC_ON_COLUMN.is_match(&query.text) || INTERVAL_ARITHMETIC.is_match(&query.text)
        {
            Some(finding(
                self,
                "arithmetic is applied to a column in a predicate, making it non-sargable",
            ))
        } else {
            None
        }
    }
}

/// Literal OFFSET pagination scans and discards all skipped rows.
pub struct OffsetPaginationRule;

static OFFSET_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bOFFSET\s+\d+").unwrap());

impl StaticRule for OffsetPaginationRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::OffsetPagination
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Rewrite
    }
    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if OFFSET_LITERAL.is_match(&query.text) {
            Some(finding(
                self,
                "OFFSET pagination skips rows server-side; cost grows with the offset",
            ))
        } else {
            None
        }
    }
}

/// `NOT IN` against a set containing NULL silently matches nothing.
pub struct NotInNullsRule;

static NOT_IN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNOT\s+IN\s*\(").unwrap());

impl StaticRule for NotInNullsRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::NotInNulls
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Filtering
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if NOT_IN.is_match(&query.text) {
            Some(finding(
                self,
                "NOT IN returns no rows when the set contains NULL; NOT EXISTS is both \
                 safer and usually faster",
            ))
        } else {
            None
        }
    }
}

/// Comparisons against UUID/date/numeric string literals hint at implicit
/// casts, which disable index usage on the cast side.
pub struct TypeMismatchComparisonRule;

static UUID_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"=\s*'?[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}'?",
    )
    .unwrap()
});
static DATE_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"=\s*'?\d{4}-\d{2}-\d{2}(?:\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?)?'?").unwrap()
});
static NUMERIC_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\s*=\s*'\d+'").unwrap());

impl StaticRule for TypeMismatchComparisonRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::TypeMismatchComparison
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::General
    }
    fn default_severity(&self) -> Severity {
        Severity::Warning
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        let text = &query.text;
        let message = if UUID_LITERAL.is_match(text) {
            "comparison against a UUID-shaped string literal; an implicit cast may defeat the index"
        } else if DATE_LITERAL.is_match(text) {
            "comparison against a date/timestamp string literal without an explicit type"
        } else if NUMERIC_STRING.is_match(text) {
            "numeric column compared to a quoted string literal; the implicit cast may defeat the index"
        } else {
            return None;
        };
        Some(finding(self, message))
    }
}

/// DELETE or UPDATE with no WHERE in the same statement touches the whole
/// table.
pub struct MissingWhereDeleteRule;

static DML_STATEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:DELETE|UPDATE)\b").unwrap());
static WHERE_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bWHERE\b").unwrap());
static SQL_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(--[^\r\n]*|/\*.*?\*/)").unwrap());

impl StaticRule for MissingWhereDeleteRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::MissingWhereDelete
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Safety
    }
    fn default_severity(&self) -> Severity {
        Severity::Critical
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if query.text.trim().is_empty() {
            return None;
        }
        let cleaned = SQL_COMMENT.replace_all(&query.text, " ");

        // Check each DELETE/UPDATE statement up to its terminating ';'.
        for m in DML_STATEMENT.find_iter(&cleaned) {
            let rest = &cleaned[m.start()..];
            let statement = match rest.find(';') {
                Some(end) => &rest[..end],
                None => rest,
            };
            if !WHERE_KEYWORD.is_match(statement) {
                return Some(finding(
                    self,
                    "DELETE/UPDATE without WHERE affects every row in the table",
                ));
            }
        }
        None
    }
}

/// IN/EXISTS subqueries that a JOIN would express more efficiently.
pub struct SubqueryInsteadOfJoinRule;

static IN_SELECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bIN\s*\(\s*SELECT\b").unwrap());
static EXISTS_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bEXISTS\s*\(\s*SELECT\b").unwrap());

impl StaticRule for SubqueryInsteadOfJoinRule {
    fn code(&self) -> StaticRuleCode {
        StaticRuleCode::SubqueryInsteadOfJoin
    }
    fn category(&self) -> RecommendationCategory {
        RecommendationCategory::Subqueries
    }
    fn default_severity(&self) -> Severity {
        Severity::Info
    }

    fn evaluate(&self, query: &SqlQuery) -> Option<StaticCheckFinding> {
        if IN_SELECT.is_match(&query.text) {
            Some(finding(
                self,
                "IN (SELECT ...) subquery; a JOIN often lets the planner pick a better strategy",
            ))
        } else if EXISTS_SELECT.is_match(&query.text) {
            Some(finding(
                self,
                "EXISTS (SELECT ...) subquery; check whether a JOIN expresses the intent better",
            ))
        } else {
            None
        }
    }
}

/// All static rules in evaluation order.
pub fn get_rules() -> Vec<Box<dyn StaticRule>> {
    vec![
        Box::new(SelectStarRule),
        Box::new(CartesianJoinRule),
        Box::new(FunctionOnColumnRule),
        Box::new(LeadingWildcardLikeRule),
        Box::new(NonSargableExpressionRule),
        Box::new(OffsetPaginationRule),
        Box::new(NotInNullsRule),
        Box::new(TypeMismatchComparisonRule),
        Box::new(MissingWhereDeleteRule),
        Box::new(SubqueryInsteadOfJoinRule),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(rule: &dyn StaticRule, sql: &str) -> Option<StaticCheckFinding> {
        rule.evaluate(&SqlQuery::new(sql))
    }

    #[test]
    fn select_star_fires_on_any_wildcard_select() {
        assert!(eval(&SelectStarRule, "SELECT * FROM users").is_some());
        assert!(eval(&SelectStarRule, "select *\nfrom t").is_some());
        assert!(eval(&SelectStarRule, "SELECT id, name FROM users").is_none());
    }

    #[test]
    fn cartesian_join_needs_comma_list_without_join_or_equality() {
        let fired = eval(&CartesianJoinRule, "SELECT 1 FROM a, b WHERE a.id > 5");
        assert!(fired.is_some());
        assert_eq!(fired.unwrap().severity, Severity::Critical);

        // explicit JOIN suppresses it
        assert!(eval(
            &CartesianJoinRule,
            "SELECT 1 FROM a, b JOIN c ON c.id = b.id"
        )
        .is_none());
        // cross-alias equality in WHERE suppresses it
        assert!(eval(
            &CartesianJoinRule,
            "SELECT 1 FROM a, b WHERE a.id = b.a_id"
        )
        .is_none());
        // single-table FROM never fires
        assert!(eval(&CartesianJoinRule, "SELECT 1 FROM a WHERE a.id = 1").is_none());
    }

    #[test]
    fn function_on_column_detects_known_wrappers() {
        assert!(eval(&FunctionOnColumnRule, "SELECT 1 WHERE LOWER(email) = 'x'").is_some());
        assert!(eval(&FunctionOnColumnRule, "SELECT date_trunc('day', ts) FROM t").is_some());
        assert!(eval(&FunctionOnColumnRule, "SELECT email FROM t WHERE email = 'x'").is_none());
    }

    #[test]
    fn leading_wildcard_like() {
        assert!(eval(&LeadingWildcardLikeRule, "SELECT 1 WHERE name LIKE '%son'").is_some());
        assert!(eval(&LeadingWildcardLikeRule, "SELECT 1 WHERE name ILIKE '%a%'").is_some());
        assert!(eval(&LeadingWildcardLikeRule, "SELECT 1 WHERE name LIKE 'son%'").is_none());
    }

    #[test]
    fn non_sargable_arithmetic_and_interval() {
        assert!(eval(&NonSargableExpressionRule, "WHERE t.amount * 2 > 10").is_some());
        assert!(
            eval(&NonSargableExpressionRule, "WHERE created - INTERVAL '1 day' > now()")
                .is_some()
        );
        assert!(eval(&NonSargableExpressionRule, "WHERE t.amount > 10").is_none());
    }

    #[test]
    fn offset_pagination_needs_integer_literal() {
        assert!(eval(&OffsetPaginationRule, "SELECT 1 LIMIT 10 OFFSET 200").is_some());
        assert!(eval(&OffsetPaginationRule, "SELECT 1 LIMIT 10").is_none());
    }

    #[test]
    fn not_in_fires_only_on_not_in() {
        assert!(eval(&NotInNullsRule, "WHERE id NOT IN (SELECT id FROM t)").is_some());
        assert!(eval(&NotInNullsRule, "WHERE id IN (1, 2, 3)").is_none());
    }

    #[test]
    fn type_mismatch_variants() {
        assert!(eval(
            &TypeMismatchComparisonRule,
            "WHERE id = 'a1b2c3d4-e5f6-0a1b-2c3d-4e5f60a1b2c3'"
        )
        .is_some());
        assert!(eval(&TypeMismatchComparisonRule, "WHERE day = '2024-02-29'").is_some());
        assert!(eval(&TypeMismatchComparisonRule, "WHERE user_id = '42'").is_some());
        assert!(eval(&TypeMismatchComparisonRule, "WHERE user_id = 42").is_none());
    }

    #[test]
    fn missing_where_checks_per_statement() {
        assert!(eval(&MissingWhereDeleteRule, "DELETE FROM logs").is_some());
        assert!(eval(&MissingWhereDeleteRule, "UPDATE t SET a = 1").is_some());
        assert!(eval(&MissingWhereDeleteRule, "DELETE FROM logs WHERE ts < now()").is_none());
        // WHERE in a later statement does not excuse the first
        assert!(eval(
            &MissingWhereDeleteRule,
            "DELETE FROM logs; SELECT 1 FROM t WHERE id = 1"
        )
        .is_some());
        // commented-out WHERE does not count
        assert!(eval(&MissingWhereDeleteRule, "DELETE FROM logs -- WHERE ts < now()").is_some());
    }

    #[test]
    fn subquery_instead_of_join() {
        assert!(eval(
            &SubqueryInsteadOfJoinRule,
            "SELECT 1 FROM t WHERE id IN (SELECT t_id FROM u)"
        )
        .is_some());
        assert!(eval(
            &SubqueryInsteadOfJoinRule,
            "SELECT 1 FROM t WHERE EXISTS (SELECT 1 FROM u WHERE u.t_id = t.id)"
        )
        .is_some());
        assert!(eval(&SubqueryInsteadOfJoinRule, "SELECT 1 FROM t JOIN u ON u.t_id = t.id")
            .is_none());
    }
}
