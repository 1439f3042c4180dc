//! EXPLAIN (FORMAT JSON) parser
//!
//! Accepts exactly what PostgreSQL emits: either the bare plan object or
//! the single-element array wrapping it. Recognized top-level keys are
//! folded into typed fields; everything else lands in the node-specific
//! map with its original key name and value kind, so rules keep working
//! against plan shapes this crate did not anticipate.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::utils::error::AnalyzeError;

use super::models::{BufferStats, ExplainRootPlan, PlanNode, ScalarValue};

/// Keys folded into typed `PlanNode` fields and therefore kept out of the
/// node-specific map. Matching is case-insensitive.
const STANDARD_FIELDS: &[&str] = &[
    "Node Type",
    "Startup Cost",
    "Total Cost",
    "Plan Rows",
    "Plan Width",
    "Actual Startup Time",
    "Actual Total Time",
    "Actual Rows",
    "Actual Loops",
    "Plans",
    "Inner Plan",
    "Outer Plan",
    "Shared Hit Blocks",
    "Shared Read Blocks",
    "Local Hit Blocks",
    "Local Read Blocks",
    "Temp Read Blocks",
    "Temp Written Blocks",
    "Buffers",
];

/// Keys under which PostgreSQL nests child plans.
const CHILD_KEYS: &[&str] = &["Plans", "Inner Plan", "Outer Plan"];

pub struct ExplainParser;

impl ExplainParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw EXPLAIN JSON text into a typed plan tree.
    pub fn parse(&self, explain_json: &str) -> Result<ExplainRootPlan, AnalyzeError> {
        let doc: Value = serde_json::from_str(explain_json)?;

        let plan_element = match &doc {
            Value::Array(items) => items.first().ok_or(AnalyzeError::EmptyExplain)?,
            other => other,
        };

        let plan_obj =
            find_ignore_case(plan_element, "Plan").ok_or(AnalyzeError::MissingPlan)?;
        let root = parse_plan_node(plan_obj);

        let settings = find_ignore_case(plan_element, "Settings")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect::<BTreeMap<String, String>>()
            })
            .filter(|m| !m.is_empty());

        let command_type = get_string_ignore_case(plan_element, "Command Type")
            .or_else(|| get_string_ignore_case(plan_element, "Command"));

        Ok(ExplainRootPlan {
            command_type,
            root,
            planning_time_ms: get_f64_ignore_case(plan_element, "Planning Time"),
            execution_time_ms: get_f64_ignore_case(plan_element, "Execution Time"),
            settings,
        })
    }
}

impl Default for ExplainParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_plan_node(elem: &Value) -> PlanNode {
    let node_type =
        get_string_ignore_case(elem, "Node Type").unwrap_or_else(|| "<unknown>".to_string());

    let mut node_specific = BTreeMap::new();
    if let Some(obj) = elem.as_object() {
        for (name, value) in obj {
            if is_standard_field(name) {
                continue;
            }
            node_specific.insert(name.clone(), to_scalar(value));
        }
    }

    let mut children = Vec::new();
    for key in CHILD_KEYS {
        match find_ignore_case(elem, key) {
            Some(Value::Array(items)) => {
                children.extend(items.iter().map(parse_plan_node));
            }
            Some(child @ Value::Object(_)) => {
                children.push(parse_plan_node(child));
            }
            _ => {}
        }
    }

    PlanNode {
        short_node_type: short_node_type_from(&node_type),
        node_type,
        startup_cost: get_f64_ignore_case(elem, "Startup Cost"),
        total_cost: get_f64_ignore_case(elem, "Total Cost"),
        plan_rows: get_f64_ignore_case(elem, "Plan Rows"),
        plan_width: get_f64_ignore_case(elem, "Plan Width"),
        actual_startup_time_ms: get_f64_ignore_case(elem, "Actual Startup Time"),
        actual_total_time_ms: get_f64_ignore_case(elem, "Actual Total Time"),
        actual_rows: get_f64_ignore_case(elem, "Actual Rows"),
        actual_loops: get_u64_ignore_case(elem, "Actual Loops"),
        buffers: parse_buffers(elem),
        node_specific,
        children,
    }
}

/// PostgreSQL reports buffer counters as flat `* Blocks` keys on the node.
/// Some EXPLAIN post-processors re-nest them under a `Buffers` object; both
/// spellings are accepted.
fn parse_buffers(elem: &Value) -> Option<BufferStats> {
    let flat = |key: &str| get_u64_ignore_case(elem, key);
    if ["Shared Hit Blocks", "Shared Read Blocks", "Temp Read Blocks", "Temp Written Blocks"]
        .iter()
        .any(|k| flat(k).is_some())
    {
        return Some(BufferStats {
            shared_hit: flat("Shared Hit Blocks").unwrap_or(0),
            shared_read: flat("Shared Read Blocks").unwrap_or(0),
            local_hit: flat("Local Hit Blocks").unwrap_or(0),
            local_read: flat("Local Read Blocks").unwrap_or(0),
            temp_read: flat("Temp Read Blocks").unwrap_or(0),
            temp_written: flat("Temp Written Blocks").unwrap_or(0),
        });
    }

    let nested = find_ignore_case(elem, "Buffers")?;
    if !nested.is_object() {
        return None;
    }
    let get = |key: &str| get_u64_ignore_case(nested, key).unwrap_or(0);
    Some(BufferStats {
        shared_hit: get("Shared Hit"),
        shared_read: get("Shared Read"),
        local_hit: get("Local Hit"),
        local_read: get("Local Read"),
        temp_read: get("Temp Read"),
        temp_written: get("Temp Written"),
    })
}

fn is_standard_field(name: &str) -> bool {
    STANDARD_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

fn short_node_type_from(node_type: &str) -> String {
    const MAPPING: &[(&str, &str)] = &[
        ("Seq Scan", "SeqScan"),
        ("Index Only Scan", "IndexOnlyScan"),
        ("Index Scan", "IndexScan"),
        ("Bitmap Heap Scan", "BitmapHeapScan"),
        ("Bitmap Index Scan", "BitmapIndexScan"),
        ("Hash Join", "HashJoin"),
        ("Merge Join", "MergeJoin"),
        ("Nested Loop", "NestedLoop"),
        ("Sort", "Sort"),
        ("Aggregate", "Aggregate"),
        ("Hash", "Hash"),
        ("Gather", "Gather"),
    ];
    for (pattern, short) in MAPPING {
        if contains_ignore_case(node_type, pattern) {
            return (*short).to_string();
        }
    }
    node_type.to_string()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn find_ignore_case<'a>(elem: &'a Value, name: &str) -> Option<&'a Value> {
    elem.as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn get_string_ignore_case(elem: &Value, name: &str) -> Option<String> {
    find_ignore_case(elem, name).map(value_to_string)
}

fn get_f64_ignore_case(elem: &Value, name: &str) -> Option<f64> {
    match find_ignore_case(elem, name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_u64_ignore_case(elem: &Value, name: &str) -> Option<u64> {
    match find_ignore_case(elem, name)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_scalar(value: &Value) -> ScalarValue {
    match value {
        Value::Bool(b) => ScalarValue::Bool(*b),
        Value::Number(n) => n
            .as_f64()
            .map(ScalarValue::Number)
            .unwrap_or_else(|| ScalarValue::Raw(value.clone())),
        Value::String(s) => ScalarValue::Text(s.clone()),
        other => ScalarValue::Raw(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"{
        "Plan": {
            "Node Type": "Seq Scan",
            "Relation Name": "users",
            "Startup Cost": 0.0,
            "Total Cost": 155.0,
            "Plan Rows": 5000,
            "Plan Width": 72,
            "Filter": "(active = true)"
        },
        "Planning Time": 0.12
    }"#;

    #[test]
    fn parses_bare_object_and_wrapped_array_identically() {
        let parser = ExplainParser::new();
        let bare = parser.parse(BARE).unwrap();
        let wrapped = parser.parse(&format!("[{BARE}]")).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.root.node_type, "Seq Scan");
        assert_eq!(bare.root.short_node_type, "SeqScan");
        assert_eq!(bare.planning_time_ms, Some(0.12));
    }

    #[test]
    fn unrecognized_keys_land_in_node_specific_with_kind_preserved() {
        let plan = ExplainParser::new().parse(BARE).unwrap();
        assert_eq!(
            plan.root.node_specific.get("Filter"),
            Some(&ScalarValue::Text("(active = true)".into()))
        );
        assert_eq!(plan.root.relation_name(), Some("users"));
        // folded fields must not be duplicated in the open map
        assert!(!plan.root.node_specific.contains_key("Total Cost"));
    }

    #[test]
    fn missing_plan_is_a_parse_error() {
        let err = ExplainParser::new().parse(r#"{"Planning Time": 1.0}"#).unwrap_err();
        assert!(matches!(err, AnalyzeError::MissingPlan));
        let err = ExplainParser::new().parse("[]").unwrap_err();
        assert!(matches!(err, AnalyzeError::EmptyExplain));
        let err = ExplainParser::new().parse("not json").unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidJson(_)));
    }

    #[test]
    fn parses_flat_buffer_counters() {
        let json = r#"{
            "Plan": {
                "Node Type": "Sort",
                "Temp Written Blocks": 128,
                "Temp Read Blocks": 128,
                "Shared Hit Blocks": 40,
                "Shared Read Blocks": 0
            }
        }"#;
        let plan = ExplainParser::new().parse(json).unwrap();
        let buffers = plan.root.buffers.unwrap();
        assert_eq!(buffers.temp_written, 128);
        assert_eq!(buffers.shared_hit, 40);
        assert!(!plan.root.node_specific.contains_key("Temp Written Blocks"));
    }

    #[test]
    fn absent_actuals_stay_absent() {
        let plan = ExplainParser::new().parse(BARE).unwrap();
        assert_eq!(plan.root.actual_rows, None);
        assert_eq!(plan.root.actual_loops, None);
        assert_eq!(plan.root.buffers, None);
    }

    #[test]
    fn children_are_parsed_recursively() {
        let json = r#"{
            "Plan": {
                "Node Type": "Hash Join",
                "Plans": [
                    {"Node Type": "Seq Scan", "Relation Name": "a"},
                    {"Node Type": "Hash", "Plans": [{"Node Type": "Seq Scan", "Relation Name": "b"}]}
                ]
            }
        }"#;
        let plan = ExplainParser::new().parse(json).unwrap();
        assert_eq!(plan.root.children.len(), 2);
        assert_eq!(plan.root.children[1].children[0].relation_name(), Some("b"));
    }
}
