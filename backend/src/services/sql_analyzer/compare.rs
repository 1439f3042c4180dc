//! Plan comparison
//!
//! Aggregates two plan trees into summary metrics and percent deltas,
//! used to quantify improvement between an original and a rewritten
//! query. Comparison is impossible (not an error) when either plan is
//! absent.

use crate::services::sql_analyzer::models::{
    ExplainRootPlan, MetricComparison, PlanComparison, PlanNode,
};

struct PlanAggregate {
    total_cost: f64,
    estimated_rows: f64,
    avg_width: f64,
    seq_scan_count: f64,
    node_count: f64,
    join_types: Vec<String>,
}

pub struct PlanComparator;

impl PlanComparator {
    /// `None` when either plan is missing; otherwise old/new/delta per
    /// metric plus the distinct join types of each plan.
    pub fn compare(
        old: Option<&ExplainRootPlan>,
        new: Option<&ExplainRootPlan>,
    ) -> Option<PlanComparison> {
        let (old, new) = (old?, new?);

        let old_stats = aggregate(old);
        let new_stats = aggregate(new);

        Some(PlanComparison {
            cost: metric(old_stats.total_cost, new_stats.total_cost),
            rows: metric(old_stats.estimated_rows, new_stats.estimated_rows),
            width: metric(old_stats.avg_width, new_stats.avg_width),
            seq_scan_count: metric(old_stats.seq_scan_count, new_stats.seq_scan_count),
            node_count: metric(old_stats.node_count, new_stats.node_count),
            old_join_types: old_stats.join_types.join(", "),
            new_join_types: new_stats.join_types.join(", "),
        })
    }
}

fn metric(old: f64, new: f64) -> MetricComparison {
    MetricComparison { old, new, percent_delta: percent_delta(old, new) }
}

/// `(old - new) / old * 100`; positive means the new plan reduced the
/// metric. `None` when `old == 0`, where there is no meaningful baseline.
fn percent_delta(old: f64, new: f64) -> Option<f64> {
    if old == 0.0 {
        None
    } else {
        Some((old - new) / old * 100.0)
    }
}

fn aggregate(plan: &ExplainRootPlan) -> PlanAggregate {
    let nodes = flatten(&plan.root);

    let estimated_rows: f64 = nodes.iter().filter_map(|n| n.plan_rows).sum();
    let width_sum: f64 = nodes.iter().filter_map(|n| n.plan_width).sum();
    let avg_width = if nodes.is_empty() { 0.0 } else { width_sum / nodes.len() as f64 };

    let mut join_types = Vec::new();
    for node in &nodes {
        if node.node_type.contains("Join") && !join_types.contains(&node.node_type) {
            join_types.push(node.node_type.clone());
        }
    }

    PlanAggregate {
        total_cost: plan.root.total_cost.unwrap_or(0.0),
        estimated_rows,
        avg_width,
        seq_scan_count: nodes.iter().filter(|n| n.node_type == "Seq Scan").count() as f64,
        node_count: nodes.len() as f64,
        join_types,
    }
}

/// Pre-order flattening of the tree.
fn flatten(node: &PlanNode) -> Vec<&PlanNode> {
    let mut out = vec![node];
    for child in &node.children {
        out.extend(flatten(child));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sql_analyzer::parser::ExplainParser;

    const OLD_PLAN: &str = r#"[{
        "Plan": {
            "Node Type": "Hash Join",
            "Total Cost": 500.0,
            "Plan Rows": 1000,
            "Plan Width": 40,
            "Plans": [
                {"Node Type": "Seq Scan", "Plan Rows": 8000, "Plan Width": 40, "Total Cost": 120.0},
                {"Node Type": "Seq Scan", "Plan Rows": 1000, "Plan Width": 40, "Total Cost": 80.0}
            ]
        }
    }]"#;

    const NEW_PLAN: &str = r#"[{
        "Plan": {
            "Node Type": "Nested Loop",
            "Total Cost": 250.0,
            "Plan Rows": 1000,
            "Plan Width": 40,
            "Plans": [
                {"Node Type": "Index Scan", "Plan Rows": 1000, "Plan Width": 40, "Total Cost": 90.0},
                {"Node Type": "Index Scan", "Plan Rows": 1, "Plan Width": 40, "Total Cost": 0.5}
            ]
        }
    }]"#;

    fn parse(json: &str) -> ExplainRootPlan {
        ExplainParser::new().parse(json).unwrap()
    }

    #[test]
    fn missing_plan_on_either_side_yields_none() {
        let plan = parse(OLD_PLAN);
        assert!(PlanComparator::compare(None, Some(&plan)).is_none());
        assert!(PlanComparator::compare(Some(&plan), None).is_none());
        assert!(PlanComparator::compare(None, None).is_none());
    }

    #[test]
    fn identical_plans_have_zero_deltas() {
        let plan = parse(OLD_PLAN);
        let cmp = PlanComparator::compare(Some(&plan), Some(&plan)).unwrap();
        for m in [cmp.cost, cmp.rows, cmp.width, cmp.seq_scan_count, cmp.node_count] {
            assert_eq!(m.percent_delta, Some(0.0));
        }
        assert_eq!(cmp.old_join_types, cmp.new_join_types);
    }

    #[test]
    fn improvement_is_a_positive_delta() {
        let old = parse(OLD_PLAN);
        let new = parse(NEW_PLAN);
        let cmp = PlanComparator::compare(Some(&old), Some(&new)).unwrap();

        assert_eq!(cmp.cost.old, 500.0);
        assert_eq!(cmp.cost.new, 250.0);
        assert_eq!(cmp.cost.percent_delta, Some(50.0));

        // 2 seq scans went to 0; (2 - 0) / 2 * 100 = 100
        assert_eq!(cmp.seq_scan_count.percent_delta, Some(100.0));
        assert_eq!(cmp.old_join_types, "Hash Join");
        // Nested Loop does not carry "Join" in its node type
        assert_eq!(cmp.new_join_types, "");
    }

    #[test]
    fn zero_baseline_disables_that_metric_only() {
        let old = parse(NEW_PLAN); // no seq scans -> baseline 0
        let new = parse(OLD_PLAN);
        let cmp = PlanComparator::compare(Some(&old), Some(&new)).unwrap();
        assert_eq!(cmp.seq_scan_count.percent_delta, None);
        assert!(cmp.cost.percent_delta.is_some());
    }

    #[test]
    fn aggregates_count_all_nodes() {
        let plan = parse(OLD_PLAN);
        let cmp = PlanComparator::compare(Some(&plan), Some(&plan)).unwrap();
        assert_eq!(cmp.node_count.old, 3.0);
        assert_eq!(cmp.rows.old, 10_000.0);
        assert_eq!(cmp.width.old, 40.0);
    }
}
