//! Referential integrity checks for a schema.
//!
//! Validation is purely structural: it never evaluates rate expressions,
//! never mutates and never panics. Callers decide whether to reject, warn
//! or annotate the schema with the diagnostics found.

use crate::schema::Schema;
use std::collections::HashSet;

/// Cross-check a schema's id references, returning human-readable
/// diagnostics. An empty list means the schema is consistent.
pub fn validate(schema: &Schema) -> Vec<String> {
    let mut errors = Vec::new();

    let stock_ids: HashSet<&str> = schema.stocks.iter().map(|s| s.id.as_str()).collect();
    let flow_ids: HashSet<&str> = schema.flows.iter().map(|f| f.id.as_str()).collect();
    let loop_ids: HashSet<&str> = schema.loops.iter().map(|l| l.id.as_str()).collect();

    for flow in &schema.flows {
        if let Some(from) = &flow.from {
            if !stock_ids.contains(from.as_str()) {
                errors.push(format!(
                    "Flow '{}': 'from' '{}' is not a stock id.",
                    flow.id, from
                ));
            }
        }
        if let Some(to) = &flow.to {
            if !stock_ids.contains(to.as_str()) {
                errors.push(format!(
                    "Flow '{}': 'to' '{}' is not a stock id.",
                    flow.id, to
                ));
            }
        }
        for loop_id in &flow.loop_ids {
            if !loop_ids.contains(loop_id.as_str()) {
                errors.push(format!(
                    "Flow '{}': loop_ids contains unknown loop '{}'.",
                    flow.id, loop_id
                ));
            }
        }
    }

    for lp in &schema.loops {
        for flow_id in &lp.flow_ids {
            if !flow_ids.contains(flow_id.as_str()) {
                errors.push(format!(
                    "Loop '{}': flow_ids contains unknown flow '{}'.",
                    lp.id, flow_id
                ));
            }
        }
    }

    // Uniqueness invariants: duplicate ids within a kind, and the shared
    // stock/parameter evaluation namespace.
    let mut seen = HashSet::new();
    for stock in &schema.stocks {
        if !seen.insert(stock.id.as_str()) {
            errors.push(format!("Duplicate stock id '{}'.", stock.id));
        }
    }
    let mut seen = HashSet::new();
    for flow in &schema.flows {
        if !seen.insert(flow.id.as_str()) {
            errors.push(format!("Duplicate flow id '{}'.", flow.id));
        }
    }
    let mut seen = HashSet::new();
    for parameter in &schema.parameters {
        if !seen.insert(parameter.id.as_str()) {
            errors.push(format!("Duplicate parameter id '{}'.", parameter.id));
        }
        if stock_ids.contains(parameter.id.as_str()) {
            errors.push(format!(
                "Parameter '{}' collides with a stock id; both share one evaluation namespace.",
                parameter.id
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn consistent_schema_yields_no_errors() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": 1.0}, {"id": "B"}],
            "flows": [{"id": "f1", "from": "A", "to": "B", "rate": "k * A", "loop_ids": ["L1"]}],
            "parameters": [{"id": "k", "value": 0.1}],
            "loops": [{"id": "L1", "type": "B", "flow_ids": ["f1"]}],
        }))
        .unwrap();
        assert!(validate(&schema).is_empty());
    }

    #[test]
    fn dangling_endpoints_are_reported() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A"}],
            "flows": [{"id": "f1", "from": "A", "to": "ghost", "rate": "1"}],
        }))
        .unwrap();
        let errors = validate(&schema);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'to' 'ghost'"));
    }

    #[test]
    fn boundary_endpoints_are_not_errors() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A"}],
            "flows": [
                {"id": "in", "to": "A", "rate": "1"},
                {"id": "out", "from": "A", "rate": "1"},
            ],
        }))
        .unwrap();
        assert!(validate(&schema).is_empty());
    }

    #[test]
    fn loop_flow_cross_references_are_checked_both_ways() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A"}],
            "flows": [{"id": "f1", "from": "A", "rate": "1", "loop_ids": ["missing_loop"]}],
            "loops": [{"id": "L1", "flow_ids": ["missing_flow"]}],
        }))
        .unwrap();
        let errors = validate(&schema);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("unknown loop 'missing_loop'")));
        assert!(errors.iter().any(|e| e.contains("unknown flow 'missing_flow'")));
    }

    #[test]
    fn duplicate_and_colliding_ids_are_reported() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A"}, {"id": "A"}],
            "parameters": [{"id": "A", "value": 1.0}],
        }))
        .unwrap();
        let errors = validate(&schema);
        assert!(errors.iter().any(|e| e.contains("Duplicate stock id 'A'")));
        assert!(errors.iter().any(|e| e.contains("collides with a stock id")));
    }

    #[test]
    fn validation_does_not_mutate() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A"}],
            "flows": [{"id": "f1", "from": "A", "to": "ghost", "rate": "1"}],
        }))
        .unwrap();
        let snapshot = schema.clone();
        let _ = validate(&schema);
        assert_eq!(schema, snapshot);
    }
}
