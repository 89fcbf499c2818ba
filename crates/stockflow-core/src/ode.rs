//! Compilation of a schema into a vector field.
//!
//! A [`VectorField`] is a pure function of `(t, y)` plus the schema contents
//! closed over at compile time (parameter values, parsed rate expressions
//! and flow topology). It holds no mutable state and can be called
//! repeatedly, including at the sub-steps of an adaptive integrator.

use crate::expr::Expr;
use crate::schema::Schema;
use crate::{FloatValue, Time};
use log::warn;
use std::collections::{HashMap, HashSet};

/// A flow with its rate expression parsed and its endpoints resolved to
/// stock indices. A rate that failed to parse, or an endpoint naming an
/// unknown stock, simply contributes nothing.
#[derive(Debug, Clone)]
struct CompiledFlow {
    id: String,
    from: Option<usize>,
    to: Option<usize>,
    rate: Option<Expr>,
}

/// The derivative function derived from a schema.
///
/// Component order follows `schema.stocks` exactly; the caller integrates a
/// state vector in that same order.
#[derive(Debug, Clone)]
pub struct VectorField {
    stock_ids: Vec<String>,
    parameters: HashMap<String, FloatValue>,
    flows: Vec<CompiledFlow>,
}

impl VectorField {
    /// Compile the full schema, retaining every flow.
    pub fn compile(schema: &Schema) -> VectorField {
        Self::compile_filtered(schema, None, None)
    }

    /// Compile with optional flow filtering, used for "what happens without
    /// mechanism X" experiments.
    ///
    /// Flows whose `mechanism` tag is in `exclude_mechanisms` are dropped
    /// first; if `include_flow_ids` is given, only flows whose id is in that
    /// set are kept. Filtering never mutates the schema; it only narrows
    /// the flow set closed over by this particular vector field.
    pub fn compile_filtered(
        schema: &Schema,
        exclude_mechanisms: Option<&HashSet<String>>,
        include_flow_ids: Option<&HashSet<String>>,
    ) -> VectorField {
        let stock_ids = schema.stock_ids();
        let index_of: HashMap<&str, usize> = stock_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let flows = schema
            .flows
            .iter()
            .filter(|flow| match exclude_mechanisms {
                Some(excluded) => !excluded.contains(&flow.mechanism),
                None => true,
            })
            .filter(|flow| match include_flow_ids {
                Some(included) => included.contains(&flow.id),
                None => true,
            })
            .map(|flow| {
                let rate = match Expr::parse(&flow.rate) {
                    Ok(expr) => Some(expr),
                    Err(e) => {
                        warn!("flow '{}': rate '{}' rejected: {e}", flow.id, flow.rate);
                        None
                    }
                };
                CompiledFlow {
                    id: flow.id.clone(),
                    from: flow.from.as_deref().and_then(|s| index_of.get(s)).copied(),
                    to: flow.to.as_deref().and_then(|s| index_of.get(s)).copied(),
                    rate,
                }
            })
            .collect();

        VectorField {
            stock_ids,
            parameters: schema.parameter_values(),
            flows,
        }
    }

    /// Stock ids in state-vector order, for labelling integrator output.
    pub fn stock_ids(&self) -> &[String] {
        &self.stock_ids
    }

    /// Number of state-vector components.
    pub fn len(&self) -> usize {
        self.stock_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stock_ids.is_empty()
    }

    /// Ids of the flows retained after filtering.
    pub fn flow_ids(&self) -> Vec<&str> {
        self.flows.iter().map(|f| f.id.as_str()).collect()
    }

    /// Evaluate the derivative of each stock at state `y`.
    ///
    /// Every flow rate is clamped to be non-negative: flows are modelled as
    /// unidirectional transfer magnitudes. Reversing a flow requires
    /// authoring a second flow in the opposite direction, not a negative
    /// rate; downstream models depend on this clamp.
    pub fn derivatives(&self, _t: Time, y: &[FloatValue]) -> Vec<FloatValue> {
        let stocks: HashMap<String, FloatValue> = self
            .stock_ids
            .iter()
            .cloned()
            .zip(y.iter().copied())
            .collect();

        let mut dydt = vec![0.0; self.stock_ids.len()];
        for flow in &self.flows {
            let raw = match &flow.rate {
                Some(expr) => expr.eval(&stocks, &self.parameters).unwrap_or(0.0),
                None => 0.0,
            };
            let rate = if raw.is_finite() { raw.max(0.0) } else { 0.0 };
            if let Some(i) = flow.from {
                dydt[i] -= rate;
            }
            if let Some(i) = flow.to {
                dydt[i] += rate;
            }
        }
        dydt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use is_close::is_close;
    use serde_json::json;

    fn sir_schema() -> Schema {
        Schema::from_value(&json!({
            "stocks": [
                {"id": "S", "initial": 990.0},
                {"id": "I", "initial": 10.0},
                {"id": "R", "initial": 0.0},
            ],
            "flows": [
                {"id": "infection", "from": "S", "to": "I", "rate": "beta * S * I / N"},
                {"id": "recovery", "from": "I", "to": "R", "rate": "gamma * I"},
            ],
            "parameters": [
                {"id": "N", "value": 1000.0},
                {"id": "beta", "value": 0.3},
                {"id": "gamma", "value": 0.1},
            ],
        }))
        .unwrap()
    }

    #[test]
    fn sir_derivatives_at_initial_state() {
        let schema = sir_schema();
        let field = VectorField::compile(&schema);
        let dy = field.derivatives(0.0, &schema.initial_values());

        assert_eq!(dy.len(), 3);
        // dS = -beta*S*I/N = -2.97, dI = 2.97 - gamma*I = 1.97, dR = 1.0
        assert!(is_close!(dy[0], -2.97));
        assert!(is_close!(dy[1], 1.97));
        assert!(is_close!(dy[2], 1.0));
    }

    #[test]
    fn component_order_follows_schema_stocks() {
        let schema = sir_schema();
        let field = VectorField::compile(&schema);
        assert_eq!(field.stock_ids(), &["S", "I", "R"]);
        assert_eq!(field.len(), 3);
    }

    #[test]
    fn negative_rates_are_clamped_to_zero() {
        let schema = Schema::from_value(&json!({
            "stocks": [
                {"id": "A", "initial": 5.0},
                {"id": "B", "initial": 0.0},
            ],
            "flows": [
                {"id": "backward", "from": "A", "to": "B", "rate": "-1.5 * A"},
            ],
        }))
        .unwrap();
        let field = VectorField::compile(&schema);
        let dy = field.derivatives(0.0, &[5.0, 0.0]);
        // A negative raw rate contributes zero to both endpoints
        assert_eq!(dy, vec![0.0, 0.0]);
    }

    #[test]
    fn boundary_flows_have_no_compensating_term() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": 0.0}],
            "flows": [
                {"id": "in", "to": "A", "rate": "2"},
                {"id": "out", "from": "A", "rate": "0.5"},
            ],
        }))
        .unwrap();
        let field = VectorField::compile(&schema);
        let dy = field.derivatives(0.0, &[0.0]);
        assert!(is_close!(dy[0], 1.5));
    }

    #[test]
    fn unknown_endpoint_is_skipped() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": 1.0}],
            "flows": [
                {"id": "leak", "from": "A", "to": "nowhere", "rate": "1"},
            ],
        }))
        .unwrap();
        let field = VectorField::compile(&schema);
        let dy = field.derivatives(0.0, &[1.0]);
        // Subtraction still applies at the known endpoint
        assert_eq!(dy, vec![-1.0]);
    }

    #[test]
    fn malformed_rate_contributes_nothing() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": 1.0}],
            "flows": [
                {"id": "bad", "from": "A", "rate": "beta *"},
                {"id": "unknown", "from": "A", "rate": "no_such_parameter * A"},
            ],
        }))
        .unwrap();
        let field = VectorField::compile(&schema);
        assert_eq!(field.derivatives(0.0, &[1.0]), vec![0.0]);
    }

    #[test]
    fn exclude_mechanisms_drops_tagged_flows() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": 0.0}],
            "flows": [
                {"id": "base", "to": "A", "rate": "1", "mechanism": "baseline"},
                {"id": "boost", "to": "A", "rate": "10", "mechanism": "boost"},
            ],
        }))
        .unwrap();

        let excluded: HashSet<String> = ["boost".to_string()].into_iter().collect();
        let field = VectorField::compile_filtered(&schema, Some(&excluded), None);
        assert_eq!(field.flow_ids(), vec!["base"]);
        assert!(is_close!(field.derivatives(0.0, &[0.0])[0], 1.0));
        // The schema itself is untouched
        assert_eq!(schema.flows.len(), 2);
    }

    #[test]
    fn include_flow_ids_keeps_only_listed_flows() {
        let schema = sir_schema();
        let included: HashSet<String> = ["recovery".to_string()].into_iter().collect();
        let field = VectorField::compile_filtered(&schema, None, Some(&included));
        assert_eq!(field.flow_ids(), vec!["recovery"]);
        let dy = field.derivatives(0.0, &schema.initial_values());
        assert_eq!(dy[0], 0.0);
        assert!(is_close!(dy[1], -1.0));
        assert!(is_close!(dy[2], 1.0));
    }
}
