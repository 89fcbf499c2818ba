//! Canonical in-memory representation of a stock-and-flow model.
//!
//! A [`Schema`] is constructed once per editing session, either from a
//! built-in default, an imported document or an AI-generated draft, and then
//! evolves through the structural edit operations below and the patch merge
//! in [`crate::patch`]. Normalization through [`Schema::from_value`]
//! guarantees every element carries the full field set, so no "missing key"
//! checks are needed anywhere else in the engine.

use crate::errors::{EngineError, EngineResult};
use crate::FloatValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A system accumulation. Its `id` doubles as the ODE state variable name,
/// and the ordering of stocks within a schema fixes the ordering of the
/// state vector handed to the integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: String,
    pub name: String,
    pub initial: FloatValue,
    #[serde(default)]
    pub unit: String,
    /// Provenance tag, e.g. "ai" for AI-suggested elements. Advisory only.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub loop_type: String,
}

/// A rate of transfer between stocks, or across the system boundary when an
/// endpoint is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    /// Source stock id; `None` means an external source.
    #[serde(default)]
    pub from: Option<String>,
    /// Destination stock id; `None` means an external sink.
    #[serde(default)]
    pub to: Option<String>,
    /// Arithmetic expression over stock ids, parameter ids and the evaluator
    /// function whitelist.
    pub rate: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub source: String,
    /// "R" (reinforcing) or "B" (balancing). Advisory only.
    #[serde(default)]
    pub loop_type: String,
    /// Free-text delay annotation, advisory only.
    #[serde(default)]
    pub delay: String,
    /// Tag used only for selective exclusion when compiling a vector field.
    #[serde(default)]
    pub mechanism: String,
    /// Ids of loops this flow belongs to. Cross-reference only.
    #[serde(default)]
    pub loop_ids: Vec<String>,
}

/// A named constant usable inside rate expressions. Parameter ids share one
/// evaluation namespace with stock ids and must not collide with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub value: FloatValue,
    #[serde(default)]
    pub unit: String,
}

/// A non-computational annotation grouping flows into a causal feedback
/// story. Never consulted by the ODE compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub id: String,
    pub name: String,
    /// "R" (reinforcing) or "B" (balancing).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub flow_ids: Vec<String>,
    #[serde(default)]
    pub delay: String,
}

/// A descriptive grouping of stocks with no semantic effect on simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stock_ids: Vec<String>,
}

/// An alternative grouping of stocks, purely descriptive like [`Cluster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stock_ids: Vec<String>,
}

/// The root aggregate of a dynamical-system model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub loops: Vec<Loop>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    /// Free-form annotation: model name, strategic question, horizon,
    /// provenance tags.
    #[serde(default)]
    pub meta: serde_json::Map<String, Value>,
}

/// Coerce a JSON value to a float. Numbers and numeric strings are accepted;
/// everything else is a hard failure for that field.
pub(crate) fn coerce_float(
    value: &Value,
    element: &'static str,
    id: &str,
    field: &'static str,
) -> EngineResult<FloatValue> {
    let non_numeric = || EngineError::NonNumeric {
        element,
        id: id.to_string(),
        field,
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(non_numeric),
        Value::String(s) => s.trim().parse::<FloatValue>().map_err(|_| non_numeric()),
        _ => Err(non_numeric()),
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Endpoint fields treat null, missing and empty string alike: no endpoint.
fn endpoint_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn string_list(obj: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn id_field(obj: &serde_json::Map<String, Value>, fallback: &str) -> String {
    let id = str_field(obj, "id");
    let id = id.trim();
    if id.is_empty() {
        fallback.to_string()
    } else {
        id.to_string()
    }
}

fn name_field(obj: &serde_json::Map<String, Value>, id: &str) -> String {
    let name = str_field(obj, "name");
    if name.is_empty() {
        id.to_string()
    } else {
        name
    }
}

fn as_object<'a>(value: &'a Value, element: &'static str) -> EngineResult<&'a serde_json::Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        EngineError::MalformedDocument(format!("{element} entry is not an object: {value}"))
    })
}

fn entries<'a>(data: &'a serde_json::Map<String, Value>, key: &str) -> &'a [Value] {
    match data.get(key) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

impl Schema {
    /// Normalize an arbitrary document (imported JSON, AI draft) into a
    /// canonical schema.
    ///
    /// Fails only on structurally nonsensical input: a non-object document,
    /// non-object element entries, or non-numeric required numeric fields.
    /// Missing optional fields receive documented defaults, including
    /// fallback ids (`"S"`, `"flow"`, `"p"`, `"L"`), so partially-specified
    /// documents still normalize.
    pub fn from_value(data: &Value) -> EngineResult<Schema> {
        let data = data
            .as_object()
            .ok_or_else(|| EngineError::MalformedDocument("document is not an object".to_string()))?;

        let mut schema = Schema::default();

        for entry in entries(data, "stocks") {
            let obj = as_object(entry, "stock")?;
            let id = id_field(obj, "S");
            let initial = match obj.get("initial") {
                None | Some(Value::Null) => 0.0,
                Some(value) => coerce_float(value, "Stock", &id, "initial")?,
            };
            schema.stocks.push(Stock {
                name: name_field(obj, &id),
                initial,
                unit: str_field(obj, "unit"),
                source: str_field(obj, "source"),
                loop_type: str_field(obj, "loop_type"),
                id,
            });
        }

        for entry in entries(data, "flows") {
            let obj = as_object(entry, "flow")?;
            let id = id_field(obj, "flow");
            let rate = match obj.get("rate") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => "0".to_string(),
            };
            schema.flows.push(Flow {
                name: name_field(obj, &id),
                from: endpoint_field(obj, "from"),
                to: endpoint_field(obj, "to"),
                rate,
                unit: str_field(obj, "unit"),
                source: str_field(obj, "source"),
                loop_type: str_field(obj, "loop_type"),
                delay: str_field(obj, "delay"),
                mechanism: str_field(obj, "mechanism"),
                loop_ids: string_list(obj, "loop_ids"),
                id,
            });
        }

        for entry in entries(data, "parameters") {
            let obj = as_object(entry, "parameter")?;
            let id = id_field(obj, "p");
            let value = match obj.get("value") {
                None | Some(Value::Null) => 0.0,
                Some(value) => coerce_float(value, "Parameter", &id, "value")?,
            };
            schema.parameters.push(Parameter {
                name: name_field(obj, &id),
                value,
                unit: str_field(obj, "unit"),
                id,
            });
        }

        for entry in entries(data, "loops") {
            let obj = as_object(entry, "loop")?;
            let id = id_field(obj, "L");
            let kind = str_field(obj, "type")
                .trim()
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase().to_string())
                .unwrap_or_else(|| "R".to_string());
            schema.loops.push(Loop {
                name: name_field(obj, &id),
                kind,
                description: str_field(obj, "description"),
                flow_ids: string_list(obj, "flow_ids"),
                delay: str_field(obj, "delay"),
                id,
            });
        }

        // Clusters and alternatives are purely descriptive; entries without
        // an id are dropped rather than rejected.
        for entry in entries(data, "clusters") {
            if let Some(obj) = entry.as_object() {
                let id = str_field(obj, "id").trim().to_string();
                if !id.is_empty() {
                    schema.clusters.push(Cluster {
                        name: name_field(obj, &id),
                        stock_ids: string_list(obj, "stock_ids"),
                        id,
                    });
                }
            }
        }
        for entry in entries(data, "alternatives") {
            if let Some(obj) = entry.as_object() {
                let id = str_field(obj, "id").trim().to_string();
                if !id.is_empty() {
                    schema.alternatives.push(Alternative {
                        name: name_field(obj, &id),
                        stock_ids: string_list(obj, "stock_ids"),
                        id,
                    });
                }
            }
        }

        if let Some(Value::Object(meta)) = data.get("meta") {
            schema.meta = meta.clone();
        }

        Ok(schema)
    }

    /// Normalize a schema from JSON text.
    pub fn from_json(text: &str) -> EngineResult<Schema> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::MalformedDocument(e.to_string()))?;
        Schema::from_value(&value)
    }

    /// Export as the interchange JSON document.
    pub fn to_value(&self) -> EngineResult<Value> {
        serde_json::to_value(self).map_err(|e| EngineError::Error(e.to_string()))
    }

    /// Stock ids in schema order; this is the ordering contract for the
    /// state vector handed to an integrator.
    pub fn stock_ids(&self) -> Vec<String> {
        self.stocks.iter().map(|s| s.id.clone()).collect()
    }

    /// Initial stock values in schema order.
    pub fn initial_values(&self) -> Vec<FloatValue> {
        self.stocks.iter().map(|s| s.initial).collect()
    }

    /// Parameter id -> value bindings.
    pub fn parameter_values(&self) -> HashMap<String, FloatValue> {
        self.parameters
            .iter()
            .map(|p| (p.id.clone(), p.value))
            .collect()
    }

    pub fn get_stock(&self, id: &str) -> Option<&Stock> {
        self.stocks.iter().find(|s| s.id == id)
    }

    pub fn get_flow(&self, id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn get_parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Add a stock, returning a new schema. A no-op copy if the id exists
    /// (idempotent by id, first-write-wins).
    pub fn add_stock(&self, id: &str, name: Option<&str>, initial: FloatValue) -> Schema {
        let mut out = self.clone();
        if out.get_stock(id).is_none() {
            out.stocks.push(Stock {
                id: id.to_string(),
                name: name.unwrap_or(id).to_string(),
                initial,
                unit: String::new(),
                source: String::new(),
                loop_type: String::new(),
            });
        }
        out
    }

    /// Add a flow, returning a new schema. Endpoints may be `None` for an
    /// external source/sink. A no-op copy if the id exists.
    pub fn add_flow(
        &self,
        id: &str,
        from: Option<&str>,
        to: Option<&str>,
        rate: &str,
        name: Option<&str>,
    ) -> Schema {
        let mut out = self.clone();
        if out.get_flow(id).is_none() {
            out.flows.push(Flow {
                id: id.to_string(),
                name: name.unwrap_or(id).to_string(),
                from: from.filter(|s| !s.is_empty()).map(str::to_string),
                to: to.filter(|s| !s.is_empty()).map(str::to_string),
                rate: rate.to_string(),
                unit: String::new(),
                source: String::new(),
                loop_type: String::new(),
                delay: String::new(),
                mechanism: String::new(),
                loop_ids: Vec::new(),
            });
        }
        out
    }

    /// Add a parameter, returning a new schema. A no-op copy if the id exists.
    pub fn add_parameter(&self, id: &str, value: FloatValue, name: Option<&str>) -> Schema {
        let mut out = self.clone();
        if out.get_parameter(id).is_none() {
            out.parameters.push(Parameter {
                id: id.to_string(),
                name: name.unwrap_or(id).to_string(),
                value,
                unit: String::new(),
            });
        }
        out
    }

    /// Remove a stock and every flow touching it, returning a new schema.
    /// The cascade keeps the schema free of dangling endpoint references.
    pub fn remove_stock(&self, id: &str) -> Schema {
        let mut out = self.clone();
        out.stocks.retain(|s| s.id != id);
        out.flows
            .retain(|f| f.from.as_deref() != Some(id) && f.to.as_deref() != Some(id));
        out
    }

    /// Remove a single flow, returning a new schema.
    pub fn remove_flow(&self, id: &str) -> Schema {
        let mut out = self.clone();
        out.flows.retain(|f| f.id != id);
        out
    }

    /// Set one parameter's value in place.
    ///
    /// This is the one in-place mutation in the engine: it is invoked on
    /// every simulation tick from live UI state and must not reallocate the
    /// schema graph. Only safe under single-owner access; concurrent editors
    /// must operate on their own cloned schema.
    pub fn update_parameter(&mut self, id: &str, value: FloatValue) {
        if let Some(parameter) = self.parameters.iter_mut().find(|p| p.id == id) {
            parameter.value = value;
        }
    }
}

impl fmt::Display for Schema {
    /// Human-readable structure listing, for logs and console output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== MODEL STRUCTURE ===")?;
        writeln!(f)?;
        writeln!(f, "STOCKS (id, name, initial):")?;
        for stock in &self.stocks {
            writeln!(f, "  - {}: {} = {}", stock.id, stock.name, stock.initial)?;
        }
        writeln!(f)?;
        writeln!(f, "FLOWS (id, from -> to, rate expression):")?;
        for flow in &self.flows {
            writeln!(
                f,
                "  - {}: {} -> {}  rate = {}",
                flow.id,
                flow.from.as_deref().unwrap_or("source"),
                flow.to.as_deref().unwrap_or("sink"),
                flow.rate
            )?;
        }
        writeln!(f)?;
        writeln!(f, "PARAMETERS (id, name, value):")?;
        for parameter in &self.parameters {
            writeln!(
                f,
                "  - {}: {} = {}",
                parameter.id, parameter.name, parameter.value
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sir_document() -> Value {
        json!({
            "stocks": [
                {"id": "S", "name": "Susceptible", "initial": 990.0},
                {"id": "I", "name": "Infected", "initial": 10.0},
                {"id": "R", "name": "Recovered", "initial": 0.0},
            ],
            "flows": [
                {"id": "infection", "from": "S", "to": "I", "rate": "beta * S * I / N"},
                {"id": "recovery", "from": "I", "to": "R", "rate": "gamma * I"},
            ],
            "parameters": [
                {"id": "N", "name": "Population", "value": 1000.0},
                {"id": "beta", "value": 0.3},
                {"id": "gamma", "value": 0.1},
            ],
        })
    }

    #[test]
    fn normalizes_complete_document() {
        let schema = Schema::from_value(&sir_document()).unwrap();
        assert_eq!(schema.stock_ids(), vec!["S", "I", "R"]);
        assert_eq!(schema.initial_values(), vec![990.0, 10.0, 0.0]);
        assert_eq!(schema.parameter_values().get("beta"), Some(&0.3));
        // Name falls back to the id when absent
        assert_eq!(schema.get_parameter("beta").unwrap().name, "beta");
        // Advisory fields are uniformly present
        let infection = schema.get_flow("infection").unwrap();
        assert_eq!(infection.source, "");
        assert_eq!(infection.mechanism, "");
        assert!(infection.loop_ids.is_empty());
    }

    #[test]
    fn missing_ids_get_deterministic_fallbacks() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"initial": 1.0}],
            "flows": [{"rate": "1"}],
            "parameters": [{"value": 2.0}],
        }))
        .unwrap();
        assert_eq!(schema.stocks[0].id, "S");
        assert_eq!(schema.flows[0].id, "flow");
        assert_eq!(schema.parameters[0].id, "p");
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": "12.5"}],
            "parameters": [{"id": "k", "value": "0.25"}],
        }))
        .unwrap();
        assert_eq!(schema.stocks[0].initial, 12.5);
        assert_eq!(schema.parameters[0].value, 0.25);
    }

    #[test]
    fn non_numeric_required_field_is_a_hard_failure() {
        let err = Schema::from_value(&json!({
            "stocks": [{"id": "A", "initial": {"nested": true}}],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("initial"));

        let err = Schema::from_value(&json!({
            "parameters": [{"id": "k", "value": "not a number"}],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(Schema::from_value(&json!([1, 2, 3])).is_err());
        assert!(Schema::from_value(&json!({"stocks": ["oops"]})).is_err());
    }

    #[test]
    fn empty_endpoints_mean_source_and_sink() {
        let schema = Schema::from_value(&json!({
            "stocks": [{"id": "A"}],
            "flows": [
                {"id": "in", "to": "A", "rate": "1"},
                {"id": "out", "from": "A", "to": "", "rate": "1"},
            ],
        }))
        .unwrap();
        assert_eq!(schema.get_flow("in").unwrap().from, None);
        assert_eq!(schema.get_flow("out").unwrap().to, None);
    }

    #[test]
    fn loop_kind_normalized_to_single_letter() {
        let schema = Schema::from_value(&json!({
            "loops": [
                {"id": "L1", "type": "reinforcing"},
                {"id": "L2", "type": "B"},
                {"id": "L3"},
            ],
        }))
        .unwrap();
        assert_eq!(schema.loops[0].kind, "R");
        assert_eq!(schema.loops[1].kind, "B");
        assert_eq!(schema.loops[2].kind, "R");
    }

    #[test]
    fn clusters_without_ids_are_dropped() {
        let schema = Schema::from_value(&json!({
            "clusters": [
                {"id": "C1", "stock_ids": ["A"]},
                {"name": "no id"},
                "not an object",
            ],
        }))
        .unwrap();
        assert_eq!(schema.clusters.len(), 1);
        assert_eq!(schema.clusters[0].id, "C1");
    }

    #[test]
    fn add_operations_are_idempotent_by_id() {
        let schema = Schema::from_value(&sir_document()).unwrap();

        let with_stock = schema.add_stock("V", Some("Vaccinated"), 0.0);
        assert_eq!(with_stock.stocks.len(), 4);
        // First write wins
        let again = with_stock.add_stock("V", Some("Other name"), 99.0);
        assert_eq!(again, with_stock);

        let with_flow = schema.add_flow("vaccination", Some("S"), Some("R"), "nu * S", None);
        assert_eq!(with_flow.flows.len(), 3);
        assert_eq!(with_flow.add_flow("vaccination", None, None, "0", None), with_flow);

        let with_param = schema.add_parameter("nu", 0.01, None);
        assert_eq!(with_param.parameters.len(), 4);
        assert_eq!(with_param.add_parameter("nu", 0.5, None), with_param);

        // Value operations leave the input untouched
        assert_eq!(schema.stocks.len(), 3);
        assert_eq!(schema.flows.len(), 2);
        assert_eq!(schema.parameters.len(), 3);
    }

    #[test]
    fn remove_stock_cascades_to_touching_flows() {
        let schema = Schema::from_value(&sir_document()).unwrap();
        let out = schema.remove_stock("I");
        assert!(out.get_stock("I").is_none());
        assert!(out
            .flows
            .iter()
            .all(|f| f.from.as_deref() != Some("I") && f.to.as_deref() != Some("I")));
        // Both SIR flows touch I, so none survive
        assert!(out.flows.is_empty());
    }

    #[test]
    fn remove_flow_removes_only_that_flow() {
        let schema = Schema::from_value(&sir_document()).unwrap();
        let out = schema.remove_flow("recovery");
        assert_eq!(out.flows.len(), 1);
        assert_eq!(out.flows[0].id, "infection");
        assert_eq!(out.stocks.len(), 3);
    }

    #[test]
    fn update_parameter_mutates_in_place() {
        let mut schema = Schema::from_value(&sir_document()).unwrap();
        schema.update_parameter("beta", 0.5);
        assert_eq!(schema.get_parameter("beta").unwrap().value, 0.5);
        // Unknown ids are ignored
        schema.update_parameter("missing", 1.0);
        assert!(schema.get_parameter("missing").is_none());
    }

    #[test]
    fn roundtrips_through_json() {
        let schema = Schema::from_value(&sir_document()).unwrap();
        let text = serde_json::to_string(&schema).unwrap();
        let back = Schema::from_json(&text).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn display_lists_structure() {
        let schema = Schema::from_value(&sir_document()).unwrap();
        let listing = schema.to_string();
        assert!(listing.contains("STOCKS"));
        assert!(listing.contains("infection: S -> I"));
        assert!(listing.contains("beta: beta = 0.3"));
    }
}
