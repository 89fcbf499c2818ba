//! Deterministic merge-by-id patching of a schema.
//!
//! A patch is a partial schema: per element kind, a list of entries carrying
//! an `id` plus only the fields to change. Known ids are updated field by
//! field; unknown ids append a new element with documented defaults. A patch
//! touching one field of one element leaves everything else in the schema
//! byte-for-byte identical, and applying the same absolute-valued patch
//! twice yields the same schema as applying it once.

use crate::errors::{EngineError, EngineResult};
use crate::schema::{Flow, Parameter, Schema, Stock};
use crate::FloatValue;
use log::debug;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Accept a float given as a JSON number or a numeric string; reject
/// anything else. `null` and absent both mean "leave untouched".
fn opt_float<'de, D>(deserializer: D) -> Result<Option<FloatValue>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("number out of range")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<FloatValue>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got '{s}'"))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

/// Accept a rate given as a string or a bare number.
fn opt_rate<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a rate expression, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StockPatch {
    pub id: String,
    pub name: Option<String>,
    #[serde(deserialize_with = "opt_float")]
    pub initial: Option<FloatValue>,
    pub unit: Option<String>,
    pub source: Option<String>,
    pub loop_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowPatch {
    pub id: String,
    pub name: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(deserialize_with = "opt_rate")]
    pub rate: Option<String>,
    pub unit: Option<String>,
    pub source: Option<String>,
    pub loop_type: Option<String>,
    pub delay: Option<String>,
    pub mechanism: Option<String>,
    pub loop_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterPatch {
    pub id: String,
    pub name: Option<String>,
    #[serde(deserialize_with = "opt_float")]
    pub value: Option<FloatValue>,
    pub unit: Option<String>,
}

/// A partial schema consumed once by [`apply_patch`]. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaPatch {
    pub stocks: Vec<StockPatch>,
    pub flows: Vec<FlowPatch>,
    pub parameters: Vec<ParameterPatch>,
}

impl SchemaPatch {
    /// Parse a patch document (e.g. an AI-suggested edit).
    pub fn from_value(data: &Value) -> EngineResult<SchemaPatch> {
        serde_json::from_value(data.clone())
            .map_err(|e| EngineError::MalformedDocument(e.to_string()))
    }

    pub fn from_json(text: &str) -> EngineResult<SchemaPatch> {
        serde_json::from_str(text).map_err(|e| EngineError::MalformedDocument(e.to_string()))
    }
}

/// An endpoint update: an empty string clears the endpoint (boundary
/// source/sink), any other string sets it.
fn endpoint(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Merge a patch into a schema by id, returning a new schema.
///
/// Entries without an id are skipped. For existing elements only the fields
/// present in the entry are overwritten; for unknown ids a new element is
/// appended, with omitted fields defaulted (new elements carry
/// `source = "ai"` unless the patch says otherwise, since patches are the
/// path AI-suggested edits arrive through).
pub fn apply_patch(schema: &Schema, patch: &SchemaPatch) -> Schema {
    let mut out = schema.clone();
    let mut updated = 0usize;
    let mut appended = 0usize;

    for entry in &patch.stocks {
        if entry.id.is_empty() {
            continue;
        }
        match out.stocks.iter_mut().find(|s| s.id == entry.id) {
            Some(stock) => {
                if let Some(name) = &entry.name {
                    stock.name = name.clone();
                }
                if let Some(initial) = entry.initial {
                    stock.initial = initial;
                }
                if let Some(unit) = &entry.unit {
                    stock.unit = unit.clone();
                }
                if let Some(source) = &entry.source {
                    stock.source = source.clone();
                }
                if let Some(loop_type) = &entry.loop_type {
                    stock.loop_type = loop_type.clone();
                }
                updated += 1;
            }
            None => {
                out.stocks.push(Stock {
                    id: entry.id.clone(),
                    name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
                    initial: entry.initial.unwrap_or(0.0),
                    unit: entry.unit.clone().unwrap_or_default(),
                    source: entry.source.clone().unwrap_or_else(|| "ai".to_string()),
                    loop_type: entry.loop_type.clone().unwrap_or_default(),
                });
                appended += 1;
            }
        }
    }

    for entry in &patch.flows {
        if entry.id.is_empty() {
            continue;
        }
        match out.flows.iter_mut().find(|f| f.id == entry.id) {
            Some(flow) => {
                if let Some(name) = &entry.name {
                    flow.name = name.clone();
                }
                if let Some(from) = &entry.from {
                    flow.from = endpoint(from);
                }
                if let Some(to) = &entry.to {
                    flow.to = endpoint(to);
                }
                if let Some(rate) = &entry.rate {
                    flow.rate = rate.clone();
                }
                if let Some(unit) = &entry.unit {
                    flow.unit = unit.clone();
                }
                if let Some(source) = &entry.source {
                    flow.source = source.clone();
                }
                if let Some(loop_type) = &entry.loop_type {
                    flow.loop_type = loop_type.clone();
                }
                if let Some(delay) = &entry.delay {
                    flow.delay = delay.clone();
                }
                if let Some(mechanism) = &entry.mechanism {
                    flow.mechanism = mechanism.clone();
                }
                if let Some(loop_ids) = &entry.loop_ids {
                    flow.loop_ids = loop_ids.clone();
                }
                updated += 1;
            }
            None => {
                out.flows.push(Flow {
                    id: entry.id.clone(),
                    name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
                    from: entry.from.as_deref().and_then(endpoint),
                    to: entry.to.as_deref().and_then(endpoint),
                    rate: entry.rate.clone().unwrap_or_else(|| "0".to_string()),
                    unit: entry.unit.clone().unwrap_or_default(),
                    source: entry.source.clone().unwrap_or_else(|| "ai".to_string()),
                    loop_type: entry.loop_type.clone().unwrap_or_default(),
                    delay: entry.delay.clone().unwrap_or_default(),
                    mechanism: entry.mechanism.clone().unwrap_or_default(),
                    loop_ids: entry.loop_ids.clone().unwrap_or_default(),
                });
                appended += 1;
            }
        }
    }

    for entry in &patch.parameters {
        if entry.id.is_empty() {
            continue;
        }
        match out.parameters.iter_mut().find(|p| p.id == entry.id) {
            Some(parameter) => {
                if let Some(name) = &entry.name {
                    parameter.name = name.clone();
                }
                if let Some(value) = entry.value {
                    parameter.value = value;
                }
                if let Some(unit) = &entry.unit {
                    parameter.unit = unit.clone();
                }
                updated += 1;
            }
            None => {
                out.parameters.push(Parameter {
                    id: entry.id.clone(),
                    name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
                    value: entry.value.unwrap_or(0.0),
                    unit: entry.unit.clone().unwrap_or_default(),
                });
                appended += 1;
            }
        }
    }

    debug!("patch applied: {updated} element(s) updated, {appended} appended");
    out
}
