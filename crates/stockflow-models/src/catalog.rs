//! Catalog of built-in models.

use crate::models::{pipeline_schema, reputation_schema, sir_schema};
use stockflow_core::schema::Schema;

/// A catalog entry: a stable id, display metadata and a schema constructor.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub load: fn() -> Schema,
}

/// Every built-in model, in presentation order.
pub fn catalog() -> Vec<ModelInfo> {
    vec![
        ModelInfo {
            id: "sir",
            name: "SIR (epidemic)",
            description: "Classic Susceptible-Infected-Recovered; learning and validation.",
            load: sir_schema,
        },
        ModelInfo {
            id: "pipeline",
            name: "Delivery pipeline and trust",
            description: "Research, integration and certification stages feeding delivery, \
                          with stakeholder trust built per delivery.",
            load: pipeline_schema,
        },
        ModelInfo {
            id: "reputation",
            name: "Reputation and backlash",
            description: "Exposure, backlash, regulation, reputation and orders with \
                          explicit reinforcing and balancing loops.",
            load: reputation_schema,
        },
    ]
}

/// Load a built-in model by id.
pub fn load_model(id: &str) -> Option<Schema> {
    catalog()
        .into_iter()
        .find(|info| info.id == id)
        .map(|info| (info.load)())
}
