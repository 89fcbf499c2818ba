//! Staged delivery pipeline with a stakeholder-trust stock.
//!
//! Work moves through research, integration and certification before
//! delivery; deliveries build trust, which decays back toward a floor.

use super::{flow, parameter, stock};
use serde_json::json;
use stockflow_core::schema::{Flow, Schema};

pub fn pipeline_schema() -> Schema {
    let mut schema = Schema {
        stocks: vec![
            stock("rd", "Research pipeline", 20.0),
            stock("integration", "Integration", 5.0),
            stock("cert", "Certification queue", 3.0),
            stock("delivered", "Delivered", 0.0),
            stock("trust", "Stakeholder trust", 60.0),
        ],
        flows: vec![
            flow("new_programs", "New programs", None, Some("rd"), "intake"),
            flow(
                "rd_completion",
                "Research completion",
                Some("rd"),
                Some("integration"),
                "k_rd * rd",
            ),
            flow(
                "integration_completion",
                "Integration completion",
                Some("integration"),
                Some("cert"),
                "k_int * integration",
            ),
            flow(
                "certification",
                "Certification to delivery",
                Some("cert"),
                Some("delivered"),
                "k_cert * cert / oversight",
            ),
            Flow {
                loop_type: "B".to_string(),
                ..flow(
                    "trust_gain",
                    "Trust gain per delivery",
                    None,
                    Some("trust"),
                    "trust_per_delivery * k_cert * cert / oversight",
                )
            },
            Flow {
                loop_type: "B".to_string(),
                ..flow(
                    "trust_decay",
                    "Trust decay",
                    Some("trust"),
                    None,
                    "decay_trust * max(trust - trust_floor, 0)",
                )
            },
        ],
        parameters: vec![
            parameter("intake", "New programs per month", 1.2),
            parameter("k_rd", "Research completion rate", 0.08),
            parameter("k_int", "Integration rate", 0.12),
            parameter("k_cert", "Certification rate", 0.15),
            parameter("oversight", "Oversight factor", 1.0),
            parameter("trust_per_delivery", "Trust gain per delivery", 1.5),
            parameter("decay_trust", "Trust decay", 0.02),
            parameter("trust_floor", "Trust floor", 20.0),
        ],
        ..Schema::default()
    };
    schema.meta.insert("id".to_string(), json!("pipeline"));
    schema
        .meta
        .insert("name".to_string(), json!("Delivery pipeline and trust"));
    schema
        .meta
        .insert("horizon_years".to_string(), json!(5));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::ode::VectorField;
    use stockflow_core::validate::validate;

    #[test]
    fn schema_is_consistent() {
        assert!(validate(&pipeline_schema()).is_empty());
    }

    #[test]
    fn trust_decay_is_clamped_at_the_floor() {
        let mut schema = pipeline_schema();
        // Drop trust below its floor; max() then zeroes the decay flow
        if let Some(trust) = schema.stocks.iter_mut().find(|s| s.id == "trust") {
            trust.initial = 10.0;
        }
        let field = VectorField::compile(&schema);
        let dy = field.derivatives(0.0, &schema.initial_values());
        let trust_index = field.stock_ids().iter().position(|s| s == "trust").unwrap();
        // Only the gain flow contributes
        assert!(dy[trust_index] > 0.0);
    }
}
