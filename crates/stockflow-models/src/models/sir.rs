//! Classic Susceptible-Infected-Recovered epidemic model.

use super::{flow, parameter, stock};
use serde_json::json;
use stockflow_core::schema::Schema;

/// SIR with a population of 1000, ten initial infections and a basic
/// reproduction number of 3 (beta/gamma).
pub fn sir_schema() -> Schema {
    let mut schema = Schema {
        stocks: vec![
            stock("S", "Susceptible", 990.0),
            stock("I", "Infected", 10.0),
            stock("R", "Recovered", 0.0),
        ],
        flows: vec![
            flow(
                "infection",
                "infection",
                Some("S"),
                Some("I"),
                "beta * S * I / N",
            ),
            flow("recovery", "recovery", Some("I"), Some("R"), "gamma * I"),
        ],
        parameters: vec![
            parameter("N", "Population", 1000.0),
            parameter("beta", "Transmission", 0.3),
            parameter("gamma", "Recovery rate", 0.1),
        ],
        ..Schema::default()
    };
    schema.meta.insert("id".to_string(), json!("sir"));
    schema
        .meta
        .insert("name".to_string(), json!("SIR (epidemic)"));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use stockflow_core::ode::VectorField;
    use stockflow_core::validate::validate;

    #[test]
    fn schema_is_consistent() {
        assert!(validate(&sir_schema()).is_empty());
    }

    #[test]
    fn initial_derivatives_match_the_closed_form() {
        let schema = sir_schema();
        let field = VectorField::compile(&schema);
        let dy = field.derivatives(0.0, &schema.initial_values());
        assert!(is_close!(dy[0], -2.97));
        assert!(is_close!(dy[1], 1.97));
        assert!(is_close!(dy[2], 1.0));
    }
}
