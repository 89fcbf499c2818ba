//! Reputation/backlash dynamics with explicit feedback loops.
//!
//! A publicity campaign raises exposure; exposure feeds public backlash,
//! backlash hardens regulation and erodes reputation, and regulation
//! constrains the order book. Each causal chain is annotated as a
//! reinforcing or balancing loop, and every flow carries a mechanism tag so
//! whole mechanisms can be switched off in simulation experiments.

use super::{flow, parameter, stock};
use serde_json::json;
use stockflow_core::schema::{Cluster, Flow, Loop, Schema};

fn tagged(base: Flow, loop_type: &str, mechanism: &str, loop_ids: &[&str]) -> Flow {
    Flow {
        loop_type: loop_type.to_string(),
        mechanism: mechanism.to_string(),
        loop_ids: loop_ids.iter().map(|s| s.to_string()).collect(),
        ..base
    }
}

fn feedback_loop(id: &str, name: &str, kind: &str, description: &str, flow_ids: &[&str]) -> Loop {
    Loop {
        id: id.to_string(),
        name: name.to_string(),
        kind: kind.to_string(),
        description: description.to_string(),
        flow_ids: flow_ids.iter().map(|s| s.to_string()).collect(),
        delay: String::new(),
    }
}

pub fn reputation_schema() -> Schema {
    let mut schema = Schema {
        stocks: vec![
            stock("exposure", "Public exposure", 20.0),
            stock("backlash", "Public backlash", 15.0),
            stock("regulation", "Regulatory pressure", 25.0),
            stock("reputation", "Reputation", 55.0),
            stock("orders", "Order book", 40.0),
        ],
        flows: vec![
            tagged(
                flow(
                    "campaign_exposure",
                    "Campaign raises exposure",
                    None,
                    Some("exposure"),
                    "campaign_rate",
                ),
                "R",
                "exposure",
                &["R1"],
            ),
            tagged(
                flow(
                    "exposure_decay",
                    "Exposure decay",
                    Some("exposure"),
                    None,
                    "decay_exposure * exposure",
                ),
                "B",
                "exposure",
                &["B1"],
            ),
            tagged(
                flow(
                    "exposure_backlash",
                    "Exposure feeds backlash",
                    Some("exposure"),
                    Some("backlash"),
                    "k_exposure_backlash * exposure * (1 - backlash / 100)",
                ),
                "R",
                "backlash",
                &["R1"],
            ),
            tagged(
                flow(
                    "backlash_decay",
                    "Backlash decay (news cycle)",
                    Some("backlash"),
                    None,
                    "decay_backlash * backlash",
                ),
                "B",
                "backlash",
                &["B2"],
            ),
            tagged(
                flow(
                    "backlash_regulation",
                    "Backlash hardens regulation",
                    Some("backlash"),
                    Some("regulation"),
                    "k_backlash_regulation * backlash * (1 - regulation / 100)",
                ),
                "R",
                "regulation",
                &["R1"],
            ),
            tagged(
                flow(
                    "regulation_decay",
                    "Regulation decay (policy cycle)",
                    Some("regulation"),
                    None,
                    "decay_regulation * regulation",
                ),
                "B",
                "regulation",
                &["B3"],
            ),
            tagged(
                flow(
                    "backlash_reputation",
                    "Backlash erodes reputation",
                    Some("reputation"),
                    None,
                    "k_backlash_reputation * backlash * reputation / 100",
                ),
                "R",
                "reputation",
                &["R2"],
            ),
            tagged(
                flow(
                    "reputation_recovery",
                    "Reputation recovery",
                    None,
                    Some("reputation"),
                    "recovery_rate * (100 - reputation) / 100",
                ),
                "B",
                "reputation",
                &["B4"],
            ),
            tagged(
                flow(
                    "reputation_orders",
                    "Reputation wins orders",
                    None,
                    Some("orders"),
                    "k_reputation_orders * reputation / 100 * base_orders",
                ),
                "R",
                "orders",
                &["R3"],
            ),
            tagged(
                flow(
                    "regulation_orders",
                    "Regulation constrains orders",
                    Some("orders"),
                    None,
                    "k_regulation_orders * regulation / 100 * orders / 100",
                ),
                "R",
                "regulation",
                &["R1"],
            ),
            tagged(
                flow(
                    "orders_fulfilled",
                    "Orders fulfilled",
                    Some("orders"),
                    None,
                    "fulfil_rate * orders / 100",
                ),
                "B",
                "orders",
                &["B5"],
            ),
        ],
        parameters: vec![
            parameter("campaign_rate", "Campaign exposure rate", 1.2),
            parameter("decay_exposure", "Exposure decay", 0.03),
            parameter("k_exposure_backlash", "Exposure to backlash", 0.15),
            parameter("decay_backlash", "Backlash decay", 0.05),
            parameter("k_backlash_regulation", "Backlash to regulation", 0.12),
            parameter("decay_regulation", "Regulation decay", 0.02),
            parameter("k_backlash_reputation", "Reputation erosion", 0.08),
            parameter("recovery_rate", "Reputation recovery", 2.0),
            parameter("k_reputation_orders", "Reputation to orders", 0.5),
            parameter("base_orders", "Base order inflow", 15.0),
            parameter("k_regulation_orders", "Regulatory order loss", 0.06),
            parameter("fulfil_rate", "Order fulfilment", 0.04),
        ],
        loops: vec![
            feedback_loop(
                "R1",
                "Backlash spiral",
                "R",
                "More exposure, more backlash, stricter regulation, fewer orders. \
                 Amplifies over time.",
                &[
                    "campaign_exposure",
                    "exposure_backlash",
                    "backlash_regulation",
                    "regulation_orders",
                ],
            ),
            feedback_loop(
                "R2",
                "Backlash erodes reputation",
                "R",
                "Backlash pulls reputation down, reducing licence to operate.",
                &["backlash_reputation"],
            ),
            feedback_loop(
                "R3",
                "Reputation wins orders",
                "R",
                "Better reputation brings in more orders; success breeds success.",
                &["reputation_orders"],
            ),
            feedback_loop(
                "B1",
                "Exposure decay",
                "B",
                "Attention moves on; exposure fades without new campaigns.",
                &["exposure_decay"],
            ),
            feedback_loop(
                "B2",
                "News cycle",
                "B",
                "Backlash decays as public attention fades.",
                &["backlash_decay"],
            ),
            feedback_loop(
                "B3",
                "Policy cycle",
                "B",
                "Regulation eases over time as the policy cycle turns.",
                &["regulation_decay"],
            ),
            feedback_loop(
                "B4",
                "Reputation recovery",
                "B",
                "Transparency and compliance slowly restore reputation.",
                &["reputation_recovery"],
            ),
            feedback_loop(
                "B5",
                "Order fulfilment",
                "B",
                "Delivery drains the order book; normal business flow.",
                &["orders_fulfilled"],
            ),
        ],
        clusters: vec![
            Cluster {
                id: "C1".to_string(),
                name: "Visibility and backlash".to_string(),
                stock_ids: vec!["exposure".to_string(), "backlash".to_string()],
            },
            Cluster {
                id: "C2".to_string(),
                name: "Regulatory pressure".to_string(),
                stock_ids: vec!["regulation".to_string()],
            },
            Cluster {
                id: "C3".to_string(),
                name: "Reputation and orders".to_string(),
                stock_ids: vec!["reputation".to_string(), "orders".to_string()],
            },
        ],
        ..Schema::default()
    };
    schema.meta.insert("id".to_string(), json!("reputation"));
    schema
        .meta
        .insert("name".to_string(), json!("Reputation and backlash"));
    schema.meta.insert(
        "question".to_string(),
        json!("What happens to the order book if the campaign keeps running?"),
    );
    schema
        .meta
        .insert("horizon_years".to_string(), json!(10));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use stockflow_core::ode::VectorField;
    use stockflow_core::validate::validate;

    #[test]
    fn schema_is_consistent() {
        // Every loop/flow cross-reference in both directions must resolve
        assert!(validate(&reputation_schema()).is_empty());
    }

    #[test]
    fn every_flow_carries_a_mechanism_tag() {
        let schema = reputation_schema();
        assert!(schema.flows.iter().all(|f| !f.mechanism.is_empty()));
    }

    #[test]
    fn excluding_the_backlash_mechanism_removes_its_flows() {
        let schema = reputation_schema();
        let excluded: HashSet<String> = ["backlash".to_string()].into_iter().collect();
        let field = VectorField::compile_filtered(&schema, Some(&excluded), None);
        assert!(!field.flow_ids().contains(&"exposure_backlash"));
        assert!(!field.flow_ids().contains(&"backlash_decay"));
        assert!(field.flow_ids().contains(&"campaign_exposure"));
    }
}
