pub mod pipeline;
pub mod reputation;
pub mod sir;

pub use pipeline::pipeline_schema;
pub use reputation::reputation_schema;
pub use sir::sir_schema;

use stockflow_core::schema::{Flow, Parameter, Stock};
use stockflow_core::FloatValue;

/// Shorthand constructors for hand-written schemas. Every advisory field
/// defaults to empty; callers override what they need with struct update
/// syntax.
pub(crate) fn stock(id: &str, name: &str, initial: FloatValue) -> Stock {
    Stock {
        id: id.to_string(),
        name: name.to_string(),
        initial,
        unit: String::new(),
        source: String::new(),
        loop_type: String::new(),
    }
}

pub(crate) fn flow(
    id: &str,
    name: &str,
    from: Option<&str>,
    to: Option<&str>,
    rate: &str,
) -> Flow {
    Flow {
        id: id.to_string(),
        name: name.to_string(),
        from: from.map(str::to_string),
        to: to.map(str::to_string),
        rate: rate.to_string(),
        unit: String::new(),
        source: String::new(),
        loop_type: String::new(),
        delay: String::new(),
        mechanism: String::new(),
        loop_ids: Vec::new(),
    }
}

pub(crate) fn parameter(id: &str, name: &str, value: FloatValue) -> Parameter {
    Parameter {
        id: id.to_string(),
        name: name.to_string(),
        value,
        unit: String::new(),
    }
}
