pub mod errors;
pub mod expr;
pub mod ivp;
pub mod ode;
pub mod patch;
pub mod schema;
pub mod validate;

/// Scalar type used for stock values, parameter values and flow rates.
pub type FloatValue = f64;

/// Simulation time (same scalar as the state values).
pub type Time = FloatValue;
