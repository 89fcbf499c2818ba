//! Built-in models for the stock-and-flow engine.
//!
//! Each model is a plain schema constructor; nothing here carries
//! behaviour of its own. Models are organised by domain:
//! - `sir`: the classic Susceptible-Infected-Recovered epidemic,
//!   used for learning and engine validation
//! - `pipeline`: a staged delivery pipeline with a trust stock
//! - `reputation`: a reputation/backlash model with explicit
//!   reinforcing and balancing loops
//!
//! The `catalog` module lists every built-in model with a stable id.

pub mod catalog;
pub mod models;
