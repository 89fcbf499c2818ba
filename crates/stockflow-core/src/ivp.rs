//! Bridging a compiled vector field to the external IVP solver.
//!
//! The engine's only obligation to the solver is a pure, repeatedly-callable
//! derivative function plus an ordered initial-state vector; everything here
//! is glue around `ode_solvers`. Divergence detection is deliberately a
//! post-hoc check over the solver's output, not something the vector field
//! itself is aware of.

use crate::errors::{EngineError, EngineResult};
use crate::ode::VectorField;
use crate::schema::Schema;
use crate::{FloatValue, Time};
use log::debug;
use nalgebra::DVector;
use ode_solvers::dopri5::Dopri5;
use ode_solvers::System;
use std::collections::{HashMap, HashSet};

/// State vector handed to the solver, ordered as `schema.stocks`.
pub type State = DVector<FloatValue>;

/// Magnitude beyond which a stock trajectory is reported as divergent.
pub const DIVERGENCE_THRESHOLD: FloatValue = 1e10;

/// Tolerances and output resolution for the adaptive solver.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub rtol: FloatValue,
    pub atol: FloatValue,
    /// Interval between dense-output samples.
    pub output_step: Time,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            output_step: 1.0,
        }
    }
}

/// Adapter implementing the solver's system trait over a [`VectorField`].
pub struct StockFlowSystem {
    field: VectorField,
}

impl StockFlowSystem {
    pub fn new(field: VectorField) -> Self {
        Self { field }
    }
}

impl System<Time, State> for StockFlowSystem {
    fn system(&self, t: Time, y: &State, dy: &mut State) {
        let derivatives = self.field.derivatives(t, y.as_slice());
        for (i, value) in derivatives.iter().enumerate() {
            dy[i] = *value;
        }
    }
}

/// Time series produced by a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationResults {
    pub times: Vec<Time>,
    /// Stock ids labelling the state components, in state-vector order.
    pub stock_ids: Vec<String>,
    /// One state vector per entry of `times`.
    pub values: Vec<Vec<FloatValue>>,
}

impl SimulationResults {
    /// The trajectory of a single stock, if it exists.
    pub fn stock_series(&self, id: &str) -> Option<Vec<FloatValue>> {
        let index = self.stock_ids.iter().position(|s| s == id)?;
        Some(self.values.iter().map(|state| state[index]).collect())
    }

    /// Stock id -> value at the final output time.
    pub fn final_values(&self) -> HashMap<String, FloatValue> {
        match self.values.last() {
            Some(state) => self
                .stock_ids
                .iter()
                .cloned()
                .zip(state.iter().copied())
                .collect(),
            None => HashMap::new(),
        }
    }
}

/// Integrate a schema from `t = 0` to `horizon` with an adaptive
/// Dormand-Prince solver.
pub fn simulate(
    schema: &Schema,
    horizon: Time,
    options: &SolverOptions,
) -> EngineResult<SimulationResults> {
    run(schema, horizon, options, VectorField::compile(schema))
}

/// Like [`simulate`], but with flows of the given mechanisms left out:
/// the "what happens without mechanism X" experiment.
pub fn simulate_excluding(
    schema: &Schema,
    horizon: Time,
    options: &SolverOptions,
    exclude_mechanisms: &HashSet<String>,
) -> EngineResult<SimulationResults> {
    let field = VectorField::compile_filtered(schema, Some(exclude_mechanisms), None);
    run(schema, horizon, options, field)
}

fn run(
    schema: &Schema,
    horizon: Time,
    options: &SolverOptions,
    field: VectorField,
) -> EngineResult<SimulationResults> {
    let stock_ids = field.stock_ids().to_vec();
    if stock_ids.is_empty() {
        return Ok(SimulationResults {
            times: Vec::new(),
            stock_ids,
            values: Vec::new(),
        });
    }

    debug!(
        "integrating {} stock(s) over horizon {horizon}",
        stock_ids.len()
    );

    let y0 = State::from_vec(schema.initial_values());
    let mut stepper = Dopri5::new(
        StockFlowSystem::new(field),
        0.0,
        horizon,
        options.output_step,
        y0,
        options.rtol,
        options.atol,
    );
    stepper
        .integrate()
        .map_err(|e| EngineError::IntegrationFailed(e.to_string()))?;

    let times = stepper.x_out().clone();
    let values = stepper
        .y_out()
        .iter()
        .map(|state| state.iter().copied().collect())
        .collect();

    Ok(SimulationResults {
        times,
        stock_ids,
        values,
    })
}

/// A labelled parameter-override experiment for batch runs.
#[derive(Debug, Clone)]
pub struct Variant {
    pub label: String,
    /// Parameter id -> value override.
    pub overrides: HashMap<String, FloatValue>,
}

/// Run the same schema under several parameter overrides.
///
/// Each variant runs against its own clone of the schema, so the in-place
/// `update_parameter` contract stays single-owner and the input schema is
/// never disturbed.
pub fn simulate_variants(
    schema: &Schema,
    horizon: Time,
    options: &SolverOptions,
    variants: &[Variant],
) -> EngineResult<Vec<(String, SimulationResults)>> {
    variants
        .iter()
        .map(|variant| {
            let mut cloned = schema.clone();
            for (parameter_id, value) in &variant.overrides {
                cloned.update_parameter(parameter_id, *value);
            }
            simulate(&cloned, horizon, options).map(|results| (variant.label.clone(), results))
        })
        .collect()
}

/// Scan a result set for non-finite or runaway trajectories.
///
/// Returns one warning per offending stock, naming the first output time at
/// which the trajectory went bad. An empty list means every stock stayed
/// finite and below [`DIVERGENCE_THRESHOLD`].
pub fn check_divergence(results: &SimulationResults) -> Vec<String> {
    let mut warnings = Vec::new();
    for (index, stock_id) in results.stock_ids.iter().enumerate() {
        for (step, state) in results.values.iter().enumerate() {
            let value = state[index];
            if !value.is_finite() {
                let kind = if value.is_nan() { "NaN" } else { "Inf" };
                warnings.push(format!(
                    "{stock_id} diverged ({kind}) at t={:.1}",
                    results.times[step]
                ));
                break;
            }
            if value.abs() > DIVERGENCE_THRESHOLD {
                warnings.push(format!(
                    "{stock_id} exceeded threshold at t={:.1}",
                    results.times[step]
                ));
                break;
            }
        }
    }
    warnings
}
