//! Likelihood model - the per-agent, per-state observation tables.
//!
//! A [`LikelihoodModel`] holds one `states x params` table per agent. For
//! categorical kinds each table row is a probability simplex over the
//! discrete outcomes; for the Gaussian kind the param axis is exactly
//! `(mean, std)`. Tables are validated once and immutable afterwards, so a
//! single model can be shared read-only across engine instances.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::BeliefError;

/// Tolerance for simplex row sums at construction.
const SIMPLEX_TOLERANCE: f64 = 1e-6;

/// Lower bound applied to the standardized Gaussian density during local
/// updates, so a far-out observation cannot zero an intermediate belief.
pub const GAUSSIAN_DENSITY_FLOOR: f64 = 1e-3;

/// How observations relate to the likelihood tables.
///
/// The two categorical kinds behave identically at observation and sampling
/// time; they differ only in how experiment scenarios synthesize the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationKind {
    /// Discrete outcomes, manually constructed base simplex plus noise.
    CategoricalManual,

    /// Discrete outcomes, fully random simplex.
    CategoricalRandom,

    /// Continuous outcomes, `(mean, std)` parameters per state.
    Gaussian,
}

impl ObservationKind {
    /// Maps the numeric option used by experiment configs (0, 1, 2).
    pub fn from_option(option: u8) -> Result<Self, BeliefError> {
        match option {
            0 => Ok(ObservationKind::CategoricalManual),
            1 => Ok(ObservationKind::CategoricalRandom),
            2 => Ok(ObservationKind::Gaussian),
            other => Err(BeliefError::config(format!(
                "unsupported observation kind option {other} (expected 0, 1 or 2)"
            ))),
        }
    }

    /// True for both discrete-outcome kinds.
    pub fn is_categorical(&self) -> bool {
        !matches!(self, ObservationKind::Gaussian)
    }
}

/// Immutable likelihood tables for every agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodModel {
    kind: ObservationKind,

    /// One `states x params` table per agent.
    tables: Vec<DMatrix<f64>>,

    states: usize,
    params: usize,
}

impl LikelihoodModel {
    /// Builds and validates a model.
    ///
    /// Categorical kinds require every `(agent, state)` row to be a
    /// probability simplex; the Gaussian kind requires `params == 2` with a
    /// strictly positive std.
    pub fn new(kind: ObservationKind, tables: Vec<DMatrix<f64>>) -> Result<Self, BeliefError> {
        if tables.is_empty() {
            return Err(BeliefError::config("likelihood model needs at least one agent"));
        }

        let states = tables[0].nrows();
        let params = tables[0].ncols();
        if states == 0 || params == 0 {
            return Err(BeliefError::config("likelihood tables must be non-empty"));
        }

        for (agent, table) in tables.iter().enumerate() {
            if table.nrows() != states || table.ncols() != params {
                return Err(BeliefError::config(format!(
                    "agent {agent} table is {}x{}, expected {states}x{params}",
                    table.nrows(),
                    table.ncols()
                )));
            }

            match kind {
                ObservationKind::CategoricalManual | ObservationKind::CategoricalRandom => {
                    for state in 0..states {
                        let row = table.row(state);
                        if row.iter().any(|&p| p < 0.0) {
                            return Err(BeliefError::config(format!(
                                "agent {agent} state {state} has a negative probability"
                            )));
                        }
                        let total: f64 = row.iter().sum();
                        if (total - 1.0).abs() > SIMPLEX_TOLERANCE {
                            return Err(BeliefError::config(format!(
                                "agent {agent} state {state} row sums to {total}, expected 1"
                            )));
                        }
                    }
                }
                ObservationKind::Gaussian => {
                    if params != 2 {
                        return Err(BeliefError::config(format!(
                            "Gaussian tables need exactly (mean, std) columns, got {params}"
                        )));
                    }
                    for state in 0..states {
                        let std = table[(state, 1)];
                        if std <= 0.0 {
                            return Err(BeliefError::config(format!(
                                "agent {agent} state {state} has non-positive std {std}"
                            )));
                        }
                    }
                }
            }
        }

        Ok(Self { kind, tables, states, params })
    }

    pub fn kind(&self) -> ObservationKind {
        self.kind
    }

    pub fn agents(&self) -> usize {
        self.tables.len()
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn params(&self) -> usize {
        self.params
    }

    /// The `states x params` table of one agent.
    pub fn table(&self, agent: usize) -> &DMatrix<f64> {
        &self.tables[agent]
    }

    /// Likelihood of observing `x` at `(agent, state)`.
    ///
    /// Categorical kinds index the outcome simplex with `x as usize`. The
    /// Gaussian kind evaluates the standardized density `phi((x - mean)/std)`
    /// without rescaling by `1/std` (a reproduced modeling simplification),
    /// floored at [`GAUSSIAN_DENSITY_FLOOR`].
    pub fn observation_likelihood(&self, agent: usize, state: usize, x: f64) -> f64 {
        match self.kind {
            ObservationKind::CategoricalManual | ObservationKind::CategoricalRandom => {
                self.tables[agent][(state, x as usize)]
            }
            ObservationKind::Gaussian => {
                let mean = self.tables[agent][(state, 0)];
                let std = self.tables[agent][(state, 1)];
                let z = (x - mean) / std;
                standard_normal_pdf(z).max(GAUSSIAN_DENSITY_FLOOR)
            }
        }
    }

    /// Divergence D(s0 || s1) between two states of one agent.
    ///
    /// Categorical kinds use the Kullback-Leibler divergence. The Gaussian
    /// kind uses `sigma1/sigma0 + (sigma0^2 + (mu0 - mu1)^2) / (2 sigma1^2)`,
    /// the closed form the reference model defines for this recursion.
    pub fn divergence(&self, agent: usize, s0: usize, s1: usize) -> f64 {
        let table = &self.tables[agent];
        match self.kind {
            ObservationKind::CategoricalManual | ObservationKind::CategoricalRandom => {
                let mut total = 0.0;
                for param in 0..self.params {
                    let p0 = table[(s0, param)];
                    let p1 = table[(s1, param)];
                    total += p0 * (p0 / p1).ln();
                }
                total
            }
            ObservationKind::Gaussian => {
                let (mu0, sigma0) = (table[(s0, 0)], table[(s0, 1)]);
                let (mu1, sigma1) = (table[(s1, 0)], table[(s1, 1)]);
                sigma1 / sigma0 + (sigma0 * sigma0 + (mu0 - mu1).powi(2)) / (2.0 * sigma1 * sigma1)
            }
        }
    }
}

/// Density of the standard normal distribution at `z`.
pub(crate) fn standard_normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}
