//! Likelihood-tensor synthesis for experiment scenarios.
//!
//! Each scenario builds the `agents x states x params` tables a trial needs,
//! hands them to [`LikelihoodModel::new`] and inherits its validation. The
//! two categorical construction styles map onto the two categorical
//! observation kinds; at observation time they behave identically.

use beliefnet_core::{BeliefError, LikelihoodModel, ObservationKind};
use nalgebra::DMatrix;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How likelihood tables are synthesized for a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LikelihoodScenario {
    /// One random base simplex per agent, repeated across states with
    /// `var`-scaled noise: states barely differ, learning is slow.
    ManualNoise { var: f64 },

    /// Fully random per-state simplexes.
    Random,

    /// Gaussian `(mean, std)` pairs, mean uniform in `[0, max_mean)` and
    /// std uniform in `(0, max_std]`.
    GaussianRandom { max_mean: f64, max_std: f64 },

    /// Deterministic construction where the first `num_inf` agents
    /// (influencers) get strongly state-dependent tables and the rest get
    /// weakly informative ones.
    Influencers { num_inf: usize },

    /// Per-agent planted informative distribution at that agent's true
    /// state, flipped (uninformative) everywhere else. The informativeness
    /// ramp starts at 0.1 for the first three agents and climbs from 0.35
    /// toward 0.5 for the rest.
    Planted { state_true: Vec<usize> },

    /// Deterministic binary table shared by every agent: state `s` carries
    /// outcome-0 probability `0.2 + 0.8 s / states`, so states are evenly
    /// spread over the probability range.
    Ramp,
}

/// Synthesizes a likelihood model for `agents` agents over `states` states.
///
/// `params` is the discrete outcome count for the categorical scenarios;
/// the Gaussian scenario always uses two parameters, and the planted
/// scenario requires binary outcomes.
pub fn synthesize(
    agents: usize,
    states: usize,
    params: usize,
    scenario: &LikelihoodScenario,
    rng: &mut ChaCha8Rng,
) -> Result<LikelihoodModel, BeliefError> {
    if agents == 0 || states == 0 || params == 0 {
        return Err(BeliefError::config(
            "scenario synthesis needs at least one agent, state and parameter",
        ));
    }

    match scenario {
        LikelihoodScenario::ManualNoise { var } => {
            let mut tables = Vec::with_capacity(agents);
            for _ in 0..agents {
                let base: Vec<f64> = (0..params).map(|_| rng.gen::<f64>()).collect();
                let mut table = DMatrix::zeros(states, params);
                for state in 0..states {
                    for param in 0..params {
                        table[(state, param)] = base[param] + var * rng.gen::<f64>();
                    }
                }
                normalize_rows(&mut table);
                tables.push(table);
            }
            LikelihoodModel::new(ObservationKind::CategoricalManual, tables)
        }
        LikelihoodScenario::Random => {
            let mut tables = Vec::with_capacity(agents);
            for _ in 0..agents {
                let mut table =
                    DMatrix::from_fn(states, params, |_, _| rng.gen::<f64>());
                normalize_rows(&mut table);
                tables.push(table);
            }
            LikelihoodModel::new(ObservationKind::CategoricalRandom, tables)
        }
        LikelihoodScenario::GaussianRandom { max_mean, max_std } => {
            if *max_mean <= 0.0 || *max_std <= 0.0 {
                return Err(BeliefError::config(
                    "Gaussian scenario needs positive max_mean and max_std",
                ));
            }
            let mut tables = Vec::with_capacity(agents);
            for _ in 0..agents {
                let table = DMatrix::from_fn(states, 2, |_, col| {
                    if col == 0 {
                        max_mean * rng.gen::<f64>()
                    } else {
                        // (0, max_std]: gen() lands in [0, 1).
                        max_std * (1.0 - rng.gen::<f64>())
                    }
                });
                tables.push(table);
            }
            LikelihoodModel::new(ObservationKind::Gaussian, tables)
        }
        LikelihoodScenario::Influencers { num_inf } => {
            if *num_inf > agents {
                return Err(BeliefError::config(format!(
                    "{num_inf} influencers exceed {agents} agents"
                )));
            }
            let mut tables = Vec::with_capacity(agents);
            for agent in 0..agents {
                let offset_scale = if agent < *num_inf { 0.5 } else { 0.05 };
                let mut table = DMatrix::zeros(states, params);
                for state in 0..states {
                    for param in 0..params {
                        let base = if param == 0 { 0.3 } else { 0.7 };
                        let offset = if param == 0 {
                            offset_scale * state as f64
                        } else {
                            0.0
                        };
                        table[(state, param)] = base + offset;
                    }
                }
                normalize_rows(&mut table);
                tables.push(table);
            }
            LikelihoodModel::new(ObservationKind::CategoricalManual, tables)
        }
        LikelihoodScenario::Planted { state_true } => {
            if params != 2 {
                return Err(BeliefError::config(
                    "planted scenario requires binary outcomes (params = 2)",
                ));
            }
            if state_true.len() != agents {
                return Err(BeliefError::config(format!(
                    "planted scenario has {} true states for {agents} agents",
                    state_true.len()
                )));
            }
            if agents < 4 {
                return Err(BeliefError::config(
                    "planted scenario needs at least 4 agents for the informativeness ramp",
                ));
            }
            if let Some(&bad) = state_true.iter().find(|&&s| s >= states) {
                return Err(BeliefError::config(format!(
                    "planted true state {bad} out of range for {states} states"
                )));
            }

            let ramp_step = (0.5 - 0.35) / (agents - 3) as f64;
            let mut tables = Vec::with_capacity(agents);
            for agent in 0..agents {
                let p_true = if agent < 3 {
                    0.1
                } else {
                    0.35 + (agent - 3) as f64 * ramp_step
                };
                let mut table = DMatrix::zeros(states, 2);
                for state in 0..states {
                    // Informative at the planted state, flipped elsewhere.
                    let p = if state == state_true[agent] { p_true } else { 1.0 - p_true };
                    table[(state, 0)] = p;
                    table[(state, 1)] = 1.0 - p;
                }
                tables.push(table);
            }
            LikelihoodModel::new(ObservationKind::CategoricalManual, tables)
        }
        LikelihoodScenario::Ramp => {
            if params != 2 {
                return Err(BeliefError::config(
                    "ramp scenario requires binary outcomes (params = 2)",
                ));
            }
            let step = 0.8 / states as f64;
            let table = DMatrix::from_fn(states, 2, |state, col| {
                let p = 0.2 + state as f64 * step;
                if col == 0 { p } else { 1.0 - p }
            });
            LikelihoodModel::new(ObservationKind::CategoricalManual, vec![table; agents])
        }
    }
}

fn normalize_rows(matrix: &mut DMatrix<f64>) {
    for row in 0..matrix.nrows() {
        let total: f64 = matrix.row(row).iter().sum();
        for col in 0..matrix.ncols() {
            matrix[(row, col)] /= total;
        }
    }
}
