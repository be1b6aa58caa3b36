//! The belief recursion - per-round adapt-then-combine over the network.
//!
//! A [`BeliefNetwork`] owns the per-round belief state of every agent. Each
//! [`BeliefNetwork::step`] draws one observation per agent, performs the
//! local Bayesian update into an intermediate belief, then fuses neighbors'
//! intermediate beliefs by log-linear pooling weighted by the combination
//! matrix. Histories grow by one entry per round, or slide when a window is
//! configured.
//!
//! Beliefs are `states x agents` matrices whose columns are probability
//! distributions over states. The likelihood model and combination matrix
//! are shared read-only; independent trials run independent engines over the
//! same shared inputs.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::error::BeliefError;
use crate::generator::SampleGenerator;
use crate::likelihood::LikelihoodModel;

/// Tolerance for stochasticity checks at construction.
const STOCHASTIC_TOLERANCE: f64 = 1e-6;

/// Tunable parameters of the recursion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Diffusion step size delta in (0, 1]. When set, the local update is
    /// the adaptive `lh^beta * prior^(1-delta)`; when unset the classical
    /// Bayesian `lh * prior` is used (categorical kinds only - the Gaussian
    /// kind has no non-adaptive branch and requires a step size).
    pub step_size: Option<f64>,

    /// Adaptation exponent on the likelihood term; defaults to `step_size`.
    pub beta: Option<f64>,

    /// Number of most recent rounds to retain; unset keeps full history.
    pub window: Option<usize>,
}

/// The diffusion social learning engine.
pub struct BeliefNetwork {
    agents: usize,
    states: usize,

    /// Column-stochastic combination weights (shared, never mutated).
    combination: Arc<DMatrix<f64>>,

    /// Likelihood tables (shared, never mutated).
    model: Arc<LikelihoodModel>,

    generator: SampleGenerator,

    step_size: Option<f64>,
    beta: Option<f64>,
    window: Option<usize>,

    /// Post-fusion beliefs, index 0 = initial condition.
    belief_history: Vec<DMatrix<f64>>,

    /// Post-local-update beliefs; index 0 is a zero placeholder (round 0
    /// has no intermediate belief).
    intermediate_history: Vec<DMatrix<f64>>,

    /// Per-round observations; index 0 is a sentinel (round 0 observes
    /// nothing).
    observation_history: Vec<Option<DVector<f64>>>,

    round: usize,
}

impl BeliefNetwork {
    /// Builds an engine over shared likelihood tables and combination
    /// weights, seeded with `belief_init`.
    pub fn new(
        combination: Arc<DMatrix<f64>>,
        generator: SampleGenerator,
        belief_init: DMatrix<f64>,
        config: EngineConfig,
    ) -> Result<Self, BeliefError> {
        let model = generator.model().clone();
        let agents = model.agents();
        let states = model.states();

        if combination.nrows() != agents || combination.ncols() != agents {
            return Err(BeliefError::config(format!(
                "combination matrix is {}x{}, expected {agents}x{agents}",
                combination.nrows(),
                combination.ncols()
            )));
        }
        for col in 0..agents {
            let column = combination.column(col);
            if column.iter().any(|&w| w < 0.0) {
                return Err(BeliefError::config(format!(
                    "combination matrix column {col} has a negative weight"
                )));
            }
            let total: f64 = column.iter().sum();
            if (total - 1.0).abs() > STOCHASTIC_TOLERANCE {
                return Err(BeliefError::config(format!(
                    "combination matrix column {col} sums to {total}, expected 1"
                )));
            }
        }

        if belief_init.nrows() != states || belief_init.ncols() != agents {
            return Err(BeliefError::config(format!(
                "initial belief is {}x{}, expected {states}x{agents}",
                belief_init.nrows(),
                belief_init.ncols()
            )));
        }
        for agent in 0..agents {
            let total: f64 = belief_init.column(agent).iter().sum();
            if (total - 1.0).abs() > STOCHASTIC_TOLERANCE {
                return Err(BeliefError::config(format!(
                    "initial belief column {agent} sums to {total}, expected 1"
                )));
            }
        }

        if let Some(delta) = config.step_size {
            if !(0.0..=1.0).contains(&delta) || delta == 0.0 {
                return Err(BeliefError::config(format!(
                    "step size {delta} outside (0, 1]"
                )));
            }
        } else if !model.kind().is_categorical() {
            return Err(BeliefError::config(
                "Gaussian observations require a step size (no non-adaptive branch exists)",
            ));
        }
        if let Some(window) = config.window {
            if window == 0 {
                return Err(BeliefError::config("window must be at least 1"));
            }
        }

        Ok(Self {
            agents,
            states,
            combination,
            model,
            generator,
            step_size: config.step_size,
            beta: config.beta.or(config.step_size),
            window: config.window,
            belief_history: vec![belief_init],
            intermediate_history: vec![DMatrix::zeros(states, agents)],
            observation_history: vec![None],
            round: 0,
        })
    }

    /// Uniform initial belief: `1/states` everywhere.
    pub fn uniform_belief(states: usize, agents: usize) -> DMatrix<f64> {
        DMatrix::from_element(states, agents, 1.0 / states as f64)
    }

    /// Advances the recursion by one round.
    ///
    /// `log(0)` from a zero intermediate entry and zero-sum normalizers are
    /// not guarded; non-finite values propagate (the Gaussian density floor
    /// is the only safeguard, applied inside the likelihood model).
    pub fn step(&mut self) {
        let sample = self.generator.sample();

        // Adaptation: local Bayesian update into the intermediate belief.
        let mut intermediate = DMatrix::zeros(self.states, self.agents);
        {
            let prior = &self.belief_history[self.belief_history.len() - 1];
            for state in 0..self.states {
                for agent in 0..self.agents {
                    let lh = self.model.observation_likelihood(agent, state, sample[agent]);
                    intermediate[(state, agent)] = match (self.step_size, self.beta) {
                        (Some(delta), Some(beta)) => {
                            lh.powf(beta) * prior[(state, agent)].powf(1.0 - delta)
                        }
                        _ => lh * prior[(state, agent)],
                    };
                }
            }
        }
        normalize_columns(&mut intermediate);

        // Combination: log-linear pooling across neighbors.
        let belief = fuse_beliefs(&intermediate, &self.combination);

        self.observation_history.push(Some(sample));
        self.intermediate_history.push(intermediate);
        self.belief_history.push(belief);
        self.round += 1;

        if let Some(window) = self.window {
            truncate_to_last(&mut self.observation_history, window);
            truncate_to_last(&mut self.intermediate_history, window);
            truncate_to_last(&mut self.belief_history, window);
        }

        trace!(round = self.round, "belief recursion advanced");
    }

    /// Number of completed rounds.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn agents(&self) -> usize {
        self.agents
    }

    pub fn states(&self) -> usize {
        self.states
    }

    /// Latest post-fusion belief.
    pub fn belief(&self) -> &DMatrix<f64> {
        &self.belief_history[self.belief_history.len() - 1]
    }

    /// Latest intermediate (post local update, pre fusion) belief.
    pub fn intermediate_belief(&self) -> &DMatrix<f64> {
        &self.intermediate_history[self.intermediate_history.len() - 1]
    }

    /// Retained post-fusion history (index 0 = oldest retained round).
    pub fn belief_history(&self) -> &[DMatrix<f64>] {
        &self.belief_history
    }

    /// Retained intermediate-belief history.
    pub fn intermediate_history(&self) -> &[DMatrix<f64>] {
        &self.intermediate_history
    }

    /// Retained observation history (`None` marks the round-0 sentinel).
    pub fn observation_history(&self) -> &[Option<DVector<f64>>] {
        &self.observation_history
    }

    /// Per-agent log-ratio of retained intermediate beliefs at history index
    /// `time`: `ln(intermediate[s0] / intermediate[s1])`, one row per agent.
    pub fn log_belief_ratio(&self, time: usize, s0: usize, s1: usize) -> DMatrix<f64> {
        let ib = &self.intermediate_history[time];
        DMatrix::from_fn(self.agents, 1, |agent, _| {
            (ib[(s0, agent)] / ib[(s1, agent)]).ln()
        })
    }

    /// Multistate flavor: column `n-1` compares the reference state 0
    /// against state `n`, for every non-reference state.
    pub fn log_belief_ratios_vs_reference(&self, time: usize) -> DMatrix<f64> {
        let ib = &self.intermediate_history[time];
        DMatrix::from_fn(self.agents, self.states - 1, |agent, col| {
            (ib[(0, agent)] / ib[(col + 1, agent)]).ln()
        })
    }
}

/// Log-linear (geometric) pooling of intermediate beliefs across neighbors:
/// per state, `exp(C^T ln(intermediate[state, :]))`, then each agent column
/// is renormalized over states.
///
/// Shared with post-hoc state estimators, which fuse a single round's
/// intermediate belief without running an engine.
pub fn fuse_beliefs(intermediate: &DMatrix<f64>, combination: &DMatrix<f64>) -> DMatrix<f64> {
    let (states, agents) = intermediate.shape();
    let weights_t = combination.transpose();

    let mut belief = DMatrix::zeros(states, agents);
    for state in 0..states {
        let logs = DVector::from_fn(agents, |agent, _| intermediate[(state, agent)].ln());
        let fused = &weights_t * logs;
        for agent in 0..agents {
            belief[(state, agent)] = fused[agent].exp();
        }
    }
    normalize_columns(&mut belief);
    belief
}

/// Divides each column by its sum. A zero-sum column yields `nan` entries,
/// by design (numeric degeneracy propagates).
fn normalize_columns(matrix: &mut DMatrix<f64>) {
    for col in 0..matrix.ncols() {
        let total: f64 = matrix.column(col).iter().sum();
        for row in 0..matrix.nrows() {
            matrix[(row, col)] /= total;
        }
    }
}

fn truncate_to_last<T>(history: &mut Vec<T>, window: usize) {
    if history.len() > window {
        let excess = history.len() - window;
        history.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::TrueState;
    use crate::likelihood::{LikelihoodModel, ObservationKind, GAUSSIAN_DENSITY_FLOOR};
    use approx::assert_relative_eq;

    fn categorical_model(tables: Vec<DMatrix<f64>>) -> Arc<LikelihoodModel> {
        Arc::new(LikelihoodModel::new(ObservationKind::CategoricalRandom, tables).unwrap())
    }

    fn uniform_combination(agents: usize) -> Arc<DMatrix<f64>> {
        Arc::new(DMatrix::from_element(agents, agents, 1.0 / agents as f64))
    }

    /// Three agents, two states, uniform combination weights, no step size.
    fn three_agent_engine(seed: u64) -> BeliefNetwork {
        let tables = vec![
            DMatrix::from_row_slice(2, 2, &[0.8, 0.2, 0.3, 0.7]),
            DMatrix::from_row_slice(2, 2, &[0.6, 0.4, 0.2, 0.8]),
            DMatrix::from_row_slice(2, 2, &[0.7, 0.3, 0.4, 0.6]),
        ];
        let model = categorical_model(tables);
        let generator = SampleGenerator::new(model, TrueState::Shared(0), seed).unwrap();

        BeliefNetwork::new(
            uniform_combination(3),
            generator,
            BeliefNetwork::uniform_belief(2, 3),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_columns_sum_to_one_every_round() {
        let mut engine = three_agent_engine(42);
        for _ in 0..20 {
            engine.step();
            for agent in 0..3 {
                let b: f64 = engine.belief().column(agent).iter().sum();
                let ib: f64 = engine.intermediate_belief().column(agent).iter().sum();
                assert_relative_eq!(b, 1.0, epsilon = 1e-9);
                assert_relative_eq!(ib, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_beliefs_nonnegative() {
        let mut engine = three_agent_engine(7);
        for _ in 0..20 {
            engine.step();
            assert!(engine.belief().iter().all(|&b| b >= 0.0));
            assert!(engine.intermediate_belief().iter().all(|&b| b >= 0.0));
        }
    }

    #[test]
    fn test_classical_update_is_pure_bayes() {
        // With no step size, intermediate[s, a] must be proportional to
        // likelihood * prior, verified by direct recomputation from the
        // observation and belief histories.
        let mut engine = three_agent_engine(13);
        engine.step();
        engine.step();

        let sample = engine.observation_history()[2].as_ref().unwrap().clone();
        let prior = engine.belief_history()[1].clone();
        let stored = engine.intermediate_history()[2].clone();

        let tables = vec![
            DMatrix::from_row_slice(2, 2, &[0.8, 0.2, 0.3, 0.7]),
            DMatrix::from_row_slice(2, 2, &[0.6, 0.4, 0.2, 0.8]),
            DMatrix::from_row_slice(2, 2, &[0.7, 0.3, 0.4, 0.6]),
        ];
        for agent in 0..3 {
            let outcome = sample[agent] as usize;
            let unnormalized: Vec<f64> = (0..2)
                .map(|state| tables[agent][(state, outcome)] * prior[(state, agent)])
                .collect();
            let total: f64 = unnormalized.iter().sum();
            for state in 0..2 {
                assert_relative_eq!(
                    stored[(state, agent)],
                    unnormalized[state] / total,
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn test_uniform_fusion_is_normalized_geometric_mean() {
        // With C = 1/3 everywhere, the fused belief of every agent is the
        // normalized geometric mean of the three intermediate beliefs.
        let mut engine = three_agent_engine(99);
        engine.step();

        let ib = engine.intermediate_belief().clone();
        let belief = engine.belief().clone();

        let mut geometric = [0.0; 2];
        for (state, g) in geometric.iter_mut().enumerate() {
            *g = (0..3).map(|agent| ib[(state, agent)].powf(1.0 / 3.0)).product();
        }
        let total: f64 = geometric.iter().sum();

        for agent in 0..3 {
            let column: f64 = belief.column(agent).iter().sum();
            assert_relative_eq!(column, 1.0, epsilon = 1e-9);
            for state in 0..2 {
                assert_relative_eq!(
                    belief[(state, agent)],
                    geometric[state] / total,
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn test_identical_likelihoods_fuse_symmetrically() {
        // Identical tables plus uniform weights: after fusion every agent
        // holds the same belief, whatever each one observed.
        let table = DMatrix::from_row_slice(2, 2, &[0.8, 0.2, 0.3, 0.7]);
        let model = categorical_model(vec![table.clone(), table.clone(), table.clone(), table]);
        let generator = SampleGenerator::new(model, TrueState::Shared(0), 21).unwrap();

        let mut engine = BeliefNetwork::new(
            uniform_combination(4),
            generator,
            BeliefNetwork::uniform_belief(2, 4),
            EngineConfig::default(),
        )
        .unwrap();

        for _ in 0..5 {
            engine.step();
            let belief = engine.belief();
            for agent in 1..4 {
                for state in 0..2 {
                    assert_relative_eq!(
                        belief[(state, agent)],
                        belief[(state, 0)],
                        epsilon = 1e-9
                    );
                }
            }
        }
    }

    #[test]
    fn test_gaussian_density_floor_in_local_update() {
        // State 1 sits 1000 standard deviations away from the true state, so
        // its density is floored; the stored intermediate must match a
        // recomputation through the floored likelihood.
        let tables = vec![
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1000.0, 1.0]),
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1000.0, 1.0]),
        ];
        let model =
            Arc::new(LikelihoodModel::new(ObservationKind::Gaussian, tables).unwrap());
        let generator = SampleGenerator::new(model.clone(), TrueState::Shared(0), 17).unwrap();

        let config = EngineConfig {
            step_size: Some(0.3),
            ..Default::default()
        };
        let mut engine = BeliefNetwork::new(
            uniform_combination(2),
            generator,
            BeliefNetwork::uniform_belief(2, 2),
            config,
        )
        .unwrap();
        engine.step();

        let sample = engine.observation_history()[1].as_ref().unwrap().clone();
        let stored = engine.intermediate_belief().clone();

        for agent in 0..2 {
            // The far state's raw density underflowed to the floor.
            assert_relative_eq!(
                model.observation_likelihood(agent, 1, sample[agent]),
                GAUSSIAN_DENSITY_FLOOR
            );

            let unnormalized: Vec<f64> = (0..2)
                .map(|state| {
                    let lh = model.observation_likelihood(agent, state, sample[agent]);
                    lh.powf(0.3) * 0.5f64.powf(0.7)
                })
                .collect();
            let total: f64 = unnormalized.iter().sum();
            for state in 0..2 {
                assert_relative_eq!(
                    stored[(state, agent)],
                    unnormalized[state] / total,
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn test_gaussian_requires_step_size() {
        let tables = vec![DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 3.0, 1.0])];
        let model =
            Arc::new(LikelihoodModel::new(ObservationKind::Gaussian, tables).unwrap());
        let generator = SampleGenerator::new(model, TrueState::Shared(0), 1).unwrap();

        let result = BeliefNetwork::new(
            uniform_combination(1),
            generator,
            BeliefNetwork::uniform_belief(2, 1),
            EngineConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_step_size_out_of_range() {
        let table = DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 0.5, 0.5]);
        for bad in [0.0, 1.5, -0.1] {
            let model = categorical_model(vec![table.clone()]);
            let generator = SampleGenerator::new(model, TrueState::Shared(0), 1).unwrap();
            let config = EngineConfig {
                step_size: Some(bad),
                ..Default::default()
            };
            let result = BeliefNetwork::new(
                uniform_combination(1),
                generator,
                BeliefNetwork::uniform_belief(2, 1),
                config,
            );
            assert!(result.is_err(), "step size {bad} should be rejected");
        }
    }

    #[test]
    fn test_non_stochastic_combination_rejected() {
        let table = DMatrix::from_row_slice(2, 2, &[0.5, 0.5, 0.5, 0.5]);
        let model = categorical_model(vec![table.clone(), table]);
        let generator = SampleGenerator::new(model, TrueState::Shared(0), 1).unwrap();

        let combination = Arc::new(DMatrix::from_element(2, 2, 0.7));
        let result = BeliefNetwork::new(
            combination,
            generator,
            BeliefNetwork::uniform_belief(2, 2),
            EngineConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_windowed_history_matches_unwindowed_tail() {
        let mut windowed = three_agent_engine(55);
        windowed.window = Some(5);
        let mut full = three_agent_engine(55);

        for _ in 0..10 {
            windowed.step();
            full.step();
        }

        assert_eq!(windowed.belief_history().len(), 5);
        assert_eq!(windowed.intermediate_history().len(), 5);
        assert_eq!(windowed.observation_history().len(), 5);

        // Full history holds 11 entries (initial condition + 10 rounds); the
        // window retains exactly the last 5 of them.
        let tail = &full.belief_history()[6..];
        for (kept, expected) in windowed.belief_history().iter().zip(tail) {
            assert_eq!(kept, expected);
        }
        let tail = &full.intermediate_history()[6..];
        for (kept, expected) in windowed.intermediate_history().iter().zip(tail) {
            assert_eq!(kept, expected);
        }
    }

    #[test]
    fn test_log_belief_ratio_accessors() {
        let mut engine = three_agent_engine(3);
        engine.step();

        let ratio = engine.log_belief_ratio(1, 0, 1);
        assert_eq!(ratio.shape(), (3, 1));
        let ib = engine.intermediate_belief();
        for agent in 0..3 {
            assert_relative_eq!(
                ratio[(agent, 0)],
                (ib[(0, agent)] / ib[(1, agent)]).ln(),
                epsilon = 1e-12
            );
        }

        let multi = engine.log_belief_ratios_vs_reference(1);
        assert_eq!(multi.shape(), (3, 1));
        for agent in 0..3 {
            assert_relative_eq!(multi[(agent, 0)], ratio[(agent, 0)], epsilon = 1e-12);
        }
    }
}
