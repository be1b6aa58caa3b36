//! Monte-Carlo experiment harness.
//!
//! Synthesizes one likelihood model and one combination matrix from a master
//! seed, runs independent belief engines over them (one per trial, derived
//! seeds), and reports the empirical final log-belief-ratio next to the
//! closed-form prediction for the same round.

use beliefnet_core::{
    AnalyticModel, BeliefError, BeliefNetwork, EngineConfig, SampleGenerator, TrueState,
};
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::estimators::majority_state_estimate;
use crate::likelihoods::{synthesize, LikelihoodScenario};
use crate::weights::{combination_weights, fully_connected, WeightRule};

/// Configuration for one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Master seed; scenario synthesis, weights and per-trial engines all
    /// derive from it.
    pub seed: u64,

    pub agents: usize,
    pub states: usize,

    /// Discrete outcome count for categorical scenarios.
    pub params: usize,

    /// Rounds per trial.
    pub rounds: usize,

    /// Independent engine instances to average over.
    pub trials: usize,

    pub scenario: LikelihoodScenario,
    pub weight_rule: WeightRule,
    pub engine: EngineConfig,

    /// Shared true state of the world.
    pub true_state: usize,

    /// State pair (s0, s1) tracked by the log-belief-ratio report.
    pub ratio_states: (usize, usize),
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            agents: 6,
            states: 2,
            params: 2,
            rounds: 50,
            trials: 20,
            scenario: LikelihoodScenario::Random,
            weight_rule: WeightRule::Uniform,
            engine: EngineConfig::default(),
            true_state: 0,
            ratio_states: (0, 1),
        }
    }
}

/// Outcome of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Per-agent final log-belief-ratio, averaged over trials (agents x 1).
    pub empirical_log_ratio: DMatrix<f64>,

    /// Closed-form expectation for the same round (agents x 1).
    pub predicted_log_ratio: DMatrix<f64>,

    /// Fraction of trials whose majority vote found the true state.
    pub vote_accuracy: f64,
}

/// A runnable Monte-Carlo experiment.
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Runs all trials and aggregates the report.
    pub fn run(&self) -> Result<ExperimentReport, BeliefError> {
        let cfg = &self.config;
        if cfg.trials == 0 || cfg.rounds == 0 {
            return Err(BeliefError::config("experiment needs at least one trial and one round"));
        }

        // Separate seed streams for inputs and trials, so changing the trial
        // count never changes the synthesized scenario.
        let input_seed = cfg.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut input_rng = ChaCha8Rng::seed_from_u64(input_seed);

        let model = Arc::new(synthesize(
            cfg.agents,
            cfg.states,
            cfg.params,
            &cfg.scenario,
            &mut input_rng,
        )?);
        let adjacency = fully_connected(cfg.agents);
        let assignment = combination_weights(&adjacency, cfg.weight_rule, &mut input_rng)?;
        let combination = Arc::new(assignment.weights);

        let analytic = AnalyticModel::new(
            model.clone(),
            combination.clone(),
            vec![cfg.true_state; cfg.agents],
            cfg.engine.step_size,
        )?;

        let (s0, s1) = cfg.ratio_states;
        let mut ratio_sum = DMatrix::zeros(cfg.agents, 1);
        let mut correct_votes = 0usize;

        for trial in 0..cfg.trials {
            let trial_seed = cfg
                .seed
                .wrapping_add((trial as u64 + 1).wrapping_mul(0x517cc1b727220a95));
            let generator =
                SampleGenerator::new(model.clone(), TrueState::Shared(cfg.true_state), trial_seed)?;
            let mut engine = BeliefNetwork::new(
                combination.clone(),
                generator,
                BeliefNetwork::uniform_belief(cfg.states, cfg.agents),
                cfg.engine.clone(),
            )?;

            for _ in 0..cfg.rounds {
                engine.step();
            }

            let last = engine.intermediate_history().len() - 1;
            ratio_sum += engine.log_belief_ratio(last, s0, s1);
            if majority_state_estimate(engine.belief()) == cfg.true_state {
                correct_votes += 1;
            }
            debug!(trial, "trial complete");
        }

        let empirical_log_ratio = ratio_sum / cfg.trials as f64;
        let predicted_log_ratio = analytic.log_belief_expectation(cfg.rounds, s0, s1, None);
        let vote_accuracy = correct_votes as f64 / cfg.trials as f64;

        info!(
            trials = cfg.trials,
            rounds = cfg.rounds,
            vote_accuracy,
            "experiment complete"
        );

        Ok(ExperimentReport { empirical_log_ratio, predicted_log_ratio, vote_accuracy })
    }
}
