//! Sample generator - one noisy observation per agent per round.
//!
//! Each agent observes a signal drawn from its likelihood table at that
//! agent's true state. Categorical kinds sample by inverse CDF; the Gaussian
//! kind draws `mean + std * z` with a standard normal `z`. All randomness
//! comes from an owned seeded RNG, so a fixed seed reproduces a run exactly.

use nalgebra::DVector;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::Arc;

use crate::error::BeliefError;
use crate::likelihood::LikelihoodModel;

/// True state of the world, shared by all agents or assigned per agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrueState {
    /// One state index shared by every agent.
    Shared(usize),

    /// One state index per agent (multitask setups).
    PerAgent(Vec<usize>),
}

/// Draws per-round observations conditioned on each agent's true state.
pub struct SampleGenerator {
    model: Arc<LikelihoodModel>,

    /// Broadcast per-agent true states.
    state_true: Vec<usize>,

    rng: ChaCha8Rng,
}

impl SampleGenerator {
    /// Creates a generator; a shared true state is broadcast to every agent.
    pub fn new(
        model: Arc<LikelihoodModel>,
        state_true: TrueState,
        seed: u64,
    ) -> Result<Self, BeliefError> {
        let agents = model.agents();
        let states = model.states();

        let state_true = match state_true {
            TrueState::Shared(state) => vec![state; agents],
            TrueState::PerAgent(states_vec) => {
                if states_vec.len() != agents {
                    return Err(BeliefError::config(format!(
                        "per-agent true state has {} entries for {agents} agents",
                        states_vec.len()
                    )));
                }
                states_vec
            }
        };

        if let Some(&bad) = state_true.iter().find(|&&s| s >= states) {
            return Err(BeliefError::config(format!(
                "true state index {bad} out of range for {states} states"
            )));
        }

        Ok(Self {
            model,
            state_true,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// The likelihood model observations are drawn from.
    pub fn model(&self) -> &Arc<LikelihoodModel> {
        &self.model
    }

    /// Broadcast per-agent true states.
    pub fn state_true(&self) -> &[usize] {
        &self.state_true
    }

    /// Draws one observation per agent.
    ///
    /// Categorical kinds return the sampled outcome index as an `f64`; the
    /// Gaussian kind returns the continuous observation itself.
    pub fn sample(&mut self) -> DVector<f64> {
        let agents = self.model.agents();
        let mut sample = DVector::zeros(agents);

        if self.model.kind().is_categorical() {
            for agent in 0..agents {
                let table = self.model.table(agent);
                let row = table.row(self.state_true[agent]);
                let uniform: f64 = self.rng.gen();

                // Inverse CDF: first outcome whose cumulative mass reaches
                // the draw; ties go to the lowest index.
                let mut cumulative = 0.0;
                let mut outcome = row.len() - 1;
                for (index, &p) in row.iter().enumerate() {
                    cumulative += p;
                    if cumulative >= uniform {
                        outcome = index;
                        break;
                    }
                }
                sample[agent] = outcome as f64;
            }
        } else {
            for agent in 0..agents {
                let table = self.model.table(agent);
                let mean = table[(self.state_true[agent], 0)];
                let std = table[(self.state_true[agent], 1)];
                let z: f64 = StandardNormal.sample(&mut self.rng);
                sample[agent] = mean + std * z;
            }
        }

        sample
    }
}
