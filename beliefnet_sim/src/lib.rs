//! beliefnet experiment harness.
//!
//! Everything the core engine treats as an external collaborator lives
//! here: combination-weight generation from adjacency matrices, likelihood
//! synthesis for experiment scenarios, post-hoc state estimators, and a
//! Monte-Carlo runner that drives independent engines and compares their
//! trajectories against the closed-form predictions.
//!
//! # Usage
//!
//! ```ignore
//! use beliefnet_sim::{Experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig {
//!     seed: 42,
//!     trials: 50,
//!     ..Default::default()
//! };
//!
//! let report = Experiment::new(config).run()?;
//! println!("vote accuracy: {}", report.vote_accuracy);
//! ```

pub mod estimators;
pub mod likelihoods;
pub mod runner;
pub mod weights;

pub use estimators::{
    agent_influences, agent_state_estimate, fused_state_estimate, likelihood_state_estimate,
    majority_state_estimate, per_agent_state_estimate,
};
pub use likelihoods::{synthesize, LikelihoodScenario};
pub use runner::{Experiment, ExperimentConfig, ExperimentReport};
pub use weights::{combination_weights, fully_connected, WeightAssignment, WeightRule};
