//! beliefnet core - diffusion social learning over agent networks.
//!
//! Agents iteratively exchange and fuse beliefs about an unknown true state
//! of the world. Each round an agent privately observes a noisy signal from
//! its likelihood model, performs a local Bayesian update (adaptation), then
//! fuses the result with its neighbors' intermediate beliefs by log-linear
//! pooling weighted by a column-stochastic combination matrix.
//!
//! The crate has two halves:
//! 1. **Stochastic recursion**: [`BeliefNetwork::step`] advances the
//!    simulated belief state one round at a time.
//! 2. **Closed-form companions**: [`AnalyticModel`] predicts the expected
//!    log-belief-ratio trajectory and its second moment (R0) from the same
//!    inputs, with no simulation involved, so the two can be compared.
//!
//! Everything is single-threaded, synchronous and deterministic for a fixed
//! seed. Likelihood tables and combination weights are immutable after
//! construction and can be shared (`Arc`) across independent engine
//! instances, one per Monte-Carlo trial.

pub mod analytic;
pub mod engine;
pub mod error;
pub mod generator;
pub mod likelihood;

// Re-export key types for convenience
pub use analytic::AnalyticModel;
pub use engine::{fuse_beliefs, BeliefNetwork, EngineConfig};
pub use error::BeliefError;
pub use generator::{SampleGenerator, TrueState};
pub use likelihood::{LikelihoodModel, ObservationKind, GAUSSIAN_DENSITY_FLOOR};
