//! Combination-weight generation.
//!
//! Turns an adjacency matrix into the column-stochastic combination matrix
//! the engine consumes, under one of three rules, and derives the Perron
//! centrality of the result.

use beliefnet_core::BeliefError;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum Sinkhorn-Knopp sweeps before giving up on full convergence.
const SINKHORN_MAX_SWEEPS: usize = 10_000;

/// Marginal tolerance for Sinkhorn-Knopp convergence.
const SINKHORN_TOLERANCE: f64 = 1e-9;

/// How adjacency turns into combination weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightRule {
    /// Each column of the adjacency normalized to sum 1.
    Uniform,

    /// Sinkhorn-Knopp balancing to a doubly stochastic matrix.
    DoublyStochastic,

    /// Uniform random weights on edges, column-normalized.
    RandomLeftStochastic,
}

impl WeightRule {
    /// Maps the numeric option used by experiment configs (0, 1, 2).
    pub fn from_option(option: u8) -> Result<Self, BeliefError> {
        match option {
            0 => Ok(WeightRule::Uniform),
            1 => Ok(WeightRule::DoublyStochastic),
            2 => Ok(WeightRule::RandomLeftStochastic),
            other => Err(BeliefError::config(format!(
                "unsupported weight rule option {other} (expected 0, 1 or 2)"
            ))),
        }
    }
}

/// Combination weights plus the network statistics derived from them.
#[derive(Debug, Clone)]
pub struct WeightAssignment {
    /// Column-stochastic combination matrix (doubly stochastic under
    /// [`WeightRule::DoublyStochastic`]).
    pub weights: DMatrix<f64>,

    /// Perron (dominant) eigenvector of the weight matrix, normalized to
    /// sum 1.
    pub centrality: DVector<f64>,

    /// True when every agent carries positive centrality.
    pub strongly_connected: bool,
}

/// All-ones adjacency: every agent listens to every agent (self included).
pub fn fully_connected(agents: usize) -> DMatrix<f64> {
    DMatrix::from_element(agents, agents, 1.0)
}

/// Builds combination weights from an adjacency matrix.
pub fn combination_weights(
    adjacency: &DMatrix<f64>,
    rule: WeightRule,
    rng: &mut ChaCha8Rng,
) -> Result<WeightAssignment, BeliefError> {
    let agents = adjacency.nrows();
    if adjacency.ncols() != agents {
        return Err(BeliefError::config(format!(
            "adjacency matrix is {}x{}, expected square",
            adjacency.nrows(),
            adjacency.ncols()
        )));
    }
    if adjacency.iter().any(|&a| a < 0.0) {
        return Err(BeliefError::config("adjacency matrix has a negative entry"));
    }
    for col in 0..agents {
        if adjacency.column(col).iter().all(|&a| a == 0.0) {
            return Err(BeliefError::config(format!(
                "agent {col} has no in-neighbors, cannot normalize its column"
            )));
        }
    }
    // Row balancing additionally needs every row to have support.
    if rule == WeightRule::DoublyStochastic {
        for row in 0..agents {
            if adjacency.row(row).iter().all(|&a| a == 0.0) {
                return Err(BeliefError::config(format!(
                    "agent {row} has no out-neighbors, cannot balance its row"
                )));
            }
        }
    }

    let weights = match rule {
        WeightRule::Uniform => {
            let mut weights = adjacency.clone();
            normalize_columns(&mut weights);
            weights
        }
        WeightRule::DoublyStochastic => sinkhorn_knopp(adjacency),
        WeightRule::RandomLeftStochastic => {
            let mut weights = DMatrix::from_fn(agents, agents, |row, col| {
                if adjacency[(row, col)] == 0.0 {
                    0.0
                } else {
                    rng.gen::<f64>()
                }
            });
            normalize_columns(&mut weights);
            weights
        }
    };

    let centrality = perron_centrality(&weights);
    let strongly_connected = centrality.iter().all(|&c| c > 0.0);

    Ok(WeightAssignment { weights, centrality, strongly_connected })
}

fn normalize_columns(matrix: &mut DMatrix<f64>) {
    for col in 0..matrix.ncols() {
        let total: f64 = matrix.column(col).iter().sum();
        for row in 0..matrix.nrows() {
            matrix[(row, col)] /= total;
        }
    }
}

/// Alternating row/column normalization until both marginals are unit.
fn sinkhorn_knopp(adjacency: &DMatrix<f64>) -> DMatrix<f64> {
    let mut weights = adjacency.clone();
    for _ in 0..SINKHORN_MAX_SWEEPS {
        for row in 0..weights.nrows() {
            let total: f64 = weights.row(row).iter().sum();
            for col in 0..weights.ncols() {
                weights[(row, col)] /= total;
            }
        }
        normalize_columns(&mut weights);

        let worst_row = (0..weights.nrows())
            .map(|row| (weights.row(row).iter().sum::<f64>() - 1.0).abs())
            .fold(0.0, f64::max);
        let worst_col = (0..weights.ncols())
            .map(|col| (weights.column(col).iter().sum::<f64>() - 1.0).abs())
            .fold(0.0, f64::max);
        if worst_row < SINKHORN_TOLERANCE && worst_col < SINKHORN_TOLERANCE {
            return weights;
        }
    }
    warn!("Sinkhorn-Knopp hit the sweep cap before full convergence");
    weights
}

/// Dominant right eigenvector by power iteration, normalized to sum 1.
fn perron_centrality(weights: &DMatrix<f64>) -> DVector<f64> {
    let agents = weights.nrows();
    let mut v = DVector::from_element(agents, 1.0 / agents as f64);
    for _ in 0..500 {
        let next = weights * &v;
        let total: f64 = next.iter().sum();
        let next = next / total;
        let shift = next
            .iter()
            .zip(v.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        v = next;
        if shift < 1e-13 {
            break;
        }
    }
    v
}
