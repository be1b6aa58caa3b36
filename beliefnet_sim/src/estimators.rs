//! Post-hoc state estimators over a single round's beliefs.
//!
//! All argmax ties resolve to the lowest state index.

use beliefnet_core::{fuse_beliefs, BeliefError};
use nalgebra::{DMatrix, DVector};

/// Index of the largest entry in one agent's belief column.
fn argmax_state(belief: &DMatrix<f64>, agent: usize) -> usize {
    let column = belief.column(agent);
    let mut best = 0;
    for state in 1..belief.nrows() {
        if column[state] > column[best] {
            best = state;
        }
    }
    best
}

/// Per-agent maximum-belief states (multitask estimate).
pub fn per_agent_state_estimate(belief: &DMatrix<f64>) -> Vec<usize> {
    (0..belief.ncols()).map(|agent| argmax_state(belief, agent)).collect()
}

/// One agent's maximum-belief state.
pub fn agent_state_estimate(belief: &DMatrix<f64>, agent: usize) -> usize {
    argmax_state(belief, agent)
}

/// Majority vote over the per-agent estimates; ties between equally common
/// states go to the smaller index.
pub fn majority_state_estimate(belief: &DMatrix<f64>) -> usize {
    let mut counts = vec![0usize; belief.nrows()];
    for agent in 0..belief.ncols() {
        counts[argmax_state(belief, agent)] += 1;
    }

    let mut winner = 0;
    for (state, &count) in counts.iter().enumerate() {
        if count > counts[winner] {
            winner = state;
        }
    }
    winner
}

/// Fuses one round's intermediate belief through the combination matrix,
/// then majority-votes the result.
pub fn fused_state_estimate(intermediate: &DMatrix<f64>, combination: &DMatrix<f64>) -> usize {
    majority_state_estimate(&fuse_beliefs(intermediate, combination))
}

/// Per-agent state estimate from an `agents x (states - 1)` drift matrix
/// whose column `n - 1` compares state `n` against state 0, as produced by
/// [`AnalyticModel::divergence_gap_vs_reference`] and the vs-reference
/// log-belief expectations.
///
/// Each candidate state is scored by how many pairwise drifts favor it and
/// the highest score wins, ties going to the lowest index. Only reference
/// state 0 is supported, matching the drift-matrix layout.
///
/// [`AnalyticModel::divergence_gap_vs_reference`]: beliefnet_core::AnalyticModel::divergence_gap_vs_reference
pub fn likelihood_state_estimate(
    drift: &DMatrix<f64>,
    reference: usize,
) -> Result<Vec<usize>, BeliefError> {
    if reference != 0 {
        return Err(BeliefError::config(
            "drift columns compare against state 0, other reference states are unsupported",
        ));
    }
    let states = drift.ncols() + 1;

    let mut estimates = Vec::with_capacity(drift.nrows());
    for agent in 0..drift.nrows() {
        // Expected log-ratio of state `denom` over state `nom` beliefs,
        // reconstructed from the vs-reference columns.
        let pairwise = |nom: usize, denom: usize| -> f64 {
            match (nom, denom) {
                (n, d) if n == d => 0.0,
                (0, d) => drift[(agent, d - 1)],
                (n, 0) => -drift[(agent, n - 1)],
                (n, d) => drift[(agent, d - 1)] - drift[(agent, n - 1)],
            }
        };

        let mut best = 0;
        let mut best_wins = 0;
        for nom in 0..states {
            let wins = (0..states).filter(|&denom| pairwise(nom, denom) > 0.0).count();
            if wins > best_wins {
                best = nom;
                best_wins = wins;
            }
        }
        estimates.push(best);
    }
    Ok(estimates)
}

/// Centrality-weighted influence score of each agent on the network-wide
/// log-belief drift toward `state_true`.
///
/// `drift` is the same `agents x (states - 1)` vs-reference matrix as for
/// [`likelihood_state_estimate`]. Its columns are re-based against the true
/// state, summed per agent and scaled by that agent's Perron centrality.
pub fn agent_influences(
    centrality: &DVector<f64>,
    drift: &DMatrix<f64>,
    state_true: usize,
) -> DVector<f64> {
    DVector::from_fn(drift.nrows(), |agent, _| {
        let total: f64 = (0..drift.ncols())
            .map(|col| {
                if state_true == 0 {
                    drift[(agent, col)]
                } else if col == 0 {
                    -drift[(agent, state_true - 1)]
                } else {
                    drift[(agent, col)] - drift[(agent, state_true - 1)]
                }
            })
            .sum();
        total * centrality[agent]
    })
}
