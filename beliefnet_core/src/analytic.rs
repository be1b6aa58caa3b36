//! Closed-form companions of the belief recursion.
//!
//! [`AnalyticModel`] predicts the expected log-belief-ratio trajectory and
//! its second moment (R0) directly from the likelihood tables, the
//! combination matrix and the true states - no simulated history involved.
//! Both recursions are geometric series in powers of the combination matrix,
//! pre-scaled by `(1 - delta)` when a step size is configured.

use nalgebra::DMatrix;
use std::sync::Arc;

use crate::error::BeliefError;
use crate::likelihood::LikelihoodModel;

/// Pure closed-form estimator over shared, read-only inputs.
pub struct AnalyticModel {
    model: Arc<LikelihoodModel>,
    combination: Arc<DMatrix<f64>>,

    /// Per-agent true states.
    state_true: Vec<usize>,

    step_size: Option<f64>,
}

impl AnalyticModel {
    pub fn new(
        model: Arc<LikelihoodModel>,
        combination: Arc<DMatrix<f64>>,
        state_true: Vec<usize>,
        step_size: Option<f64>,
    ) -> Result<Self, BeliefError> {
        let agents = model.agents();
        if combination.nrows() != agents || combination.ncols() != agents {
            return Err(BeliefError::config(format!(
                "combination matrix is {}x{}, expected {agents}x{agents}",
                combination.nrows(),
                combination.ncols()
            )));
        }
        if state_true.len() != agents {
            return Err(BeliefError::config(format!(
                "true state vector has {} entries for {agents} agents",
                state_true.len()
            )));
        }
        if let Some(&bad) = state_true.iter().find(|&&s| s >= model.states()) {
            return Err(BeliefError::config(format!(
                "true state index {bad} out of range for {} states",
                model.states()
            )));
        }
        if let Some(delta) = step_size {
            if !(0.0..=1.0).contains(&delta) || delta == 0.0 {
                return Err(BeliefError::config(format!(
                    "step size {delta} outside (0, 1]"
                )));
            }
        }

        Ok(Self { model, combination, state_true, step_size })
    }

    /// Per-agent expected log-likelihood-ratio drift between two candidate
    /// states: `D(true || s1) - D(true || s0)`, as an `agents x 1` column.
    pub fn divergence_gap(&self, s0: usize, s1: usize) -> DMatrix<f64> {
        DMatrix::from_fn(self.model.agents(), 1, |agent, _| {
            let st = self.state_true[agent];
            self.model.divergence(agent, st, s1) - self.model.divergence(agent, st, s0)
        })
    }

    /// Multistate drift: column `n-1` holds `D(true || n) - D(true || 0)`
    /// per agent, one column per non-reference state.
    pub fn divergence_gap_vs_reference(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.model.agents(), self.model.states() - 1, |agent, col| {
            let st = self.state_true[agent];
            self.model.divergence(agent, st, col + 1) - self.model.divergence(agent, st, 0)
        })
    }

    /// Expected value of `ln(intermediate[s0] / intermediate[s1])` at round
    /// `time`, via the geometric-series recursion
    /// `sum_{k=0}^{time-2} (C^k)^T kl`. At `time == 1` no fusion has
    /// happened yet and the result is the zero column.
    ///
    /// `alt` substitutes a different combination matrix (e.g. a learned
    /// estimate) without rebuilding the model.
    pub fn log_belief_expectation(
        &self,
        time: usize,
        s0: usize,
        s1: usize,
        alt: Option<&DMatrix<f64>>,
    ) -> DMatrix<f64> {
        self.geometric_series(&self.divergence_gap(s0, s1), time, alt)
    }

    /// Multistate flavor of [`AnalyticModel::log_belief_expectation`].
    pub fn log_belief_expectation_vs_reference(
        &self,
        time: usize,
        alt: Option<&DMatrix<f64>>,
    ) -> DMatrix<f64> {
        self.geometric_series(&self.divergence_gap_vs_reference(), time, alt)
    }

    /// Second moment (R0) of the log-belief-ratio process at round `time`:
    /// with `E` the expectation at the same round,
    /// `Q = C^T E kl^T + kl E^T C + kl kl^T` summed as
    /// `sum_{t=0}^{time-1} C^t Q (C^t)^T`.
    pub fn log_belief_second_moment(
        &self,
        time: usize,
        s0: usize,
        s1: usize,
        alt: Option<&DMatrix<f64>>,
    ) -> DMatrix<f64> {
        let gap = self.divergence_gap(s0, s1);
        // The inner expectation always uses the model's own combination
        // matrix, matching the reference recursion.
        let expectation = self.geometric_series(&gap, time, None);
        self.second_moment_series(&gap, &expectation, time, alt)
    }

    /// Multistate flavor of [`AnalyticModel::log_belief_second_moment`].
    pub fn log_belief_second_moment_vs_reference(
        &self,
        time: usize,
        alt: Option<&DMatrix<f64>>,
    ) -> DMatrix<f64> {
        let gap = self.divergence_gap_vs_reference();
        let expectation = self.geometric_series(&gap, time, None);
        self.second_moment_series(&gap, &expectation, time, alt)
    }

    /// Combination matrix and drift term, pre-scaled by the step size when
    /// one is configured.
    fn scaled_inputs(
        &self,
        gap: &DMatrix<f64>,
        alt: Option<&DMatrix<f64>>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut combination = alt.unwrap_or(&self.combination).clone();
        let mut kl = gap.clone();
        if let Some(delta) = self.step_size {
            combination *= 1.0 - delta;
            kl *= delta;
        }
        (combination, kl)
    }

    fn geometric_series(
        &self,
        gap: &DMatrix<f64>,
        time: usize,
        alt: Option<&DMatrix<f64>>,
    ) -> DMatrix<f64> {
        let (combination, kl) = self.scaled_inputs(gap, alt);

        let mut result = DMatrix::zeros(kl.nrows(), kl.ncols());
        let mut power = DMatrix::identity(combination.nrows(), combination.ncols());
        for _ in 1..time {
            result += power.transpose() * &kl;
            power = &combination * power;
        }
        result
    }

    fn second_moment_series(
        &self,
        gap: &DMatrix<f64>,
        expectation: &DMatrix<f64>,
        time: usize,
        alt: Option<&DMatrix<f64>>,
    ) -> DMatrix<f64> {
        let (combination, kl) = self.scaled_inputs(gap, alt);

        let q = combination.transpose() * expectation * kl.transpose()
            + &kl * expectation.transpose() * &combination
            + &kl * kl.transpose();

        let mut result = DMatrix::zeros(q.nrows(), q.ncols());
        let mut power = DMatrix::identity(combination.nrows(), combination.ncols());
        for _ in 0..time {
            result += &power * &q * power.transpose();
            power = &combination * power;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::ObservationKind;
    use approx::assert_relative_eq;

    /// Two agents, two states, distinct categorical tables.
    fn two_agent_model() -> Arc<LikelihoodModel> {
        let tables = vec![
            DMatrix::from_row_slice(2, 2, &[0.8, 0.2, 0.3, 0.7]),
            DMatrix::from_row_slice(2, 2, &[0.6, 0.4, 0.2, 0.8]),
        ];
        Arc::new(LikelihoodModel::new(ObservationKind::CategoricalRandom, tables).unwrap())
    }

    fn uniform_combination(agents: usize) -> Arc<DMatrix<f64>> {
        Arc::new(DMatrix::from_element(agents, agents, 1.0 / agents as f64))
    }

    fn analytic(step_size: Option<f64>) -> AnalyticModel {
        AnalyticModel::new(two_agent_model(), uniform_combination(2), vec![0, 0], step_size)
            .unwrap()
    }

    #[test]
    fn test_expectation_zero_at_time_one() {
        for step_size in [None, Some(0.5)] {
            let model = analytic(step_size);
            let expectation = model.log_belief_expectation(1, 0, 1, None);
            assert!(expectation.iter().all(|&v| v == 0.0));

            let multi = model.log_belief_expectation_vs_reference(1, None);
            assert!(multi.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_expectation_at_time_two_is_the_drift() {
        // Only the k=0 term (identity power) contributes at time 2.
        let model = analytic(None);
        let gap = model.divergence_gap(0, 1);
        let expectation = model.log_belief_expectation(2, 0, 1, None);
        assert_eq!(expectation, gap);
    }

    #[test]
    fn test_step_size_scales_drift_and_combination() {
        let delta = 0.4;
        let model = analytic(Some(delta));
        let plain = analytic(None);

        let gap = plain.divergence_gap(0, 1);
        let expectation = model.log_belief_expectation(2, 0, 1, None);
        for agent in 0..2 {
            assert_relative_eq!(
                expectation[(agent, 0)],
                delta * gap[(agent, 0)],
                epsilon = 1e-12
            );
        }

        // Time 3 adds the ((1-delta) C)^T term on top.
        let scaled_c = uniform_combination(2).as_ref() * (1.0 - delta);
        let expected = &gap * delta + scaled_c.transpose() * (&gap * delta);
        let at_three = model.log_belief_expectation(3, 0, 1, None);
        for agent in 0..2 {
            assert_relative_eq!(
                at_three[(agent, 0)],
                expected[(agent, 0)],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_divergence_gap_sign() {
        // Under true state 0, D(true||1) > D(true||0) = 0, so the gap for
        // (s0=0, s1=1) is positive: evidence drifts toward the true state.
        let model = analytic(None);
        let gap = model.divergence_gap(0, 1);
        assert!(gap.iter().all(|&v| v > 0.0));

        // Swapping the pair flips the sign.
        let flipped = model.divergence_gap(1, 0);
        for agent in 0..2 {
            assert_relative_eq!(flipped[(agent, 0)], -gap[(agent, 0)], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_second_moment_at_time_one_is_outer_product() {
        // The expectation is zero at time 1, so Q collapses to kl kl^T and
        // only the t=0 identity term contributes.
        let model = analytic(None);
        let gap = model.divergence_gap(0, 1);
        let expected = &gap * gap.transpose();

        let r0 = model.log_belief_second_moment(1, 0, 1, None);
        assert_eq!(r0.shape(), (2, 2));
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(r0[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_second_moment_symmetric() {
        let model = analytic(Some(0.3));
        let r0 = model.log_belief_second_moment(5, 0, 1, None);
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(r0[(i, j)], r0[(j, i)], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_multistate_gap_matches_pairwise() {
        // With two states the single multistate column, D(true||1) minus
        // D(true||0), equals the pairwise gap for (s0=0, s1=1).
        let model = analytic(None);
        let multi = model.divergence_gap_vs_reference();
        assert_eq!(multi.shape(), (2, 1));
        let pairwise = model.divergence_gap(0, 1);
        for agent in 0..2 {
            assert_relative_eq!(multi[(agent, 0)], pairwise[(agent, 0)], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_alternate_combination_matrix() {
        // An identity alt matrix makes every power the identity, so the
        // expectation is just (time - 1) copies of the drift.
        let model = analytic(None);
        let gap = model.divergence_gap(0, 1);
        let identity = DMatrix::identity(2, 2);

        let expectation = model.log_belief_expectation(4, 0, 1, Some(&identity));
        for agent in 0..2 {
            assert_relative_eq!(
                expectation[(agent, 0)],
                3.0 * gap[(agent, 0)],
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_dimension_validation() {
        let model = two_agent_model();
        let wrong = Arc::new(DMatrix::from_element(3, 3, 1.0 / 3.0));
        assert!(AnalyticModel::new(model.clone(), wrong, vec![0, 0], None).is_err());

        let combination = uniform_combination(2);
        assert!(AnalyticModel::new(model.clone(), combination.clone(), vec![0], None).is_err());
        assert!(AnalyticModel::new(model, combination, vec![0, 5], None).is_err());
    }
}
