// src/reward.rs
//
// Scalar reward: the negated sum of queued vehicles across all detectors.
// Zero is the best attainable value (empty intersection); everything else
// is negative pressure the policy should relieve. The phase component of
// the observation never enters the reward.

use crate::observation::Observation;

/// Reward for one step: `-(sum of queue counts)`.
pub fn queue_cost(obs: &Observation) -> f64 {
    -obs.queue_sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_is_negated_queue_sum() {
        let obs = Observation::from_parts(vec![1.0, 0.0, 2.0, 0.0, 1.0, 0.0], 2);
        assert_eq!(queue_cost(&obs), -4.0);
    }

    #[test]
    fn empty_intersection_scores_zero() {
        let obs = Observation::from_parts(vec![0.0; 6], 5);
        assert_eq!(queue_cost(&obs), 0.0);
    }

    #[test]
    fn reward_is_never_positive() {
        for queues in [vec![0.0], vec![3.0, 7.5], vec![100.0, 0.0, 1.0]] {
            let obs = Observation::from_parts(queues, 0);
            assert!(queue_cost(&obs) <= 0.0);
        }
    }
}
