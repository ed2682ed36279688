// src/observation.rs
//
// Fixed-shape observation vector: one queue count per configured detector,
// in configuration order, followed by the current phase index. The shape
// never varies within a configuration, even when the simulator is
// unreachable or the identifiers failed validation; degraded readings
// appear as zeros, never as a shorter vector.

use serde::{Deserialize, Serialize};

use crate::link::protocol::SimulatorBackend;
use crate::link::SimulationLink;

/// One observation of the intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation {
    values: Vec<f64>,
}

impl Observation {
    /// Queue counts in detector order plus the phase index as the final
    /// element.
    pub fn from_parts(queues: Vec<f64>, phase: u32) -> Self {
        let mut values = queues;
        values.push(f64::from(phase));
        Self { values }
    }

    /// All-zero observation of the given total length.
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of the queue components (everything except the trailing phase).
    pub fn queue_sum(&self) -> f64 {
        match self.values.split_last() {
            Some((_phase, queues)) => queues.iter().sum(),
            None => 0.0,
        }
    }

    /// The trailing phase component, truncated back to an index.
    pub fn phase(&self) -> u32 {
        self.values.last().copied().unwrap_or(0.0) as u32
    }
}

/// Builds observations for a fixed detector configuration.
pub struct ObservationBuilder {
    detector_ids: Vec<String>,
}

impl ObservationBuilder {
    pub fn new(detector_ids: &[String]) -> Self {
        Self {
            detector_ids: detector_ids.to_vec(),
        }
    }

    /// Total observation length, queues plus phase.
    pub fn observation_len(&self) -> usize {
        self.detector_ids.len() + 1
    }

    /// Read the current observation from the simulator.
    ///
    /// If identifier validation failed for this session the simulator is
    /// not queried at all and the observation is all zeros. Individual
    /// failed reads degrade to zero inside the link.
    pub fn observe<B: SimulatorBackend>(&self, link: &mut SimulationLink<B>) -> Observation {
        if !link.ids_valid() {
            return Observation::zeros(self.observation_len());
        }
        let queues = self
            .detector_ids
            .iter()
            .map(|id| link.detector_count(id))
            .collect();
        Observation::from_parts(queues, link.current_phase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_appends_phase() {
        let obs = Observation::from_parts(vec![1.0, 0.0, 2.0], 3);
        assert_eq!(obs.values(), &[1.0, 0.0, 2.0, 3.0]);
        assert_eq!(obs.len(), 4);
        assert_eq!(obs.phase(), 3);
    }

    #[test]
    fn queue_sum_excludes_phase() {
        let obs = Observation::from_parts(vec![1.0, 0.0, 2.0, 0.0, 1.0, 0.0], 5);
        assert_eq!(obs.queue_sum(), 4.0);
    }

    #[test]
    fn zeros_has_requested_shape() {
        let obs = Observation::zeros(7);
        assert_eq!(obs.len(), 7);
        assert_eq!(obs.queue_sum(), 0.0);
        assert_eq!(obs.phase(), 0);
    }

    #[test]
    fn serializes_as_flat_array() {
        let obs = Observation::from_parts(vec![2.0, 1.0], 1);
        let json = serde_json::to_string(&obs).unwrap();
        assert_eq!(json, "[2.0,1.0,1.0]");
    }
}
