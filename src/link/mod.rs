//! Session lifecycle and degradation policy on top of the wire protocol.
//!
//! [`SimulationLink`] owns exactly one simulator session at a time. It
//! retries session establishment with a fixed backoff, stamps every attempt
//! with a unique label, validates the configured identifiers against what
//! the simulator actually loaded, and decides per query what a protocol
//! failure means: sensor reads degrade to zero, session-level reads
//! propagate, phase commands report plain success or failure.

pub mod mock;
pub mod protocol;

use tracing::{debug, warn};

use crate::config::EnvConfig;
use crate::error::{LinkError, ProtocolError};

use protocol::SimulatorBackend;

/// One live simulator session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Label the simulator was started under, unique per attempt.
    pub label: String,
    /// Which start attempt produced this session (1-based).
    pub attempt: u32,
}

/// The environment's handle on the external simulator.
pub struct SimulationLink<B: SimulatorBackend> {
    backend: B,
    cfg: EnvConfig,
    session: Option<Session>,
    /// Bumped on every `start()` so labels stay unique across restarts.
    session_seq: u64,
    valid_ids: bool,
}

impl<B: SimulatorBackend> SimulationLink<B> {
    pub fn new(backend: B, cfg: &EnvConfig) -> Self {
        Self {
            backend,
            cfg: cfg.clone(),
            session: None,
            session_seq: 0,
            valid_ids: false,
        }
    }

    /// Establish a fresh session, retrying with a fixed backoff.
    ///
    /// Each attempt gets a label of the form `{prefix}_{seq}_{attempt}` so
    /// overlapping instances and restarted sessions never reuse a label.
    /// On exhaustion the last protocol failure is returned inside
    /// [`LinkError::Connection`].
    pub fn start(&mut self) -> Result<(), LinkError> {
        self.session_seq += 1;
        let max_attempts = self.cfg.retry.max_attempts.max(1);
        let mut last_err: Option<ProtocolError> = None;

        for attempt in 1..=max_attempts {
            // Never stack sessions; tear down whatever is left first.
            self.close();

            let label = format!("{}_{}_{}", self.cfg.session_label, self.session_seq, attempt);
            match self.backend.start(&self.cfg.launch, &label) {
                Ok(()) => {
                    debug!(label, attempt, "simulator session started");
                    self.session = Some(Session { label, attempt });
                    self.valid_ids = true;
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        error = %err,
                        "simulator start attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < max_attempts {
                        std::thread::sleep(self.cfg.retry.backoff);
                    }
                }
            }
        }

        Err(LinkError::Connection {
            attempts: max_attempts,
            source: last_err.unwrap_or(ProtocolError::SessionClosed),
        })
    }

    /// Check the configured traffic light and detectors against what the
    /// simulator loaded. Returns the identifiers that are missing.
    ///
    /// Any missing identifier (or a failed listing) marks the whole id set
    /// invalid; sensor reads then short-circuit to zero instead of issuing
    /// requests the simulator would reject every step.
    pub fn validate_ids(&mut self) -> Vec<String> {
        let mut missing = Vec::new();

        match self.backend.list_traffic_lights() {
            Ok(tls) => {
                if !tls.contains(&self.cfg.tls_id) {
                    missing.push(self.cfg.tls_id.clone());
                }
            }
            Err(err) => {
                warn!(error = %err, "could not list traffic lights");
                self.valid_ids = false;
                return vec![self.cfg.tls_id.clone()];
            }
        }

        match self.backend.list_detectors() {
            Ok(detectors) => {
                for id in &self.cfg.detector_ids {
                    if !detectors.contains(id) {
                        missing.push(id.clone());
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "could not list detectors");
                self.valid_ids = false;
                missing.extend(self.cfg.detector_ids.iter().cloned());
                return missing;
            }
        }

        if !missing.is_empty() {
            warn!(?missing, "configured identifiers absent from the network");
            self.valid_ids = false;
        }
        missing
    }

    /// Advance the simulation by one tick.
    pub fn advance(&mut self) -> Result<(), LinkError> {
        self.backend.advance().map_err(LinkError::Simulation)
    }

    /// Queued vehicles on one detector; degrades to 0.0 on any failure or
    /// nonsensical reading.
    pub fn detector_count(&mut self, detector_id: &str) -> f64 {
        match self.backend.detector_count(detector_id) {
            Ok(count) if count.is_finite() && count >= 0.0 => count,
            Ok(count) => {
                debug!(detector_id, count, "discarding nonsensical queue count");
                0.0
            }
            Err(err) => {
                debug!(detector_id, error = %err, "detector read failed");
                0.0
            }
        }
    }

    /// Active phase of the configured traffic light; degrades to 0.
    pub fn current_phase(&mut self) -> u32 {
        match self.backend.current_phase(&self.cfg.tls_id) {
            Ok(phase) => phase,
            Err(err) => {
                debug!(error = %err, "phase read failed");
                0
            }
        }
    }

    /// Number of phases in the program; degrades to 0 (callers treat an
    /// empty program as "cannot switch").
    pub fn phase_count(&mut self) -> u32 {
        match self.backend.phase_count(&self.cfg.tls_id) {
            Ok(count) => count,
            Err(err) => {
                debug!(error = %err, "phase-count read failed");
                0
            }
        }
    }

    /// Command the traffic light to `phase`. Reports whether the simulator
    /// accepted the command.
    pub fn set_phase(&mut self, phase: u32) -> bool {
        match self.backend.set_phase(&self.cfg.tls_id, phase) {
            Ok(()) => true,
            Err(err) => {
                warn!(phase, error = %err, "phase command failed");
                false
            }
        }
    }

    /// Elapsed simulated time. Session-level: failures propagate.
    pub fn elapsed_time(&mut self) -> Result<f64, LinkError> {
        self.backend.elapsed_time().map_err(LinkError::Simulation)
    }

    /// Vehicles currently in the simulation. Session-level: failures
    /// propagate.
    pub fn vehicle_count(&mut self) -> Result<u64, LinkError> {
        self.backend.vehicle_count().map_err(LinkError::Simulation)
    }

    /// Tear down the current session, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            if let Err(err) = self.backend.close() {
                debug!(error = %err, "session close reported an error");
            }
        }
        self.valid_ids = false;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether the configured identifiers all resolved in this session.
    pub fn ids_valid(&self) -> bool {
        self.valid_ids
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: SimulatorBackend> Drop for SimulationLink<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::mock::ScriptedSimulator;
    use super::*;

    fn test_cfg() -> EnvConfig {
        let mut cfg = EnvConfig::default();
        cfg.session_label = "test".to_string();
        cfg.tls_id = "tls".to_string();
        cfg.detector_ids = vec!["d0".to_string(), "d1".to_string()];
        cfg.retry.backoff = Duration::ZERO;
        cfg
    }

    #[test]
    fn labels_encode_sequence_and_attempt() {
        let sim = ScriptedSimulator::new("tls", &["d0", "d1"]).fail_next_starts(1);
        let mut link = SimulationLink::new(sim, &test_cfg());

        link.start().unwrap();
        let session = link.session().unwrap();
        assert_eq!(session.label, "test_1_2");
        assert_eq!(session.attempt, 2);

        // A restart bumps the sequence even when the first attempt works.
        link.start().unwrap();
        assert_eq!(link.session().unwrap().label, "test_2_1");
    }

    #[test]
    fn missing_detector_invalidates_ids() {
        let sim = ScriptedSimulator::new("tls", &["d0", "d1"]).with_listed_detectors(&["d0"]);
        let mut link = SimulationLink::new(sim, &test_cfg());

        link.start().unwrap();
        assert!(link.ids_valid());
        let missing = link.validate_ids();
        assert_eq!(missing, vec!["d1".to_string()]);
        assert!(!link.ids_valid());
    }

    #[test]
    fn sensor_reads_degrade_to_zero_without_session() {
        let sim = ScriptedSimulator::new("tls", &["d0", "d1"]);
        let mut link = SimulationLink::new(sim, &test_cfg());

        // No session at all: every sensor read degrades.
        assert_eq!(link.detector_count("d0"), 0.0);
        assert_eq!(link.current_phase(), 0);
        assert_eq!(link.phase_count(), 0);
        assert!(!link.set_phase(1));
        assert!(link.advance().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let sim = ScriptedSimulator::new("tls", &["d0", "d1"]);
        let mut link = SimulationLink::new(sim, &test_cfg());
        link.start().unwrap();
        link.close();
        link.close();
        assert!(link.session().is_none());
        assert!(!link.backend().is_started());
    }
}
