//! Deterministic in-memory simulator for tests and the demo harness.
//!
//! `ScriptedSimulator` implements the full backend protocol against
//! scripted traces instead of a live process: per-detector queue traces,
//! a vehicle-count schedule, and injectable failures (start failures,
//! a failing tick, rejected phase commands, a dropped connection). Traces
//! are indexed by tick and repeat their last value, so a one-element trace
//! behaves as a constant.

use std::collections::HashMap;

use crate::config::LaunchConfig;
use crate::error::ProtocolError;

use super::protocol::SimulatorBackend;

pub struct ScriptedSimulator {
    tls_id: String,
    detector_ids: Vec<String>,
    queues: HashMap<String, Vec<f64>>,
    vehicles: Vec<u64>,
    phase_count: u32,
    negative_time_at: Option<u64>,

    // Failure injection.
    fail_starts: u32,
    fail_advance_at: Option<u64>,
    reject_set_phase: bool,
    drop_connection_at: Option<u64>,
    listed_detectors: Option<Vec<String>>,
    listed_traffic_lights: Option<Vec<String>>,

    // Session state.
    started: bool,
    step: u64,
    current_phase: u32,
    start_attempts: u32,
    label: Option<String>,
    accepted_phases: Vec<u32>,
}

impl ScriptedSimulator {
    pub fn new(tls_id: &str, detector_ids: &[&str]) -> Self {
        let detector_ids: Vec<String> = detector_ids.iter().map(|s| s.to_string()).collect();
        let queues = detector_ids
            .iter()
            .map(|id| (id.clone(), vec![0.0]))
            .collect();
        Self {
            tls_id: tls_id.to_string(),
            detector_ids,
            queues,
            vehicles: vec![25],
            phase_count: 6,
            negative_time_at: None,
            fail_starts: 0,
            fail_advance_at: None,
            reject_set_phase: false,
            drop_connection_at: None,
            listed_detectors: None,
            listed_traffic_lights: None,
            started: false,
            step: 0,
            current_phase: 0,
            start_attempts: 0,
            label: None,
            accepted_phases: Vec::new(),
        }
    }

    /// Constant queue counts, one per detector in order.
    pub fn with_constant_queues(mut self, counts: &[f64]) -> Self {
        for (id, count) in self.detector_ids.iter().zip(counts) {
            self.queues.insert(id.clone(), vec![*count]);
        }
        self
    }

    /// Scripted queue trace for one detector, indexed by tick.
    pub fn with_queue_trace(mut self, detector_id: &str, trace: Vec<f64>) -> Self {
        self.queues.insert(detector_id.to_string(), trace);
        self
    }

    /// Scripted live-vehicle count, indexed by tick.
    pub fn with_vehicle_trace(mut self, trace: Vec<u64>) -> Self {
        self.vehicles = trace;
        self
    }

    pub fn with_phase_count(mut self, count: u32) -> Self {
        self.phase_count = count;
        self
    }

    /// Fail the next `n` start attempts with a handshake error.
    pub fn fail_next_starts(mut self, n: u32) -> Self {
        self.fail_starts = n;
        self
    }

    /// Fail the advance issued while the simulator is at `tick` (one-shot).
    pub fn fail_advance_at(mut self, tick: u64) -> Self {
        self.fail_advance_at = Some(tick);
        self
    }

    /// Reject every phase command.
    pub fn reject_set_phase(mut self) -> Self {
        self.reject_set_phase = true;
        self
    }

    /// Report a negative elapsed time once the simulator reaches `tick`.
    pub fn negative_time_at(mut self, tick: u64) -> Self {
        self.negative_time_at = Some(tick);
        self
    }

    /// Kill the session once the simulator reaches `tick`; every later call
    /// fails until the next start.
    pub fn drop_connection_at(mut self, tick: u64) -> Self {
        self.drop_connection_at = Some(tick);
        self
    }

    /// Override the advertised detector list (identifier-validation tests).
    pub fn with_listed_detectors(mut self, ids: &[&str]) -> Self {
        self.listed_detectors = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Override the advertised traffic-light list.
    pub fn with_listed_traffic_lights(mut self, ids: &[&str]) -> Self {
        self.listed_traffic_lights = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    // Accessors for assertions.

    pub fn start_attempts(&self) -> u32 {
        self.start_attempts
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn ticks_advanced(&self) -> u64 {
        self.step
    }

    /// Phase commands the simulator accepted, in order.
    pub fn accepted_phases(&self) -> &[u32] {
        &self.accepted_phases
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn live(&mut self) -> Result<(), ProtocolError> {
        if !self.started {
            return Err(ProtocolError::SessionClosed);
        }
        if let Some(at) = self.drop_connection_at {
            if self.step >= at {
                self.started = false;
                return Err(ProtocolError::SessionClosed);
            }
        }
        Ok(())
    }

    fn trace_at<T: Copy>(trace: &[T], step: u64, default: T) -> T {
        if trace.is_empty() {
            return default;
        }
        let idx = (step as usize).min(trace.len() - 1);
        trace[idx]
    }
}

impl SimulatorBackend for ScriptedSimulator {
    fn start(&mut self, _launch: &LaunchConfig, label: &str) -> Result<(), ProtocolError> {
        self.start_attempts += 1;
        if self.start_attempts <= self.fail_starts {
            return Err(ProtocolError::Handshake(format!(
                "scripted start failure {}",
                self.start_attempts
            )));
        }
        self.started = true;
        self.step = 0;
        self.current_phase = 0;
        self.label = Some(label.to_string());
        Ok(())
    }

    fn advance(&mut self) -> Result<(), ProtocolError> {
        self.live()?;
        if self.fail_advance_at == Some(self.step) {
            self.fail_advance_at = None;
            return Err(ProtocolError::Rejected("scripted tick failure".to_string()));
        }
        self.step += 1;
        Ok(())
    }

    fn detector_count(&mut self, detector_id: &str) -> Result<f64, ProtocolError> {
        self.live()?;
        match self.queues.get(detector_id) {
            Some(trace) => Ok(Self::trace_at(trace, self.step, 0.0)),
            None => Err(ProtocolError::Rejected(format!(
                "unknown detector {detector_id}"
            ))),
        }
    }

    fn current_phase(&mut self, tls_id: &str) -> Result<u32, ProtocolError> {
        self.live()?;
        if tls_id != self.tls_id {
            return Err(ProtocolError::Rejected(format!(
                "unknown traffic light {tls_id}"
            )));
        }
        Ok(self.current_phase)
    }

    fn phase_count(&mut self, tls_id: &str) -> Result<u32, ProtocolError> {
        self.live()?;
        if tls_id != self.tls_id {
            return Err(ProtocolError::Rejected(format!(
                "unknown traffic light {tls_id}"
            )));
        }
        Ok(self.phase_count)
    }

    fn set_phase(&mut self, tls_id: &str, phase: u32) -> Result<(), ProtocolError> {
        self.live()?;
        if tls_id != self.tls_id {
            return Err(ProtocolError::Rejected(format!(
                "unknown traffic light {tls_id}"
            )));
        }
        if self.reject_set_phase {
            return Err(ProtocolError::Rejected(
                "scripted phase rejection".to_string(),
            ));
        }
        self.current_phase = phase;
        self.accepted_phases.push(phase);
        Ok(())
    }

    fn elapsed_time(&mut self) -> Result<f64, ProtocolError> {
        self.live()?;
        if let Some(at) = self.negative_time_at {
            if self.step >= at {
                return Ok(-1.0);
            }
        }
        Ok(self.step as f64)
    }

    fn vehicle_count(&mut self) -> Result<u64, ProtocolError> {
        self.live()?;
        Ok(Self::trace_at(&self.vehicles, self.step, 0))
    }

    fn list_traffic_lights(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.live()?;
        Ok(self
            .listed_traffic_lights
            .clone()
            .unwrap_or_else(|| vec![self.tls_id.clone()]))
    }

    fn list_detectors(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.live()?;
        Ok(self
            .listed_detectors
            .clone()
            .unwrap_or_else(|| self.detector_ids.clone()))
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        self.started = false;
        Ok(())
    }
}
