// src/episode.rs
//
// Episode loop over the simulation link: the reset/step/close surface a
// training harness drives. One runner owns one link, one phase controller
// and one observation builder; episodes are numbered from 1 and every
// finished episode leaves a summary record behind.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EnvConfig;
use crate::error::LinkError;
use crate::link::protocol::SimulatorBackend;
use crate::link::SimulationLink;
use crate::observation::{Observation, ObservationBuilder};
use crate::phase::{Action, PhaseController, SwitchOutcome};
use crate::record::EpisodeSink;
use crate::reward::queue_cost;

/// Lifecycle of the runner with respect to the current episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    /// No episode has been started yet.
    NotStarted,
    /// An episode is in progress; `step` is accepted.
    Running,
    /// The last episode finished; `reset` is required before stepping.
    Done,
}

/// Why an episode ended before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The simulator session died mid-episode.
    ConnectionLost,
    /// The simulator reported a negative elapsed time.
    NegativeSimTime,
    /// The simulation drained of vehicles before the step limit.
    NoVehicles,
    /// `step` was called with no episode in progress.
    NotRunning,
}

/// Summary of one finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// 1-based episode number within this runner.
    pub episode: u64,
    /// Completed steps (terminal diagnostics excluded).
    pub steps: u64,
    pub cumulative_reward: f64,
    /// Mean total queue across the episode's completed steps.
    pub avg_queue: f64,
    /// True when the episode ended early rather than hitting the step limit.
    pub terminated: bool,
}

/// Step diagnostics alongside the observation and reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub episode: u64,
    /// Step index within the episode this result belongs to (0-based).
    pub step: u64,
    pub switch: SwitchOutcome,
    pub reason: Option<TerminationReason>,
}

/// Everything one `step` call returns.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    /// The episode ended early (see `info.reason`).
    pub terminated: bool,
    /// The episode hit the configured step limit.
    pub truncated: bool,
    pub info: StepInfo,
}

/// Diagnostics from `reset`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetInfo {
    pub episode: u64,
    /// Configured identifiers the simulator's network does not contain.
    /// Non-empty means this episode will observe all zeros.
    pub missing_ids: Vec<String>,
}

#[derive(Default)]
struct EpisodeState {
    step_count: u64,
    cumulative_reward: f64,
    total_queue: f64,
}

/// Drives episodes against the simulator.
pub struct EpisodeRunner<B: SimulatorBackend, S: EpisodeSink> {
    link: SimulationLink<B>,
    controller: PhaseController,
    builder: ObservationBuilder,
    sink: S,
    max_steps: u64,
    state: EpisodeState,
    status: RunnerStatus,
    episode: u64,
    history: Vec<EpisodeRecord>,
}

impl<B: SimulatorBackend, S: EpisodeSink> EpisodeRunner<B, S> {
    pub fn new(cfg: &EnvConfig, backend: B, sink: S) -> Self {
        Self {
            link: SimulationLink::new(backend, cfg),
            controller: PhaseController::new(cfg.dwell.clone()),
            builder: ObservationBuilder::new(&cfg.detector_ids),
            sink,
            max_steps: cfg.max_steps,
            state: EpisodeState::default(),
            status: RunnerStatus::NotStarted,
            episode: 0,
            history: Vec::new(),
        }
    }

    /// Begin a fresh episode: tear down any previous session, start a new
    /// one (retrying per the retry config), validate identifiers, prime the
    /// simulation with one tick and force the program back to phase 0.
    ///
    /// Only session establishment is fatal; everything after it degrades.
    pub fn reset(&mut self) -> Result<(Observation, ResetInfo), LinkError> {
        self.link.close();
        self.link.start()?;

        let missing_ids = self.link.validate_ids();

        // One priming tick so the first observation reflects a live network.
        if let Err(err) = self.link.advance() {
            warn!(error = %err, "priming tick failed");
        }

        self.controller.reset();
        if self.link.ids_valid() && !self.link.set_phase(0) {
            warn!("could not force initial phase");
        }

        self.state = EpisodeState::default();
        self.episode += 1;
        self.status = RunnerStatus::Running;

        let observation = self.builder.observe(&mut self.link);
        info!(
            episode = self.episode,
            missing = missing_ids.len(),
            "episode started"
        );
        Ok((
            observation,
            ResetInfo {
                episode: self.episode,
                missing_ids,
            },
        ))
    }

    /// Apply one action and advance the simulation one tick.
    ///
    /// Mid-episode simulator failures terminate the episode with a reason
    /// instead of propagating: the runner stays usable and the next
    /// `reset` starts over with a fresh session.
    pub fn step(&mut self, action: Action) -> StepResult {
        if self.status != RunnerStatus::Running {
            return StepResult {
                observation: Observation::zeros(self.builder.observation_len()),
                reward: 0.0,
                terminated: true,
                truncated: false,
                info: StepInfo {
                    episode: self.episode,
                    step: self.state.step_count,
                    switch: SwitchOutcome::Held,
                    reason: Some(TerminationReason::NotRunning),
                },
            };
        }

        let switch = self
            .controller
            .apply(action, self.state.step_count, &mut self.link);

        if self.link.advance().is_err() {
            return self.finish_terminated(TerminationReason::ConnectionLost, switch);
        }

        match self.link.elapsed_time() {
            Ok(t) if t < 0.0 => {
                return self.finish_terminated(TerminationReason::NegativeSimTime, switch);
            }
            Ok(_) => {}
            Err(_) => {
                return self.finish_terminated(TerminationReason::ConnectionLost, switch);
            }
        }

        match self.link.vehicle_count() {
            // An empty network right at the step limit is just truncation.
            Ok(0) if self.state.step_count + 1 < self.max_steps => {
                return self.finish_terminated(TerminationReason::NoVehicles, switch);
            }
            Ok(_) => {}
            Err(_) => {
                return self.finish_terminated(TerminationReason::ConnectionLost, switch);
            }
        }

        let observation = self.builder.observe(&mut self.link);
        let reward = queue_cost(&observation);
        let step = self.state.step_count;
        self.state.total_queue += observation.queue_sum();
        self.state.cumulative_reward += reward;
        self.state.step_count += 1;

        let truncated = self.state.step_count >= self.max_steps;
        if truncated {
            self.finish_episode(false);
        }

        StepResult {
            observation,
            reward,
            terminated: false,
            truncated,
            info: StepInfo {
                episode: self.episode,
                step,
                switch,
                reason: None,
            },
        }
    }

    fn finish_terminated(&mut self, reason: TerminationReason, switch: SwitchOutcome) -> StepResult {
        warn!(episode = self.episode, ?reason, "episode terminated early");
        // Degraded reads yield zeros here if the session is gone.
        let observation = self.builder.observe(&mut self.link);
        let step = self.state.step_count;
        self.finish_episode(true);
        StepResult {
            observation,
            reward: 0.0,
            terminated: true,
            truncated: false,
            info: StepInfo {
                episode: self.episode,
                step,
                switch,
                reason: Some(reason),
            },
        }
    }

    fn finish_episode(&mut self, terminated: bool) {
        let steps = self.state.step_count;
        let avg_queue = if steps > 0 {
            self.state.total_queue / steps as f64
        } else {
            0.0
        };
        let record = EpisodeRecord {
            episode: self.episode,
            steps,
            cumulative_reward: self.state.cumulative_reward,
            avg_queue,
            terminated,
        };
        info!(
            episode = record.episode,
            steps = record.steps,
            cumulative_reward = record.cumulative_reward,
            avg_queue = record.avg_queue,
            terminated,
            "episode finished"
        );
        self.sink.record(&record);
        self.history.push(record);
        self.status = RunnerStatus::Done;
    }

    /// Number of discrete actions the runner accepts.
    pub fn action_space(&self) -> u32 {
        2
    }

    pub fn observation_len(&self) -> usize {
        self.builder.observation_len()
    }

    pub fn status(&self) -> RunnerStatus {
        self.status
    }

    /// Records of every finished episode, in order.
    pub fn history(&self) -> &[EpisodeRecord] {
        &self.history
    }

    pub fn episode_count(&self) -> usize {
        self.history.len()
    }

    pub fn link(&self) -> &SimulationLink<B> {
        &self.link
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.link.backend_mut()
    }

    /// Tear down the simulator session. The runner can still be reset.
    pub fn close(&mut self) {
        self.link.close();
        if self.status == RunnerStatus::Running {
            self.status = RunnerStatus::Done;
        }
    }
}
