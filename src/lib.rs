// src/lib.rs
//
// greenwave: a reinforcement-learning environment adapter for adaptive
// traffic-signal control against an external microscopic traffic simulator.
//
// The crate wraps one signalised intersection as a discrete-action
// environment: observations are per-detector queue counts plus the active
// signal phase, the reward is the negated total queue, and a phase
// controller keeps every commanded signal sequence legal regardless of
// what the policy requests. The simulator is reached over a session
// protocol with retrying establishment and per-query degradation, so a
// flaky simulator ends episodes instead of crashing training runs.

pub mod config;
pub mod episode;
pub mod error;
pub mod link;
pub mod observation;
pub mod phase;
pub mod record;
pub mod reward;

pub use config::{EnvConfig, LaunchConfig, RetryConfig};
pub use episode::{
    EpisodeRecord, EpisodeRunner, ResetInfo, RunnerStatus, StepInfo, StepResult, TerminationReason,
};
pub use error::{LinkError, ProtocolError};
pub use link::mock::ScriptedSimulator;
pub use link::protocol::{ProcessBackend, SimulatorBackend};
pub use link::{Session, SimulationLink};
pub use observation::{Observation, ObservationBuilder};
pub use phase::{Action, DwellClass, DwellPolicy, DwellTable, PhaseController, SwitchOutcome};
pub use record::{EpisodeSink, JsonlSink, NoopSink};
pub use reward::queue_cost;
