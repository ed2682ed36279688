// src/phase.rs
//
// Signal-phase state machine.
//
// The agent only ever emits a binary intent (hold / advance). Everything
// that makes a phase sequence legal in the real world lives here: minimum
// dwell times per phase class and the legal next phase, read from the
// simulator's program logic at transition time rather than assumed constant.
// An untrained or adversarial policy therefore cannot produce an unsafe
// signal sequence.

use serde::{Deserialize, Serialize};

use crate::link::protocol::SimulatorBackend;
use crate::link::SimulationLink;

/// Discrete control intent emitted by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Keep the current phase.
    Hold,
    /// Request a switch to the next phase in the program.
    Advance,
}

impl Action {
    /// Decode the standard discrete action index (0 = hold, 1 = advance).
    pub fn from_index(index: u32) -> Option<Action> {
        match index {
            0 => Some(Action::Hold),
            1 => Some(Action::Advance),
            _ => None,
        }
    }

    pub fn index(self) -> u32 {
        match self {
            Action::Hold => 0,
            Action::Advance => 1,
        }
    }
}

/// Dwell-time requirement class of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DwellClass {
    /// Primary green phase.
    Primary,
    /// Yellow clearance phase.
    Yellow,
    /// Pedestrian / transition green phase.
    Transition,
}

/// Per-class minimum dwell table.
///
/// Phase indices are classified by membership in the yellow / transition
/// sets; anything else counts as primary green. The defaults reproduce a
/// six-phase program with greens at {0, 3}, yellows at {2, 5} and
/// pedestrian transitions at {1, 4}.
#[derive(Debug, Clone)]
pub struct DwellTable {
    pub primary_steps: u64,
    pub yellow_steps: u64,
    pub transition_steps: u64,
    pub yellow_phases: Vec<u32>,
    pub transition_phases: Vec<u32>,
}

impl Default for DwellTable {
    fn default() -> Self {
        Self {
            primary_steps: 5,
            yellow_steps: 3,
            transition_steps: 5,
            yellow_phases: vec![2, 5],
            transition_phases: vec![1, 4],
        }
    }
}

impl DwellTable {
    pub fn class_of(&self, phase: u32) -> DwellClass {
        if self.yellow_phases.contains(&phase) {
            DwellClass::Yellow
        } else if self.transition_phases.contains(&phase) {
            DwellClass::Transition
        } else {
            DwellClass::Primary
        }
    }

    pub fn min_steps(&self, phase: u32) -> u64 {
        match self.class_of(phase) {
            DwellClass::Primary => self.primary_steps,
            DwellClass::Yellow => self.yellow_steps,
            DwellClass::Transition => self.transition_steps,
        }
    }
}

/// Minimum-dwell policy variant.
///
/// `Uniform` applies one minimum-green threshold to every phase; `PerClass`
/// distinguishes primary green, yellow and pedestrian/transition phases.
#[derive(Debug, Clone)]
pub enum DwellPolicy {
    Uniform { min_steps: u64 },
    PerClass(DwellTable),
}

impl Default for DwellPolicy {
    fn default() -> Self {
        DwellPolicy::Uniform { min_steps: 5 }
    }
}

impl DwellPolicy {
    /// Minimum dwell steps required before leaving `phase`.
    pub fn min_steps_for(&self, phase: u32) -> u64 {
        match self {
            DwellPolicy::Uniform { min_steps } => *min_steps,
            DwellPolicy::PerClass(table) => table.min_steps(phase),
        }
    }
}

/// What became of one applied action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchOutcome {
    /// Hold requested; nothing to do.
    Held,
    /// Advance requested before the minimum dwell elapsed; no-op.
    DwellBlocked,
    /// The simulator accepted the switch.
    Switched { from: u32, to: u32 },
    /// The switch command failed at the protocol level; controller state
    /// is unchanged, the switch simply did not take effect this tick.
    CommandFailed,
}

/// State machine over signal phases: (current phase, last switch step).
///
/// The initial `last_switch_step` is `-(min dwell of phase 0)` so the very
/// first step of an episode is already eligible to switch.
pub struct PhaseController {
    policy: DwellPolicy,
    current_phase: u32,
    last_switch_step: i64,
}

impl PhaseController {
    pub fn new(policy: DwellPolicy) -> Self {
        let mut controller = Self {
            policy,
            current_phase: 0,
            last_switch_step: 0,
        };
        controller.reset();
        controller
    }

    /// Reset to the initial phase, immediately eligible to switch.
    pub fn reset(&mut self) {
        self.current_phase = 0;
        self.last_switch_step = -(self.policy.min_steps_for(0) as i64);
    }

    pub fn current_phase(&self) -> u32 {
        self.current_phase
    }

    pub fn last_switch_step(&self) -> i64 {
        self.last_switch_step
    }

    /// Apply one action at simulation step `step`.
    ///
    /// The dwell class is taken from the phase the simulator reports right
    /// now, and the program length is re-read at transition time (program
    /// logic is simulator-supplied and may change between sessions).
    /// Controller state only advances when the simulator accepted the
    /// command: a failed `set_phase` never moves `last_switch_step`.
    pub fn apply<B: SimulatorBackend>(
        &mut self,
        action: Action,
        step: u64,
        link: &mut SimulationLink<B>,
    ) -> SwitchOutcome {
        match action {
            Action::Hold => SwitchOutcome::Held,
            Action::Advance => {
                let reported = link.current_phase();
                let min_steps = self.policy.min_steps_for(reported);
                if (step as i64) - self.last_switch_step < min_steps as i64 {
                    return SwitchOutcome::DwellBlocked;
                }

                let num_phases = link.phase_count();
                if num_phases == 0 {
                    return SwitchOutcome::CommandFailed;
                }

                let next = (reported + 1) % num_phases;
                if link.set_phase(next) {
                    self.current_phase = next;
                    self.last_switch_step = step as i64;
                    SwitchOutcome::Switched {
                        from: reported,
                        to: next,
                    }
                } else {
                    SwitchOutcome::CommandFailed
                }
            }
        }
    }
}
