// tests/phase_controller_tests.rs
//
// Dwell-time state machine driven against the scripted simulator.

use std::time::Duration;

use greenwave::{
    Action, DwellPolicy, DwellTable, EnvConfig, PhaseController, ScriptedSimulator, SimulationLink,
    SwitchOutcome,
};

fn linked(sim: ScriptedSimulator) -> SimulationLink<ScriptedSimulator> {
    let mut cfg = EnvConfig::default();
    cfg.session_label = "phase-test".to_string();
    cfg.tls_id = "tls".to_string();
    cfg.detector_ids = vec![];
    cfg.retry.backoff = Duration::ZERO;
    let mut link = SimulationLink::new(sim, &cfg);
    link.start().unwrap();
    link
}

#[test]
fn hold_never_touches_the_simulator() {
    let mut link = linked(ScriptedSimulator::new("tls", &[]));
    let mut controller = PhaseController::new(DwellPolicy::default());

    for step in 0..10 {
        assert_eq!(
            controller.apply(Action::Hold, step, &mut link),
            SwitchOutcome::Held
        );
    }
    assert!(link.backend().accepted_phases().is_empty());
    assert_eq!(controller.current_phase(), 0);
}

#[test]
fn first_step_is_already_eligible() {
    let mut link = linked(ScriptedSimulator::new("tls", &[]));
    let mut controller = PhaseController::new(DwellPolicy::Uniform { min_steps: 5 });

    assert_eq!(
        controller.apply(Action::Advance, 0, &mut link),
        SwitchOutcome::Switched { from: 0, to: 1 }
    );
    assert_eq!(controller.current_phase(), 1);
    assert_eq!(controller.last_switch_step(), 0);
}

#[test]
fn dwell_blocks_until_minimum_elapsed() {
    let mut link = linked(ScriptedSimulator::new("tls", &[]));
    let mut controller = PhaseController::new(DwellPolicy::Uniform { min_steps: 3 });

    assert_eq!(
        controller.apply(Action::Advance, 0, &mut link),
        SwitchOutcome::Switched { from: 0, to: 1 }
    );
    assert_eq!(
        controller.apply(Action::Advance, 1, &mut link),
        SwitchOutcome::DwellBlocked
    );
    assert_eq!(
        controller.apply(Action::Advance, 2, &mut link),
        SwitchOutcome::DwellBlocked
    );
    assert_eq!(
        controller.apply(Action::Advance, 3, &mut link),
        SwitchOutcome::Switched { from: 1, to: 2 }
    );
    assert_eq!(link.backend().accepted_phases(), &[1, 2]);
}

#[test]
fn next_phase_wraps_modulo_program_length() {
    let mut link = linked(ScriptedSimulator::new("tls", &[]).with_phase_count(3));
    let mut controller = PhaseController::new(DwellPolicy::Uniform { min_steps: 0 });

    for (step, expected) in [(0, 1), (1, 2), (2, 0)] {
        assert_eq!(
            controller.apply(Action::Advance, step, &mut link),
            SwitchOutcome::Switched {
                from: step as u32,
                to: expected
            }
        );
    }
    assert_eq!(link.backend().accepted_phases(), &[1, 2, 0]);
}

#[test]
fn rejected_command_leaves_controller_state_unchanged() {
    let mut link = linked(ScriptedSimulator::new("tls", &[]).reject_set_phase());
    let mut controller = PhaseController::new(DwellPolicy::Uniform { min_steps: 5 });

    assert_eq!(
        controller.apply(Action::Advance, 0, &mut link),
        SwitchOutcome::CommandFailed
    );
    assert_eq!(controller.current_phase(), 0);
    assert_eq!(controller.last_switch_step(), -5);
    // Still eligible on the very next step.
    assert_eq!(
        controller.apply(Action::Advance, 1, &mut link),
        SwitchOutcome::CommandFailed
    );
}

#[test]
fn per_class_policy_uses_the_reported_phase() {
    let mut link = linked(ScriptedSimulator::new("tls", &[]));
    let mut controller = PhaseController::new(DwellPolicy::PerClass(DwellTable::default()));

    // Primary green at phase 0, eligible immediately.
    assert_eq!(
        controller.apply(Action::Advance, 0, &mut link),
        SwitchOutcome::Switched { from: 0, to: 1 }
    );

    // Phase 1 is a transition phase: five steps of dwell.
    for step in 1..5 {
        assert_eq!(
            controller.apply(Action::Advance, step, &mut link),
            SwitchOutcome::DwellBlocked
        );
    }
    assert_eq!(
        controller.apply(Action::Advance, 5, &mut link),
        SwitchOutcome::Switched { from: 1, to: 2 }
    );

    // Phase 2 is yellow: only three steps of dwell.
    for step in 6..8 {
        assert_eq!(
            controller.apply(Action::Advance, step, &mut link),
            SwitchOutcome::DwellBlocked
        );
    }
    assert_eq!(
        controller.apply(Action::Advance, 8, &mut link),
        SwitchOutcome::Switched { from: 2, to: 3 }
    );
}
