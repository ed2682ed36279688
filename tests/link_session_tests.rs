// tests/link_session_tests.rs
//
// Session establishment, retry exhaustion and identifier validation.

use std::time::Duration;

use greenwave::{
    EnvConfig, LinkError, ObservationBuilder, ProtocolError, ScriptedSimulator, SimulationLink,
};

fn test_cfg() -> EnvConfig {
    let mut cfg = EnvConfig::default();
    cfg.session_label = "link-test".to_string();
    cfg.tls_id = "tls".to_string();
    cfg.detector_ids = vec!["d0".to_string(), "d1".to_string()];
    cfg.retry.backoff = Duration::ZERO;
    cfg
}

#[test]
fn exhausted_retries_report_attempt_count() {
    let sim = ScriptedSimulator::new("tls", &["d0", "d1"]).fail_next_starts(5);
    let mut link = SimulationLink::new(sim, &test_cfg());

    match link.start() {
        Err(LinkError::Connection { attempts, source }) => {
            assert_eq!(attempts, 5);
            assert!(matches!(source, ProtocolError::Handshake(_)));
        }
        other => panic!("expected connection failure, got {other:?}"),
    }
    assert_eq!(link.backend().start_attempts(), 5);
    assert!(link.session().is_none());
}

#[test]
fn start_succeeds_within_the_attempt_budget() {
    let sim = ScriptedSimulator::new("tls", &["d0", "d1"]).fail_next_starts(2);
    let mut link = SimulationLink::new(sim, &test_cfg());

    link.start().unwrap();
    let session = link.session().unwrap();
    assert_eq!(session.attempt, 3);
    assert_eq!(session.label, "link-test_1_3");
    assert_eq!(link.backend().start_attempts(), 3);
}

#[test]
fn restart_gives_every_session_a_fresh_label() {
    let sim = ScriptedSimulator::new("tls", &["d0", "d1"]);
    let mut link = SimulationLink::new(sim, &test_cfg());

    let mut labels = Vec::new();
    for _ in 0..3 {
        link.start().unwrap();
        labels.push(link.session().unwrap().label.clone());
    }
    labels.sort();
    labels.dedup();
    assert_eq!(labels.len(), 3);
}

#[test]
fn validation_passes_when_everything_resolves() {
    let sim = ScriptedSimulator::new("tls", &["d0", "d1"]);
    let mut link = SimulationLink::new(sim, &test_cfg());

    link.start().unwrap();
    assert!(link.validate_ids().is_empty());
    assert!(link.ids_valid());
}

#[test]
fn missing_traffic_light_degrades_observations_to_zero() {
    let sim =
        ScriptedSimulator::new("tls", &["d0", "d1"]).with_listed_traffic_lights(&["other_tls"]);
    let mut link = SimulationLink::new(sim, &test_cfg());

    link.start().unwrap();
    let missing = link.validate_ids();
    assert_eq!(missing, vec!["tls".to_string()]);
    assert!(!link.ids_valid());

    let builder = ObservationBuilder::new(&["d0".to_string(), "d1".to_string()]);
    let obs = builder.observe(&mut link);
    assert_eq!(obs.values(), &[0.0, 0.0, 0.0]);
}

#[test]
fn dropped_session_fails_advance_but_degrades_reads() {
    let sim = ScriptedSimulator::new("tls", &["d0", "d1"])
        .with_constant_queues(&[3.0, 4.0])
        .drop_connection_at(2);
    let mut link = SimulationLink::new(sim, &test_cfg());

    link.start().unwrap();
    link.advance().unwrap();
    link.advance().unwrap();
    // The session is gone from tick 2 on.
    assert!(matches!(link.advance(), Err(LinkError::Simulation(_))));
    assert_eq!(link.detector_count("d0"), 0.0);
    assert_eq!(link.current_phase(), 0);
    assert!(link.vehicle_count().is_err());
}
