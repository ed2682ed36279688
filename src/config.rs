// src/config.rs
//
// Central configuration for the greenwave environment adapter.
//
// Everything here is a plain value handed into constructors: no
// process-wide singletons, so a training instance and an evaluation
// instance can coexist with independent configurations and uniquely
// labelled simulator sessions.

use std::time::Duration;

use crate::phase::DwellPolicy;

/// How to launch / attach to the external simulator process.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Simulator executable (e.g. `sumo`).
    pub command: String,
    /// Startup arguments passed through verbatim.
    pub args: Vec<String>,
    /// TCP port the simulator is told to listen on for the control protocol.
    pub port: u16,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            command: "sumo".to_string(),
            args: vec![
                "-c".to_string(),
                "config/light.sumocfg".to_string(),
                "--lateral-resolution".to_string(),
                "0".to_string(),
            ],
            port: 8813,
        }
    }
}

/// Connection retry behaviour for session establishment.
///
/// `max_attempts` counts total start attempts, so with the default of 5 a
/// simulator that fails five times in a row exhausts the budget.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Fixed delay between attempts. Retries block the calling thread;
    /// environment reset is already a synchronous boundary for the
    /// surrounding training loop.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Full configuration of one environment instance.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub launch: LaunchConfig,
    /// Prefix for session labels; each (session, attempt) pair gets a
    /// unique label so concurrent instances never collide.
    pub session_label: String,
    /// Traffic-light identifier in the simulator's network.
    pub tls_id: String,
    /// Lane-area detector identifiers, in observation order.
    pub detector_ids: Vec<String>,
    /// Minimum-dwell policy enforced on phase switches.
    pub dwell: DwellPolicy,
    /// Steps per episode before truncation.
    pub max_steps: u64,
    pub retry: RetryConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            launch: LaunchConfig::default(),
            session_label: "greenwave".to_string(),
            tls_id: "41896158".to_string(),
            detector_ids: vec![
                "e2_2".to_string(),
                "e2_3".to_string(),
                "e2_4".to_string(),
                "e2_6".to_string(),
                "e2_11".to_string(),
                "e2_9".to_string(),
            ],
            dwell: DwellPolicy::default(),
            max_steps: 1000,
            retry: RetryConfig::default(),
        }
    }
}

impl EnvConfig {
    /// Defaults with `GREENWAVE_*` environment overrides applied.
    ///
    /// Recognised variables: `GREENWAVE_MAX_STEPS`, `GREENWAVE_MAX_ATTEMPTS`,
    /// `GREENWAVE_BACKOFF_MS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<u64>("GREENWAVE_MAX_STEPS") {
            cfg.max_steps = v;
        }
        if let Some(v) = env_parse::<u32>("GREENWAVE_MAX_ATTEMPTS") {
            cfg.retry.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("GREENWAVE_BACKOFF_MS") {
            cfg.retry.backoff = Duration::from_millis(v);
        }
        cfg
    }

    /// Length of the observation vector: one queue count per detector plus
    /// the current phase index as the final element.
    pub fn observation_len(&self) -> usize {
        self.detector_ids.len() + 1
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_deployed_network() {
        let cfg = EnvConfig::default();
        assert_eq!(cfg.detector_ids.len(), 6);
        assert_eq!(cfg.observation_len(), 7);
        assert_eq!(cfg.tls_id, "41896158");
        assert_eq!(cfg.max_steps, 1000);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.backoff, Duration::from_secs(2));
    }
}
