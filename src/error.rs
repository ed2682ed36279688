// src/error.rs
//
// Error taxonomy for the simulation-control adapter.
//
// Two levels:
// - ProtocolError: one request/response exchange with the simulator failed.
// - LinkError: what that failure means for the session. `Connection` is
//   fatal to the calling training run and propagates out of reset();
//   `Simulation` is episode-local and ends the current episode only.
//
// Missing identifiers and degenerate simulator states are conditions, not
// errors: they surface through the link's `valid_ids` flag, zero-default
// observations, and the step info diagnostics.

use thiserror::Error;

/// A single protocol call against the simulator failed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error talking to the simulator: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for a simulator response")]
    Timeout,

    #[error("simulator handshake failed: {0}")]
    Handshake(String),

    #[error("malformed simulator response: {0}")]
    Malformed(String),

    #[error("no live simulator session")]
    SessionClosed,

    #[error("simulator rejected the request: {0}")]
    Rejected(String),
}

/// Session-level failure as seen by the environment.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The simulator could not be started after exhausting all attempts.
    /// Fatal: propagates out of `reset()` to the caller.
    #[error("simulator start failed after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: ProtocolError,
    },

    /// A tick or command failed against a live session. The current episode
    /// ends early; the environment stays usable for the next reset.
    #[error("simulation step failed: {0}")]
    Simulation(#[source] ProtocolError),
}
