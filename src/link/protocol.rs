//! Simulator-facing wire protocol.
//!
//! The external simulator is a black box reachable only through a
//! request/response session. [`SimulatorBackend`] captures that session as
//! a trait whose every call yields success-or-failure, so failure handling
//! composes explicitly instead of leaking exceptions through the adapter.
//!
//! [`ProcessBackend`] is the real implementation: it launches the simulator
//! process with the configured arguments plus a `--remote-port` flag, then
//! speaks a line-delimited JSON protocol over TCP with a read timeout on
//! every exchange.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LaunchConfig;
use crate::error::ProtocolError;

/// Request/response session with the traffic simulator.
///
/// Every method may fail with a [`ProtocolError`]; callers decide whether a
/// given failure degrades, terminates the episode, or is fatal.
pub trait SimulatorBackend {
    /// Launch/attach with the given startup arguments and session label.
    fn start(&mut self, launch: &LaunchConfig, label: &str) -> Result<(), ProtocolError>;
    /// Advance the simulation by one discrete tick.
    fn advance(&mut self) -> Result<(), ProtocolError>;
    /// Vehicles currently queued on a lane-area detector.
    fn detector_count(&mut self, detector_id: &str) -> Result<f64, ProtocolError>;
    /// Active phase index of a traffic-light program.
    fn current_phase(&mut self, tls_id: &str) -> Result<u32, ProtocolError>;
    /// Number of phases in a traffic-light program.
    fn phase_count(&mut self, tls_id: &str) -> Result<u32, ProtocolError>;
    /// Command a traffic-light program to the given phase.
    fn set_phase(&mut self, tls_id: &str, phase: u32) -> Result<(), ProtocolError>;
    /// Elapsed simulated time in seconds.
    fn elapsed_time(&mut self) -> Result<f64, ProtocolError>;
    /// Number of vehicles currently in the simulation.
    fn vehicle_count(&mut self) -> Result<u64, ProtocolError>;
    /// All traffic-light identifiers in the loaded network.
    fn list_traffic_lights(&mut self) -> Result<Vec<String>, ProtocolError>;
    /// All lane-area detector identifiers in the loaded network.
    fn list_detectors(&mut self) -> Result<Vec<String>, ProtocolError>;
    /// Release the session. Must be safe to call repeatedly.
    fn close(&mut self) -> Result<(), ProtocolError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Hello { label: &'a str },
    Advance,
    DetectorCount { id: &'a str },
    CurrentPhase { id: &'a str },
    PhaseCount { id: &'a str },
    SetPhase { id: &'a str, phase: u32 },
    ElapsedTime,
    VehicleCount,
    ListTrafficLights,
    ListDetectors,
    Close,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Response {
    Ok {
        #[serde(default)]
        value: serde_json::Value,
    },
    Err {
        message: String,
    },
}

/// Simulator session over a spawned child process and a TCP control socket.
pub struct ProcessBackend {
    read_timeout: Duration,
    connect_timeout: Duration,
    child: Option<Child>,
    stream: Option<BufReader<TcpStream>>,
}

impl ProcessBackend {
    pub fn new() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            child: None,
            stream: None,
        }
    }

    pub fn with_timeouts(mut self, read: Duration, connect: Duration) -> Self {
        self.read_timeout = read;
        self.connect_timeout = connect;
        self
    }

    fn roundtrip(&mut self, request: &Request<'_>) -> Result<serde_json::Value, ProtocolError> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::SessionClosed)?;

        let mut line = serde_json::to_string(request)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        line.push('\n');
        stream
            .get_mut()
            .write_all(line.as_bytes())
            .map_err(map_io)?;

        let mut reply = String::new();
        let n = stream.read_line(&mut reply).map_err(map_io)?;
        if n == 0 {
            // Peer hung up; drop the dead session.
            self.teardown();
            return Err(ProtocolError::SessionClosed);
        }

        match serde_json::from_str::<Response>(reply.trim_end()) {
            Ok(Response::Ok { value }) => Ok(value),
            Ok(Response::Err { message }) => Err(ProtocolError::Rejected(message)),
            Err(e) => Err(ProtocolError::Malformed(e.to_string())),
        }
    }

    fn connect(&mut self, port: u16) -> Result<TcpStream, ProtocolError> {
        // The child needs a moment to open its control port.
        let deadline = Instant::now() + self.connect_timeout;
        let addr = ("127.0.0.1", port);
        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.read_timeout)).map_err(map_io)?;
                    stream.set_nodelay(true).map_err(map_io)?;
                    return Ok(stream);
                }
                Err(err) => {
                    if Instant::now() >= deadline {
                        return Err(ProtocolError::Handshake(format!(
                            "could not reach simulator on port {port}: {err}"
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.stream = None;
        if let Some(mut child) = self.child.take() {
            // Best effort; the process may already have exited.
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorBackend for ProcessBackend {
    fn start(&mut self, launch: &LaunchConfig, label: &str) -> Result<(), ProtocolError> {
        // Never leave a half-open session behind.
        self.teardown();

        let child = Command::new(&launch.command)
            .args(&launch.args)
            .arg("--remote-port")
            .arg(launch.port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ProtocolError::Io)?;
        self.child = Some(child);

        let stream = match self.connect(launch.port) {
            Ok(s) => s,
            Err(err) => {
                self.teardown();
                return Err(err);
            }
        };
        self.stream = Some(BufReader::new(stream));

        match self.roundtrip(&Request::Hello { label }) {
            Ok(_) => {
                debug!(label, port = launch.port, "simulator session established");
                Ok(())
            }
            Err(err) => {
                self.teardown();
                Err(ProtocolError::Handshake(err.to_string()))
            }
        }
    }

    fn advance(&mut self) -> Result<(), ProtocolError> {
        self.roundtrip(&Request::Advance).map(|_| ())
    }

    fn detector_count(&mut self, detector_id: &str) -> Result<f64, ProtocolError> {
        let value = self.roundtrip(&Request::DetectorCount { id: detector_id })?;
        as_f64(&value)
    }

    fn current_phase(&mut self, tls_id: &str) -> Result<u32, ProtocolError> {
        let value = self.roundtrip(&Request::CurrentPhase { id: tls_id })?;
        as_u32(&value)
    }

    fn phase_count(&mut self, tls_id: &str) -> Result<u32, ProtocolError> {
        let value = self.roundtrip(&Request::PhaseCount { id: tls_id })?;
        as_u32(&value)
    }

    fn set_phase(&mut self, tls_id: &str, phase: u32) -> Result<(), ProtocolError> {
        self.roundtrip(&Request::SetPhase { id: tls_id, phase })
            .map(|_| ())
    }

    fn elapsed_time(&mut self) -> Result<f64, ProtocolError> {
        let value = self.roundtrip(&Request::ElapsedTime)?;
        as_f64(&value)
    }

    fn vehicle_count(&mut self) -> Result<u64, ProtocolError> {
        let value = self.roundtrip(&Request::VehicleCount)?;
        value
            .as_u64()
            .ok_or_else(|| ProtocolError::Malformed(format!("expected integer, got {value}")))
    }

    fn list_traffic_lights(&mut self) -> Result<Vec<String>, ProtocolError> {
        let value = self.roundtrip(&Request::ListTrafficLights)?;
        as_string_list(&value)
    }

    fn list_detectors(&mut self) -> Result<Vec<String>, ProtocolError> {
        let value = self.roundtrip(&Request::ListDetectors)?;
        as_string_list(&value)
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        if self.stream.is_some() {
            // Polite goodbye; errors here don't matter, we tear down anyway.
            let _ = self.roundtrip(&Request::Close);
        }
        self.teardown();
        Ok(())
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn map_io(err: std::io::Error) -> ProtocolError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => ProtocolError::Timeout,
        _ => ProtocolError::Io(err),
    }
}

fn as_f64(value: &serde_json::Value) -> Result<f64, ProtocolError> {
    value
        .as_f64()
        .ok_or_else(|| ProtocolError::Malformed(format!("expected number, got {value}")))
}

fn as_u32(value: &serde_json::Value) -> Result<u32, ProtocolError> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| ProtocolError::Malformed(format!("expected phase index, got {value}")))
}

fn as_string_list(value: &serde_json::Value) -> Result<Vec<String>, ProtocolError> {
    let arr = value
        .as_array()
        .ok_or_else(|| ProtocolError::Malformed(format!("expected id list, got {value}")))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ProtocolError::Malformed(format!("expected id string, got {v}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_serialize_to_tagged_json() {
        let json = serde_json::to_string(&Request::DetectorCount { id: "e2_2" }).unwrap();
        assert_eq!(json, r#"{"op":"detector_count","id":"e2_2"}"#);

        let json = serde_json::to_string(&Request::SetPhase {
            id: "41896158",
            phase: 3,
        })
        .unwrap();
        assert_eq!(json, r#"{"op":"set_phase","id":"41896158","phase":3}"#);
    }

    #[test]
    fn responses_parse_both_arms() {
        let ok: Response = serde_json::from_str(r#"{"status":"ok","value":4.0}"#).unwrap();
        match ok {
            Response::Ok { value } => assert_eq!(value.as_f64(), Some(4.0)),
            Response::Err { .. } => panic!("expected ok"),
        }

        let err: Response =
            serde_json::from_str(r#"{"status":"err","message":"unknown detector"}"#).unwrap();
        match err {
            Response::Err { message } => assert_eq!(message, "unknown detector"),
            Response::Ok { .. } => panic!("expected err"),
        }
    }

    #[test]
    fn calls_without_session_report_closed() {
        let mut backend = ProcessBackend::new();
        assert!(matches!(
            backend.advance(),
            Err(ProtocolError::SessionClosed)
        ));
        // close() with nothing open is a no-op.
        assert!(backend.close().is_ok());
    }
}
