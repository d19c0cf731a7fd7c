//! # Rover Transport Adapters
//!
//! A transport adapter owns the link to one rover endpoint: it delivers motor
//! and LED demands and reads raw telemetry. Two variants exist, selected by
//! the [`ConnectionTarget`] given to the controller factory:
//!
//! - [`ble::BleTransport`]: a physical rover reached through the local BLE
//!   bridge daemon. Connection attempts are retried with backoff.
//! - [`sim::SimTransport`]: a simulated rover on a local IP endpoint. A single
//!   connection attempt, no retries.
//!
//! Both speak the same demand/response protocol from `rover_if::eqpt`, which
//! is what makes "test in simulator, deploy to hardware" workflows possible:
//! nothing above this layer can tell the variants apart.
//!
//! Every call reports failure per-call. An adapter never enters an
//! unrecoverable state because one send or read failed; the owning controller
//! decides whether to escalate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod ble;
pub mod sim;

#[cfg(test)]
pub mod mock;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rover_if::{
    endpoint::{ConnectionTarget, Endpoint},
    eqpt::{led::LedDems, motor::MotorDems, telem::RawTelemetry, RoverDemand, RoverResponse},
    net::{zmq, MonitoredSocket, MonitoredSocketError},
};

use crate::params::NetParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The contract every rover transport variant provides.
pub trait Transport: Send {
    /// Open the link to the rover endpoint.
    ///
    /// For the BLE variant this performs the bounded retry/backoff sequence,
    /// for the simulator a single attempt. On success a session is
    /// established and demands may be sent.
    fn connect(&mut self) -> Result<(), ConnectError>;

    /// Send motor speed demands to the rover.
    fn send_motors(&mut self, dems: &MotorDems) -> Result<(), SendError>;

    /// Send an LED demand to the rover.
    fn send_led(&mut self, dems: &LedDems) -> Result<(), SendError>;

    /// Read one raw telemetry frame from the rover.
    fn read_raw(&mut self) -> Result<RawTelemetry, ReadError>;

    /// Open a second, independent link for telemetry polling.
    ///
    /// The sensor manager polls on its own thread; giving it its own link
    /// keeps telemetry reads from interleaving with demand traffic on one
    /// request socket.
    fn open_telemetry_link(&mut self) -> Result<Box<dyn TelemetryLink>, ConnectError>;

    /// True if the underlying link currently reports connected.
    fn is_connected(&self) -> bool;

    /// Close the link. Safe to call when not connected.
    fn disconnect(&mut self);

    /// The endpoint this adapter was built for.
    fn endpoint(&self) -> &Endpoint;
}

/// A telemetry-only link handed to the sensor manager's poll thread.
pub trait TelemetryLink: Send {
    /// Read one raw telemetry frame from the rover.
    fn read_raw(&mut self) -> Result<RawTelemetry, ReadError>;

    /// True if the underlying link currently reports connected.
    fn is_connected(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised while establishing a connection to a rover endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not connect to {0} after {1} attempts")]
    RetriesExhausted(String, u32),

    #[error("Connection attempt cancelled by shutdown")]
    Cancelled,

    #[error("The endpoint rejected the session request: {0:?}")]
    SessionRejected(RoverResponse),

    #[error("Could not serialize the session request: {0}")]
    SerializationError(serde_json::Error),

    #[error("No response to the session request: {0}")]
    NoSessionResponse(zmq::Error),
}

/// Errors raised while delivering a demand.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("The transport is not connected")]
    NotConnected,

    #[error("Could not send the demand: {0}")]
    SocketSend(zmq::Error),

    #[error("Could not receive the demand acknowledgement: {0}")]
    SocketRecv(zmq::Error),

    #[error("Could not serialize the demand: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The endpoint rejected the demand: {0:?}")]
    DemandRejected(RoverResponse),
}

/// Errors raised while reading telemetry.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("The transport is not connected")]
    NotConnected,

    #[error("Could not send the telemetry request: {0}")]
    SocketSend(zmq::Error),

    #[error("Could not receive the telemetry frame: {0}")]
    SocketRecv(zmq::Error),

    #[error("Could not serialize the telemetry request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the telemetry frame: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The endpoint answered the telemetry request with {0:?}")]
    UnexpectedResponse(RoverResponse),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Bounded retry behaviour for connecting to an endpoint.
///
/// Each retry waits one `backoff` step longer than the previous one, up to
/// `attempts` total attempts. One attempt with zero backoff is a plain single
/// connect.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of connection attempts to make, including the first.
    pub attempts: u32,

    /// Backoff step added between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_millis(0),
        }
    }
}

/// A [`TelemetryLink`] over a dedicated request socket.
///
/// Both adapter variants hand one of these to the sensor manager.
pub(crate) struct ZmqTelemetryLink {
    socket: MonitoredSocket,
}

impl ZmqTelemetryLink {
    pub(crate) fn new(socket: MonitoredSocket) -> Self {
        Self { socket }
    }
}

impl TelemetryLink for ZmqTelemetryLink {
    fn read_raw(&mut self) -> Result<RawTelemetry, ReadError> {
        request_telemetry(&mut self.socket)
    }

    fn is_connected(&self) -> bool {
        self.socket.connected()
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the transport adapter variant for the given target.
///
/// This is the only place the two variants are distinguished; the returned
/// trait object is all the rest of the software sees.
pub fn from_target(
    ctx: &zmq::Context,
    target: ConnectionTarget,
    endpoint: Endpoint,
    net_params: &NetParams,
) -> Box<dyn Transport> {
    match target {
        ConnectionTarget::Physical => {
            Box::new(ble::BleTransport::new(ctx, endpoint, net_params))
        }
        ConnectionTarget::Simulator => {
            Box::new(sim::SimTransport::new(ctx, endpoint, net_params))
        }
    }
}

/// Run a connection attempt under the given retry policy.
///
/// Retries use linear backoff: the wait before retry `n` is `n *
/// policy.backoff`, slept in short slices with the `cancel` flag checked
/// between them, so a shutdown request interrupts the wait rather than
/// blocking until the policy is exhausted.
pub fn retry_connect<T>(
    policy: &RetryPolicy,
    cancel: &AtomicBool,
    mut attempt: impl FnMut() -> Result<T, ConnectError>,
) -> Result<T, ConnectError> {
    let mut last_err = ConnectError::Cancelled;

    for n in 0..policy.attempts {
        if cancel.load(Ordering::Relaxed) {
            return Err(ConnectError::Cancelled);
        }

        // Back off before each retry, in cancellable slices
        if n > 0 {
            let backoff = policy.backoff * n;
            debug!("Retrying connection ({}/{}) in {:?}", n + 1, policy.attempts, backoff);

            let mut remaining = backoff;
            let slice = Duration::from_millis(100);
            while remaining > Duration::from_millis(0) {
                if cancel.load(Ordering::Relaxed) {
                    return Err(ConnectError::Cancelled);
                }
                let step = remaining.min(slice);
                thread::sleep(step);
                remaining -= step;
            }
        }

        match attempt() {
            Ok(t) => return Ok(t),
            Err(ConnectError::Cancelled) => return Err(ConnectError::Cancelled),
            Err(e) => {
                debug!("Connection attempt {} failed: {}", n + 1, e);
                last_err = e;
            }
        }
    }

    Err(last_err)
}

// ------------------------------------------------------------------------------------------------
// CRATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Exchange one demand for its response over a request socket.
///
/// Shared by both adapter variants so their wire behaviour cannot drift
/// apart.
pub(crate) fn request(
    socket: &mut MonitoredSocket,
    demand: &RoverDemand,
) -> Result<RoverResponse, SendError> {
    if !socket.connected() {
        return Err(SendError::NotConnected);
    }

    let demand_str = serde_json::to_string(demand).map_err(SendError::SerializationError)?;

    socket
        .send(&demand_str, 0)
        .map_err(SendError::SocketSend)?;

    let msg = socket.recv_msg(0).map_err(SendError::SocketRecv)?;

    serde_json::from_str(msg.as_str().unwrap_or("")).map_err(SendError::DeserializeError)
}

/// Send a demand expecting a plain acknowledgement.
pub(crate) fn request_ack(
    socket: &mut MonitoredSocket,
    demand: &RoverDemand,
) -> Result<(), SendError> {
    match request(socket, demand)? {
        RoverResponse::DemsOk => Ok(()),
        r => Err(SendError::DemandRejected(r)),
    }
}

/// Send a telemetry read demand expecting a telemetry frame back.
pub(crate) fn request_telemetry(socket: &mut MonitoredSocket) -> Result<RawTelemetry, ReadError> {
    match request(socket, &RoverDemand::ReadTelemetry) {
        Ok(RoverResponse::Telemetry(t)) => Ok(t),
        Ok(r) => Err(ReadError::UnexpectedResponse(r)),
        Err(SendError::NotConnected) => Err(ReadError::NotConnected),
        Err(SendError::SocketSend(e)) => Err(ReadError::SocketSend(e)),
        Err(SendError::SocketRecv(e)) => Err(ReadError::SocketRecv(e)),
        Err(SendError::SerializationError(e)) => Err(ReadError::SerializationError(e)),
        Err(SendError::DeserializeError(e)) => Err(ReadError::DeserializeError(e)),
        Err(SendError::DemandRejected(r)) => Err(ReadError::UnexpectedResponse(r)),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// An attempt closure that fails `failures` times before succeeding.
    fn flaky(failures: u32) -> impl FnMut() -> Result<u32, ConnectError> {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls <= failures {
                Err(ConnectError::RetriesExhausted("test".into(), 1))
            } else {
                Ok(calls)
            }
        }
    }

    #[test]
    fn test_retry_within_budget_succeeds() {
        // Two failures then success, with a three attempt budget
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        };
        let cancel = AtomicBool::new(false);

        let result = retry_connect(&policy, &cancel, flaky(2));
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_budget_exhausted_fails() {
        // Needing a fourth attempt with a three attempt budget is an error
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        };
        let cancel = AtomicBool::new(false);

        let result = retry_connect(&policy, &cancel, flaky(3));
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_cancelled_before_first_attempt() {
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        };
        let cancel = AtomicBool::new(true);

        match retry_connect(&policy, &cancel, flaky(0)) {
            Err(ConnectError::Cancelled) => (),
            r => panic!("expected cancellation, got {:?}", r.map(|_| ())),
        }
    }
}
