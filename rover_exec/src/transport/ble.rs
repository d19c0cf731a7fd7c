//! # BLE Transport Adapter
//!
//! Physical rovers are reached over Bluetooth LE through the platform's
//! bridge daemon, addressed by the pairing code shown on the rover's screen.
//! BLE links take time to come up and drop more readily than local TCP, so
//! this adapter retries its connection with backoff and supervises the link
//! with heartbeats.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rover_if::{
    endpoint::Endpoint,
    eqpt::{led::LedDems, motor::MotorDems, telem::RawTelemetry, RoverDemand},
    net::{zmq, MonitoredSocket, SocketOptions},
};

use super::{
    request_ack, request_telemetry, retry_connect, ConnectError, ReadError, RetryPolicy,
    SendError, TelemetryLink, Transport, ZmqTelemetryLink,
};
use crate::params::NetParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Transport adapter for a physical rover behind the BLE bridge.
pub struct BleTransport {
    ctx: zmq::Context,
    endpoint: Endpoint,
    params: NetParams,
    dems_socket: Option<MonitoredSocket>,
    cancel: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BleTransport {
    /// Create a new, unconnected BLE transport for the given endpoint.
    pub fn new(ctx: &zmq::Context, endpoint: Endpoint, params: &NetParams) -> Self {
        Self {
            ctx: ctx.clone(),
            endpoint,
            params: params.clone(),
            dems_socket: None,
            cancel: AtomicBool::new(false),
        }
    }

    fn rover_code(&self) -> Option<u16> {
        match self.endpoint {
            Endpoint::BleBridge { rover_code } => Some(rover_code),
            _ => None,
        }
    }

    fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            first_connect_timeout: self.params.ble_connect_timeout_ms as i32,
            connect_timeout: self.params.ble_connect_timeout_ms as i32,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: self.params.request_timeout_ms as i32,
            send_timeout: self.params.request_timeout_ms as i32,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        }
    }

    /// Connect one request socket to the bridge and open a rover session on
    /// it. A single attempt; the retry loop lives in `connect`.
    fn open_session_socket(&self) -> Result<MonitoredSocket, ConnectError> {
        let zmq_ep = self.endpoint.to_zmq_endpoint();

        let mut socket =
            MonitoredSocket::new(&self.ctx, zmq::REQ, self.socket_options(), &zmq_ep)
                .map_err(ConnectError::SocketError)?;

        // The bridge needs the pairing code to know which rover this session
        // drives
        let session = RoverDemand::StartSession {
            rover_code: self.rover_code(),
        };

        match request_ack(&mut socket, &session) {
            Ok(()) => Ok(socket),
            Err(SendError::SerializationError(e)) => Err(ConnectError::SerializationError(e)),
            Err(SendError::SocketRecv(e)) | Err(SendError::SocketSend(e)) => {
                Err(ConnectError::NoSessionResponse(e))
            }
            Err(SendError::DemandRejected(r)) => Err(ConnectError::SessionRejected(r)),
            Err(SendError::NotConnected) => {
                Err(ConnectError::RetriesExhausted(self.endpoint.to_string(), 0))
            }
            Err(SendError::DeserializeError(e)) => Err(ConnectError::SerializationError(e)),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.params.ble_connect_attempts,
            backoff: Duration::from_millis(self.params.ble_connect_backoff_ms),
        }
    }
}

impl Transport for BleTransport {
    fn connect(&mut self) -> Result<(), ConnectError> {
        self.cancel.store(false, Ordering::Relaxed);

        info!("Connecting to {}", self.endpoint);

        // The whole connect-and-handshake exchange is retried, a bridge that
        // accepts the socket but rejects the session is as failed as one that
        // never answered
        let policy = self.retry_policy();
        let socket = {
            let this = &*self;
            retry_connect(&policy, &this.cancel, || this.open_session_socket())?
        };
        self.dems_socket = Some(socket);

        info!("Connected to {}", self.endpoint);
        Ok(())
    }

    fn send_motors(&mut self, dems: &MotorDems) -> Result<(), SendError> {
        match self.dems_socket {
            Some(ref mut s) => request_ack(s, &RoverDemand::Motors(*dems)),
            None => Err(SendError::NotConnected),
        }
    }

    fn send_led(&mut self, dems: &LedDems) -> Result<(), SendError> {
        match self.dems_socket {
            Some(ref mut s) => request_ack(s, &RoverDemand::Leds(*dems)),
            None => Err(SendError::NotConnected),
        }
    }

    fn read_raw(&mut self) -> Result<RawTelemetry, ReadError> {
        match self.dems_socket {
            Some(ref mut s) => request_telemetry(s),
            None => Err(ReadError::NotConnected),
        }
    }

    fn open_telemetry_link(&mut self) -> Result<Box<dyn TelemetryLink>, ConnectError> {
        // The bridge is already up by this point, a single attempt is enough
        let socket = self.open_session_socket()?;
        Ok(Box::new(ZmqTelemetryLink::new(socket)))
    }

    fn is_connected(&self) -> bool {
        match self.dems_socket {
            Some(ref s) => s.connected(),
            None => false,
        }
    }

    fn disconnect(&mut self) {
        // Interrupt any in-progress connect wait
        self.cancel.store(true, Ordering::Relaxed);

        if let Some(mut socket) = self.dems_socket.take() {
            // Closing the session stops the rover on the bridge side as well,
            // failure here only means the link is already gone
            if let Err(e) = request_ack(&mut socket, &RoverDemand::EndSession) {
                warn!("Could not close the rover session cleanly: {}", e);
            }
        }
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}
