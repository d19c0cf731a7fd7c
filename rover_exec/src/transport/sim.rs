//! # Simulator Transport Adapter
//!
//! Simulated rovers listen on a local IP endpoint and speak the same
//! demand/response protocol as the BLE bridge. The link is local and cheap,
//! so a single connection attempt is made with no retry loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};

use rover_if::{
    endpoint::Endpoint,
    eqpt::{led::LedDems, motor::MotorDems, telem::RawTelemetry, RoverDemand},
    net::{zmq, MonitoredSocket, SocketOptions},
};

use super::{
    request_ack, request_telemetry, ConnectError, ReadError, SendError, TelemetryLink,
    Transport, ZmqTelemetryLink,
};
use crate::params::NetParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Transport adapter for a simulated rover on an IP endpoint.
pub struct SimTransport {
    ctx: zmq::Context,
    endpoint: Endpoint,
    params: NetParams,
    dems_socket: Option<MonitoredSocket>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimTransport {
    /// Create a new, unconnected simulator transport for the given endpoint.
    pub fn new(ctx: &zmq::Context, endpoint: Endpoint, params: &NetParams) -> Self {
        Self {
            ctx: ctx.clone(),
            endpoint,
            params: params.clone(),
            dems_socket: None,
        }
    }

    fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            first_connect_timeout: self.params.sim_connect_timeout_ms as i32,
            connect_timeout: self.params.sim_connect_timeout_ms as i32,
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

    /// Connect one request socket to the simulator and open a session on it.
    fn open_session_socket(&self) -> Result<MonitoredSocket, ConnectError> {
        let zmq_ep = self.endpoint.to_zmq_endpoint();

        let mut socket =
            MonitoredSocket::new(&self.ctx, zmq::REQ, self.socket_options(), &zmq_ep)
                .map_err(ConnectError::SocketError)?;

        let session = RoverDemand::StartSession { rover_code: None };

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
}

impl Transport for SimTransport {
    fn connect(&mut self) -> Result<(), ConnectError> {
        info!("Connecting to {}", self.endpoint);

        let socket = self.open_session_socket()?;
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
        if let Some(mut socket) = self.dems_socket.take() {
            if let Err(e) = request_ack(&mut socket, &RoverDemand::EndSession) {
                warn!("Could not close the simulator session cleanly: {}", e);
            }
        }
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}
