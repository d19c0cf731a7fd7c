//! # Mock Transport
//!
//! A scriptable transport double for the unit suites. State lives behind an
//! `Arc` so tests keep a handle after the transport has been boxed into a
//! controller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use rover_if::{
    endpoint::Endpoint,
    eqpt::{led::LedDems, motor::MotorDems, telem::RawTelemetry},
    net::zmq,
};

use super::{ConnectError, ReadError, SendError, TelemetryLink, Transport};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Shared, inspectable state of a [`MockTransport`].
pub struct MockState {
    pub connected: AtomicBool,
    pub connect_failures_remaining: AtomicUsize,
    pub fail_sends: AtomicBool,
    pub fail_reads: AtomicBool,
    pub disconnects: AtomicUsize,
    pub sent_motors: Mutex<Vec<MotorDems>>,
    pub sent_leds: Mutex<Vec<LedDems>>,
    pub telemetry: Mutex<RawTelemetry>,
}

/// A scriptable [`Transport`] double.
pub struct MockTransport {
    endpoint: Endpoint,
    pub state: Arc<MockState>,
}

/// The telemetry half of a [`MockTransport`].
pub struct MockTelemetryLink {
    state: Arc<MockState>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MockState {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(false),
            connect_failures_remaining: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            sent_motors: Mutex::new(Vec::new()),
            sent_leds: Mutex::new(Vec::new()),
            telemetry: Mutex::new(RawTelemetry::empty_now()),
        }
    }
}

impl MockState {
    /// Replace the telemetry frame served to reads.
    pub fn set_telemetry(&self, telem: RawTelemetry) {
        *self.telemetry.lock().unwrap() = telem;
    }

    /// The motor demands seen at the transport boundary, in order.
    pub fn motor_history(&self) -> Vec<MotorDems> {
        self.sent_motors.lock().unwrap().clone()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            endpoint: Endpoint::Tcp {
                host: "mock".into(),
                port: 0,
            },
            state: Arc::new(MockState::default()),
        }
    }

    /// A mock whose first `n` connect calls fail.
    pub fn failing_connects(n: usize) -> Self {
        let t = Self::new();
        t.state.connect_failures_remaining.store(n, Ordering::Relaxed);
        t
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), ConnectError> {
        let remaining = self.state.connect_failures_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.state
                .connect_failures_remaining
                .store(remaining - 1, Ordering::Relaxed);
            return Err(ConnectError::RetriesExhausted("mock".into(), 1));
        }

        self.state.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn send_motors(&mut self, dems: &MotorDems) -> Result<(), SendError> {
        if !self.state.connected.load(Ordering::Relaxed) {
            return Err(SendError::NotConnected);
        }
        if self.state.fail_sends.load(Ordering::Relaxed) {
            return Err(SendError::SocketSend(zmq::Error::EAGAIN));
        }

        self.state.sent_motors.lock().unwrap().push(*dems);
        Ok(())
    }

    fn send_led(&mut self, dems: &LedDems) -> Result<(), SendError> {
        if !self.state.connected.load(Ordering::Relaxed) {
            return Err(SendError::NotConnected);
        }
        if self.state.fail_sends.load(Ordering::Relaxed) {
            return Err(SendError::SocketSend(zmq::Error::EAGAIN));
        }

        self.state.sent_leds.lock().unwrap().push(*dems);
        Ok(())
    }

    fn read_raw(&mut self) -> Result<RawTelemetry, ReadError> {
        if self.state.fail_reads.load(Ordering::Relaxed) {
            return Err(ReadError::SocketRecv(zmq::Error::EAGAIN));
        }

        Ok(self.state.telemetry.lock().unwrap().clone())
    }

    fn open_telemetry_link(&mut self) -> Result<Box<dyn TelemetryLink>, ConnectError> {
        Ok(Box::new(MockTelemetryLink {
            state: self.state.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Relaxed)
    }

    fn disconnect(&mut self) {
        self.state.connected.store(false, Ordering::Relaxed);
        self.state.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl TelemetryLink for MockTelemetryLink {
    fn read_raw(&mut self) -> Result<RawTelemetry, ReadError> {
        if self.state.fail_reads.load(Ordering::Relaxed) {
            return Err(ReadError::SocketRecv(zmq::Error::EAGAIN));
        }

        Ok(self.state.telemetry.lock().unwrap().clone())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Relaxed)
    }
}
