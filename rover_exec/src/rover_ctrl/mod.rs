//! # Rover Controller
//!
//! The long-lived aggregate every interface mode drives through. A controller
//! owns one transport adapter, one sensor manager, and one safety manager;
//! the target (physical or simulator) is chosen once at construction and the
//! two realisations differ only in their transport, never in safety or
//! command semantics.
//!
//! Demand flow: interface -> [`RoverController::drive`] -> safety manager ->
//! transport. Telemetry flows the other way through the sensor manager's
//! cache. `drive` takes `&mut self`, so demands are serialised per controller
//! and a stale demand can never overtake a newer one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use crate::params::RoverExecParams;
use crate::record::SessionRecorder;
use crate::safety_mgr::{EstopCause, InputData, SafetyMgr, SafetyState};
use crate::sensor_mgr::{PollError, SensorMgr, SensorSnapshot};
use crate::transport::{self, ConnectError, SendError, Transport};
use rover_if::{
    endpoint::{ConnectionTarget, Endpoint, EndpointParseError},
    eqpt::{led::LedDems, motor::MotorDems},
    net::zmq,
};
use util::module::State;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// The controller aggregate.
pub struct RoverController {
    target: ConnectionTarget,

    transport: Box<dyn Transport>,

    /// Present while the controller is live, taken on shutdown.
    sensor_mgr: Option<SensorMgr>,

    safety_mgr: SafetyMgr,

    recorder: Option<SessionRecorder>,

    shut_down: bool,
}

/// A point-in-time view of the controller for status displays.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub target: ConnectionTarget,
    pub safety_state: SafetyState,
    pub estop_cause: Option<EstopCause>,
    pub snapshot: SensorSnapshot,
    pub connected: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised while constructing a controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerInitError {
    #[error("Invalid rover address: {0}")]
    BadAddress(EndpointParseError),

    #[error("Could not connect to the rover: {0}")]
    Connect(ConnectError),
}

/// Errors raised while delivering a drive demand.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Drive demand delivery failed: {0}")]
    SendFailed(SendError),
}

/// Errors raised while delivering an LED demand. Callers treat these as
/// best-effort, they are logged and never fatal.
#[derive(Debug, thiserror::Error)]
pub enum LedError {
    #[error("LED demand delivery failed: {0}")]
    SendFailed(SendError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RoverController {
    /// Build and connect a controller for the given target.
    ///
    /// This is the selection factory: the target picks the transport adapter
    /// variant (with its addressing scheme and connect/retry behaviour), and
    /// nothing else differs between a physical and a simulated controller.
    pub fn new(
        ctx: &zmq::Context,
        target: ConnectionTarget,
        address: &str,
        params: &RoverExecParams,
        bypass_safety: bool,
    ) -> Result<Self, ControllerInitError> {
        let endpoint = target
            .parse_address(address)
            .map_err(ControllerInitError::BadAddress)?;

        let transport = transport::from_target(ctx, target, endpoint, &params.net);

        Self::from_transport(target, transport, params, bypass_safety)
    }

    /// Build and connect a controller over an already-constructed transport.
    ///
    /// Shared by the factory and the test suites.
    pub fn from_transport(
        target: ConnectionTarget,
        mut transport: Box<dyn Transport>,
        params: &RoverExecParams,
        bypass_safety: bool,
    ) -> Result<Self, ControllerInitError> {
        transport.connect().map_err(ControllerInitError::Connect)?;

        let link = transport
            .open_telemetry_link()
            .map_err(ControllerInitError::Connect)?;
        let sensor_mgr = SensorMgr::start(link, params.sensors.clone());

        let safety_mgr = SafetyMgr::new(params.safety.clone(), bypass_safety);

        info!("Rover controller up against {}", transport.endpoint());

        Ok(Self {
            target,
            transport,
            sensor_mgr: Some(sensor_mgr),
            safety_mgr,
            recorder: None,
            shut_down: false,
        })
    }

    /// Attach a session recorder. Subsequent drives and status polls are
    /// archived.
    pub fn set_recorder(&mut self, recorder: SessionRecorder) {
        self.recorder = Some(recorder);
    }

    /// The target this controller was built for.
    pub fn target(&self) -> ConnectionTarget {
        self.target
    }

    /// The endpoint this controller is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    /// The current safety state.
    pub fn safety_state(&self) -> SafetyState {
        self.safety_mgr.state()
    }

    /// Drive the rover.
    ///
    /// The demand is evaluated by the safety manager against the latest
    /// snapshot; the effective demand (possibly clamped, inhibited, or
    /// zeroed) is what goes on the wire. Delivery failures are surfaced
    /// immediately and are NOT retried: motion intent goes stale fast, and
    /// blindly replaying it is how rovers end up in walls.
    pub fn drive(&mut self, dems: MotorDems) -> Result<(), DriveError> {
        let snapshot = self.latest_snapshot();

        let (effective, report) = match self.safety_mgr.proc(&InputData { dems, snapshot }) {
            Ok(t) => t,
            Err(e) => match e {},
        };

        if let Some(ref mut rec) = self.recorder {
            rec.record_drive(&dems, &effective, &report);
        }

        self.transport
            .send_motors(&effective)
            .map_err(DriveError::SendFailed)
    }

    /// Set the rover's LEDs. Best-effort: callers log failures and move on.
    pub fn set_led(&mut self, dems: LedDems) -> Result<(), LedError> {
        self.transport
            .send_led(&dems)
            .map_err(LedError::SendFailed)
    }

    /// Send the zero demand unconditionally.
    ///
    /// Bypasses the safety manager's clamping logic entirely: stop must
    /// always be deliverable, whatever state the supervision is in.
    pub fn stop(&mut self) -> Result<(), DriveError> {
        self.transport
            .send_motors(&MotorDems::zero())
            .map_err(DriveError::SendFailed)
    }

    /// Trigger an emergency stop.
    ///
    /// Latches the safety manager into EmergencyStopped and puts a stop on
    /// the wire immediately.
    pub fn trigger_emergency_stop(&mut self, cause: EstopCause) {
        self.safety_mgr.trigger_emergency_stop(cause);

        if let Err(e) = self.stop() {
            warn!("Could not deliver the emergency stop demand: {}", e);
        }
    }

    /// Manually reset the emergency stop. Returns true if the controller was
    /// stopped.
    pub fn reset_emergency_stop(&mut self) -> bool {
        self.safety_mgr.reset()
    }

    /// The controller's current status: safety state, latest snapshot, and
    /// connection health.
    pub fn status(&mut self) -> ControllerStatus {
        let snapshot = self.latest_snapshot();

        if let Some(ref mut rec) = self.recorder {
            rec.record_snapshot(&snapshot);
        }

        ControllerStatus {
            target: self.target,
            safety_state: self.safety_mgr.state(),
            estop_cause: self.safety_mgr.estop_cause(),
            snapshot,
            connected: self.transport.is_connected(),
        }
    }

    /// Force an immediate sensor poll and return the fresh snapshot.
    pub fn force_refresh(&mut self) -> Result<SensorSnapshot, PollError> {
        match self.sensor_mgr {
            Some(ref mgr) => mgr.force_refresh(),
            None => Err(PollError::NotRunning),
        }
    }

    /// Shut the controller down: stop the rover, stop the sensor poll,
    /// disconnect.
    ///
    /// Idempotent: calling it again (or letting `Drop` call it after an
    /// explicit shutdown) does nothing. Every exit path of the executable
    /// funnels through here, one way or the other.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        info!("Shutting down rover controller");

        if let Err(e) = self.stop() {
            warn!("Could not deliver the shutdown stop demand: {}", e);
        }

        if let Some(mut mgr) = self.sensor_mgr.take() {
            mgr.stop();
        }

        self.transport.disconnect();

        info!("Rover controller shut down");
    }

    /// The latest snapshot, or an all-unavailable one after shutdown.
    fn latest_snapshot(&self) -> SensorSnapshot {
        match self.sensor_mgr {
            Some(ref mgr) => mgr.latest(),
            None => SensorSnapshot::unavailable(chrono::Utc::now()),
        }
    }
}

impl Drop for RoverController {
    /// Backstop for exit paths that did not call [`RoverController::shutdown`]
    /// explicitly.
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sensor_mgr;
    use crate::transport::mock::MockTransport;
    use rover_if::eqpt::telem::RawTelemetry;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn test_params() -> RoverExecParams {
        RoverExecParams {
            sensors: sensor_mgr::Params {
                poll_rate_hz: 50.0,
                max_age_s: 30.0,
            },
            ..RoverExecParams::default()
        }
    }

    fn telem(distance_cm: f64) -> RawTelemetry {
        RawTelemetry {
            ultrasonic_cm: Some(distance_cm),
            battery_percent: Some(80.0),
            tilt_deg: Some(0.0),
            is_flipped: Some(false),
            ..RawTelemetry::empty_now()
        }
    }

    fn controller_with_mock(
        target: ConnectionTarget,
    ) -> (RoverController, Arc<crate::transport::mock::MockState>) {
        let transport = MockTransport::new();
        transport.state.set_telemetry(telem(100.0));
        let state = transport.state.clone();

        let ctrl =
            RoverController::from_transport(target, Box::new(transport), &test_params(), false)
                .unwrap();

        (ctrl, state)
    }

    #[test]
    fn test_estop_zeros_commands_at_transport_boundary() {
        let (mut ctrl, state) = controller_with_mock(ConnectionTarget::Simulator);

        // Critical obstacle appears
        state.set_telemetry(telem(5.0));
        ctrl.force_refresh().unwrap();

        // Every subsequent drive lands as zero on the wire
        ctrl.drive(MotorDems {
            left: 20.0,
            right: 20.0,
        })
        .unwrap();
        ctrl.drive(MotorDems {
            left: 50.0,
            right: -50.0,
        })
        .unwrap();

        let history = state.motor_history();
        assert!(history.len() >= 2);
        assert!(history.iter().all(|d| d.is_zero()));
        assert_eq!(ctrl.safety_state(), SafetyState::EmergencyStopped);

        // Reset with the obstacle cleared and demands flow again
        state.set_telemetry(telem(100.0));
        ctrl.force_refresh().unwrap();
        assert!(ctrl.reset_emergency_stop());

        ctrl.drive(MotorDems {
            left: 20.0,
            right: 20.0,
        })
        .unwrap();
        assert_eq!(state.motor_history().last().unwrap().left, 20.0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut ctrl, state) = controller_with_mock(ConnectionTarget::Simulator);

        ctrl.shutdown();
        ctrl.shutdown();
        drop(ctrl);

        // Exactly one stop-then-disconnect sequence
        assert_eq!(state.disconnects.load(Ordering::Relaxed), 1);
        let history = state.motor_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_zero());
    }

    #[test]
    fn test_drive_failure_is_surfaced_not_retried() {
        let (mut ctrl, state) = controller_with_mock(ConnectionTarget::Simulator);

        state.fail_sends.store(true, Ordering::Relaxed);

        let result = ctrl.drive(MotorDems {
            left: 10.0,
            right: 10.0,
        });
        assert!(result.is_err());

        // Nothing was recorded at the boundary and nothing was replayed
        state.fail_sends.store(false, Ordering::Relaxed);
        assert!(state.motor_history().is_empty());
    }

    #[test]
    fn test_dual_target_parity() {
        // The same demand script against both realisations must produce
        // identical safety decisions at the transport boundary
        let script: Vec<(f64, MotorDems)> = vec![
            (
                100.0,
                MotorDems {
                    left: 120.0,
                    right: 30.0,
                },
            ),
            (
                15.0,
                MotorDems {
                    left: 30.0,
                    right: 30.0,
                },
            ),
            (
                15.0,
                MotorDems {
                    left: -20.0,
                    right: -20.0,
                },
            ),
            (
                5.0,
                MotorDems {
                    left: 20.0,
                    right: 20.0,
                },
            ),
            (
                100.0,
                MotorDems {
                    left: 40.0,
                    right: 40.0,
                },
            ),
        ];

        let mut histories = Vec::new();
        for target in [ConnectionTarget::Physical, ConnectionTarget::Simulator].iter() {
            let (mut ctrl, state) = controller_with_mock(*target);

            for (distance, dems) in script.iter() {
                state.set_telemetry(telem(*distance));
                ctrl.force_refresh().unwrap();
                ctrl.drive(*dems).unwrap();
            }

            histories.push(state.motor_history());
            ctrl.shutdown();
        }

        assert_eq!(histories[0], histories[1]);
    }

    #[test]
    fn test_connect_failure_surfaces_from_factory() {
        let transport = MockTransport::failing_connects(1);

        let result = RoverController::from_transport(
            ConnectionTarget::Simulator,
            Box::new(transport),
            &test_params(),
            false,
        );

        assert!(matches!(result, Err(ControllerInitError::Connect(_))));
    }

    #[test]
    fn test_explicit_estop_sends_immediate_stop() {
        let (mut ctrl, state) = controller_with_mock(ConnectionTarget::Simulator);

        ctrl.trigger_emergency_stop(EstopCause::Manual);

        let history = state.motor_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_zero());
        assert_eq!(ctrl.safety_state(), SafetyState::EmergencyStopped);
    }
}
