//! # Safety Manager
//!
//! Supervises every motor demand against the latest sensor snapshot. The
//! manager is a finite state machine:
//!
//! ```text
//!   Normal <-> Warning          (risk appears / clears)
//!   Normal  -> EmergencyStopped (critical trigger or explicit stop)
//!   Warning -> EmergencyStopped
//!   EmergencyStopped -> Normal  (explicit manual reset ONLY)
//! ```
//!
//! EmergencyStopped is sticky. While stopped every demand evaluates to the
//! zero demand; no incoming command can clear the state, only [`SafetyMgr::reset`].
//!
//! Processing is a pure function of the demand, the snapshot, and the held
//! state, which is what makes the state machine testable without any I/O.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::Serialize;

// Internal
pub use params::Params;

use crate::sensor_mgr::SensorSnapshot;
use rover_if::eqpt::motor::MotorDems;
use util::{maths::clamp, module::State};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The safety supervision state.
#[derive(Debug, Serialize, Copy, Clone, Eq, PartialEq)]
pub enum SafetyState {
    /// No risk detected, demands pass through (clamped to the speed range).
    Normal,

    /// An obstacle is near. Forward motion is inhibited, reverse and turns
    /// still pass.
    Warning,

    /// A critical trigger fired. All demands evaluate to zero until an
    /// explicit manual reset.
    EmergencyStopped,
}

/// What put the manager into EmergencyStopped.
#[derive(Debug, Serialize, Copy, Clone, Eq, PartialEq)]
pub enum EstopCause {
    /// Obstacle distance under the critical threshold.
    CriticalObstacle,

    /// The rover is upside down.
    Flipped,

    /// Body tilt beyond the configured angle.
    ExcessiveTilt,

    /// Battery below the critical threshold.
    CriticalBattery,

    /// Transport link lost for longer than the configured timeout.
    LinkLost,

    /// Explicit stop demanded by the operator.
    Manual,
}

/// Errors during safety processing. Evaluation itself cannot fail, the type
/// exists to satisfy the module contract.
#[derive(Debug, thiserror::Error)]
pub enum SafetyMgrError {}

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Safety manager module state.
pub struct SafetyMgr {
    params: Params,

    state: SafetyState,

    estop_cause: Option<EstopCause>,

    /// Set by the `--no-safety` flag. Bypasses Warning-level clamping and the
    /// obstacle/link triggers. Flip and critical-battery triggers are tied to
    /// physical danger and are never bypassed.
    bypass: bool,

    /// Timestamp of the first link-down observation of the current outage,
    /// cleared when the link recovers.
    link_lost_since: Option<DateTime<Utc>>,
}

/// Input to one safety evaluation tick.
pub struct InputData {
    /// The demand an interface wants to send.
    pub dems: MotorDems,

    /// The latest sensor snapshot.
    pub snapshot: SensorSnapshot,
}

/// Report of what one evaluation tick did.
#[derive(Debug, Serialize, Copy, Clone, PartialEq)]
pub struct StatusReport {
    /// State after the evaluation.
    pub state: SafetyState,

    /// A wheel speed was clamped into the configured range.
    pub speed_clamped: bool,

    /// Forward motion was zeroed by the Warning state.
    pub forward_inhibited: bool,

    /// Cause of the emergency stop, while stopped.
    pub estop_cause: Option<EstopCause>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SafetyMgr {
    fn default() -> Self {
        Self {
            params: Params::default(),
            state: SafetyState::Normal,
            estop_cause: None,
            bypass: false,
            link_lost_since: None,
        }
    }
}

impl State for SafetyMgr {
    type InitData = Params;
    type InitError = SafetyMgrError;

    type InputData = InputData;
    type OutputData = MotorDems;
    type StatusReport = StatusReport;
    type ProcError = SafetyMgrError;

    /// Initialise the safety manager with its thresholds.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        self.params = init_data;
        self.state = SafetyState::Normal;
        self.estop_cause = None;
        self.link_lost_since = None;

        Ok(())
    }

    /// Evaluate one motor demand against the latest snapshot.
    ///
    /// Returns the effective demand to put on the wire and a report of what
    /// was done to it. While EmergencyStopped the effective demand is always
    /// zero, a demand is never silently passed through.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let mut report = StatusReport {
            state: self.state,
            speed_clamped: false,
            forward_inhibited: false,
            estop_cause: self.estop_cause,
        };

        // Clamp into the speed range before any other rule
        let mut dems = MotorDems {
            left: clamp(&input_data.dems.left, &self.params.min_speed, &self.params.max_speed),
            right: clamp(
                &input_data.dems.right,
                &self.params.min_speed,
                &self.params.max_speed,
            ),
        };
        report.speed_clamped = dems != input_data.dems;

        // Advance the state machine from the snapshot
        self.update_state(&input_data.snapshot);

        // Apply the state to the demand
        match self.state {
            SafetyState::EmergencyStopped => {
                dems = MotorDems::zero();
            }
            SafetyState::Warning if !self.bypass => {
                if dems.has_forward_component() {
                    dems.left = dems.left.min(0.0);
                    dems.right = dems.right.min(0.0);
                    report.forward_inhibited = true;
                }
            }
            _ => (),
        }

        report.state = self.state;
        report.estop_cause = self.estop_cause;

        Ok((dems, report))
    }
}

impl SafetyMgr {
    /// Create a manager with the given thresholds.
    pub fn new(params: Params, bypass: bool) -> Self {
        if bypass {
            warn!("Safety bypass enabled: warning clamps and obstacle/link triggers are off");
        }

        Self {
            params,
            bypass,
            ..Default::default()
        }
    }

    /// The current safety state.
    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// The cause of the current emergency stop, if stopped.
    pub fn estop_cause(&self) -> Option<EstopCause> {
        self.estop_cause
    }

    /// Trigger an emergency stop explicitly.
    ///
    /// Fires regardless of sensor state and of the bypass flag.
    pub fn trigger_emergency_stop(&mut self, cause: EstopCause) {
        if self.state != SafetyState::EmergencyStopped {
            error!("EMERGENCY STOP: {:?}", cause);
            self.state = SafetyState::EmergencyStopped;
            self.estop_cause = Some(cause);
        }
    }

    /// Manually reset the emergency stop.
    ///
    /// This is the only way out of EmergencyStopped. If the triggering risk
    /// is still present the next evaluation will stop again immediately.
    ///
    /// Returns true if the manager was stopped.
    pub fn reset(&mut self) -> bool {
        match self.state {
            SafetyState::EmergencyStopped => {
                warn!("Emergency stop reset (cause was {:?})", self.estop_cause);
                self.state = SafetyState::Normal;
                self.estop_cause = None;
                true
            }
            _ => false,
        }
    }

    /// Advance the state machine from one snapshot.
    fn update_state(&mut self, snapshot: &SensorSnapshot) {
        // Track link outages regardless of state so the duration is right
        // when we next evaluate
        match snapshot.link_ok.value() {
            Some(&false) => {
                let ts = snapshot.link_ok.timestamp().unwrap_or(snapshot.taken_at);
                if self.link_lost_since.is_none() {
                    self.link_lost_since = Some(ts);
                }
            }
            _ => self.link_lost_since = None,
        }

        // EmergencyStopped is sticky, nothing below can clear it
        if self.state == SafetyState::EmergencyStopped {
            return;
        }

        // Triggers tied to physical danger, never bypassed
        if snapshot.is_flipped.value() == Some(&true) {
            self.trigger_emergency_stop(EstopCause::Flipped);
            return;
        }

        if let Some(&tilt) = snapshot.tilt_deg.value() {
            if tilt.abs() > self.params.max_tilt_deg {
                self.trigger_emergency_stop(EstopCause::ExcessiveTilt);
                return;
            }
        }

        if let Some(&battery) = snapshot.battery_percent.value() {
            if battery < self.params.critical_battery_percent {
                self.trigger_emergency_stop(EstopCause::CriticalBattery);
                return;
            }
        }

        // Bypassable triggers
        if !self.bypass {
            if let Some(&dist) = snapshot.ultrasonic_cm.value() {
                if dist < self.params.critical_distance_cm {
                    self.trigger_emergency_stop(EstopCause::CriticalObstacle);
                    return;
                }
            }

            if let (Some(lost_since), Some(false)) =
                (self.link_lost_since, snapshot.link_ok.value().copied())
            {
                let ts = snapshot.link_ok.timestamp().unwrap_or(snapshot.taken_at);
                let outage_s = (ts - lost_since).num_milliseconds() as f64 / 1000.0;
                if outage_s > self.params.link_loss_timeout_s {
                    self.trigger_emergency_stop(EstopCause::LinkLost);
                    return;
                }
            }
        }

        // Warning level
        let near_obstacle = match snapshot.ultrasonic_cm.value() {
            Some(&dist) => dist < self.params.warn_distance_cm,
            None => false,
        };

        self.state = if near_obstacle {
            SafetyState::Warning
        } else {
            SafetyState::Normal
        };
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::sensor_mgr::Reading;
    use chrono::Duration;

    /// A snapshot with the given distance and otherwise healthy readings.
    fn snapshot(distance_cm: Option<f64>) -> SensorSnapshot {
        let now = Utc::now();
        SensorSnapshot {
            taken_at: now,
            ultrasonic_cm: Reading::from_raw(distance_cm, now),
            battery_percent: Reading::from_raw(Some(80.0), now),
            battery_voltage: Reading::from_raw(Some(4.1), now),
            tilt_deg: Reading::from_raw(Some(1.0), now),
            is_flipped: Reading::from_raw(Some(false), now),
            ir_left: Reading::Unavailable,
            ir_right: Reading::Unavailable,
            link_ok: Reading::Valid {
                value: true,
                timestamp: now,
            },
        }
    }

    fn eval(mgr: &mut SafetyMgr, dems: (f64, f64), snap: &SensorSnapshot) -> (MotorDems, StatusReport) {
        mgr.proc(&InputData {
            dems: MotorDems {
                left: dems.0,
                right: dems.1,
            },
            snapshot: snap.clone(),
        })
        .unwrap()
    }

    #[test]
    fn test_out_of_range_demands_are_clamped() {
        let mut mgr = SafetyMgr::new(Params::default(), false);

        let (out, report) = eval(&mut mgr, (120.0, -90.0), &snapshot(Some(100.0)));

        assert_eq!(out.left, 50.0);
        assert_eq!(out.right, -50.0);
        assert!(report.speed_clamped);
        assert_eq!(report.state, SafetyState::Normal);
    }

    #[test]
    fn test_warning_inhibits_forward_only() {
        let mut mgr = SafetyMgr::new(Params::default(), false);

        // 15cm is inside the 20cm warning band but outside the 8cm critical
        let snap = snapshot(Some(15.0));

        let (out, report) = eval(&mut mgr, (20.0, 20.0), &snap);
        assert_eq!(out, MotorDems::zero());
        assert!(report.forward_inhibited);
        assert_eq!(report.state, SafetyState::Warning);

        // Reverse still passes
        let (out, _) = eval(&mut mgr, (-20.0, -20.0), &snap);
        assert_eq!(out.left, -20.0);

        // A mixed turn keeps its reverse component only
        let (out, _) = eval(&mut mgr, (-10.0, 20.0), &snap);
        assert_eq!((out.left, out.right), (-10.0, 0.0));

        // Warning clears when the obstacle does
        let (_, report) = eval(&mut mgr, (20.0, 20.0), &snapshot(Some(60.0)));
        assert_eq!(report.state, SafetyState::Normal);
    }

    #[test]
    fn test_critical_distance_transition_forces_zero() {
        let mut mgr = SafetyMgr::new(Params::default(), false);

        // First poll sees 50cm, all nominal
        let (out, report) = eval(&mut mgr, (20.0, 20.0), &snapshot(Some(50.0)));
        assert_eq!(report.state, SafetyState::Normal);
        assert_eq!(out.left, 20.0);

        // Next poll the distance has collapsed to 5cm (critical is 8cm)
        let (out, report) = eval(&mut mgr, (20.0, 20.0), &snapshot(Some(5.0)));
        assert_eq!(report.state, SafetyState::EmergencyStopped);
        assert_eq!(report.estop_cause, Some(EstopCause::CriticalObstacle));
        assert_eq!(out, MotorDems::zero());
    }

    #[test]
    fn test_emergency_stop_is_sticky_until_reset() {
        let mut mgr = SafetyMgr::new(Params::default(), false);
        mgr.trigger_emergency_stop(EstopCause::Manual);

        // No sequence of demands gets through, even with clear sensors
        let clear = snapshot(Some(100.0));
        for _ in 0..5 {
            let (out, report) = eval(&mut mgr, (30.0, 30.0), &clear);
            assert_eq!(out, MotorDems::zero());
            assert_eq!(report.state, SafetyState::EmergencyStopped);
        }

        // Only the explicit reset clears it
        assert!(mgr.reset());
        let (out, report) = eval(&mut mgr, (30.0, 30.0), &clear);
        assert_eq!(report.state, SafetyState::Normal);
        assert_eq!(out.left, 30.0);
    }

    #[test]
    fn test_flip_and_battery_stop_despite_bypass() {
        // Bypass on: obstacle rules are off
        let mut mgr = SafetyMgr::new(Params::default(), true);

        let (out, report) = eval(&mut mgr, (20.0, 20.0), &snapshot(Some(5.0)));
        assert_eq!(report.state, SafetyState::Normal);
        assert_eq!(out.left, 20.0);

        // But a flip still stops the rover
        let mut flipped = snapshot(Some(100.0));
        flipped.is_flipped = Reading::Valid {
            value: true,
            timestamp: Utc::now(),
        };
        let (out, report) = eval(&mut mgr, (20.0, 20.0), &flipped);
        assert_eq!(report.state, SafetyState::EmergencyStopped);
        assert_eq!(report.estop_cause, Some(EstopCause::Flipped));
        assert_eq!(out, MotorDems::zero());

        // And so does a critically low battery
        let mut mgr = SafetyMgr::new(Params::default(), true);
        let mut low_batt = snapshot(Some(100.0));
        low_batt.battery_percent = Reading::Valid {
            value: 5.0,
            timestamp: Utc::now(),
        };
        let (_, report) = eval(&mut mgr, (20.0, 20.0), &low_batt);
        assert_eq!(report.estop_cause, Some(EstopCause::CriticalBattery));
    }

    #[test]
    fn test_link_loss_times_out_into_estop() {
        let mut mgr = SafetyMgr::new(Params::default(), false);

        let t0 = Utc::now();
        let mut snap = snapshot(Some(100.0));
        snap.link_ok = Reading::Valid {
            value: false,
            timestamp: t0,
        };

        // First observation of the outage, within the timeout
        let (_, report) = eval(&mut mgr, (10.0, 10.0), &snap);
        assert_eq!(report.state, SafetyState::Normal);

        // Six seconds later (timeout is five) the stop fires
        snap.link_ok = Reading::Valid {
            value: false,
            timestamp: t0 + Duration::seconds(6),
        };
        let (out, report) = eval(&mut mgr, (10.0, 10.0), &snap);
        assert_eq!(report.state, SafetyState::EmergencyStopped);
        assert_eq!(report.estop_cause, Some(EstopCause::LinkLost));
        assert_eq!(out, MotorDems::zero());
    }

    #[test]
    fn test_unavailable_distance_does_not_trigger() {
        let mut mgr = SafetyMgr::new(Params::default(), false);

        // An unavailable reading is not a zero reading
        let (out, report) = eval(&mut mgr, (20.0, 20.0), &snapshot(None));
        assert_eq!(report.state, SafetyState::Normal);
        assert_eq!(out.left, 20.0);
    }
}
