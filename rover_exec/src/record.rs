//! # Session recording
//!
//! With `--record-session <name>` every issued drive demand and every status
//! snapshot is archived as timestamped CSV under the session directory, for
//! later gesture-model evaluation. Recording is strictly an observer: a
//! failed write is logged and dropped, it never interferes with driving.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::Serialize;

// Internal
use crate::safety_mgr::{EstopCause, SafetyState, StatusReport};
use crate::sensor_mgr::SensorSnapshot;
use rover_if::eqpt::motor::MotorDems;
use util::archive::Archiver;
use util::session::{get_elapsed_seconds, Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Archives drive demands and sensor snapshots for one recorded session.
pub struct SessionRecorder {
    name: String,

    arch_drives: Archiver,
    arch_snapshots: Archiver,
}

/// One archived drive demand, before and after safety evaluation.
#[derive(Serialize)]
struct DriveRecord {
    time_s: f64,
    in_left: f64,
    in_right: f64,
    eff_left: f64,
    eff_right: f64,
    state: SafetyState,
    estop_cause: Option<EstopCause>,
    speed_clamped: bool,
    forward_inhibited: bool,
}

/// One archived sensor snapshot. Unavailable readings serialise as empty
/// cells.
#[derive(Serialize)]
struct SnapshotRecord {
    time_s: f64,
    ultrasonic_cm: Option<f64>,
    battery_percent: Option<f64>,
    battery_voltage: Option<f64>,
    tilt_deg: Option<f64>,
    is_flipped: Option<bool>,
    ir_left: Option<f64>,
    ir_right: Option<f64>,
    link_ok: Option<bool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SessionRecorder {
    /// Create the recorder's archive files under the session's archive root.
    pub fn new(session: &Session, name: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let arch_drives = Archiver::from_path(session, format!("record/{}_drives.csv", name))?;
        let arch_snapshots =
            Archiver::from_path(session, format!("record/{}_snapshots.csv", name))?;

        Ok(Self {
            name: name.into(),
            arch_drives,
            arch_snapshots,
        })
    }

    /// The name this recording was started under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Archive one drive demand with its safety outcome.
    pub fn record_drive(&mut self, input: &MotorDems, effective: &MotorDems, report: &StatusReport) {
        let record = DriveRecord {
            time_s: get_elapsed_seconds(),
            in_left: input.left,
            in_right: input.right,
            eff_left: effective.left,
            eff_right: effective.right,
            state: report.state,
            estop_cause: report.estop_cause,
            speed_clamped: report.speed_clamped,
            forward_inhibited: report.forward_inhibited,
        };

        if let Err(e) = self.arch_drives.serialise(record) {
            warn!("Could not archive a drive record: {}", e);
        }
    }

    /// Archive one sensor snapshot.
    pub fn record_snapshot(&mut self, snapshot: &SensorSnapshot) {
        let record = SnapshotRecord {
            time_s: get_elapsed_seconds(),
            ultrasonic_cm: snapshot.ultrasonic_cm.value().copied(),
            battery_percent: snapshot.battery_percent.value().copied(),
            battery_voltage: snapshot.battery_voltage.value().copied(),
            tilt_deg: snapshot.tilt_deg.value().copied(),
            is_flipped: snapshot.is_flipped.value().copied(),
            ir_left: snapshot.ir_left.value().copied(),
            ir_right: snapshot.ir_right.value().copied(),
            link_ok: snapshot.link_ok.value().copied(),
        };

        if let Err(e) = self.arch_snapshots.serialise(record) {
            warn!("Could not archive a snapshot record: {}", e);
        }
    }
}
