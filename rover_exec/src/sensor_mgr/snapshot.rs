//! # Sensor snapshot types
//!
//! A [`SensorSnapshot`] is the cached, validity-tagged view of the rover's
//! telemetry owned by the sensor manager. Consumers only ever see copies.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Duration, Utc};

use rover_if::eqpt::telem::RawTelemetry;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One named sensor reading with its freshness tag.
///
/// A reading a caller receives is either valid, with the poll-cycle timestamp
/// it was acquired at, or explicitly unavailable. There is no way to get a
/// stale number out of one of these without also getting its age.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    Valid {
        value: T,
        timestamp: DateTime<Utc>,
    },
    Unavailable,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The full set of cached rover readings.
///
/// Invariant: all valid fields carry the timestamp of the poll cycle they
/// were read in. After a failed poll old values remain in place with their
/// old timestamps, and age out to `Unavailable` through
/// [`SensorSnapshot::with_max_age`], so consumers never mix stale and fresh
/// values as if they were one coherent frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    /// Timestamp of the most recent successful poll cycle.
    pub taken_at: DateTime<Utc>,

    /// Ultrasonic obstacle distance in centimeters.
    pub ultrasonic_cm: Reading<f64>,

    /// Battery charge in percent.
    pub battery_percent: Reading<f64>,

    /// Battery voltage in volts.
    pub battery_voltage: Reading<f64>,

    /// Body tilt in degrees from upright.
    pub tilt_deg: Reading<f64>,

    /// True if the rover is upside down.
    pub is_flipped: Reading<bool>,

    /// Left infrared reflectance reading.
    pub ir_left: Reading<f64>,

    /// Right infrared reflectance reading.
    pub ir_right: Reading<f64>,

    /// True while the transport link reports connected. Updated on every
    /// poll attempt, including failed ones.
    pub link_ok: Reading<bool>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T> Reading<T> {
    /// The reading's value, if it is valid.
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Valid { value, .. } => Some(value),
            Reading::Unavailable => None,
        }
    }

    /// The timestamp the reading was acquired at, if it is valid.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Reading::Valid { timestamp, .. } => Some(*timestamp),
            Reading::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Valid { .. })
    }

    /// Build a reading from an optional raw value at the given poll time.
    pub fn from_raw(raw: Option<T>, timestamp: DateTime<Utc>) -> Self {
        match raw {
            Some(value) => Reading::Valid { value, timestamp },
            None => Reading::Unavailable,
        }
    }
}

impl<T: Copy> Reading<T> {
    /// The same reading, or `Unavailable` if it is older than `max_age` at
    /// time `now`.
    pub fn aged(&self, max_age: Duration, now: DateTime<Utc>) -> Self {
        match self {
            Reading::Valid { timestamp, .. } if now - *timestamp > max_age => Reading::Unavailable,
            r => *r,
        }
    }
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::Unavailable
    }
}

impl SensorSnapshot {
    /// A snapshot with every reading unavailable, stamped at `now`.
    pub fn unavailable(now: DateTime<Utc>) -> Self {
        Self {
            taken_at: now,
            ultrasonic_cm: Reading::Unavailable,
            battery_percent: Reading::Unavailable,
            battery_voltage: Reading::Unavailable,
            tilt_deg: Reading::Unavailable,
            is_flipped: Reading::Unavailable,
            ir_left: Reading::Unavailable,
            ir_right: Reading::Unavailable,
            link_ok: Reading::Unavailable,
        }
    }

    /// Build a snapshot from one raw telemetry frame.
    ///
    /// Every valid field carries the same poll-cycle timestamp.
    pub fn from_raw(raw: &RawTelemetry, link_ok: bool, now: DateTime<Utc>) -> Self {
        Self {
            taken_at: now,
            ultrasonic_cm: Reading::from_raw(raw.ultrasonic_cm, now),
            battery_percent: Reading::from_raw(raw.battery_percent, now),
            battery_voltage: Reading::from_raw(raw.battery_voltage, now),
            tilt_deg: Reading::from_raw(raw.tilt_deg, now),
            is_flipped: Reading::from_raw(raw.is_flipped, now),
            ir_left: Reading::from_raw(raw.ir_left, now),
            ir_right: Reading::from_raw(raw.ir_right, now),
            link_ok: Reading::Valid {
                value: link_ok,
                timestamp: now,
            },
        }
    }

    /// A copy of this snapshot with every reading older than `max_age`
    /// replaced by `Unavailable`.
    pub fn with_max_age(&self, max_age: Duration, now: DateTime<Utc>) -> Self {
        Self {
            taken_at: self.taken_at,
            ultrasonic_cm: self.ultrasonic_cm.aged(max_age, now),
            battery_percent: self.battery_percent.aged(max_age, now),
            battery_voltage: self.battery_voltage.aged(max_age, now),
            tilt_deg: self.tilt_deg.aged(max_age, now),
            is_flipped: self.is_flipped.aged(max_age, now),
            ir_left: self.ir_left.aged(max_age, now),
            ir_right: self.ir_right.aged(max_age, now),
            link_ok: self.link_ok.aged(max_age, now),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn raw_frame(now: DateTime<Utc>) -> RawTelemetry {
        RawTelemetry {
            timestamp: now,
            ultrasonic_cm: Some(42.0),
            battery_percent: Some(80.0),
            battery_voltage: Some(4.1),
            tilt_deg: Some(2.0),
            is_flipped: Some(false),
            ir_left: None,
            ir_right: Some(12.0),
        }
    }

    #[test]
    fn test_from_raw_single_poll_cycle() {
        let now = Utc::now();
        let snap = SensorSnapshot::from_raw(&raw_frame(now), true, now);

        // Every valid reading is stamped with the same poll cycle
        assert_eq!(snap.ultrasonic_cm.timestamp(), Some(now));
        assert_eq!(snap.battery_percent.timestamp(), Some(now));
        assert_eq!(snap.link_ok.value(), Some(&true));

        // A reading the rover didn't report is unavailable, not zero
        assert!(!snap.ir_left.is_available());
    }

    #[test]
    fn test_stale_readings_age_out() {
        let t0 = Utc::now();
        let snap = SensorSnapshot::from_raw(&raw_frame(t0), true, t0);

        // Within the max age everything is still served
        let fresh = snap.with_max_age(Duration::seconds(2), t0 + Duration::seconds(1));
        assert_eq!(fresh.ultrasonic_cm.value(), Some(&42.0));

        // Past the max age the values are unavailable, never stale numbers
        let stale = snap.with_max_age(Duration::seconds(2), t0 + Duration::seconds(3));
        assert!(!stale.ultrasonic_cm.is_available());
        assert!(!stale.battery_percent.is_available());
        assert!(!stale.link_ok.is_available());
    }
}
