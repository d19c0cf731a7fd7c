//! # Sensor Manager
//!
//! Decouples sensor consumers from per-call transport latency and failure.
//! A dedicated background thread polls the transport's telemetry link at the
//! configured rate and maintains one cached [`SensorSnapshot`]; consumers
//! read copies of the cache and never touch the wire.
//!
//! The cache is single-writer (the poll thread) multiple-reader. On a failed
//! poll the previous readings stay in place and age out through the max-age
//! filter, so a caller asking for a reading that is too old gets an explicit
//! "unavailable", never a stale number dressed up as fresh.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod snapshot;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Internal
pub use params::Params;
pub use snapshot::{Reading, SensorSnapshot};

use crate::transport::{ReadError, TelemetryLink};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Reply channel for a forced refresh.
type RefreshReply = Sender<Result<SensorSnapshot, PollError>>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Background-polled cache of the rover's sensor state.
pub struct SensorMgr {
    params: Params,

    cached: Arc<Mutex<SensorSnapshot>>,

    refresh_tx: Sender<RefreshReply>,

    run: Arc<AtomicBool>,

    poll_jh: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by a forced refresh.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Telemetry read failed: {0}")]
    ReadFailed(ReadError),

    #[error("The sensor poll thread is not running")]
    NotRunning,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorMgr {
    /// Start the sensor manager over the given telemetry link.
    ///
    /// Spawns the poll thread, which owns the link for the manager's
    /// lifetime.
    pub fn start(link: Box<dyn TelemetryLink>, params: Params) -> Self {
        let cached = Arc::new(Mutex::new(SensorSnapshot::unavailable(Utc::now())));
        let run = Arc::new(AtomicBool::new(true));
        let (refresh_tx, refresh_rx) = channel();

        let poll_jh = {
            let cached = cached.clone();
            let run = run.clone();
            let poll_params = params.clone();
            Some(thread::spawn(move || {
                poll_thread(link, poll_params, cached, run, refresh_rx)
            }))
        };

        Self {
            params,
            cached,
            refresh_tx,
            run,
            poll_jh,
        }
    }

    /// The latest snapshot, served from cache.
    ///
    /// Non-blocking. Readings older than the configured max age are reported
    /// unavailable.
    pub fn latest(&self) -> SensorSnapshot {
        let snap = self
            .cached
            .lock()
            .expect("SensorMgr: snapshot mutex poisoned")
            .clone();

        snap.with_max_age(max_age(&self.params), Utc::now())
    }

    /// Force an immediate poll, bypassing the schedule.
    ///
    /// Blocks until the poll thread has completed the read. The returned
    /// snapshot is fresh by construction.
    pub fn force_refresh(&self) -> Result<SensorSnapshot, PollError> {
        let (reply_tx, reply_rx) = channel();

        self.refresh_tx
            .send(reply_tx)
            .map_err(|_| PollError::NotRunning)?;

        match reply_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(PollError::NotRunning),
        }
    }

    /// Stop the poll thread and wait for it to exit.
    ///
    /// The thread's receive is bounded by the poll period, so this never
    /// blocks indefinitely. Idempotent.
    pub fn stop(&mut self) {
        self.run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.poll_jh.take() {
            jh.join().ok();
        }
    }
}

impl Drop for SensorMgr {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Poll period from the configured rate.
fn poll_period(params: &Params) -> Duration {
    // Guard against a zero or negative rate from a hand-edited config
    let rate = if params.poll_rate_hz > 0.0 {
        params.poll_rate_hz
    } else {
        2.0
    };
    Duration::from_secs_f64(1.0 / rate)
}

/// Maximum reading age from the params.
fn max_age(params: &Params) -> chrono::Duration {
    chrono::Duration::milliseconds((params.max_age_s.max(0.0) * 1000.0) as i64)
}

/// The background poll loop.
///
/// Waits one poll period for a forced-refresh request; either way a poll is
/// performed, the only difference is whether someone is waiting on the
/// result.
fn poll_thread(
    mut link: Box<dyn TelemetryLink>,
    params: Params,
    cached: Arc<Mutex<SensorSnapshot>>,
    run: Arc<AtomicBool>,
    refresh_rx: Receiver<RefreshReply>,
) {
    let period = poll_period(&params);

    while run.load(Ordering::Relaxed) {
        match refresh_rx.recv_timeout(period) {
            Ok(reply_tx) => {
                let result = poll_once(link.as_mut(), &cached);
                reply_tx.send(result).ok();
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = poll_once(link.as_mut(), &cached) {
                    trace!("Scheduled sensor poll failed: {}", e);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Perform one poll, updating the cache.
///
/// On success the whole snapshot is replaced atomically. On failure only the
/// link state reading is refreshed; the old values stay and will age out.
fn poll_once(
    link: &mut dyn TelemetryLink,
    cached: &Arc<Mutex<SensorSnapshot>>,
) -> Result<SensorSnapshot, PollError> {
    let now = Utc::now();
    let link_ok = link.is_connected();

    match link.read_raw() {
        Ok(raw) => {
            let snap = SensorSnapshot::from_raw(&raw, link_ok, now);

            let mut guard = cached.lock().expect("SensorMgr: snapshot mutex poisoned");
            *guard = snap.clone();

            Ok(snap)
        }
        Err(e) => {
            if link_ok {
                warn!("Telemetry read failed on a live link: {}", e);
            }

            let mut guard = cached.lock().expect("SensorMgr: snapshot mutex poisoned");
            guard.link_ok = Reading::Valid {
                value: link_ok,
                timestamp: now,
            };

            Err(PollError::ReadFailed(e))
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::Transport;
    use rover_if::eqpt::telem::RawTelemetry;

    fn telem_with_distance(cm: f64) -> RawTelemetry {
        RawTelemetry {
            ultrasonic_cm: Some(cm),
            battery_percent: Some(90.0),
            ..RawTelemetry::empty_now()
        }
    }

    #[test]
    fn test_force_refresh_returns_current_values() {
        let mut transport = MockTransport::new();
        transport.connect().unwrap();
        transport.state.set_telemetry(telem_with_distance(50.0));

        let link = transport.open_telemetry_link().unwrap();
        let mut mgr = SensorMgr::start(link, Params::default());

        let snap = mgr.force_refresh().unwrap();
        assert_eq!(snap.ultrasonic_cm.value(), Some(&50.0));
        assert_eq!(snap.link_ok.value(), Some(&true));

        // A new reading is picked up by the next refresh
        transport.state.set_telemetry(telem_with_distance(5.0));
        let snap = mgr.force_refresh().unwrap();
        assert_eq!(snap.ultrasonic_cm.value(), Some(&5.0));

        mgr.stop();
    }

    #[test]
    fn test_read_failure_keeps_last_good_values() {
        let mut transport = MockTransport::new();
        transport.connect().unwrap();
        transport.state.set_telemetry(telem_with_distance(33.0));

        let link = transport.open_telemetry_link().unwrap();
        let mut mgr = SensorMgr::start(
            link,
            Params {
                poll_rate_hz: 2.0,
                max_age_s: 30.0,
            },
        );

        mgr.force_refresh().unwrap();

        // Break the link, the refresh reports the failure to its caller
        transport
            .state
            .fail_reads
            .store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(mgr.force_refresh().is_err());

        // But latest() still serves the last good values within max age
        let snap = mgr.latest();
        assert_eq!(snap.ultrasonic_cm.value(), Some(&33.0));

        mgr.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut transport = MockTransport::new();
        transport.connect().unwrap();

        let link = transport.open_telemetry_link().unwrap();
        let mut mgr = SensorMgr::start(link, Params::default());

        mgr.stop();
        mgr.stop();
    }
}
