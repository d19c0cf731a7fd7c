//! # Landmark Stream Client
//!
//! The camera and the hand-landmark model live in a separate vision process,
//! which publishes one [`LandmarkFrame`] per inference cycle. This client
//! subscribes to that stream on a background thread and keeps only the
//! newest frame: the control loop always reads the freshest hand pose, and
//! frames it was too slow for are dropped rather than queued. Bounded
//! latency beats completeness here, a queued-up backlog of old hand poses is
//! worse than useless for driving.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use log::{error, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};

use rover_if::{
    eqpt::vision::LandmarkFrame,
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Background subscriber to the vision process's landmark stream.
pub struct LandmarkClient {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,

    latest: Arc<Mutex<Option<LandmarkFrame>>>,
    last_frame_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised by the landmark client.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Could not subscribe to the landmark stream: {0}")]
    SocketError(MonitoredSocketError),

    #[error("No landmark frame received for {0:.1} s, vision process presumed dead")]
    StreamLost(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LandmarkClient {
    /// Subscribe to the landmark stream at the given zmq endpoint.
    pub fn start(ctx: &zmq::Context, endpoint: &str) -> Result<Self, VisionError> {
        let socket_options = SocketOptions {
            // A publisher that isn't up yet is fine, frames start flowing
            // when it is
            block_on_first_connect: false,
            recv_timeout: 100,
            linger: 1,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, endpoint)
            .map_err(VisionError::SocketError)?;
        socket
            .set_subscribe(b"")
            .map_err(|e| VisionError::SocketError(MonitoredSocketError::CreateSocketError(e)))?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(Mutex::new(None));
        let last_frame_at = Arc::new(Mutex::new(None));

        let bg_jh = {
            let run = bg_run.clone();
            let latest = latest.clone();
            let last_frame_at = last_frame_at.clone();
            Some(thread::spawn(move || {
                bg_thread(socket, run, latest, last_frame_at)
            }))
        };

        Ok(Self {
            bg_jh,
            bg_run,
            latest,
            last_frame_at,
        })
    }

    /// Take the newest frame, if one arrived since the last call.
    pub fn take_latest(&self) -> Option<LandmarkFrame> {
        self.latest
            .lock()
            .expect("LandmarkClient: frame mutex poisoned")
            .take()
    }

    /// Seconds since any frame (hand or no-hand) was received, or `None` if
    /// nothing has arrived yet.
    pub fn seconds_since_last_frame(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_frame_at
            .lock()
            .expect("LandmarkClient: timestamp mutex poisoned")
            .map(|t| (now - t).num_milliseconds() as f64 / 1000.0)
    }

    /// Stop the subscriber thread.
    pub fn stop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            jh.join().ok();
        }
    }
}

impl Drop for LandmarkClient {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread: replace the latest frame slot with whatever the vision
/// process publishes.
fn bg_thread(
    socket: MonitoredSocket,
    run: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<LandmarkFrame>>>,
    last_frame_at: Arc<Mutex<Option<DateTime<Utc>>>>,
) {
    while run.load(Ordering::Relaxed) {
        let msg = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Non UTF-8 message on the landmark stream");
                continue;
            }
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                error!("Error receiving from the landmark stream: {:?}", e);
                break;
            }
        };

        let frame: LandmarkFrame = match serde_json::from_str(&msg) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not parse a landmark frame: {}", e);
                continue;
            }
        };

        {
            let mut slot = latest.lock().expect("LandmarkClient: frame mutex poisoned");
            // Newest frame wins, an unread older frame is dropped
            *slot = Some(frame);
        }
        {
            let mut t = last_frame_at
                .lock()
                .expect("LandmarkClient: timestamp mutex poisoned");
            *t = Some(Utc::now());
        }
    }
}
