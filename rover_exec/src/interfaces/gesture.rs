//! # Gesture Interface
//!
//! The gesture control loop: landmark frames in, motor demands out, at a
//! fixed tick rate. The camera and landmark model run in the external vision
//! process; losing that stream for longer than the configured timeout is a
//! vision failure, which ends the mode through the graceful shutdown path
//! (stop rover, disconnect, exit) rather than leaving the rover under
//! undefined control.
//!
//! A small stdin listener accepts `q` (quit), `e` (emergency stop), and `r`
//! (reset) while the loop runs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{info, warn};
use std::io::BufRead;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

// Internal
use super::InterfaceError;
use crate::gesture::{GestureLabel, GesturePipeline, LandmarkClient, VisionError};
use crate::params::RoverExecParams;
use crate::rover_ctrl::RoverController;
use crate::safety_mgr::EstopCause;
use rover_if::net::zmq;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The gesture control loop.
pub struct GestureInterface {
    pipeline: GesturePipeline,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GestureInterface {
    /// Load the trained model and build the interface.
    pub fn new(params: &RoverExecParams) -> Result<Self, InterfaceError> {
        let pipeline = GesturePipeline::new(&params.gesture).map_err(InterfaceError::Model)?;

        Ok(Self { pipeline })
    }

    /// Run the gesture loop until the user quits or the vision stream dies.
    pub fn run(
        &mut self,
        ctx: &zmq::Context,
        ctrl: &mut RoverController,
        params: &RoverExecParams,
    ) -> Result<(), InterfaceError> {
        let client = LandmarkClient::start(ctx, &params.gesture.landmark_endpoint)
            .map_err(InterfaceError::Vision)?;

        let console_rx = spawn_console_listener();

        let tick = tick_period(params);
        let started = Instant::now();
        let mut last_stable = GestureLabel::Neutral;

        println!("Gesture control running. q quits, e emergency stop, r resets.");

        loop {
            let tick_start = Instant::now();
            let now = Utc::now();

            // Console commands first, an emergency stop should not wait for
            // a frame
            match console_rx.try_recv() {
                Ok(ConsoleCmd::Quit) => break,
                Ok(ConsoleCmd::EmergencyStop) => {
                    ctrl.trigger_emergency_stop(EstopCause::Manual);
                    println!("EMERGENCY STOP - r to reset");
                }
                Ok(ConsoleCmd::Reset) => {
                    if ctrl.reset_emergency_stop() {
                        println!("Emergency stop reset");
                    }
                }
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => break,
            }

            // Vision health: a stream that has gone quiet for too long is a
            // failure, not a long gap between hands
            let stream_age = client.seconds_since_last_frame(now);
            let quiet_s = match stream_age {
                Some(age) => age,
                None => started.elapsed().as_secs_f64(),
            };
            if quiet_s > params.gesture.vision_timeout_s {
                return Err(InterfaceError::Vision(VisionError::StreamLost(quiet_s)));
            }

            // Newest frame wins; a tick without a fresh frame re-emits the
            // current stable demand
            let output = match client.take_latest() {
                Some(frame) => self.pipeline.process_frame(&frame, now),
                None => self.pipeline.idle_tick(now),
            };

            if output.stable != last_stable {
                info!(
                    "Gesture: {} (confidence {:.2})",
                    output.stable.name(),
                    output.prediction.map(|p| p.confidence).unwrap_or(0.0)
                );
                last_stable = output.stable;
            }

            if let Err(e) = ctrl.drive(output.dems) {
                // Surfaced, not retried; the link-loss safety trigger deals
                // with a dead transport
                warn!("Gesture drive failed: {}", e);
            }

            // Fixed-rate tick
            if let Some(remaining) = tick.checked_sub(tick_start.elapsed()) {
                thread::sleep(remaining);
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands accepted on stdin while the gesture loop runs.
enum ConsoleCmd {
    Quit,
    EmergencyStop,
    Reset,
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn tick_period(params: &RoverExecParams) -> Duration {
    let rate = if params.gesture.tick_rate_hz > 0.0 {
        params.gesture.tick_rate_hz
    } else {
        20.0
    };
    Duration::from_secs_f64(1.0 / rate)
}

/// Listen for console commands on a background thread.
///
/// The thread blocks on stdin and dies with the process; the receiver is
/// polled non-blocking from the control loop.
fn spawn_console_listener() -> Receiver<ConsoleCmd> {
    let (tx, rx) = channel();

    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };

            let cmd = match line.trim().to_ascii_lowercase().as_str() {
                "q" | "quit" => Some(ConsoleCmd::Quit),
                "e" | "estop" => Some(ConsoleCmd::EmergencyStop),
                "r" | "reset" => Some(ConsoleCmd::Reset),
                _ => None,
            };

            if let Some(cmd) = cmd {
                let quit = matches!(cmd, ConsoleCmd::Quit);
                if tx.send(cmd).is_err() || quit {
                    break;
                }
            }
        }
    });

    rx
}
