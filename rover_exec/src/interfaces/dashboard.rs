//! # Console Dashboard Interface
//!
//! The "gui" mode: the keyboard command set with a status panel redrawn
//! after every command. The panel shows what a graphical front end would,
//! with unavailable readings shown as such; the specific widget layout is a
//! front-end concern and no more than this.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use owo_colors::OwoColorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

// Internal
use super::keyboard::{Command, KeyboardInterface};
use super::{fmt_flag, fmt_reading, InterfaceError};
use crate::params::RoverExecParams;
use crate::rover_ctrl::RoverController;
use crate::safety_mgr::SafetyState;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "rover# ";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The dashboard console loop.
pub struct DashboardInterface {
    console: KeyboardInterface,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DashboardInterface {
    pub fn new() -> Self {
        Self {
            console: KeyboardInterface::new(),
        }
    }

    /// Run the dashboard loop until the user quits.
    pub fn run(
        &mut self,
        ctrl: &mut RoverController,
        params: &RoverExecParams,
    ) -> Result<(), InterfaceError> {
        let mut rl =
            DefaultEditor::new().map_err(|e| InterfaceError::Console(e.to_string()))?;

        println!("Rover dashboard. h for help.");

        loop {
            draw_panel(ctrl);

            let line = match rl.readline(PROMPT) {
                Ok(l) => l,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(InterfaceError::Console(e.to_string())),
            };
            rl.add_history_entry(line.as_str()).ok();

            if self.console.exec(Command::parse(&line), ctrl, params) {
                break;
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Redraw the status panel.
fn draw_panel(ctrl: &mut RoverController) {
    let status = ctrl.status();
    let snap = &status.snapshot;

    let safety = match status.safety_state {
        SafetyState::Normal => "NORMAL".green().to_string(),
        SafetyState::Warning => "WARNING".yellow().to_string(),
        SafetyState::EmergencyStopped => "EMERGENCY STOP".red().bold().to_string(),
    };

    let link = match status.connected {
        true => "connected".green().to_string(),
        false => "disconnected".red().to_string(),
    };

    println!();
    println!("=== {} | safety: {} ===", link, safety);
    if let Some(cause) = status.estop_cause {
        println!("    stop cause: {:?} (r to reset)", cause);
    }
    println!(
        "    distance {} cm | battery {} % | tilt {} deg | {}",
        fmt_reading(&snap.ultrasonic_cm),
        fmt_reading(&snap.battery_percent),
        fmt_reading(&snap.tilt_deg),
        fmt_flag(&snap.is_flipped, "FLIPPED".red().to_string().as_str(), "upright"),
    );
    println!(
        "    IR {} / {} | link reading {}",
        fmt_reading(&snap.ir_left),
        fmt_reading(&snap.ir_right),
        fmt_flag(&snap.link_ok, "up", "down"),
    );
}
