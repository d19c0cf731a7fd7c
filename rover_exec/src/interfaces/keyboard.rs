//! # Keyboard Interface
//!
//! An interactive console for driving the rover: single-letter commands at a
//! readline prompt. A drive command sets the wheels and the rover holds the
//! demand until the next one, so `w` then ENTER drives forward until a stop
//! (or the safety manager) says otherwise.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::warn;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

// Internal
use super::{fmt_flag, fmt_reading, InterfaceError};
use crate::params::RoverExecParams;
use crate::rover_ctrl::RoverController;
use crate::safety_mgr::{EstopCause, SafetyState};
use rover_if::eqpt::{
    led::{LedDems, Rgb},
    motor::MotorDems,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "rover> ";

const HELP: &str = "\
Commands:
  w / s      drive forward / backward
  a / d      turn left / right
  . (or ENTER) stop
  e          emergency stop        r   reset emergency stop
  c          cycle LED colour      i   sensor readings
  h          help                  q   quit";

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// One parsed console command.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Command {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
    EmergencyStop,
    Reset,
    CycleLed,
    SensorInfo,
    Help,
    Quit,
    Unknown,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The keyboard console loop.
pub struct KeyboardInterface {
    led_index: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Command {
    /// Parse one console line.
    pub fn parse(line: &str) -> Self {
        match line.trim().to_ascii_lowercase().as_str() {
            "w" | "forward" => Command::Forward,
            "s" | "backward" => Command::Backward,
            "a" | "left" => Command::TurnLeft,
            "d" | "right" => Command::TurnRight,
            "" | "." | "stop" => Command::Stop,
            "e" | "estop" => Command::EmergencyStop,
            "r" | "reset" => Command::Reset,
            "c" | "led" => Command::CycleLed,
            "i" | "info" => Command::SensorInfo,
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            _ => Command::Unknown,
        }
    }

    /// The motor demand this command asks for, if it is a drive command.
    pub fn to_dems(&self, params: &RoverExecParams) -> Option<MotorDems> {
        let v = params.drive.drive_speed;
        let t = params.drive.turn_speed;

        match self {
            Command::Forward => Some(MotorDems { left: v, right: v }),
            Command::Backward => Some(MotorDems { left: -v, right: -v }),
            Command::TurnLeft => Some(MotorDems { left: -t, right: t }),
            Command::TurnRight => Some(MotorDems { left: t, right: -t }),
            Command::Stop => Some(MotorDems::zero()),
            _ => None,
        }
    }
}

impl KeyboardInterface {
    pub fn new() -> Self {
        Self { led_index: 0 }
    }

    /// Run the console loop until the user quits.
    pub fn run(
        &mut self,
        ctrl: &mut RoverController,
        params: &RoverExecParams,
    ) -> Result<(), InterfaceError> {
        let mut rl =
            DefaultEditor::new().map_err(|e| InterfaceError::Console(e.to_string()))?;

        println!("Rover console, {} mode. h for help.", mode_name(ctrl));
        println!("{}", HELP);

        loop {
            let line = match rl.readline(PROMPT) {
                Ok(l) => l,
                // ^C and ^D both mean "stop and get out"
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(InterfaceError::Console(e.to_string())),
            };
            rl.add_history_entry(line.as_str()).ok();

            if self.exec(Command::parse(&line), ctrl, params) {
                break;
            }
        }

        Ok(())
    }

    /// Execute one command. Returns true when the loop should end.
    pub(crate) fn exec(
        &mut self,
        cmd: Command,
        ctrl: &mut RoverController,
        params: &RoverExecParams,
    ) -> bool {
        match cmd {
            Command::Quit => return true,

            Command::Help => println!("{}", HELP),

            Command::Unknown => println!("Unrecognised command, h for help"),

            Command::EmergencyStop => {
                ctrl.trigger_emergency_stop(EstopCause::Manual);
                println!("EMERGENCY STOP - r to reset");
            }

            Command::Reset => {
                if ctrl.reset_emergency_stop() {
                    println!("Emergency stop reset");
                } else {
                    println!("Not emergency stopped");
                }
            }

            Command::CycleLed => {
                let palette = &params.leds.palette;
                if palette.is_empty() {
                    return false;
                }
                self.led_index = (self.led_index + 1) % palette.len();
                let entry = &palette[self.led_index];
                let [r, g, b] = entry.rgb;

                // LED delivery is best effort
                match ctrl.set_led(LedDems::All(Rgb::new(r, g, b))) {
                    Ok(()) => println!("LED colour: {}", entry.name),
                    Err(e) => warn!("Could not set LED colour: {}", e),
                }
            }

            Command::SensorInfo => print_sensor_info(ctrl),

            drive_cmd => {
                if let Some(dems) = drive_cmd.to_dems(params) {
                    match ctrl.drive(dems) {
                        Ok(()) => {
                            if ctrl.safety_state() == SafetyState::EmergencyStopped {
                                println!("Emergency stopped, demand zeroed - r to reset");
                            }
                        }
                        Err(e) => println!("Drive failed: {}", e),
                    }
                }
            }
        }

        false
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Print the current sensor readings.
pub fn print_sensor_info(ctrl: &mut RoverController) {
    let status = ctrl.status();
    let snap = &status.snapshot;

    println!("Sensors:");
    println!("  distance:  {} cm", fmt_reading(&snap.ultrasonic_cm));
    println!(
        "  battery:   {} % ({} V)",
        fmt_reading(&snap.battery_percent),
        fmt_reading(&snap.battery_voltage)
    );
    println!(
        "  tilt:      {} deg ({})",
        fmt_reading(&snap.tilt_deg),
        fmt_flag(&snap.is_flipped, "FLIPPED", "upright")
    );
    println!(
        "  IR:        {} / {}",
        fmt_reading(&snap.ir_left),
        fmt_reading(&snap.ir_right)
    );
    println!(
        "  link:      {}",
        fmt_flag(&snap.link_ok, "up", "down")
    );
    println!("  safety:    {:?}", status.safety_state);
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn mode_name(ctrl: &RoverController) -> &'static str {
    match ctrl.target() {
        rover_if::endpoint::ConnectionTarget::Physical => "physical",
        rover_if::endpoint::ConnectionTarget::Simulator => "simulator",
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("w"), Command::Forward);
        assert_eq!(Command::parse("  FORWARD "), Command::Forward);
        assert_eq!(Command::parse(""), Command::Stop);
        assert_eq!(Command::parse("."), Command::Stop);
        assert_eq!(Command::parse("e"), Command::EmergencyStop);
        assert_eq!(Command::parse("bogus"), Command::Unknown);
    }

    #[test]
    fn test_drive_demands_from_params() {
        let params = RoverExecParams::default();

        let dems = Command::Forward.to_dems(&params).unwrap();
        assert_eq!((dems.left, dems.right), (30.0, 30.0));

        let dems = Command::TurnLeft.to_dems(&params).unwrap();
        assert_eq!((dems.left, dems.right), (-30.0, 30.0));

        assert!(Command::Help.to_dems(&params).is_none());
    }
}
