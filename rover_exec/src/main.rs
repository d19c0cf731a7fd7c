//! Rover executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session and logging
//!     - Load and validate the configuration
//!     - Build the rover controller for the selected target (the factory
//!       picks the BLE or simulator transport)
//!     - Hand the controller to the selected interface mode (keyboard,
//!       dashboard, or gesture), which runs its control loop
//!     - Shut down: stop the rover, stop the sensor poll, disconnect
//!
//! Shutdown runs on every exit path. The interfaces return rather than exit,
//! errors propagate as `Report`s, and the controller's `Drop` backstops
//! anything that escapes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{error, info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use structopt::StructOpt;

// Internal
use rover_if::{endpoint::ConnectionTarget, net::zmq};
use rover_lib::{
    gesture::train,
    interfaces::{
        dashboard::DashboardInterface, gesture::GestureInterface, keyboard::KeyboardInterface,
        InterfaceError,
    },
    params::RoverExecParams,
    record::SessionRecorder,
    rover_ctrl::RoverController,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CLI DEFINITION
// ---------------------------------------------------------------------------

/// MicroMelon rover control.
#[derive(Debug, StructOpt)]
#[structopt(name = "rover_exec")]
struct Opt {
    /// Interface mode: keyboard, gui, or gesture.
    #[structopt(default_value = "keyboard")]
    mode: Mode,

    /// Connection target: physical or simulator. Defaults to the config
    /// file's default_target.
    #[structopt(short, long)]
    target: Option<ConnectionTarget>,

    /// Rover address: pairing code for physical, host:port for simulator.
    /// Defaults to the config file's default_address.
    #[structopt(short, long)]
    address: Option<String>,

    /// Path to the JSON config file.
    #[structopt(short, long, default_value = "rover_config.json")]
    config: PathBuf,

    /// Enable trace-level logging.
    #[structopt(long)]
    debug: bool,

    /// Bypass warning-level safety clamping. Flip and critical-battery
    /// emergency stops stay active regardless.
    #[structopt(long)]
    no_safety: bool,

    /// Connect, read one telemetry frame, report, and exit.
    #[structopt(long)]
    test_connection: bool,

    /// Print the rover's status and exit.
    #[structopt(long)]
    status: bool,

    /// Write a default config file and exit.
    #[structopt(long)]
    config_wizard: bool,

    /// Run the interactive gesture training session and exit.
    #[structopt(long)]
    train_gestures: bool,

    /// Record issued commands and sensor snapshots under this name.
    #[structopt(long)]
    record_session: Option<String>,
}

/// The interface modes.
#[derive(Debug, Copy, Clone)]
enum Mode {
    Keyboard,
    Gui,
    Gesture,
}

/// What one run did, saved into the session directory at exit.
#[derive(serde::Serialize)]
struct RunSummary {
    mode: String,
    target: String,
    address: String,
    final_safety_state: String,
    recorded: Option<String>,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyboard" => Ok(Mode::Keyboard),
            "gui" => Ok(Mode::Gui),
            "gesture" => Ok(Mode::Gesture),
            _ => Err(format!(
                "{:?} is not an interface mode (expected keyboard, gui, or gesture)",
                s
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    let opt = Opt::from_args();

    // The wizard only writes a file, no session or rover needed
    if opt.config_wizard {
        return run_config_wizard(&opt.config);
    }

    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("rover_exec", "sessions").wrap_err("Failed to create the session")?;

    let log_level = if opt.debug {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };
    logger_init(log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("MicroMelon Rover Control\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params = RoverExecParams::load(&opt.config);
    info!("Exec parameters loaded");

    let zmq_ctx = zmq::Context::new();

    // ---- GESTURE TRAINING ----

    // Training needs the vision stream but no rover
    if opt.train_gestures {
        let result = train::run_training(&zmq_ctx, &params.gesture);
        session.exit();
        return result
            .map(|_| ())
            .wrap_err("Gesture training failed");
    }

    // ---- BUILD THE CONTROLLER ----

    let target = opt.target.unwrap_or(params.default_target);
    let address = opt
        .address
        .clone()
        .unwrap_or_else(|| params.default_address.clone());

    info!("Target: {:?}, address: {}", target, address);

    if opt.no_safety {
        warn!("Safety bypass requested on the command line");
    }

    let mut controller =
        RoverController::new(&zmq_ctx, target, &address, &params, opt.no_safety)
            .wrap_err("Failed to build the rover controller")?;

    // ---- UTILITY PATHS ----

    if opt.test_connection || opt.status {
        let result = report_status(&mut controller, opt.test_connection);
        controller.shutdown();
        session.exit();
        return result;
    }

    // ---- SESSION RECORDING ----

    if let Some(ref name) = opt.record_session {
        let recorder = SessionRecorder::new(&session, name)
            .map_err(|e| color_eyre::eyre::eyre!("{}", e))
            .wrap_err("Failed to create the session recorder")?;
        info!("Session recording enabled: {}", recorder.name());
        controller.set_recorder(recorder);
    }

    // ---- RUN THE SELECTED INTERFACE ----

    let run_result = match opt.mode {
        Mode::Keyboard => KeyboardInterface::new().run(&mut controller, &params),
        Mode::Gui => DashboardInterface::new().run(&mut controller, &params),
        Mode::Gesture => match GestureInterface::new(&params) {
            Ok(mut interface) => interface.run(&zmq_ctx, &mut controller, &params),
            Err(e) => Err(e),
        },
    };

    // ---- SHUTDOWN ----

    // Whatever the interface did, the rover is stopped and disconnected
    // before we report it
    let final_status = controller.status();
    controller.shutdown();

    session.save(
        "run_summary.json",
        RunSummary {
            mode: format!("{:?}", opt.mode),
            target: format!("{:?}", target),
            address: address.clone(),
            final_safety_state: format!("{:?}", final_status.safety_state),
            recorded: opt.record_session.clone(),
        },
    );
    session.exit();

    match run_result {
        Ok(()) => {
            info!("End of execution");
            Ok(())
        }
        Err(InterfaceError::Vision(e)) => {
            error!("Vision failure, rover stopped: {}", e);
            Err(Report::new(e)).wrap_err("Gesture mode ended on a vision failure")
        }
        Err(e) => Err(Report::new(e)).wrap_err("Interface error"),
    }
}

/// Write the default config file for `--config-wizard`.
fn run_config_wizard(config_path: &std::path::Path) -> Result<(), Report> {
    if config_path.exists() {
        println!(
            "Config file {:?} already exists, not overwriting it.",
            config_path
        );
        return Ok(());
    }

    std::fs::write(config_path, RoverExecParams::default_json())
        .wrap_err("Failed to write the config file")?;

    println!("Default config written to {:?}.", config_path);
    println!("Edit the thresholds and endpoints there, every key is optional.");

    Ok(())
}

/// Print status for `--status` / `--test-connection`.
fn report_status(controller: &mut RoverController, fresh: bool) -> Result<(), Report> {
    // A forced refresh proves the telemetry path end to end
    if fresh {
        controller
            .force_refresh()
            .wrap_err("Telemetry read failed")?;
        info!("Connection test passed");
    } else if let Err(e) = controller.force_refresh() {
        warn!("Could not refresh telemetry: {}", e);
    }

    let status = controller.status();
    println!("Target:    {:?}", status.target);
    println!("Connected: {}", status.connected);
    println!("Safety:    {:?}", status.safety_state);
    if let Some(cause) = status.estop_cause {
        println!("Stop cause: {:?}", cause);
    }

    rover_lib::interfaces::keyboard::print_sensor_info(controller);

    Ok(())
}
