//! # Arm Control Executable
//!
//! This executable is responsible for controlling the robotic arm:
//! - Four continuous-rotation servo joints (shoulder, elbow, wrist, gripper)
//!   behind the PCA9685 driver board
//! - The optional stepper-backed horizontal translation axis
//!
//! Clients send [`ArmCmd`]s over a REQ socket; the executable validates each
//! command, executes it to completion on the facade (motions block), and
//! answers with an [`ArmResponse`]. Because there is exactly one facade on
//! one thread, concurrent clients queue and commands never interleave at the
//! hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{debug, info, warn};
use std::collections::HashMap;

// Internal
use arm_lib::{
    arm_ctrl::RobotArm,
    arm_server::ArmServer,
    joints::{CalibProfile, JointRegistry},
    motion::Direction,
    params::ArmExecParams,
    servo_ctrl::ServoDriver,
    stepper_ctrl::StepperDriver,
};
use comms_if::tc::{ArmCmd, ArmResponse};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Arm Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams = util::params::load("arm_exec.toml")?;

    info!("Parameters loaded");

    // ---- LOAD CALIBRATION ----

    let root = host::get_arm_sw_root().wrap_err("Cannot find the software root")?;
    let profile = CalibProfile::load(root.join(&params.calib_file))
        .wrap_err("Failed to load the calibration profile")?;

    let registry = JointRegistry::load(&params.joints, &profile)
        .wrap_err("Failed to build the joint registry")?;

    if !registry.defaulted().is_empty() {
        warn!(
            "{} joint(s) are running on built-in default calibration: {:?}",
            registry.defaulted().len(),
            registry.defaulted()
        );
    }

    // ---- SERVER INITIALISATION ----

    let server = ArmServer::new(&params).wrap_err("Failed to initialise the server")?;

    info!("Server listening on {}", params.command_endpoint);

    // ---- HARDWARE INITIALISATION ----

    // On target the PCA9685 and the GPIO stepper are acquired for the
    // process lifetime; off target everything is simulated.
    #[cfg(target_arch = "arm")]
    {
        use arm_lib::servo_ctrl::{pca9685::Pca9685Driver, PWM_FREQUENCY_HZ};
        use arm_lib::stepper_ctrl::GpioStepper;

        let i2c = rppal::i2c::I2c::new().wrap_err("Failed to open the I2C bus")?;
        let driver = Pca9685Driver::new(i2c, params.i2c_address, PWM_FREQUENCY_HZ)
            .wrap_err("Failed to initialise the PCA9685")?;

        let stepper = if params.stepper.enabled {
            let gpio = rppal::gpio::Gpio::new().wrap_err("Failed to open the GPIO device")?;
            let step = gpio.get(params.stepper.step_pin)?.into_output();
            let dir = gpio.get(params.stepper.dir_pin)?.into_output();
            let enable = match params.stepper.enable_pin {
                Some(pin) => Some(gpio.get(pin)?.into_output()),
                None => None,
            };
            Some(GpioStepper::new(step, dir, enable, params.stepper.clone()))
        } else {
            None
        };

        let arm = RobotArm::new(registry, driver, stepper);
        serve(server, arm, &params, &session)
    }

    #[cfg(not(target_arch = "arm"))]
    {
        use arm_lib::servo_ctrl::SimDriver;
        use arm_lib::stepper_ctrl::SimStepper;

        warn!("Not running on the target platform, all hardware is simulated");

        let stepper = if params.stepper.enabled {
            Some(SimStepper::new(params.stepper.clone()))
        } else {
            None
        };

        let arm = RobotArm::new(registry, SimDriver::new(), stepper);
        serve(server, arm, &params, &session)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Main command loop: receive, validate, execute, respond.
fn serve<D: ServoDriver, S: StepperDriver>(
    mut server: ArmServer,
    mut arm: RobotArm<D, S>,
    params: &ArmExecParams,
    session: &Session,
) -> Result<()> {
    info!("Initialisation complete, entering main loop");

    loop {
        // Every received message must be answered, parseable or not, since
        // the REP socket enforces strict request/reply alternation
        let cmd = match server.get_command() {
            None => continue,
            Some(Err(e)) => {
                warn!("Could not deserialize the command: {}", e);
                let response = ArmResponse::CmdRejected {
                    reason: format!("Unparseable command: {}", e),
                };
                if let Err(e) = server.send_response(&response) {
                    warn!("Could not send the rejection to the client: {}", e);
                }
                continue;
            }
            Some(Ok(c)) => c,
        };

        debug!("Received command: {:?}", cmd);

        let response = execute(&mut arm, &cmd, params);

        if let Err(e) = server.send_response(&response) {
            warn!("Could not send the response to the client: {}", e);
        }

        // Snapshot the odometry into the session after every command so a
        // crash never loses more than one motion's worth
        session.save("odometry.json", named_accumulators(&arm));
    }
}

/// Execute a single validated command on the facade, mapping every outcome
/// onto a response.
fn execute<D: ServoDriver, S: StepperDriver>(
    arm: &mut RobotArm<D, S>,
    cmd: &ArmCmd,
    params: &ArmExecParams,
) -> ArmResponse {
    // Interface validation happens before the facade is touched; failures
    // are request errors, never forwarded to hardware
    if let Err(e) = cmd.validate() {
        return ArmResponse::CmdRejected {
            reason: e.to_string(),
        };
    }

    let result = match cmd {
        ArmCmd::Move {
            joint,
            direction,
            duration_s,
            speed,
        } => match Direction::from_i8(*direction) {
            Some(dir) => arm
                .move_joint_by_name(joint, dir, *duration_s, *speed)
                .map(Some),
            None => {
                return ArmResponse::CmdRejected {
                    reason: format!("Invalid direction: {}", direction),
                }
            }
        },

        ArmCmd::Stop { joint } => arm
            .move_joint_by_name(joint, Direction::Stop, 0.0, 0.0)
            .map(Some),

        ArmCmd::StopAll => arm.stop_all().map(|_| None),

        ArmCmd::Grasp => arm.grasp().map(Some),

        ArmCmd::Release => arm.release().map(Some),

        ArmCmd::Translate {
            direction,
            distance_mm,
        } => match Direction::from_i8(*direction) {
            Some(dir) => arm
                .translate(dir, *distance_mm, params.stepper.rate_sps)
                .map(|_| None),
            None => {
                return ArmResponse::CmdRejected {
                    reason: format!("Invalid direction: {}", direction),
                }
            }
        },

        ArmCmd::ResetOdometry => {
            arm.reset_accumulators();
            Ok(None)
        }

        ArmCmd::Status => {
            return ArmResponse::Positions {
                seconds: named_accumulators(arm),
            }
        }
    };

    match result {
        Ok(applied_s) => ArmResponse::CmdOk { applied_s },
        Err(e) if e.is_rejection() => ArmResponse::CmdRejected {
            reason: e.to_string(),
        },
        Err(e) => {
            warn!("Actuation failed: {}", e);
            ArmResponse::CmdFailed {
                reason: e.to_string(),
            }
        }
    }
}

/// The odometry keyed by wire name, for responses and session snapshots.
fn named_accumulators<D: ServoDriver, S: StepperDriver>(
    arm: &RobotArm<D, S>,
) -> HashMap<String, f64> {
    arm.accumulated_seconds()
        .iter()
        .map(|(id, s)| (id.name().to_string(), *s))
        .collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
