//! # Tracking Test
//!
//! This binary allows the autonomous tracking loop to be run without the
//! camera, the detection model or the physical arm. A scripted target walks
//! towards the frame center over a handful of frames, which exercises the
//! full centering-then-grasp sequence against the simulated drivers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use log::info;

use arm_lib::{
    arm_ctrl::RobotArm,
    joints::{CalibProfile, JointRegistry, JointsParams},
    servo_ctrl::SimDriver,
    stepper_ctrl::{SimStepper, StepperParams},
    track::{AutoMgr, CycleOutcome, Detection, Detector, Frame, FrameSource, TrackError, TrackParams},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Frame geometry of the scripted camera.
const FRAME_WIDTH: u32 = 1280;
const FRAME_HEIGHT: u32 = 720;

/// Maximum number of tracking cycles before giving up.
const MAX_CYCLES: usize = 20;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Camera stub producing fixed-geometry frames.
struct ScriptedCamera;

/// Detector stub walking a single target towards the frame center.
struct ScriptedDetector {
    /// Current target center in pixels.
    x: f64,
    y: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FrameSource for ScriptedCamera {
    fn capture(&mut self) -> Result<Frame, TrackError> {
        Ok(Frame {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            data: Vec::new(),
        })
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, TrackError> {
        let detection = Detection {
            class_name: "bottle".into(),
            confidence: 0.9,
            bbox: [self.x - 30.0, self.y - 30.0, self.x + 30.0, self.y + 30.0],
        };

        // Walk a third of the remaining error each frame, as a stand-in for
        // the physical arm actually centering on the target
        let center_x = FRAME_WIDTH as f64 / 2.0;
        let center_y = FRAME_HEIGHT as f64 / 2.0;
        self.x += (center_x - self.x) / 3.0;
        self.y += (center_y - self.y) / 3.0;

        Ok(vec![detection])
    }
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    let session =
        Session::new("track_test", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Tracking Test\n");

    // ---- BUILD THE SIMULATED ARM ----

    let registry = JointRegistry::load(&JointsParams::default(), &CalibProfile::empty())
        .wrap_err("Failed to build the joint registry")?;

    let mut arm = RobotArm::new(
        registry,
        SimDriver::new(),
        Some(SimStepper::new(StepperParams::default())),
    );

    // ---- RUN THE TRACKING LOOP ----

    let mut auto_mgr = AutoMgr::new(
        ScriptedCamera,
        ScriptedDetector {
            x: 1100.0,
            y: 650.0,
        },
        TrackParams::default(),
    );

    for cycle in 1..=MAX_CYCLES {
        let outcome = auto_mgr.step(&mut arm)?;

        info!("Cycle {}: {:?}", cycle, outcome);

        if outcome == CycleOutcome::Grasped {
            info!("Target grasped after {} cycles", cycle);
            break;
        }
    }

    info!("Final odometry: {:?}", arm.accumulated_seconds());
    info!("Stepper position: {:?}", arm.stepper_position());

    arm.shutdown().wrap_err("Failed to shut the arm down")?;
    session.exit();

    Ok(())
}
