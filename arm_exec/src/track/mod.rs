//! # Autonomous Tracking Module
//!
//! Detection-driven centering of the arm on a target object. The camera and
//! the detection model are external collaborators behind the [`FrameSource`]
//! and [`Detector`] traits; this module owns only the control side: choosing
//! a target from the detections, computing per-axis centering demands from
//! the pixel error, and deciding when the target has been stable in the dead
//! zone long enough to grasp.
//!
//! The module makes no assumption about frame rate or detection latency. Each
//! demand it issues through the facade is executed to completion before the
//! next cycle runs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};

// Internal
use crate::arm_ctrl::{ArmCtrlError, RobotArm};
use crate::joints::JointId;
use crate::motion::Direction;
use crate::servo_ctrl::ServoDriver;
use crate::stepper_ctrl::StepperDriver;
use util::{maths, module::State, session::Session};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Source of camera frames. Implemented outside this crate (or by test
/// stubs); capture failures abort the current cycle, not the run.
pub trait FrameSource {
    fn capture(&mut self) -> Result<Frame, TrackError>;
}

/// Object detection over a frame. Implemented outside this crate.
pub trait Detector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, TrackError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during tracking.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Could not capture a frame: {0}")]
    Camera(String),

    #[error("Detection failed: {0}")]
    Detection(String),

    /// An actuation failure while executing a centering demand. The cycle
    /// runner has already issued a stop-all by the time this propagates.
    #[error("Actuation failed during tracking: {0}")]
    Actuation(#[from] ArmCtrlError),
}

/// Outcome of a single tracking cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    /// No target-class detection above the confidence threshold.
    NoTarget,

    /// The target is off-center and centering demands were issued.
    Centering,

    /// The target is in the dead zone; waiting for it to stay there.
    Stable,

    /// The stability condition was met and the grasp sequence ran.
    Grasped,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A captured camera frame. Only the geometry is inspected here; the pixel
/// data passes through untouched to the detector.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,

    /// Raw pixel data in whatever layout the camera and detector agree on.
    pub data: Vec<u8>,
}

/// One detection produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,

    /// Model confidence in [0, 1].
    pub confidence: f64,

    /// Bounding box as `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f64; 4],
}

/// Tracking parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackParams {
    /// Minimum model confidence for a detection to be considered.
    pub confidence_threshold: f64,

    /// Object classes worth tracking.
    pub target_classes: Vec<String>,

    /// Half-widths of the centering dead zone. Errors smaller than these are
    /// treated as centered, avoiding endless small corrections.
    ///
    /// Units: pixels
    pub dead_zone_x_px: f64,
    pub dead_zone_y_px: f64,

    /// Bounds on a single centering motion.
    ///
    /// Units: seconds
    pub min_move_s: f64,
    pub max_move_s: f64,

    /// Speed factor for centering motions.
    pub speed: f64,

    /// Consecutive in-dead-zone frames required before grasping.
    pub stable_frames_to_grasp: u32,

    /// Horizontal translation per pixel of x error, for the stepper axis.
    ///
    /// Units: millimeters/pixel
    pub mm_per_px: f64,

    /// Step rate for translation demands.
    ///
    /// Units: steps/second
    pub translate_rate_sps: f64,
}

/// Per-axis centering demand computed from the pixel error.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AxisDemand {
    pub direction: Direction,

    /// Magnitude of the demand: seconds for the timed joints, millimeters
    /// for the translation axis.
    pub magnitude: f64,
}

/// Demands for one centering step. `None` on an axis means that axis is
/// already within its dead zone.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CenteringDemand {
    /// Horizontal correction, executed on the translation axis.
    pub x: Option<AxisDemand>,

    /// Vertical correction, executed on the shoulder joint.
    pub y: Option<AxisDemand>,
}

/// Status report for tracker processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackStatus {
    /// Class and confidence of the selected target, if any.
    pub target: Option<(String, f64)>,

    /// Consecutive frames the target has been inside the dead zone.
    pub stable_frames: u32,

    /// Whether the stability condition has been met.
    pub grasp_armed: bool,
}

/// Input to one cycle of tracker processing.
#[derive(Debug, Clone, Default)]
pub struct TrackInput {
    pub frame_width: u32,
    pub frame_height: u32,
    pub detections: Vec<Detection>,
}

/// Tracker module state.
#[derive(Default)]
pub struct Tracker {
    pub(crate) params: Option<TrackParams>,

    stable_frames: u32,

    pub(crate) report: TrackStatus,
}

/// The autonomous manager: owns the external collaborators and the tracker,
/// and drives the facade one cycle at a time.
pub struct AutoMgr<C: FrameSource, M: Detector> {
    camera: C,
    detector: M,
    pub tracker: Tracker,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Detection {
    /// Center of the bounding box in pixels.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.bbox[0] + self.bbox[2]) / 2.0,
            (self.bbox[1] + self.bbox[3]) / 2.0,
        )
    }
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.55,
            target_classes: vec![
                "bottle".into(),
                "cup".into(),
                "cell phone".into(),
                "book".into(),
            ],
            dead_zone_x_px: 100.0,
            dead_zone_y_px: 80.0,
            min_move_s: 0.2,
            max_move_s: 2.0,
            speed: 0.5,
            stable_frames_to_grasp: 2,
            mm_per_px: 0.2,
            translate_rate_sps: 1000.0,
        }
    }
}

impl Tracker {
    fn params(&self) -> TrackParams {
        self.params.clone().unwrap_or_default()
    }

    /// Pick the best target-class detection above the confidence threshold.
    fn select_target<'a>(
        &self,
        params: &TrackParams,
        detections: &'a [Detection],
    ) -> Option<&'a Detection> {
        detections
            .iter()
            .filter(|d| d.confidence >= params.confidence_threshold)
            .filter(|d| params.target_classes.iter().any(|c| c == &d.class_name))
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Duration of a centering motion, proportional to the pixel error and
    /// clamped to the configured bounds.
    fn error_to_duration_s(params: &TrackParams, error_px: f64, frame_dim_px: f64) -> f64 {
        let duration_s = maths::lin_map(
            (0.0, frame_dim_px),
            (0.0, params.max_move_s),
            error_px.abs(),
        );
        maths::clamp(&duration_s, &params.min_move_s, &params.max_move_s)
    }
}

impl State for Tracker {
    type InitData = TrackParams;
    type InitError = std::convert::Infallible;

    type InputData = TrackInput;
    type OutputData = Option<CenteringDemand>;
    type StatusReport = TrackStatus;
    type ProcError = TrackError;

    fn init(&mut self, init_data: Self::InitData, _session: &Session)
        -> Result<(), Self::InitError> {
        self.params = Some(init_data);
        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let params = self.params();

        let target = match self.select_target(&params, &input_data.detections) {
            Some(t) => t,
            None => {
                self.stable_frames = 0;
                self.report = TrackStatus::default();
                return Ok((None, self.report.clone()));
            }
        };

        let (obj_x, obj_y) = target.center();
        let center_x = input_data.frame_width as f64 / 2.0;
        let center_y = input_data.frame_height as f64 / 2.0;

        let mut error_x = obj_x - center_x;
        let mut error_y = obj_y - center_y;

        if error_x.abs() < params.dead_zone_x_px {
            error_x = 0.0;
        }
        if error_y.abs() < params.dead_zone_y_px {
            error_y = 0.0;
        }

        let demand = if error_x == 0.0 && error_y == 0.0 {
            self.stable_frames += 1;
            None
        } else {
            self.stable_frames = 0;

            Some(CenteringDemand {
                x: (error_x != 0.0).then(|| AxisDemand {
                    direction: if error_x > 0.0 {
                        Direction::Ccw
                    } else {
                        Direction::Cw
                    },
                    magnitude: error_x.abs() * params.mm_per_px,
                }),
                y: (error_y != 0.0).then(|| AxisDemand {
                    direction: if error_y > 0.0 {
                        Direction::Ccw
                    } else {
                        Direction::Cw
                    },
                    magnitude: Self::error_to_duration_s(
                        &params,
                        error_y,
                        input_data.frame_height as f64,
                    ),
                }),
            })
        };

        self.report = TrackStatus {
            target: Some((target.class_name.clone(), target.confidence)),
            stable_frames: self.stable_frames,
            grasp_armed: self.stable_frames >= params.stable_frames_to_grasp,
        };

        Ok((demand, self.report.clone()))
    }
}

impl<C: FrameSource, M: Detector> AutoMgr<C, M> {
    pub fn new(camera: C, detector: M, params: TrackParams) -> Self {
        Self {
            camera,
            detector,
            tracker: Tracker {
                params: Some(params),
                ..Default::default()
            },
        }
    }

    /// Run one tracking cycle: capture, detect, compute demands, actuate.
    ///
    /// Any actuation failure issues a stop-all before propagating, so the
    /// arm is never left driving when the loop aborts.
    pub fn step<D: ServoDriver, S: StepperDriver>(
        &mut self,
        arm: &mut RobotArm<D, S>,
    ) -> Result<CycleOutcome, TrackError> {
        let frame = self.camera.capture()?;
        let detections = self.detector.detect(&frame)?;

        let input = TrackInput {
            frame_width: frame.width,
            frame_height: frame.height,
            detections,
        };

        let (demand, status) = self.tracker.proc(&input)?;

        if status.target.is_none() {
            return Ok(CycleOutcome::NoTarget);
        }

        if status.grasp_armed {
            info!("Target stable for {} frames, grasping", status.stable_frames);
            let result = self.grasp_sequence(arm);
            self.tracker.stable_frames = 0;
            return result.map(|_| CycleOutcome::Grasped);
        }

        let demand = match demand {
            Some(d) => d,
            None => return Ok(CycleOutcome::Stable),
        };

        if let Err(e) = self.actuate(arm, &demand) {
            warn!("Actuation failed mid-cycle, stopping all joints: {}", e);
            if let Err(stop_err) = arm.stop_all() {
                warn!("Stop-all after failed cycle also failed: {}", stop_err);
            }
            return Err(TrackError::Actuation(e));
        }

        Ok(CycleOutcome::Centering)
    }

    /// Execute the demands of one centering step through the facade.
    fn actuate<D: ServoDriver, S: StepperDriver>(
        &self,
        arm: &mut RobotArm<D, S>,
        demand: &CenteringDemand,
    ) -> Result<(), ArmCtrlError> {
        let params = self.tracker.params();

        if let Some(x) = demand.x {
            match arm.translate(x.direction, x.magnitude, params.translate_rate_sps) {
                Ok(_) => (),
                // An arm without the translation axis still centers vertically
                Err(ArmCtrlError::StepperDisabled) => {
                    warn!("Translation demand skipped: stepper not fitted")
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(y) = demand.y {
            arm.move_joint(JointId::Shoulder, y.direction, y.magnitude, params.speed)?;
        }

        Ok(())
    }

    /// The fixed grasp sequence once the target is centered: extend the
    /// elbow over the target, then run the gripper macros.
    fn grasp_sequence<D: ServoDriver, S: StepperDriver>(
        &self,
        arm: &mut RobotArm<D, S>,
    ) -> Result<(), TrackError> {
        arm.move_joint(
            JointId::Elbow,
            Direction::Ccw,
            1.0,
            self.tracker.params().speed,
        )
        .map_err(|e| self.abort(arm, e))?;

        arm.grasp().map_err(|e| self.abort(arm, e))?;
        arm.release().map_err(|e| self.abort(arm, e))?;

        Ok(())
    }

    /// Stop everything after a failed actuation and wrap the error.
    fn abort<D: ServoDriver, S: StepperDriver>(
        &self,
        arm: &mut RobotArm<D, S>,
        e: ArmCtrlError,
    ) -> TrackError {
        warn!("Actuation failed during grasp sequence: {}", e);
        if let Err(stop_err) = arm.stop_all() {
            warn!("Stop-all after failed grasp also failed: {}", stop_err);
        }
        TrackError::Actuation(e)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> TrackParams {
        TrackParams::default()
    }

    fn input(detections: Vec<Detection>) -> TrackInput {
        TrackInput {
            frame_width: 1280,
            frame_height: 720,
            detections,
        }
    }

    fn detection(class_name: &str, confidence: f64, cx: f64, cy: f64) -> Detection {
        Detection {
            class_name: class_name.into(),
            confidence,
            bbox: [cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0],
        }
    }

    fn tracker() -> Tracker {
        Tracker {
            params: Some(params()),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_detections_yields_no_demand() {
        let mut tracker = tracker();

        let (demand, status) = tracker.proc(&input(vec![])).unwrap();

        assert!(demand.is_none());
        assert!(status.target.is_none());
        assert_eq!(status.stable_frames, 0);
    }

    #[test]
    fn test_low_confidence_and_wrong_class_ignored() {
        let mut tracker = tracker();

        let (demand, status) = tracker
            .proc(&input(vec![
                detection("bottle", 0.3, 100.0, 100.0),
                detection("person", 0.9, 100.0, 100.0),
            ]))
            .unwrap();

        assert!(demand.is_none());
        assert!(status.target.is_none());
    }

    #[test]
    fn test_off_center_target_produces_demands() {
        let mut tracker = tracker();

        // Object right of and below the frame center (center is 640, 360)
        let (demand, status) = tracker
            .proc(&input(vec![detection("cup", 0.8, 1000.0, 600.0)]))
            .unwrap();

        let demand = demand.unwrap();
        assert_eq!(status.target, Some(("cup".into(), 0.8)));

        let x = demand.x.unwrap();
        assert_eq!(x.direction, Direction::Ccw);
        // 360px error at 0.2mm/px
        assert!((x.magnitude - 72.0).abs() < 1e-9);

        let y = demand.y.unwrap();
        assert_eq!(y.direction, Direction::Ccw);
        // 240px error: 240/720 * 2 = 0.667s, within [0.2, 2.0]
        assert!((y.magnitude - 240.0 / 720.0 * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_clamped_to_bounds() {
        let p = params();

        assert_eq!(Tracker::error_to_duration_s(&p, 10.0, 720.0), 0.2);
        assert_eq!(Tracker::error_to_duration_s(&p, 100_000.0, 720.0), 2.0);
    }

    #[test]
    fn test_dead_zone_suppresses_small_errors() {
        let mut tracker = tracker();

        // 90px x error is inside the 100px dead zone, 200px y error is not
        let (demand, _) = tracker
            .proc(&input(vec![detection("cup", 0.8, 640.0 + 90.0, 360.0 + 200.0)]))
            .unwrap();

        let demand = demand.unwrap();
        assert!(demand.x.is_none());
        assert!(demand.y.is_some());
    }

    #[test]
    fn test_stability_counter_arms_grasp() {
        let mut tracker = tracker();
        let centered = input(vec![detection("cup", 0.8, 640.0, 360.0)]);

        let (demand, status) = tracker.proc(&centered).unwrap();
        assert!(demand.is_none());
        assert_eq!(status.stable_frames, 1);
        assert!(!status.grasp_armed);

        let (_, status) = tracker.proc(&centered).unwrap();
        assert_eq!(status.stable_frames, 2);
        assert!(status.grasp_armed);

        // Losing center resets the counter
        let (_, status) = tracker
            .proc(&input(vec![detection("cup", 0.8, 1000.0, 360.0)]))
            .unwrap();
        assert_eq!(status.stable_frames, 0);
        assert!(!status.grasp_armed);
    }

    #[test]
    fn test_cycle_issues_centering_demands() {
        use crate::arm_ctrl::RobotArm;
        use crate::joints::{CalibProfile, JointRegistry, JointsParams};
        use crate::servo_ctrl::SimDriver;
        use crate::stepper_ctrl::{SimStepper, StepperParams};

        struct OneFrame;
        impl FrameSource for OneFrame {
            fn capture(&mut self) -> Result<Frame, TrackError> {
                Ok(Frame {
                    width: 1280,
                    height: 720,
                    data: Vec::new(),
                })
            }
        }

        struct FixedTarget;
        impl Detector for FixedTarget {
            fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, TrackError> {
                Ok(vec![detection("cup", 0.8, 1000.0, 600.0)])
            }
        }

        // Short motions so the cycle doesn't sleep for real durations
        let mut track_params = params();
        track_params.min_move_s = 0.01;
        track_params.max_move_s = 0.02;

        let registry =
            JointRegistry::load(&JointsParams::default(), &CalibProfile::empty()).unwrap();
        let mut arm = RobotArm::new(
            registry,
            SimDriver::new(),
            Some(SimStepper::new(StepperParams::default())),
        );

        let mut auto_mgr = AutoMgr::new(OneFrame, FixedTarget, track_params);

        let outcome = auto_mgr.step(&mut arm).unwrap();

        assert_eq!(outcome, CycleOutcome::Centering);

        // The y error moved the shoulder; the x error moved the stepper
        assert!(arm.accumulated_seconds()[&crate::joints::JointId::Shoulder] != 0.0);
        assert!(arm.stepper_position().unwrap() != 0);
    }

    #[test]
    fn test_capture_failure_aborts_cycle_without_actuation() {
        use crate::arm_ctrl::RobotArm;
        use crate::joints::{CalibProfile, JointRegistry, JointsParams};
        use crate::servo_ctrl::SimDriver;
        use crate::stepper_ctrl::SimStepper;

        struct DeadCamera;
        impl FrameSource for DeadCamera {
            fn capture(&mut self) -> Result<Frame, TrackError> {
                Err(TrackError::Camera("no frame".into()))
            }
        }

        struct NoDetector;
        impl Detector for NoDetector {
            fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, TrackError> {
                unreachable!("capture failed first")
            }
        }

        let registry =
            JointRegistry::load(&JointsParams::default(), &CalibProfile::empty()).unwrap();
        let mut arm: RobotArm<SimDriver, SimStepper> =
            RobotArm::new(registry, SimDriver::new(), None);

        let mut auto_mgr = AutoMgr::new(DeadCamera, NoDetector, params());

        assert!(matches!(
            auto_mgr.step(&mut arm),
            Err(TrackError::Camera(_))
        ));
        assert_eq!(arm.driver().write_count(), 0);
    }

    #[test]
    fn test_best_confidence_target_selected() {
        let tracker = tracker();
        let p = params();

        let detections = vec![
            detection("cup", 0.6, 100.0, 100.0),
            detection("bottle", 0.9, 200.0, 200.0),
            detection("book", 0.7, 300.0, 300.0),
        ];

        let target = tracker.select_target(&p, &detections).unwrap();
        assert_eq!(target.class_name, "bottle");
    }
}
