//! # Arm Control Module
//!
//! The robot facade every consumer of the arm goes through. It composes the
//! joint registry, the timed motion engine and the optional stepper driver,
//! and on top of them enforces the per-joint travel-time ceilings and keeps
//! the per-joint odometry.
//!
//! All actuation methods take `&mut self`: exclusive ownership of the facade
//! is the serialization point for the single hardware write path. Consumers
//! which accept concurrent requests (the command server) run the facade on
//! one thread and let requests queue in front of it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;

// Internal
use crate::joints::{JointId, JointRegistry, JointsError, ALL_JOINTS};
use crate::motion::{Direction, MotionEngine, MotionError, MotionRequest};
use crate::servo_ctrl::ServoDriver;
use crate::stepper_ctrl::{StepperDriver, StepperError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Duration of the fixed gripper open/close macros.
///
/// Units: seconds
pub const GRASP_DURATION_S: f64 = 1.0;

/// Speed factor of the fixed gripper open/close macros.
pub const GRASP_SPEED: f64 = 0.5;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ArmCtrlError {
    #[error(transparent)]
    Joints(#[from] JointsError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Stepper(#[from] StepperError),

    #[error("The translation axis is not fitted on this arm")]
    StepperDisabled,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The robot facade.
pub struct RobotArm<D: ServoDriver, S: StepperDriver> {
    registry: JointRegistry,

    engine: MotionEngine<D>,

    stepper: Option<S>,

    /// Net signed seconds of travel per joint since the last reset. A
    /// bookkeeping proxy for position, not a measured angle: these are
    /// continuous-rotation servos with no position sensor.
    accumulated_s: HashMap<JointId, f64>,

    last_report: MoveReport,
}

/// Report on the last executed move.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MoveReport {
    pub joint: Option<JointId>,

    /// The duration the caller asked for.
    ///
    /// Units: seconds
    pub requested_s: f64,

    /// The duration actually driven after the travel ceiling was applied.
    ///
    /// Units: seconds
    pub applied_s: f64,

    /// Whether the travel ceiling reduced the requested duration.
    pub clamped: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmCtrlError {
    /// Whether this error means the request never reached the hardware, as
    /// opposed to an actuation failure part way through it.
    pub fn is_rejection(&self) -> bool {
        match self {
            ArmCtrlError::Joints(_) => true,
            ArmCtrlError::StepperDisabled => true,
            ArmCtrlError::Motion(MotionError::Actuation(_)) => false,
            ArmCtrlError::Motion(_) => true,
            ArmCtrlError::Stepper(StepperError::Gpio) => false,
            ArmCtrlError::Stepper(_) => true,
        }
    }
}

impl<D: ServoDriver, S: StepperDriver> RobotArm<D, S> {
    /// Create the facade over an already-loaded registry, a servo driver and
    /// the optional stepper driver.
    pub fn new(registry: JointRegistry, driver: D, stepper: Option<S>) -> Self {
        let accumulated_s = ALL_JOINTS.iter().map(|&id| (id, 0.0)).collect();

        Self {
            registry,
            engine: MotionEngine::new(driver),
            stepper,
            accumulated_s,
            last_report: MoveReport::default(),
        }
    }

    /// Move a joint in a direction for a duration at a speed factor, blocking
    /// for the full duration of the motion.
    ///
    /// The requested duration is clamped to the joint's travel-time ceiling
    /// for that direction; the duration actually driven is returned so the
    /// caller can report truthfully what happened. The joint's odometry is
    /// updated only after the motion completes successfully.
    pub fn move_joint(
        &mut self,
        id: JointId,
        direction: Direction,
        requested_s: f64,
        speed: f64,
    ) -> Result<f64, ArmCtrlError> {
        let joint = self.registry.get(id)?;

        if direction == Direction::Stop {
            self.last_report = MoveReport {
                joint: Some(id),
                requested_s,
                applied_s: 0.0,
                clamped: false,
            };
            self.engine.stop(joint)?;
            return Ok(0.0);
        }

        // Hard safety ceiling, never exceeded regardless of caller input.
        // Non-finite requests pass through unclamped for the engine to reject
        let ceiling_s = joint.max_travel_s(direction);
        let clamped_s = if requested_s.is_finite() {
            requested_s.min(ceiling_s)
        } else {
            requested_s
        };

        if clamped_s < requested_s {
            warn!(
                "{:?}: requested {}s exceeds the {}s travel ceiling, clamping",
                id, requested_s, ceiling_s
            );
        }

        let request = MotionRequest {
            direction,
            duration_s: clamped_s,
            speed,
        };

        let applied_s = self.engine.execute(joint, &request)?;

        self.last_report = MoveReport {
            joint: Some(id),
            requested_s,
            applied_s,
            clamped: clamped_s < requested_s,
        };

        *self.accumulated_s.entry(id).or_insert(0.0) += applied_s * direction.as_i8() as f64;

        Ok(applied_s)
    }

    /// [`RobotArm::move_joint`] with the joint given by its wire name.
    pub fn move_joint_by_name(
        &mut self,
        name: &str,
        direction: Direction,
        requested_s: f64,
        speed: f64,
    ) -> Result<f64, ArmCtrlError> {
        let id = self.registry.get_by_name(name)?.id;
        self.move_joint(id, direction, requested_s, speed)
    }

    /// Open the gripper for the fixed grasp duration.
    pub fn grasp(&mut self) -> Result<f64, ArmCtrlError> {
        self.move_joint(
            JointId::Gripper,
            Direction::Ccw,
            GRASP_DURATION_S,
            GRASP_SPEED,
        )
    }

    /// Close the gripper for the fixed grasp duration.
    pub fn release(&mut self) -> Result<f64, ArmCtrlError> {
        self.move_joint(
            JointId::Gripper,
            Direction::Cw,
            GRASP_DURATION_S,
            GRASP_SPEED,
        )
    }

    /// Translate the arm horizontally on the stepper axis, blocking until
    /// complete. Returns the number of steps taken.
    pub fn translate(
        &mut self,
        direction: Direction,
        distance_mm: f64,
        rate_sps: f64,
    ) -> Result<u32, ArmCtrlError> {
        let stepper = self.stepper.as_mut().ok_or(ArmCtrlError::StepperDisabled)?;

        stepper.enable()?;
        let steps = stepper.move_distance_mm(distance_mm, direction, rate_sps)?;

        Ok(steps)
    }

    /// Apply the hold pulse to every joint immediately.
    ///
    /// This is the emergency-stop entry point: every joint is attempted even
    /// if an earlier one fails, and the first failure is reported after all
    /// attempts.
    pub fn stop_all(&mut self) -> Result<(), ArmCtrlError> {
        info!("Stopping all joints");

        let mut first_error = None;

        for &id in ALL_JOINTS.iter() {
            let result = match self.registry.get(id) {
                Ok(joint) => self.engine.stop(joint).map_err(ArmCtrlError::from),
                Err(e) => Err(ArmCtrlError::from(e)),
            };

            if let Err(e) = result {
                warn!("Failed to stop {:?}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Zero every joint's odometry. Does not affect hardware state.
    pub fn reset_accumulators(&mut self) {
        info!("Resetting joint odometry");
        for value in self.accumulated_s.values_mut() {
            *value = 0.0;
        }
    }

    /// Per-joint net signed seconds of travel since the last reset.
    pub fn accumulated_seconds(&self) -> HashMap<JointId, f64> {
        self.accumulated_s.clone()
    }

    /// Report on the last executed move.
    pub fn last_report(&self) -> &MoveReport {
        &self.last_report
    }

    /// The joint registry this facade was built over.
    pub fn registry(&self) -> &JointRegistry {
        &self.registry
    }

    /// Access the underlying servo driver.
    pub fn driver(&self) -> &D {
        self.engine.driver()
    }

    /// Net signed step count of the translation axis, if fitted.
    pub fn stepper_position(&self) -> Option<i64> {
        self.stepper.as_ref().map(|s| s.position_steps())
    }

    /// Stop all joints on a best-effort basis, then release the servo and
    /// stepper devices.
    ///
    /// The stop is best-effort so that the device release happens on every
    /// path; the drivers additionally release on drop, covering exits that
    /// never reach this call.
    pub fn shutdown(mut self) -> Result<(), ArmCtrlError> {
        info!("Shutting down the arm");

        if let Err(e) = self.stop_all() {
            warn!("Could not stop all joints during shutdown: {}", e);
        }

        if let Some(ref mut stepper) = self.stepper {
            stepper.disable()?;
        }

        self.engine.shutdown()?;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::joints::{CalibProfile, JointsParams};
    use crate::servo_ctrl::SimDriver;
    use crate::stepper_ctrl::{SimStepper, StepperParams};

    fn arm_with_stepper(stepper: Option<SimStepper>) -> RobotArm<SimDriver, SimStepper> {
        let registry =
            JointRegistry::load(&JointsParams::default(), &CalibProfile::empty()).unwrap();
        RobotArm::new(registry, SimDriver::new(), stepper)
    }

    fn arm() -> RobotArm<SimDriver, SimStepper> {
        arm_with_stepper(None)
    }

    #[test]
    fn test_travel_ceiling_never_exceeded() {
        let mut arm = arm();

        // Elbow ceiling is 3.5s in both directions: an arbitrarily large
        // request must come back as exactly the ceiling. Speed 0.0 keeps the
        // test from sleeping; the ceiling applies before the speed shortcut
        let applied = arm
            .move_joint(JointId::Elbow, Direction::Ccw, 999.0, 0.0)
            .unwrap();
        assert_eq!(applied, 0.0);

        let applied = arm
            .move_joint(JointId::Elbow, Direction::Ccw, 0.01, 0.5)
            .unwrap();
        assert_eq!(applied, 0.01);

        let report = arm.last_report();
        assert_eq!(report.joint, Some(JointId::Elbow));
        assert!(!report.clamped);
    }

    #[test]
    fn test_oversize_request_clamps_and_reports() {
        let mut arm = arm();

        // Use a tiny custom ceiling so the test doesn't sleep for seconds
        let mut params = JointsParams::default();
        params.elbow.max_travel_s = [0.02, 0.02];
        let registry = JointRegistry::load(&params, &CalibProfile::empty()).unwrap();
        arm.registry = registry;

        let applied = arm
            .move_joint(JointId::Elbow, Direction::Ccw, 999.0, 0.5)
            .unwrap();

        assert_eq!(applied, 0.02);
        assert!(arm.last_report().clamped);
        assert_eq!(arm.accumulated_seconds()[&JointId::Elbow], 0.02);
    }

    #[test]
    fn test_zero_speed_move_not_reported_clamped() {
        let mut arm = arm();

        // A zero-speed move applies 0.0s but no ceiling was involved, so the
        // report must not claim the request was clamped
        let applied = arm
            .move_joint(JointId::Shoulder, Direction::Ccw, 1.0, 0.0)
            .unwrap();

        assert_eq!(applied, 0.0);
        assert!(!arm.last_report().clamped);
    }

    #[test]
    fn test_accumulator_additivity() {
        let mut arm = arm();

        let before = arm.accumulated_seconds()[&JointId::Wrist];

        arm.move_joint(JointId::Wrist, Direction::Ccw, 0.05, 0.5)
            .unwrap();
        arm.move_joint(JointId::Wrist, Direction::Cw, 0.05, 0.5)
            .unwrap();

        let after = arm.accumulated_seconds()[&JointId::Wrist];
        assert!((after - before).abs() < 1e-12);
    }

    #[test]
    fn test_stop_does_not_move_odometry() {
        let mut arm = arm();

        arm.move_joint(JointId::Shoulder, Direction::Stop, 3.0, 0.9)
            .unwrap();

        assert_eq!(arm.accumulated_seconds()[&JointId::Shoulder], 0.0);
        assert_eq!(
            arm.driver().last_pulse_us(0),
            Some(arm.registry().get(JointId::Shoulder).unwrap().hold_pulse_us)
        );
    }

    #[test]
    fn test_unknown_joint_is_rejected_before_hardware() {
        let mut arm = arm();

        let result = arm.move_joint_by_name("nonexistent", Direction::Ccw, 1.0, 0.5);

        assert!(matches!(
            result,
            Err(ArmCtrlError::Joints(JointsError::UnknownJoint(_)))
        ));
        assert_eq!(arm.driver().write_count(), 0);
    }

    #[test]
    fn test_stop_all_holds_every_joint() {
        let mut arm = arm();

        arm.stop_all().unwrap();

        for &id in ALL_JOINTS.iter() {
            let joint = arm.registry().get(id).unwrap();
            assert_eq!(
                arm.driver().last_pulse_us(joint.channel),
                Some(joint.hold_pulse_us)
            );
        }
    }

    #[test]
    fn test_reset_accumulators() {
        let mut arm = arm();

        arm.move_joint(JointId::Gripper, Direction::Cw, 0.05, 0.5)
            .unwrap();
        assert!(arm.accumulated_seconds()[&JointId::Gripper] != 0.0);

        arm.reset_accumulators();
        assert_eq!(arm.accumulated_seconds()[&JointId::Gripper], 0.0);
    }

    #[test]
    fn test_grasp_and_release_cancel_out() {
        let mut arm = arm();

        // The macros are fixed-duration opposite moves of the gripper, so
        // back to back they leave the odometry where it started. 1.0s each,
        // so this test sleeps; keep it as the single long-running one
        arm.grasp().unwrap();
        assert_eq!(arm.accumulated_seconds()[&JointId::Gripper], GRASP_DURATION_S);

        arm.release().unwrap();
        assert!(arm.accumulated_seconds()[&JointId::Gripper].abs() < 1e-12);
    }

    #[test]
    fn test_translate_without_stepper_rejected() {
        let mut arm = arm();

        assert!(matches!(
            arm.translate(Direction::Ccw, 50.0, 1000.0),
            Err(ArmCtrlError::StepperDisabled)
        ));
    }

    #[test]
    fn test_translate_through_stepper() {
        let mut arm = arm_with_stepper(Some(SimStepper::new(StepperParams::default())));

        let steps = arm.translate(Direction::Ccw, 8.0, 1000.0).unwrap();

        assert_eq!(steps, 3200);
        assert_eq!(arm.stepper_position(), Some(3200));
    }

    #[test]
    fn test_shutdown_succeeds() {
        let arm = arm();
        arm.shutdown().unwrap();
    }
}
