//! # Timed Motion Engine
//!
//! The core state machine of the arm: turns a motion request ("move joint J
//! in direction D for duration T at speed factor V") into a drive pulse, a
//! blocking wall-clock wait, and the joint's hold pulse.
//!
//! The engine blocks the calling thread for the full requested duration -
//! there is no background timer, the calling context owns the wait. This is
//! a deliberate simplicity/safety tradeoff: only one PWM write path exists
//! and duty values are not queued, so overlapping motions cannot be made
//! meaningful on a single shared bus.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Internal
use crate::joints::Joint;
use crate::servo_ctrl::{ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Hard cap on a single motion's duration, far above any joint's travel
/// ceiling. Extreme finite durations cannot be slept for (the conversion to
/// [`Duration`] panics well below `f64::MAX`), so they are rejected up front
/// like any other invalid parameter rather than discovered mid-drive.
///
/// Units: seconds
pub const MAX_DURATION_S: f64 = 60.0;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction of travel for a joint.
///
/// The mapping of direction onto pulse polarity is per-joint calibration
/// data ([`Joint::direction_sign`]), not a property of this enum: the engine
/// has exactly one pulse formula and the sign comes from the joint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Clockwise, encoded as -1 on the wire.
    Cw,
    /// No motion, encoded as 0 on the wire.
    Stop,
    /// Counterclockwise, encoded as 1 on the wire.
    Ccw,
}

/// State of the engine for the current call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum MotionState {
    /// No motion in progress.
    Idle,
    /// A drive pulse is applied and the duration wait is running.
    Driving,
    /// The motion ended and the joint's hold pulse is applied. Terminal per
    /// call; the engine re-enters `Driving` only via a new request.
    Holding,
}

/// Possible errors raised by the motion engine.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Requested duration {0}s is outside the valid range (0, {MAX_DURATION_S}]s")]
    InvalidDuration(f64),

    #[error("Speed factor {0} is outside [0.0, 1.0]")]
    InvalidSpeed(f64),

    /// The computed drive pulse fell outside the joint's pulse window.
    /// Rejected rather than clamped: a clamp would silently execute a
    /// different command than the one requested.
    #[error(
        "Computed drive pulse {pulse_us}us for {joint:?} is outside the window \
         [{min_us}, {max_us}]us"
    )]
    PulseOutOfRange {
        joint: crate::joints::JointId,
        pulse_us: f64,
        min_us: f64,
        max_us: f64,
    },

    /// A hardware write failed. The hold pulse has already been attempted on
    /// a best-effort basis before this is raised, so the joint is not left
    /// actively driving if the bus recovered.
    #[error("Actuation failed: {0}")]
    Actuation(#[from] ServoError),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An ephemeral motion command, existing only for the duration of a single
/// call into the engine.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct MotionRequest {
    pub direction: Direction,

    /// Requested duration of the motion.
    ///
    /// Units: seconds
    pub duration_s: f64,

    /// Speed factor in [0.0, 1.0]. A factor of 0 is explicitly a stop, not
    /// a drive at the neutral pulse.
    pub speed: f64,
}

/// The timed motion engine. Owns the [`ServoDriver`], which is the system's
/// only hardware write path.
pub struct MotionEngine<D: ServoDriver> {
    driver: D,

    state: MotionState,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Direction {
    /// Wire encoding: -1 clockwise, 0 stop, 1 counterclockwise.
    pub fn as_i8(&self) -> i8 {
        match self {
            Direction::Cw => -1,
            Direction::Stop => 0,
            Direction::Ccw => 1,
        }
    }

    /// Parse the wire encoding, `None` for anything but -1, 0 or 1.
    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            -1 => Some(Direction::Cw),
            0 => Some(Direction::Stop),
            1 => Some(Direction::Ccw),
            _ => None,
        }
    }

    /// Index into per-direction tables such as [`Joint::max_travel_s`].
    ///
    /// # Panics
    /// - If called on `Stop`, which has no travel ceiling.
    pub fn index(&self) -> usize {
        match self {
            Direction::Cw => 0,
            Direction::Ccw => 1,
            Direction::Stop => panic!("Stop has no direction index"),
        }
    }
}

impl<D: ServoDriver> MotionEngine<D> {
    /// Create a new engine owning the given driver.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            state: MotionState::Idle,
        }
    }

    /// Execute a motion request on the given joint, blocking for its full
    /// duration, and return the number of seconds actually driven.
    ///
    /// Stop requests (explicit `Direction::Stop`, or any request with speed
    /// factor 0) apply the joint's hold pulse immediately and report 0.0
    /// seconds driven. For driving requests the sequence is: apply the drive
    /// pulse, sleep `duration_s`, apply the hold pulse. If the drive write
    /// fails the wait is skipped but the hold pulse is still attempted, so
    /// that the joint is never knowingly left driving.
    pub fn execute(&mut self, joint: &Joint, request: &MotionRequest) -> Result<f64, MotionError> {
        // Stop requests are always honoured, without parameter validation:
        // rejecting a stop is worse than accepting an odd one
        if request.direction == Direction::Stop {
            self.stop(joint)?;
            return Ok(0.0);
        }

        if !request.duration_s.is_finite()
            || request.duration_s <= 0.0
            || request.duration_s > MAX_DURATION_S
        {
            return Err(MotionError::InvalidDuration(request.duration_s));
        }
        if !request.speed.is_finite() || request.speed < 0.0 || request.speed > 1.0 {
            return Err(MotionError::InvalidSpeed(request.speed));
        }

        // A zero speed factor is a stop, not a drive at the neutral pulse
        if request.speed == 0.0 {
            self.stop(joint)?;
            return Ok(0.0);
        }

        let drive_pulse_us = self.drive_pulse_us(joint, request);

        if drive_pulse_us < joint.pulse_min_us || drive_pulse_us > joint.pulse_max_us {
            return Err(MotionError::PulseOutOfRange {
                joint: joint.id,
                pulse_us: drive_pulse_us,
                min_us: joint.pulse_min_us,
                max_us: joint.pulse_max_us,
            });
        }

        debug!(
            "{:?}: drive {}us for {}s (dir {:+}, speed {})",
            joint.id,
            drive_pulse_us,
            request.duration_s,
            request.direction.as_i8(),
            request.speed
        );

        // IDLE/HOLDING -> DRIVING
        self.state = MotionState::Driving;
        let drive_result = self.driver.set_pulse_us(joint.channel, drive_pulse_us);

        // Only wait if the drive pulse actually reached the hardware
        if drive_result.is_ok() {
            std::thread::sleep(Duration::from_secs_f64(request.duration_s));
        }

        // DRIVING -> HOLDING. The hold pulse is always attempted, even after
        // a failed drive write, so a recovered bus never leaves the joint
        // actively driving
        let hold_result = self.apply_hold(joint);

        drive_result?;
        hold_result?;

        Ok(request.duration_s)
    }

    /// Apply the joint's hold pulse immediately, regardless of prior state.
    pub fn stop(&mut self, joint: &Joint) -> Result<(), MotionError> {
        trace!("{:?}: stop requested", joint.id);
        self.apply_hold(joint)?;
        Ok(())
    }

    /// The engine's state as of the end of the last call.
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Access the underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Release the underlying driver.
    pub fn shutdown(&mut self) -> Result<(), MotionError> {
        self.driver.shutdown()?;
        Ok(())
    }

    /// The drive pulse for a request: `neutral + dir * sign * range * speed`.
    fn drive_pulse_us(&self, joint: &Joint, request: &MotionRequest) -> f64 {
        joint.neutral_pulse_us
            + request.direction.as_i8() as f64
                * joint.direction_sign
                * joint.speed_range_us
                * request.speed
    }

    /// Apply the hold pulse and transition to `Holding`.
    ///
    /// The hold pulse is not necessarily the neutral pulse: on loaded joints
    /// it compensates for gravity-induced creep.
    fn apply_hold(&mut self, joint: &Joint) -> Result<(), ServoError> {
        self.state = MotionState::Holding;
        let result = self.driver.set_pulse_us(joint.channel, joint.hold_pulse_us);

        if result.is_ok() {
            trace!("{:?}: holding at {}us", joint.id, joint.hold_pulse_us);
        }

        result
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::joints::{CalibProfile, JointId, JointRegistry, JointsParams};
    use crate::servo_ctrl::SimDriver;

    /// A driver which rejects the first `failures` writes but records every
    /// attempt, so tests can check the hold pulse is attempted after a
    /// failed drive write.
    #[derive(Default)]
    struct FailingDriver {
        failures: usize,
        attempts: Vec<(u8, f64)>,
    }

    impl ServoDriver for FailingDriver {
        fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError> {
            self.attempts.push((channel, pulse_us));
            if self.attempts.len() <= self.failures {
                Err(ServoError::I2c)
            } else {
                Ok(())
            }
        }

        fn shutdown(&mut self) -> Result<(), ServoError> {
            Ok(())
        }
    }

    fn registry() -> JointRegistry {
        JointRegistry::load(&JointsParams::default(), &CalibProfile::empty()).unwrap()
    }

    fn request(direction: Direction, duration_s: f64, speed: f64) -> MotionRequest {
        MotionRequest {
            direction,
            duration_s,
            speed,
        }
    }

    #[test]
    fn test_shoulder_drive_and_hold_pulses() {
        // Shoulder: neutral 1700us, hold 1700us, sign -1, so "up" (ccw)
        // at speed 0.5 must drive at 1700 - 250 = 1450us then hold at 1700us
        let registry = registry();
        let shoulder = registry.get(JointId::Shoulder).unwrap();
        let mut engine = MotionEngine::new(SimDriver::new());

        let applied = engine
            .execute(shoulder, &request(Direction::Ccw, 0.05, 0.5))
            .unwrap();

        assert_eq!(applied, 0.05);
        assert_eq!(engine.state(), MotionState::Holding);
        assert_eq!(
            engine.driver().channel_writes(shoulder.channel),
            vec![1450.0, 1700.0]
        );
    }

    #[test]
    fn test_elbow_holds_at_gravity_compensated_pulse() {
        // Elbow hold (1850us) differs from neutral (1720us): after any
        // completed motion the last applied pulse must be the hold pulse
        let registry = registry();
        let elbow = registry.get(JointId::Elbow).unwrap();
        let mut engine = MotionEngine::new(SimDriver::new());

        engine
            .execute(elbow, &request(Direction::Cw, 0.05, 1.0))
            .unwrap();

        assert_eq!(engine.driver().last_pulse_us(elbow.channel), Some(1850.0));
        assert_ne!(
            engine.driver().last_pulse_us(elbow.channel),
            Some(elbow.neutral_pulse_us)
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let registry = registry();
        let wrist = registry.get(JointId::Wrist).unwrap();
        let mut engine = MotionEngine::new(SimDriver::new());

        for _ in 0..3 {
            let applied = engine
                .execute(wrist, &request(Direction::Stop, 99.0, 42.0))
                .unwrap();
            assert_eq!(applied, 0.0);
            assert_eq!(engine.state(), MotionState::Holding);
            assert_eq!(
                engine.driver().last_pulse_us(wrist.channel),
                Some(wrist.hold_pulse_us)
            );
        }
    }

    #[test]
    fn test_zero_speed_is_a_stop() {
        let registry = registry();
        let gripper = registry.get(JointId::Gripper).unwrap();
        let mut engine = MotionEngine::new(SimDriver::new());

        let applied = engine
            .execute(gripper, &request(Direction::Ccw, 0.5, 0.0))
            .unwrap();

        assert_eq!(applied, 0.0);
        assert_eq!(engine.driver().write_count(), 1);
        assert_eq!(
            engine.driver().last_pulse_us(gripper.channel),
            Some(gripper.hold_pulse_us)
        );
    }

    #[test]
    fn test_invalid_parameters_never_touch_hardware() {
        let registry = registry();
        let shoulder = registry.get(JointId::Shoulder).unwrap();
        let mut engine = MotionEngine::new(SimDriver::new());

        assert!(matches!(
            engine.execute(shoulder, &request(Direction::Ccw, -1.0, 0.5)),
            Err(MotionError::InvalidDuration(_))
        ));
        assert!(matches!(
            engine.execute(shoulder, &request(Direction::Ccw, 1.0, 1.5)),
            Err(MotionError::InvalidSpeed(_))
        ));
        assert!(matches!(
            engine.execute(shoulder, &request(Direction::Ccw, f64::NAN, 0.5)),
            Err(MotionError::InvalidDuration(_))
        ));

        assert_eq!(engine.driver().write_count(), 0);
    }

    #[test]
    fn test_extreme_duration_rejected_before_hardware() {
        // A finite duration too large to sleep for must be rejected during
        // parameter validation: discovering it after the drive write would
        // leave the joint driving with no hold pulse applied
        let registry = registry();
        let elbow = registry.get(JointId::Elbow).unwrap();
        let mut engine = MotionEngine::new(SimDriver::new());

        assert!(matches!(
            engine.execute(elbow, &request(Direction::Ccw, 1.0e20, 0.5)),
            Err(MotionError::InvalidDuration(_))
        ));
        assert!(matches!(
            engine.execute(elbow, &request(Direction::Ccw, MAX_DURATION_S + 1.0, 0.5)),
            Err(MotionError::InvalidDuration(_))
        ));

        assert_eq!(engine.driver().write_count(), 0);
    }

    #[test]
    fn test_hold_attempted_after_failed_drive_write() {
        let registry = registry();
        let elbow = registry.get(JointId::Elbow).unwrap();
        let mut engine = MotionEngine::new(FailingDriver {
            failures: 1,
            ..Default::default()
        });

        let result = engine.execute(elbow, &request(Direction::Ccw, 0.05, 0.5));

        assert!(matches!(result, Err(MotionError::Actuation(_))));

        // The failed drive write plus the best-effort hold write
        let attempts = &engine.driver().attempts;
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[1], (elbow.channel, elbow.hold_pulse_us));
    }
}
