//! # Joint Registry Module
//!
//! Holds the per-joint calibration used by the timed motion engine: hardware
//! channel, neutral and hold pulses, direction polarity and the travel-time
//! ceilings. The registry is populated once at startup from the joint
//! parameters and the persisted calibration profile, and is immutable for
//! the process lifetime.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod calib;
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Internal
pub use calib::*;
pub use params::*;

use crate::motion::Direction;
use crate::servo_ctrl::PWM_PERIOD_US;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of servo-backed joints on the arm.
pub const NUM_JOINTS: usize = 4;

/// All servo-backed joints, in channel order.
pub const ALL_JOINTS: [JointId; NUM_JOINTS] = [
    JointId::Shoulder,
    JointId::Elbow,
    JointId::Wrist,
    JointId::Gripper,
];

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of all servo-backed joints.
///
/// The horizontal axis (`base`) is stepper-backed and is not part of the
/// registry, see `stepper_ctrl`.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
#[serde(rename_all = "lowercase")]
pub enum JointId {
    Shoulder,
    Elbow,
    Wrist,
    Gripper,
}

/// Errors raised by the registry.
#[derive(thiserror::Error, Debug)]
pub enum JointsError {
    /// The requested joint is not registered. This is never silently
    /// ignored: a move request that no-ops is indistinguishable from one
    /// that was accepted but had no effect, which is dangerous for safety
    /// reasoning.
    #[error("Unknown joint: {0:?}")]
    UnknownJoint(String),

    #[error(
        "Joint {joint:?} has pulse {pulse_us}us outside its valid window \
         [{min_us}, {max_us}]us"
    )]
    PulseOutsideWindow {
        joint: JointId,
        pulse_us: f64,
        min_us: f64,
        max_us: f64,
    },

    #[error("Joint {0:?} has a non-positive travel-time ceiling")]
    InvalidTravelCeiling(JointId),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Calibration data for one controllable joint.
#[derive(Debug, Clone, Serialize)]
pub struct Joint {
    pub id: JointId,

    /// Channel index on the PWM driver board.
    pub channel: u8,

    /// Pulse width that produces zero angular velocity for this physical
    /// unit. Calibrated per device, not a hardware constant.
    ///
    /// Units: microseconds
    pub neutral_pulse_us: f64,

    /// Pulse width applied at rest. May differ from the neutral pulse to
    /// counteract gravity-induced drift on loaded joints.
    ///
    /// Units: microseconds
    pub hold_pulse_us: f64,

    /// Per-joint polarity: +1 if a counterclockwise request increases the
    /// pulse width, -1 if it decreases it. Polarity is calibration data so
    /// that the motion engine has exactly one pulse formula.
    pub direction_sign: f64,

    /// Pulse offset from neutral at speed factor 1.0.
    ///
    /// Units: microseconds
    pub speed_range_us: f64,

    /// Hard ceilings on a single motion's duration, preventing mechanical
    /// over-travel. Indexed by [`Direction::index`].
    ///
    /// Units: seconds
    pub max_travel_s: [f64; 2],

    /// Lowest pulse this joint may ever be commanded with.
    ///
    /// Units: microseconds
    pub pulse_min_us: f64,

    /// Highest pulse this joint may ever be commanded with.
    ///
    /// Units: microseconds
    pub pulse_max_us: f64,
}

/// The joint registry, populated once at startup.
pub struct JointRegistry {
    joints: HashMap<JointId, Joint>,

    /// Joints which fell back to built-in default calibration because the
    /// profile had no entry for them. Operators use this to spot stale
    /// calibration.
    defaulted: Vec<JointId>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointId {
    /// Lowercase name as used on the wire and in the calibration profile.
    pub fn name(&self) -> &'static str {
        match self {
            JointId::Shoulder => "shoulder",
            JointId::Elbow => "elbow",
            JointId::Wrist => "wrist",
            JointId::Gripper => "gripper",
        }
    }

    /// Parse a joint name, `None` if unrecognised.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shoulder" => Some(JointId::Shoulder),
            "elbow" => Some(JointId::Elbow),
            "wrist" => Some(JointId::Wrist),
            "gripper" => Some(JointId::Gripper),
            _ => None,
        }
    }
}

impl Joint {
    /// The travel-time ceiling for the given direction.
    ///
    /// Units: seconds
    pub fn max_travel_s(&self, direction: Direction) -> f64 {
        self.max_travel_s[direction.index()]
    }

    /// Check the joint's calibration invariants.
    fn validate(&self) -> Result<(), JointsError> {
        for &pulse_us in &[self.neutral_pulse_us, self.hold_pulse_us] {
            if pulse_us < self.pulse_min_us
                || pulse_us > self.pulse_max_us
                || pulse_us > PWM_PERIOD_US
            {
                return Err(JointsError::PulseOutsideWindow {
                    joint: self.id,
                    pulse_us,
                    min_us: self.pulse_min_us,
                    max_us: self.pulse_max_us,
                });
            }
        }

        if self.max_travel_s.iter().any(|&t| t <= 0.0) {
            return Err(JointsError::InvalidTravelCeiling(self.id));
        }

        Ok(())
    }
}

impl JointRegistry {
    /// Build the registry from the joint parameters and the persisted
    /// calibration profile.
    ///
    /// Joints missing from the profile fall back to their built-in default
    /// neutral/hold pulses. Every substitution is logged and listed in
    /// [`JointRegistry::defaulted`], so that operators are never unknowingly
    /// running uncalibrated joints.
    pub fn load(params: &JointsParams, profile: &CalibProfile) -> Result<Self, JointsError> {
        let mut joints = HashMap::new();
        let mut defaulted = Vec::new();

        for &id in ALL_JOINTS.iter() {
            let joint_params = params.get(id);

            let (neutral_pulse_us, hold_pulse_us) = match profile.get(id.name()) {
                Some(calib) => (
                    calib.pulso_neutral as f64,
                    calib.pulso_hold.unwrap_or(calib.pulso_neutral) as f64,
                ),
                None => {
                    warn!(
                        "No calibration entry for joint {:?}, using built-in defaults \
                         (neutral {}us, hold {}us)",
                        id, joint_params.default_neutral_us, joint_params.default_hold_us
                    );
                    defaulted.push(id);
                    (joint_params.default_neutral_us, joint_params.default_hold_us)
                }
            };

            let joint = Joint {
                id,
                channel: joint_params.channel,
                neutral_pulse_us,
                hold_pulse_us,
                direction_sign: joint_params.direction_sign,
                speed_range_us: joint_params.speed_range_us,
                max_travel_s: joint_params.max_travel_s,
                pulse_min_us: joint_params.pulse_min_us,
                pulse_max_us: joint_params.pulse_max_us,
            };

            joint.validate()?;

            info!(
                "Joint {:?}: channel {}, neutral {}us, hold {}us, sign {:+}",
                id, joint.channel, joint.neutral_pulse_us, joint.hold_pulse_us, joint.direction_sign
            );

            joints.insert(id, joint);
        }

        Ok(Self { joints, defaulted })
    }

    /// Get a joint by ID, failing fast on unknown joints.
    pub fn get(&self, id: JointId) -> Result<&Joint, JointsError> {
        self.joints
            .get(&id)
            .ok_or_else(|| JointsError::UnknownJoint(format!("{:?}", id)))
    }

    /// Get a joint by its wire name.
    pub fn get_by_name(&self, name: &str) -> Result<&Joint, JointsError> {
        match JointId::from_name(name) {
            Some(id) => self.get(id),
            None => Err(JointsError::UnknownJoint(name.to_string())),
        }
    }

    /// Joints which fell back to built-in default calibration.
    pub fn defaulted(&self) -> &[JointId] {
        &self.defaulted
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_profile_uses_defaults() {
        let registry =
            JointRegistry::load(&JointsParams::default(), &CalibProfile::empty()).unwrap();

        // Every joint must be present with the documented built-in defaults,
        // and every substitution must be observable
        assert_eq!(registry.defaulted().len(), NUM_JOINTS);

        let shoulder = registry.get(JointId::Shoulder).unwrap();
        assert_eq!(shoulder.channel, 0);
        assert_eq!(shoulder.neutral_pulse_us, 1700.0);
        assert_eq!(shoulder.hold_pulse_us, 1700.0);

        let elbow = registry.get(JointId::Elbow).unwrap();
        assert_eq!(elbow.neutral_pulse_us, 1720.0);
        assert_eq!(elbow.hold_pulse_us, 1850.0);
    }

    #[test]
    fn test_profile_overrides_defaults() {
        let json = r#"{
            "shoulder": { "pulso_neutral": 1650, "pulso_hold": 1680 },
            "wrist": { "pulso_neutral": 1600 }
        }"#;
        let profile = CalibProfile::from_json(json).unwrap();

        let registry = JointRegistry::load(&JointsParams::default(), &profile).unwrap();

        let shoulder = registry.get(JointId::Shoulder).unwrap();
        assert_eq!(shoulder.neutral_pulse_us, 1650.0);
        assert_eq!(shoulder.hold_pulse_us, 1680.0);

        // Hold defaults to neutral when absent from the entry
        let wrist = registry.get(JointId::Wrist).unwrap();
        assert_eq!(wrist.neutral_pulse_us, 1600.0);
        assert_eq!(wrist.hold_pulse_us, 1600.0);

        // Only the uncovered joints are flagged
        assert_eq!(
            registry.defaulted(),
            &[JointId::Elbow, JointId::Gripper]
        );
    }

    #[test]
    fn test_unknown_joint_name_rejected() {
        let registry =
            JointRegistry::load(&JointsParams::default(), &CalibProfile::empty()).unwrap();

        assert!(matches!(
            registry.get_by_name("nonexistent"),
            Err(JointsError::UnknownJoint(_))
        ));
    }

    #[test]
    fn test_invalid_calibration_rejected() {
        // Neutral pulse outside the joint's pulse window must not load
        let json = r#"{ "shoulder": { "pulso_neutral": 9000 } }"#;
        let profile = CalibProfile::from_json(json).unwrap();

        assert!(matches!(
            JointRegistry::load(&JointsParams::default(), &profile),
            Err(JointsError::PulseOutsideWindow { .. })
        ));
    }
}
