//! Parameters structures for the joint registry

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::JointId;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Static (non-calibrated) parameters for every joint.
///
/// Unlike the calibration profile these describe the mechanical build of the
/// arm - which channel a joint is wired to, its polarity, and how long it may
/// travel before hitting a mechanical stop - and change only when the arm is
/// rebuilt.
#[derive(Debug, Deserialize)]
pub struct JointsParams {
    #[serde(default = "default_shoulder")]
    pub shoulder: JointParams,

    #[serde(default = "default_elbow")]
    pub elbow: JointParams,

    #[serde(default = "default_wrist")]
    pub wrist: JointParams,

    #[serde(default = "default_gripper")]
    pub gripper: JointParams,
}

/// Static parameters for a single joint.
#[derive(Debug, Clone, Deserialize)]
pub struct JointParams {
    /// Channel index on the PWM driver board (0-15).
    pub channel: u8,

    /// Polarity: +1 if counterclockwise increases pulse width, -1 otherwise.
    pub direction_sign: f64,

    /// Pulse offset from neutral at speed factor 1.0.
    ///
    /// Units: microseconds
    #[serde(default = "default_speed_range_us")]
    pub speed_range_us: f64,

    /// Travel-time ceilings per direction, `[clockwise, counterclockwise]`.
    ///
    /// Units: seconds
    pub max_travel_s: [f64; 2],

    /// Valid pulse window for this joint.
    ///
    /// Units: microseconds
    #[serde(default = "default_pulse_min_us")]
    pub pulse_min_us: f64,

    /// Units: microseconds
    #[serde(default = "default_pulse_max_us")]
    pub pulse_max_us: f64,

    /// Fallback neutral pulse used when the calibration profile has no entry
    /// for this joint.
    ///
    /// Units: microseconds
    pub default_neutral_us: f64,

    /// Fallback hold pulse used when the calibration profile has no entry
    /// for this joint.
    ///
    /// Units: microseconds
    pub default_hold_us: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointsParams {
    /// The parameters for the given joint.
    pub fn get(&self, id: JointId) -> &JointParams {
        match id {
            JointId::Shoulder => &self.shoulder,
            JointId::Elbow => &self.elbow,
            JointId::Wrist => &self.wrist,
            JointId::Gripper => &self.gripper,
        }
    }
}

impl Default for JointsParams {
    fn default() -> Self {
        Self {
            shoulder: default_shoulder(),
            elbow: default_elbow(),
            wrist: default_wrist(),
            gripper: default_gripper(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

// Built-in defaults matching the shipped arm's wiring and last known good
// calibration. The wrist is mounted mirrored, hence the inverted sign.

fn default_shoulder() -> JointParams {
    JointParams {
        channel: 0,
        direction_sign: -1.0,
        speed_range_us: default_speed_range_us(),
        max_travel_s: [2.5, 2.5],
        pulse_min_us: default_pulse_min_us(),
        pulse_max_us: default_pulse_max_us(),
        default_neutral_us: 1700.0,
        default_hold_us: 1700.0,
    }
}

fn default_elbow() -> JointParams {
    JointParams {
        channel: 1,
        direction_sign: -1.0,
        speed_range_us: default_speed_range_us(),
        max_travel_s: [3.5, 3.5],
        pulse_min_us: default_pulse_min_us(),
        pulse_max_us: default_pulse_max_us(),
        default_neutral_us: 1720.0,
        default_hold_us: 1850.0,
    }
}

fn default_wrist() -> JointParams {
    JointParams {
        channel: 2,
        direction_sign: 1.0,
        speed_range_us: default_speed_range_us(),
        max_travel_s: [3.0, 3.0],
        pulse_min_us: default_pulse_min_us(),
        pulse_max_us: default_pulse_max_us(),
        default_neutral_us: 1682.0,
        default_hold_us: 1800.0,
    }
}

fn default_gripper() -> JointParams {
    JointParams {
        channel: 3,
        direction_sign: -1.0,
        speed_range_us: default_speed_range_us(),
        max_travel_s: [1.5, 1.5],
        pulse_min_us: default_pulse_min_us(),
        pulse_max_us: default_pulse_max_us(),
        default_neutral_us: 1690.0,
        default_hold_us: 1690.0,
    }
}

fn default_speed_range_us() -> f64 {
    500.0
}

fn default_pulse_min_us() -> f64 {
    500.0
}

fn default_pulse_max_us() -> f64 {
    2500.0
}
