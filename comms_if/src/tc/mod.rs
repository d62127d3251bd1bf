//! # Telecommand module
//!
//! This module provides the command grammar shared by every client of the arm
//! executable (the command line client and any web-facing surface). Commands
//! are serialized as JSON and sent over a REQ socket; the arm executable
//! answers every command with an [`ArmResponse`].
//!
//! Validation of the externally-supplied motion parameters happens here,
//! before a command is ever forwarded to the hardware-facing layers.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use structopt::StructOpt;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Minimum duration a remote caller may request for a timed move.
pub const MIN_MOVE_DURATION_S: f64 = 0.1;

/// Maximum duration a remote caller may request for a timed move.
pub const MAX_MOVE_DURATION_S: f64 = 5.0;

/// Maximum distance a remote caller may request for a horizontal translation.
pub const MAX_TRANSLATE_MM: f64 = 500.0;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command that can be executed by the arm.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt)]
pub enum ArmCmd {
    /// Move a joint in a direction for a duration at a speed factor.
    #[structopt(name = "move")]
    Move {
        /// Name of the joint to move (shoulder, elbow, wrist, gripper).
        joint: String,

        /// Direction of travel: 1 or -1.
        #[structopt(allow_hyphen_values = true)]
        direction: i8,

        /// Duration of travel in seconds, between 0.1 and 5.0.
        duration_s: f64,

        /// Speed factor between 0.0 and 1.0.
        #[structopt(default_value = "0.5")]
        speed: f64,
    },

    /// Stop a single joint, applying its hold pulse.
    #[structopt(name = "stop")]
    Stop {
        /// Name of the joint to stop.
        joint: String,
    },

    /// Stop every joint immediately. This is the emergency stop entry point.
    #[structopt(name = "stop-all")]
    StopAll,

    /// Open the gripper for the fixed grasp duration.
    #[structopt(name = "grasp")]
    Grasp,

    /// Close the gripper for the fixed release duration.
    #[structopt(name = "release")]
    Release,

    /// Translate the arm horizontally on the stepper axis.
    #[structopt(name = "translate")]
    Translate {
        /// Direction of travel: 1 or -1.
        #[structopt(allow_hyphen_values = true)]
        direction: i8,

        /// Distance to travel in millimeters.
        distance_mm: f64,
    },

    /// Zero the per-joint travel-time odometry.
    #[structopt(name = "reset-odometry")]
    ResetOdometry,

    /// Report the per-joint accumulated travel time.
    #[structopt(name = "status")]
    Status,
}

/// Response from the arm executable to an [`ArmCmd`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArmResponse {
    /// The command was executed. For timed moves `applied_s` carries the
    /// duration actually driven after the travel-time ceiling was applied.
    CmdOk { applied_s: Option<f64> },

    /// The command was rejected before touching hardware.
    CmdRejected { reason: String },

    /// The command reached the hardware but actuation failed.
    CmdFailed { reason: String },

    /// Per-joint accumulated travel time in signed seconds.
    Positions { seconds: HashMap<String, f64> },
}

/// Possible validation errors for an [`ArmCmd`].
#[derive(Debug, Error, PartialEq)]
pub enum CmdValidationError {
    #[error("Direction must be 1 or -1, got {0}")]
    InvalidDirection(i8),

    #[error(
        "Duration must be between {MIN_MOVE_DURATION_S} and {MAX_MOVE_DURATION_S} seconds, \
         got {0}"
    )]
    InvalidDuration(f64),

    #[error("Speed factor must be between 0.0 and 1.0, got {0}")]
    InvalidSpeed(f64),

    #[error("Distance must be between 0 and {MAX_TRANSLATE_MM} mm, got {0}")]
    InvalidDistance(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmCmd {
    /// Validate the externally-supplied parameters of this command.
    ///
    /// Commands failing validation must be reported back to the caller as
    /// rejected requests and never forwarded to the hardware.
    pub fn validate(&self) -> Result<(), CmdValidationError> {
        match *self {
            ArmCmd::Move {
                direction,
                duration_s,
                speed,
                ..
            } => {
                if direction != 1 && direction != -1 {
                    return Err(CmdValidationError::InvalidDirection(direction));
                }
                if !duration_s.is_finite()
                    || duration_s < MIN_MOVE_DURATION_S
                    || duration_s > MAX_MOVE_DURATION_S
                {
                    return Err(CmdValidationError::InvalidDuration(duration_s));
                }
                if !speed.is_finite() || speed < 0.0 || speed > 1.0 {
                    return Err(CmdValidationError::InvalidSpeed(speed));
                }
                Ok(())
            }
            ArmCmd::Translate {
                direction,
                distance_mm,
            } => {
                if direction != 1 && direction != -1 {
                    return Err(CmdValidationError::InvalidDirection(direction));
                }
                if !distance_mm.is_finite() || distance_mm <= 0.0 || distance_mm > MAX_TRANSLATE_MM
                {
                    return Err(CmdValidationError::InvalidDistance(distance_mm));
                }
                Ok(())
            }
            // Stop commands are always acceptable: rejecting a stop is worse
            // than accepting an odd one.
            _ => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn mv(direction: i8, duration_s: f64, speed: f64) -> ArmCmd {
        ArmCmd::Move {
            joint: "shoulder".into(),
            direction,
            duration_s,
            speed,
        }
    }

    #[test]
    fn test_move_validation() {
        assert!(mv(1, 1.0, 0.5).validate().is_ok());
        assert!(mv(-1, 0.1, 0.0).validate().is_ok());
        assert!(mv(-1, 5.0, 1.0).validate().is_ok());

        assert_eq!(
            mv(0, 1.0, 0.5).validate(),
            Err(CmdValidationError::InvalidDirection(0))
        );
        assert_eq!(
            mv(2, 1.0, 0.5).validate(),
            Err(CmdValidationError::InvalidDirection(2))
        );
        assert_eq!(
            mv(1, 0.05, 0.5).validate(),
            Err(CmdValidationError::InvalidDuration(0.05))
        );
        assert_eq!(
            mv(1, 6.0, 0.5).validate(),
            Err(CmdValidationError::InvalidDuration(6.0))
        );
        assert_eq!(
            mv(1, 1.0, 1.5).validate(),
            Err(CmdValidationError::InvalidSpeed(1.5))
        );
        assert!(mv(1, f64::NAN, 0.5).validate().is_err());
    }

    #[test]
    fn test_translate_validation() {
        assert!(ArmCmd::Translate {
            direction: 1,
            distance_mm: 50.0
        }
        .validate()
        .is_ok());

        assert!(ArmCmd::Translate {
            direction: 0,
            distance_mm: 50.0
        }
        .validate()
        .is_err());

        assert!(ArmCmd::Translate {
            direction: -1,
            distance_mm: 600.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_stops_always_valid() {
        assert!(ArmCmd::StopAll.validate().is_ok());
        assert!(ArmCmd::Stop {
            joint: "gripper".into()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_wire_roundtrip() {
        let cmd = mv(-1, 2.5, 0.75);
        let json = serde_json::to_string(&cmd).unwrap();
        let back: ArmCmd = serde_json::from_str(&json).unwrap();
        match back {
            ArmCmd::Move {
                direction,
                duration_s,
                ..
            } => {
                assert_eq!(direction, -1);
                assert_eq!(duration_s, 2.5);
            }
            _ => panic!("Wrong command deserialized"),
        }
    }
}
