//! # Arm Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::joints::JointsParams;
use crate::stepper_ctrl::StepperParams;
use crate::track::TrackParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ArmExecParams {
    /// Endpoint for the command socket.
    pub command_endpoint: String,

    /// Path of the persisted calibration profile, relative to the software
    /// root.
    #[serde(default = "default_calib_file")]
    pub calib_file: String,

    /// I2C address of the PCA9685 board.
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,

    /// Per-joint build parameters.
    #[serde(default)]
    pub joints: JointsParams,

    /// Translation axis parameters.
    #[serde(default)]
    pub stepper: StepperParams,

    /// Tracking parameters, consumed by the autonomous mode.
    #[serde(default)]
    pub track: TrackParams,
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_calib_file() -> String {
    "params/calibracion_servos.json".into()
}

fn default_i2c_address() -> u8 {
    0x40
}
