//! # Arm Control Library
//!
//! Library backing the arm control executable. The control chain is, from
//! the hardware up:
//!
//! - [`servo_ctrl`] - the single hardware write path: pulse width to duty
//!   cycle encoding and the PWM driver board abstraction.
//! - [`joints`] - per-joint calibration (channel, neutral/hold pulses,
//!   polarity, travel-time ceilings) loaded at startup.
//! - [`motion`] - the timed motion engine which turns a motion request into
//!   a drive pulse, a blocking wait, and a hold pulse.
//! - [`arm_ctrl`] - the robot facade every consumer goes through: travel
//!   limit enforcement, odometry accumulation, composite actions.
//! - [`stepper_ctrl`] - optional stepper driver for horizontal translation.
//! - [`track`] - the detection-driven centering module consumed by the
//!   autonomous mode.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod arm_ctrl;
pub mod arm_server;
pub mod joints;
pub mod motion;
pub mod params;
pub mod servo_ctrl;
pub mod stepper_ctrl;
pub mod track;
