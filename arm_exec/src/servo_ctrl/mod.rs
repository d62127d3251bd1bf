//! # Servo Controller Module
//!
//! This module provides the single hardware write path for the arm's servos:
//! the pure pulse-width to duty-cycle encoding, and the [`ServoDriver`] trait
//! which abstracts over PWM driver boards. Every higher layer routes its
//! writes through one [`ServoDriver`] instance; no second code path may touch
//! the device, since uncoordinated writes would produce conflicting commands.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

/// Simulated [`ServoDriver`] used off-target and by the unit tests.
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use sim::SimDriver;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// PWM frequency the servos are driven at.
pub const PWM_FREQUENCY_HZ: f64 = 50.0;

/// PWM period corresponding to [`PWM_FREQUENCY_HZ`].
///
/// Units: microseconds
pub const PWM_PERIOD_US: f64 = 1_000_000.0 / PWM_FREQUENCY_HZ;

/// Number of channels on the driver board.
pub const NUM_CHANNELS: u8 = 16;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
///
/// Implementors own the device handle for the lifetime of the process. The
/// handle is released by [`ServoDriver::shutdown`], and implementors shall
/// also release it on drop so that every exit path leaves the device free.
pub trait ServoDriver {
    /// Apply a pulse width to a channel.
    ///
    /// This is the system's sole point of physical actuation: every call has
    /// an immediate physical effect on whatever is connected to the channel.
    ///
    /// ## Arguments
    /// - `channel` - The board channel to drive, `0..NUM_CHANNELS`
    /// - `pulse_us` - The pulse width in microseconds. Must lie within
    ///   `[0, PWM_PERIOD_US]`; values outside this range are rejected rather
    ///   than clamped, since clamping would hide a calibration bug that could
    ///   drive a joint unsafely.
    fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError>;

    /// Release the device, leaving all channels unpowered.
    fn shutdown(&mut self) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Pulse width {pulse_us}us is outside the valid range [0, {period_us}us]")]
    InvalidPulse { pulse_us: f64, period_us: f64 },

    #[error("Channel {0} is not a valid channel (0-15)")]
    InvalidChannel(u8),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Encode a pulse width as a duty-cycle value for a fixed-frequency PWM channel.
///
/// `duty = round(pulse_us / period_us * full_scale)`. Total over
/// `pulse_us ∈ [0, period_us]`; values outside the range are a caller error
/// and propagate upward rather than being clamped.
pub fn pulse_to_duty(pulse_us: f64, period_us: f64, full_scale: u16) -> Result<u16, ServoError> {
    if !pulse_us.is_finite() || pulse_us < 0.0 || pulse_us > period_us {
        return Err(ServoError::InvalidPulse { pulse_us, period_us });
    }

    Ok((pulse_us / period_us * full_scale as f64).round() as u16)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::pca9685::DUTY_FULL_SCALE;

    #[test]
    fn test_pulse_to_duty_exact() {
        // Exact arithmetic round-trip against the encoding formula
        for pulse_us in &[0.0, 1000.0, 1450.0, 1500.0, 1700.0, 1850.0, 2000.0, 20000.0] {
            let expected = (pulse_us / PWM_PERIOD_US * DUTY_FULL_SCALE as f64).round() as u16;
            assert_eq!(
                pulse_to_duty(*pulse_us, PWM_PERIOD_US, DUTY_FULL_SCALE).unwrap(),
                expected
            );
        }

        // Spot values for the 12-bit scale at 50Hz
        assert_eq!(pulse_to_duty(0.0, PWM_PERIOD_US, DUTY_FULL_SCALE).unwrap(), 0);
        assert_eq!(
            pulse_to_duty(1500.0, PWM_PERIOD_US, DUTY_FULL_SCALE).unwrap(),
            307
        );
        assert_eq!(
            pulse_to_duty(20000.0, PWM_PERIOD_US, DUTY_FULL_SCALE).unwrap(),
            4096
        );
    }

    #[test]
    fn test_pulse_to_duty_rejects_out_of_range() {
        assert!(pulse_to_duty(-1.0, PWM_PERIOD_US, DUTY_FULL_SCALE).is_err());
        assert!(pulse_to_duty(20001.0, PWM_PERIOD_US, DUTY_FULL_SCALE).is_err());
        assert!(pulse_to_duty(f64::NAN, PWM_PERIOD_US, DUTY_FULL_SCALE).is_err());
    }
}
