//! Simulated [`ServoDriver`] implementation
//!
//! Off-target builds and the unit tests use this driver in place of the
//! PCA9685. It validates pulses exactly like the real driver and records
//! every write so that tests can assert on the exact pulse sequence a
//! motion produced.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

use super::{pulse_to_duty, ServoDriver, ServoError, NUM_CHANNELS, PWM_PERIOD_US};
use crate::servo_ctrl::pca9685::DUTY_FULL_SCALE;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A servo driver which records writes instead of touching hardware.
#[derive(Default)]
pub struct SimDriver {
    /// Every accepted write, in order, as `(channel, pulse_us)`.
    writes: Vec<(u8, f64)>,

    /// Whether the device handle has been released.
    shut_down: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of accepted hardware writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// The last pulse applied to the given channel, if any.
    pub fn last_pulse_us(&self, channel: u8) -> Option<f64> {
        self.writes
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, p)| *p)
    }

    /// All writes made to the given channel, in order.
    pub fn channel_writes(&self, channel: u8) -> Vec<f64> {
        self.writes
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl ServoDriver for SimDriver {
    fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError> {
        if channel >= NUM_CHANNELS {
            return Err(ServoError::InvalidChannel(channel));
        }

        // Same validation path as the real driver
        let duty = pulse_to_duty(pulse_us, PWM_PERIOD_US, DUTY_FULL_SCALE)?;

        trace!(
            "sim set_pulse_us: channel {} <- {}us (duty {})",
            channel,
            pulse_us,
            duty
        );

        self.writes.push((channel, pulse_us));

        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), ServoError> {
        self.shut_down = true;
        Ok(())
    }
}
