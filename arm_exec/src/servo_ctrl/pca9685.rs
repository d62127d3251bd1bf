//! [`ServoDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, trace};
use pwm_pca9685::{Channel, Pca9685};

use super::{pulse_to_duty, ServoDriver, ServoError, PWM_PERIOD_US};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Full scale duty value of the PCA9685's 12 bit counter.
pub const DUTY_FULL_SCALE: u16 = 4096;

/// Frequency of the PCA9685's internal oscillator.
///
/// Units: hertz
const OSC_CLOCK_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Driver for the PCA9685 board, owning the device handle for the process
/// lifetime.
///
/// The device is configured for servo operation (50 Hz) at construction and
/// put back to sleep on [`ServoDriver::shutdown`] or drop.
pub struct Pca9685Driver<I2C, E>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    pca: Pca9685<I2C>,

    _marker: std::marker::PhantomData<E>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Pca9685Driver<I2C, E>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Acquire the PCA9685 on the given bus and configure it for servo
    /// operation at the fixed PWM frequency.
    pub fn new(i2c: I2C, address: u8, frequency_hz: f64) -> Result<Self, ServoError> {
        let mut pca = Pca9685::new(i2c, address).map_err(|_| ServoError::I2c)?;

        // prescale = osc / (counter_range * update_rate) - 1, per the datasheet
        let prescale = (OSC_CLOCK_HZ / (DUTY_FULL_SCALE as f64 * frequency_hz) - 1.0).round();

        pca.set_prescale(prescale as u8).map_err(|_| ServoError::I2c)?;
        pca.enable().map_err(|_| ServoError::I2c)?;

        debug!(
            "PCA9685 initialised at address 0x{:02X} (prescale {})",
            address, prescale
        );

        Ok(Self {
            pca,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<I2C, E> ServoDriver for Pca9685Driver<I2C, E>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    fn set_pulse_us(&mut self, channel: u8, pulse_us: f64) -> Result<(), ServoError> {
        let channel = channel_from_index(channel)?;

        let duty = pulse_to_duty(pulse_us, PWM_PERIOD_US, DUTY_FULL_SCALE)?;

        trace!("set_pulse_us: {:?} <- {}us (duty {})", channel, pulse_us, duty);

        match self.pca.set_channel_on_off(channel, 0, duty) {
            Ok(_) => Ok(()),
            Err(pwm_pca9685::Error::I2C(_)) => Err(ServoError::I2c),
            Err(pwm_pca9685::Error::InvalidInputData) => Err(ServoError::InvalidPulse {
                pulse_us,
                period_us: PWM_PERIOD_US,
            }),
        }
    }

    fn shutdown(&mut self) -> Result<(), ServoError> {
        // Putting the device to sleep stops all PWM output
        self.pca.disable().map_err(|_| ServoError::I2c)
    }
}

impl<I2C, E> Drop for Pca9685Driver<I2C, E>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    fn drop(&mut self) {
        // Release is best-effort here, shutdown() is the reporting path
        self.pca.disable().ok();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Map a channel index onto the driver's channel type.
fn channel_from_index(index: u8) -> Result<Channel, ServoError> {
    Ok(match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        i => return Err(ServoError::InvalidChannel(i)),
    })
}
