//! # Stepper Controller Module
//!
//! Driver for the horizontal translation axis, a lead-screw stepper behind a
//! step/direction interface (TMC2208). Unlike the servos the stepper is
//! position-stepped rather than timed, so it keeps a true step counter; it is
//! still driven by blocking waits, one per step pulse, in line with the
//! actuation model of the rest of the software.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use embedded_hal::digital::v2::OutputPin;
use log::{debug, trace};
use serde::Deserialize;
use std::time::Duration;

// Internal
use crate::motion::Direction;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for the translation axis.
///
/// The facade holds at most one implementor; when the arm is built without
/// the stepper fitted no implementor exists and translation requests are
/// rejected at the facade.
pub trait StepperDriver {
    /// Energise the motor. Must be called before stepping.
    fn enable(&mut self) -> Result<(), StepperError>;

    /// De-energise the motor, letting the axis spin freely.
    fn disable(&mut self) -> Result<(), StepperError>;

    /// Step the motor `steps` times in the given direction at `rate_sps`
    /// steps per second, blocking until complete.
    fn move_steps(&mut self, steps: u32, direction: Direction, rate_sps: f64)
        -> Result<(), StepperError>;

    /// Move the carriage a distance along the lead screw, blocking until
    /// complete. Returns the number of steps taken.
    fn move_distance_mm(
        &mut self,
        distance_mm: f64,
        direction: Direction,
        rate_sps: f64,
    ) -> Result<u32, StepperError>;

    /// Net signed step count since construction.
    fn position_steps(&self) -> i64;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum StepperError {
    #[error("A GPIO error occured while driving the stepper")]
    Gpio,

    #[error("Step rate {0} steps/s is not a positive finite rate")]
    InvalidRate(f64),

    #[error("Distance {0}mm is not a positive finite distance")]
    InvalidDistance(f64),

    #[error("Cannot step with direction Stop")]
    NoDirection,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters describing the stepper axis build.
#[derive(Debug, Clone, Deserialize)]
pub struct StepperParams {
    /// Whether the stepper axis is fitted at all.
    pub enabled: bool,

    /// BCM pin numbers for the step/direction/enable lines. The enable line
    /// is optional (some driver boards strap it permanently).
    pub step_pin: u8,
    pub dir_pin: u8,
    pub enable_pin: Option<u8>,

    /// Full steps per motor revolution, before microstepping.
    #[serde(default = "default_steps_per_rev")]
    pub steps_per_rev: u32,

    /// Microstep setting on the driver board.
    #[serde(default = "default_microsteps")]
    pub microsteps: u32,

    /// Carriage travel per lead screw revolution.
    ///
    /// Units: millimeters
    #[serde(default = "default_lead_screw_pitch_mm")]
    pub lead_screw_pitch_mm: f64,

    /// Default step rate for translation commands.
    ///
    /// Units: steps/second
    #[serde(default = "default_rate_sps")]
    pub rate_sps: f64,
}

/// Step/direction bit-bang driver over GPIO output pins.
pub struct GpioStepper<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    step: STEP,
    dir: DIR,

    /// Enable line, active low.
    enable: Option<EN>,

    params: StepperParams,

    position_steps: i64,
}

/// A stepper driver which records commands instead of touching hardware.
/// Used off-target and by the unit tests.
#[derive(Default)]
pub struct SimStepper {
    params: Option<StepperParams>,
    position_steps: i64,
    enabled: bool,

    /// Every accepted move, in order, as `(steps, direction, rate_sps)`.
    moves: Vec<(u32, Direction, f64)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StepperParams {
    /// Steps per output revolution, including microstepping.
    pub fn steps_per_output_rev(&self) -> u32 {
        self.steps_per_rev * self.microsteps
    }

    /// Convert a carriage distance to a step count.
    pub fn distance_to_steps(&self, distance_mm: f64) -> u32 {
        ((distance_mm / self.lead_screw_pitch_mm) * self.steps_per_output_rev() as f64) as u32
    }
}

impl Default for StepperParams {
    fn default() -> Self {
        // Wiring of the shipped arm: step 17, dir 18, enable 19 (BCM)
        Self {
            enabled: false,
            step_pin: 17,
            dir_pin: 18,
            enable_pin: Some(19),
            steps_per_rev: default_steps_per_rev(),
            microsteps: default_microsteps(),
            lead_screw_pitch_mm: default_lead_screw_pitch_mm(),
            rate_sps: default_rate_sps(),
        }
    }
}

impl<STEP, DIR, EN> GpioStepper<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// Create a new driver over already-acquired output pins.
    pub fn new(step: STEP, dir: DIR, enable: Option<EN>, params: StepperParams) -> Self {
        Self {
            step,
            dir,
            enable,
            params,
            position_steps: 0,
        }
    }
}

impl<STEP, DIR, EN> StepperDriver for GpioStepper<STEP, DIR, EN>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    fn enable(&mut self) -> Result<(), StepperError> {
        if let Some(ref mut pin) = self.enable {
            pin.set_low().map_err(|_| StepperError::Gpio)?;
        }
        Ok(())
    }

    fn disable(&mut self) -> Result<(), StepperError> {
        if let Some(ref mut pin) = self.enable {
            pin.set_high().map_err(|_| StepperError::Gpio)?;
        }
        Ok(())
    }

    fn move_steps(
        &mut self,
        steps: u32,
        direction: Direction,
        rate_sps: f64,
    ) -> Result<(), StepperError> {
        let signed_steps = validate_move(steps, direction, rate_sps)?;

        match direction {
            Direction::Ccw => self.dir.set_high().map_err(|_| StepperError::Gpio)?,
            Direction::Cw => self.dir.set_low().map_err(|_| StepperError::Gpio)?,
            Direction::Stop => unreachable!(),
        }

        debug!(
            "Stepper: {} steps (dir {:+}) at {} steps/s",
            steps,
            direction.as_i8(),
            rate_sps
        );

        let half_period = Duration::from_secs_f64(0.5 / rate_sps);

        for _ in 0..steps {
            self.step.set_high().map_err(|_| StepperError::Gpio)?;
            std::thread::sleep(half_period);
            self.step.set_low().map_err(|_| StepperError::Gpio)?;
            std::thread::sleep(half_period);
        }

        self.position_steps += signed_steps;

        Ok(())
    }

    fn move_distance_mm(
        &mut self,
        distance_mm: f64,
        direction: Direction,
        rate_sps: f64,
    ) -> Result<u32, StepperError> {
        if !distance_mm.is_finite() || distance_mm <= 0.0 {
            return Err(StepperError::InvalidDistance(distance_mm));
        }

        let steps = self.params.distance_to_steps(distance_mm);
        self.move_steps(steps, direction, rate_sps)?;

        Ok(steps)
    }

    fn position_steps(&self) -> i64 {
        self.position_steps
    }
}

impl SimStepper {
    pub fn new(params: StepperParams) -> Self {
        Self {
            params: Some(params),
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn moves(&self) -> &[(u32, Direction, f64)] {
        &self.moves
    }

    fn params(&self) -> StepperParams {
        self.params.clone().unwrap_or_default()
    }
}

impl StepperDriver for SimStepper {
    fn enable(&mut self) -> Result<(), StepperError> {
        self.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), StepperError> {
        self.enabled = false;
        Ok(())
    }

    fn move_steps(
        &mut self,
        steps: u32,
        direction: Direction,
        rate_sps: f64,
    ) -> Result<(), StepperError> {
        let signed_steps = validate_move(steps, direction, rate_sps)?;

        trace!(
            "sim stepper: {} steps (dir {:+}) at {} steps/s",
            steps,
            direction.as_i8(),
            rate_sps
        );

        self.moves.push((steps, direction, rate_sps));
        self.position_steps += signed_steps;

        Ok(())
    }

    fn move_distance_mm(
        &mut self,
        distance_mm: f64,
        direction: Direction,
        rate_sps: f64,
    ) -> Result<u32, StepperError> {
        if !distance_mm.is_finite() || distance_mm <= 0.0 {
            return Err(StepperError::InvalidDistance(distance_mm));
        }

        let steps = self.params().distance_to_steps(distance_mm);
        self.move_steps(steps, direction, rate_sps)?;

        Ok(steps)
    }

    fn position_steps(&self) -> i64 {
        self.position_steps
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check a step command and return its signed step count.
fn validate_move(steps: u32, direction: Direction, rate_sps: f64) -> Result<i64, StepperError> {
    if direction == Direction::Stop {
        return Err(StepperError::NoDirection);
    }
    if !rate_sps.is_finite() || rate_sps <= 0.0 {
        return Err(StepperError::InvalidRate(rate_sps));
    }
    Ok(steps as i64 * direction.as_i8() as i64)
}

fn default_steps_per_rev() -> u32 {
    200
}

fn default_microsteps() -> u32 {
    16
}

fn default_lead_screw_pitch_mm() -> f64 {
    8.0
}

fn default_rate_sps() -> f64 {
    1000.0
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distance_to_steps() {
        let params = StepperParams::default();

        // 200 full steps * 16 microsteps = 3200 steps per rev, 8mm pitch:
        // one full revolution moves the carriage 8mm
        assert_eq!(params.steps_per_output_rev(), 3200);
        assert_eq!(params.distance_to_steps(8.0), 3200);
        assert_eq!(params.distance_to_steps(4.0), 1600);
        assert_eq!(params.distance_to_steps(50.0), 20000);
    }

    #[test]
    fn test_position_counts_signed_steps() {
        let mut stepper = SimStepper::new(StepperParams::default());

        stepper.move_steps(100, Direction::Ccw, 1000.0).unwrap();
        assert_eq!(stepper.position_steps(), 100);

        stepper.move_steps(40, Direction::Cw, 1000.0).unwrap();
        assert_eq!(stepper.position_steps(), 60);
    }

    #[test]
    fn test_move_distance_reports_steps() {
        let mut stepper = SimStepper::new(StepperParams::default());

        let steps = stepper
            .move_distance_mm(8.0, Direction::Ccw, 1000.0)
            .unwrap();

        assert_eq!(steps, 3200);
        assert_eq!(stepper.position_steps(), 3200);
    }

    #[test]
    fn test_invalid_moves_rejected() {
        let mut stepper = SimStepper::new(StepperParams::default());

        assert!(matches!(
            stepper.move_steps(100, Direction::Stop, 1000.0),
            Err(StepperError::NoDirection)
        ));
        assert!(matches!(
            stepper.move_steps(100, Direction::Ccw, 0.0),
            Err(StepperError::InvalidRate(_))
        ));
        assert!(matches!(
            stepper.move_distance_mm(-5.0, Direction::Ccw, 1000.0),
            Err(StepperError::InvalidDistance(_))
        ));

        assert!(stepper.moves().is_empty());
        assert_eq!(stepper.position_steps(), 0);
    }
}
