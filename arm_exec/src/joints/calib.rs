//! Persisted servo calibration profile
//!
//! The calibration scripts write a JSON file mapping joint names to the
//! pulses learned for that specific physical unit. The file uses the
//! `pulso_neutral`/`pulso_hold` key names those scripts established, which
//! are therefore part of the external interface.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Calibrated pulses for one servo.
#[derive(Debug, Clone, Deserialize)]
pub struct ServoCalib {
    /// Pulse width yielding zero rotation for this unit.
    ///
    /// Units: microseconds
    pub pulso_neutral: u32,

    /// Pulse width applied at rest, defaults to `pulso_neutral` if absent.
    ///
    /// Units: microseconds
    pub pulso_hold: Option<u32>,
}

/// The persisted calibration profile, keyed by joint name.
#[derive(Debug, Default)]
pub struct CalibProfile {
    servos: HashMap<String, ServoCalib>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An error that occurs while loading a calibration profile.
///
/// Note that a *missing* profile is not an error - the registry falls back
/// to built-in defaults so the system stays operable (degraded). A profile
/// that exists but cannot be parsed is an error: silently defaulting over
/// corrupt calibration could command uncalibrated pulses.
#[derive(Debug, Error)]
pub enum CalibError {
    #[error("Cannot read the calibration file: {0}")]
    FileReadError(std::io::Error),

    #[error("Cannot parse the calibration file: {0}")]
    ParseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CalibProfile {
    /// An empty profile, as used when no calibration has been persisted yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the profile from a JSON file.
    ///
    /// A missing file yields the empty profile (logged, so the fallback is
    /// observable); any other read or parse failure is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibError> {
        let path = path.as_ref();

        let json = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Calibration file {:?} not found, all joints will use built-in defaults",
                    path
                );
                return Ok(Self::empty());
            }
            Err(e) => return Err(CalibError::FileReadError(e)),
        };

        Self::from_json(&json)
    }

    /// Parse a profile from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CalibError> {
        let servos: HashMap<String, ServoCalib> =
            serde_json::from_str(json).map_err(CalibError::ParseError)?;

        Ok(Self { servos })
    }

    /// The calibration entry for the given joint name, if present.
    pub fn get(&self, name: &str) -> Option<&ServoCalib> {
        self.servos.get(name)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_profile() {
        let profile = CalibProfile::from_json(
            r#"{ "elbow": { "pulso_neutral": 1720, "pulso_hold": 1850 } }"#,
        )
        .unwrap();

        let elbow = profile.get("elbow").unwrap();
        assert_eq!(elbow.pulso_neutral, 1720);
        assert_eq!(elbow.pulso_hold, Some(1850));
        assert!(profile.get("shoulder").is_none());
    }

    #[test]
    fn test_malformed_profile_is_an_error() {
        assert!(matches!(
            CalibProfile::from_json(r#"{ "elbow": { "neutral": "oops" } }"#),
            Err(CalibError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_empty_profile() {
        let profile = CalibProfile::load("/nonexistent/calibracion_servos.json").unwrap();
        assert!(profile.get("shoulder").is_none());
    }
}
