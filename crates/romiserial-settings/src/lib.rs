//! RomiSerial Settings Crate
//!
//! Loads the rover's controller settings (drive train, motor driver, and
//! serial session) from JSON or TOML files and turns them into the
//! configuration values the controllers expect.

pub mod config;
pub mod error;

pub use config::{
    BrushMotorDriverSettings, ControllerSettings, NavigationSettings, RoverSettings,
    SessionSettings,
};
pub use error::{SettingsError, SettingsResult};
