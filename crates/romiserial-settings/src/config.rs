//! Controller settings
//!
//! Mirrors the layout of the rover's configuration file:
//!
//! ```json
//! {
//!   "navigation": {
//!     "rover": { "wheel_diameter": 0.47, "encoder_steps": 16000, "maximum_speed": 3.0 },
//!     "brush-motor-driver": {
//!       "maximum_signal_amplitude": 100,
//!       "use_pid": true,
//!       "pid": { "kp": 0.7, "ki": 0.2, "kd": 0.0 },
//!       "encoder_directions": { "left": -1, "right": 1 }
//!     }
//!   },
//!   "session": { "port": "/dev/ttyACM0" }
//! }
//! ```
//!
//! Unknown sections are ignored, so the full rover configuration file can be
//! loaded as is.

use crate::error::{SettingsError, SettingsResult};
use romiserial_communication::{
    ChecksumMode, EncoderDirections, LinkParams, MotorConfig, PidGains, RetryPolicy, SessionConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Drive train geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoverSettings {
    /// Wheel diameter in metres
    pub wheel_diameter: f64,
    /// Encoder steps per wheel revolution
    pub encoder_steps: f64,
    /// Maximum linear speed in metres per second
    pub maximum_speed: f64,
}

impl Default for RoverSettings {
    fn default() -> Self {
        Self {
            wheel_diameter: 0.47,
            encoder_steps: 16000.0,
            maximum_speed: 3.0,
        }
    }
}

/// Brush motor driver parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushMotorDriverSettings {
    /// Largest raw signal accepted by the driver
    pub maximum_signal_amplitude: i32,
    /// Whether the firmware runs its PID loop
    #[serde(default)]
    pub use_pid: bool,
    /// Speed loop gains
    #[serde(default)]
    pub pid: PidGains,
    /// Encoder polarity
    #[serde(default)]
    pub encoder_directions: EncoderDirections,
}

impl Default for BrushMotorDriverSettings {
    fn default() -> Self {
        Self {
            maximum_signal_amplitude: 100,
            use_pid: false,
            pid: PidGains::default(),
            encoder_directions: EncoderDirections::default(),
        }
    }
}

/// Navigation section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationSettings {
    /// Drive train geometry
    pub rover: RoverSettings,
    /// Motor driver parameters
    #[serde(rename = "brush-motor-driver")]
    pub brush_motor_driver: BrushMotorDriverSettings,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_max_attempts() -> u32 {
    5
}

fn default_reply_timeout_ms() -> u64 {
    1000
}

/// Serial link and transport session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Serial port name
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Attempts per command, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Time allowed for one reply
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Request suffix mode
    #[serde(default)]
    pub checksum: ChecksumMode,
}

impl SessionSettings {
    /// Settings for the given port with default values
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            max_attempts: default_max_attempts(),
            reply_timeout_ms: default_reply_timeout_ms(),
            checksum: ChecksumMode::default(),
        }
    }
}

/// Complete controller settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Navigation section
    pub navigation: NavigationSettings,
    /// Serial session section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSettings>,
}

impl ControllerSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a JSON string
    pub fn from_json_str(content: &str) -> SettingsResult<Self> {
        let settings: Self = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let settings: Self = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("none").to_string(),
                ))
            }
        };

        settings.validate()?;
        tracing::debug!("Loaded controller settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings to a file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("none").to_string(),
                ))
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every value before it reaches a controller
    pub fn validate(&self) -> SettingsResult<()> {
        let rover = &self.navigation.rover;
        for (key, value) in [
            ("navigation.rover.wheel_diameter", rover.wheel_diameter),
            ("navigation.rover.encoder_steps", rover.encoder_steps),
            ("navigation.rover.maximum_speed", rover.maximum_speed),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SettingsError::invalid(key, format!("{} must be > 0", value)));
            }
        }

        let driver = &self.navigation.brush_motor_driver;
        if driver.maximum_signal_amplitude <= 0 {
            return Err(SettingsError::invalid(
                "navigation.brush-motor-driver.maximum_signal_amplitude",
                "must be > 0",
            ));
        }
        let directions = [
            ("left", driver.encoder_directions.left),
            ("right", driver.encoder_directions.right),
        ];
        for (side, direction) in directions {
            if direction != 1 && direction != -1 {
                return Err(SettingsError::invalid(
                    &format!("navigation.brush-motor-driver.encoder_directions.{}", side),
                    format!("{} is not 1 or -1", direction),
                ));
            }
        }

        if let Some(session) = &self.session {
            if session.port.is_empty() {
                return Err(SettingsError::invalid("session.port", "must not be empty"));
            }
            if session.baud_rate == 0 {
                return Err(SettingsError::invalid("session.baud_rate", "must be > 0"));
            }
            if session.max_attempts == 0 {
                return Err(SettingsError::invalid("session.max_attempts", "must be > 0"));
            }
            if session.reply_timeout_ms == 0 {
                return Err(SettingsError::invalid(
                    "session.reply_timeout_ms",
                    "must be > 0",
                ));
            }
        }

        Ok(())
    }

    /// Motor controller configuration
    pub fn motor_config(&self) -> MotorConfig {
        let rover = &self.navigation.rover;
        let driver = &self.navigation.brush_motor_driver;
        MotorConfig {
            encoder_steps: rover.encoder_steps,
            wheel_diameter: rover.wheel_diameter,
            max_speed: rover.maximum_speed,
            max_signal: driver.maximum_signal_amplitude,
            use_pid: driver.use_pid,
            pid: driver.pid,
            encoder_directions: driver.encoder_directions,
        }
    }

    /// Serial link parameters, from the session section
    pub fn link_params(&self) -> SettingsResult<LinkParams> {
        let session = self.require_session()?;
        Ok(LinkParams::new(&session.port).with_baud_rate(session.baud_rate))
    }

    /// Transport session configuration, from the session section
    pub fn session_config(&self) -> SettingsResult<SessionConfig> {
        let session = self.require_session()?;
        Ok(SessionConfig::default()
            .with_retry(RetryPolicy::new(session.max_attempts))
            .with_reply_timeout(Duration::from_millis(session.reply_timeout_ms))
            .with_checksum(session.checksum))
    }

    fn require_session(&self) -> SettingsResult<&SessionSettings> {
        self.session
            .as_ref()
            .ok_or_else(|| SettingsError::MissingKey("session".to_string()))
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROVER_JSON: &str = r#"{
        "navigation": {
            "rover": { "wheel_diameter": 0.1, "encoder_steps": 1000, "maximum_speed": 1.0 },
            "brush-motor-driver": {
                "maximum_signal_amplitude": 500,
                "use_pid": true,
                "pid": { "kp": 0.7, "ki": 0.2, "kd": 0.0 },
                "encoder_directions": { "left": 1, "right": -1 }
            }
        },
        "camera": { "ignored": true }
    }"#;

    #[test]
    fn test_from_json_str() {
        let settings = ControllerSettings::from_json_str(ROVER_JSON).unwrap();
        assert_eq!(settings.navigation.rover.encoder_steps, 1000.0);
        assert!(settings.session.is_none());

        let config = settings.motor_config();
        assert_eq!(config.device_args(), vec![1000, 318, 500, 1, 700, 200, 0, 1, -1]);
    }

    #[test]
    fn test_session_section_required_for_link() {
        let settings = ControllerSettings::from_json_str(ROVER_JSON).unwrap();
        assert!(matches!(
            settings.link_params(),
            Err(SettingsError::MissingKey(key)) if key == "session"
        ));
    }

    #[test]
    fn test_session_defaults() {
        let mut settings = ControllerSettings::new();
        settings.session = Some(SessionSettings::new("/dev/ttyACM1"));

        let link = settings.link_params().unwrap();
        assert_eq!(link.port, "/dev/ttyACM1");
        assert_eq!(link.baud_rate, 115200);

        let session = settings.session_config().unwrap();
        assert_eq!(session.retry.max_attempts, 5);
        assert_eq!(session.reply_timeout, Duration::from_secs(1));
        assert_eq!(session.checksum, ChecksumMode::Placeholder);
    }

    #[test]
    fn test_validation() {
        assert!(ControllerSettings::default().validate().is_ok());

        let mut settings = ControllerSettings::default();
        settings.navigation.rover.wheel_diameter = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        settings.navigation.brush_motor_driver.encoder_directions.right = 2;
        assert!(settings.validate().is_err());

        let mut settings = ControllerSettings::default();
        let mut session = SessionSettings::new("/dev/ttyACM0");
        session.max_attempts = 0;
        settings.session = Some(session);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let result = ControllerSettings::from_json_str(r#"{ "navigation": {} }"#);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }
}
