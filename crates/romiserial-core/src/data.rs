//! Controller state and measurement types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a device controller
///
/// `Constructed` means the transport is open but no configuration has been
/// uploaded yet. Every command other than configure/enable/disable is refused
/// in that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceState {
    /// Transport opened, device not yet configured
    #[default]
    Constructed,
    /// Configured, outputs disabled
    Disabled,
    /// Configured and enabled
    Enabled,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constructed => write!(f, "Constructed"),
            Self::Disabled => write!(f, "Disabled"),
            Self::Enabled => write!(f, "Enabled"),
        }
    }
}

/// Session state of a motor controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotorState {
    /// Motors powered down
    #[default]
    Disabled,
    /// Motors accept speed commands
    Enabled,
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Enabled => write!(f, "Enabled"),
        }
    }
}

/// Session state of a CNC or gimbal controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CncState {
    /// No motion pending
    #[default]
    Idle,
    /// Homing routine acknowledged, not yet confirmed finished
    Homing,
    /// Move acknowledged, motion continues on the device
    Moving,
    /// Device reported busy for a reason this session did not start
    Busy,
}

impl CncState {
    /// Whether the device may still be in motion
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for CncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Homing => write!(f, "Homing"),
            Self::Moving => write!(f, "Moving"),
            Self::Busy => write!(f, "Busy"),
        }
    }
}

/// Encoder counts read from a motor controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EncoderValues {
    /// Left wheel encoder count
    pub left: i64,
    /// Right wheel encoder count
    pub right: i64,
    /// Firmware timestamp in seconds, when the firmware sends one
    pub timestamp: Option<f64>,
}

impl EncoderValues {
    /// Create encoder values without a timestamp
    pub fn new(left: i64, right: i64) -> Self {
        Self {
            left,
            right,
            timestamp: None,
        }
    }

    /// Left and right counts as a pair
    pub fn counts(&self) -> (i64, i64) {
        (self.left, self.right)
    }
}
