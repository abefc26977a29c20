//! Differential-drive motor controller
//!
//! Drives the brush motor board of the rover: two wheels with encoders, an
//! optional PID speed loop, and a raw signal command per side.

use super::device::{DeviceConfiguration, DeviceController};
use crate::communication::serial::{LinkParams, SerialLink};
use crate::communication::session::{SessionConfig, TransportSession};
use crate::communication::ByteStream;
use crate::protocol::frame::{Command, Reply};
use romiserial_core::{units, ControllerError, EncoderValues, MotorState, Result};
use serde::{Deserialize, Serialize};

const CONFIGURE_OPCODE: char = 'C';
const MOVE_OPCODE: char = 'V';
const STOP_OPCODE: char = 'X';
const ENCODERS_OPCODE: char = 'e';
const STATUS_OPCODE: char = 'S';

/// PID gains of the wheel speed loop
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
}

impl PidGains {
    /// Create a set of gains
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

/// Encoder polarity per side, `1` or `-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderDirections {
    /// Left encoder polarity
    pub left: i32,
    /// Right encoder polarity
    pub right: i32,
}

impl Default for EncoderDirections {
    fn default() -> Self {
        Self { left: 1, right: 1 }
    }
}

/// Physical description of the drive train and its speed loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Encoder steps per wheel revolution
    pub encoder_steps: f64,
    /// Wheel diameter in metres
    pub wheel_diameter: f64,
    /// Maximum linear speed in metres per second
    pub max_speed: f64,
    /// Largest signal amplitude accepted by `move_at`
    pub max_signal: i32,
    /// Whether the firmware runs its PID loop
    pub use_pid: bool,
    /// Speed loop gains
    pub pid: PidGains,
    /// Encoder polarity
    pub encoder_directions: EncoderDirections,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            encoder_steps: 16000.0,
            wheel_diameter: 0.47,
            max_speed: 3.0,
            max_signal: 100,
            use_pid: false,
            pid: PidGains::default(),
            encoder_directions: EncoderDirections::default(),
        }
    }
}

impl MotorConfig {
    /// Maximum wheel revolutions per second
    pub fn max_revolutions_per_second(&self) -> f64 {
        units::max_revolutions_per_second(self.max_speed, self.wheel_diameter)
    }

    /// Encoder steps per second at maximum speed
    pub fn encoder_steps_per_second(&self) -> f64 {
        units::encoder_steps_per_second(self.max_revolutions_per_second(), self.encoder_steps)
    }

    /// Upload arguments, in wire order
    pub fn device_args(&self) -> Vec<i64> {
        vec![
            self.encoder_steps.round() as i64,
            i64::from(units::rps_to_device(self.max_revolutions_per_second())),
            i64::from(self.max_signal),
            i64::from(self.use_pid),
            i64::from(units::gain_to_device(self.pid.kp)),
            i64::from(units::gain_to_device(self.pid.ki)),
            i64::from(units::gain_to_device(self.pid.kd)),
            i64::from(self.encoder_directions.left),
            i64::from(self.encoder_directions.right),
        ]
    }
}

impl DeviceConfiguration for MotorConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(ControllerError::InvalidConfiguration {
                reason: reason.to_string(),
            }
            .into())
        };

        if !(self.encoder_steps.is_finite() && self.encoder_steps > 0.0) {
            return invalid("encoder steps must be positive");
        }
        if !(self.wheel_diameter.is_finite() && self.wheel_diameter > 0.0) {
            return invalid("wheel diameter must be positive");
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return invalid("maximum speed must be positive");
        }
        if self.max_signal <= 0 {
            return invalid("maximum signal amplitude must be positive");
        }
        let gains = [self.pid.kp, self.pid.ki, self.pid.kd];
        if gains.iter().any(|g| !g.is_finite()) {
            return invalid("PID gains must be finite");
        }
        for direction in [self.encoder_directions.left, self.encoder_directions.right] {
            if direction != 1 && direction != -1 {
                return invalid("encoder directions must be 1 or -1");
            }
        }
        Ok(())
    }

    fn to_command(&self) -> Result<Command> {
        Ok(Command::new(CONFIGURE_OPCODE, self.device_args())?)
    }
}

/// Controller for the rover's brush motor board
pub struct MotorController<S: ByteStream = SerialLink> {
    device: DeviceController<S, MotorConfig>,
}

impl MotorController<SerialLink> {
    /// Open the serial link and create an unconfigured controller
    pub fn open(params: &LinkParams, config: SessionConfig) -> Result<Self> {
        let link = SerialLink::open(params)?;
        Ok(Self::new(TransportSession::with_config(link, config)))
    }
}

impl<S: ByteStream> MotorController<S> {
    /// Create an unconfigured controller on an existing session
    pub fn new(session: TransportSession<S>) -> Self {
        Self {
            device: DeviceController::new("motors", session),
        }
    }

    /// Upload the drive train configuration; the motors end up disabled
    pub fn configure(&mut self, config: MotorConfig) -> Result<()> {
        tracing::info!(
            "motors: max {:.4} rps, {:.1} steps/s",
            config.max_revolutions_per_second(),
            config.encoder_steps_per_second()
        );
        self.device.configure(config)
    }

    /// Power the motors
    pub fn enable(&mut self) -> Result<()> {
        self.device.enable()
    }

    /// Power down the motors
    pub fn disable(&mut self) -> Result<()> {
        self.device.disable()
    }

    /// Session state of the motors
    pub fn state(&self) -> MotorState {
        if self.device.is_configured() && self.device.is_enabled() {
            MotorState::Enabled
        } else {
            MotorState::Disabled
        }
    }

    /// The accepted configuration, if any
    pub fn config(&self) -> Option<&MotorConfig> {
        self.device.config()
    }

    /// Send raw left and right signals in device units
    pub fn move_at(&mut self, left: i32, right: i32) -> Result<()> {
        let max = self.device.require_config()?.max_signal;
        for signal in [left, right] {
            if signal.unsigned_abs() > max.unsigned_abs() {
                return Err(ControllerError::SignalOutOfRange { signal, max }.into());
            }
        }
        let command = Command::new(MOVE_OPCODE, vec![i64::from(left), i64::from(right)])?;
        self.device.execute(&command)?;
        Ok(())
    }

    /// Stop both wheels
    pub fn stop(&mut self) -> Result<()> {
        self.device.execute(&Command::query(STOP_OPCODE)?)?;
        Ok(())
    }

    /// Read the left and right encoder counts
    pub fn read_encoders(&mut self) -> Result<(i64, i64)> {
        Ok(self.read_encoder_values()?.counts())
    }

    /// Read the encoder counts and the firmware timestamp, if sent
    pub fn read_encoder_values(&mut self) -> Result<EncoderValues> {
        let reply = self.device.execute(&Command::query(ENCODERS_OPCODE)?)?;
        let mut values = EncoderValues::new(reply.integer(0)?, reply.integer(1)?);
        // Timestamp is sent in milliseconds
        values.timestamp = reply.get(2).and_then(|v| v.as_f64()).map(|ms| ms / 1000.0);
        Ok(values)
    }

    /// Read the controller's internal status for tuning and diagnostics
    pub fn read_status(&mut self) -> Result<Reply> {
        self.device.execute(&Command::query(STATUS_OPCODE)?)
    }

    /// Consume the controller and return its session
    pub fn into_session(self) -> TransportSession<S> {
        self.device.into_session()
    }
}
