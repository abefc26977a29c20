//! # RomiSerial
//!
//! Synchronous command/response protocol for the rover's embedded boards,
//! with the controllers built on top of it:
//! - Motor board: differential drive speed signals, encoders, PID configuration
//! - CNC and gimbal boards: timed moves, homing, relay, busy polling
//! - Serial (USB) links at 115200 baud, 8N1, ASCII line oriented
//!
//! ## Architecture
//!
//! RomiSerial is organized as a workspace with multiple crates:
//!
//! 1. **romiserial-core** - Errors, controller states, unit conversions, cancellation
//! 2. **romiserial-communication** - Frame codec, transport session, serial link, controllers
//! 3. **romiserial-settings** - Controller settings loaded from JSON or TOML
//! 4. **romiserial** - Facade re-exporting the public API, plus logging setup
//!
//! ## Example
//!
//! ```no_run
//! use romiserial::{ControllerSettings, MotorController};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     romiserial::init_logging()?;
//!     let settings = ControllerSettings::load_from_file(Path::new("config.json"))?;
//!     let mut motors = MotorController::open(&settings.link_params()?, settings.session_config()?)?;
//!     motors.configure(settings.motor_config())?;
//!     motors.enable()?;
//!     motors.move_at(50, 50)?;
//!     let (left, right) = motors.read_encoders()?;
//!     println!("encoders: {} {}", left, right);
//!     motors.stop()?;
//!     Ok(())
//! }
//! ```

pub use romiserial_communication::{communication, firmware, protocol};
pub use romiserial_core::{cancel, data, units};

pub use romiserial_core::{
    CancelToken, CncState, ConnectionError, ControllerError, DeviceState, EncoderValues, Error,
    MotorState, ProtocolError, Result,
};

pub use romiserial_communication::{
    classify, list_ports, Backoff, ByteStream, ChecksumMode, Classification, CncConfig,
    CncController, Command, DeviceConfiguration, DeviceController, EncoderDirections,
    FrameCodec, LinkParams, MockStream, MotorConfig, MotorController, PidGains, Reply, ReplyValue,
    RetryPolicy, SerialLink, SerialPortInfo, SessionConfig, TransportSession, WaitOptions,
};

pub use romiserial_settings::{
    BrushMotorDriverSettings, ControllerSettings, NavigationSettings, RoverSettings,
    SessionSettings, SettingsError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support, INFO otherwise
/// - Thread ids, so parallel controllers can be told apart
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
