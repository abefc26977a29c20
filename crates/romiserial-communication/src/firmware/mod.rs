//! Controllers for the RomiSerial boards
//!
//! - `device`: configure/enable/disable lifecycle shared by every board
//! - `motor`: differential-drive brush motor board
//! - `cnc`: CNC and gimbal stepper boards

pub mod cnc;
pub mod device;
pub mod motor;

pub use cnc::{CncConfig, CncController, WaitOptions};
pub use device::{DeviceConfiguration, DeviceController};
pub use motor::{EncoderDirections, MotorConfig, MotorController, PidGains};
