//! # RomiSerial Core
//!
//! Core types, errors, and utilities shared by the RomiSerial crates.
//! Provides the error taxonomy for the command/response protocol, the
//! controller state enums, physical-to-device unit conversions, and the
//! cooperative cancellation primitive used by blocking polling loops.

pub mod cancel;
pub mod data;
pub mod error;
pub mod units;

pub use cancel::CancelToken;
pub use data::{CncState, DeviceState, EncoderValues, MotorState};
pub use error::{ConnectionError, ControllerError, Error, ProtocolError, Result};
