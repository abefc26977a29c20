//! # RomiSerial Communication
//!
//! The command/response protocol used to drive the rover's embedded motor
//! and motion controllers over a line-oriented serial link, and the
//! controllers built on top of it.
//!
//! - `protocol`: frame codec and reply classification
//! - `communication`: byte streams, the serial link, retry policy, and the
//!   transport session that enforces one outstanding request at a time
//! - `firmware`: the configurable device controller and its motor and
//!   CNC/gimbal specialisations

pub mod communication;
pub mod firmware;
pub mod protocol;

pub use communication::{
    mock::MockStream,
    retry::{Backoff, RetryPolicy},
    serial::{list_ports, LinkParams, SerialLink, SerialPortInfo},
    session::{SessionConfig, TransportSession},
    ByteStream,
};

pub use firmware::{
    CncConfig, CncController, DeviceConfiguration, DeviceController, EncoderDirections,
    MotorConfig, MotorController, PidGains, WaitOptions,
};

pub use protocol::{
    classifier::{classify, Classification},
    frame::{ChecksumMode, Command, FrameCodec, Reply, ReplyValue},
};
