//! Configurable device controller
//!
//! Wraps a [`TransportSession`] with the configure/enable/disable lifecycle
//! shared by every RomiSerial board:
//!
//! ```text
//! Constructed --configure--> Disabled --enable--> Enabled --disable--> Disabled
//! ```
//!
//! Commands other than configure/enable/disable fail with
//! [`ControllerError::NotConfigured`] until a configuration was accepted.

use crate::communication::session::TransportSession;
use crate::communication::ByteStream;
use crate::protocol::frame::{Command, Reply};
use romiserial_core::{CancelToken, ControllerError, DeviceState, Error, ProtocolError, Result};
use std::time::Instant;

/// Opcode shared by all boards to switch their outputs on and off
pub const ENABLE_OPCODE: char = 'E';

/// A configuration that can be uploaded to a device in one command
pub trait DeviceConfiguration: Clone + Send {
    /// Check the values before anything is sent to the device
    fn validate(&self) -> Result<()>;

    /// Convert to the device's upload command, in device units
    fn to_command(&self) -> Result<Command>;
}

/// Stateful controller for one device on one session
pub struct DeviceController<S: ByteStream, C: DeviceConfiguration> {
    name: String,
    session: TransportSession<S>,
    config: Option<C>,
    enabled: bool,
}

impl<S: ByteStream, C: DeviceConfiguration> DeviceController<S, C> {
    /// Create an unconfigured controller
    pub fn new(name: impl Into<String>, session: TransportSession<S>) -> Self {
        Self {
            name: name.into(),
            session,
            config: None,
            enabled: false,
        }
    }

    /// Controller name, used in log messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> DeviceState {
        match (&self.config, self.enabled) {
            (None, _) => DeviceState::Constructed,
            (Some(_), false) => DeviceState::Disabled,
            (Some(_), true) => DeviceState::Enabled,
        }
    }

    /// The accepted configuration, if any
    pub fn config(&self) -> Option<&C> {
        self.config.as_ref()
    }

    /// The accepted configuration, or `NotConfigured`
    pub fn require_config(&self) -> Result<&C> {
        self.config
            .as_ref()
            .ok_or_else(|| ControllerError::NotConfigured.into())
    }

    /// Whether a configuration was accepted
    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Whether the outputs were last switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validate and upload a configuration
    ///
    /// An enabled device is disabled first and stays disabled afterwards.
    pub fn configure(&mut self, config: C) -> Result<()> {
        config.validate()?;
        let command = config.to_command()?;

        if self.enabled {
            self.disable()?;
        }

        tracing::info!("{}: uploading configuration {}", self.name, command);
        self.upload(&command)?;
        self.config = Some(config);
        Ok(())
    }

    /// Replace the configuration without the disable step
    ///
    /// Used for settings the firmware accepts while running, such as the
    /// homing axes of a CNC board.
    pub fn update_config(&mut self, config: C) -> Result<()> {
        self.require_config()?;
        config.validate()?;
        let command = config.to_command()?;
        tracing::debug!("{}: updating configuration {}", self.name, command);
        self.upload(&command)?;
        self.config = Some(config);
        Ok(())
    }

    /// Switch the device outputs on
    pub fn enable(&mut self) -> Result<()> {
        self.set_enabled(true)
    }

    /// Switch the device outputs off
    pub fn disable(&mut self) -> Result<()> {
        self.set_enabled(false)
    }

    fn set_enabled(&mut self, on: bool) -> Result<()> {
        let command = Command::new(ENABLE_OPCODE, vec![i64::from(on)])?;
        self.session.send(&command)?;
        if self.enabled != on {
            tracing::info!(
                "{}: {}",
                self.name,
                if on { "enabled" } else { "disabled" }
            );
        }
        self.enabled = on;
        Ok(())
    }

    /// Send a command that requires a configured device
    pub fn execute(&mut self, command: &Command) -> Result<Reply> {
        self.execute_with_deadline(command, None, None)
    }

    /// Like [`execute`], giving up at `deadline` or when `cancel` fires
    ///
    /// [`execute`]: DeviceController::execute
    pub fn execute_with_deadline(
        &mut self,
        command: &Command,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<Reply> {
        if self.config.is_none() {
            tracing::warn!("{}: refusing {} before configure", self.name, command);
            return Err(ControllerError::NotConfigured.into());
        }
        self.session.send_with_deadline(command, deadline, cancel)
    }

    /// Borrow the transport session
    pub fn session(&self) -> &TransportSession<S> {
        &self.session
    }

    /// Consume the controller and return its session
    pub fn into_session(self) -> TransportSession<S> {
        self.session
    }

    fn upload(&mut self, command: &Command) -> Result<()> {
        match self.session.send(command) {
            Ok(_) => Ok(()),
            Err(Error::Protocol(ProtocolError::DeviceError { code, message })) => {
                tracing::error!("{}: configuration rejected with code {}", self.name, code);
                Err(ControllerError::ConfigurationRejected { code, message }.into())
            }
            Err(e) => Err(e),
        }
    }
}
