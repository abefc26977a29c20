//! CNC and gimbal controller
//!
//! Multi-axis stepper boards: timed relative moves, velocity commands,
//! homing, an auxiliary relay, and a busy flag that has to be polled because
//! motion continues on the device after the command is acknowledged.

use super::device::{DeviceConfiguration, DeviceController};
use crate::communication::serial::{LinkParams, SerialLink};
use crate::communication::session::{SessionConfig, TransportSession};
use crate::communication::ByteStream;
use crate::protocol::frame::Command;
use romiserial_core::{CancelToken, CncState, ControllerError, DeviceState, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const MOVE_OPCODE: char = 'M';
const VELOCITY_OPCODE: char = 'V';
const HOMING_OPCODE: char = 'H';
const HOMING_AXES_OPCODE: char = 'h';
const RELAY_OPCODE: char = 'S';
const IDLE_OPCODE: char = 'I';

/// Homing axis value for "do not home"
pub const AXIS_DISABLED: i32 = -1;

/// Homing configuration of a CNC board
///
/// Each element is the axis homed in that slot, or [`AXIS_DISABLED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CncConfig {
    /// Homing order, one entry per slot
    pub homing_axes: [i32; 3],
}

impl Default for CncConfig {
    fn default() -> Self {
        Self {
            homing_axes: [0, 1, 2],
        }
    }
}

impl CncConfig {
    /// Create a configuration with the given homing axes
    pub fn new(homing_axes: [i32; 3]) -> Self {
        Self { homing_axes }
    }
}

impl DeviceConfiguration for CncConfig {
    fn validate(&self) -> Result<()> {
        if let Some(axis) = self
            .homing_axes
            .iter()
            .find(|&&axis| !(AXIS_DISABLED..=2).contains(&axis))
        {
            return Err(ControllerError::InvalidConfiguration {
                reason: format!("homing axis {} is not -1, 0, 1 or 2", axis),
            }
            .into());
        }
        Ok(())
    }

    fn to_command(&self) -> Result<Command> {
        let args = self.homing_axes.iter().map(|&a| i64::from(a)).collect();
        Ok(Command::new(HOMING_AXES_OPCODE, args)?)
    }
}

/// How [`CncController::wait`] polls the busy flag
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Delay between two polls
    pub poll_interval: Duration,
    /// Give up after this long
    pub timeout: Option<Duration>,
    /// Stop waiting when this token is cancelled
    pub cancel: Option<CancelToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: None,
            cancel: None,
        }
    }
}

impl WaitOptions {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cancellation token
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Controller for a CNC or gimbal board
pub struct CncController<S: ByteStream = SerialLink> {
    device: DeviceController<S, CncConfig>,
    state: CncState,
}

impl CncController<SerialLink> {
    /// Open the serial link and create an unconfigured controller
    pub fn open(params: &LinkParams, config: SessionConfig) -> Result<Self> {
        let link = SerialLink::open(params)?;
        Ok(Self::new(TransportSession::with_config(link, config)))
    }
}

impl<S: ByteStream> CncController<S> {
    /// Create an unconfigured controller on an existing session
    pub fn new(session: TransportSession<S>) -> Self {
        Self {
            device: DeviceController::new("cnc", session),
            state: CncState::Idle,
        }
    }

    /// Upload the homing configuration
    pub fn configure(&mut self, config: CncConfig) -> Result<()> {
        self.device.configure(config)
    }

    /// Power the steppers
    pub fn enable(&mut self) -> Result<()> {
        self.device.enable()
    }

    /// Power down the steppers
    pub fn disable(&mut self) -> Result<()> {
        self.device.disable()
    }

    /// Lifecycle state of the underlying device
    pub fn device_state(&self) -> DeviceState {
        self.device.state()
    }

    /// Motion state as last observed by this controller
    pub fn state(&self) -> CncState {
        self.state
    }

    /// The accepted configuration, if any
    pub fn config(&self) -> Option<&CncConfig> {
        self.device.config()
    }

    /// Relative move of `dx`, `dy`, `dz` steps over `duration_ms`
    ///
    /// Returns once the device acknowledged the move; use [`wait`] for the
    /// end of the motion.
    ///
    /// [`wait`]: CncController::wait
    pub fn move_steps(&mut self, duration_ms: i64, dx: i64, dy: i64, dz: i64) -> Result<()> {
        if duration_ms <= 0 {
            return Err(ControllerError::InvalidArgument {
                reason: format!("move duration must be positive, got {}ms", duration_ms),
            }
            .into());
        }
        let command = Command::new(MOVE_OPCODE, vec![duration_ms, dx, dy, dz])?;
        self.device.execute(&command)?;
        self.state = CncState::Moving;
        Ok(())
    }

    /// Run all axes at the given step rates
    pub fn move_at(&mut self, vx: i64, vy: i64, vz: i64) -> Result<()> {
        let command = Command::new(VELOCITY_OPCODE, vec![vx, vy, vz])?;
        self.device.execute(&command)?;
        self.state = if vx == 0 && vy == 0 && vz == 0 {
            CncState::Idle
        } else {
            CncState::Moving
        };
        Ok(())
    }

    /// Start the homing routine
    pub fn homing(&mut self) -> Result<()> {
        self.device.execute(&Command::query(HOMING_OPCODE)?)?;
        self.state = CncState::Homing;
        Ok(())
    }

    /// Change the homing axes without disabling the board
    pub fn configure_homing(&mut self, axes: [i32; 3]) -> Result<()> {
        self.device.update_config(CncConfig::new(axes))
    }

    /// Switch the auxiliary relay
    pub fn set_relay(&mut self, on: bool) -> Result<()> {
        let command = Command::new(RELAY_OPCODE, vec![i64::from(on)])?;
        self.device.execute(&command)?;
        Ok(())
    }

    /// Query the busy flag once
    pub fn is_busy(&mut self) -> Result<bool> {
        self.poll_busy(None, None)
    }

    fn poll_busy(
        &mut self,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<bool> {
        let command = Command::query(IDLE_OPCODE)?;
        let reply = self.device.execute_with_deadline(&command, deadline, cancel)?;
        let busy = reply.integer(0)? != 0;
        self.state = match (busy, self.state) {
            (false, _) => CncState::Idle,
            (true, CncState::Idle) => CncState::Busy,
            (true, state) => state,
        };
        Ok(busy)
    }

    /// Poll the busy flag until the device is idle
    ///
    /// Fails with `Timeout` or `Cancelled` when the options say to stop
    /// before the device reports idle. Both also interrupt a poll whose
    /// reply is still outstanding.
    pub fn wait(&mut self, options: &WaitOptions) -> Result<()> {
        let started = Instant::now();
        let deadline = options.timeout.map(|timeout| started + timeout);
        let cancel = options.cancel.as_ref();
        let timed_out = |timeout: Duration| -> Error {
            tracing::warn!("cnc: still busy after {:?}", started.elapsed());
            ControllerError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()
        };

        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                tracing::info!("cnc: wait cancelled");
                return Err(ControllerError::Cancelled.into());
            }
            match self.poll_busy(deadline, cancel) {
                Ok(false) => return Ok(()),
                Ok(true) => {}
                Err(e) if e.is_cancelled() => {
                    tracing::info!("cnc: wait cancelled");
                    return Err(e);
                }
                Err(e) if e.is_timeout() => {
                    return Err(timed_out(options.timeout.unwrap_or_default()));
                }
                Err(e) => return Err(e),
            }

            let mut delay = options.poll_interval;
            if let Some(timeout) = options.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    return Err(timed_out(timeout));
                }
                delay = delay.min(timeout - elapsed);
            }

            tracing::trace!("cnc: busy ({}), polling again in {:?}", self.state, delay);
            match cancel {
                Some(token) => {
                    token.sleep(delay);
                }
                None => std::thread::sleep(delay),
            }
        }
    }

    /// Consume the controller and return its session
    pub fn into_session(self) -> TransportSession<S> {
        self.device.into_session()
    }
}
