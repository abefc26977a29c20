//! Transport session
//!
//! Owns the byte stream and runs the request/response discipline: write one
//! frame, read lines until its reply arrives, classify the status, and retry
//! transient failures according to the injected [`RetryPolicy`].
//!
//! Only one request is ever outstanding. `send` takes `&mut self`, so a
//! session has a single owner; independent sessions on separate links can be
//! driven from separate threads.

use super::retry::RetryPolicy;
use super::{is_read_timeout, ByteStream};
use crate::protocol::classifier::{classify, Classification};
use crate::protocol::frame::{
    classify_line, ChecksumMode, Command, DecodeError, FrameCodec, LineKind, Reply,
};
use romiserial_core::{CancelToken, ConnectionError, ControllerError, Error, ProtocolError, Result};
use std::io;
use std::time::{Duration, Instant};

/// Configuration for a transport session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Retry policy for transient replies
    pub retry: RetryPolicy,
    /// Time allowed for a reply before the attempt counts as transient
    pub reply_timeout: Duration,
    /// How request suffixes are filled in
    pub checksum: ChecksumMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            reply_timeout: Duration::from_secs(1),
            checksum: ChecksumMode::Placeholder,
        }
    }
}

impl SessionConfig {
    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the reply timeout
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the checksum mode
    pub fn with_checksum(mut self, checksum: ChecksumMode) -> Self {
        self.checksum = checksum;
        self
    }
}

/// Result of waiting for one reply
enum Attempt {
    /// A reply frame was decoded
    Reply(Reply),
    /// Nothing usable arrived; counts against the retry budget
    Transient(&'static str),
}

/// Caller-imposed bounds on one `send`
#[derive(Clone, Copy)]
struct Limits<'a> {
    deadline: Option<Instant>,
    cancel: Option<&'a CancelToken>,
}

impl Limits<'_> {
    fn check(&self, started: Instant) -> Result<()> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ControllerError::Cancelled.into());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ControllerError::Timeout {
                timeout_ms: started.elapsed().as_millis() as u64,
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn sleep(&self, delay: Duration) {
        let delay = match self.deadline {
            Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
            None => delay,
        };
        match self.cancel {
            Some(token) => {
                token.sleep(delay);
            }
            None => std::thread::sleep(delay),
        }
    }
}

/// One-request-at-a-time session over a byte stream
pub struct TransportSession<S: ByteStream> {
    stream: S,
    codec: FrameCodec,
    config: SessionConfig,
    commands_sent: u64,
    stale_input: bool,
}

impl<S: ByteStream> TransportSession<S> {
    /// Create a session with the default configuration
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, SessionConfig::default())
    }

    /// Create a session with the given configuration
    pub fn with_config(stream: S, config: SessionConfig) -> Self {
        Self {
            stream,
            codec: FrameCodec::new(config.checksum),
            config,
            commands_sent: 0,
            stale_input: false,
        }
    }

    /// The session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of commands that completed successfully
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Borrow the underlying stream
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Consume the session and return the stream, e.g. to reopen it
    pub fn into_stream(self) -> S {
        self.stream
    }

    /// Send a command and block until its reply is classified
    ///
    /// Transient replies resend the same frame until the retry budget is
    /// spent; fatal replies fail immediately with the device's code.
    pub fn send(&mut self, command: &Command) -> Result<Reply> {
        self.send_within(
            command,
            Limits {
                deadline: None,
                cancel: None,
            },
        )
    }

    /// Like [`send`], but give up at `deadline` or when `cancel` fires
    ///
    /// Stops between attempts and while waiting for a reply, failing with
    /// `ControllerError::Timeout` or `ControllerError::Cancelled`.
    ///
    /// [`send`]: TransportSession::send
    pub fn send_with_deadline(
        &mut self,
        command: &Command,
        deadline: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<Reply> {
        self.send_within(command, Limits { deadline, cancel })
    }

    fn send_within(&mut self, command: &Command, limits: Limits<'_>) -> Result<Reply> {
        let started = Instant::now();
        let frame = self.codec.encode(command);
        let request = frame.trim_end().to_string();
        let policy = self.config.retry;
        let mut attempts = 0;

        limits.check(started)?;
        if self.stale_input {
            // A reply to an abandoned attempt may still be buffered
            tracing::debug!("discarding buffered input before {}", request);
            self.stream
                .discard_input()
                .map_err(|e| link_lost(&request, e))?;
            self.stale_input = false;
        }

        loop {
            attempts += 1;
            tracing::debug!(
                "-> {} (attempt {}/{})",
                request,
                attempts,
                policy.max_attempts
            );
            self.stream
                .write(frame.as_bytes())
                .map_err(|e| link_lost(&request, e))?;

            let attempt = match self.read_reply(&request, started, &limits) {
                Ok(attempt) => attempt,
                Err(e) => {
                    if matches!(e, Error::Controller(_)) {
                        self.stale_input = true;
                    }
                    return Err(e);
                }
            };

            match attempt {
                Attempt::Reply(reply) => match classify(reply.status()) {
                    Classification::Success => {
                        self.commands_sent += 1;
                        return Ok(reply);
                    }
                    Classification::Fatal(code) => {
                        tracing::error!("{} rejected by device: {}", request, reply);
                        return Err(ProtocolError::DeviceError {
                            code,
                            message: reply.message().map(str::to_string),
                        }
                        .into());
                    }
                    Classification::Transient => {
                        tracing::warn!("{}: transient status {}", request, reply.status());
                    }
                },
                Attempt::Transient(reason) => {
                    self.stale_input = true;
                    tracing::warn!("{}: {}", request, reason);
                }
            }

            if !policy.can_retry(attempts) {
                tracing::error!("{}: giving up after {} attempts", request, attempts);
                return Err(ProtocolError::RetriesExhausted {
                    command: request,
                    attempts,
                }
                .into());
            }

            let delay = policy.delay_for(attempts);
            if !delay.is_zero() {
                limits.sleep(delay);
            }
            limits.check(started)?;
        }
    }

    /// Read lines until a reply frame for the outstanding request arrives
    fn read_reply(
        &mut self,
        request: &str,
        started: Instant,
        limits: &Limits<'_>,
    ) -> Result<Attempt> {
        let attempt_started = Instant::now();

        loop {
            limits.check(started)?;
            if attempt_started.elapsed() > self.config.reply_timeout {
                return Ok(Attempt::Transient("reply timed out"));
            }

            let line = match self.stream.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(e) if is_read_timeout(&e) => continue,
                Err(e) => return Err(link_lost(request, e)),
            };
            let line = line.trim();

            match classify_line(line) {
                LineKind::Noise => {
                    if !line.is_empty() {
                        tracing::trace!("discarding noise: {:?}", line);
                    }
                }
                LineKind::Log(text) => {
                    tracing::info!("firmware says: {}", text);
                }
                LineKind::Frame => {
                    tracing::debug!("<- {}", line);
                    match self.codec.decode(line) {
                        Ok(reply) => {
                            if !self.codec.verify(line, &reply) {
                                return Ok(Attempt::Transient("reply checksum mismatch"));
                            }
                            if !self.codec.matches_request(&reply) {
                                tracing::warn!(
                                    "dropping stale reply {} (expected id {:02x})",
                                    line,
                                    self.codec.last_id()
                                );
                                continue;
                            }
                            return Ok(Attempt::Reply(reply));
                        }
                        Err(DecodeError::Truncated) => {
                            tracing::warn!("partial reply, still reading: {:?}", line);
                        }
                        Err(err) => {
                            tracing::error!("{}: undecodable reply {:?}", request, line);
                            return Err(err.into_protocol_error(line).into());
                        }
                    }
                }
            }
        }
    }
}

fn link_lost(request: &str, err: io::Error) -> Error {
    tracing::error!("link lost while sending {}: {}", request, err);
    ConnectionError::LinkLost {
        reason: err.to_string(),
    }
    .into()
}
