//! Byte-stream transport and the request/response session
//!
//! The session only needs two things from the link: write a frame, and read
//! one line back (or report that nothing arrived before the read timeout).
//! Anything that can do that implements [`ByteStream`].

pub mod mock;
pub mod retry;
pub mod serial;
pub mod session;

use std::io;

/// Duplex, line-oriented byte stream
pub trait ByteStream: Send {
    /// Write the whole buffer to the stream
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read one line without its terminator
    ///
    /// Returns `Ok(None)` when the read timeout expired before a complete
    /// line was available. Partial data is kept for the next call.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Drop input that was received but not read yet
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        (**self).read_line()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

/// Whether an I/O error only means "nothing arrived yet"
pub(crate) fn is_read_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
