//! Scripted in-memory byte stream
//!
//! Stands in for a controller board: each write pops the next scripted batch
//! of reply lines and makes them readable. Clones share state, so a test can
//! hand one clone to a session and inspect the written frames through another.

use super::ByteStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    scripted: VecDeque<Vec<String>>,
    pending: VecDeque<String>,
    written: Vec<String>,
    discarded: Vec<String>,
    disconnected: bool,
}

/// In-memory stream replaying scripted replies
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    state: Arc<Mutex<MockState>>,
}

impl MockStream {
    /// Create a stream with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the lines the device sends after the next unanswered write
    pub fn reply<I, L>(&self, lines: I) -> &Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.state
            .lock()
            .scripted
            .push_back(lines.into_iter().map(Into::into).collect());
        self
    }

    /// Queue a single reply line for the next unanswered write
    pub fn reply_line(&self, line: impl Into<String>) -> &Self {
        self.reply([line.into()])
    }

    /// Queue the same reply line for the next `count` writes
    pub fn reply_repeated(&self, line: &str, count: usize) -> &Self {
        for _ in 0..count {
            self.reply_line(line);
        }
        self
    }

    /// Make a line readable immediately, without waiting for a write
    pub fn push_unsolicited(&self, line: impl Into<String>) {
        self.state.lock().pending.push_back(line.into());
    }

    /// Every frame written so far
    pub fn written(&self) -> Vec<String> {
        self.state.lock().written.clone()
    }

    /// Lines dropped by `discard_input` without being read
    pub fn discarded(&self) -> Vec<String> {
        self.state.lock().discarded.clone()
    }

    /// Number of frames written so far
    pub fn write_count(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Simulate the device being unplugged
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }
}

impl ByteStream for MockStream {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state.written.push(String::from_utf8_lossy(data).to_string());
        if let Some(batch) = state.scripted.pop_front() {
            state.pending.extend(batch);
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(state.pending.pop_front())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.discarded.extend(state.pending.drain(..));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_releases_scripted_batch() {
        let mock = MockStream::new();
        mock.reply(["#!hello", "#[0]"]);

        let mut stream = mock.clone();
        assert_eq!(stream.read_line().unwrap(), None);

        stream.write(b"#E[1]:xxxx\r").unwrap();
        assert_eq!(stream.read_line().unwrap().as_deref(), Some("#!hello"));
        assert_eq!(stream.read_line().unwrap().as_deref(), Some("#[0]"));
        assert_eq!(stream.read_line().unwrap(), None);
        assert_eq!(mock.written(), vec!["#E[1]:xxxx\r".to_string()]);
    }

    #[test]
    fn test_discard_input_keeps_scripted_replies() {
        let mock = MockStream::new();
        mock.reply(["#[0,1]", "#[0,2]"]);
        mock.reply_line("#[0,3]");

        let mut stream = mock.clone();
        stream.write(b"#e[]:xxxx\r").unwrap();
        assert_eq!(stream.read_line().unwrap().as_deref(), Some("#[0,1]"));
        stream.discard_input().unwrap();
        assert_eq!(stream.read_line().unwrap(), None);
        assert_eq!(mock.discarded(), vec!["#[0,2]".to_string()]);

        stream.write(b"#e[]:xxxx\r").unwrap();
        assert_eq!(stream.read_line().unwrap().as_deref(), Some("#[0,3]"));
    }

    #[test]
    fn test_disconnect() {
        let mock = MockStream::new();
        let mut stream = mock.clone();
        mock.disconnect();
        assert!(stream.write(b"x").is_err());
        assert!(stream.read_line().is_err());
    }
}
