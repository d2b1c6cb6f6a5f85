// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Signal sample sources
//!
//! The sensor MCU writes newline-terminated ASCII lines over a serial
//! line. A source yields one raw line at a time; `Ok(None)` means "no
//! complete line yet", which keeps the poll loop interruptible instead
//! of parking it in an unbounded blocking read.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use serialport::SerialPort;

use crate::error::SourceError;
use crate::meter::ShutdownHandle;

/// How long one serial read may block before the loop gets a chance to
/// check the shutdown flag.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Trait for signal sample sources
pub trait SampleSource {
    /// Next raw line from the source, without its terminator.
    /// `Ok(None)` means no complete line arrived yet; errors are fatal
    /// to the poll loop.
    fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Reassembles newline-terminated lines from arbitrary byte chunks.
///
/// Serial reads return whatever happens to be in the UART buffer, so a
/// line can arrive split across reads or several lines can arrive in
/// one read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the device.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Take the next complete line, if one is buffered. The terminator
    /// is stripped; non-UTF-8 bytes are replaced (such a line decodes
    /// as an invalid sample and is ignored upstream).
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line[..pos]);
        Some(text.trim_end_matches('\r').to_string())
    }
}

/// Serial-attached sample source.
pub struct SerialSource {
    port: Box<dyn SerialPort>,
    lines: LineBuffer,
}

impl SerialSource {
    /// Open the serial device. Failure here is fatal: the process has
    /// no signal to poll.
    pub fn open(device: &str, baud: u32) -> Result<Self, SourceError> {
        let port = serialport::new(device, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| SourceError::Open {
                device: device.to_string(),
                source,
            })?;
        Ok(Self {
            port,
            lines: LineBuffer::new(),
        })
    }
}

impl SampleSource for SerialSource {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; 64];
        match self.port.read(&mut chunk) {
            Ok(0) => Err(SourceError::Closed),
            Ok(n) => {
                self.lines.push(&chunk[..n]);
                Ok(self.lines.next_line())
            }
            Err(err)
                if err.kind() == ErrorKind::TimedOut || err.kind() == ErrorKind::Interrupted =>
            {
                Ok(None)
            }
            Err(err) => Err(SourceError::Read(err)),
        }
    }
}

/// Scripted source replaying a fixed line sequence, for tests.
///
/// When the script runs out it either requests shutdown (so a poll
/// loop driving it terminates cleanly) or reports the source closed.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    lines: VecDeque<String>,
    shutdown: Option<ShutdownHandle>,
}

impl ScriptedSource {
    /// Create a source that yields `lines` and then reports
    /// [`SourceError::Closed`].
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            shutdown: None,
        }
    }

    /// Request shutdown through `handle` instead of closing when the
    /// script is exhausted.
    pub fn shutdown_when_done(mut self, handle: ShutdownHandle) -> Self {
        self.shutdown = Some(handle);
        self
    }
}

impl SampleSource for ScriptedSource {
    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        match self.lines.pop_front() {
            Some(line) => Ok(Some(line)),
            None => match &self.shutdown {
                Some(handle) => {
                    handle.request();
                    Ok(None)
                }
                None => Err(SourceError::Closed),
            },
        }
    }
}
