//! Caller-visible handles over response bodies and WebSocket connections.
//!
//! Body handles are owned by the consumer and only ever touched from its thread. Connection
//! handles are shared with the worker that drives the socket, so their state lives behind a lock
//! and every caller action becomes a [`Command`] for that worker.

use std::fmt;
use std::io::{BufRead, Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use netbridge::prelude::*;

use crate::{Error, Result};

/// How much a script-facing `read` consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
    /// `"a"`: everything that is left.
    All,
    /// `"l"`: the next line without its terminator.
    Line,
    /// `"L"`: the next line including its terminator.
    LineWithNewline,
    /// A count of bytes.
    Count(usize),
}

impl ReadFormat {
    /// Accepts `nil` (a line), `"a"`, `"l"`, `"L"` (optionally prefixed with `*`) or a count.
    pub fn from_script(format: &ScriptValue, position: usize) -> std::result::Result<ReadFormat, ArgumentError> {
        match format {
            ScriptValue::Nil => Ok(ReadFormat::Line),
            ScriptValue::Integer(count) if *count >= 0 => Ok(ReadFormat::Count(*count as usize)),
            ScriptValue::Number(count) if *count >= 0.0 && count.fract() == 0.0 => {
                Ok(ReadFormat::Count(*count as usize))
            }
            ScriptValue::String(format) => match format.trim_start_matches('*').chars().next() {
                Some('a') => Ok(ReadFormat::All),
                Some('l') => Ok(ReadFormat::Line),
                Some('L') => Ok(ReadFormat::LineWithNewline),
                _ => Err(ArgumentError::new(position, "invalid format")),
            },
            _ => Err(ArgumentError::new(position, "invalid format")),
        }
    }
}

/// A fully received body. Reading past the end, or calling `close`, drops the buffer and every
/// later read fails with [`Error::HandleClosed`].
struct BodyStream {
    cursor: Option<Cursor<Bytes>>,
}

impl BodyStream {
    fn new(body: Bytes) -> BodyStream {
        BodyStream {
            cursor: Some(Cursor::new(body)),
        }
    }

    fn open(&mut self) -> Result<&mut Cursor<Bytes>> {
        self.cursor.as_mut().ok_or(Error::HandleClosed)
    }

    fn close(&mut self) {
        self.cursor = None;
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    fn remaining(&self) -> usize {
        self.cursor
            .as_ref()
            .map(|cursor| cursor.get_ref().len().saturating_sub(cursor.position() as usize))
            .unwrap_or(0)
    }

    /// `None` marks the end of the stream; the handle is closed from then on.
    fn at_end(&mut self) -> Result<bool> {
        self.open()?;
        if self.remaining() == 0 {
            self.close();
            return Ok(true);
        }
        Ok(false)
    }

    fn read_count(&mut self, count: usize) -> Result<Option<Vec<u8>>> {
        if self.at_end()? {
            return Ok(None);
        }

        let mut buf = Vec::with_capacity(count.min(self.remaining()));
        self.open()?.take(count as u64).read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    /// Reads `count` UTF-8 characters. A continuation byte outside a sequence counts as one.
    fn read_chars(&mut self, count: usize) -> Result<Option<Vec<u8>>> {
        if self.at_end()? {
            return Ok(None);
        }

        let cursor = self.open()?;
        let start = cursor.position() as usize;
        let data = &cursor.get_ref()[start..];

        let mut chars = 0;
        let mut end = 0;
        let mut pending = 0;
        while end < data.len() {
            let byte = data[end];
            if byte & 0xC0 == 0x80 && pending > 0 {
                pending -= 1;
            } else {
                if chars == count {
                    break;
                }
                chars += 1;
                pending = match byte {
                    0xC0..=0xDF => 1,
                    0xE0..=0xEF => 2,
                    0xF0..=0xF7 => 3,
                    _ => 0,
                };
            }
            end += 1;
        }

        let chunk = data[..end].to_vec();
        cursor.set_position((start + end) as u64);
        Ok(Some(chunk))
    }

    fn read_line(&mut self, keep_newline: bool) -> Result<Option<Vec<u8>>> {
        if self.at_end()? {
            return Ok(None);
        }

        let mut line = Vec::new();
        self.open()?.read_until(b'\n', &mut line)?;

        if !keep_newline && line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.remaining());
        self.open()?.read_to_end(&mut buf)?;
        self.close();
        Ok(buf)
    }

    fn read(&mut self, format: ReadFormat) -> Result<Option<Vec<u8>>> {
        match format {
            ReadFormat::All => self.read_all().map(Some),
            ReadFormat::Line => self.read_line(false),
            ReadFormat::LineWithNewline => self.read_line(true),
            ReadFormat::Count(count) => self.read_count(count),
        }
    }
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

/// Reads a response body as text. Invalid UTF-8 is replaced rather than rejected.
pub struct ReadHandle(BodyStream);

impl ReadHandle {
    pub fn new(body: Bytes) -> ReadHandle {
        ReadHandle(BodyStream::new(body))
    }

    /// Everything that is left, then the handle closes.
    pub fn read_all(&mut self) -> Result<String> {
        self.0.read_all().map(decode)
    }

    pub fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.0.read_line(false)?.map(decode))
    }

    pub fn read_line_with_newline(&mut self) -> Result<Option<String>> {
        Ok(self.0.read_line(true)?.map(decode))
    }

    /// Reads up to `count` characters.
    pub fn read_count(&mut self, count: usize) -> Result<Option<String>> {
        Ok(self.0.read_chars(count)?.map(decode))
    }

    pub fn read(&mut self, format: ReadFormat) -> Result<Option<String>> {
        match format {
            ReadFormat::Count(count) => self.read_count(count),
            format => Ok(self.0.read(format)?.map(decode)),
        }
    }

    pub fn close(&mut self) {
        self.0.close();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// Reads a response body as raw bytes.
pub struct BinaryReadHandle(BodyStream);

impl BinaryReadHandle {
    pub fn new(body: Bytes) -> BinaryReadHandle {
        BinaryReadHandle(BodyStream::new(body))
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.0.read_count(1)?.and_then(|bytes| bytes.first().copied()))
    }

    pub fn read_count(&mut self, count: usize) -> Result<Option<Vec<u8>>> {
        self.0.read_count(count)
    }

    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.0.read_all()
    }

    pub fn read(&mut self, format: ReadFormat) -> Result<Option<Vec<u8>>> {
        self.0.read(format)
    }

    pub fn close(&mut self) {
        self.0.close();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// The body delivered with an `http_response` event, in the mode the request asked for.
pub enum BodyHandle {
    Text(ReadHandle),
    Binary(BinaryReadHandle),
}

impl BodyHandle {
    pub(crate) fn new(body: Bytes, binary: bool) -> BodyHandle {
        if binary {
            BodyHandle::Binary(BinaryReadHandle::new(body))
        } else {
            BodyHandle::Text(ReadHandle::new(body))
        }
    }

    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, BodyHandle::Binary(_))
    }

    /// Script-facing read: a string, a byte string, or `nil` at the end of the body.
    pub fn read(&mut self, format: ReadFormat) -> Result<ScriptValue> {
        Ok(match self {
            BodyHandle::Text(handle) => handle.read(format)?.into(),
            BodyHandle::Binary(handle) => handle.read(format)?.into(),
        })
    }

    pub fn close(&mut self) {
        match self {
            BodyHandle::Text(handle) => handle.close(),
            BodyHandle::Binary(handle) => handle.close(),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            BodyHandle::Text(handle) => handle.is_closed(),
            BodyHandle::Binary(handle) => handle.is_closed(),
        }
    }
}

impl fmt::Debug for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (mode, stream) = match self {
            BodyHandle::Text(handle) => ("text", &handle.0),
            BodyHandle::Binary(handle) => ("binary", &handle.0),
        };

        f.debug_struct("BodyHandle")
            .field("mode", &mode)
            .field("remaining", &stream.remaining())
            .field("closed", &stream.is_closed())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Caller actions, executed by the worker that owns the socket.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Send(String),
    Close,
}

#[derive(Debug)]
struct Connection {
    id: OperationId,
    state: Mutex<ConnectionState>,
    commands: mpsc::UnboundedSender<Command>,
}

/// A WebSocket session shared between the consumer and the worker's receive loop.
///
/// Commands are queued under the state lock, so a `send` that succeeded is always ordered before
/// the close that follows it, and nothing is queued once the connection has left `Open`.
#[derive(Debug, Clone)]
pub struct ConnectionHandle(Arc<Connection>);

impl ConnectionHandle {
    pub(crate) fn new(id: OperationId) -> (ConnectionHandle, mpsc::UnboundedReceiver<Command>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let connection = Connection {
            id,
            state: Mutex::new(ConnectionState::Connecting),
            commands,
        };

        (ConnectionHandle(Arc::new(connection)), receiver)
    }

    #[inline]
    pub fn id(&self) -> OperationId {
        self.0.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.0.state.lock()
    }

    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        let state = self.0.state.lock();
        if *state != ConnectionState::Open {
            return Err(Error::NotOpen);
        }

        self.0
            .commands
            .send(Command::Send(text.into()))
            .map_err(|_| Error::NotOpen)
    }

    /// Starts the close handshake. Calling it again, or after the peer closed, does nothing.
    pub fn close(&self) {
        let mut state = self.0.state.lock();
        if *state == ConnectionState::Open {
            *state = ConnectionState::Closing;
            let _ = self.0.commands.send(Command::Close);
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.0.state.lock() = state;
    }

    /// Moves an open connection to `Closing`. Returns whether this call made the transition.
    pub(crate) fn begin_closing(&self) -> bool {
        let mut state = self.0.state.lock();
        if *state == ConnectionState::Open {
            *state = ConnectionState::Closing;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn text(body: &str) -> ReadHandle {
        ReadHandle::new(Bytes::from(body.to_owned()))
    }

    #[test]
    fn lines_strip_terminators() {
        let mut handle = text("first\r\nsecond\nlast");
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(handle.read_line_with_newline().unwrap().as_deref(), Some("second\n"));
        assert_eq!(handle.read_line().unwrap().as_deref(), Some("last"));
        assert_eq!(handle.read_line().unwrap(), None);
        assert!(handle.is_closed());
        assert!(matches!(handle.read_line(), Err(Error::HandleClosed)));
    }

    #[test]
    fn read_all_closes_the_handle() {
        let mut handle = text("hello world");
        assert_eq!(handle.read_count(6).unwrap().as_deref(), Some("hello "));
        assert_eq!(handle.read_all().unwrap(), "world");
        assert!(matches!(handle.read_all(), Err(Error::HandleClosed)));
    }

    #[test]
    fn text_counts_are_characters() {
        let mut handle = text("héllo wörld");
        assert_eq!(handle.read_count(2).unwrap().as_deref(), Some("hé"));
        assert_eq!(handle.read(ReadFormat::Count(7)).unwrap().as_deref(), Some("llo wör"));
        assert_eq!(handle.read_count(10).unwrap().as_deref(), Some("ld"));
        assert_eq!(handle.read_count(1).unwrap(), None);
    }

    #[test]
    fn stray_continuation_bytes_count_as_characters() {
        let mut handle = ReadHandle::new(Bytes::from_static(b"\x80\x80\x80abc"));
        assert_eq!(handle.read_count(1).unwrap().as_deref(), Some("\u{fffd}"));
        assert_eq!(handle.read_count(3).unwrap().as_deref(), Some("\u{fffd}\u{fffd}a"));

        let mut handle = ReadHandle::new(Bytes::from_static(b"\xe2a\xc3\xa9"));
        assert_eq!(handle.read_count(2).unwrap().as_deref(), Some("\u{fffd}a"));
        assert_eq!(handle.read_count(1).unwrap().as_deref(), Some("\u{e9}"));
    }

    #[test]
    fn closed_handles_reject_reads() {
        let mut handle = text("unread");
        handle.close();
        assert!(matches!(handle.read_count(1), Err(Error::HandleClosed)));
    }

    #[test]
    fn empty_body_reads_empty_then_closes() {
        let mut handle = text("");
        assert_eq!(handle.read_all().unwrap(), "");
        assert!(handle.is_closed());

        let mut handle = text("");
        assert_eq!(handle.read_count(4).unwrap(), None);
        assert!(handle.is_closed());
    }

    #[test]
    fn binary_reads_are_exact() {
        let mut handle = BinaryReadHandle::new(Bytes::from_static(&[0, 159, 146, 150, 255]));
        assert_eq!(handle.read_byte().unwrap(), Some(0));
        assert_eq!(handle.read_count(3).unwrap(), Some(vec![159, 146, 150]));
        assert_eq!(handle.read_count(10).unwrap(), Some(vec![255]));
        assert_eq!(handle.read_byte().unwrap(), None);
        assert!(matches!(handle.read_byte(), Err(Error::HandleClosed)));
    }

    #[test]
    fn text_mode_replaces_invalid_utf8() {
        let mut handle = ReadHandle::new(Bytes::from_static(b"ok \xff"));
        assert_eq!(handle.read_all().unwrap(), "ok \u{fffd}");
    }

    #[test]
    fn script_reads_follow_the_format() {
        let mut body = BodyHandle::new(Bytes::from_static(b"one\ntwo\n"), false);
        assert!(!body.is_binary());

        let line = ReadFormat::from_script(&"l".into(), 1).unwrap();
        assert_eq!(body.read(line).unwrap(), ScriptValue::from("one"));

        let all = ReadFormat::from_script(&"*a".into(), 1).unwrap();
        assert_eq!(body.read(all).unwrap(), ScriptValue::from("two\n"));
        assert!(body.is_closed());

        let mut body = BodyHandle::new(Bytes::from_static(&[1, 2, 3]), true);
        let count = ReadFormat::from_script(&2i64.into(), 1).unwrap();
        assert_eq!(body.read(count).unwrap(), ScriptValue::Bytes(vec![1, 2]));
        assert_eq!(body.read(count).unwrap(), ScriptValue::Bytes(vec![3]));
        assert_eq!(body.read(count).unwrap(), ScriptValue::Nil);
    }

    #[test]
    fn read_formats_are_validated() {
        assert_eq!(ReadFormat::from_script(&ScriptValue::Nil, 1).unwrap(), ReadFormat::Line);
        assert_eq!(ReadFormat::from_script(&"L".into(), 1).unwrap(), ReadFormat::LineWithNewline);
        assert_eq!(ReadFormat::from_script(&3.0.into(), 1).unwrap(), ReadFormat::Count(3));
        assert!(ReadFormat::from_script(&"x".into(), 1).is_err());
        assert!(ReadFormat::from_script(&(-1i64).into(), 1).is_err());
        assert!(ReadFormat::from_script(&true.into(), 1).is_err());
    }

    #[test]
    fn send_requires_an_open_connection() {
        let (handle, mut commands) = ConnectionHandle::new(OperationId::new(4));
        assert_eq!(handle.state(), ConnectionState::Connecting);
        assert!(matches!(handle.send("early"), Err(Error::NotOpen)));

        handle.set_state(ConnectionState::Open);
        handle.send("hello").unwrap();
        assert_eq!(commands.try_recv().unwrap(), Command::Send("hello".to_owned()));
    }

    #[test]
    fn close_is_idempotent() {
        let (handle, mut commands) = ConnectionHandle::new(OperationId::new(5));
        handle.set_state(ConnectionState::Open);

        handle.close();
        handle.close();
        assert_eq!(handle.state(), ConnectionState::Closing);
        assert_eq!(commands.try_recv().unwrap(), Command::Close);
        assert!(commands.try_recv().is_err());

        assert!(matches!(handle.send("late"), Err(Error::NotOpen)));
        assert!(!handle.begin_closing());
    }

    #[test]
    fn racing_sends_never_follow_the_close() {
        let (handle, mut commands) = ConnectionHandle::new(OperationId::new(6));
        handle.set_state(ConnectionState::Open);

        thread::scope(|scope| {
            for _ in 0..4 {
                let handle = handle.clone();
                scope.spawn(move || {
                    for i in 0..200 {
                        let _ = handle.send(i.to_string());
                    }
                });
            }
            let closer = handle.clone();
            scope.spawn(move || closer.close());
        });

        let mut seen_close = false;
        while let Ok(command) = commands.try_recv() {
            match command {
                Command::Close => {
                    assert!(!seen_close);
                    seen_close = true;
                }
                Command::Send(_) => assert!(!seen_close, "send queued after close"),
            }
        }
        assert!(seen_close);
    }
}
