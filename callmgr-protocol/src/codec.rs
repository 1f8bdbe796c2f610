//! Encoder and decoder for AMI header blocks.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::Action;
use crate::{FIELD_ACTION, MAX_FRAME_SIZE};
use bytes::{BufMut, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Encodes actions into wire blocks.
pub struct Encoder;

impl Encoder {
    /// Encodes an action: the `Action` line, one line per parameter with the
    /// value trimmed, then the blank terminator line.
    pub fn encode_action(action: &Action) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(64 + action.params.len() * 32);
        put_line(&mut buf, FIELD_ACTION, action.name.trim())?;
        for (key, value) in &action.params {
            put_line(&mut buf, key.trim(), value.trim())?;
        }
        buf.put_slice(CRLF);
        Ok(buf)
    }
}

fn put_line(buf: &mut BytesMut, key: &str, value: &str) -> Result<(), ProtocolError> {
    if key.is_empty() || key.contains(['\r', '\n', ':']) || value.contains(['\r', '\n']) {
        return Err(ProtocolError::InvalidField(key.to_string()));
    }
    buf.put_slice(key.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(CRLF);
    Ok(())
}

/// Verifies the greeting line sent by the server on connect.
pub fn check_banner(line: &str, expected: &str) -> Result<(), ProtocolError> {
    if line.contains(expected) {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedBanner(line.to_string()))
    }
}

/// Incremental decoder for header blocks.
///
/// Bytes are appended as they arrive; each call to [`Decoder::decode_frame`]
/// yields at most one complete block. Lines may end in `\r\n` or `\n`.
pub struct Decoder {
    buffer: BytesMut,
    /// Offset of the first line not yet inspected for the block terminator.
    scanned: usize,
    max_frame_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            max_frame_size,
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    /// Attempts to take one line (used for the greeting banner).
    pub fn decode_line(&mut self) -> Result<Option<String>, ProtocolError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let raw = self.buffer.split_to(pos + 1);
                self.scanned = 0;
                let line = std::str::from_utf8(&raw).map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
            }
            None => {
                self.check_overflow()?;
                Ok(None)
            }
        }
    }

    /// Attempts to decode the next header block.
    ///
    /// A malformed block is consumed entirely before the error is returned,
    /// so decoding resumes at the following block.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        let Some(end) = self.find_block_end() else {
            self.check_overflow()?;
            return Ok(None);
        };

        let block = self.buffer.split_to(end);
        if block.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: block.len(),
                max: self.max_frame_size,
            });
        }
        let text = std::str::from_utf8(&block).map_err(|_| ProtocolError::InvalidUtf8)?;
        parse_block(text).map(Some)
    }

    fn find_block_end(&mut self) -> Option<usize> {
        let mut pos = self.scanned;
        while let Some(offset) = self.buffer[pos..].iter().position(|&b| b == b'\n') {
            let line = &self.buffer[pos..pos + offset];
            pos += offset + 1;
            if line.is_empty() || line == b"\r" {
                self.scanned = 0;
                return Some(pos);
            }
        }
        self.scanned = pos;
        None
    }

    fn check_overflow(&mut self) -> Result<(), ProtocolError> {
        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.clear();
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_block(text: &str) -> Result<Frame, ProtocolError> {
    let mut frame = Frame::new();
    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            if !frame.continue_last(line.trim()) {
                return Err(ProtocolError::MalformedLine(line.to_string()));
            }
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedLine(line.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ProtocolError::MalformedLine(line.to_string()));
        }
        frame.push(key, value.trim());
    }
    Ok(frame)
}
