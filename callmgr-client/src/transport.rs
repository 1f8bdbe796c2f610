//! Framing transport.
//!
//! Wraps a byte stream into header blocks. Opening a transport reads and
//! verifies the greeting banner; afterwards the stream is split into a
//! [`FrameReader`], owned by the poll loop, and an [`ActionWriter`], shared by
//! action senders and the dispatch loop.

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::stream::ClientStream;
use callmgr_protocol::{check_banner, Action, Decoder, Encoder, Frame};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

/// Lifecycle of a transport, observed by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseState {
    Open,
    /// The session asked the peer to end it; end-of-stream is expected.
    Closing,
    Closed,
}

/// A verified manager connection, before it is split between the loops.
pub struct Transport<S = ClientStream> {
    banner: String,
    reader: FrameReader<ReadHalf<S>>,
    writer: ActionWriter<WriteHalf<S>>,
}

impl Transport<ClientStream> {
    /// Connects to the configured address and verifies the banner, all
    /// within `connect_timeout`.
    pub async fn open(config: &SessionConfig) -> Result<Self, ClientError> {
        tokio::time::timeout(config.connect_timeout, async {
            let stream = ClientStream::connect(&config.addr, config.tls.as_ref()).await?;
            Self::handshake(stream, config).await
        })
        .await
        .map_err(|_| {
            debug!("Connect to {} timed out", config.addr);
            ClientError::Timeout
        })?
    }
}

impl<S: AsyncRead + AsyncWrite> Transport<S> {
    /// Reads the greeting line from an established stream and verifies it.
    pub async fn handshake(stream: S, config: &SessionConfig) -> Result<Self, ClientError> {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, config.read_buffer_size);

        let banner = reader.read_line().await?;
        check_banner(&banner, &config.banner).map_err(|_| {
            debug!("Unexpected banner {:?}", banner);
            ClientError::NotAmi(banner.clone())
        })?;
        debug!("Banner verified: {}", banner);

        Ok(Self {
            banner,
            reader,
            writer: ActionWriter::new(write_half),
        })
    }

    /// The greeting line sent by the server.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn into_split(self) -> (FrameReader<ReadHalf<S>>, ActionWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

/// Read side: yields one header block at a time.
pub struct FrameReader<R> {
    inner: R,
    decoder: Decoder,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, buffer_size: usize) -> Self {
        Self {
            inner,
            decoder: Decoder::new(),
            buf: vec![0u8; buffer_size],
        }
    }

    /// Reads a single line (the greeting banner).
    pub async fn read_line(&mut self) -> Result<String, ClientError> {
        loop {
            if let Some(line) = self.decoder.decode_line()? {
                return Ok(line);
            }
            self.fill().await?;
        }
    }

    /// Blocks until one full header block is available or the stream fails.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn read_frame(&mut self) -> Result<Frame, ClientError> {
        loop {
            if let Some(frame) = self.decoder.decode_frame()? {
                trace!("Decoded frame with {} fields", frame.len());
                return Ok(frame);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), ClientError> {
        let n = self.inner.read(&mut self.buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        trace!("Read {} bytes, {} buffered", n, self.decoder.buffered() + n);
        self.decoder.extend(&self.buf[..n]);
        Ok(())
    }
}

/// Write side: serializes whole actions onto the stream.
///
/// Each action is encoded into one buffer and written under the mutex, so
/// concurrent senders never interleave lines.
pub struct ActionWriter<W> {
    inner: Arc<Mutex<Option<W>>>,
    state: Arc<watch::Sender<CloseState>>,
}

impl<W> Clone for ActionWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            state: Arc::clone(&self.state),
        }
    }
}

impl<W: AsyncWrite + Unpin> ActionWriter<W> {
    pub fn new(inner: W) -> Self {
        let (state, _) = watch::channel(CloseState::Open);
        Self {
            inner: Arc::new(Mutex::new(Some(inner))),
            state: Arc::new(state),
        }
    }

    /// Writes one action. I/O failures are returned to the caller.
    pub async fn write_action(&self, action: &Action) -> Result<(), ClientError> {
        let encoded = Encoder::encode_action(action)?;
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        trace!("Wrote {} bytes for action {}", encoded.len(), action.name);
        Ok(())
    }

    /// Marks the session as ending; end-of-stream is no longer an error.
    pub fn begin_close(&self) {
        self.state.send_if_modified(|state| {
            if *state == CloseState::Open {
                *state = CloseState::Closing;
                true
            } else {
                false
            }
        });
    }

    /// Shuts the stream down. Idempotent.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.state.send_replace(CloseState::Closed);
        let writer = self.inner.lock().await.take();
        match writer {
            Some(mut writer) => {
                debug!("Shutting down transport");
                writer.shutdown().await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn state(&self) -> CloseState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CloseState::Closed
    }

    /// Subscribes to lifecycle changes.
    pub fn watch_state(&self) -> watch::Receiver<CloseState> {
        self.state.subscribe()
    }
}
