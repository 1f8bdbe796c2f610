//! Poll loop: the only reader of the transport.
//!
//! Reads one frame at a time and forwards it to the dispatch loop. Fatal read
//! errors go to the Fatal stream and end the loop, which closes the raw-frame
//! channel; anything else is forwarded as a recoverable error.

use crate::error::ClientError;
use crate::transport::{CloseState, FrameReader};
use callmgr_protocol::Frame;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Consecutive non-fatal I/O read errors tolerated before giving up.
pub const MAX_CONSECUTIVE_IO_ERRORS: u32 = 16;

/// Item forwarded from the poll loop to the dispatch loop.
#[derive(Debug)]
pub(crate) enum Inbound {
    Frame(Frame),
    Error(ClientError),
}

pub(crate) async fn run<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    mut state: watch::Receiver<CloseState>,
    raw_tx: mpsc::Sender<Inbound>,
    fatal_tx: mpsc::Sender<ClientError>,
) {
    let mut io_errors = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = state.wait_for(|s| *s == CloseState::Closed) => {
                debug!("Transport closed, poll loop exiting");
                return;
            }
            result = reader.read_frame() => result,
        };

        let err = match result {
            Ok(frame) => {
                io_errors = 0;
                if raw_tx.send(Inbound::Frame(frame)).await.is_err() {
                    debug!("Dispatch loop gone, poll loop exiting");
                    return;
                }
                continue;
            }
            Err(err) => err,
        };

        if matches!(err, ClientError::Io(_)) {
            io_errors += 1;
        }

        if err.is_fatal() || io_errors >= MAX_CONSECUTIVE_IO_ERRORS {
            let current = *state.borrow();
            if current != CloseState::Open {
                debug!("Connection ended during close: {}", err);
                return;
            }
            warn!("Fatal read error: {}", err);
            if fatal_tx.try_send(err).is_err() {
                debug!("Fatal stream already holds an error");
            }
            return;
        }

        debug!("Recoverable read error: {}", err);
        if raw_tx.send(Inbound::Error(err)).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_READ_BUFFER_SIZE;
    use std::io;
    use tokio_test::io::Builder;

    fn channels() -> (
        mpsc::Sender<Inbound>,
        mpsc::Receiver<Inbound>,
        mpsc::Sender<ClientError>,
        mpsc::Receiver<ClientError>,
    ) {
        let (raw_tx, raw_rx) = mpsc::channel(16);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        (raw_tx, raw_rx, fatal_tx, fatal_rx)
    }

    #[tokio::test]
    async fn test_connection_reset_is_fatal() {
        let mock = Builder::new()
            .read(b"Event: FullyBooted\r\nStatus: Fully Booted\r\n\r\n")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let (_state_tx, state_rx) = watch::channel(CloseState::Open);
        let (raw_tx, mut raw_rx, fatal_tx, mut fatal_rx) = channels();

        run(
            FrameReader::new(mock, DEFAULT_READ_BUFFER_SIZE),
            state_rx,
            raw_tx,
            fatal_tx,
        )
        .await;

        assert!(matches!(raw_rx.recv().await, Some(Inbound::Frame(_))));
        assert!(raw_rx.recv().await.is_none());

        let fatal = fatal_rx.recv().await.unwrap();
        assert!(matches!(fatal, ClientError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert!(fatal_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recoverable_errors_are_forwarded() {
        let mock = Builder::new()
            .read(b"garbage line\r\n\r\n")
            .read_error(io::Error::from(io::ErrorKind::TimedOut))
            .read(b"Event: Reload\r\n\r\n")
            .build();
        let (_state_tx, state_rx) = watch::channel(CloseState::Open);
        let (raw_tx, mut raw_rx, fatal_tx, mut fatal_rx) = channels();

        run(
            FrameReader::new(mock, DEFAULT_READ_BUFFER_SIZE),
            state_rx,
            raw_tx,
            fatal_tx,
        )
        .await;

        assert!(matches!(
            raw_rx.recv().await,
            Some(Inbound::Error(ClientError::Protocol(_)))
        ));
        assert!(matches!(
            raw_rx.recv().await,
            Some(Inbound::Error(ClientError::Io(_)))
        ));
        assert!(matches!(raw_rx.recv().await, Some(Inbound::Frame(_))));
        assert!(raw_rx.recv().await.is_none());

        // The mock ends with end-of-stream.
        assert!(matches!(
            fatal_rx.recv().await,
            Some(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_persistent_io_errors_escalate() {
        let mut builder = Builder::new();
        for _ in 0..MAX_CONSECUTIVE_IO_ERRORS {
            builder.read_error(io::Error::new(io::ErrorKind::Other, "flaky"));
        }
        // The builder keeps its own copy of each queued error; only the mock
        // may hold them while reading.
        let mock = builder.build();
        drop(builder);
        let (_state_tx, state_rx) = watch::channel(CloseState::Open);
        let (raw_tx, mut raw_rx, fatal_tx, mut fatal_rx) = channels();

        run(
            FrameReader::new(mock, DEFAULT_READ_BUFFER_SIZE),
            state_rx,
            raw_tx,
            fatal_tx,
        )
        .await;

        let mut forwarded = 0;
        while raw_rx.recv().await.is_some() {
            forwarded += 1;
        }
        assert_eq!(forwarded, MAX_CONSECUTIVE_IO_ERRORS - 1);
        assert!(matches!(fatal_rx.recv().await, Some(ClientError::Io(_))));
    }

    #[tokio::test]
    async fn test_eof_while_closing_is_quiet() {
        let mock = Builder::new().build();
        let (_state_tx, state_rx) = watch::channel(CloseState::Closing);
        let (raw_tx, mut raw_rx, fatal_tx, mut fatal_rx) = channels();

        run(
            FrameReader::new(mock, DEFAULT_READ_BUFFER_SIZE),
            state_rx,
            raw_tx,
            fatal_tx,
        )
        .await;

        assert!(raw_rx.recv().await.is_none());
        assert!(fatal_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (client, _server) = tokio::io::duplex(64);
        let (state_tx, state_rx) = watch::channel(CloseState::Open);
        let (raw_tx, mut raw_rx, fatal_tx, mut fatal_rx) = channels();

        let task = tokio::spawn(run(
            FrameReader::new(client, DEFAULT_READ_BUFFER_SIZE),
            state_rx,
            raw_tx,
            fatal_tx,
        ));
        state_tx.send_replace(CloseState::Closed);
        task.await.unwrap();

        assert!(raw_rx.recv().await.is_none());
        assert!(fatal_rx.recv().await.is_none());
    }
}
