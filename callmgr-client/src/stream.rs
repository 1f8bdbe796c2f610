//! Client stream abstraction for TLS and plain TCP.

use crate::error::ClientError;
use crate::tls::{build_connector, TlsClientConfig};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;

pin_project! {
    /// A manager connection stream, either plain TCP or TLS.
    #[project = ClientStreamProj]
    pub enum ClientStream {
        Plain { #[pin] stream: TcpStream },
        Tls { #[pin] stream: ClientTlsStream<TcpStream> },
    }
}

impl ClientStream {
    /// Connects to `addr` (`host:port`), upgrading to TLS when configured.
    pub async fn connect(addr: &str, tls: Option<&TlsClientConfig>) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", addr);
        let tcp_stream = TcpStream::connect(addr).await.map_err(|e| {
            tracing::debug!("Connection to {} failed: {}", addr, e);
            ClientError::Io(e)
        })?;
        tcp_stream.set_nodelay(true).ok();

        let Some(tls_config) = tls else {
            return Ok(ClientStream::Plain { stream: tcp_stream });
        };

        let (connector, server_name) = build_connector(tls_config, host_of(addr))?;
        tracing::debug!("Performing TLS handshake...");
        let stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| ClientError::TlsHandshake(e.to_string()))?;
        tracing::debug!("TLS handshake complete");
        Ok(ClientStream::Tls { stream })
    }

    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, ClientStream::Tls { .. })
    }
}

/// Host part of a `host:port` address, without IPv6 brackets.
fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_read(cx, buf),
            ClientStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_write(cx, buf),
            ClientStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_flush(cx),
            ClientStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            ClientStreamProj::Plain { stream } => stream.poll_shutdown(cx),
            ClientStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("pbx.example.com:5038"), "pbx.example.com");
        assert_eq!(host_of("10.1.2.3:5039"), "10.1.2.3");
        assert_eq!(host_of("[::1]:5038"), "::1");
        assert_eq!(host_of("pbx"), "pbx");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = ClientStream::connect(&addr, None).await.err().unwrap();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
