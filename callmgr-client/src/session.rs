//! Session: the public face of the client engine.
//!
//! A session owns one live link (transport plus the poll and dispatch loops)
//! at a time. Events, recoverable errors and the fatal notification are handed
//! out as [`SessionStreams`] per link, so a reconnect yields fresh streams.

use crate::config::{Credentials, SessionConfig};
use crate::correlation::ActionIds;
use crate::dispatch::{Command, DispatchLoop};
use crate::error::ClientError;
use crate::poll;
use crate::stream::ClientStream;
use crate::transport::{ActionWriter, Transport};
use callmgr_protocol::{Action, Event, Response};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the channel between the poll and dispatch loops.
const RAW_CHANNEL_CAPACITY: usize = 64;

/// Outward streams of one link.
///
/// `events` and `errors` end once the link is gone; `fatal` carries at most
/// one error, after which no further events are produced.
#[derive(Debug)]
pub struct SessionStreams {
    pub events: mpsc::Receiver<Event>,
    pub errors: mpsc::Receiver<ClientError>,
    pub fatal: mpsc::Receiver<ClientError>,
}

/// A response that has been requested but not yet awaited.
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    rx: oneshot::Receiver<Response>,
}

impl PendingResponse {
    /// The ActionID the response will carry.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the response with no deadline.
    pub async fn response(self) -> Result<Response, ClientError> {
        self.rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Waits at most `timeout` for the response.
    ///
    /// The correlation entry is left in place on timeout; a late response is
    /// dropped silently.
    pub async fn response_within(self, timeout: Duration) -> Result<Response, ClientError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                debug!("Action {} timed out after {:?}", self.id, timeout);
                Err(ClientError::Timeout)
            }
        }
    }
}

/// One transport with its two background loops.
struct Link<W> {
    commands: mpsc::UnboundedSender<Command>,
    writer: ActionWriter<W>,
    poll_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
}

impl<S> Link<WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn start(transport: Transport<S>, config: &SessionConfig) -> (Self, SessionStreams) {
        let (reader, writer) = transport.into_split();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let buffer = config.event_buffer.max(1);
        let (events_tx, events_rx) = mpsc::channel(buffer);
        let (errors_tx, errors_rx) = mpsc::channel(buffer);
        let (fatal_tx, fatal_rx) = mpsc::channel(1);

        let poll_task = tokio::spawn(poll::run(
            reader,
            writer.watch_state(),
            raw_tx,
            fatal_tx.clone(),
        ));
        let dispatch_task = tokio::spawn(
            DispatchLoop {
                writer: writer.clone(),
                commands: commands_rx,
                raw: raw_rx,
                events: events_tx,
                errors: errors_tx,
                fatal: fatal_tx,
                max_pending: config.max_pending.max(1),
            }
            .run(),
        );

        let link = Self {
            commands: commands_tx,
            writer,
            poll_task,
            dispatch_task,
        };
        let streams = SessionStreams {
            events: events_rx,
            errors: errors_rx,
            fatal: fatal_rx,
        };
        (link, streams)
    }
}

impl<W: AsyncWrite + Unpin> Link<W> {
    /// Registers a slot for the action's id, then writes it.
    async fn submit(&self, mut action: Action, ids: &ActionIds) -> Result<PendingResponse, ClientError> {
        let id = action.ensure_action_id(|| ids.next_id());
        let (slot, rx) = oneshot::channel();

        self.commands
            .send(Command::Register {
                id: id.clone(),
                slot,
            })
            .map_err(|_| ClientError::NotConnected)?;

        debug!("Sending action {} ({})", action.name, id);
        if let Err(e) = self.writer.write_action(&action).await {
            let _ = self.commands.send(Command::Forget { id });
            return Err(e);
        }

        Ok(PendingResponse { id, rx })
    }

    /// Stops both loops and waits for them, so the link's streams are closed
    /// when this returns.
    async fn shutdown(self) -> Result<(), ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let result = if self.commands.send(Command::Close { reply: reply_tx }).is_ok() {
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => self.writer.close().await,
            }
        } else {
            self.writer.close().await
        };

        if let Err(e) = self.dispatch_task.await {
            warn!("Dispatch loop ended abnormally: {}", e);
        }
        if let Err(e) = self.poll_task.await {
            warn!("Poll loop ended abnormally: {}", e);
        }
        result
    }
}

/// An AMI session.
///
/// Actions may be sent concurrently through `&self`; operations that replace
/// the connection or the credentials take `&mut self`.
pub struct Session {
    config: SessionConfig,
    ids: ActionIds,
    /// Last accepted login, replayed on reconnect.
    credentials: Option<Credentials>,
    authenticated: bool,
    link: Option<Link<WriteHalf<ClientStream>>>,
}

impl Session {
    /// Opens a connection, starts the loops and logs in when the
    /// configuration carries credentials.
    pub async fn connect(config: SessionConfig) -> Result<(Self, SessionStreams), ClientError> {
        let transport = Transport::open(&config).await?;
        info!("Connected to {} ({})", config.addr, transport.banner());

        let (link, streams) = Link::start(transport, &config);
        let mut session = Self {
            ids: ActionIds::new(config.id_prefix.clone()),
            credentials: None,
            authenticated: false,
            link: Some(link),
            config,
        };

        if let Some(creds) = session.config.login_credentials().cloned() {
            session.login(&creds.username, &creds.secret).await?;
        }

        Ok((session, streams))
    }

    /// Sends an action and returns a handle for its response.
    ///
    /// An ActionID is generated unless the action already has one; a
    /// caller-supplied id is kept as is.
    pub async fn async_action(&self, action: Action) -> Result<PendingResponse, ClientError> {
        let link = self.link.as_ref().ok_or(ClientError::NotConnected)?;
        link.submit(action, &self.ids).await
    }

    /// Sends an action and waits at most `timeout` for its response.
    pub async fn action(&self, action: Action, timeout: Duration) -> Result<Response, ClientError> {
        self.async_action(action)
            .await?
            .response_within(timeout)
            .await
    }

    /// [`Session::action`] with the configured default timeout.
    pub async fn call(&self, action: Action) -> Result<Response, ClientError> {
        self.action(action, self.config.action_timeout).await
    }

    pub async fn ping(&self) -> Result<Response, ClientError> {
        self.call(Action::new("Ping")).await
    }

    /// Authenticates the session.
    ///
    /// On success the credentials are kept and replayed after a reconnect.
    pub async fn login(&mut self, username: &str, secret: &str) -> Result<(), ClientError> {
        let action = Action::new("Login")
            .with_param("Username", username)
            .with_param("Secret", secret);
        let response = self.call(action).await?;

        if response.is_error() {
            let message = response
                .message()
                .unwrap_or("authentication rejected")
                .to_string();
            warn!("Login as {} rejected: {}", username, message);
            return Err(ClientError::AuthFailed(message));
        }

        info!("Logged in as {}", username);
        self.credentials = Some(Credentials::new(username, secret));
        self.authenticated = true;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The user the session is logged in as.
    pub fn username(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .filter(|_| self.authenticated)
            .map(|c| c.username.as_str())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the current link has been shut down.
    pub fn is_closed(&self) -> bool {
        self.link.as_ref().map_or(true, |link| link.writer.is_closed())
    }

    /// Replaces the connection.
    ///
    /// The current link is shut down first (its streams end), then a new one
    /// is opened and the last successful login is replayed. Responses still
    /// pending on the old link resolve with `ConnectionClosed`.
    ///
    /// When the replayed login is rejected the new link is shut down again and
    /// the session is left disconnected; the credentials are kept, so a later
    /// reconnect retries them.
    pub async fn reconnect(&mut self) -> Result<SessionStreams, ClientError> {
        self.authenticated = false;
        if let Some(link) = self.link.take() {
            if let Err(e) = link.shutdown().await {
                debug!("Old transport did not shut down cleanly: {}", e);
            }
        }

        info!("Reconnecting to {}", self.config.addr);
        let transport = Transport::open(&self.config).await?;
        let (link, streams) = Link::start(transport, &self.config);
        self.link = Some(link);

        if let Some(creds) = self.credentials.clone() {
            if let Err(e) = self.login(&creds.username, &creds.secret).await {
                if let Some(link) = self.link.take() {
                    if let Err(close_err) = link.shutdown().await {
                        debug!("Transport shutdown after failed login: {}", close_err);
                    }
                }
                return Err(e);
            }
        }

        Ok(streams)
    }

    /// Logs off and closes the connection.
    ///
    /// The Logoff is best effort; its outcome does not affect the result.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let Some(link) = self.link.as_ref() else {
            return Ok(());
        };
        link.writer.begin_close();

        if let Err(e) = self.call(Action::new("Logoff")).await {
            debug!("Logoff not acknowledged: {}", e);
        }

        match self.link.take() {
            Some(link) => {
                let result = link.shutdown().await;
                info!("Session to {} closed", self.config.addr);
                result
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.config.addr)
            .field("username", &self.username())
            .field("closed", &self.is_closed())
            .finish()
    }
}
