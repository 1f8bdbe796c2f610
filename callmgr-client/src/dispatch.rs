//! Dispatch loop: classifies frames and fans them out.
//!
//! Owns the correlation table and the pending event/error queues. Outbound
//! streams are fed through `reserve()`, so a slow consumer never stalls frame
//! intake; instead the queues grow until `max_pending`, at which point the
//! connection is declared dead.

use crate::correlation::CorrelationTable;
use crate::error::ClientError;
use crate::poll::Inbound;
use crate::transport::ActionWriter;
use callmgr_protocol::{Event, Frame, FrameKind, Response};
use std::collections::VecDeque;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Requests from the session to the dispatch loop.
#[derive(Debug)]
pub(crate) enum Command {
    Register {
        id: String,
        slot: oneshot::Sender<Response>,
    },
    Forget {
        id: String,
    },
    Close {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Closing,
    Closed,
}

pub(crate) struct DispatchLoop<W> {
    pub writer: ActionWriter<W>,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub raw: mpsc::Receiver<Inbound>,
    pub events: mpsc::Sender<Event>,
    pub errors: mpsc::Sender<ClientError>,
    pub fatal: mpsc::Sender<ClientError>,
    pub max_pending: usize,
}

/// State that only the dispatch loop touches.
struct Pending {
    table: CorrelationTable,
    events: VecDeque<Event>,
    errors: VecDeque<ClientError>,
    limit: usize,
    events_attached: bool,
    errors_attached: bool,
}

impl Pending {
    fn new(limit: usize) -> Self {
        Self {
            table: CorrelationTable::new(),
            events: VecDeque::new(),
            errors: VecDeque::new(),
            limit,
            events_attached: true,
            errors_attached: true,
        }
    }

    fn register(&mut self, id: String, slot: oneshot::Sender<Response>) {
        if self.table.register(id.clone(), slot).is_some() {
            warn!("Action id {} reused while still pending", id);
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) -> Result<(), ClientError> {
        match inbound {
            Inbound::Frame(frame) => self.on_frame(frame),
            Inbound::Error(err) => self.push_error(err),
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), ClientError> {
        let kind = match FrameKind::of(&frame) {
            Ok(kind) => kind,
            Err(e) => {
                debug!("Dropping unrecognized frame: {}", e);
                return self.push_error(e.into());
            }
        };

        match kind {
            FrameKind::Response => match Response::from_frame(&frame) {
                Ok(response) => match self.table.resolve(response) {
                    Ok(()) => Ok(()),
                    Err(response) => {
                        debug!("No caller waiting for action id {}", response.id);
                        self.push_error(ClientError::UnmatchedResponse { id: response.id })
                    }
                },
                Err(e) => self.push_error(e.into()),
            },
            FrameKind::Event => match Event::from_frame(&frame) {
                Ok(event) => self.push_event(event),
                Err(e) => self.push_error(e.into()),
            },
        }
    }

    fn push_event(&mut self, event: Event) -> Result<(), ClientError> {
        if !self.events_attached {
            trace!("Discarding event {}, nobody is listening", event.name);
            return Ok(());
        }
        if self.events.len() >= self.limit {
            return Err(ClientError::QueueOverflow {
                queue: "event",
                limit: self.limit,
            });
        }
        self.events.push_back(event);
        Ok(())
    }

    fn push_error(&mut self, err: ClientError) -> Result<(), ClientError> {
        if !self.errors_attached {
            trace!("Discarding error, nobody is listening: {}", err);
            return Ok(());
        }
        if self.errors.len() >= self.limit {
            return Err(ClientError::QueueOverflow {
                queue: "error",
                limit: self.limit,
            });
        }
        self.errors.push_back(err);
        Ok(())
    }

    fn is_drained(&self) -> bool {
        self.events.is_empty() && self.errors.is_empty()
    }
}

impl<W: AsyncWrite + Unpin> DispatchLoop<W> {
    pub(crate) async fn run(self) {
        let DispatchLoop {
            writer,
            mut commands,
            mut raw,
            events,
            errors,
            fatal,
            max_pending,
        } = self;

        let mut pending = Pending::new(max_pending);
        let mut phase = Phase::Running;
        let mut intake_open = true;

        while phase == Phase::Running {
            if !intake_open && pending.is_drained() {
                debug!("Frame intake ended and queues drained");
                phase = Phase::Closing;
                break;
            }

            let has_event = !pending.events.is_empty();
            let has_error = !pending.errors.is_empty();

            // Commands first: a Register sent before its action was written
            // must land before the response frame is looked up. Delivery
            // comes before intake so the queues only grow while a consumer
            // lags.
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Register { id, slot }) => pending.register(id, slot),
                    Some(Command::Forget { id }) => {
                        pending.table.forget(&id);
                    }
                    Some(Command::Close { reply }) => {
                        debug!("Close requested, {} actions abandoned", pending.table.len());
                        let result = writer.close().await;
                        let _ = reply.send(result);
                        phase = Phase::Closed;
                    }
                    None => {
                        debug!("Session dropped, closing transport");
                        phase = Phase::Closing;
                    }
                },
                permit = events.reserve(), if has_event => match permit {
                    Ok(permit) => {
                        if let Some(event) = pending.events.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => {
                        debug!("Events stream dropped, discarding {} pending", pending.events.len());
                        pending.events.clear();
                        pending.events_attached = false;
                    }
                },
                permit = errors.reserve(), if has_error => match permit {
                    Ok(permit) => {
                        if let Some(err) = pending.errors.pop_front() {
                            permit.send(err);
                        }
                    }
                    Err(_) => {
                        debug!("Errors stream dropped, discarding {} pending", pending.errors.len());
                        pending.errors.clear();
                        pending.errors_attached = false;
                    }
                },
                inbound = raw.recv(), if intake_open => match inbound {
                    Some(inbound) => {
                        if let Err(overflow) = pending.on_inbound(inbound) {
                            warn!("Consumer too slow: {}", overflow);
                            let _ = fatal.try_send(overflow);
                            phase = Phase::Closing;
                        }
                    }
                    None => {
                        trace!("Poll loop finished");
                        intake_open = false;
                    }
                },
            }
        }

        if phase == Phase::Closing {
            if let Err(e) = writer.close().await {
                debug!("Transport shutdown failed: {}", e);
            }
        }
        // Dropping the table releases every waiter with ConnectionClosed, and
        // dropping the senders ends the outward streams.
        debug!("Dispatch loop exiting");
    }
}
