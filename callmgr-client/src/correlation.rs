//! Correlation of responses to the actions that requested them.
//!
//! The table is owned by the dispatch loop and never shared; callers only
//! hold the receiving end of the one-shot slot they registered.

use callmgr_protocol::Response;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Generates action ids: a fixed prefix followed by a counter.
///
/// Lives on the session, so ids stay unique across reconnects.
#[derive(Debug)]
pub struct ActionIds {
    prefix: String,
    next: AtomicU64,
}

impl ActionIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

/// Pending one-shot slots keyed by action id.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    slots: HashMap<String, oneshot::Sender<Response>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `slot` under `id`.
    ///
    /// Returns the slot it displaced when `id` was already live; dropping it
    /// releases the older waiter.
    pub fn register(
        &mut self,
        id: String,
        slot: oneshot::Sender<Response>,
    ) -> Option<oneshot::Sender<Response>> {
        self.slots.insert(id, slot)
    }

    /// Delivers `response` to its slot and deletes the entry.
    ///
    /// Returns the response back when no slot is registered for its id. A
    /// slot whose receiver is gone (timed-out caller) still counts as
    /// delivered.
    pub fn resolve(&mut self, response: Response) -> Result<(), Response> {
        match self.slots.remove(&response.id) {
            Some(slot) => {
                if slot.send(response).is_err() {
                    tracing::trace!("Response arrived after its caller stopped waiting");
                }
                Ok(())
            }
            None => Err(response),
        }
    }

    /// Removes the entry for `id` without delivering anything.
    pub fn forget(&mut self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
