//! Capacity-1 hand-off between the transcript forwarder and the orchestrator.
//!
//! While a turn is in flight the next final transcript waits here. A newer one
//! replaces it (latest wins), so overlapping speech never queues up a backlog
//! of stale turns.

use crate::recognition::TranscriptEvent;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct SlotState {
    held: Option<TranscriptEvent>,
    closed: bool,
}

/// Single-producer, single-consumer, latest-wins slot.
///
/// ## Rust Concepts:
/// - **std Mutex + Notify**: the lock is only held to swap an `Option`, never
///   across an `.await`; `Notify` wakes the waiting consumer
/// - **notify_one permits**: a wake-up sent before the consumer starts waiting
///   is stored, so `take` cannot miss an `offer`
#[derive(Debug, Default)]
pub struct TranscriptSlot {
    state: Mutex<SlotState>,
    notify: Notify,
}

impl TranscriptSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `event` for the next turn. Returns the event it replaced, if any.
    ///
    /// Offers to a closed slot are dropped.
    pub fn offer(&self, event: TranscriptEvent) -> Option<TranscriptEvent> {
        let superseded = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return None;
            }
            state.held.replace(event)
        };
        self.notify.notify_one();
        superseded
    }

    /// Wait for the next held event. `None` once the slot is closed.
    ///
    /// An event still held at close time is not delivered.
    pub async fn take(&self) -> Option<TranscriptEvent> {
        loop {
            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.closed {
                    return None;
                }
                if let Some(event) = state.held.take() {
                    return Some(event);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Drop any held event and release the consumer.
    pub fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.closed = true;
            state.held = None;
        }
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}
