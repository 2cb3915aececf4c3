//! Hand-off queue between an upstream fetch and a streaming response body.
//!
//! One producer pushes lines and finally marks the channel finished; one
//! consumer pulls with a bounded wait. The channel is shared through an
//! `Arc`, so it lives as long as the longer-lived side holds it.
//!
//! [`RelayChannel::try_take`] distinguishes three outcomes so a transiently
//! empty channel is never mistaken for a closed one:
//! - [`Take::Data`]: one chunk, in push order
//! - [`Take::Empty`]: nothing arrived within the wait, producer still running
//! - [`Take::Closed`]: producer finished and every chunk has been taken

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

/// Outcome of [`RelayChannel::try_take`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Take {
    Data(Bytes),
    Empty,
    Closed,
}

#[derive(Default)]
struct RelayState {
    pending: VecDeque<Bytes>,
    finished: bool,
}

/// FIFO of byte chunks plus a monotonic completion flag.
#[derive(Default)]
pub struct RelayChannel {
    state: Mutex<RelayState>,
    notify: Notify,
}

impl RelayChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        // The state is a queue and a flag; both stay consistent even if a
        // holder panicked, so recover the guard instead of propagating.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk and wake the consumer.
    pub fn push(&self, chunk: Bytes) {
        self.lock().pending.push_back(chunk);
        self.notify.notify_one();
    }

    /// Mark the producer as done and wake the consumer. Never reverts.
    pub fn mark_finished(&self) {
        self.lock().finished = true;
        self.notify.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Number of chunks not yet taken.
    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    fn take_now(&self) -> Option<Take> {
        let mut state = self.lock();
        if let Some(chunk) = state.pending.pop_front() {
            Some(Take::Data(chunk))
        } else if state.finished {
            Some(Take::Closed)
        } else {
            None
        }
    }

    /// Take one chunk, waiting up to `max_wait` when nothing is pending.
    ///
    /// The lock is released before waiting and before the caller does
    /// anything with the returned chunk.
    pub async fn try_take(&self, max_wait: Duration) -> Take {
        if let Some(taken) = self.take_now() {
            return taken;
        }

        // A push between the check above and this wait leaves a stored
        // permit on `notify`, so the wakeup is not lost.
        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;

        self.take_now().unwrap_or(Take::Empty)
    }
}
