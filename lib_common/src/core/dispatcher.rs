//! # Event Dispatcher
//!
//! Every live-state service owns one `Dispatcher` and uses it to announce its
//! events (diff changes, fetch errors, fetch successes) to whoever listens:
//! push sessions, the taxonomy aggregator, the monitor.
//!
//! ## Core Design Principles:
//!
//! 1.  **Shared Fan-out**: An event is wrapped in an `Arc` once and every
//!     listener receives a clone of the pointer, never of the payload.
//!
//! 2.  **Never Blocks the Producer**: Listeners are unbounded MPSC senders, so a
//!     broadcast from inside a poll cycle completes without awaiting anyone.
//!
//! 3.  **Self-Cleaning**: A listener whose receiver is gone is dropped during the
//!     next broadcast (`retain` on send failure). Explicit removal by id is also
//!     supported so a session can detach before its receiver is dropped.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::utils::lock_or_recover;

/// Identifies one registered listener; returned by the `add_*` methods.
pub type ListenerId = u64;

/// # Listener Handle
///
/// A registered listener: a label for the logs and the sending half of its
/// channel.
struct ListenerHandle<E> {
    id: ListenerId,
    label: String,
    sender: mpsc::UnboundedSender<Arc<E>>,
}

/// # Dispatcher
///
/// Registers, deregisters and broadcasts to listeners of events of type `E`.
pub struct Dispatcher<E> {
    listeners: Mutex<Vec<ListenerHandle<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Dispatcher<E> {
    /// Creates a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// # Add Listener
    ///
    /// Creates a new unbounded channel, registers its sending half and hands the
    /// receiving half back to the caller.
    pub fn add_listener(&self, label: &str) -> (ListenerId, mpsc::UnboundedReceiver<Arc<E>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.attach(label, tx), rx)
    }

    /// Registers an existing sender. Several dispatchers can feed the same
    /// channel this way.
    pub fn attach(&self, label: &str, sender: mpsc::UnboundedSender<Arc<E>>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_or_recover(&self.listeners).push(ListenerHandle {
            id,
            label: label.to_string(),
            sender,
        });
        tracing::debug!(listener = label, id, "listener attached");
        id
    }

    /// Removes one listener. Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock_or_recover(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        before != listeners.len()
    }

    /// Number of listeners currently attached.
    pub fn listener_count(&self) -> usize {
        lock_or_recover(&self.listeners).len()
    }

    /// # Broadcast
    ///
    /// Sends `event` to every listener in registration order. Listeners whose
    /// receiver was dropped are removed.
    pub fn broadcast(&self, event: E) {
        let event = Arc::new(event);
        let mut listeners = lock_or_recover(&self.listeners);
        listeners.retain(|listener| match listener.sender.send(Arc::clone(&event)) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(listener = %listener.label, "listener disconnected, removing");
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_listener() {
        let dispatcher = Dispatcher::new();
        let (_, mut a) = dispatcher.add_listener("a");
        let (_, mut b) = dispatcher.add_listener("b");

        dispatcher.broadcast(7u32);

        assert_eq!(*a.recv().await.unwrap(), 7);
        assert_eq!(*b.recv().await.unwrap(), 7);
    }

    #[test]
    fn test_dropped_receiver_is_pruned_on_broadcast() {
        let dispatcher = Dispatcher::new();
        let (_, rx) = dispatcher.add_listener("gone");
        let (_, _kept) = dispatcher.add_listener("kept");
        drop(rx);

        dispatcher.broadcast("x");

        assert_eq!(dispatcher.listener_count(), 1);
    }

    #[test]
    fn test_remove_listener_by_id() {
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let (id, _rx) = dispatcher.add_listener("a");
        assert!(dispatcher.remove_listener(id));
        assert!(!dispatcher.remove_listener(id));
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_shares_one_channel_across_dispatchers() {
        let first = Dispatcher::new();
        let second = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        first.attach("session", tx.clone());
        second.attach("session", tx);

        first.broadcast(1);
        second.broadcast(2);

        assert_eq!(*rx.recv().await.unwrap(), 1);
        assert_eq!(*rx.recv().await.unwrap(), 2);
    }
}
