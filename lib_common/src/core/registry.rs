//! # Subscriber Registry
//!
//! Tracks the listener set of every live subscriber session, keyed by the
//! session's client id.
//!
//! A session's listener set is replaced as a whole: when a client subscribes
//! again under an id that is already registered, the old set is detached (its
//! cancellation token fires and each detach hook runs) and the new set is
//! attached inside the same critical section. No event can reach the session
//! through the old listeners once the new ones are in place, and a reconnecting
//! client never accumulates listeners.
//!
//! Lock order is registry, then service state, then dispatcher. The attach
//! callback runs with the registry lock held and may take the other two.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::utils::lock_or_recover;

/// Undoes one attachment (typically removes a listener from a dispatcher).
pub type Detacher = Box<dyn FnOnce() + Send>;

struct ListenerSet {
    generation: u64,
    token: CancellationToken,
    detachers: Vec<Detacher>,
}

impl ListenerSet {
    fn detach(self) {
        self.token.cancel();
        for detach in self.detachers {
            detach();
        }
    }
}

/// # Subscription
///
/// Handed back to the caller of [`Registry::resubscribe`]. The `token` is
/// cancelled when the session is replaced or released; `generation` tells
/// [`Registry::release`] which incarnation of the session is ending.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// The client id the session is registered under.
    pub session: String,
    /// Unique per attach; a later resubscribe gets a larger value.
    pub generation: u64,
    /// Fires when this incarnation is detached.
    pub token: CancellationToken,
}

/// # Registry
pub struct Registry {
    sessions: Mutex<HashMap<String, ListenerSet>>,
    next_generation: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// # Resubscribe
    ///
    /// Detaches whatever listener set `session` currently has, then runs
    /// `attach` to build the new one. `attach` receives the new incarnation's
    /// cancellation token and returns the detach hooks for everything it
    /// attached.
    ///
    /// If `attach` fails the session is left unregistered.
    pub fn resubscribe<F, E>(&self, session: &str, attach: F) -> Result<Subscription, E>
    where
        F: FnOnce(&CancellationToken) -> Result<Vec<Detacher>, E>,
    {
        let mut sessions = lock_or_recover(&self.sessions);

        if let Some(previous) = sessions.remove(session) {
            tracing::info!(session, generation = previous.generation, "replacing subscriber session");
            previous.detach();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let detachers = attach(&token)?;

        sessions.insert(
            session.to_string(),
            ListenerSet {
                generation,
                token: token.clone(),
                detachers,
            },
        );

        Ok(Subscription {
            session: session.to_string(),
            generation,
            token,
        })
    }

    /// Detaches `session` if it is still at `generation`. A session that was
    /// already replaced by a newer subscribe is left alone. Returns whether
    /// anything was detached.
    pub fn release(&self, session: &str, generation: u64) -> bool {
        let mut sessions = lock_or_recover(&self.sessions);
        match sessions.get(session) {
            Some(set) if set.generation == generation => {
                if let Some(set) = sessions.remove(session) {
                    set.detach();
                }
                tracing::debug!(session, generation, "subscriber session released");
                true
            }
            _ => false,
        }
    }

    /// Detaches every session.
    pub fn release_all(&self) {
        let drained: Vec<ListenerSet> = lock_or_recover(&self.sessions).drain().map(|(_, set)| set).collect();
        for set in drained {
            set.detach();
        }
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        lock_or_recover(&self.sessions).len()
    }
}
