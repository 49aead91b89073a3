//! Shared per-client counter and ban state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::key::ClientKey;
use super::policy::{Policy, EVER, UNLIMITED};
use super::reaper::Reaper;

/// Access history of a single client key.
#[derive(Default)]
struct ClientEntry {
    /// Accesses seen since the entry was created
    count: u64,
    /// Resets the pending expiry, if one is armed
    pending_expiry: Option<watch::Sender<Instant>>,
}

/// Tables guarded by the store mutex.
#[derive(Default)]
pub(super) struct Tables {
    clients: HashMap<ClientKey, ClientEntry>,
    banned: HashSet<ClientKey>,
}

impl Tables {
    /// Forget everything about `key`. Returns whether an entry existed.
    pub(super) fn forget(&mut self, key: &ClientKey) -> bool {
        self.banned.remove(key);
        self.clients.remove(key).is_some()
    }

    /// Arm or reset the expiry timer of an existing entry.
    fn expire(&mut self, reaper: Option<&Reaper>, key: &ClientKey, duration: Duration) {
        let Some(reaper) = reaper else {
            return;
        };
        let Some(entry) = self.clients.get_mut(key) else {
            return;
        };
        // Too far in the future to ever fire
        let Some(deadline) = Instant::now().checked_add(duration) else {
            return;
        };

        let reset = entry
            .pending_expiry
            .as_ref()
            .is_some_and(|timer| timer.send(deadline).is_ok());

        if !reset {
            entry.pending_expiry = Some(reaper.arm(key.clone(), deadline));
        }

        trace!(key = %key, reset, ?duration, "Expiry armed");
    }
}

/// Counters and bans shared by every [`Policy`] derived from one root.
///
/// All state sits behind a single mutex. Entries are only ever removed by
/// the reaper once their idle window passes, or by [`clear`](Self::clear).
pub struct StateStore {
    tables: Arc<Mutex<Tables>>,
    /// Started on first use
    reaper: OnceLock<Option<Reaper>>,
}

impl StateStore {
    /// Create an empty store. The reaper starts lazily.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            reaper: OnceLock::new(),
        }
    }

    fn reaper(&self) -> Option<&Reaper> {
        self.reaper
            .get_or_init(|| match Reaper::spawn(Arc::downgrade(&self.tables)) {
                Ok(reaper) => Some(reaper),
                Err(e) => {
                    warn!(error = %e, "Failed to start reaper, client state will never expire");
                    None
                }
            })
            .as_ref()
    }

    /// Record an access by `key` under `policy`.
    ///
    /// Bans the key once its count exceeds the policy threshold, and pushes
    /// its expiry out to one window from now.
    pub fn count(&self, policy: &Policy, key: &ClientKey) {
        let window = policy.window();
        let reaper = if window > EVER { self.reaper() } else { None };

        let mut tables = self.tables.lock();

        let entry = tables.clients.entry(key.clone()).or_insert_with(|| {
            trace!(key = %key, "Creating client entry");
            ClientEntry::default()
        });
        entry.count = entry.count.saturating_add(1);
        let count = entry.count;

        let threshold = policy.threshold();
        if threshold != UNLIMITED && count > threshold && tables.banned.insert(key.clone()) {
            debug!(key = %key, count, threshold, "Client banned");
        }

        if window > EVER {
            tables.expire(reaper, key, window);
        }
    }

    /// Whether `key` may pass `policy` on its own account.
    pub fn allowed(&self, policy: &Policy, key: &ClientKey) -> bool {
        if policy.threshold() == UNLIMITED {
            return true;
        }

        !self.tables.lock().banned.contains(key)
    }

    /// Expire everything about `key` once `duration` has passed from now.
    ///
    /// Replaces any expiry already pending for the key. Keys without an
    /// entry are left alone.
    pub fn expire(&self, key: &ClientKey, duration: Duration) {
        let reaper = self.reaper();
        self.tables.lock().expire(reaper, key, duration);
    }

    /// Get the access count recorded for `key`.
    ///
    /// Returns `None` if the store holds no entry for the key.
    pub fn access_count(&self, key: &ClientKey) -> Option<u64> {
        self.tables.lock().clients.get(key).map(|entry| entry.count)
    }

    /// Whether `key` is currently banned.
    pub fn is_banned(&self, key: &ClientKey) -> bool {
        self.tables.lock().banned.contains(key)
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.tables.lock().clients.len()
    }

    /// Forget all clients and bans, disarming their timers.
    pub fn clear(&self) {
        let mut tables = self.tables.lock();
        tables.clients.clear();
        tables.banned.clear();
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("StateStore")
            .field("clients", &tables.clients.len())
            .field("banned", &tables.banned.len())
            .finish()
    }
}
