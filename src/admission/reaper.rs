//! Background expiry of client state.
//!
//! Every armed client key owns a small timer task whose deadline lives in a
//! watch channel. Resetting a timer publishes a new deadline; a deadline
//! that passes untouched posts the key onto the reaper queue. Only the
//! reaper removes entries from the store tables.

use std::sync::Weak;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use super::key::ClientKey;
use super::store::Tables;
use crate::error::Result;

/// Handle to a running reaper worker.
pub(super) struct Reaper {
    /// Runtime driving the reaper and every timer task
    runtime: Handle,
    /// Expiry signals, one per fired timer
    queue: mpsc::UnboundedSender<ClientKey>,
}

impl Reaper {
    /// Start a reaper on its own thread.
    ///
    /// The worker holds the tables weakly, and winds down once the owning
    /// store and all of its timers are gone.
    pub(super) fn spawn(tables: Weak<Mutex<Tables>>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let handle = runtime.handle().clone();
        let (queue, signals) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("turnstile-reaper".to_string())
            .spawn(move || runtime.block_on(reap(tables, signals)))?;

        debug!("Reaper started");
        Ok(Self {
            runtime: handle,
            queue,
        })
    }

    /// Arm a timer for `key` firing at `deadline`.
    ///
    /// The returned sender resets the timer. Dropping it (or dropping the
    /// entry holding it) disarms the timer.
    pub(super) fn arm(&self, key: ClientKey, deadline: Instant) -> watch::Sender<Instant> {
        let (timer, deadlines) = watch::channel(deadline);
        self.runtime
            .spawn(run_timer(key, deadlines, self.queue.clone()));
        timer
    }
}

async fn reap(tables: Weak<Mutex<Tables>>, mut signals: mpsc::UnboundedReceiver<ClientKey>) {
    while let Some(key) = signals.recv().await {
        let Some(tables) = tables.upgrade() else {
            break;
        };

        if tables.lock().forget(&key) {
            debug!(key = %key, "Client state reaped");
        }
    }

    trace!("Reaper stopped");
}

async fn run_timer(
    key: ClientKey,
    mut deadline: watch::Receiver<Instant>,
    queue: mpsc::UnboundedSender<ClientKey>,
) {
    loop {
        let at = *deadline.borrow_and_update();

        tokio::select! {
            _ = time::sleep_until(at) => {
                match deadline.has_changed() {
                    // Reset while we were waking up
                    Ok(true) => continue,
                    Ok(false) => {
                        trace!(key = %key, "Expiry timer fired");
                        let _ = queue.send(key);
                        return;
                    }
                    Err(_) => return,
                }
            }
            changed = deadline.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
