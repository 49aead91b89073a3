//! Immutable admission-control policies and the decision pipeline.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use super::handler::{Handler, Request, Response};
use super::key::{remote_key, ClientKey, KeyExtractor};
use super::reject::Then;
use super::store::StateStore;

/// Threshold meaning "never count, never ban".
pub const UNLIMITED: u64 = 0;

/// Window meaning "a ban, once set, never expires".
pub const EVER: Duration = Duration::ZERO;

/// Counted, idle-window access control in front of a [`Handler`].
///
/// A `Policy` is an immutable value. Every builder method returns a new
/// policy with one setting changed and leaves the receiver untouched; all
/// policies derived from the same root share one [`StateStore`].
///
/// A policy is itself a [`Handler`]: calling it counts the request, checks
/// the client's standing and then either forwards to the downstream handler
/// or runs the reject chain.
#[derive(Clone)]
pub struct Policy {
    inner: Arc<PolicyInner>,
}

#[derive(Clone)]
struct PolicyInner {
    /// Shared with every policy derived from the same root
    store: Arc<StateStore>,
    /// Accesses allowed before a client is banned
    threshold: u64,
    /// Idle time after which a client's history is forgotten
    window: Duration,
    /// Handler receiving admitted requests
    downstream: Option<Arc<dyn Handler>>,
    /// Handlers run, in order, for denied requests
    then: Vec<Then>,
    /// Policy whose decision this one also requires. Not an owning edge.
    following: Option<Weak<PolicyInner>>,
    /// Derives the client key of a request
    key_fn: KeyExtractor,
}

/// Create a root policy allowing `count` accesses per client.
pub fn allow(count: u64) -> Policy {
    Policy::new().allow(count)
}

/// Create a root policy whose clients are forgotten after `window` of silence.
pub fn per(window: Duration) -> Policy {
    Policy::new().per(window)
}

/// Create a root policy forwarding admitted requests to `handler`.
pub fn to(handler: impl Handler + 'static) -> Policy {
    Policy::new().to(handler)
}

impl Policy {
    /// Create a root policy with a fresh store.
    ///
    /// The root is unlimited, never expires and has no downstream handler.
    pub fn new() -> Self {
        Self::from_inner(PolicyInner {
            store: Arc::new(StateStore::new()),
            threshold: UNLIMITED,
            window: EVER,
            downstream: None,
            then: Vec::new(),
            following: None,
            key_fn: Arc::new(remote_key),
        })
    }

    fn from_inner(inner: PolicyInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    fn with(&self, change: impl FnOnce(&mut PolicyInner)) -> Self {
        let mut inner = (*self.inner).clone();
        change(&mut inner);
        Self::from_inner(inner)
    }

    /// Return a copy allowing `count` accesses per client.
    pub fn allow(&self, count: u64) -> Self {
        self.with(|p| p.threshold = count)
    }

    /// Return a copy that forgets a client after `window` of silence.
    pub fn per(&self, window: Duration) -> Self {
        self.with(|p| p.window = window)
    }

    /// Return a copy forwarding admitted requests to `handler`.
    pub fn to(&self, handler: impl Handler + 'static) -> Self {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        self.with(|p| p.downstream = Some(handler))
    }

    /// Return a copy running `handlers` when a request is denied.
    ///
    /// Replaces any reject chain already configured. With an empty chain a
    /// denied request still reaches the downstream handler.
    pub fn then<I>(&self, handlers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Then>,
    {
        let then: Vec<Then> = handlers.into_iter().map(Into::into).collect();
        self.with(|p| p.then = then)
    }

    /// Return a copy deriving client keys with `key_fn`.
    pub fn key_by<F>(&self, key_fn: F) -> Self
    where
        F: Fn(&Request) -> ClientKey + Send + Sync + 'static,
    {
        let key_fn: KeyExtractor = Arc::new(key_fn);
        self.with(|p| p.key_fn = key_fn)
    }

    /// Create a policy that takes its admission decisions from this one.
    ///
    /// The follower shares this policy's store but never counts on its own;
    /// it can carry its own downstream handler and reject chain.
    ///
    /// The follower holds this policy weakly. Keep the followed policy alive:
    /// once it is dropped the follower admits every request, so a follower
    /// built on a temporary, e.g. `allow(1).follower().then([Deny])`, never
    /// rejects anything.
    pub fn follower(&self) -> Self {
        Self::from_inner(PolicyInner {
            store: Arc::clone(&self.inner.store),
            threshold: UNLIMITED,
            window: EVER,
            downstream: None,
            then: Vec::new(),
            following: Some(Arc::downgrade(&self.inner)),
            key_fn: Arc::clone(&self.inner.key_fn),
        })
    }

    /// Get the threshold.
    pub fn threshold(&self) -> u64 {
        self.inner.threshold
    }

    /// Get the idle window.
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Get the shared store.
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Whether a downstream handler is configured.
    pub fn has_downstream(&self) -> bool {
        self.inner.downstream.is_some()
    }

    /// Get the number of handlers in the reject chain.
    pub fn reject_chain_len(&self) -> usize {
        self.inner.then.len()
    }

    /// Whether this policy follows another.
    pub fn is_follower(&self) -> bool {
        self.inner.following.is_some()
    }

    /// Derive the client key of `req`.
    pub fn key_for(&self, req: &Request) -> ClientKey {
        (self.inner.key_fn)(req)
    }

    /// Whether `req` is admitted by this policy and every policy it follows.
    ///
    /// Does not count the request.
    pub fn allows(&self, req: &Request) -> bool {
        self.granted(&self.key_for(req), req)
    }

    fn granted(&self, key: &ClientKey, req: &Request) -> bool {
        let own = self.inner.store.allowed(self, key);
        own && self.followed().map_or(true, |followed| followed.allows(req))
    }

    fn followed(&self) -> Option<Policy> {
        let following = self.inner.following.as_ref()?;
        match following.upgrade() {
            Some(inner) => Some(Policy { inner }),
            None => {
                debug!("Followed policy was dropped, follower admits on its own");
                None
            }
        }
    }
}

impl Handler for Policy {
    fn call(&self, res: &mut Response, req: &Request) {
        let key = self.key_for(req);
        let downstream = self.inner.downstream.as_deref();

        if self.inner.threshold != UNLIMITED {
            self.inner.store.count(self, &key);
        }

        if !self.granted(&key, req) && !self.inner.then.is_empty() {
            trace!(key = %key, handlers = self.inner.then.len(), "Request denied");
            for handler in &self.inner.then {
                handler.invoke(&self.inner.store, &key, downstream, res, req);
            }
        } else if let Some(downstream) = downstream {
            downstream.call(res, req);
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("threshold", &self.inner.threshold)
            .field("window", &self.inner.window)
            .field("downstream", &self.has_downstream())
            .field("then", &self.inner.then)
            .field("follower", &self.is_follower())
            .finish()
    }
}
