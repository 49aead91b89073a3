//! Reject handlers: what happens to a request once it has been denied.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tracing::debug;

use super::handler::{Handler, Request, Response};
use super::key::ClientKey;
use super::store::StateStore;

/// Body written by [`Deny`].
const DENIED_BODY: &str = "rate limited";

/// Decides what happens to a denied request.
///
/// `next` is the downstream handler of the denying policy, if any.
pub trait RejectHandler: Send + Sync {
    fn reject(&self, next: Option<&dyn Handler>, res: &mut Response, req: &Request);
}

impl<F> RejectHandler for F
where
    F: Fn(Option<&dyn Handler>, &mut Response, &Request) + Send + Sync,
{
    fn reject(&self, next: Option<&dyn Handler>, res: &mut Response, req: &Request) {
        self(next, res, req)
    }
}

/// A reject handler that needs the denying policy's store.
///
/// The store and the client key are supplied by the policy at the moment
/// the handler runs, never at construction.
pub trait StatefulRejectHandler: Send + Sync {
    fn reject(
        &self,
        store: &StateStore,
        key: &ClientKey,
        next: Option<&dyn Handler>,
        res: &mut Response,
        req: &Request,
    );
}

/// Forwards denied requests to the downstream handler unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pass;

impl RejectHandler for Pass {
    fn reject(&self, next: Option<&dyn Handler>, res: &mut Response, req: &Request) {
        if let Some(next) = next {
            next.call(res, req);
        }
    }
}

/// Answers denied requests with `429 Too Many Requests`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deny;

impl RejectHandler for Deny {
    fn reject(&self, _next: Option<&dyn Handler>, res: &mut Response, _req: &Request) {
        *res.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        *res.body_mut() = DENIED_BODY.to_string();
    }
}

/// Keeps a denied client banned until the wrapped duration has passed since
/// its last request, instead of the policy's own window.
#[derive(Debug, Clone, Copy)]
pub struct ExtendBan(pub Duration);

impl StatefulRejectHandler for ExtendBan {
    fn reject(
        &self,
        store: &StateStore,
        key: &ClientKey,
        _next: Option<&dyn Handler>,
        _res: &mut Response,
        _req: &Request,
    ) {
        debug!(key = %key, ban = ?self.0, "Extending ban");
        store.expire(key, self.0);
    }
}

/// One entry of a policy's reject chain.
#[derive(Clone)]
pub enum Then {
    /// Runs on the request alone
    Stateless(Arc<dyn RejectHandler>),
    /// Runs bound to the denying policy's store
    Stateful(Arc<dyn StatefulRejectHandler>),
}

impl Then {
    /// See [`Pass`].
    pub fn pass() -> Self {
        Self::from(Pass)
    }

    /// See [`Deny`].
    pub fn deny() -> Self {
        Self::from(Deny)
    }

    /// See [`ExtendBan`].
    pub fn extend_ban(duration: Duration) -> Self {
        Self::from(ExtendBan(duration))
    }

    /// Wrap a store-bound handler.
    pub fn stateful(handler: impl StatefulRejectHandler + 'static) -> Self {
        Self::Stateful(Arc::new(handler))
    }

    pub(super) fn invoke(
        &self,
        store: &StateStore,
        key: &ClientKey,
        next: Option<&dyn Handler>,
        res: &mut Response,
        req: &Request,
    ) {
        match self {
            Then::Stateless(handler) => handler.reject(next, res, req),
            Then::Stateful(handler) => handler.reject(store, key, next, res, req),
        }
    }
}

impl<H: RejectHandler + 'static> From<H> for Then {
    fn from(handler: H) -> Self {
        Then::Stateless(Arc::new(handler))
    }
}

impl From<ExtendBan> for Then {
    fn from(handler: ExtendBan) -> Self {
        Then::stateful(handler)
    }
}

impl std::fmt::Debug for Then {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Then::Stateless(_) => f.write_str("Stateless"),
            Then::Stateful(_) => f.write_str("Stateful"),
        }
    }
}

/// Create a reject handler that bans a client until `duration` after its
/// last request.
pub fn extend_ban(duration: Duration) -> Then {
    Then::extend_ban(duration)
}
