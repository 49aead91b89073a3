//! Turnstile - per-client admission control
//!
//! This crate counts accesses per client key, bans clients that exceed a
//! threshold, and lifts bans once a client has been silent for a configured
//! idle window. Policies are immutable values built by chaining:
//!
//! ```no_run
//! use std::time::Duration;
//! use turnstile::{Handler, Then};
//!
//! let app = |res: &mut turnstile::Response, _req: &turnstile::Request| {
//!     *res.body_mut() = "hello".to_string();
//! };
//!
//! let policy = turnstile::allow(10)
//!     .per(Duration::from_secs(60))
//!     .to(app)
//!     .then([Then::deny(), Then::extend_ban(Duration::from_secs(300))]);
//!
//! let req = turnstile::Request::default();
//! let mut res = turnstile::Response::default();
//! policy.call(&mut res, &req);
//! ```

pub mod admission;
pub mod config;
pub mod error;

pub use admission::{
    allow, extend_ban, per, remote_key, to, ClientKey, Deny, ExtendBan, Handler, KeyExtractor,
    Pass, Policy, PolicyConfig, RejectAction, RejectHandler, RemoteAddr, Request, Response,
    StateStore, StatefulRejectHandler, Then, EVER, UNLIMITED,
};
