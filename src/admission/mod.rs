//! Admission control: client keys, the shared state store, policies and
//! reject handlers.

mod handler;
mod key;
mod policy;
mod reaper;
mod reject;
mod rules;
mod store;

pub use handler::{Handler, Request, Response};
pub use key::{remote_key, ClientKey, KeyExtractor, RemoteAddr};
pub use policy::{allow, per, to, Policy, EVER, UNLIMITED};
pub use reject::{extend_ban, Deny, ExtendBan, Pass, RejectHandler, StatefulRejectHandler, Then};
pub use rules::{PolicyConfig, RejectAction};
pub use store::StateStore;
