//! Client key generation and extraction.

use std::sync::Arc;

use super::handler::Request;

/// A key that identifies the client behind a request.
///
/// Every counter and ban in a [`StateStore`](super::StateStore) is indexed
/// by one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a new client key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-level remote address of a request, e.g. `203.0.113.7:51234`.
///
/// Whatever accepts the connection is expected to attach this as a request
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// A pluggable function deriving the client key of a request.
pub type KeyExtractor = Arc<dyn Fn(&Request) -> ClientKey + Send + Sync>;

/// The default key extractor.
///
/// Drops the last `:`-delimited segment (the port) of the request's
/// [`RemoteAddr`]. An address without a `:`, or a request without the
/// extension, yields the empty key.
pub fn remote_key(req: &Request) -> ClientKey {
    let addr = req
        .extensions()
        .get::<RemoteAddr>()
        .map(|remote| remote.0.as_str())
        .unwrap_or_default();

    match addr.rfind(':') {
        Some(idx) => ClientKey::from(&addr[..idx]),
        None => ClientKey::default(),
    }
}
