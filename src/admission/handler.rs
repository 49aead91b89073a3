//! The request handler capability.

/// Request context handed to every handler.
pub type Request = http::Request<String>;

/// Response sink handlers write into.
pub type Response = http::Response<String>;

/// Something that can serve a request.
///
/// A [`Policy`](super::Policy) is itself a `Handler`, so policies can be
/// nested as each other's downstream.
pub trait Handler: Send + Sync {
    /// Serve `req`, writing the outcome into `res`.
    fn call(&self, res: &mut Response, req: &Request);
}

impl<F> Handler for F
where
    F: Fn(&mut Response, &Request) + Send + Sync,
{
    fn call(&self, res: &mut Response, req: &Request) {
        self(res, req)
    }
}
