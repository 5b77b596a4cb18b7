//! Message taxonomy.
//!
//! Three disjoint message kinds, identified by marker trait:
//!
//! - [`Request`] - dispatched to exactly one handler, yields a response.
//!   A request whose `Response` is `()` is a void request; it shares the
//!   whole pipeline and simply discards the unit at the call site.
//! - [`StreamRequest`] - dispatched to exactly one handler, yields a
//!   lazy stream of items.
//! - [`Notification`] - fire-and-forget, delivered to zero or more
//!   handlers by the active publish strategy.

/// A message dispatched for a single response.
///
/// # Example
///
/// ```ignore
/// struct Ping {
///     message: String,
/// }
///
/// impl courier::Request for Ping {
///     type Response = String;
/// }
/// ```
pub trait Request: Send + Sync + 'static {
    /// The response produced by the terminal handler.
    ///
    /// Post-processors observe the response by shared reference from
    /// the pipeline future, so responses must be `Sync`.
    type Response: Send + Sync + 'static;
}

/// A message dispatched for a lazy sequence of items.
pub trait StreamRequest: Send + Sync + 'static {
    /// The element type of the produced stream.
    type Item: Send + 'static;
}

/// A fire-and-forget message delivered to any number of handlers.
pub trait Notification: Send + Sync + 'static {}
