//! Dispatch plumbing: invoker caches and the per-shape dispatch table.
//!
//! The first dispatch of a concrete message type builds a table entry
//! (service key + monomorphized invoker) and caches it under the
//! message's `TypeId`; every later dispatch of that type is a map read
//! followed by a direct call - no name lookup, no key construction.

mod cache;
mod table;

use std::any::TypeId;

use crate::message::{Request, StreamRequest};
use crate::recovery::TierCache;

pub(crate) use cache::InvokerCache;
pub(crate) use table::{RequestEntry, StreamEntry};

/// The dispatcher's shared caches: one invoker cache per dispatch
/// shape, plus the fault tier cache for the recovery walk.
pub(crate) struct DispatchCaches {
    requests: InvokerCache,
    streams: InvokerCache,
    pub tiers: TierCache,
}

impl DispatchCaches {
    pub fn new() -> Self {
        Self {
            requests: InvokerCache::new(),
            streams: InvokerCache::new(),
            tiers: TierCache::new(),
        }
    }

    /// Cached dispatch entry for request type `R`, built on first use.
    pub fn request_entry<R: Request>(&self) -> std::sync::Arc<RequestEntry<R>> {
        self.requests
            .get_or_build(TypeId::of::<R>(), RequestEntry::<R>::build)
    }

    /// Cached dispatch entry for stream request type `R`, built on
    /// first use.
    pub fn stream_entry<R: StreamRequest>(&self) -> std::sync::Arc<StreamEntry<R>> {
        self.streams
            .get_or_build(TypeId::of::<R>(), StreamEntry::<R>::build)
    }

    /// Total cold-path entry builds across the request and stream
    /// caches. Used to verify the warm path stays build-free.
    #[cfg(test)]
    pub fn entry_builds(&self) -> usize {
        self.requests.builds() + self.streams.builds()
    }
}
