use std::fmt;
use crate::Pool::writer::{Slot, WriterPool};
use crate::Transport::StreamEndpoint;

/// Debug function for WriterPool
///
/// Provides a summary that shows:
/// - Pool size and stall timeout
/// - Live counters
/// - Per-slot state
pub fn debug_writer_pool(pool: &WriterPool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WriterPool")
        .field("size", &pool.size())
        .field("stall_timeout", &pool.stall_timeout())
        .field("stats", &pool.stats())
        .field("slots", &pool.slots.iter().map(|slot| &**slot).collect::<Vec<_>>())
        .finish()
}

/// Debug function for a single writer slot
pub fn debug_writer_slot(slot: &Slot, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Slot")
        .field("index", &slot.index)
        .field("busy", &slot.state.is_busy())
        .field("dispatched", &slot.dispatched)
        .finish_non_exhaustive()
}

/// Debug function for StreamEndpoint
///
/// Sockets are shown as opaque; only their presence is reported.
pub fn debug_stream_endpoint(endpoint: &StreamEndpoint, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StreamEndpoint")
        .field("address", &endpoint.address)
        .field("listening", &endpoint.listener.is_some())
        .field("peer", &endpoint.peer.as_ref().map(|_| "<connected>"))
        .field("interruptible", &endpoint.running.is_some())
        .field("received", &endpoint.received)
        .finish()
}
