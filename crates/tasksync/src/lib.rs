//! Task synchronization messages for partitioned embedded tasks.
//!
//! Tasks talk over an ordered byte channel using three fixed-size frame
//! shapes keyed by a one-byte magic. This crate bundles:
//!
//! - [`frame`]: wire format, magic registry, codec, blocking reader/writer
//!   and (with the `async` feature) a `tokio-util` codec
//! - [`sequencer`]: per-sub-protocol request/response validation and the
//!   [`Endpoint`](sequencer::Endpoint) that enforces it on a channel

/// Re-export frame types.
pub mod frame {
    pub use tasksync_frame::*;
}

/// Re-export sequencer types.
pub mod sequencer {
    pub use tasksync_sequencer::*;
}
