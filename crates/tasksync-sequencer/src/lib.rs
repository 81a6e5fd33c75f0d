//! Protocol-state validation for task sync channels.
//!
//! A [`Sequencer`] watches the messages crossing one channel end in both
//! directions and checks request/response pairing per sub-protocol. An
//! [`Endpoint`] couples it with a blocking reader and writer so that
//! nothing out of sequence is ever written or handed to the caller.
//!
//! Admitted messages are logged at `debug`; every rejection that desyncs a
//! sub-protocol is logged at `warn`.

pub mod endpoint;
pub mod error;
pub mod sequencer;

pub use endpoint::{Endpoint, EndpointConfig};
pub use error::{EndpointError, Result, SequenceError};
pub use sequencer::{Direction, Sequencer, SequencerConfig, SubProtocolState};
