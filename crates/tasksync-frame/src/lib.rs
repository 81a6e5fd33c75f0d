//! Fixed-size task synchronization message framing.
//!
//! Tasks exchange three message shapes, all starting with a one-byte magic:
//! - a 2-byte bare command (`magic`, `state`)
//! - a 68-byte command with data (`magic`, `state`, `size`, 64-byte payload)
//! - a 10-byte data-plane command (`magic`, `state`, sector address, sector count)
//!
//! The [`ProtocolRegistry`] says which shape, payload interpretation and
//! state values belong to each magic, and how requests pair with responses.
//! The [`Codec`] uses it to encode and to reject malformed frames; decoding
//! is all-or-nothing per message.
//!
//! Frames read and written are traced at `trace` level; `MessageReader` logs
//! each discarded frame at `warn` before returning its error.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod magic;
pub mod message;
pub mod reader;
pub mod registry;
pub mod wire;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::TaskSyncCodec;
pub use codec::{decode_message, decode_prefix, encode_message, resync_skip, Codec, CodecConfig};
pub use error::{DecodeError, EncodeError, FrameError, PinTag, RegistryError, Result};
pub use magic::{Magic, PinFieldType, PinRequestKind, SyncState};
pub use message::{Command, CommandData, DataplaneCommand, Message, Payload, PinRequest};
pub use reader::MessageReader;
pub use registry::{
    MagicClass, MagicEntry, ProtocolRegistry, StateRule, SubProtocol, STANDARD_ENTRIES,
};
pub use wire::{
    size_of, PayloadKind, Shape, COMMAND_DATA_SIZE, COMMAND_SIZE, DATAPLANE_SIZE, MAX_PAYLOAD,
    PIN_NAME_LEN, PIN_REQUEST_LEN,
};
pub use writer::MessageWriter;
