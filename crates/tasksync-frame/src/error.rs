use std::fmt;

use crate::magic::Magic;
use crate::wire::PayloadKind;

/// Which PIN request tag failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinTag {
    FieldType,
    RequestKind,
}

impl fmt::Display for PinTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinTag::FieldType => f.write_str("field type"),
            PinTag::RequestKind => f.write_str("request kind"),
        }
    }
}

/// Errors produced while decoding a single message.
///
/// Offsets are absolute positions of the offending byte, relative to the
/// start of the buffer (or stream) being decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The first byte is not in the magic set (or not registered).
    #[error("unknown magic 0x{byte:02x} at offset {offset}")]
    UnknownMagic { byte: u8, offset: usize },

    /// The invalid sentinel never appears in a real exchange.
    #[error("invalid sentinel magic 0xff at offset {offset}")]
    MagicInvalidSentinel { offset: usize },

    /// Fewer bytes are available than the shape requires.
    /// `state` is known once the second byte has arrived.
    #[error(
        "truncated {} frame{}: need {needed} bytes, have {available} (offset {offset})",
        magic_label(.magic),
        state_label(.state)
    )]
    Truncated {
        magic: Option<Magic>,
        state: Option<u8>,
        needed: usize,
        available: usize,
        offset: usize,
    },

    /// The declared payload size exceeds the payload region.
    #[error("{magic} state {state}: declared size {size} exceeds {max} (offset {offset})")]
    SizeOverflow {
        magic: Magic,
        state: u8,
        size: u16,
        max: usize,
        offset: usize,
    },

    /// The declared payload size is not a legal length for the magic's payload kind.
    #[error("{magic} state {state}: size {size} is not a valid {kind} length (offset {offset})")]
    SizeMismatch {
        magic: Magic,
        state: u8,
        size: u16,
        kind: PayloadKind,
        offset: usize,
    },

    /// A PIN request tag is outside its enumeration.
    #[error("{magic} state {state}: bad PIN {field} tag {value} (offset {offset})")]
    BadFieldTag {
        magic: Magic,
        state: u8,
        field: PinTag,
        value: u8,
        offset: usize,
    },
}

impl DecodeError {
    /// Byte offset of the failure.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnknownMagic { offset, .. }
            | DecodeError::MagicInvalidSentinel { offset }
            | DecodeError::Truncated { offset, .. }
            | DecodeError::SizeOverflow { offset, .. }
            | DecodeError::SizeMismatch { offset, .. }
            | DecodeError::BadFieldTag { offset, .. } => *offset,
        }
    }

    /// Magic of the offending frame, when it was recognized.
    pub fn magic(&self) -> Option<Magic> {
        match self {
            DecodeError::UnknownMagic { .. } => None,
            DecodeError::MagicInvalidSentinel { .. } => Some(Magic::Invalid),
            DecodeError::Truncated { magic, .. } => *magic,
            DecodeError::SizeOverflow { magic, .. }
            | DecodeError::SizeMismatch { magic, .. }
            | DecodeError::BadFieldTag { magic, .. } => Some(*magic),
        }
    }

    /// Shift the offset by `base`, for errors found inside a larger stream.
    pub fn rebase(mut self, base: usize) -> Self {
        match &mut self {
            DecodeError::UnknownMagic { offset, .. }
            | DecodeError::MagicInvalidSentinel { offset }
            | DecodeError::Truncated { offset, .. }
            | DecodeError::SizeOverflow { offset, .. }
            | DecodeError::SizeMismatch { offset, .. }
            | DecodeError::BadFieldTag { offset, .. } => *offset += base,
        }
        self
    }
}

fn magic_label(magic: &Option<Magic>) -> String {
    match magic {
        Some(magic) => magic.to_string(),
        None => "empty".to_string(),
    }
}

fn state_label(state: &Option<u8>) -> String {
    match state {
        Some(state) => format!(" state {state}"),
        None => String::new(),
    }
}

/// Errors produced while encoding a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The payload does not fit the 64-byte payload region.
    #[error("{magic} state {state}: payload of {size} bytes exceeds {max}")]
    SizeOverflow {
        magic: Magic,
        state: u8,
        size: usize,
        max: usize,
    },

    /// The invalid sentinel cannot be sent.
    #[error("refusing to encode the invalid sentinel magic (state {state})")]
    InvalidSentinel { state: u8 },

    /// The magic is not part of the registry in use.
    #[error("{magic} state {state} is not registered")]
    Unregistered { magic: Magic, state: u8 },

    /// The message shape or payload kind disagrees with the registry.
    #[error("{magic} state {state} expects a {expected} payload, got {found}")]
    ShapeMismatch {
        magic: Magic,
        state: u8,
        expected: PayloadKind,
        found: PayloadKind,
    },

    /// A PIN name does not fit the fixed name buffer.
    #[error("PIN name of {len} bytes exceeds {max}")]
    PinNameTooLong { len: usize, max: usize },
}

/// Errors detected when building a registry from a custom table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("the invalid sentinel cannot be registered")]
    SentinelRegistered,

    #[error("{0} registered more than once")]
    DuplicateMagic(Magic),

    #[error("request {0} declares no response")]
    RequestWithoutResponse(Magic),

    #[error("{0} is a request or response without a sub-protocol")]
    MissingSubProtocol(Magic),

    #[error("{0} is a notification but names a sub-protocol or responses")]
    NotificationPairing(Magic),

    #[error("request {request} names {response}, which is not a response of the same sub-protocol")]
    BadResponse { request: Magic, response: Magic },

    #[error("{magic}: payload kind {kind} is not valid here")]
    BadPayloadKind { magic: Magic, kind: PayloadKind },
}

/// Errors from the blocking reader/writer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A malformed frame was discarded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_shifts_offset() {
        let err = DecodeError::UnknownMagic {
            byte: 0x10,
            offset: 0,
        }
        .rebase(136);
        assert_eq!(err.offset(), 136);
        assert_eq!(err.magic(), None);
    }

    #[test]
    fn display_names_magic_and_offset() {
        let err = DecodeError::Truncated {
            magic: Some(Magic::CryptoPinCmd),
            state: Some(1),
            needed: 68,
            available: 5,
            offset: 5,
        };
        let text = err.to_string();
        assert!(text.contains("CRYPTO_PIN_CMD state 1"));
        assert!(text.contains("need 68 bytes, have 5"));

        let empty = DecodeError::Truncated {
            magic: None,
            state: None,
            needed: 1,
            available: 0,
            offset: 0,
        };
        assert!(empty.to_string().contains("truncated empty frame"));
    }
}
