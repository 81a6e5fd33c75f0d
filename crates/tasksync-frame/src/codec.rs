use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError, PinTag};
use crate::magic::{Magic, PinFieldType, PinRequestKind};
use crate::message::{Message, Payload, PinRequest};
use crate::registry::ProtocolRegistry;
use crate::wire::{
    PayloadKind, Shape, COMMAND_DATA_HEADER_SIZE, COMMAND_DATA_SIZE, COMMAND_SIZE,
    DATAPLANE_SIZE, MAX_PAYLOAD, NUM_SECTORS_OFFSET, PAYLOAD_OFFSET, PIN_NAME_LEN,
    PIN_REQUEST_LEN, SECTOR_ADDRESS_OFFSET, SIZE_OFFSET, STATE_OFFSET,
};

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Panic instead of returning `EncodeError::SizeOverflow`.
    /// Default: on in debug builds, off in release builds.
    pub panic_on_encode_overflow: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            panic_on_encode_overflow: cfg!(debug_assertions),
        }
    }
}

/// Encoder/decoder for one channel endpoint, bound to a registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<ProtocolRegistry>,
    config: CodecConfig,
}

impl Codec {
    /// Codec over the platform registry with default configuration.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ProtocolRegistry::new()))
    }

    pub fn with_registry(registry: Arc<ProtocolRegistry>) -> Self {
        Self::with_config(registry, CodecConfig::default())
    }

    pub fn with_config(registry: Arc<ProtocolRegistry>, config: CodecConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode one message into a fresh buffer.
    pub fn encode(&self, message: &Message) -> Result<Bytes, EncodeError> {
        let mut dst = BytesMut::with_capacity(message.wire_size());
        self.encode_into(message, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Append one encoded message to `dst`. On error `dst` is left untouched.
    pub fn encode_into(&self, message: &Message, dst: &mut BytesMut) -> Result<(), EncodeError> {
        match encode_message(message, &self.registry, dst) {
            Err(err @ EncodeError::SizeOverflow { .. }) if self.config.panic_on_encode_overflow => {
                panic!("{err}")
            }
            other => other,
        }
    }

    /// Decode exactly one message from the front of `src`.
    pub fn decode(&self, src: &[u8]) -> Result<Message, DecodeError> {
        decode_prefix(src, &self.registry).map(|(message, _)| message)
    }

    /// Decode one message and report how many bytes it occupied.
    pub fn decode_prefix(&self, src: &[u8]) -> Result<(Message, usize), DecodeError> {
        decode_prefix(src, &self.registry)
    }

    /// Streaming decode; see [`decode_message`].
    pub fn decode_buf(&self, src: &mut BytesMut) -> Result<Option<Message>, DecodeError> {
        decode_message(src, &self.registry)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a message into the wire format.
///
/// The magic must be registered, and the message shape and payload kind must
/// match its registry entry. Payload bytes beyond `size` are zero-filled.
pub fn encode_message(
    message: &Message,
    registry: &ProtocolRegistry,
    dst: &mut BytesMut,
) -> Result<(), EncodeError> {
    let magic = message.magic();
    let state = message.state();
    if magic == Magic::Invalid {
        return Err(EncodeError::InvalidSentinel { state });
    }
    let entry = registry
        .entry(magic)
        .ok_or(EncodeError::Unregistered { magic, state })?;
    if message.payload_kind() != entry.payload {
        return Err(EncodeError::ShapeMismatch {
            magic,
            state,
            expected: entry.payload,
            found: message.payload_kind(),
        });
    }

    match message {
        Message::Command(cmd) => {
            dst.reserve(COMMAND_SIZE);
            dst.put_u8(magic.as_u8());
            dst.put_u8(cmd.state);
        }
        Message::CommandData(cmd) => {
            let size = cmd.size();
            if size > MAX_PAYLOAD {
                return Err(EncodeError::SizeOverflow {
                    magic,
                    state: cmd.state,
                    size,
                    max: MAX_PAYLOAD,
                });
            }
            dst.reserve(COMMAND_DATA_SIZE);
            dst.put_u8(magic.as_u8());
            dst.put_u8(cmd.state);
            dst.put_u16_le(size as u16);
            match &cmd.payload {
                Payload::Bytes(bytes) => dst.put_slice(bytes),
                Payload::Words(words) => words.iter().for_each(|w| dst.put_u16_le(*w)),
                Payload::DWords(dwords) => dwords.iter().for_each(|d| dst.put_u32_le(*d)),
                Payload::Pin(req) => {
                    dst.put_u8(req.field.as_u8());
                    dst.put_u8(req.request.as_u8());
                    dst.put_slice(&req.name);
                }
            }
            dst.put_bytes(0, MAX_PAYLOAD - size);
        }
        Message::Dataplane(cmd) => {
            dst.reserve(DATAPLANE_SIZE);
            dst.put_u8(magic.as_u8());
            dst.put_u8(cmd.state);
            dst.put_u32_le(cmd.sector_address);
            dst.put_u32_le(cmd.num_sectors);
        }
    }
    Ok(())
}

/// Decode one message from the front of `src`.
///
/// All-or-nothing: either a complete message and the number of bytes it
/// occupied, or an error. Bytes after the frame are not inspected.
pub fn decode_prefix(
    src: &[u8],
    registry: &ProtocolRegistry,
) -> Result<(Message, usize), DecodeError> {
    let Some(&byte) = src.first() else {
        return Err(DecodeError::Truncated {
            magic: None,
            state: None,
            needed: 1,
            available: 0,
            offset: 0,
        });
    };
    if byte == Magic::Invalid.as_u8() {
        return Err(DecodeError::MagicInvalidSentinel { offset: 0 });
    }
    let entry = registry
        .lookup(byte)
        .ok_or(DecodeError::UnknownMagic { byte, offset: 0 })?;
    let magic = entry.magic;

    match entry.shape() {
        Shape::Command => {
            require(src, magic, COMMAND_SIZE)?;
            Ok((Message::command(magic, src[STATE_OFFSET]), COMMAND_SIZE))
        }
        Shape::Dataplane => {
            require(src, magic, DATAPLANE_SIZE)?;
            let message = Message::dataplane(
                magic,
                src[STATE_OFFSET],
                read_u32_le(src, SECTOR_ADDRESS_OFFSET),
                read_u32_le(src, NUM_SECTORS_OFFSET),
            );
            Ok((message, DATAPLANE_SIZE))
        }
        Shape::CommandData => {
            require(src, magic, COMMAND_DATA_HEADER_SIZE)?;
            let state = src[STATE_OFFSET];
            let size = u16::from_le_bytes([src[SIZE_OFFSET], src[SIZE_OFFSET + 1]]);
            if usize::from(size) > MAX_PAYLOAD {
                return Err(DecodeError::SizeOverflow {
                    magic,
                    state,
                    size,
                    max: MAX_PAYLOAD,
                    offset: SIZE_OFFSET,
                });
            }
            require(src, magic, COMMAND_DATA_SIZE)?;
            if !entry.payload.accepts_size(usize::from(size)) {
                return Err(DecodeError::SizeMismatch {
                    magic,
                    state,
                    size,
                    kind: entry.payload,
                    offset: SIZE_OFFSET,
                });
            }

            let body = &src[PAYLOAD_OFFSET..PAYLOAD_OFFSET + usize::from(size)];
            let payload = match entry.payload {
                PayloadKind::Words => Payload::Words(
                    body.chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect(),
                ),
                PayloadKind::DWords => Payload::DWords(
                    body.chunks_exact(4)
                        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect(),
                ),
                PayloadKind::Pin => Payload::Pin(decode_pin(magic, state, body)?),
                // Empty and Dataplane never get here: `accepts_size` rejects them.
                PayloadKind::Bytes | PayloadKind::Empty | PayloadKind::Dataplane => {
                    Payload::Bytes(Bytes::copy_from_slice(body))
                }
            };
            Ok((
                Message::with_payload(magic, state, payload),
                COMMAND_DATA_SIZE,
            ))
        }
    }
}

/// Decode a message from a stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. On error the
/// buffer is left untouched; see [`resync_skip`] for how much to discard.
pub fn decode_message(
    src: &mut BytesMut,
    registry: &ProtocolRegistry,
) -> Result<Option<Message>, DecodeError> {
    match decode_prefix(src, registry) {
        Ok((message, used)) => {
            src.advance(used);
            Ok(Some(message))
        }
        Err(DecodeError::Truncated { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Number of bytes a stream reader drops after `err` to get past the bad frame.
///
/// Unrecognized magics drop one byte so the next byte is tried as a magic.
/// Payload errors drop the whole fixed-size frame they were found in.
pub fn resync_skip(err: &DecodeError) -> usize {
    match err {
        DecodeError::UnknownMagic { .. } | DecodeError::MagicInvalidSentinel { .. } => 1,
        DecodeError::SizeOverflow { .. }
        | DecodeError::SizeMismatch { .. }
        | DecodeError::BadFieldTag { .. } => COMMAND_DATA_SIZE,
        DecodeError::Truncated { .. } => 0,
    }
}

fn require(src: &[u8], magic: Magic, needed: usize) -> Result<(), DecodeError> {
    if src.len() < needed {
        return Err(DecodeError::Truncated {
            magic: Some(magic),
            state: src.get(STATE_OFFSET).copied(),
            needed,
            available: src.len(),
            offset: src.len(),
        });
    }
    Ok(())
}

fn read_u32_le(src: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        src[offset],
        src[offset + 1],
        src[offset + 2],
        src[offset + 3],
    ])
}

fn decode_pin(magic: Magic, state: u8, body: &[u8]) -> Result<PinRequest, DecodeError> {
    debug_assert_eq!(body.len(), PIN_REQUEST_LEN);
    let field = PinFieldType::from_u8(body[0]).ok_or(DecodeError::BadFieldTag {
        magic,
        state,
        field: PinTag::FieldType,
        value: body[0],
        offset: PAYLOAD_OFFSET,
    })?;
    let request = PinRequestKind::from_u8(body[1]).ok_or(DecodeError::BadFieldTag {
        magic,
        state,
        field: PinTag::RequestKind,
        value: body[1],
        offset: PAYLOAD_OFFSET + 1,
    })?;
    let mut name = [0u8; PIN_NAME_LEN];
    name.copy_from_slice(&body[2..PIN_REQUEST_LEN]);
    Ok(PinRequest {
        field,
        request,
        name,
    })
}
