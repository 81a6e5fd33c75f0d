use std::fmt;

use bytes::Bytes;

use crate::error::EncodeError;
use crate::magic::{Magic, PinFieldType, PinRequestKind, SyncState};
use crate::wire::{PayloadKind, Shape, COMMAND_DATA_HEADER_SIZE, PIN_NAME_LEN, PIN_REQUEST_LEN};

/// PIN / pet name request carried in a command-with-data payload.
///
/// The name buffer is always exactly [`PIN_NAME_LEN`] bytes, NUL padded.
/// It may hold a PIN, so `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct PinRequest {
    pub field: PinFieldType,
    pub request: PinRequestKind,
    pub name: [u8; PIN_NAME_LEN],
}

impl PinRequest {
    /// Build a request, NUL padding `name` to the fixed buffer length.
    pub fn new(
        field: PinFieldType,
        request: PinRequestKind,
        name: &[u8],
    ) -> Result<Self, EncodeError> {
        if name.len() > PIN_NAME_LEN {
            return Err(EncodeError::PinNameTooLong {
                len: name.len(),
                max: PIN_NAME_LEN,
            });
        }
        let mut buf = [0u8; PIN_NAME_LEN];
        buf[..name.len()].copy_from_slice(name);
        Ok(Self {
            field,
            request,
            name: buf,
        })
    }

    /// Name bytes up to the first NUL.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(PIN_NAME_LEN);
        &self.name[..end]
    }

    /// Name as UTF-8, if it is.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(self.name_bytes()).ok()
    }
}

impl fmt::Debug for PinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinRequest")
            .field("field", &self.field)
            .field("request", &self.request)
            .field(
                "name",
                &format_args!("<redacted:{} bytes>", self.name_bytes().len()),
            )
            .finish()
    }
}

/// Interpretation of the 64-byte payload region, selected by magic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Bytes),
    Words(Vec<u16>),
    DWords(Vec<u32>),
    Pin(PinRequest),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bytes(_) => PayloadKind::Bytes,
            Payload::Words(_) => PayloadKind::Words,
            Payload::DWords(_) => PayloadKind::DWords,
            Payload::Pin(_) => PayloadKind::Pin,
        }
    }

    /// Value of the `size` field when this payload is encoded.
    pub fn encoded_len(&self) -> usize {
        match self {
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Words(words) => words.len() * 2,
            Payload::DWords(dwords) => dwords.len() * 4,
            Payload::Pin(_) => PIN_REQUEST_LEN,
        }
    }
}

/// `[magic][state]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub magic: Magic,
    pub state: u8,
}

/// `[magic][state][size][payload]`. `size` is derived from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandData {
    pub magic: Magic,
    pub state: u8,
    pub payload: Payload,
}

impl CommandData {
    /// The `size` field this frame carries.
    pub fn size(&self) -> usize {
        self.payload.encoded_len()
    }

    /// Header plus the significant payload bytes.
    pub fn significant_len(&self) -> usize {
        COMMAND_DATA_HEADER_SIZE + self.size()
    }
}

/// `[magic][state][sector_address][num_sectors]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataplaneCommand {
    pub magic: Magic,
    pub state: u8,
    pub sector_address: u32,
    pub num_sectors: u32,
}

/// One unit of exchange on a task channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    CommandData(CommandData),
    Dataplane(DataplaneCommand),
}

impl Message {
    /// Bare command.
    pub fn command(magic: Magic, state: impl Into<u8>) -> Self {
        Message::Command(Command {
            magic,
            state: state.into(),
        })
    }

    /// Command with data.
    pub fn with_payload(magic: Magic, state: impl Into<u8>, payload: Payload) -> Self {
        Message::CommandData(CommandData {
            magic,
            state: state.into(),
            payload,
        })
    }

    /// Command with a raw byte payload.
    pub fn with_bytes(magic: Magic, state: impl Into<u8>, bytes: impl Into<Bytes>) -> Self {
        Self::with_payload(magic, state, Payload::Bytes(bytes.into()))
    }

    /// PIN / pet name command.
    pub fn pin(magic: Magic, state: impl Into<u8>, request: PinRequest) -> Self {
        Self::with_payload(magic, state, Payload::Pin(request))
    }

    /// Data-plane read/write command.
    pub fn dataplane(
        magic: Magic,
        state: impl Into<u8>,
        sector_address: u32,
        num_sectors: u32,
    ) -> Self {
        Message::Dataplane(DataplaneCommand {
            magic,
            state: state.into(),
            sector_address,
            num_sectors,
        })
    }

    pub fn magic(&self) -> Magic {
        match self {
            Message::Command(cmd) => cmd.magic,
            Message::CommandData(cmd) => cmd.magic,
            Message::Dataplane(cmd) => cmd.magic,
        }
    }

    /// Raw state byte.
    pub fn state(&self) -> u8 {
        match self {
            Message::Command(cmd) => cmd.state,
            Message::CommandData(cmd) => cmd.state,
            Message::Dataplane(cmd) => cmd.state,
        }
    }

    /// State byte as a generic handshake phase, when it is one.
    pub fn sync_state(&self) -> Option<SyncState> {
        SyncState::from_u8(self.state())
    }

    pub fn shape(&self) -> Shape {
        match self {
            Message::Command(_) => Shape::Command,
            Message::CommandData(_) => Shape::CommandData,
            Message::Dataplane(_) => Shape::Dataplane,
        }
    }

    /// Payload kind as carried by this value (not as the registry expects).
    pub fn payload_kind(&self) -> PayloadKind {
        match self {
            Message::Command(_) => PayloadKind::Empty,
            Message::CommandData(cmd) => cmd.payload.kind(),
            Message::Dataplane(_) => PayloadKind::Dataplane,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Message::CommandData(cmd) => Some(&cmd.payload),
            _ => None,
        }
    }

    pub fn pin_request(&self) -> Option<&PinRequest> {
        match self.payload() {
            Some(Payload::Pin(req)) => Some(req),
            _ => None,
        }
    }

    /// Bytes this message occupies on the wire.
    pub fn wire_size(&self) -> usize {
        self.shape().wire_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_request_pads_name() {
        let req = PinRequest::new(PinFieldType::PetName, PinRequestKind::Modify, b"bob").unwrap();
        assert_eq!(&req.name[..3], b"bob");
        assert!(req.name[3..].iter().all(|b| *b == 0));
        assert_eq!(req.name_str(), Some("bob"));
    }

    #[test]
    fn pin_request_rejects_long_name() {
        let err = PinRequest::new(PinFieldType::UserPin, PinRequestKind::Authenticate, &[b'x'; 25])
            .unwrap_err();
        assert!(matches!(err, EncodeError::PinNameTooLong { len: 25, max: 24 }));
    }

    #[test]
    fn pin_request_debug_redacts_name() {
        let req =
            PinRequest::new(PinFieldType::UserPin, PinRequestKind::Authenticate, b"1234").unwrap();
        let debug = format!("{req:?}");
        assert!(debug.contains("<redacted:4 bytes>"));
        assert!(!debug.contains("1234"));
    }

    #[test]
    fn payload_encoded_len() {
        assert_eq!(Payload::Bytes(Bytes::from_static(b"abc")).encoded_len(), 3);
        assert_eq!(Payload::Words(vec![1, 2]).encoded_len(), 4);
        assert_eq!(Payload::DWords(vec![1, 2, 3]).encoded_len(), 12);
        let req = PinRequest::new(PinFieldType::PetPin, PinRequestKind::Authenticate, b"").unwrap();
        assert_eq!(Payload::Pin(req).encoded_len(), PIN_REQUEST_LEN);
    }

    #[test]
    fn message_accessors() {
        let msg = Message::dataplane(Magic::DataRdDmaReq, SyncState::Ready, 0x100, 8);
        assert_eq!(msg.magic(), Magic::DataRdDmaReq);
        assert_eq!(msg.sync_state(), Some(SyncState::Ready));
        assert_eq!(msg.shape(), Shape::Dataplane);
        assert_eq!(msg.wire_size(), 10);
        assert!(msg.payload().is_none());

        let msg = Message::command(Magic::RebootRequest, 0x42u8);
        assert_eq!(msg.state(), 0x42);
        assert_eq!(msg.sync_state(), None);
        assert_eq!(msg.payload_kind(), PayloadKind::Empty);
    }
}
