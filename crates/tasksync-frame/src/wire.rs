//! Byte layout of the three message shapes.
//!
//! All multi-byte fields are little-endian and there is no implicit padding.
//!
//! ```text
//! Bare command (2 bytes):
//! ┌───────┬───────┐
//! │ Magic │ State │
//! │ u8    │ u8    │
//! └───────┴───────┘
//!
//! Command with data (68 bytes, fixed frame):
//! ┌───────┬───────┬──────────┬──────────────────────────────┐
//! │ Magic │ State │ Size     │ Payload (64 bytes,           │
//! │ u8    │ u8    │ u16 LE   │ first `Size` significant)    │
//! └───────┴───────┴──────────┴──────────────────────────────┘
//!
//! Data-plane command (10 bytes):
//! ┌───────┬───────┬────────────────┬──────────────┐
//! │ Magic │ State │ Sector address │ Num sectors  │
//! │ u8    │ u8    │ u32 LE         │ u32 LE       │
//! └───────┴───────┴────────────────┴──────────────┘
//! ```

/// Offset of the magic byte, shared by every shape.
pub const MAGIC_OFFSET: usize = 0;
/// Offset of the state byte, shared by every shape.
pub const STATE_OFFSET: usize = 1;
/// Offset of the `size` field in a command-with-data frame.
pub const SIZE_OFFSET: usize = 2;
/// Offset of the payload region in a command-with-data frame.
pub const PAYLOAD_OFFSET: usize = 4;
/// Offset of the sector address in a data-plane frame.
pub const SECTOR_ADDRESS_OFFSET: usize = 2;
/// Offset of the sector count in a data-plane frame.
pub const NUM_SECTORS_OFFSET: usize = 6;

/// Bare command: magic + state.
pub const COMMAND_SIZE: usize = 2;
/// Command-with-data header: magic + state + size.
pub const COMMAND_DATA_HEADER_SIZE: usize = 4;
/// Payload region of a command-with-data frame.
pub const MAX_PAYLOAD: usize = 64;
/// Full command-with-data frame.
pub const COMMAND_DATA_SIZE: usize = COMMAND_DATA_HEADER_SIZE + MAX_PAYLOAD;
/// Data-plane command: magic + state + sector address + sector count.
pub const DATAPLANE_SIZE: usize = 10;

/// Pet name / PIN buffer carried in a PIN request, NUL padded.
pub const PIN_NAME_LEN: usize = 24;
/// Encoded PIN request: field type tag + request kind tag + name buffer.
pub const PIN_REQUEST_LEN: usize = 2 + PIN_NAME_LEN;

/// The three wire shapes. The magic byte selects which one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `[magic][state]`
    Command,
    /// `[magic][state][size:u16][payload:64]`
    CommandData,
    /// `[magic][state][sector_address:u32][num_sectors:u32]`
    Dataplane,
}

impl Shape {
    /// Bytes occupied on the wire by a frame of this shape.
    pub const fn wire_size(self) -> usize {
        match self {
            Shape::Command => COMMAND_SIZE,
            Shape::CommandData => COMMAND_DATA_SIZE,
            Shape::Dataplane => DATAPLANE_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Shape::Command => "command",
            Shape::CommandData => "command_data",
            Shape::Dataplane => "dataplane",
        }
    }
}

/// Byte length of a frame of the given shape.
pub const fn size_of(shape: Shape) -> usize {
    shape.wire_size()
}

/// How the payload of a magic is interpreted.
///
/// `Empty` selects the bare command shape and `Dataplane` the sector shape;
/// every other kind travels in the 64-byte payload region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// No payload: bare command.
    Empty,
    /// Raw bytes, any length up to 64.
    Bytes,
    /// Little-endian `u16` array; size must be even.
    Words,
    /// Little-endian `u32` array; size must be a multiple of 4.
    DWords,
    /// Fixed-length PIN / pet name request.
    Pin,
    /// Sector address and count.
    Dataplane,
}

impl PayloadKind {
    /// Wire shape carrying this payload kind.
    pub const fn shape(self) -> Shape {
        match self {
            PayloadKind::Empty => Shape::Command,
            PayloadKind::Dataplane => Shape::Dataplane,
            PayloadKind::Bytes | PayloadKind::Words | PayloadKind::DWords | PayloadKind::Pin => {
                Shape::CommandData
            }
        }
    }

    /// Whether `size` is a legal `size` field for this kind.
    ///
    /// Only meaningful for kinds carried in the payload region; sizes above
    /// [`MAX_PAYLOAD`] are never legal.
    pub fn accepts_size(self, size: usize) -> bool {
        if size > MAX_PAYLOAD {
            return false;
        }
        match self {
            PayloadKind::Bytes => true,
            PayloadKind::Words => size % 2 == 0,
            PayloadKind::DWords => size % 4 == 0,
            PayloadKind::Pin => size == PIN_REQUEST_LEN,
            PayloadKind::Empty | PayloadKind::Dataplane => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PayloadKind::Empty => "empty",
            PayloadKind::Bytes => "bytes",
            PayloadKind::Words => "words",
            PayloadKind::DWords => "dwords",
            PayloadKind::Pin => "pin_request",
            PayloadKind::Dataplane => "dataplane",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
