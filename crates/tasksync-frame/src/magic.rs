//! Message kinds (magics), generic handshake states and PIN field tags.
//!
//! Magic values are grouped by subsystem:
//! - `0x01..=0x04` data plane read/write
//! - `0x4x..=0x6x` task state, crypto injection, PIN exchange
//! - `0x7x` DMA shared memory handoff
//! - `0x8x` USB vs storage SCSI geometry
//! - `0x9x` user settings
//! - `0xax` DFU update lifecycle
//! - `0xb0` reboot, `0xc0` informational, `0xff` invalid sentinel

use std::fmt;

/// One-byte discriminant identifying a message's protocol purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Magic {
    DataWrDmaReq = 0x01,
    DataWrDmaAck = 0x02,
    DataRdDmaReq = 0x03,
    DataRdDmaAck = 0x04,
    TaskStateCmd = 0x42,
    TaskStateResp = 0x43,
    CryptoInjectCmd = 0x52,
    CryptoInjectResp = 0x53,
    CryptoPinCmd = 0x62,
    CryptoPinResp = 0x63,
    AuthStatePassed = 0x64,
    DmaShmInfoCmd = 0x70,
    DmaShmInfoResp = 0x71,
    DmaBufReadyCmd = 0x72,
    DmaBufReadyResp = 0x73,
    StorageScsiBlockSizeCmd = 0x82,
    StorageScsiBlockSizeResp = 0x83,
    StorageScsiBlockNumCmd = 0x84,
    StorageScsiBlockNumResp = 0x85,
    StorageEjected = 0x86,
    SettingsCmd = 0x90,
    SettingsLock = 0x91,
    DfuDownloadStarted = 0xa0,
    DfuHeaderSend = 0xa1,
    DfuHeaderValid = 0xa2,
    DfuHeaderInvalid = 0xa3,
    DfuDownloadFinished = 0xa4,
    DfuWriteFinished = 0xa5,
    DfuGetFwVersion = 0xa6,
    RebootRequest = 0xb0,
    InformationalMsg = 0xc0,
    Invalid = 0xff,
}

impl Magic {
    /// Every magic in the closed set, in wire-value order.
    pub const ALL: [Magic; 32] = [
        Magic::DataWrDmaReq,
        Magic::DataWrDmaAck,
        Magic::DataRdDmaReq,
        Magic::DataRdDmaAck,
        Magic::TaskStateCmd,
        Magic::TaskStateResp,
        Magic::CryptoInjectCmd,
        Magic::CryptoInjectResp,
        Magic::CryptoPinCmd,
        Magic::CryptoPinResp,
        Magic::AuthStatePassed,
        Magic::DmaShmInfoCmd,
        Magic::DmaShmInfoResp,
        Magic::DmaBufReadyCmd,
        Magic::DmaBufReadyResp,
        Magic::StorageScsiBlockSizeCmd,
        Magic::StorageScsiBlockSizeResp,
        Magic::StorageScsiBlockNumCmd,
        Magic::StorageScsiBlockNumResp,
        Magic::StorageEjected,
        Magic::SettingsCmd,
        Magic::SettingsLock,
        Magic::DfuDownloadStarted,
        Magic::DfuHeaderSend,
        Magic::DfuHeaderValid,
        Magic::DfuHeaderInvalid,
        Magic::DfuDownloadFinished,
        Magic::DfuWriteFinished,
        Magic::DfuGetFwVersion,
        Magic::RebootRequest,
        Magic::InformationalMsg,
        Magic::Invalid,
    ];

    /// Look up a wire byte. Returns `None` for values outside the closed set.
    pub fn from_u8(value: u8) -> Option<Self> {
        let magic = match value {
            0x01 => Magic::DataWrDmaReq,
            0x02 => Magic::DataWrDmaAck,
            0x03 => Magic::DataRdDmaReq,
            0x04 => Magic::DataRdDmaAck,
            0x42 => Magic::TaskStateCmd,
            0x43 => Magic::TaskStateResp,
            0x52 => Magic::CryptoInjectCmd,
            0x53 => Magic::CryptoInjectResp,
            0x62 => Magic::CryptoPinCmd,
            0x63 => Magic::CryptoPinResp,
            0x64 => Magic::AuthStatePassed,
            0x70 => Magic::DmaShmInfoCmd,
            0x71 => Magic::DmaShmInfoResp,
            0x72 => Magic::DmaBufReadyCmd,
            0x73 => Magic::DmaBufReadyResp,
            0x82 => Magic::StorageScsiBlockSizeCmd,
            0x83 => Magic::StorageScsiBlockSizeResp,
            0x84 => Magic::StorageScsiBlockNumCmd,
            0x85 => Magic::StorageScsiBlockNumResp,
            0x86 => Magic::StorageEjected,
            0x90 => Magic::SettingsCmd,
            0x91 => Magic::SettingsLock,
            0xa0 => Magic::DfuDownloadStarted,
            0xa1 => Magic::DfuHeaderSend,
            0xa2 => Magic::DfuHeaderValid,
            0xa3 => Magic::DfuHeaderInvalid,
            0xa4 => Magic::DfuDownloadFinished,
            0xa5 => Magic::DfuWriteFinished,
            0xa6 => Magic::DfuGetFwVersion,
            0xb0 => Magic::RebootRequest,
            0xc0 => Magic::InformationalMsg,
            0xff => Magic::Invalid,
            _ => return None,
        };
        Some(magic)
    }

    /// The wire byte for this magic.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Platform name without the `MAGIC_` prefix, e.g. `DMA_BUF_READY_CMD`.
    pub fn name(self) -> &'static str {
        match self {
            Magic::DataWrDmaReq => "DATA_WR_DMA_REQ",
            Magic::DataWrDmaAck => "DATA_WR_DMA_ACK",
            Magic::DataRdDmaReq => "DATA_RD_DMA_REQ",
            Magic::DataRdDmaAck => "DATA_RD_DMA_ACK",
            Magic::TaskStateCmd => "TASK_STATE_CMD",
            Magic::TaskStateResp => "TASK_STATE_RESP",
            Magic::CryptoInjectCmd => "CRYPTO_INJECT_CMD",
            Magic::CryptoInjectResp => "CRYPTO_INJECT_RESP",
            Magic::CryptoPinCmd => "CRYPTO_PIN_CMD",
            Magic::CryptoPinResp => "CRYPTO_PIN_RESP",
            Magic::AuthStatePassed => "AUTH_STATE_PASSED",
            Magic::DmaShmInfoCmd => "DMA_SHM_INFO_CMD",
            Magic::DmaShmInfoResp => "DMA_SHM_INFO_RESP",
            Magic::DmaBufReadyCmd => "DMA_BUF_READY_CMD",
            Magic::DmaBufReadyResp => "DMA_BUF_READY_RESP",
            Magic::StorageScsiBlockSizeCmd => "STORAGE_SCSI_BLOCK_SIZE_CMD",
            Magic::StorageScsiBlockSizeResp => "STORAGE_SCSI_BLOCK_SIZE_RESP",
            Magic::StorageScsiBlockNumCmd => "STORAGE_SCSI_BLOCK_NUM_CMD",
            Magic::StorageScsiBlockNumResp => "STORAGE_SCSI_BLOCK_NUM_RESP",
            Magic::StorageEjected => "STORAGE_EJECTED",
            Magic::SettingsCmd => "SETTINGS_CMD",
            Magic::SettingsLock => "SETTINGS_LOCK",
            Magic::DfuDownloadStarted => "DFU_DWNLOAD_STARTED",
            Magic::DfuHeaderSend => "DFU_HEADER_SEND",
            Magic::DfuHeaderValid => "DFU_HEADER_VALID",
            Magic::DfuHeaderInvalid => "DFU_HEADER_INVALID",
            Magic::DfuDownloadFinished => "DFU_DWNLOAD_FINISHED",
            Magic::DfuWriteFinished => "DFU_WRITE_FINISHED",
            Magic::DfuGetFwVersion => "DFU_GET_FW_VERSION",
            Magic::RebootRequest => "REBOOT_REQUEST",
            Magic::InformationalMsg => "INFORMATIONAL_MSG",
            Magic::Invalid => "INVALID",
        }
    }

    /// Parse a platform name, with or without the `MAGIC_` prefix (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("MAGIC_").unwrap_or(&upper);
        Self::ALL.into_iter().find(|magic| magic.name() == bare)
    }
}

impl TryFrom<u8> for Magic {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(value)
    }
}

impl From<Magic> for u8 {
    fn from(magic: Magic) -> Self {
        magic.as_u8()
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), self.as_u8())
    }
}

/// Generic handshake phase carried in the state byte.
///
/// Only meaningful for magics whose registry entry asks for it; data-plane
/// and informational messages treat the state byte as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SyncState {
    Ready = 0,
    AskForData = 1,
    Wait = 2,
    Done = 3,
    Acknowledge = 4,
    Unknown = 5,
    BadFile = 6,
    Failure = 7,
}

impl SyncState {
    pub const ALL: [SyncState; 8] = [
        SyncState::Ready,
        SyncState::AskForData,
        SyncState::Wait,
        SyncState::Done,
        SyncState::Acknowledge,
        SyncState::Unknown,
        SyncState::BadFile,
        SyncState::Failure,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Platform name without the `SYNC_` prefix.
    pub fn name(self) -> &'static str {
        match self {
            SyncState::Ready => "READY",
            SyncState::AskForData => "ASK_FOR_DATA",
            SyncState::Wait => "WAIT",
            SyncState::Done => "DONE",
            SyncState::Acknowledge => "ACKNOWLEDGE",
            SyncState::Unknown => "UNKNOWN",
            SyncState::BadFile => "BADFILE",
            SyncState::Failure => "FAILURE",
        }
    }

    /// Parse a platform name, with or without the `SYNC_` prefix (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SYNC_").unwrap_or(&upper);
        Self::ALL.into_iter().find(|state| state.name() == bare)
    }
}

impl From<SyncState> for u8 {
    fn from(state: SyncState) -> Self {
        state.as_u8()
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYNC_{}", self.name())
    }
}

/// Which secret a PIN request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PinFieldType {
    UserPin = 1,
    PetPin = 2,
    PetName = 3,
}

impl PinFieldType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PinFieldType::UserPin),
            2 => Some(PinFieldType::PetPin),
            3 => Some(PinFieldType::PetName),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            PinFieldType::UserPin => "USER_PIN",
            PinFieldType::PetPin => "PET_PIN",
            PinFieldType::PetName => "PET_NAME",
        }
    }
}

/// What the PIN request asks the peer to do with the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PinRequestKind {
    Authenticate = 1,
    Modify = 2,
}

impl PinRequestKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PinRequestKind::Authenticate),
            2 => Some(PinRequestKind::Modify),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            PinRequestKind::Authenticate => "AUTHENTICATE",
            PinRequestKind::Modify => "MODIFY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_byte_roundtrip_covers_closed_set() {
        for magic in Magic::ALL {
            assert_eq!(Magic::from_u8(magic.as_u8()), Some(magic));
        }
        let known = (0u8..=255).filter(|b| Magic::from_u8(*b).is_some()).count();
        assert_eq!(known, Magic::ALL.len());
    }

    #[test]
    fn magic_try_from_rejects_unknown() {
        assert_eq!(Magic::try_from(0x72), Ok(Magic::DmaBufReadyCmd));
        assert_eq!(Magic::try_from(0x05), Err(0x05));
        assert_eq!(Magic::try_from(0xfe), Err(0xfe));
    }

    #[test]
    fn magic_names_parse_with_or_without_prefix() {
        assert_eq!(
            Magic::from_name("MAGIC_CRYPTO_PIN_CMD"),
            Some(Magic::CryptoPinCmd)
        );
        assert_eq!(
            Magic::from_name("dma_buf_ready_resp"),
            Some(Magic::DmaBufReadyResp)
        );
        assert_eq!(Magic::from_name("NOT_A_MAGIC"), None);
    }

    #[test]
    fn magic_display_includes_value() {
        assert_eq!(Magic::RebootRequest.to_string(), "REBOOT_REQUEST (0xb0)");
    }

    #[test]
    fn sync_state_lookup() {
        assert_eq!(SyncState::from_u8(1), Some(SyncState::AskForData));
        assert_eq!(SyncState::from_u8(7), Some(SyncState::Failure));
        assert_eq!(SyncState::from_u8(8), None);
        assert_eq!(
            SyncState::from_name("SYNC_ACKNOWLEDGE"),
            Some(SyncState::Acknowledge)
        );
        assert_eq!(SyncState::Done.to_string(), "SYNC_DONE");
    }

    #[test]
    fn pin_tags_are_closed() {
        assert_eq!(PinFieldType::from_u8(3), Some(PinFieldType::PetName));
        assert_eq!(PinFieldType::from_u8(0), None);
        assert_eq!(PinRequestKind::from_u8(2), Some(PinRequestKind::Modify));
        assert_eq!(PinRequestKind::from_u8(3), None);
    }
}
