//! Magic/state registry: the single place where protocol knowledge lives.
//!
//! Codecs and sequencers hold a [`ProtocolRegistry`] and query it rather
//! than matching on magic values themselves.

use std::fmt;

use crate::error::RegistryError;
use crate::magic::{Magic, SyncState};
use crate::wire::{PayloadKind, Shape};

/// Role of a magic in an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicClass {
    /// Opens a request/response pair.
    Request,
    /// Closes a pending request.
    Response,
    /// Fire-and-forget, no pairing obligation.
    Notification,
    /// Never valid on the wire.
    Invalid,
}

impl MagicClass {
    pub fn name(self) -> &'static str {
        match self {
            MagicClass::Request => "request",
            MagicClass::Response => "response",
            MagicClass::Notification => "notification",
            MagicClass::Invalid => "invalid",
        }
    }
}

impl fmt::Display for MagicClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Independently sequenced request/response flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubProtocol {
    DataplaneIo,
    TaskState,
    CryptoInject,
    Pin,
    DmaShm,
    DmaBufReady,
    ScsiBlockSize,
    ScsiBlockNum,
    Settings,
    Dfu,
}

impl SubProtocol {
    pub const ALL: [SubProtocol; 10] = [
        SubProtocol::DataplaneIo,
        SubProtocol::TaskState,
        SubProtocol::CryptoInject,
        SubProtocol::Pin,
        SubProtocol::DmaShm,
        SubProtocol::DmaBufReady,
        SubProtocol::ScsiBlockSize,
        SubProtocol::ScsiBlockNum,
        SubProtocol::Settings,
        SubProtocol::Dfu,
    ];

    /// Dense index, usable for per-sub-protocol tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SubProtocol::DataplaneIo => "dataplane-io",
            SubProtocol::TaskState => "task-state",
            SubProtocol::CryptoInject => "crypto-inject",
            SubProtocol::Pin => "pin",
            SubProtocol::DmaShm => "dma-shm",
            SubProtocol::DmaBufReady => "dma-bufready",
            SubProtocol::ScsiBlockSize => "scsi-blocksize",
            SubProtocol::ScsiBlockNum => "scsi-blocknum",
            SubProtocol::Settings => "settings",
            SubProtocol::Dfu => "dfu",
        }
    }
}

impl fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which state bytes may accompany a magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRule {
    /// Any byte; meaning is defined by the subsystem.
    Opaque,
    /// A known [`SyncState`], except the listed ones.
    Sync { reject: &'static [SyncState] },
}

impl StateRule {
    /// Whether `state` is a legal companion under this rule.
    pub fn permits(self, state: u8) -> bool {
        match self {
            StateRule::Opaque => true,
            StateRule::Sync { reject } => {
                SyncState::from_u8(state).is_some_and(|state| !reject.contains(&state))
            }
        }
    }

    pub fn describe(self) -> String {
        match self {
            StateRule::Opaque => "any".to_string(),
            StateRule::Sync { reject: [] } => "sync".to_string(),
            StateRule::Sync { reject } => {
                let names: Vec<&str> = reject.iter().map(|s| s.name()).collect();
                format!("sync except {}", names.join(","))
            }
        }
    }
}

const ANY_SYNC: StateRule = StateRule::Sync { reject: &[] };
const REQUEST_SYNC: StateRule = StateRule::Sync {
    reject: &[SyncState::Acknowledge],
};

/// Registry entry for one magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicEntry {
    pub magic: Magic,
    pub class: MagicClass,
    pub sub_protocol: Option<SubProtocol>,
    /// Accepted responses (requests only); the first is the expected one.
    pub responses: &'static [Magic],
    pub payload: PayloadKind,
    pub states: StateRule,
}

impl MagicEntry {
    pub const fn request(
        magic: Magic,
        sub_protocol: SubProtocol,
        responses: &'static [Magic],
        payload: PayloadKind,
    ) -> Self {
        Self {
            magic,
            class: MagicClass::Request,
            sub_protocol: Some(sub_protocol),
            responses,
            payload,
            states: REQUEST_SYNC,
        }
    }

    pub const fn response(magic: Magic, sub_protocol: SubProtocol, payload: PayloadKind) -> Self {
        Self {
            magic,
            class: MagicClass::Response,
            sub_protocol: Some(sub_protocol),
            responses: &[],
            payload,
            states: ANY_SYNC,
        }
    }

    pub const fn notification(magic: Magic, payload: PayloadKind) -> Self {
        Self {
            magic,
            class: MagicClass::Notification,
            sub_protocol: None,
            responses: &[],
            payload,
            states: ANY_SYNC,
        }
    }

    /// Override the state rule.
    pub const fn with_states(mut self, states: StateRule) -> Self {
        self.states = states;
        self
    }

    pub fn shape(&self) -> Shape {
        self.payload.shape()
    }
}

/// The platform's magic table.
pub const STANDARD_ENTRIES: &[MagicEntry] = &[
    // Data plane: state byte is unused by the storage path.
    MagicEntry::request(
        Magic::DataWrDmaReq,
        SubProtocol::DataplaneIo,
        &[Magic::DataWrDmaAck],
        PayloadKind::Dataplane,
    )
    .with_states(StateRule::Opaque),
    MagicEntry::response(
        Magic::DataWrDmaAck,
        SubProtocol::DataplaneIo,
        PayloadKind::Dataplane,
    )
    .with_states(StateRule::Opaque),
    MagicEntry::request(
        Magic::DataRdDmaReq,
        SubProtocol::DataplaneIo,
        &[Magic::DataRdDmaAck],
        PayloadKind::Dataplane,
    )
    .with_states(StateRule::Opaque),
    MagicEntry::response(
        Magic::DataRdDmaAck,
        SubProtocol::DataplaneIo,
        PayloadKind::Dataplane,
    )
    .with_states(StateRule::Opaque),
    MagicEntry::request(
        Magic::TaskStateCmd,
        SubProtocol::TaskState,
        &[Magic::TaskStateResp],
        PayloadKind::Empty,
    ),
    MagicEntry::response(Magic::TaskStateResp, SubProtocol::TaskState, PayloadKind::Empty),
    MagicEntry::request(
        Magic::CryptoInjectCmd,
        SubProtocol::CryptoInject,
        &[Magic::CryptoInjectResp],
        PayloadKind::Bytes,
    ),
    MagicEntry::response(
        Magic::CryptoInjectResp,
        SubProtocol::CryptoInject,
        PayloadKind::Empty,
    ),
    MagicEntry::request(
        Magic::CryptoPinCmd,
        SubProtocol::Pin,
        &[Magic::CryptoPinResp],
        PayloadKind::Pin,
    ),
    MagicEntry::response(Magic::CryptoPinResp, SubProtocol::Pin, PayloadKind::Bytes),
    MagicEntry::notification(Magic::AuthStatePassed, PayloadKind::Empty),
    MagicEntry::request(
        Magic::DmaShmInfoCmd,
        SubProtocol::DmaShm,
        &[Magic::DmaShmInfoResp],
        PayloadKind::DWords,
    ),
    MagicEntry::response(Magic::DmaShmInfoResp, SubProtocol::DmaShm, PayloadKind::Empty),
    MagicEntry::request(
        Magic::DmaBufReadyCmd,
        SubProtocol::DmaBufReady,
        &[Magic::DmaBufReadyResp],
        PayloadKind::DWords,
    ),
    MagicEntry::response(
        Magic::DmaBufReadyResp,
        SubProtocol::DmaBufReady,
        PayloadKind::Empty,
    ),
    MagicEntry::request(
        Magic::StorageScsiBlockSizeCmd,
        SubProtocol::ScsiBlockSize,
        &[Magic::StorageScsiBlockSizeResp],
        PayloadKind::Empty,
    ),
    MagicEntry::response(
        Magic::StorageScsiBlockSizeResp,
        SubProtocol::ScsiBlockSize,
        PayloadKind::DWords,
    ),
    MagicEntry::request(
        Magic::StorageScsiBlockNumCmd,
        SubProtocol::ScsiBlockNum,
        &[Magic::StorageScsiBlockNumResp],
        PayloadKind::Empty,
    ),
    MagicEntry::response(
        Magic::StorageScsiBlockNumResp,
        SubProtocol::ScsiBlockNum,
        PayloadKind::DWords,
    ),
    MagicEntry::notification(Magic::StorageEjected, PayloadKind::Empty),
    MagicEntry::request(
        Magic::SettingsCmd,
        SubProtocol::Settings,
        &[Magic::SettingsLock],
        PayloadKind::Words,
    ),
    MagicEntry::response(Magic::SettingsLock, SubProtocol::Settings, PayloadKind::Empty),
    MagicEntry::notification(Magic::DfuDownloadStarted, PayloadKind::Empty),
    MagicEntry::request(
        Magic::DfuHeaderSend,
        SubProtocol::Dfu,
        &[Magic::DfuHeaderValid, Magic::DfuHeaderInvalid],
        PayloadKind::Bytes,
    ),
    MagicEntry::response(Magic::DfuHeaderValid, SubProtocol::Dfu, PayloadKind::Empty),
    MagicEntry::response(Magic::DfuHeaderInvalid, SubProtocol::Dfu, PayloadKind::Empty),
    MagicEntry::notification(Magic::DfuDownloadFinished, PayloadKind::Empty),
    MagicEntry::notification(Magic::DfuWriteFinished, PayloadKind::Empty),
    // Carries the running firmware version; no reply magic exists.
    MagicEntry::notification(Magic::DfuGetFwVersion, PayloadKind::DWords),
    MagicEntry::notification(Magic::RebootRequest, PayloadKind::Empty),
    MagicEntry::notification(Magic::InformationalMsg, PayloadKind::Bytes)
        .with_states(StateRule::Opaque),
];

/// Lookup table over the magic byte space.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    table: [Option<MagicEntry>; 256],
}

impl ProtocolRegistry {
    /// Registry for the platform's magic table.
    pub fn new() -> Self {
        let mut table = [None; 256];
        for entry in STANDARD_ENTRIES {
            table[usize::from(entry.magic.as_u8())] = Some(*entry);
        }
        Self { table }
    }

    /// Build a registry from a custom table, checking pairing invariants.
    pub fn from_entries(entries: &[MagicEntry]) -> Result<Self, RegistryError> {
        let mut table: [Option<MagicEntry>; 256] = [None; 256];
        for entry in entries {
            if entry.magic == Magic::Invalid || entry.class == MagicClass::Invalid {
                return Err(RegistryError::SentinelRegistered);
            }
            let slot = &mut table[usize::from(entry.magic.as_u8())];
            if slot.is_some() {
                return Err(RegistryError::DuplicateMagic(entry.magic));
            }
            *slot = Some(*entry);
        }

        for entry in entries {
            validate_entry(entry, &table)?;
        }

        Ok(Self { table })
    }

    /// Entry for a wire byte, if registered.
    pub fn lookup(&self, byte: u8) -> Option<&MagicEntry> {
        self.table[usize::from(byte)].as_ref()
    }

    /// Entry for a magic, if registered.
    pub fn entry(&self, magic: Magic) -> Option<&MagicEntry> {
        self.lookup(magic.as_u8())
    }

    /// Registered entries in wire-value order.
    pub fn entries(&self) -> impl Iterator<Item = &MagicEntry> {
        self.table.iter().flatten()
    }

    /// Role of a magic. Unregistered magics and the sentinel are `Invalid`.
    pub fn classify(&self, magic: Magic) -> MagicClass {
        self.entry(magic)
            .map(|entry| entry.class)
            .unwrap_or(MagicClass::Invalid)
    }

    /// The response a request magic expects.
    pub fn expected_response(&self, magic: Magic) -> Option<Magic> {
        self.entry(magic)
            .filter(|entry| entry.class == MagicClass::Request)
            .and_then(|entry| entry.responses.first().copied())
    }

    /// Whether `response` closes a pending `request`.
    pub fn accepts_response(&self, request: Magic, response: Magic) -> bool {
        self.entry(request)
            .is_some_and(|entry| entry.responses.contains(&response))
    }

    /// Whether the magic uses the 10-byte data-plane shape.
    pub fn is_dataplane(&self, magic: Magic) -> bool {
        self.shape_of(magic) == Some(Shape::Dataplane)
    }

    pub fn shape_of(&self, magic: Magic) -> Option<Shape> {
        self.entry(magic).map(MagicEntry::shape)
    }

    pub fn payload_kind(&self, magic: Magic) -> Option<PayloadKind> {
        self.entry(magic).map(|entry| entry.payload)
    }

    pub fn sub_protocol(&self, magic: Magic) -> Option<SubProtocol> {
        self.entry(magic).and_then(|entry| entry.sub_protocol)
    }

    /// Whether `state` may accompany `magic`. Unregistered magics permit nothing.
    pub fn permits_state(&self, magic: Magic, state: u8) -> bool {
        self.entry(magic)
            .is_some_and(|entry| entry.states.permits(state))
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_entry(
    entry: &MagicEntry,
    table: &[Option<MagicEntry>; 256],
) -> Result<(), RegistryError> {
    match entry.class {
        MagicClass::Request => {
            let sub = entry
                .sub_protocol
                .ok_or(RegistryError::MissingSubProtocol(entry.magic))?;
            if entry.responses.is_empty() {
                return Err(RegistryError::RequestWithoutResponse(entry.magic));
            }
            for response in entry.responses {
                let paired = table[usize::from(response.as_u8())].as_ref();
                let ok = paired.is_some_and(|paired| {
                    paired.class == MagicClass::Response && paired.sub_protocol == Some(sub)
                });
                if !ok {
                    return Err(RegistryError::BadResponse {
                        request: entry.magic,
                        response: *response,
                    });
                }
            }
        }
        MagicClass::Response => {
            if entry.sub_protocol.is_none() {
                return Err(RegistryError::MissingSubProtocol(entry.magic));
            }
        }
        MagicClass::Notification => {
            if entry.sub_protocol.is_some() || !entry.responses.is_empty() {
                return Err(RegistryError::NotificationPairing(entry.magic));
            }
        }
        MagicClass::Invalid => return Err(RegistryError::SentinelRegistered),
    }

    // The data-plane shape is reserved for the data-plane sub-protocol.
    let dataplane_sub = entry.sub_protocol == Some(SubProtocol::DataplaneIo);
    if (entry.payload == PayloadKind::Dataplane) != dataplane_sub {
        return Err(RegistryError::BadPayloadKind {
            magic: entry.magic,
            kind: entry.payload,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_passes_validation() {
        let registry = ProtocolRegistry::from_entries(STANDARD_ENTRIES).unwrap();
        assert_eq!(registry.entries().count(), Magic::ALL.len() - 1);
    }

    #[test]
    fn every_magic_has_exactly_one_class() {
        let registry = ProtocolRegistry::new();
        for magic in Magic::ALL {
            let class = registry.classify(magic);
            if magic == Magic::Invalid {
                assert_eq!(class, MagicClass::Invalid);
            } else {
                assert_ne!(class, MagicClass::Invalid, "{magic} must be registered");
            }
        }
    }

    #[test]
    fn expected_responses() {
        let registry = ProtocolRegistry::new();
        assert_eq!(
            registry.expected_response(Magic::DmaBufReadyCmd),
            Some(Magic::DmaBufReadyResp)
        );
        assert_eq!(
            registry.expected_response(Magic::DataWrDmaReq),
            Some(Magic::DataWrDmaAck)
        );
        assert_eq!(registry.expected_response(Magic::DmaBufReadyResp), None);
        assert_eq!(registry.expected_response(Magic::RebootRequest), None);
        assert_eq!(registry.expected_response(Magic::Invalid), None);
        assert!(registry.accepts_response(Magic::DfuHeaderSend, Magic::DfuHeaderInvalid));
        assert!(!registry.accepts_response(Magic::DfuHeaderSend, Magic::DfuWriteFinished));
    }

    #[test]
    fn notifications_have_no_sub_protocol() {
        let registry = ProtocolRegistry::new();
        for magic in [
            Magic::RebootRequest,
            Magic::InformationalMsg,
            Magic::StorageEjected,
            Magic::AuthStatePassed,
        ] {
            assert_eq!(registry.classify(magic), MagicClass::Notification);
            assert_eq!(registry.sub_protocol(magic), None);
        }
    }

    #[test]
    fn dataplane_selection() {
        let registry = ProtocolRegistry::new();
        for magic in Magic::ALL {
            let expected = matches!(
                magic,
                Magic::DataWrDmaReq | Magic::DataWrDmaAck | Magic::DataRdDmaReq | Magic::DataRdDmaAck
            );
            assert_eq!(registry.is_dataplane(magic), expected, "{magic}");
        }
        assert_eq!(registry.shape_of(Magic::RebootRequest), Some(Shape::Command));
        assert_eq!(registry.shape_of(Magic::CryptoPinCmd), Some(Shape::CommandData));
        assert_eq!(registry.shape_of(Magic::Invalid), None);
    }

    #[test]
    fn state_rules() {
        let registry = ProtocolRegistry::new();
        assert!(registry.permits_state(Magic::CryptoPinCmd, SyncState::AskForData.as_u8()));
        assert!(!registry.permits_state(Magic::CryptoPinCmd, SyncState::Acknowledge.as_u8()));
        assert!(registry.permits_state(Magic::CryptoPinResp, SyncState::Acknowledge.as_u8()));
        assert!(!registry.permits_state(Magic::TaskStateResp, 9));
        assert!(registry.permits_state(Magic::DataRdDmaReq, 0xee));
        assert!(registry.permits_state(Magic::InformationalMsg, 0x80));
        assert!(!registry.permits_state(Magic::Invalid, 0));
    }

    #[test]
    fn rejects_sentinel_entry() {
        let entries = [MagicEntry::notification(Magic::Invalid, PayloadKind::Empty)];
        assert_eq!(
            ProtocolRegistry::from_entries(&entries).unwrap_err(),
            RegistryError::SentinelRegistered
        );
    }

    #[test]
    fn rejects_duplicate_entry() {
        let entries = [
            MagicEntry::notification(Magic::RebootRequest, PayloadKind::Empty),
            MagicEntry::notification(Magic::RebootRequest, PayloadKind::Empty),
        ];
        assert_eq!(
            ProtocolRegistry::from_entries(&entries).unwrap_err(),
            RegistryError::DuplicateMagic(Magic::RebootRequest)
        );
    }

    #[test]
    fn rejects_cross_sub_protocol_response() {
        let entries = [
            MagicEntry::request(
                Magic::TaskStateCmd,
                SubProtocol::TaskState,
                &[Magic::CryptoPinResp],
                PayloadKind::Empty,
            ),
            MagicEntry::response(Magic::CryptoPinResp, SubProtocol::Pin, PayloadKind::Bytes),
        ];
        assert_eq!(
            ProtocolRegistry::from_entries(&entries).unwrap_err(),
            RegistryError::BadResponse {
                request: Magic::TaskStateCmd,
                response: Magic::CryptoPinResp,
            }
        );
    }

    #[test]
    fn rejects_request_without_response() {
        let entries = [MagicEntry::request(
            Magic::SettingsCmd,
            SubProtocol::Settings,
            &[],
            PayloadKind::Words,
        )];
        assert_eq!(
            ProtocolRegistry::from_entries(&entries).unwrap_err(),
            RegistryError::RequestWithoutResponse(Magic::SettingsCmd)
        );
    }

    #[test]
    fn rejects_dataplane_shape_outside_data_plane() {
        let entries = [MagicEntry::notification(
            Magic::StorageEjected,
            PayloadKind::Dataplane,
        )];
        assert!(matches!(
            ProtocolRegistry::from_entries(&entries).unwrap_err(),
            RegistryError::BadPayloadKind { .. }
        ));
    }

    #[test]
    fn subset_registry_classifies_missing_as_invalid() {
        let entries = [MagicEntry::notification(Magic::RebootRequest, PayloadKind::Empty)];
        let registry = ProtocolRegistry::from_entries(&entries).unwrap();
        assert_eq!(registry.classify(Magic::RebootRequest), MagicClass::Notification);
        assert_eq!(registry.classify(Magic::TaskStateCmd), MagicClass::Invalid);
    }
}
