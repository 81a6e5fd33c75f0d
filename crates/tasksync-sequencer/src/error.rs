use tasksync_frame::{FrameError, Magic, SubProtocol};

use crate::sequencer::Direction;

/// A message that does not fit the current protocol state.
///
/// Every variant carries the offending magic and state byte; all but
/// `Unregistered` and `NotAuthenticated` also name the sub-protocol that was
/// moved to `Desynced`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    /// The magic has no registry entry (or is the invalid sentinel).
    #[error("{magic} state {state} is not a registered protocol magic")]
    Unregistered { magic: Magic, state: u8 },

    /// A response arrived with nothing pending, the wrong request pending,
    /// or in the same direction as its request.
    #[error(
        "{sub}: unexpected {direction} {magic} state {state} ({})",
        pending_label(.pending)
    )]
    UnexpectedMagic {
        sub: SubProtocol,
        magic: Magic,
        state: u8,
        direction: Direction,
        pending: Option<Magic>,
    },

    /// The state byte is not allowed for this magic.
    #[error("{magic}: state {state} is not allowed")]
    UnexpectedState {
        sub: Option<SubProtocol>,
        magic: Magic,
        state: u8,
    },

    /// A second request arrived before the first one was answered.
    #[error("{sub}: {magic} while {pending} is still pending")]
    AlreadyPending {
        sub: SubProtocol,
        pending: Magic,
        magic: Magic,
        state: u8,
    },

    /// The sub-protocol is desynced and must be reset first.
    #[error("{sub} is desynced; {magic} state {state} rejected")]
    Desynced {
        sub: SubProtocol,
        magic: Magic,
        state: u8,
    },

    /// A PIN modify request before authentication passed.
    #[error("{magic} state {state}: PIN modify before authentication")]
    NotAuthenticated { magic: Magic, state: u8 },
}

impl SequenceError {
    /// Magic of the rejected message.
    pub fn magic(&self) -> Magic {
        match self {
            SequenceError::Unregistered { magic, .. }
            | SequenceError::UnexpectedMagic { magic, .. }
            | SequenceError::UnexpectedState { magic, .. }
            | SequenceError::AlreadyPending { magic, .. }
            | SequenceError::Desynced { magic, .. }
            | SequenceError::NotAuthenticated { magic, .. } => *magic,
        }
    }

    /// Sub-protocol the rejected message belongs to, if any.
    pub fn sub_protocol(&self) -> Option<SubProtocol> {
        match self {
            SequenceError::Unregistered { .. } => None,
            SequenceError::UnexpectedState { sub, .. } => *sub,
            SequenceError::UnexpectedMagic { sub, .. }
            | SequenceError::AlreadyPending { sub, .. }
            | SequenceError::Desynced { sub, .. } => Some(*sub),
            SequenceError::NotAuthenticated { .. } => Some(SubProtocol::Pin),
        }
    }
}

fn pending_label(pending: &Option<Magic>) -> String {
    match pending {
        Some(magic) => format!("pending {magic}"),
        None => "nothing pending".to_string(),
    }
}

/// Errors from an [`Endpoint`](crate::Endpoint).
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Reading, writing or (de)serializing a frame failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The message was out of sequence.
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// `request` was called with a magic that expects no response.
    #[error("{0} is not a request magic")]
    NotARequest(Magic),

    /// Too many unrelated messages arrived while waiting for a response.
    #[error("backlog full ({0} messages) while waiting for a response")]
    BacklogFull(usize),
}

pub type Result<T> = std::result::Result<T, EndpointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_pending_request() {
        let err = SequenceError::UnexpectedMagic {
            sub: SubProtocol::DmaBufReady,
            magic: Magic::DmaShmInfoResp,
            state: 4,
            direction: Direction::Inbound,
            pending: Some(Magic::DmaBufReadyCmd),
        };
        let text = err.to_string();
        assert!(text.starts_with("dma-bufready"));
        assert!(text.contains("pending DMA_BUF_READY_CMD"));
        assert_eq!(err.magic(), Magic::DmaShmInfoResp);
    }

    #[test]
    fn not_authenticated_belongs_to_pin() {
        let err = SequenceError::NotAuthenticated {
            magic: Magic::CryptoPinCmd,
            state: 1,
        };
        assert_eq!(err.sub_protocol(), Some(SubProtocol::Pin));
    }
}
