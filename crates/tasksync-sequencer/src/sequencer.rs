use std::fmt;
use std::sync::Arc;

use tasksync_frame::{
    Magic, MagicClass, MagicEntry, Message, PinRequestKind, ProtocolRegistry, SubProtocol,
};
use tracing::{debug, warn};

use crate::error::SequenceError;

const SUB_PROTOCOLS: usize = SubProtocol::ALL.len();

/// Which way a message crossed the channel, seen from this end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by this end.
    Outbound,
    /// Received from the peer.
    Inbound,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Protocol state of one sub-protocol instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubProtocolState {
    #[default]
    Idle,
    /// A request went out (or came in) and its response has not been seen.
    AwaitingResponse { request: Magic, direction: Direction },
    /// An out-of-sequence message was seen. Only `reset` leaves this state.
    Desynced,
}

/// Configuration for a [`Sequencer`].
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Reject state bytes outside each magic's state rule.
    pub check_states: bool,
    /// Reject PIN modify requests until `AUTH_STATE_PASSED` has been seen.
    pub require_auth_for_pin_modify: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            check_states: true,
            require_auth_for_pin_modify: true,
        }
    }
}

/// Per-channel protocol-state validator.
///
/// Owned by exactly one channel end. Each sub-protocol is sequenced on its
/// own: a desync in one never blocks another.
#[derive(Debug, Clone)]
pub struct Sequencer {
    registry: Arc<ProtocolRegistry>,
    slots: [SubProtocolState; SUB_PROTOCOLS],
    authenticated: bool,
    config: SequencerConfig,
}

impl Sequencer {
    /// Sequencer over the platform registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ProtocolRegistry::new()))
    }

    pub fn with_registry(registry: Arc<ProtocolRegistry>) -> Self {
        Self::with_config(registry, SequencerConfig::default())
    }

    pub fn with_config(registry: Arc<ProtocolRegistry>, config: SequencerConfig) -> Self {
        Self {
            registry,
            slots: [SubProtocolState::Idle; SUB_PROTOCOLS],
            authenticated: false,
            config,
        }
    }

    /// Check `message` against the protocol state and record it.
    ///
    /// Notifications never touch the per-sub-protocol state. A request opens
    /// its sub-protocol; only a registered response travelling the other way
    /// closes it. Any violation moves the sub-protocol to
    /// [`SubProtocolState::Desynced`] and is returned.
    pub fn admit(&mut self, direction: Direction, message: &Message) -> Result<(), SequenceError> {
        let magic = message.magic();
        let state = message.state();
        let Some(entry) = self.registry.entry(magic).copied() else {
            warn!(%magic, %direction, "rejecting unregistered magic");
            return Err(SequenceError::Unregistered { magic, state });
        };

        let sub = match (entry.class, entry.sub_protocol) {
            (MagicClass::Notification, _) => return self.admit_notification(&entry, state),
            (MagicClass::Request | MagicClass::Response, Some(sub)) => sub,
            _ => return Err(SequenceError::Unregistered { magic, state }),
        };

        if self.slots[sub.index()] == SubProtocolState::Desynced {
            debug!(%sub, %magic, "sub-protocol desynced; rejecting");
            return Err(SequenceError::Desynced { sub, magic, state });
        }

        let result = self.step(sub, &entry, direction, message);
        match &result {
            Ok(()) => debug!(%sub, %magic, %direction, state, "admitted"),
            Err(err) => {
                self.slots[sub.index()] = SubProtocolState::Desynced;
                warn!(%sub, error = %err, "sub-protocol desynced");
            }
        }
        result
    }

    /// Current state of one sub-protocol.
    pub fn state(&self, sub: SubProtocol) -> SubProtocolState {
        self.slots[sub.index()]
    }

    /// Request still waiting for its response in `sub`, if any.
    pub fn pending_request(&self, sub: SubProtocol) -> Option<Magic> {
        match self.slots[sub.index()] {
            SubProtocolState::AwaitingResponse { request, .. } => Some(request),
            _ => None,
        }
    }

    /// All sub-protocols waiting for a response, with the pending request.
    pub fn pending(&self) -> impl Iterator<Item = (SubProtocol, Magic)> + '_ {
        SubProtocol::ALL
            .into_iter()
            .filter_map(move |sub| self.pending_request(sub).map(|magic| (sub, magic)))
    }

    /// Whether `AUTH_STATE_PASSED` has been seen on this channel.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Return one sub-protocol to `Idle`, dropping any pending request.
    pub fn reset(&mut self, sub: SubProtocol) {
        debug!(%sub, "sub-protocol reset");
        self.slots[sub.index()] = SubProtocolState::Idle;
    }

    /// Return every sub-protocol to `Idle` and forget authentication.
    pub fn reset_all(&mut self) {
        self.slots = [SubProtocolState::Idle; SUB_PROTOCOLS];
        self.authenticated = false;
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    fn admit_notification(&mut self, entry: &MagicEntry, state: u8) -> Result<(), SequenceError> {
        let magic = entry.magic;
        if self.config.check_states && !entry.states.permits(state) {
            warn!(%magic, state, "notification with unexpected state");
            return Err(SequenceError::UnexpectedState {
                sub: None,
                magic,
                state,
            });
        }
        if magic == Magic::AuthStatePassed {
            self.authenticated = true;
        }
        debug!(%magic, state, "notification admitted");
        Ok(())
    }

    fn step(
        &mut self,
        sub: SubProtocol,
        entry: &MagicEntry,
        direction: Direction,
        message: &Message,
    ) -> Result<(), SequenceError> {
        let magic = entry.magic;
        let state = message.state();
        if self.config.check_states && !entry.states.permits(state) {
            return Err(SequenceError::UnexpectedState {
                sub: Some(sub),
                magic,
                state,
            });
        }

        let slot = &mut self.slots[sub.index()];
        match (entry.class, *slot) {
            (MagicClass::Request, SubProtocolState::AwaitingResponse { request, .. }) => {
                Err(SequenceError::AlreadyPending {
                    sub,
                    pending: request,
                    magic,
                    state,
                })
            }
            (MagicClass::Request, _) => {
                let modify = message
                    .pin_request()
                    .is_some_and(|req| req.request == PinRequestKind::Modify);
                if modify && self.config.require_auth_for_pin_modify && !self.authenticated {
                    return Err(SequenceError::NotAuthenticated { magic, state });
                }
                *slot = SubProtocolState::AwaitingResponse {
                    request: magic,
                    direction,
                };
                Ok(())
            }
            (
                MagicClass::Response,
                SubProtocolState::AwaitingResponse {
                    request,
                    direction: sent,
                },
            ) if direction == sent.reverse()
                && self.registry.accepts_response(request, magic) =>
            {
                *slot = SubProtocolState::Idle;
                Ok(())
            }
            (MagicClass::Response, current) => Err(SequenceError::UnexpectedMagic {
                sub,
                magic,
                state,
                direction,
                pending: match current {
                    SubProtocolState::AwaitingResponse { request, .. } => Some(request),
                    _ => None,
                },
            }),
            _ => Err(SequenceError::Unregistered { magic, state }),
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
