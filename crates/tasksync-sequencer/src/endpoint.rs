use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;

use tasksync_frame::{
    Codec, CodecConfig, MagicClass, Message, MessageReader, MessageWriter, ProtocolRegistry,
    SubProtocol,
};
use tracing::debug;

use crate::error::{EndpointError, Result};
use crate::sequencer::{Direction, Sequencer, SequencerConfig};

/// Configuration for an [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Messages `request` may queue while waiting for its response.
    pub max_backlog: usize,
    pub codec: CodecConfig,
    pub sequencer: SequencerConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_backlog: 32,
            codec: CodecConfig::default(),
            sequencer: SequencerConfig::default(),
        }
    }
}

/// One end of a task sync channel.
///
/// Every message sent or received passes through the endpoint's
/// [`Sequencer`] first. Not meant to be shared: a single task owns it.
pub struct Endpoint<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
    sequencer: Sequencer,
    backlog: VecDeque<Message>,
    max_backlog: usize,
}

impl<R: Read, W: Write> Endpoint<R, W> {
    /// Endpoint over the platform registry with default configuration.
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(
            reader,
            writer,
            Arc::new(ProtocolRegistry::new()),
            EndpointConfig::default(),
        )
    }

    pub fn with_config(
        reader: R,
        writer: W,
        registry: Arc<ProtocolRegistry>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            reader: MessageReader::with_registry(reader, Arc::clone(&registry)),
            writer: MessageWriter::with_codec(
                writer,
                Codec::with_config(Arc::clone(&registry), config.codec),
            ),
            sequencer: Sequencer::with_config(registry, config.sequencer),
            backlog: VecDeque::new(),
            max_backlog: config.max_backlog,
        }
    }

    /// Admit `message` as outbound, then write it.
    ///
    /// A rejected message is never written. If the write itself fails the
    /// sequencer has already recorded the message; `reset` the sub-protocol
    /// before retrying.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.sequencer.admit(Direction::Outbound, message)?;
        self.writer.send(message)?;
        Ok(())
    }

    /// Next admitted inbound message, oldest queued one first.
    pub fn recv(&mut self) -> Result<Message> {
        if let Some(message) = self.backlog.pop_front() {
            return Ok(message);
        }
        self.read_admitted()
    }

    /// Send a request and block until its response arrives.
    ///
    /// Other admitted messages received meanwhile are queued for `recv`.
    pub fn request(&mut self, message: &Message) -> Result<Message> {
        let magic = message.magic();
        let registry = self.sequencer.registry();
        if registry.classify(magic) != MagicClass::Request {
            return Err(EndpointError::NotARequest(magic));
        }
        let sub = registry
            .sub_protocol(magic)
            .ok_or(EndpointError::NotARequest(magic))?;

        self.send(message)?;
        self.await_response(sub)
    }

    /// Block until the pending request of `sub` is answered.
    ///
    /// Use this to resume after `request` returned an error for an
    /// unrelated message.
    pub fn await_response(&mut self, sub: SubProtocol) -> Result<Message> {
        loop {
            let message = self.read_admitted()?;
            let registry = self.sequencer.registry();
            let answers = registry.sub_protocol(message.magic()) == Some(sub)
                && registry.classify(message.magic()) == MagicClass::Response;
            if answers {
                return Ok(message);
            }

            if self.backlog.len() >= self.max_backlog {
                return Err(EndpointError::BacklogFull(self.max_backlog));
            }
            debug!(magic = %message.magic(), %sub, "queued while awaiting response");
            self.backlog.push_back(message);
        }
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Mutable access, e.g. to `reset` a desynced sub-protocol.
    pub fn sequencer_mut(&mut self) -> &mut Sequencer {
        &mut self.sequencer
    }

    /// Messages queued by `request` and not yet returned by `recv`.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Consume the endpoint and return the underlying streams.
    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }

    fn read_admitted(&mut self) -> Result<Message> {
        let message = self.reader.read_message()?;
        self.sequencer.admit(Direction::Inbound, &message)?;
        Ok(message)
    }
}
