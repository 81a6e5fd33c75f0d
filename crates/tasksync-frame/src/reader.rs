use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::{decode_message, resync_skip};
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::registry::ProtocolRegistry;
use crate::wire::COMMAND_DATA_SIZE;

const INITIAL_BUFFER_CAPACITY: usize = 4 * COMMAND_DATA_SIZE;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete messages.
/// A malformed frame is discarded and reported as `FrameError::Decode`; the
/// next call continues after it.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    registry: Arc<ProtocolRegistry>,
    /// Stream offset of `buf[0]`.
    position: usize,
    /// Bytes of a rejected frame that have not arrived yet.
    skip: usize,
}

impl<T: Read> MessageReader<T> {
    /// Create a reader over the platform registry.
    pub fn new(inner: T) -> Self {
        Self::with_registry(inner, Arc::new(ProtocolRegistry::new()))
    }

    pub fn with_registry(inner: T, registry: Arc<ProtocolRegistry>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            registry,
            position: 0,
            skip: 0,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            self.drain_skip();
            if self.skip == 0 {
                let before = self.buf.len();
                match decode_message(&mut self.buf, &self.registry) {
                    Ok(Some(message)) => {
                        self.position += before - self.buf.len();
                        trace!(magic = %message.magic(), offset = self.position, "message read");
                        return Ok(message);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let err = err.rebase(self.position);
                        self.discard(resync_skip(&err));
                        warn!(error = %err, "discarding malformed frame");
                        return Err(FrameError::Decode(err));
                    }
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Stream offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn discard(&mut self, len: usize) {
        let now = len.min(self.buf.len());
        self.buf.advance(now);
        self.position += now;
        self.skip = len - now;
    }

    fn drain_skip(&mut self) {
        if self.skip > 0 {
            let pending = self.skip;
            self.discard(pending);
        }
    }
}
