use std::io::{ErrorKind, Write};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{Codec, CodecConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::registry::ProtocolRegistry;
use crate::wire::COMMAND_DATA_SIZE;

/// Writes complete messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    codec: Codec,
}

impl<T: Write> MessageWriter<T> {
    /// Create a writer over the platform registry.
    pub fn new(inner: T) -> Self {
        Self::with_codec(inner, Codec::new())
    }

    pub fn with_registry(inner: T, registry: Arc<ProtocolRegistry>) -> Self {
        Self::with_codec(inner, Codec::with_registry(registry))
    }

    pub fn with_config(inner: T, registry: Arc<ProtocolRegistry>, config: CodecConfig) -> Self {
        Self::with_codec(inner, Codec::with_config(registry, config))
    }

    pub fn with_codec(inner: T, codec: Codec) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(COMMAND_DATA_SIZE),
            codec,
        }
    }

    /// Encode and write one whole frame (blocking), then flush.
    ///
    /// Nothing is written when encoding fails.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        self.buf.clear();
        self.codec.encode_into(message, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(magic = %message.magic(), len = offset, "message written");

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::EncodeError;
    use crate::magic::{Magic, SyncState};
    use crate::message::Payload;

    #[test]
    fn write_fixed_size_frames() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        writer
            .send(&Message::command(Magic::TaskStateCmd, SyncState::Ready))
            .unwrap();
        writer
            .send(&Message::with_payload(
                Magic::SettingsCmd,
                SyncState::Ready,
                Payload::Words(vec![0x0102]),
            ))
            .unwrap();
        writer
            .send(&Message::dataplane(Magic::DataWrDmaAck, 0u8, 1, 1))
            .unwrap();

        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len(), 2 + 68 + 10);
        assert_eq!(&bytes[..2], &[0x42, 0x00]);
        assert_eq!(&bytes[2..8], &[0x90, 0x00, 0x02, 0x00, 0x02, 0x01]);
        assert_eq!(bytes[70], 0x02);
    }

    #[test]
    fn encode_failure_writes_nothing() {
        let mut writer = MessageWriter::with_config(
            Cursor::new(Vec::<u8>::new()),
            Arc::new(ProtocolRegistry::new()),
            CodecConfig {
                panic_on_encode_overflow: false,
            },
        );
        let err = writer
            .send(&Message::with_bytes(
                Magic::CryptoInjectCmd,
                SyncState::Ready,
                vec![0u8; 100],
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Encode(EncodeError::SizeOverflow { size: 100, .. })
        ));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer
            .send(&Message::command(Magic::RebootRequest, 0u8))
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer
            .send(&Message::command(Magic::StorageEjected, 0u8))
            .unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
