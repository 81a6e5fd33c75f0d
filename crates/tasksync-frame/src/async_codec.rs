//! `tokio-util` codec adapter for framed async streams.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{resync_skip, Codec};
use crate::error::FrameError;
use crate::message::Message;

/// Decodes and encodes task sync messages on a `Framed` stream.
///
/// A malformed frame is dropped from the read buffer before the error is
/// returned, so a caller that decodes again resumes after it. Bytes of the
/// bad frame that have not arrived yet are dropped as they come in.
#[derive(Debug, Clone, Default)]
pub struct TaskSyncCodec {
    codec: Codec,
    position: usize,
    /// Bytes of a discarded frame still to be dropped.
    skip: usize,
}

impl TaskSyncCodec {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            position: 0,
            skip: 0,
        }
    }

    fn discard(&mut self, src: &mut BytesMut, len: usize) {
        let now = len.min(src.len());
        src.advance(now);
        self.position += now;
        self.skip = len - now;
    }
}

impl Decoder for TaskSyncCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        if self.skip > 0 {
            let pending = self.skip;
            self.discard(src, pending);
            if self.skip > 0 {
                return Ok(None);
            }
        }

        let before = src.len();
        match self.codec.decode_buf(src) {
            Ok(message) => {
                self.position += before - src.len();
                Ok(message)
            }
            Err(err) => {
                let err = err.rebase(self.position);
                self.discard(src, resync_skip(&err));
                Err(FrameError::Decode(err))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Message> for TaskSyncCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.codec.encode_into(&item, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::error::DecodeError;
    use crate::magic::{Magic, SyncState};

    #[tokio::test]
    async fn framed_roundtrip() {
        let mut out = Vec::new();
        {
            let mut sink = FramedWrite::new(&mut out, TaskSyncCodec::default());
            sink.send(Message::command(Magic::TaskStateCmd, SyncState::Ready))
                .await
                .unwrap();
            sink.send(Message::dataplane(Magic::DataRdDmaReq, 0u8, 7, 1))
                .await
                .unwrap();
        }

        let mut stream = FramedRead::new(out.as_slice(), TaskSyncCodec::default());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.magic(), Magic::TaskStateCmd);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second, Message::dataplane(Magic::DataRdDmaReq, 0u8, 7, 1));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_tail_is_connection_closed() {
        let bytes: &[u8] = &[0x62, 0x01, 0x1a];
        let mut stream = FramedRead::new(bytes, TaskSyncCodec::default());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn decode_error_skips_bad_byte() {
        let mut codec = TaskSyncCodec::default();
        let mut buf = BytesMut::from(&[0x10u8, 0xb0, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap_err(),
            FrameError::Decode(_)
        ));
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.magic(), Magic::RebootRequest);
    }

    #[test]
    fn oversize_frame_split_across_reads_is_dropped_whole() {
        let mut codec = TaskSyncCodec::default();
        let mut buf = BytesMut::from(&[0xc0u8, 0x00, 0x80, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf).unwrap_err(),
            FrameError::Decode(DecodeError::SizeOverflow { size: 128, .. })
        ));
        assert!(buf.is_empty());

        // The rest of the bad frame arrives in two pieces, each of which
        // would decode as REBOOT_REQUEST frames if it were not dropped.
        let body = [0xb0u8, 0x00].repeat(32);
        buf.extend_from_slice(&body[..40]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(&body[40..]);
        buf.extend_from_slice(&[0x86, 0x00]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.magic(), Magic::StorageEjected);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.position, 70);
    }
}
