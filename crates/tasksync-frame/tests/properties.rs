use proptest::prelude::*;
use tasksync_frame::{
    Codec, DecodeError, Magic, MagicEntry, Message, Payload, PayloadKind, PinFieldType,
    PinRequest, PinRequestKind, ProtocolRegistry, COMMAND_DATA_SIZE, MAX_PAYLOAD, PIN_NAME_LEN,
};

fn registry_entries() -> Vec<MagicEntry> {
    ProtocolRegistry::new().entries().copied().collect()
}

/// Build a valid message for `entry` out of arbitrary raw material.
fn message_for(entry: &MagicEntry, state: u8, raw: &[u8], a: u32, b: u32, tags: (u8, u8)) -> Message {
    let magic = entry.magic;
    match entry.payload {
        PayloadKind::Empty => Message::command(magic, state),
        PayloadKind::Bytes => Message::with_bytes(magic, state, raw.to_vec()),
        PayloadKind::Words => Message::with_payload(
            magic,
            state,
            Payload::Words(
                raw.chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
        ),
        PayloadKind::DWords => Message::with_payload(
            magic,
            state,
            Payload::DWords(
                raw.chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
        ),
        PayloadKind::Pin => {
            let field = PinFieldType::from_u8(tags.0).unwrap();
            let request = PinRequestKind::from_u8(tags.1).unwrap();
            let name = &raw[..raw.len().min(PIN_NAME_LEN)];
            Message::pin(magic, state, PinRequest::new(field, request, name).unwrap())
        }
        PayloadKind::Dataplane => Message::dataplane(magic, state, a, b),
    }
}

fn quiet_codec() -> Codec {
    Codec::with_config(
        std::sync::Arc::new(ProtocolRegistry::new()),
        tasksync_frame::CodecConfig {
            panic_on_encode_overflow: false,
        },
    )
}

proptest! {
    #[test]
    fn prop_roundtrip_every_registered_magic(
        index in 0usize..31,
        state in any::<u8>(),
        raw in prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD),
        a in any::<u32>(),
        b in any::<u32>(),
        field in 1u8..=3,
        request in 1u8..=2,
    ) {
        let entries = registry_entries();
        let entry = &entries[index % entries.len()];
        let message = message_for(entry, state, &raw, a, b, (field, request));

        let codec = quiet_codec();
        let wire = codec.encode(&message).unwrap();
        prop_assert_eq!(wire.len(), message.wire_size());

        let (decoded, used) = codec.decode_prefix(&wire).unwrap();
        prop_assert_eq!(used, wire.len());
        prop_assert_eq!(decoded, message);
    }

    #[test]
    fn prop_unknown_first_byte_is_unknown_magic(
        first in any::<u8>(),
        tail in prop::collection::vec(any::<u8>(), 0..80),
    ) {
        prop_assume!(Magic::from_u8(first).is_none());

        let mut bytes = vec![first];
        bytes.extend(tail);
        let err = quiet_codec().decode(&bytes).unwrap_err();
        prop_assert_eq!(err, DecodeError::UnknownMagic { byte: first, offset: 0 });
    }

    #[test]
    fn prop_declared_size_above_max_is_rejected(
        index in 0usize..31,
        size in (MAX_PAYLOAD as u16 + 1)..=u16::MAX,
    ) {
        let entries: Vec<MagicEntry> = registry_entries()
            .into_iter()
            .filter(|e| e.payload.shape() == tasksync_frame::Shape::CommandData)
            .collect();
        let entry = &entries[index % entries.len()];

        let mut frame = vec![0u8; COMMAND_DATA_SIZE];
        frame[0] = entry.magic.as_u8();
        frame[2..4].copy_from_slice(&size.to_le_bytes());
        let is_overflow = matches!(
            quiet_codec().decode(&frame),
            Err(DecodeError::SizeOverflow { .. })
        );
        prop_assert!(is_overflow);
    }

    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..160)) {
        let codec = quiet_codec();
        match codec.decode_prefix(&bytes) {
            Ok((message, used)) => {
                prop_assert!(used <= bytes.len());
                prop_assert_eq!(used, message.wire_size());
            }
            Err(err) => prop_assert!(err.offset() <= bytes.len()),
        }
    }
}
