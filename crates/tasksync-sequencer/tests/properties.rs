use proptest::prelude::*;
use tasksync_frame::{MagicClass, MagicEntry, Message, ProtocolRegistry, SubProtocol};
use tasksync_sequencer::{Direction, Sequencer, SubProtocolState};

fn registry_entries() -> Vec<MagicEntry> {
    ProtocolRegistry::new().entries().copied().collect()
}

fn frames() -> impl Strategy<Value = Vec<(usize, bool, u8)>> {
    let count = registry_entries().len();
    prop::collection::vec((0..count, any::<bool>(), 0u8..6), 0..64)
}

fn to_message(entries: &[MagicEntry], frame: (usize, bool, u8)) -> (Direction, Message) {
    let (index, outbound, state) = frame;
    let direction = if outbound {
        Direction::Outbound
    } else {
        Direction::Inbound
    };
    (direction, Message::command(entries[index].magic, state))
}

proptest! {
    #[test]
    fn prop_pending_requests_belong_to_their_sub_protocol(frames in frames()) {
        let entries = registry_entries();
        let registry = ProtocolRegistry::new();
        let mut sequencer = Sequencer::new();
        for frame in frames {
            let (direction, message) = to_message(&entries, frame);
            let _ = sequencer.admit(direction, &message);
        }
        for (sub, request) in sequencer.pending() {
            prop_assert_eq!(registry.classify(request), MagicClass::Request);
            prop_assert_eq!(registry.sub_protocol(request), Some(sub));
        }
    }

    #[test]
    fn prop_desync_is_sticky_until_reset(frames in frames()) {
        let entries = registry_entries();
        let mut sequencer = Sequencer::new();
        let mut desynced = Vec::new();
        for frame in frames {
            let (direction, message) = to_message(&entries, frame);
            let _ = sequencer.admit(direction, &message);
            for sub in SubProtocol::ALL {
                let now = sequencer.state(sub) == SubProtocolState::Desynced;
                if desynced.contains(&sub) {
                    prop_assert!(now, "{} left Desynced without a reset", sub);
                } else if now {
                    desynced.push(sub);
                }
            }
        }
    }

    #[test]
    fn prop_sub_protocols_are_independent(frames in frames(), pick in 0..SubProtocol::ALL.len()) {
        let entries = registry_entries();
        let target = SubProtocol::ALL[pick];

        let mut full = Sequencer::new();
        let mut isolated = Sequencer::new();
        for frame in frames {
            let entry = entries[frame.0];
            let (direction, message) = to_message(&entries, frame);
            let _ = full.admit(direction, &message);
            if entry.sub_protocol == Some(target) || entry.class == MagicClass::Notification {
                let _ = isolated.admit(direction, &message);
            }
        }
        prop_assert_eq!(full.state(target), isolated.state(target));
    }
}
