// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hostile-input checks for the packet decoder.

use loom_bridge_proto::wire::{decode_message, encode_message, FireEventPayload, Message, WireError, HEADER_BYTES};
use proptest::prelude::*;

fn fire(widget_id: u32, event_name: &str) -> Vec<u8> {
    let msg = Message::FireEvent(FireEventPayload {
        widget_id,
        event_name: event_name.to_owned(),
    });
    encode_message(&msg, 9).expect("encode")
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = decode_message(&bytes);
    }

    #[test]
    fn garbage_after_magic_never_panics(rest in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut bytes = b"LOOM".to_vec();
        bytes.extend_from_slice(&rest);
        let _ = decode_message(&bytes);
    }

    #[test]
    fn flipped_body_byte_fails_the_checksum(
        widget_id in any::<u32>(),
        event_name in "[a-z]{1,16}",
        pick in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut bytes = fire(widget_id, &event_name);
        let at = HEADER_BYTES + pick.index(bytes.len() - HEADER_BYTES);
        bytes[at] ^= mask;
        prop_assert_eq!(decode_message(&bytes).unwrap_err(), WireError::ChecksumMismatch);
    }

    #[test]
    fn truncated_packets_are_incomplete(
        widget_id in any::<u32>(),
        pick in any::<prop::sample::Index>(),
    ) {
        let bytes = fire(widget_id, "press");
        let cut = pick.index(bytes.len());
        prop_assert_eq!(decode_message(&bytes[..cut]).unwrap_err(), WireError::Incomplete);
    }
}

#[test]
fn trailing_bytes_are_left_for_the_next_packet() {
    let mut bytes = fire(3, "press");
    let first = bytes.len();
    bytes.extend_from_slice(&fire(4, "release"));

    let (msg, seq, used) = decode_message(&bytes).expect("first packet");
    assert_eq!(used, first);
    assert_eq!(seq, 9);
    assert_eq!(
        msg,
        Message::FireEvent(FireEventPayload {
            widget_id: 3,
            event_name: "press".into(),
        })
    );
}
