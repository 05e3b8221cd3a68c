//! Decoder Resynchronization Tests

use firmil_types::{ClauseKind, ExceptionRegion, Token};
use firmil_wire::messages::decode_exception_clause;
use firmil_wire::{Decoder, ExecutorCommand, Inbound, MessageEncoder, Reply, parse_reply};
use proptest::prelude::*;

const ACK: [u8; 7] = [0xF0, 0x7B, 0x7F, 0x03, 0x00, 0x09, 0xF7];

fn sysex(events: &[Inbound]) -> Vec<&Vec<u8>> {
    events
        .iter()
        .filter_map(|e| match e {
            Inbound::Sysex(p) => Some(p),
            _ => None,
        })
        .collect()
}

#[test]
fn test_truncated_frame_then_good_frame() {
    let mut decoder = Decoder::new();
    let mut stream = vec![0xF0, 0x7B, 0x7D, 0x01, 0x05];
    stream.extend(ACK);
    let events = decoder.push(&stream);
    let replies = sysex(&events);
    assert_eq!(replies.len(), 1);
    assert_eq!(
        parse_reply(replies[0]).unwrap(),
        Reply::Ack {
            command: ExecutorCommand::LoadIl,
            sequence: 9
        }
    );
}

#[test]
fn test_nested_regions_keep_their_order() {
    let inner = ExceptionRegion {
        kind: ClauseKind::Catch,
        try_offset: 4,
        try_length: 6,
        handler_offset: 10,
        handler_length: 4,
        class_or_filter: 30,
    };
    let outer = ExceptionRegion {
        kind: ClauseKind::Finally,
        try_offset: 0,
        try_length: 16,
        handler_offset: 16,
        handler_length: 2,
        class_or_filter: 0,
    };
    let mut encoder = MessageEncoder::default();
    let frames = encoder
        .exception_clauses(Token::new(21), &[inner, outer])
        .unwrap();
    let decoded: Vec<ExceptionRegion> = frames
        .iter()
        .map(|f| decode_exception_clause(f.as_bytes()).unwrap().1)
        .collect();
    assert_eq!(decoded, vec![inner, outer]);
    assert!(decoded[0].is_nested_in(&decoded[1]));
}

proptest! {
    #[test]
    fn prop_corrupt_frame_yields_one_reply(
        body in prop::collection::vec(0u8..0x80, 0..40),
        terminator in prop::sample::select(vec![None, Some(0x90u8), Some(0xE5), Some(0xF9)]),
        split in 0usize..60,
    ) {
        let mut stream = vec![0xF0];
        stream.extend(&body);
        stream.extend(terminator);
        stream.extend(ACK);

        let split = split.min(stream.len());
        let mut decoder = Decoder::new();
        let mut events = decoder.push(&stream[..split]);
        events.extend(decoder.push(&stream[split..]));

        let replies = sysex(&events);
        prop_assert_eq!(replies.len(), 1);
        prop_assert_eq!(replies[0].as_slice(), &ACK[1..6]);
        prop_assert_eq!(decoder.resyncs(), 1);
    }
}
