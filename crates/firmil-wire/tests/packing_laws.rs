//! Packing Law Tests

use firmil_wire::packing::{
    decode_7bit, encode_7bit, encoded_7bit_len, get_int14, get_two_7bit, get_u32, put_int14,
    put_two_7bit, put_u32,
};
use proptest::prelude::*;

#[test]
fn test_pack_0x12345678() {
    let mut out = Vec::new();
    put_u32(&mut out, 0x1234_5678);
    assert!(out.iter().all(|b| b & 0x80 == 0));
    assert_eq!(out, vec![0x78, 0x2C, 0x51, 0x11, 0x01]);
    assert_eq!(get_u32(&out, 0).unwrap(), 0x1234_5678);
}

proptest! {
    #[test]
    fn prop_u32_round_trip(v in any::<u32>()) {
        let mut out = Vec::new();
        put_u32(&mut out, v);
        prop_assert_eq!(out.len(), 5);
        prop_assert!(out.iter().all(|b| b & 0x80 == 0));
        prop_assert_eq!(get_u32(&out, 0).unwrap(), v);
    }

    #[test]
    fn prop_int14_keeps_low_bits(v in any::<u16>()) {
        let mut out = Vec::new();
        put_int14(&mut out, v);
        prop_assert_eq!(get_int14(&out, 0).unwrap(), v & 0x3FFF);
    }

    #[test]
    fn prop_7bit_stream_round_trip(data in prop::collection::vec(any::<u8>(), 0..200)) {
        let encoded = encode_7bit(&data);
        prop_assert_eq!(encoded.len(), encoded_7bit_len(data.len()));
        prop_assert!(encoded.iter().all(|b| b & 0x80 == 0));
        prop_assert_eq!(decode_7bit(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn prop_two_7bit_round_trip(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut out = Vec::new();
        put_two_7bit(&mut out, &data);
        prop_assert_eq!(get_two_7bit(&out).unwrap(), data);
    }
}
