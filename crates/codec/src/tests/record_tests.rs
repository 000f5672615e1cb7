use crate::*;

// -------------------- Helpers --------------------

fn make_record(key: &str, embedding: Vec<f32>) -> DataRecord {
    DataRecord {
        op: OpType::Insert,
        sequence: 1,
        timestamp: 1_700_000_000_000,
        key: key.to_string(),
        embedding,
    }
}

fn roundtrip(record: &DataRecord) -> DataRecord {
    let buf = serialize_record(record);
    let (decoded, read) = deserialize_record(&buf, 0).unwrap();
    assert_eq!(read, buf.len());
    decoded
}

// -------------------- Roundtrips --------------------

#[test]
fn insert_roundtrip() {
    let record = make_record("a", vec![0.25, -0.5, 1.0, 0.0]);
    assert_eq!(roundtrip(&record), record);
}

#[test]
fn empty_key_roundtrip() {
    let record = make_record("", vec![1.0, 2.0]);
    assert_eq!(roundtrip(&record), record);
}

#[test]
fn delete_roundtrip_with_zero_vector() {
    let record = DataRecord {
        op: OpType::Delete,
        sequence: 9,
        timestamp: 0,
        key: "gone".to_string(),
        embedding: vec![0.0; 4],
    };
    assert_eq!(roundtrip(&record), record);
}

#[test]
fn common_dimensions_roundtrip() {
    for dim in [1usize, 8, 384, 768, 1536, 4096] {
        let embedding: Vec<f32> = (0..dim).map(|i| i as f32 * 0.5).collect();
        let record = make_record("dims", embedding);
        assert_eq!(roundtrip(&record), record, "dimension {dim}");
    }
}

#[test]
fn special_floats_survive() {
    let record = make_record(
        "specials",
        vec![
            0.0,
            -0.0,
            f32::MAX,
            f32::MIN,
            f32::MIN_POSITIVE,
            1.0e-40, // subnormal
            f32::INFINITY,
            f32::NEG_INFINITY,
        ],
    );
    let decoded = roundtrip(&record);
    assert_eq!(decoded.embedding, record.embedding);
    assert!(decoded.embedding[1].is_sign_negative());
}

#[test]
fn nan_is_nan_after_decode() {
    let buf = serialize_record(&make_record("nan", vec![f32::NAN, 1.0]));
    let (decoded, _) = deserialize_record(&buf, 0).unwrap();
    assert!(decoded.embedding[0].is_nan());
    assert_eq!(decoded.embedding[1], 1.0);
}

#[test]
fn multibyte_utf8_key() {
    let record = make_record("clé-日本語", vec![1.0]);
    assert_eq!(roundtrip(&record), record);
}

#[test]
fn decode_at_nonzero_offset() {
    let first = serialize_record(&make_record("first", vec![1.0, 2.0]));
    let second = serialize_record(&make_record("second", vec![3.0, 4.0]));
    let mut buf = first.clone();
    buf.extend_from_slice(&second);

    let (a, read) = deserialize_record(&buf, 0).unwrap();
    assert_eq!(a.key, "first");
    let (b, _) = deserialize_record(&buf, read).unwrap();
    assert_eq!(b.key, "second");
}

#[test]
fn record_len_matches_encoding() {
    let record = make_record("sized", vec![1.0; 7]);
    assert_eq!(serialize_record(&record).len(), record_len("sized", 7));
}

// -------------------- Corruption detection --------------------

#[test]
fn any_single_bit_flip_outside_magic_is_caught() {
    let buf = serialize_record(&make_record("k", vec![0.5, -0.5]));
    // Flip one bit at every byte position past the magic; either the CRC
    // or the trailer must reject the frame.
    for pos in 4..buf.len() {
        let mut damaged = buf.clone();
        damaged[pos] ^= 0x01;
        assert_eq!(
            deserialize_record(&damaged, 0),
            Err(CodecError::Corrupt),
            "flip at byte {pos} went undetected"
        );
    }
}

#[test]
fn bad_magic_is_corrupt() {
    let mut buf = serialize_record(&make_record("k", vec![1.0]));
    buf[0] ^= 0xFF;
    assert_eq!(deserialize_record(&buf, 0), Err(CodecError::Corrupt));
}

#[test]
fn wrong_version_is_corrupt() {
    let mut buf = serialize_record(&make_record("k", vec![1.0]));
    buf[4..6].copy_from_slice(&1u16.to_le_bytes());
    assert_eq!(deserialize_record(&buf, 0), Err(CodecError::Corrupt));
}

#[test]
fn invalid_op_byte_is_corrupt() {
    let mut buf = serialize_record(&make_record("k", vec![1.0]));
    buf[6] = 9;
    assert_eq!(deserialize_record(&buf, 0), Err(CodecError::Corrupt));
}

#[test]
fn truncated_buffer_is_corrupt() {
    let buf = serialize_record(&make_record("key", vec![1.0, 2.0, 3.0]));
    for cut in [0, 10, KEY_OFFSET, buf.len() - 1] {
        assert_eq!(
            deserialize_record(&buf[..cut], 0),
            Err(CodecError::Corrupt),
            "cut at {cut}"
        );
    }
}

#[test]
fn start_past_end_is_corrupt() {
    let buf = serialize_record(&make_record("k", vec![1.0]));
    assert_eq!(
        deserialize_record(&buf, buf.len() + 1),
        Err(CodecError::Corrupt)
    );
}

#[test]
fn non_utf8_key_is_corrupt() {
    let mut buf = serialize_record(&make_record("ab", vec![1.0]));
    buf[KEY_OFFSET] = 0xFF;
    // CRC catches the edit; rewrite is not needed to prove rejection.
    assert_eq!(deserialize_record(&buf, 0), Err(CodecError::Corrupt));
}

// -------------------- Key-only reads --------------------

#[test]
fn read_key_without_decoding_embedding() {
    let buf = serialize_record(&make_record("the-key", vec![1.0; 384]));
    assert_eq!(read_key_from_buffer(&buf, 0).as_deref(), Some("the-key"));
}

#[test]
fn read_key_needs_only_the_prefix() {
    // Recovery reads at most 1 KiB per entry; the key must decode from a
    // prefix that excludes the embedding.
    let buf = serialize_record(&make_record("prefix", vec![1.0; 4096]));
    assert_eq!(
        read_key_from_buffer(&buf[..KEY_OFFSET + 6], 0).as_deref(),
        Some("prefix")
    );
}

#[test]
fn read_key_empty_key() {
    let buf = serialize_record(&make_record("", vec![1.0]));
    assert_eq!(read_key_from_buffer(&buf, 0).as_deref(), Some(""));
}

#[test]
fn read_key_bad_magic_is_none() {
    let mut buf = serialize_record(&make_record("k", vec![1.0]));
    buf[0] ^= 0xFF;
    assert_eq!(read_key_from_buffer(&buf, 0), None);
}

#[test]
fn read_key_short_buffer_is_none() {
    let buf = serialize_record(&make_record("longish-key", vec![1.0]));
    assert_eq!(read_key_from_buffer(&buf[..KEY_OFFSET + 2], 0), None);
}
