//! Codec Tests
//!
//! Tests for both framings: encoding, decoding and stream reading.

use std::io::Cursor;

use ringkv::cache::{CacheConfig, CacheStrategy};
use ringkv::protocol::{
    chunk_pairs, decode, encode_client, encode_control, encode_frame, read_message, write_client,
    write_control, ClientMessage, ControlMessage, Framing, KvPairs, Message, StatusType, MARKER,
    MAX_FIELD_SIZE, MAX_PAIR_SIZE, STATUS_WIDTH,
};
use ringkv::ring::{HashRing, RingNode};

fn client(message: Message) -> (ClientMessage, Framing) {
    match message {
        Message::Client { message, framing } => (message, framing),
        other => panic!("Expected client message, got {:?}", other),
    }
}

fn control(message: Message) -> ControlMessage {
    match message {
        Message::Control(control) => control,
        other => panic!("Expected control message, got {:?}", other),
    }
}

fn pairs(items: &[(&str, &str)]) -> KvPairs {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Internal Framing
// =============================================================================

#[test]
fn test_internal_frame_layout() {
    let frame = encode_client(&ClientMessage::put("k", "val"), Framing::Internal).unwrap();

    assert!(frame.starts_with(MARKER));
    let status = &frame[MARKER.len()..MARKER.len() + STATUS_WIDTH];
    assert_eq!(status, format!("{:<25}", "PUT").as_bytes());

    let rest = &frame[MARKER.len() + STATUS_WIDTH..];
    assert_eq!(&rest[..4], &1u32.to_be_bytes());
    assert_eq!(&rest[4..5], b"k");
    assert_eq!(&rest[5..9], &3u32.to_be_bytes());
    assert_eq!(&rest[9..12], b"val");
    assert_eq!(&rest[12..], b"\r\n");
}

#[test]
fn test_internal_client_messages_decode() {
    for request in [
        ClientMessage::get("hello"),
        ClientMessage::put("key with spaces", "value  with  runs"),
        ClientMessage::delete("gone"),
        ClientMessage::keyrange(),
    ] {
        let (decoded, framing) = client(decode(&encode_client(&request, Framing::Internal).unwrap()));
        assert_eq!(decoded, request);
        assert_eq!(framing, Framing::Internal);
    }
}

#[test]
fn test_internal_zero_length_fields_are_absent() {
    let (decoded, _) = client(decode(&encode_frame("GET_ERROR", b"k", b"").unwrap()));
    assert_eq!(decoded.key.as_deref(), Some("k"));
    assert_eq!(decoded.value, None);
}

#[test]
fn test_internal_unknown_status_rejected() {
    let message = decode(&encode_frame("NOT_A_STATUS", b"k", b"v").unwrap());
    assert!(matches!(
        message,
        Message::Malformed {
            framing: Framing::Internal,
            ..
        }
    ));
}

#[test]
fn test_internal_truncated_frame_rejected() {
    let frame = encode_client(&ClientMessage::put("key", "value"), Framing::Internal).unwrap();
    for cut in [MARKER.len() + 3, MARKER.len() + STATUS_WIDTH + 2, frame.len() - 4] {
        assert!(
            matches!(decode(&frame[..cut]), Message::Malformed { .. }),
            "accepted frame cut at {}",
            cut
        );
    }
}

#[test]
fn test_internal_trailing_bytes_rejected() {
    let mut frame = encode_frame("GET", b"k", b"").unwrap();
    let terminator = frame.split_off(frame.len() - 2);
    frame.extend_from_slice(b"junk");
    frame.extend_from_slice(&terminator);
    assert!(matches!(decode(&frame), Message::Malformed { .. }));
}

#[test]
fn test_internal_oversized_length_rejected() {
    let mut frame = MARKER.to_vec();
    frame.extend_from_slice(format!("{:<25}", "GET").as_bytes());
    frame.extend_from_slice(&u32::MAX.to_be_bytes());
    frame.extend_from_slice(b"\r\n");
    assert!(matches!(decode(&frame), Message::Malformed { .. }));
}

// =============================================================================
// External Framing
// =============================================================================

#[test]
fn test_external_request_parses() {
    let (message, framing) = client(decode(b"put user:1 hello there world\r\n"));
    assert_eq!(framing, Framing::External);
    assert_eq!(message.status, StatusType::Put);
    assert_eq!(message.key.as_deref(), Some("user:1"));
    assert_eq!(message.value.as_deref(), Some("hello there world"));
}

#[test]
fn test_external_value_whitespace_collapses() {
    let (message, _) = client(decode(b"PUT k a   b\tc\r\n"));
    assert_eq!(message.value.as_deref(), Some("a b c"));
}

#[test]
fn test_external_key_escapes_survive() {
    let request = ClientMessage::put("a key\twith\\specials", "v");
    let (decoded, _) = client(decode(&encode_client(&request, Framing::External).unwrap()));
    assert_eq!(decoded.key, request.key);
    assert_eq!(decoded.value, request.value);
}

#[test]
fn test_external_unknown_status_fails_closed() {
    assert!(matches!(
        decode(b"FETCH key\r\n"),
        Message::Malformed {
            framing: Framing::External,
            ..
        }
    ));
    assert!(matches!(decode(b"\r\n"), Message::Malformed { .. }));
}

#[test]
fn test_external_keyless_statuses_keep_value() {
    let response = ClientMessage::reply(StatusType::KeyrangeSuccess, None, Some("a,b,h:1;"));
    let (decoded, _) = client(decode(&encode_client(&response, Framing::External).unwrap()));
    assert_eq!(decoded, response);

    let (failed, _) = client(decode(b"FAILED unknown command\r\n"));
    assert_eq!(failed.key, None);
    assert_eq!(failed.value.as_deref(), Some("unknown command"));
}

#[test]
fn test_external_value_line_breaks_stay_in_one_frame() {
    let response = ClientMessage::reply(
        StatusType::GetSuccess,
        Some("k"),
        Some("line1\r\nPUT evil x"),
    );
    let mut buf = Vec::new();
    write_client(&mut buf, &response, Framing::External).unwrap();
    assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);

    let mut reader = Cursor::new(buf);
    let (decoded, framing) = client(read_message(&mut reader).unwrap());
    assert_eq!(framing, Framing::External);
    assert_eq!(decoded, response);
    assert!(read_message(&mut reader).unwrap_err().is_disconnect());
}

#[test]
fn test_external_value_backslashes_survive() {
    let response = ClientMessage::reply(StatusType::GetSuccess, Some("k"), Some("C:\\new dir\t"));
    let (decoded, _) = client(decode(&encode_client(&response, Framing::External).unwrap()));
    assert_eq!(decoded, response);
}

// =============================================================================
// Control Messages
// =============================================================================

#[test]
fn test_control_messages_decode() {
    let ring = HashRing::from_nodes([
        RingNode::new("127.0.0.1", 5000),
        RingNode::new("127.0.0.1", 5001),
    ])
    .unwrap();
    let range = ring.range_of("127.0.0.1:5001").unwrap();

    for message in [
        ControlMessage::Init {
            node: "127.0.0.1:5000".into(),
        },
        ControlMessage::Metadata {
            ring: ring.snapshot(),
            cache: Some(CacheConfig::new(CacheStrategy::Lfu, 32)),
        },
        ControlMessage::Metadata {
            ring: Vec::new(),
            cache: None,
        },
        ControlMessage::TransferTo {
            target: "127.0.0.1:5001".into(),
            range,
            pairs: pairs(&[("a", "1"), ("b", "two words")]),
            last: false,
        },
        ControlMessage::Receive {
            from: "127.0.0.1:5000".into(),
            pairs: KvPairs::new(),
            last: true,
        },
        ControlMessage::TransferComplete {
            ping: "127.0.0.1:5000".into(),
            from: "127.0.0.1:5001".into(),
        },
        ControlMessage::Shutdown {
            pairs: pairs(&[("k", "v")]),
            last: false,
        },
    ] {
        let frame = encode_control(&message).unwrap();
        assert!(frame.starts_with(MARKER));
        assert_eq!(control(decode(&frame)), message);
    }
}

#[test]
fn test_oversized_field_refused_when_encoding() {
    let value = vec![b'x'; MAX_FIELD_SIZE as usize + 1];
    assert!(encode_frame("RECEIVE", b"", &value).is_err());

    let mut huge = KvPairs::new();
    huge.insert("a".into(), "x".repeat(9 * 1024 * 1024));
    huge.insert("b".into(), "x".repeat(9 * 1024 * 1024));
    let whole = ControlMessage::Receive {
        from: "127.0.0.1:1".into(),
        pairs: huge,
        last: true,
    };
    assert!(encode_control(&whole).is_err());
}

#[test]
fn test_large_pair_sets_travel_in_several_frames() {
    let mut original = KvPairs::new();
    for key in ["a", "b", "c"] {
        original.insert(key.to_string(), key.repeat(9 * 1024 * 1024));
    }
    original.insert("small".to_string(), "v".to_string());

    let chunks = ControlMessage::receive_chunks("127.0.0.1:1", original.clone());
    assert!(chunks.len() >= 2);

    let mut buf = Vec::new();
    for chunk in &chunks {
        write_control(&mut buf, chunk).unwrap();
    }

    let mut reader = Cursor::new(buf);
    let mut rebuilt = KvPairs::new();
    for i in 0..chunks.len() {
        match control(read_message(&mut reader).unwrap()) {
            ControlMessage::Receive { pairs, last, .. } => {
                assert_eq!(last, i + 1 == chunks.len());
                rebuilt.extend(pairs);
            }
            other => panic!("Expected RECEIVE, got {:?}", other),
        }
    }
    assert_eq!(rebuilt, original);
}

#[test]
fn test_largest_storable_pair_fits_one_chunk() {
    let mut pairs = KvPairs::new();
    pairs.insert("k".to_string(), "x".repeat(MAX_PAIR_SIZE - 1));
    pairs.insert("other".to_string(), "v".to_string());

    let chunks = chunk_pairs(pairs);
    assert_eq!(chunks.len(), 2);
    for chunk in chunks {
        let message = ControlMessage::TransferTo {
            target: "127.0.0.1:2".into(),
            range: HashRing::from_nodes([RingNode::new("127.0.0.1", 2)])
                .unwrap()
                .range_of("127.0.0.1:2")
                .unwrap(),
            pairs: chunk,
            last: true,
        };
        assert!(encode_control(&message).is_ok());
    }
}

#[test]
fn test_empty_pair_set_is_one_final_chunk() {
    let chunks = ControlMessage::shutdown_chunks(KvPairs::new());
    assert_eq!(
        chunks,
        vec![ControlMessage::Shutdown {
            pairs: KvPairs::new(),
            last: true
        }]
    );
}

#[test]
fn test_control_garbage_payload_rejected() {
    let frame = encode_frame("METADATA", b"", b"\xff\xff\xff").unwrap();
    assert!(matches!(decode(&frame), Message::Malformed { .. }));
}

#[test]
fn test_init_requires_identity() {
    let frame = encode_frame("INIT", b"", b"").unwrap();
    assert!(matches!(decode(&frame), Message::Malformed { .. }));
}

// =============================================================================
// Stream Reading
// =============================================================================

#[test]
fn test_read_mixed_framings_from_one_stream() {
    let mut buf = Vec::new();
    write_client(&mut buf, &ClientMessage::get("first"), Framing::Internal).unwrap();
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(b"PUT second v\r\n");
    write_control(
        &mut buf,
        &ControlMessage::Init {
            node: "127.0.0.1:1".into(),
        },
    )
    .unwrap();
    write_client(&mut buf, &ClientMessage::delete("third"), Framing::External).unwrap();

    let mut reader = Cursor::new(buf);

    let (m, f) = client(read_message(&mut reader).unwrap());
    assert_eq!((m.key.as_deref(), f), (Some("first"), Framing::Internal));

    let (m, f) = client(read_message(&mut reader).unwrap());
    assert_eq!((m.key.as_deref(), f), (Some("second"), Framing::External));

    assert!(matches!(
        control(read_message(&mut reader).unwrap()),
        ControlMessage::Init { .. }
    ));

    let (m, f) = client(read_message(&mut reader).unwrap());
    assert_eq!((m.status, f), (StatusType::Delete, Framing::External));

    let err = read_message(&mut reader).unwrap_err();
    assert!(err.is_disconnect());
}

#[test]
fn test_read_binary_payload_containing_newlines() {
    let message = ControlMessage::Receive {
        from: "127.0.0.1:1".into(),
        pairs: pairs(&[("line\nbreak", "a\r\nb")]),
        last: true,
    };
    let mut buf = Vec::new();
    write_control(&mut buf, &message).unwrap();

    let mut reader = Cursor::new(buf);
    assert_eq!(control(read_message(&mut reader).unwrap()), message);
}

#[test]
fn test_read_truncated_stream_is_eof() {
    let frame = encode_client(&ClientMessage::put("k", "v"), Framing::Internal).unwrap();
    let mut reader = Cursor::new(frame[..frame.len() - 3].to_vec());
    assert!(read_message(&mut reader).unwrap_err().is_disconnect());

    let mut reader = Cursor::new(b"GET no-newline".to_vec());
    assert!(read_message(&mut reader).unwrap_err().is_disconnect());
}
