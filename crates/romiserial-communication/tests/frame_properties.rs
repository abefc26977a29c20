use proptest::prelude::*;
use romiserial_communication::protocol::frame::{decode, encode, parse_request, DecodeError};
use romiserial_communication::{ChecksumMode, Command, FrameCodec};

fn opcode() -> impl Strategy<Value = char> {
    prop_oneof![
        proptest::char::range('a', 'z'),
        proptest::char::range('A', 'Z'),
        proptest::char::range('0', '9'),
        Just('?'),
    ]
}

fn command() -> impl Strategy<Value = Command> {
    (opcode(), prop::collection::vec(-99_999i64..99_999, 0..8))
        .prop_map(|(op, args)| Command::new(op, args).unwrap())
}

proptest! {
    #[test]
    fn prop_request_round_trip(command in command()) {
        let frame = encode(&command);
        prop_assert!(frame.starts_with('#'));
        prop_assert!(frame.ends_with(":xxxx\r"));
        prop_assert_eq!(parse_request(&frame).unwrap(), command);
    }

    #[test]
    fn prop_crc_request_round_trip(commands in prop::collection::vec(command(), 1..10)) {
        let mut codec = FrameCodec::new(ChecksumMode::Crc8);
        for (i, command) in commands.iter().enumerate() {
            let frame = codec.encode(command);
            prop_assert_eq!(codec.last_id() as usize, i);
            prop_assert_eq!(&parse_request(&frame).unwrap(), command);
        }
    }

    #[test]
    fn prop_reply_values_survive_decoding(
        status in -50i32..50,
        values in prop::collection::vec(-1_000_000i64..1_000_000, 0..6),
    ) {
        let mut line = format!("#[{}", status);
        for value in &values {
            line.push_str(&format!(",{}", value));
        }
        line.push(']');

        let reply = decode(&line).unwrap();
        prop_assert_eq!(reply.status(), status);
        prop_assert_eq!(reply.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(reply.integer(i).unwrap(), *value);
        }
    }

    #[test]
    fn prop_garbage_never_panics(line in ".{0,80}") {
        let _ = decode(&line);
        let _ = parse_request(&line);
    }

    #[test]
    fn prop_unterminated_list_is_truncated(prefix in "#[a-zA-Z]?\\[[0-9,-]{0,20}") {
        prop_assert_eq!(decode(&prefix), Err(DecodeError::Truncated));
    }
}

#[test]
fn test_oversized_command_is_rejected() {
    let args = vec![123_456_789i64; 10];
    assert!(Command::new('C', args).is_err());
}

#[test]
fn test_invalid_opcode_is_rejected() {
    assert!(Command::query('#').is_err());
    assert!(Command::query(' ').is_err());
    assert!(Command::query('é').is_err());
}
