use bytes::{BufMut, BytesMut};
use citrine_client::CitrineError;
use citrine_client::core::protocol::message::command;
use citrine_client::core::protocol::{Credentials, Message, PackageCodec, PackageIn, PackageOut};
use bytes::Bytes;
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

fn roundtrip(package: PackageOut) -> PackageIn {
    let mut codec = PackageCodec;
    let mut buf = BytesMut::new();
    codec.encode(package, &mut buf).unwrap();
    codec.decode(&mut buf).unwrap().expect("a complete frame")
}

#[test]
fn encode_decode_without_credentials() {
    let correlation = Uuid::new_v4();
    let package = PackageOut {
        correlation,
        message: Message::Ping {
            payload: Bytes::from_static(b"probe"),
        },
        credentials: None,
    };
    let decoded = roundtrip(package);
    assert_eq!(decoded.correlation, correlation);
    assert_eq!(
        decoded.message,
        Ok(Message::Ping {
            payload: Bytes::from_static(b"probe")
        })
    );
}

#[test]
fn encode_decode_with_credentials() {
    let correlation = Uuid::new_v4();
    let package = PackageOut {
        correlation,
        message: Message::SubscribeToStream {
            stream: "orders".into(),
            resolve_links: true,
        },
        credentials: Some(Credentials::new("admin", "changeit")),
    };

    let mut codec = PackageCodec;
    let mut buf = BytesMut::new();
    codec.encode(package, &mut buf).unwrap();

    // Byte 4 is the command, byte 5 the flags: the authenticated bit must
    // be set when credentials ride along.
    assert_eq!(buf[4], command::SUBSCRIBE_TO_STREAM);
    assert_eq!(buf[5], 0x01);

    let decoded = codec.decode(&mut buf).unwrap().expect("a complete frame");
    assert_eq!(decoded.correlation, correlation);
    assert_eq!(
        decoded.message,
        Ok(Message::SubscribeToStream {
            stream: "orders".into(),
            resolve_links: true,
        })
    );
}

#[test]
fn incomplete_frames_wait_for_more_data() {
    let package = PackageOut {
        correlation: Uuid::new_v4(),
        message: Message::BadRequest {
            reason: "nope".into(),
        },
        credentials: None,
    };
    let mut codec = PackageCodec;
    let mut full = BytesMut::new();
    codec.encode(package, &mut full).unwrap();

    let mut partial = BytesMut::new();
    for chunk in full.chunks(3) {
        let complete_before = partial.len() + chunk.len() == full.len();
        partial.extend_from_slice(chunk);
        let decoded = codec.decode(&mut partial).unwrap();
        assert_eq!(decoded.is_some(), complete_before);
    }
}

#[test]
fn unknown_command_surfaces_as_a_failure_payload() {
    let correlation = Uuid::new_v4();
    let mut buf = BytesMut::new();
    buf.put_u32_le(18);
    buf.put_u8(0xEE);
    buf.put_u8(0);
    buf.extend_from_slice(correlation.as_bytes());

    let decoded = PackageCodec.decode(&mut buf).unwrap().expect("a frame");
    assert_eq!(decoded.correlation, correlation);
    assert!(matches!(decoded.message, Err(CitrineError::Decode(_))));
}

#[test]
fn truncated_payload_surfaces_as_a_failure_payload() {
    let correlation = Uuid::new_v4();
    let mut buf = BytesMut::new();
    // BadRequest whose declared string length runs past the frame end.
    buf.put_u32_le(18 + 2);
    buf.put_u8(command::BAD_REQUEST);
    buf.put_u8(0);
    buf.extend_from_slice(correlation.as_bytes());
    buf.put_u16_le(200);

    let decoded = PackageCodec.decode(&mut buf).unwrap().expect("a frame");
    assert_eq!(decoded.correlation, correlation);
    assert!(matches!(decoded.message, Err(CitrineError::Decode(_))));
}

#[test]
fn oversized_declared_length_is_fatal() {
    let mut buf = BytesMut::new();
    buf.put_u32_le(u32::MAX);
    buf.put_u8(command::PING);
    assert!(matches!(
        PackageCodec.decode(&mut buf),
        Err(CitrineError::Protocol(_))
    ));
}

#[test]
fn frame_shorter_than_the_header_is_fatal() {
    let mut buf = BytesMut::new();
    buf.put_u32_le(3);
    buf.extend_from_slice(&[0, 0, 0]);
    assert!(matches!(
        PackageCodec.decode(&mut buf),
        Err(CitrineError::Protocol(_))
    ));
}
