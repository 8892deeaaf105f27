use core::convert::TryFrom;
use core::str;

use derive_more::Display;
use nom::{
    bytes::complete::take,
    combinator::{all_consuming, map, map_opt, map_res, opt, rest, verify},
    error::{context, ParseError},
    multi::length_data,
    number::complete::{be_u16, be_u8},
    sequence::tuple,
    IResult,
};

use crate::packet::*;

/// Why an inbound frame failed to decode. The frame is dropped; decode
/// errors never abort the client consuming this codec.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Display)]
pub enum DecodeError {
    /// The buffer is shorter than its declared length.
    #[display(fmt = "truncated frame: declared {} bytes, received {}", _0, _1)]
    Truncated(u8, usize),
    /// The type code is not an MQTT-SN message type.
    #[display(fmt = "unknown message type 0x{:02x}", _0)]
    UnknownType(u8),
    /// The body does not match the layout of its message type.
    #[display(fmt = "malformed {:?} body", _0)]
    Malformed(MessageType),
}

impl std::error::Error for DecodeError {}

/// Parses one MQTT-SN frame.
///
/// Byte 0 is the total frame length and byte 1 the message type; the buffer
/// may be longer than the declared length (trailing link padding is ignored)
/// but never shorter.
pub fn parse(input: &[u8]) -> Result<Message, DecodeError> {
    let declared = input.first().copied().unwrap_or(0);
    if input.len() < HEADER_SIZE || (declared as usize) < HEADER_SIZE {
        return Err(DecodeError::Truncated(declared, input.len()));
    }
    if input.len() < declared as usize {
        return Err(DecodeError::Truncated(declared, input.len()));
    }

    let message_type =
        MessageType::try_from(input[1]).map_err(|_| DecodeError::UnknownType(input[1]))?;
    let body = &input[HEADER_SIZE..declared as usize];

    match message_type {
        MessageType::ADVERTISE => parse_body(advertise, body, message_type).map(Message::Advertise),
        MessageType::SEARCHGW => parse_body(search_gw, body, message_type).map(Message::SearchGw),
        MessageType::GWINFO => parse_body(gw_info, body, message_type).map(Message::GwInfo),
        MessageType::CONNECT => parse_body(connect, body, message_type).map(Message::Connect),
        MessageType::CONNACK => parse_body(connect_ack, body, message_type).map(Message::ConnectAck),
        MessageType::WILLTOPICREQ => Ok(Message::WillTopicReq),
        MessageType::WILLTOPIC => parse_body(will_topic, body, message_type).map(Message::WillTopic),
        MessageType::WILLMSGREQ => Ok(Message::WillMsgReq),
        MessageType::WILLMSG => parse_body(will_msg, body, message_type).map(Message::WillMsg),
        MessageType::REGISTER => parse_body(register, body, message_type).map(Message::Register),
        MessageType::REGACK => parse_body(register_ack, body, message_type).map(Message::RegisterAck),
        MessageType::PUBLISH => parse_body(publish, body, message_type).map(Message::Publish),
        MessageType::PUBACK => parse_body(publish_ack, body, message_type).map(Message::PublishAck),
        MessageType::SUBSCRIBE => parse_body(subscribe, body, message_type).map(Message::Subscribe),
        MessageType::SUBACK => parse_body(subscribe_ack, body, message_type).map(Message::SubscribeAck),
        MessageType::UNSUBSCRIBE => {
            parse_body(unsubscribe, body, message_type).map(Message::Unsubscribe)
        }
        MessageType::UNSUBACK => {
            parse_body(unsubscribe_ack, body, message_type).map(Message::UnsubscribeAck)
        }
        MessageType::PINGREQ => parse_body(ping_req, body, message_type).map(Message::PingReq),
        MessageType::PINGRESP => Ok(Message::PingResp),
        MessageType::DISCONNECT => parse_body(disconnect, body, message_type).map(Message::Disconnect),
    }
}

fn parse_body<'a, O>(
    parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], O, ()>,
    body: &'a [u8],
    message_type: MessageType,
) -> Result<O, DecodeError> {
    all_consuming(parser)(body)
        .map(|(_, message)| message)
        .map_err(|_| DecodeError::Malformed(message_type))
}

fn flags<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Flags, E> {
    context("flags", map(be_u8, Flags::from_bits_truncate))(input)
}

/// Text fields are encoded as a 2-byte big-endian length followed by the
/// UTF-8 bytes.
fn utf8_str<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("utf8 string", map_res(length_data(be_u16), str::from_utf8))(input)
}

/// Topic names in REGISTER, SUBSCRIBE and UNSUBSCRIBE run to the end of the
/// frame without a length prefix.
fn utf8_rest<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("utf8 rest", map_res(rest, str::from_utf8))(input)
}

fn binary_data<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E> {
    context("binary data", length_data(be_u16))(input)
}

fn msg_id<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], MsgId, E> {
    context("message id", be_u16)(input)
}

fn return_code<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], ReturnCode, E> {
    context("return code", map_res(be_u8, ReturnCode::try_from))(input)
}

fn advertise<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Advertise, E> {
    map(tuple((be_u8, be_u16)), |(gw_id, duration)| Advertise {
        gw_id,
        duration,
    })(input)
}

fn search_gw<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], SearchGw, E> {
    map(be_u8, |radius| SearchGw { radius })(input)
}

fn gw_info<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], GwInfo, E> {
    // another client answering SEARCHGW appends the gateway address
    map(tuple((be_u8, rest)), |(gw_id, _)| GwInfo { gw_id })(input)
}

fn connect<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Connect<'a>, E> {
    map(
        tuple((
            flags,
            context("protocol id", verify(be_u8, |&b| b == PROTOCOL_ID)),
            context("duration", be_u16),
            context("client id", utf8_str),
        )),
        |(flags, _, duration, client_id)| Connect {
            will: flags.contains(Flags::WILL),
            clean_session: flags.contains(Flags::CLEAN_SESSION),
            duration,
            client_id,
        },
    )(input)
}

fn connect_ack<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], ConnectAck, E> {
    map(return_code, |return_code| ConnectAck { return_code })(input)
}

fn will_topic<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], WillTopic<'a>, E> {
    map(
        tuple((flags, context("will topic", utf8_str))),
        |(flags, topic)| WillTopic {
            qos: flags.qos(),
            retain: flags.contains(Flags::RETAIN),
            topic,
        },
    )(input)
}

fn will_msg<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], WillMsg<'a>, E> {
    map(context("will message", binary_data), |message| WillMsg {
        message,
    })(input)
}

fn register<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Register<'a>, E> {
    map(
        tuple((be_u16, msg_id, context("topic name", utf8_rest))),
        |(topic_id, msg_id, topic_name)| Register {
            topic_id,
            msg_id,
            topic_name,
        },
    )(input)
}

fn register_ack<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], RegisterAck, E> {
    map(
        tuple((be_u16, msg_id, return_code)),
        |(topic_id, msg_id, return_code)| RegisterAck {
            topic_id,
            msg_id,
            return_code,
        },
    )(input)
}

fn flags_with_kind<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], (Flags, TopicIdType), E> {
    context(
        "flags",
        map_opt(be_u8, |b| {
            let flags = Flags::from_bits_truncate(b);
            flags.topic_id_type().map(|kind| (flags, kind))
        }),
    )(input)
}

fn publish<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Publish<'a>, E> {
    let (input, (flags, kind)) = flags_with_kind(input)?;
    let (input, (topic_id, msg_id, payload)) = tuple((be_u16, msg_id, rest))(input)?;

    Ok((
        input,
        Publish {
            dup: flags.contains(Flags::DUP),
            qos: flags.qos(),
            retain: flags.contains(Flags::RETAIN),
            kind,
            topic_id,
            msg_id,
            payload,
        },
    ))
}

fn publish_ack<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], PublishAck, E> {
    map(
        tuple((be_u16, msg_id, return_code)),
        |(topic_id, msg_id, return_code)| PublishAck {
            topic_id,
            msg_id,
            return_code,
        },
    )(input)
}

fn subscription_topic<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
    kind: TopicIdType,
) -> IResult<&'a [u8], SubscribeTopic<'a>, E> {
    match kind {
        TopicIdType::Normal => map(context("topic name", utf8_rest), SubscribeTopic::Name)(input),
        TopicIdType::Predefined => map(be_u16, SubscribeTopic::Predefined)(input),
        TopicIdType::Short => map(take(2usize), |s: &[u8]| SubscribeTopic::Short([s[0], s[1]]))(input),
    }
}

fn subscribe<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Subscribe<'a>, E> {
    let (input, (flags, kind)) = flags_with_kind(input)?;
    let (input, msg_id) = msg_id(input)?;
    let (input, topic) = subscription_topic(input, kind)?;

    Ok((
        input,
        Subscribe {
            dup: flags.contains(Flags::DUP),
            qos: flags.qos(),
            msg_id,
            topic,
        },
    ))
}

fn subscribe_ack<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], SubscribeAck, E> {
    map(
        tuple((flags, be_u16, msg_id, return_code)),
        |(flags, topic_id, msg_id, return_code)| SubscribeAck {
            qos: flags.qos(),
            topic_id,
            msg_id,
            return_code,
        },
    )(input)
}

fn unsubscribe<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], Unsubscribe<'a>, E> {
    let (input, (flags, kind)) = flags_with_kind(input)?;
    let (input, msg_id) = msg_id(input)?;
    let (input, topic) = subscription_topic(input, kind)?;

    Ok((
        input,
        Unsubscribe {
            dup: flags.contains(Flags::DUP),
            msg_id,
            topic,
        },
    ))
}

fn unsubscribe_ack<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], UnsubscribeAck, E> {
    map(msg_id, |msg_id| UnsubscribeAck { msg_id })(input)
}

fn ping_req<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], PingReq<'a>, E> {
    map(context("client id", utf8_rest), |client_id| PingReq {
        client_id,
    })(input)
}

fn disconnect<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Disconnect, E> {
    map(opt(be_u16), |duration| Disconnect { duration })(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated() {
        assert_eq!(parse(b""), Err(DecodeError::Truncated(0, 0)));
        assert_eq!(parse(b"\x05"), Err(DecodeError::Truncated(5, 1)));
        assert_eq!(parse(b"\x01\x0c"), Err(DecodeError::Truncated(1, 2)));
        assert_eq!(
            parse(b"\x0a\x0c\x00\x00\x2a"),
            Err(DecodeError::Truncated(10, 5)),
            "buffer shorter than the declared length"
        );
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(parse(b"\x02\x03"), Err(DecodeError::UnknownType(0x03)));
        assert_eq!(parse(b"\x02\x42"), Err(DecodeError::UnknownType(0x42)));
    }

    #[test]
    fn test_discovery() {
        assert_eq!(
            parse(b"\x05\x00\x07\x03\x84"),
            Ok(Message::Advertise(Advertise {
                gw_id: 7,
                duration: 900,
            }))
        );
        assert_eq!(
            parse(b"\x03\x01\x02"),
            Ok(Message::SearchGw(SearchGw { radius: 2 }))
        );
        assert_eq!(
            parse(b"\x03\x02\x07"),
            Ok(Message::GwInfo(GwInfo { gw_id: 7 }))
        );
        assert_eq!(
            parse(b"\x05\x02\x07\xab\xcd"),
            Ok(Message::GwInfo(GwInfo { gw_id: 7 })),
            "client-relayed GWINFO carries the gateway address"
        );
    }

    #[test]
    fn test_connect() {
        assert_eq!(
            parse(b"\x0a\x04\x00\x01\x00\x3c\x00\x02C1"),
            Ok(Message::Connect(Connect {
                will: false,
                clean_session: false,
                duration: 60,
                client_id: "C1",
            }))
        );
        assert_eq!(
            parse(b"\x0a\x04\x0c\x01\x00\x3c\x00\x02C1"),
            Ok(Message::Connect(Connect {
                will: true,
                clean_session: true,
                duration: 60,
                client_id: "C1",
            }))
        );
        assert_eq!(
            parse(b"\x0a\x04\x00\x02\x00\x3c\x00\x02C1"),
            Err(DecodeError::Malformed(MessageType::CONNECT)),
            "bad protocol id"
        );
        assert_eq!(
            parse(b"\x08\x04\x00\x01\x00\x3c\x00\x07"),
            Err(DecodeError::Malformed(MessageType::CONNECT)),
            "client id length exceeds the remaining bytes"
        );

        assert_eq!(
            parse(b"\x03\x05\x00"),
            Ok(Message::ConnectAck(ConnectAck {
                return_code: ReturnCode::Accepted,
            }))
        );
        assert_eq!(
            parse(b"\x03\x05\x04"),
            Err(DecodeError::Malformed(MessageType::CONNACK)),
            "reserved return code"
        );
    }

    #[test]
    fn test_will() {
        assert_eq!(parse(b"\x02\x06"), Ok(Message::WillTopicReq));
        assert_eq!(parse(b"\x02\x08"), Ok(Message::WillMsgReq));
        assert_eq!(
            parse(b"\x08\x07\x30\x00\x03t/w"),
            Ok(Message::WillTopic(WillTopic {
                qos: QoS::AtLeastOnce,
                retain: true,
                topic: "t/w",
            }))
        );
        assert_eq!(
            parse(b"\x08\x09\x00\x04gone"),
            Ok(Message::WillMsg(WillMsg { message: b"gone" }))
        );
    }

    #[test]
    fn test_register() {
        assert_eq!(
            parse(b"\x07\x0a\x00\x00\x00\x01t"),
            Ok(Message::Register(Register {
                topic_id: 0,
                msg_id: 1,
                topic_name: "t",
            }))
        );
        assert_eq!(
            parse(b"\x07\x0b\x00\x2a\x00\x01\x00"),
            Ok(Message::RegisterAck(RegisterAck {
                topic_id: 42,
                msg_id: 1,
                return_code: ReturnCode::Accepted,
            }))
        );
    }

    #[test]
    fn test_publish() {
        assert_eq!(
            parse(b"\x09\x0c\x00\x00\x2a\x00\x00hi"),
            Ok(Message::Publish(Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                retain: false,
                kind: TopicIdType::Normal,
                topic_id: 42,
                msg_id: 0,
                payload: b"hi",
            }))
        );
        assert_eq!(
            parse(b"\x09\x0c\x31\x00\x2a\x12\x34hi"),
            Ok(Message::Publish(Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: true,
                kind: TopicIdType::Predefined,
                topic_id: 42,
                msg_id: 0x1234,
                payload: b"hi",
            }))
        );
        assert_eq!(
            parse(b"\x09\x0c\x03\x00\x2a\x12\x34hi"),
            Err(DecodeError::Malformed(MessageType::PUBLISH)),
            "reserved topic id type"
        );
        assert_eq!(
            parse(b"\x07\x0d\x00\x2a\x12\x34\x01"),
            Ok(Message::PublishAck(PublishAck {
                topic_id: 42,
                msg_id: 0x1234,
                return_code: ReturnCode::RejectedCongestion,
            }))
        );
    }

    #[test]
    fn test_subscribe() {
        assert_eq!(
            parse(b"\x08\x12\x20\x00\x02a/+"),
            Ok(Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtLeastOnce,
                msg_id: 2,
                topic: SubscribeTopic::Name("a/+"),
            }))
        );
        assert_eq!(
            parse(b"\x07\x12\x01\x00\x02\x00\x2a"),
            Ok(Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtMostOnce,
                msg_id: 2,
                topic: SubscribeTopic::Predefined(42),
            }))
        );
        assert_eq!(
            parse(b"\x07\x12\x02\x00\x02ab"),
            Ok(Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtMostOnce,
                msg_id: 2,
                topic: SubscribeTopic::Short(*b"ab"),
            }))
        );
        assert_eq!(
            parse(b"\x08\x13\x20\x00\x05\x00\x02\x00"),
            Ok(Message::SubscribeAck(SubscribeAck {
                qos: QoS::AtLeastOnce,
                topic_id: 5,
                msg_id: 2,
                return_code: ReturnCode::Accepted,
            }))
        );
        assert_eq!(
            parse(b"\x07\x14\x00\x00\x03a/b"),
            Ok(Message::Unsubscribe(Unsubscribe {
                dup: false,
                msg_id: 3,
                topic: SubscribeTopic::Name("a/b"),
            }))
        );
        assert_eq!(
            parse(b"\x04\x15\x00\x03"),
            Ok(Message::UnsubscribeAck(UnsubscribeAck { msg_id: 3 }))
        );
    }

    #[test]
    fn test_ping_disconnect() {
        assert_eq!(
            parse(b"\x04\x16C1"),
            Ok(Message::PingReq(PingReq { client_id: "C1" }))
        );
        assert_eq!(
            parse(b"\x02\x16"),
            Ok(Message::PingReq(PingReq { client_id: "" })),
            "gateway-sent PINGREQ has no client id"
        );
        assert_eq!(parse(b"\x02\x17"), Ok(Message::PingResp));
        assert_eq!(
            parse(b"\x02\x18"),
            Ok(Message::Disconnect(Disconnect { duration: None }))
        );
        assert_eq!(
            parse(b"\x04\x18\x00\x0a"),
            Ok(Message::Disconnect(Disconnect {
                duration: Some(10),
            }))
        );
    }

    #[test]
    fn test_reencode_received() {
        use crate::encode::WriteTo;

        // a well-formed frame decodes and re-encodes to the same bytes
        for &frame in [
            &b"\x05\x00\x07\x03\x84"[..],
            &b"\x0a\x04\x0c\x01\x00\x3c\x00\x02C1"[..],
            &b"\x09\x0c\x31\x00\x2a\x12\x34hi"[..],
            &b"\x08\x12\x20\x00\x02a/+"[..],
            &b"\x08\x13\x20\x00\x05\x00\x02\x00"[..],
            &b"\x04\x18\x00\x0a"[..],
        ]
        .iter()
        {
            let message = parse(frame).expect("well-formed frame");
            let mut buf = Vec::new();
            message.write_to(&mut buf);
            assert_eq!(&buf[..], frame, "re-encode of {:?}", message);
        }
    }
}
