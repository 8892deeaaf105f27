use core::mem;

use bytes::BufMut;

use crate::packet::*;

const LENGTH_FIELD_SIZE: usize = mem::size_of::<u16>();

impl Message<'_> {
    /// The MQTT-SN message type code.
    pub fn message_type(&self) -> MessageType {
        match *self {
            Message::Advertise(_) => MessageType::ADVERTISE,
            Message::SearchGw(_) => MessageType::SEARCHGW,
            Message::GwInfo(_) => MessageType::GWINFO,
            Message::Connect(_) => MessageType::CONNECT,
            Message::ConnectAck(_) => MessageType::CONNACK,
            Message::WillTopicReq => MessageType::WILLTOPICREQ,
            Message::WillTopic(_) => MessageType::WILLTOPIC,
            Message::WillMsgReq => MessageType::WILLMSGREQ,
            Message::WillMsg(_) => MessageType::WILLMSG,
            Message::Register(_) => MessageType::REGISTER,
            Message::RegisterAck(_) => MessageType::REGACK,
            Message::Publish(_) => MessageType::PUBLISH,
            Message::PublishAck(_) => MessageType::PUBACK,
            Message::Subscribe(_) => MessageType::SUBSCRIBE,
            Message::SubscribeAck(_) => MessageType::SUBACK,
            Message::Unsubscribe(_) => MessageType::UNSUBSCRIBE,
            Message::UnsubscribeAck(_) => MessageType::UNSUBACK,
            Message::PingReq(_) => MessageType::PINGREQ,
            Message::PingResp => MessageType::PINGRESP,
            Message::Disconnect(_) => MessageType::DISCONNECT,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            Message::Advertise(advertise) => advertise.size(),
            Message::SearchGw(search_gw) => search_gw.size(),
            Message::GwInfo(gw_info) => gw_info.size(),
            Message::Connect(connect) => connect.size(),
            Message::ConnectAck(connect_ack) => connect_ack.size(),
            Message::WillTopic(will_topic) => will_topic.size(),
            Message::WillMsg(will_msg) => will_msg.size(),
            Message::Register(register) => register.size(),
            Message::RegisterAck(register_ack) => register_ack.size(),
            Message::Publish(publish) => publish.size(),
            Message::PublishAck(publish_ack) => publish_ack.size(),
            Message::Subscribe(subscribe) => subscribe.size(),
            Message::SubscribeAck(subscribe_ack) => subscribe_ack.size(),
            Message::Unsubscribe(unsubscribe) => unsubscribe.size(),
            Message::UnsubscribeAck(unsubscribe_ack) => unsubscribe_ack.size(),
            Message::PingReq(ping_req) => ping_req.size(),
            Message::Disconnect(disconnect) => disconnect.size(),
            Message::WillTopicReq | Message::WillMsgReq | Message::PingResp => 0,
        }
    }

    /// Encodes this message into a fresh buffer of exactly `size()` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        self.write_to(&mut buf);
        buf
    }
}

trait BufMutExt: BufMut {
    fn put_utf8_str(&mut self, s: &str) {
        self.put_binary(s.as_bytes())
    }

    fn put_binary(&mut self, s: &[u8]) {
        self.put_u16(s.len() as u16);
        self.put_slice(s)
    }
}

impl<T: BufMut> BufMutExt for T {}

/// A trait for objects which can be written to byte-oriented sinks.
pub trait WriteTo {
    /// Gets the encoded size of this object.
    fn size(&self) -> usize;

    /// Writes this object to the given byte-oriented sink.
    fn write_to<T: BufMut>(&self, buf: &mut T);
}

impl WriteTo for Message<'_> {
    fn size(&self) -> usize {
        HEADER_SIZE + self.body_size()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.size() as u8);
        buf.put_u8(self.message_type() as u8);

        match self {
            Message::Advertise(advertise) => advertise.write_to(buf),
            Message::SearchGw(search_gw) => search_gw.write_to(buf),
            Message::GwInfo(gw_info) => gw_info.write_to(buf),
            Message::Connect(connect) => connect.write_to(buf),
            Message::ConnectAck(connect_ack) => connect_ack.write_to(buf),
            Message::WillTopic(will_topic) => will_topic.write_to(buf),
            Message::WillMsg(will_msg) => will_msg.write_to(buf),
            Message::Register(register) => register.write_to(buf),
            Message::RegisterAck(register_ack) => register_ack.write_to(buf),
            Message::Publish(publish) => publish.write_to(buf),
            Message::PublishAck(publish_ack) => publish_ack.write_to(buf),
            Message::Subscribe(subscribe) => subscribe.write_to(buf),
            Message::SubscribeAck(subscribe_ack) => subscribe_ack.write_to(buf),
            Message::Unsubscribe(unsubscribe) => unsubscribe.write_to(buf),
            Message::UnsubscribeAck(unsubscribe_ack) => unsubscribe_ack.write_to(buf),
            Message::PingReq(ping_req) => ping_req.write_to(buf),
            Message::Disconnect(disconnect) => disconnect.write_to(buf),
            Message::WillTopicReq | Message::WillMsgReq | Message::PingResp => {}
        }
    }
}

impl WriteTo for Advertise {
    fn size(&self) -> usize {
        mem::size_of::<u8>() + mem::size_of::<u16>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.gw_id);
        buf.put_u16(self.duration);
    }
}

impl WriteTo for SearchGw {
    fn size(&self) -> usize {
        mem::size_of::<u8>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.radius);
    }
}

impl WriteTo for GwInfo {
    fn size(&self) -> usize {
        mem::size_of::<u8>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.gw_id);
    }
}

impl Connect<'_> {
    fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        if self.will {
            flags |= Flags::WILL;
        }
        if self.clean_session {
            flags |= Flags::CLEAN_SESSION;
        }
        flags
    }
}

impl WriteTo for Connect<'_> {
    fn size(&self) -> usize {
        mem::size_of::<Flags>()
            + mem::size_of::<u8>()                          // protocol id
            + mem::size_of::<u16>()                         // duration
            + LENGTH_FIELD_SIZE + self.client_id.len()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.flags().bits() & Flags::CONNECT_MASK);
        buf.put_u8(PROTOCOL_ID);
        buf.put_u16(self.duration);
        buf.put_utf8_str(self.client_id);
    }
}

impl WriteTo for ConnectAck {
    fn size(&self) -> usize {
        mem::size_of::<ReturnCode>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.return_code as u8);
    }
}

impl WillTopic<'_> {
    fn flags(&self) -> Flags {
        let mut flags = Flags::from(self.qos);
        if self.retain {
            flags |= Flags::RETAIN;
        }
        flags
    }
}

impl WriteTo for WillTopic<'_> {
    fn size(&self) -> usize {
        mem::size_of::<Flags>() + LENGTH_FIELD_SIZE + self.topic.len()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.flags().bits() & Flags::WILL_TOPIC_MASK);
        buf.put_utf8_str(self.topic);
    }
}

impl WriteTo for WillMsg<'_> {
    fn size(&self) -> usize {
        LENGTH_FIELD_SIZE + self.message.len()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_binary(self.message);
    }
}

impl WriteTo for Register<'_> {
    fn size(&self) -> usize {
        mem::size_of::<u16>() + mem::size_of::<MsgId>() + self.topic_name.len()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16(self.topic_id);
        buf.put_u16(self.msg_id);
        buf.put_slice(self.topic_name.as_bytes());
    }
}

impl WriteTo for RegisterAck {
    fn size(&self) -> usize {
        mem::size_of::<u16>() + mem::size_of::<MsgId>() + mem::size_of::<ReturnCode>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16(self.topic_id);
        buf.put_u16(self.msg_id);
        buf.put_u8(self.return_code as u8);
    }
}

impl Publish<'_> {
    fn flags(&self) -> Flags {
        let mut flags = Flags::from(self.qos) | Flags::from(self.kind);
        if self.dup {
            flags |= Flags::DUP;
        }
        if self.retain {
            flags |= Flags::RETAIN;
        }
        flags
    }
}

impl WriteTo for Publish<'_> {
    fn size(&self) -> usize {
        mem::size_of::<Flags>()
            + mem::size_of::<u16>()
            + mem::size_of::<MsgId>()
            + self.payload.len()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.flags().bits() & Flags::PUBLISH_MASK);
        buf.put_u16(self.topic_id);
        buf.put_u16(self.msg_id);
        buf.put_slice(self.payload);
    }
}

impl WriteTo for PublishAck {
    fn size(&self) -> usize {
        mem::size_of::<u16>() + mem::size_of::<MsgId>() + mem::size_of::<ReturnCode>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16(self.topic_id);
        buf.put_u16(self.msg_id);
        buf.put_u8(self.return_code as u8);
    }
}

impl WriteTo for SubscribeTopic<'_> {
    fn size(&self) -> usize {
        match self {
            SubscribeTopic::Name(name) => name.len(),
            SubscribeTopic::Predefined(_) | SubscribeTopic::Short(_) => mem::size_of::<u16>(),
        }
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        match *self {
            SubscribeTopic::Name(name) => buf.put_slice(name.as_bytes()),
            SubscribeTopic::Predefined(topic_id) => buf.put_u16(topic_id),
            SubscribeTopic::Short(name) => buf.put_slice(&name),
        }
    }
}

impl Subscribe<'_> {
    fn flags(&self) -> Flags {
        let mut flags = Flags::from(self.qos) | Flags::from(self.topic.id_type());
        if self.dup {
            flags |= Flags::DUP;
        }
        flags
    }
}

impl WriteTo for Subscribe<'_> {
    fn size(&self) -> usize {
        mem::size_of::<Flags>() + mem::size_of::<MsgId>() + self.topic.size()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.flags().bits() & Flags::SUBSCRIBE_MASK);
        buf.put_u16(self.msg_id);
        self.topic.write_to(buf);
    }
}

impl WriteTo for SubscribeAck {
    fn size(&self) -> usize {
        mem::size_of::<Flags>()
            + mem::size_of::<u16>()
            + mem::size_of::<MsgId>()
            + mem::size_of::<ReturnCode>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(Flags::from(self.qos).bits() & Flags::SUB_ACK_MASK);
        buf.put_u16(self.topic_id);
        buf.put_u16(self.msg_id);
        buf.put_u8(self.return_code as u8);
    }
}

impl Unsubscribe<'_> {
    fn flags(&self) -> Flags {
        let mut flags = Flags::from(self.topic.id_type());
        if self.dup {
            flags |= Flags::DUP;
        }
        flags
    }
}

impl WriteTo for Unsubscribe<'_> {
    fn size(&self) -> usize {
        mem::size_of::<Flags>() + mem::size_of::<MsgId>() + self.topic.size()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.flags().bits() & Flags::SUBSCRIBE_MASK);
        buf.put_u16(self.msg_id);
        self.topic.write_to(buf);
    }
}

impl WriteTo for UnsubscribeAck {
    fn size(&self) -> usize {
        mem::size_of::<MsgId>()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16(self.msg_id);
    }
}

impl WriteTo for PingReq<'_> {
    fn size(&self) -> usize {
        self.client_id.len()
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        buf.put_slice(self.client_id.as_bytes());
    }
}

impl WriteTo for Disconnect {
    fn size(&self) -> usize {
        self.duration.map_or(0, |_| mem::size_of::<u16>())
    }

    fn write_to<T: BufMut>(&self, buf: &mut T) {
        if let Some(duration) = self.duration {
            buf.put_u16(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::parse;

    macro_rules! assert_message {
        ($message:expr, $right:expr) => {
            assert_eq!($message.size(), $right.len(), "assert message size");

            let mut v = Vec::new();
            $message.write_to(&mut v);
            assert_eq!(v, &$right[..], "assert message content: {:#?}", $message);
        };
    }

    #[test]
    fn test_discovery() {
        assert_message!(
            Message::Advertise(Advertise {
                gw_id: 7,
                duration: 900,
            }),
            b"\x05\x00\x07\x03\x84"
        );
        assert_message!(Message::SearchGw(SearchGw { radius: 2 }), b"\x03\x01\x02");
        assert_message!(Message::GwInfo(GwInfo { gw_id: 7 }), b"\x03\x02\x07");
    }

    #[test]
    fn test_connect() {
        assert_message!(
            Message::Connect(Connect {
                will: false,
                clean_session: false,
                duration: 60,
                client_id: "C1",
            }),
            b"\x0a\x04\x00\x01\x00\x3c\x00\x02C1"
        );
        assert_message!(
            Message::Connect(Connect {
                will: true,
                clean_session: true,
                duration: 300,
                client_id: "node-1",
            }),
            b"\x0e\x04\x0c\x01\x01\x2c\x00\x06node-1"
        );
        assert_message!(
            Message::ConnectAck(ConnectAck {
                return_code: ReturnCode::RejectedNotSupported,
            }),
            b"\x03\x05\x03"
        );
    }

    #[test]
    fn test_will() {
        assert_message!(Message::WillTopicReq, b"\x02\x06");
        assert_message!(Message::WillMsgReq, b"\x02\x08");
        assert_message!(
            Message::WillTopic(WillTopic {
                qos: QoS::AtLeastOnce,
                retain: true,
                topic: "t/w",
            }),
            b"\x08\x07\x30\x00\x03t/w"
        );
        assert_message!(
            Message::WillMsg(WillMsg { message: b"gone" }),
            b"\x08\x09\x00\x04gone"
        );
    }

    #[test]
    fn test_register() {
        assert_message!(
            Message::Register(Register {
                topic_id: 0,
                msg_id: 1,
                topic_name: "t",
            }),
            b"\x07\x0a\x00\x00\x00\x01t"
        );
        assert_message!(
            Message::RegisterAck(RegisterAck {
                topic_id: 42,
                msg_id: 1,
                return_code: ReturnCode::Accepted,
            }),
            b"\x07\x0b\x00\x2a\x00\x01\x00"
        );
    }

    #[test]
    fn test_publish() {
        assert_message!(
            Message::Publish(Publish {
                dup: false,
                qos: QoS::AtMostOnce,
                retain: false,
                kind: TopicIdType::Normal,
                topic_id: 42,
                msg_id: 0,
                payload: b"hi",
            }),
            b"\x09\x0c\x00\x00\x2a\x00\x00hi"
        );
        assert_message!(
            Message::Publish(Publish {
                dup: true,
                qos: QoS::AtLeastOnce,
                retain: true,
                kind: TopicIdType::Short,
                topic_id: u16::from_be_bytes(*b"ab"),
                msg_id: 0x1234,
                payload: b"data",
            }),
            b"\x0b\x0c\xb2\x61\x62\x12\x34data"
        );
        assert_message!(
            Message::PublishAck(PublishAck {
                topic_id: 42,
                msg_id: 0x1234,
                return_code: ReturnCode::RejectedInvalidTopicId,
            }),
            b"\x07\x0d\x00\x2a\x12\x34\x02"
        );
    }

    #[test]
    fn test_subscribe() {
        assert_message!(
            Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtLeastOnce,
                msg_id: 2,
                topic: SubscribeTopic::Name("a/+"),
            }),
            b"\x08\x12\x20\x00\x02a/+"
        );
        assert_message!(
            Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtMostOnce,
                msg_id: 2,
                topic: SubscribeTopic::Predefined(42),
            }),
            b"\x07\x12\x01\x00\x02\x00\x2a"
        );
        assert_message!(
            Message::SubscribeAck(SubscribeAck {
                qos: QoS::AtLeastOnce,
                topic_id: 5,
                msg_id: 2,
                return_code: ReturnCode::Accepted,
            }),
            b"\x08\x13\x20\x00\x05\x00\x02\x00"
        );
        assert_message!(
            Message::Unsubscribe(Unsubscribe {
                dup: false,
                msg_id: 3,
                topic: SubscribeTopic::Name("a/b"),
            }),
            b"\x07\x14\x00\x00\x03a/b"
        );
        assert_message!(
            Message::UnsubscribeAck(UnsubscribeAck { msg_id: 3 }),
            b"\x04\x15\x00\x03"
        );
    }

    #[test]
    fn test_ping_disconnect() {
        assert_message!(Message::PingReq(PingReq { client_id: "C1" }), b"\x04\x16C1");
        assert_message!(Message::PingResp, b"\x02\x17");
        assert_message!(
            Message::Disconnect(Disconnect { duration: None }),
            b"\x02\x18"
        );
        assert_message!(
            Message::Disconnect(Disconnect { duration: Some(10) }),
            b"\x04\x18\x00\x0a"
        );
    }

    #[test]
    fn test_mask_zeroes_foreign_bits() {
        // QoS bits are outside the CONNECT mask and must not leak out
        let connect = Connect {
            will: true,
            clean_session: false,
            duration: 60,
            client_id: "C1",
        };
        let mut buf = Vec::new();
        Message::Connect(connect).write_to(&mut buf);
        assert_eq!(buf[2] & !Flags::CONNECT_MASK, 0);

        let suback = SubscribeAck {
            qos: QoS::AtLeastOnce,
            topic_id: 5,
            msg_id: 2,
            return_code: ReturnCode::Accepted,
        };
        let mut buf = Vec::new();
        Message::SubscribeAck(suback).write_to(&mut buf);
        assert_eq!(buf[2] & !Flags::SUB_ACK_MASK, 0);
    }

    #[test]
    fn test_roundtrip() {
        let messages = vec![
            Message::Advertise(Advertise {
                gw_id: 1,
                duration: 30,
            }),
            Message::Connect(Connect {
                will: true,
                clean_session: true,
                duration: 60,
                client_id: "C1",
            }),
            Message::WillTopic(WillTopic {
                qos: QoS::AtLeastOnce,
                retain: false,
                topic: "will",
            }),
            Message::WillMsg(WillMsg { message: b"bye" }),
            Message::Register(Register {
                topic_id: 0,
                msg_id: 9,
                topic_name: "sensor/temp",
            }),
            Message::Publish(Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: false,
                kind: TopicIdType::Normal,
                topic_id: 42,
                msg_id: 10,
                payload: b"22.5",
            }),
            Message::Subscribe(Subscribe {
                dup: false,
                qos: QoS::AtMostOnce,
                msg_id: 11,
                topic: SubscribeTopic::Short(*b"ab"),
            }),
            Message::PingReq(PingReq { client_id: "C1" }),
            Message::Disconnect(Disconnect { duration: None }),
        ];

        for message in messages {
            assert_eq!(parse(&message.encode()), Ok(message.clone()), "{:?}", message);
        }
    }
}
