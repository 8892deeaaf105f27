use derive_more::Display;
use num_enum::{TryFromPrimitive, UnsafeFromPrimitive};

/// The value of the ProtocolId field of the CONNECT message.
pub const PROTOCOL_ID: u8 = 0x01;

/// Every frame starts with a one-byte total length and a one-byte type code.
pub const HEADER_SIZE: usize = 2;

/// Longest encodable frame; the length field is a single byte.
pub const MAX_MESSAGE_LENGTH: usize = 255;

/// MQTT-SN messages
#[derive(Debug, PartialEq, Clone)]
pub enum Message<'a> {
    /// Gateway presence announcement, broadcast periodically
    Advertise(Advertise),
    /// Client request for gateway discovery
    SearchGw(SearchGw),
    /// Gateway discovery answer
    GwInfo(GwInfo),
    /// Client request to connect to the gateway
    Connect(Connect<'a>),
    /// Connect acknowledgment
    ConnectAck(ConnectAck),
    /// Gateway prompt for the will topic during the connect handshake
    WillTopicReq,
    /// Will topic sent in answer to WILLTOPICREQ
    WillTopic(WillTopic<'a>),
    /// Gateway prompt for the will message during the connect handshake
    WillMsgReq,
    /// Will message sent in answer to WILLMSGREQ
    WillMsg(WillMsg<'a>),
    /// Topic name to topic id registration request
    Register(Register<'a>),
    /// Register acknowledgment carrying the assigned topic id
    RegisterAck(RegisterAck),
    /// Publish message
    Publish(Publish<'a>),
    /// Publish acknowledgment
    PublishAck(PublishAck),
    /// Client subscribe request
    Subscribe(Subscribe<'a>),
    /// Subscribe acknowledgment
    SubscribeAck(SubscribeAck),
    /// Unsubscribe request
    Unsubscribe(Unsubscribe<'a>),
    /// Unsubscribe acknowledgment
    UnsubscribeAck(UnsubscribeAck),
    /// Keep-alive request
    PingReq(PingReq<'a>),
    /// Keep-alive response
    PingResp,
    /// Disconnect notification
    Disconnect(Disconnect),
}

/// MQTT-SN message type code, byte 1 of every frame.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, TryFromPrimitive)]
#[allow(missing_docs)]
pub enum MessageType {
    ADVERTISE = 0x00,
    SEARCHGW = 0x01,
    GWINFO = 0x02,
    CONNECT = 0x04,
    CONNACK = 0x05,
    WILLTOPICREQ = 0x06,
    WILLTOPIC = 0x07,
    WILLMSGREQ = 0x08,
    WILLMSG = 0x09,
    REGISTER = 0x0A,
    REGACK = 0x0B,
    PUBLISH = 0x0C,
    PUBACK = 0x0D,
    SUBSCRIBE = 0x12,
    SUBACK = 0x13,
    UNSUBSCRIBE = 0x14,
    UNSUBACK = 0x15,
    PINGREQ = 0x16,
    PINGRESP = 0x17,
    DISCONNECT = 0x18,
}

/// Quality of Service levels
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive, UnsafeFromPrimitive,
)]
pub enum QoS {
    /// At most once delivery
    ///
    /// The message is delivered according to the capabilities of the
    /// underlying network; no acknowledgement is expected.
    AtMostOnce = 0,

    /// At least once delivery
    ///
    /// The message carries a message id and is acknowledged by the receiver.
    AtLeastOnce = 1,

    /// Exactly once delivery
    ExactlyOnce = 2,

    /// The "QoS -1" level of MQTT-SN: publish without a connected session.
    NoSession = 3,
}

/// How the topic id field of PUBLISH, SUBSCRIBE and UNSUBSCRIBE is to be read.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, TryFromPrimitive)]
pub enum TopicIdType {
    /// A registered topic id, or a full topic name in SUBSCRIBE/UNSUBSCRIBE.
    Normal = 0b00,
    /// A topic id agreed with the gateway ahead of time, without REGISTER.
    Predefined = 0b01,
    /// A two-character topic name carried in place of the topic id.
    Short = 0b10,
}

/// The result of a request, as reported by the gateway.
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, TryFromPrimitive, Display)]
pub enum ReturnCode {
    /// Accepted
    #[display(fmt = "Accepted")]
    Accepted = 0x00,
    /// Rejected: congestion; the request may be retried
    #[display(fmt = "Rejected: congestion")]
    RejectedCongestion = 0x01,
    /// Rejected: invalid topic ID
    #[display(fmt = "Rejected: invalid topic ID")]
    RejectedInvalidTopicId = 0x02,
    /// Rejected: not supported
    #[display(fmt = "Rejected: not supported")]
    RejectedNotSupported = 0x03,
}

bitflags! {
    /// The shared flag byte. Each message type permits a subset of the bits;
    /// bits outside the per-type mask are zeroed on encode.
    #[derive(Default)]
    pub struct Flags: u8 {
        /// This might be re-delivery of an earlier attempt to send the message.
        const DUP = 0b1000_0000;
        /// The level of assurance for delivery.
        const QOS = 0b0110_0000;
        /// The gateway should retain the published message.
        const RETAIN = 0b0001_0000;
        /// The client asks for the will topic/message prompt during CONNECT.
        const WILL = 0b0000_1000;
        /// The gateway should delete any stored session state.
        const CLEAN_SESSION = 0b0000_0100;
        /// How the topic id field is to be interpreted.
        const TOPIC_ID_TYPE = 0b0000_0011;
    }
}

const QOS_SHIFT: usize = 5;

impl Flags {
    /// Flag bits CONNECT may carry.
    pub const CONNECT_MASK: u8 = 0x0C;
    /// Flag bits WILLTOPIC may carry.
    pub const WILL_TOPIC_MASK: u8 = 0x70;
    /// Flag bits SUBSCRIBE and UNSUBSCRIBE may carry.
    pub const SUBSCRIBE_MASK: u8 = 0xE3;
    /// Flag bits PUBLISH may carry.
    pub const PUBLISH_MASK: u8 = 0xF3;
    /// Flag bits SUBACK may carry.
    pub const SUB_ACK_MASK: u8 = 0x60;

    /// The QoS level carried in bits 6-5.
    pub fn qos(self) -> QoS {
        unsafe { QoS::from_unchecked((self & Self::QOS).bits() >> QOS_SHIFT) }
    }

    /// The topic id interpretation carried in bits 1-0, when valid.
    pub fn topic_id_type(self) -> Option<TopicIdType> {
        use core::convert::TryFrom;

        TopicIdType::try_from((self & Self::TOPIC_ID_TYPE).bits()).ok()
    }
}

impl From<QoS> for Flags {
    fn from(qos: QoS) -> Self {
        Self::from_bits_truncate((qos as u8) << QOS_SHIFT)
    }
}

impl From<TopicIdType> for Flags {
    fn from(kind: TopicIdType) -> Self {
        Self::from_bits_truncate(kind as u8)
    }
}

/// Message Identifier
///
/// Requests that expect an acknowledgement carry a 2 byte message id the
/// acknowledgement echoes back.
pub type MsgId = u16;

/// Gateway presence announcement, broadcast every `duration` seconds.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Advertise {
    /// the id of the announcing gateway.
    pub gw_id: u8,
    /// seconds until the next ADVERTISE.
    pub duration: u16,
}

/// Client broadcast asking gateways in range to announce themselves.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct SearchGw {
    /// broadcast radius in hops.
    pub radius: u8,
}

/// Answer to SEARCHGW. The client-sent relay form omits the gateway address;
/// a trailing address sent by another client is ignored on decode.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct GwInfo {
    /// the id of the answering gateway.
    pub gw_id: u8,
}

/// Client request to connect to the gateway.
#[derive(Debug, PartialEq, Clone)]
pub struct Connect<'a> {
    /// the client wants the will topic/message prompts.
    pub will: bool,
    /// the gateway should discard any stored session state.
    pub clean_session: bool,
    /// keep-alive duration in seconds.
    pub duration: u16,
    /// identifies the client to the gateway.
    pub client_id: &'a str,
}

/// Connect acknowledgment.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct ConnectAck {
    /// whether the connection was accepted.
    pub return_code: ReturnCode,
}

/// Will topic, sent in answer to WILLTOPICREQ.
#[derive(Debug, PartialEq, Clone)]
pub struct WillTopic<'a> {
    /// the QoS level the gateway should publish the will with.
    pub qos: QoS,
    /// the will message is to be retained when published.
    pub retain: bool,
    /// the topic the will message is published to.
    pub topic: &'a str,
}

/// Will message, sent in answer to WILLMSGREQ.
#[derive(Debug, PartialEq, Clone)]
pub struct WillMsg<'a> {
    /// the payload the gateway publishes on the client's behalf.
    pub message: &'a [u8],
}

/// Topic name registration; the gateway answers with REGACK and an id.
#[derive(Debug, PartialEq, Clone)]
pub struct Register<'a> {
    /// zero in the client-sent form; the assigned id when gateway-sent.
    pub topic_id: u16,
    /// echoed by the matching REGACK.
    pub msg_id: MsgId,
    /// the topic name being registered.
    pub topic_name: &'a str,
}

/// Register acknowledgment.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct RegisterAck {
    /// the topic id assigned by the gateway.
    pub topic_id: u16,
    /// the message id of the REGISTER being acknowledged.
    pub msg_id: MsgId,
    /// whether the registration was accepted.
    pub return_code: ReturnCode,
}

/// Publish message.
#[derive(Debug, PartialEq, Clone)]
pub struct Publish<'a> {
    /// this might be re-delivery of an earlier attempt.
    pub dup: bool,
    /// the level of assurance for delivery.
    pub qos: QoS,
    /// the gateway should retain the message for future subscribers.
    pub retain: bool,
    /// how the topic id field is to be interpreted.
    pub kind: TopicIdType,
    /// registered or predefined topic id; a short name's two characters
    /// big-endian when `kind` is [`TopicIdType::Short`].
    pub topic_id: u16,
    /// zero at QoS 0; echoed by the matching PUBACK otherwise.
    pub msg_id: MsgId,
    /// the application payload.
    pub payload: &'a [u8],
}

/// Publish acknowledgment.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct PublishAck {
    /// the topic id of the PUBLISH being acknowledged.
    pub topic_id: u16,
    /// the message id of the PUBLISH being acknowledged.
    pub msg_id: MsgId,
    /// whether the publish was accepted.
    pub return_code: ReturnCode,
}

/// The topic a SUBSCRIBE or UNSUBSCRIBE addresses, selected by the
/// topic-id-type flag bits.
#[derive(Debug, PartialEq, Clone)]
pub enum SubscribeTopic<'a> {
    /// A full topic name, possibly ending in a `+` or `#` wildcard.
    Name(&'a str),
    /// A predefined topic id.
    Predefined(u16),
    /// A two-character short topic name.
    Short([u8; 2]),
}

impl SubscribeTopic<'_> {
    /// The flag bits announcing this topic form.
    pub fn id_type(&self) -> TopicIdType {
        match *self {
            SubscribeTopic::Name(_) => TopicIdType::Normal,
            SubscribeTopic::Predefined(_) => TopicIdType::Predefined,
            SubscribeTopic::Short(_) => TopicIdType::Short,
        }
    }
}

/// Client subscribe request.
#[derive(Debug, PartialEq, Clone)]
pub struct Subscribe<'a> {
    /// this might be re-delivery of an earlier attempt.
    pub dup: bool,
    /// the requested maximum QoS for the subscription.
    pub qos: QoS,
    /// echoed by the matching SUBACK.
    pub msg_id: MsgId,
    /// the topic being subscribed to.
    pub topic: SubscribeTopic<'a>,
}

/// Subscribe acknowledgment.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct SubscribeAck {
    /// the granted QoS level.
    pub qos: QoS,
    /// the topic id assigned when subscribing by name; zero for wildcards.
    pub topic_id: u16,
    /// the message id of the SUBSCRIBE being acknowledged.
    pub msg_id: MsgId,
    /// whether the subscription was accepted.
    pub return_code: ReturnCode,
}

/// Unsubscribe request.
#[derive(Debug, PartialEq, Clone)]
pub struct Unsubscribe<'a> {
    /// this might be re-delivery of an earlier attempt.
    pub dup: bool,
    /// echoed by the matching UNSUBACK.
    pub msg_id: MsgId,
    /// the topic being unsubscribed from.
    pub topic: SubscribeTopic<'a>,
}

/// Unsubscribe acknowledgment.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct UnsubscribeAck {
    /// the message id of the UNSUBSCRIBE being acknowledged.
    pub msg_id: MsgId,
}

/// Keep-alive request. The gateway-sent form carries no client id.
#[derive(Debug, PartialEq, Clone)]
pub struct PingReq<'a> {
    /// identifies the pinging client; may be empty.
    pub client_id: &'a str,
}

/// Disconnect notification. The client-sent form may carry a sleep duration;
/// the gateway-sent form is typically empty.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Disconnect {
    /// seconds the client intends to sleep, if any.
    pub duration: Option<u16>,
}
