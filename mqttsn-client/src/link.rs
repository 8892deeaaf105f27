use std::io;

/// One inbound datagram together with its link-layer source addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 64-bit address of the sending node.
    pub sender_addr64: u64,
    /// 16-bit network address of the sending node.
    pub sender_addr16: u16,
    /// The raw MQTT-SN frame.
    pub payload: Vec<u8>,
}

/// The datagram link the client drives: an 802.15.4/ZigBee API-frame radio
/// where the coordinator acts as the MQTT-SN gateway.
///
/// Send failures are transient on this kind of link; the retry engine treats
/// them the same way as a lost datagram.
pub trait LinkLayer {
    /// Sends `data` to one node.
    fn send_unicast(&mut self, addr64: u64, addr16: u16, data: &[u8]) -> io::Result<()>;

    /// Broadcasts `data` over at most `radius` hops.
    fn send_broadcast(&mut self, data: &[u8], radius: u8) -> io::Result<()>;

    /// Waits up to `timeout_ms` for one inbound frame.
    fn poll_incoming(&mut self, timeout_ms: u64) -> io::Result<Option<Frame>>;
}
