use derive_more::Display;

/// Everything that can go wrong while driving the client. Malformed inbound
/// frames are not an error at this level; the dispatcher logs and drops
/// them.
#[derive(Debug, PartialEq, Display)]
pub enum Error {
    /// The send queue is saturated.
    #[display(fmt = "send queue full")]
    QueueFull,
    /// Publish by name before the topic id was learned via REGISTER.
    #[display(fmt = "no topic id registered for this topic")]
    NoTopicId,
    /// The operation requires a connected gateway.
    #[display(fmt = "gateway not connected")]
    NotConnected,
    /// All retransmissions elapsed without the expected acknowledgement.
    #[display(fmt = "retries exhausted")]
    RetryOver,
    /// The gateway answered with a non-recoverable return code.
    #[display(fmt = "request rejected by the gateway")]
    Rejected,
    /// The keep-alive ping went unanswered; the gateway was demoted to lost.
    #[display(fmt = "ping response timed out")]
    PingRespTimeout,
    /// No room to priority-enqueue a will-handshake reply.
    #[display(fmt = "out of queue memory")]
    OutOfMemory,
    /// The client id is empty or longer than 23 bytes.
    #[display(fmt = "invalid client id")]
    InvalidClientId,
    /// The encoded frame exceeds the one-byte length field.
    #[display(fmt = "message too long to encode")]
    MessageTooLong,
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
