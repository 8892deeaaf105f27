use core::convert::TryFrom;

use crate::error::{Error, Result};
use crate::packet::{self, Message, MessageType, MAX_MESSAGE_LENGTH};

/// Queue-entry lifecycle. Only the head entry advances past `Request`; the
/// retry engine and the inbound dispatcher drive the transitions.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SendStatus {
    /// Waiting to be transmitted.
    Request,
    /// Transmitted; waiting for the matching acknowledgement.
    WaitAck,
    /// Acknowledged, or no acknowledgement required.
    Complete,
    /// The gateway reported congestion; retransmit without a fresh attempt.
    ResendReq,
    /// The gateway refused the request.
    Rejected,
}

/// How many pending outgoing messages fit by default.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

struct Entry {
    frame: Vec<u8>,
    status: SendStatus,
}

/// Bounded FIFO of encoded outgoing frames. The head (index 0) is the
/// currently-active request; each entry owns its wire buffer until popped.
pub struct SendQueue {
    entries: Vec<Entry>,
    capacity: usize,
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SendQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SendQueue {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends at the tail. A frame longer than the one-byte length field
    /// can represent is refused before it reaches the wire.
    pub fn push(&mut self, frame: Vec<u8>) -> Result<()> {
        if frame.len() > MAX_MESSAGE_LENGTH {
            return Err(Error::MessageTooLong);
        }
        if self.entries.len() >= self.capacity {
            return Err(Error::QueueFull);
        }
        trace!("queue request type 0x{:02x}", frame.get(1).copied().unwrap_or(0));
        self.entries.push(Entry {
            frame,
            status: SendStatus::Request,
        });
        Ok(())
    }

    /// Inserts at the head, shifting existing entries right. Used to raise
    /// SEARCHGW over pending traffic and to slot the will handshake
    /// between CONNECT and its acknowledgement.
    pub fn push_front(&mut self, frame: Vec<u8>) -> Result<()> {
        if frame.len() > MAX_MESSAGE_LENGTH {
            return Err(Error::MessageTooLong);
        }
        if self.entries.len() >= self.capacity {
            return Err(Error::QueueFull);
        }
        trace!(
            "queue priority request type 0x{:02x}",
            frame.get(1).copied().unwrap_or(0)
        );
        self.entries.insert(
            0,
            Entry {
                frame,
                status: SendStatus::Request,
            },
        );
        Ok(())
    }

    /// Removes and returns the head frame.
    pub fn pop_front(&mut self) -> Option<Vec<u8>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0).frame)
        }
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(|entry| entry.frame.as_slice())
    }

    pub fn status(&self, index: usize) -> Option<SendStatus> {
        self.entries.get(index).map(|entry| entry.status)
    }

    pub fn set_status(&mut self, index: usize, status: SendStatus) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.status = status;
        }
    }

    pub fn head_status(&self) -> Option<SendStatus> {
        self.status(0)
    }

    /// The type code of the head frame.
    pub fn head_type(&self) -> Option<MessageType> {
        self.frame(0)
            .and_then(|frame| frame.get(1).copied())
            .and_then(|code| MessageType::try_from(code).ok())
    }

    /// Decoded view over the head frame. Entries are encoded by this client,
    /// so decoding only fails if the buffer was corrupted.
    pub fn head_message(&self) -> Option<Message> {
        self.frame(0).and_then(|frame| packet::parse(frame).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Message, SearchGw};

    fn frame_of(message_type: MessageType) -> Vec<u8> {
        vec![2, message_type as u8]
    }

    #[test]
    fn test_capacity() {
        let mut queue = SendQueue::new();
        for _ in 0..DEFAULT_QUEUE_CAPACITY {
            queue.push(frame_of(MessageType::PINGREQ)).unwrap();
        }
        assert_eq!(queue.push(frame_of(MessageType::PINGREQ)), Err(Error::QueueFull));
        assert_eq!(
            queue.push_front(frame_of(MessageType::SEARCHGW)),
            Err(Error::QueueFull)
        );
        assert_eq!(queue.len(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_oversize_frame_refused() {
        let mut queue = SendQueue::new();
        let oversize = vec![0u8; MAX_MESSAGE_LENGTH + 1];
        assert_eq!(queue.push(oversize.clone()), Err(Error::MessageTooLong));
        assert_eq!(queue.push_front(oversize), Err(Error::MessageTooLong));
        assert!(queue.is_empty());

        queue.push(vec![0u8; MAX_MESSAGE_LENGTH]).unwrap();
    }

    #[test]
    fn test_push_front_preserves_order() {
        let mut queue = SendQueue::new();
        queue.push(frame_of(MessageType::CONNECT)).unwrap();
        queue.push(frame_of(MessageType::PUBLISH)).unwrap();
        queue.set_status(0, SendStatus::WaitAck);

        queue
            .push_front(Message::SearchGw(SearchGw { radius: 2 }).encode())
            .unwrap();

        assert_eq!(queue.head_type(), Some(MessageType::SEARCHGW));
        assert_eq!(queue.head_status(), Some(SendStatus::Request));
        assert_eq!(queue.frame(1).map(|f| f[1]), Some(MessageType::CONNECT as u8));
        assert_eq!(queue.status(1), Some(SendStatus::WaitAck), "statuses follow their frames");
        assert_eq!(queue.frame(2).map(|f| f[1]), Some(MessageType::PUBLISH as u8));
    }

    #[test]
    fn test_pop_front() {
        let mut queue = SendQueue::new();
        assert_eq!(queue.pop_front(), None);

        queue.push(frame_of(MessageType::CONNECT)).unwrap();
        queue.push(frame_of(MessageType::PUBLISH)).unwrap();
        assert_eq!(queue.pop_front().map(|f| f[1]), Some(MessageType::CONNECT as u8));
        assert_eq!(queue.head_type(), Some(MessageType::PUBLISH));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_head_message() {
        let mut queue = SendQueue::new();
        assert!(queue.head_message().is_none());

        queue
            .push(Message::SearchGw(SearchGw { radius: 2 }).encode())
            .unwrap();
        assert_eq!(
            queue.head_message(),
            Some(Message::SearchGw(SearchGw { radius: 2 }))
        );
    }
}
