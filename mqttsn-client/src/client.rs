use hexplay::HexViewBuilder;
use rand::Rng;

use crate::clock::{Clock, Countdown};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, GatewayStatus};
use crate::link::LinkLayer;
use crate::packet::{
    Connect, Disconnect, Message, MessageType, MsgId, PingReq, Publish, PublishAck, QoS, Register,
    ReturnCode, SearchGw, Subscribe, SubscribeTopic, TopicIdType, Unsubscribe,
};
use crate::queue::{SendQueue, SendStatus};
use crate::topics::{TopicCallback, TopicTable};

/// Upper bound of the random delay before a SEARCHGW broadcast.
pub const T_SEARCHGW_MS: u64 = 5_000;

/// How long one attempt waits for the expected acknowledgement.
pub const T_RESPONSE_MS: u64 = 10_000;

/// Transmissions per request before the retry engine gives up.
pub const MAX_RETRY: u8 = 3;

/// Broadcast radius used for gateway discovery.
pub const SEARCHGW_RADIUS: u8 = 2;

/// CONNECT accepts client ids of 1..=23 bytes.
const CLIENT_ID_MAX_LEN: usize = 23;

/// Granularity of the response-wait polling.
const POLL_INTERVAL_MS: u64 = 50;

/// The MQTT-SN session driver.
///
/// Requests are queued by the public API and serviced one at a time by
/// [`exec_msg_request`](Client::exec_msg_request), which the three run modes
/// call in a loop. Inbound frames are dispatched from the poll sites inside
/// those calls; there is no background thread.
pub struct Client<L, C> {
    link: L,
    clock: C,
    pub(crate) topics: TopicTable,
    pub(crate) queue: SendQueue,
    pub(crate) gateway: Gateway,
    client_id: String,
    pub(crate) qos: QoS,
    pub(crate) retain: bool,
    clean_session: bool,
    pub(crate) will_topic: Option<String>,
    pub(crate) will_message: Option<Vec<u8>>,
    msg_id: MsgId,
    max_retry: u8,
}

impl<L: LinkLayer, C: Clock> Client<L, C> {
    pub fn new(link: L, clock: C) -> Self {
        Client {
            link,
            clock,
            topics: TopicTable::new(),
            queue: SendQueue::new(),
            gateway: Gateway::new(),
            client_id: String::new(),
            qos: QoS::AtMostOnce,
            retain: false,
            clean_session: false,
            will_topic: None,
            will_message: None,
            msg_id: 0,
            max_retry: MAX_RETRY,
        }
    }

    /// Records the client id carried by CONNECT and PINGREQ.
    pub fn init(&mut self, client_id: &str) -> Result<()> {
        if client_id.is_empty() || client_id.len() > CLIENT_ID_MAX_LEN {
            return Err(Error::InvalidClientId);
        }
        self.client_id = client_id.to_owned();
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_keep_alive(&mut self, ms: u64) {
        self.gateway.set_keep_alive(ms);
    }

    pub fn set_will_topic(&mut self, topic: &str) {
        self.will_topic = Some(topic.to_owned());
    }

    pub fn set_will_message(&mut self, message: &[u8]) {
        self.will_message = Some(message.to_vec());
    }

    /// Selects QoS 0 or 1 for outgoing requests. QoS 1 is also what arms
    /// acknowledgement waiting on CONNECT and the will handshake.
    pub fn set_qos(&mut self, level: u8) {
        self.qos = if level == 0 {
            QoS::AtMostOnce
        } else {
            QoS::AtLeastOnce
        };
    }

    pub fn set_retain(&mut self, retain: bool) {
        self.retain = retain;
    }

    pub fn set_clean(&mut self, clean: bool) {
        self.clean_session = clean;
    }

    pub fn set_retry_max(&mut self, count: u8) {
        self.max_retry = count;
    }

    pub fn is_gw_connected(&self) -> bool {
        self.gateway.is_connected()
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Message ids run 1..=0xFFFF and wrap past the top back to 1; zero is
    /// reserved for QoS 0 messages.
    pub(crate) fn next_msg_id(&mut self) -> MsgId {
        self.msg_id = match self.msg_id {
            0xFFFF => 1,
            n => n + 1,
        };
        self.msg_id
    }

    /// Registers a topic locally with its callback; no wire traffic.
    pub fn create_topic(&mut self, topic: &str, callback: TopicCallback) {
        self.topics.add(topic).set_callback(callback);
    }

    /// Queues a CONNECT carrying the keep-alive duration in seconds.
    pub fn connect(&mut self) -> Result<()> {
        let duration = (self.gateway.keep_alive_ms() / 1_000) as u16;
        let frame = Message::Connect(Connect {
            will: self.will_topic.is_some() || self.will_message.is_some(),
            clean_session: self.clean_session,
            duration,
            client_id: &self.client_id,
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues a DISCONNECT; a nonzero `duration` announces sleep.
    pub fn disconnect(&mut self, duration: u16) -> Result<()> {
        let duration = if duration == 0 { None } else { Some(duration) };
        self.queue
            .push(Message::Disconnect(Disconnect { duration }).encode())
    }

    /// Queues a PUBLISH by topic name. The name must have been registered,
    /// unless it is a two-character short name, which goes out as-is.
    pub fn publish(&mut self, topic: &str, data: &[u8]) -> Result<()> {
        let registered = self.topics.topic_id(topic);
        let (kind, topic_id) = if registered != 0 {
            (TopicIdType::Normal, registered)
        } else if topic.len() == 2 {
            let name = topic.as_bytes();
            (TopicIdType::Short, u16::from_be_bytes([name[0], name[1]]))
        } else {
            return Err(Error::NoTopicId);
        };
        self.publish_message(kind, topic_id, data)
    }

    /// Queues a PUBLISH to a predefined topic id.
    pub fn publish_predefined(&mut self, topic_id: u16, data: &[u8]) -> Result<()> {
        self.publish_message(TopicIdType::Predefined, topic_id, data)
    }

    fn publish_message(&mut self, kind: TopicIdType, topic_id: u16, data: &[u8]) -> Result<()> {
        let msg_id = if self.qos > QoS::AtMostOnce {
            self.next_msg_id()
        } else {
            0
        };
        let frame = Message::Publish(Publish {
            dup: false,
            qos: self.qos,
            retain: self.retain,
            kind,
            topic_id,
            msg_id,
            payload: data,
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues a PUBACK, acknowledging an inbound QoS 1 publish.
    pub fn pub_ack(&mut self, topic_id: u16, msg_id: MsgId, return_code: ReturnCode) -> Result<()> {
        let frame = Message::PublishAck(PublishAck {
            topic_id,
            msg_id,
            return_code,
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues a REGISTER; the topic id is learned from the REGACK.
    pub fn register_topic(&mut self, topic: &str) -> Result<()> {
        self.topics.add(topic);
        let msg_id = self.next_msg_id();
        let frame = Message::Register(Register {
            topic_id: 0,
            msg_id,
            topic_name: topic,
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues a SUBSCRIBE by topic name (wildcards allowed) and installs the
    /// callback. A numeric id assigned by the gateway is learned from the
    /// SUBACK.
    pub fn subscribe(&mut self, topic: &str, callback: TopicCallback) -> Result<()> {
        self.topics.add(topic).set_callback(callback);
        let msg_id = self.next_msg_id();
        let frame = Message::Subscribe(Subscribe {
            dup: false,
            qos: self.qos,
            msg_id,
            topic: SubscribeTopic::Name(topic),
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues a SUBSCRIBE to a predefined topic id.
    pub fn subscribe_predefined(&mut self, topic_id: u16, callback: TopicCallback) -> Result<()> {
        if !self.topics.set_callback_by_id(topic_id, callback) {
            self.topics.add_predefined(topic_id, callback);
        }
        let msg_id = self.next_msg_id();
        let frame = Message::Subscribe(Subscribe {
            dup: false,
            qos: self.qos,
            msg_id,
            topic: SubscribeTopic::Predefined(topic_id),
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues an UNSUBSCRIBE by topic name.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        let msg_id = self.next_msg_id();
        let frame = Message::Unsubscribe(Unsubscribe {
            dup: false,
            msg_id,
            topic: SubscribeTopic::Name(topic),
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues an UNSUBSCRIBE from a predefined topic id.
    pub fn unsubscribe_predefined(&mut self, topic_id: u16) -> Result<()> {
        let msg_id = self.next_msg_id();
        let frame = Message::Unsubscribe(Unsubscribe {
            dup: false,
            msg_id,
            topic: SubscribeTopic::Predefined(topic_id),
        })
        .encode();
        self.queue.push(frame)
    }

    /// Queues a PINGREQ carrying the client id.
    pub fn ping_req(&mut self) -> Result<()> {
        let frame = Message::PingReq(PingReq {
            client_id: &self.client_id,
        })
        .encode();
        self.queue.push(frame)
    }

    pub(crate) fn ping_resp(&mut self) -> Result<()> {
        self.queue.push(Message::PingResp.encode())
    }

    /// Priority-queues a SEARCHGW so discovery preempts pending traffic.
    pub fn search_gw(&mut self, radius: u8) -> Result<()> {
        self.queue
            .push_front(Message::SearchGw(SearchGw { radius }).encode())
    }

    /// One cooperative step: service the queue head if it wants to go out,
    /// otherwise ping when due and poll for one inbound frame.
    pub fn exec_msg_request(&mut self) -> Result<()> {
        match self.queue.head_status() {
            Some(SendStatus::Request) | Some(SendStatus::ResendReq) => self.service_head(),
            _ => self.idle_step(),
        }
    }

    fn service_head(&mut self) -> Result<()> {
        let now = self.now_ms();
        if self.gateway.is_lost(now) || self.gateway.status() == GatewayStatus::Init {
            self.search_gw(SEARCHGW_RADIUS)?;
            self.gateway.set_status(GatewayStatus::Searching);
        }

        if self.gateway.status() == GatewayStatus::Searching
            && self.queue.head_type() == Some(MessageType::SEARCHGW)
        {
            self.searchgw_delay()?;
            // the answer may already have arrived while waiting out the jitter
            if self.queue.head_type() == Some(MessageType::SEARCHGW) {
                self.broadcast(T_SEARCHGW_MS)?;
            }
        }

        if matches!(
            self.gateway.status(),
            GatewayStatus::Disconnected | GatewayStatus::Found
        ) {
            if matches!(
                self.queue.head_type(),
                Some(MessageType::CONNECT) | Some(MessageType::WILLTOPIC) | Some(MessageType::WILLMSG)
            ) {
                self.unicast(T_RESPONSE_MS)?;
                if self.qos == QoS::AtMostOnce {
                    self.gateway.set_status(GatewayStatus::Connected);
                }
                return Ok(());
            }
        }

        if self.gateway.status() == GatewayStatus::Connected {
            return self.unicast(T_RESPONSE_MS);
        }

        Err(Error::NotConnected)
    }

    fn idle_step(&mut self) -> Result<()> {
        let now = self.now_ms();
        if self.gateway.is_ping_required(now) {
            debug!("keep-alive expired, pinging gateway {}", self.gateway.gw_id());
            self.ping_req()?;
            if self.unicast(T_RESPONSE_MS).is_err() {
                self.gateway.set_status(GatewayStatus::Lost);
                return Err(Error::PingRespTimeout);
            }
        }
        self.poll_once(POLL_INTERVAL_MS)
    }

    /// Transmits the head to the gateway and waits for its acknowledgement,
    /// retrying up to `max_retry` times.
    fn unicast(&mut self, timeout_ms: u64) -> Result<()> {
        let mut retry = 0;
        while retry < self.max_retry {
            self.transmit_head();
            let mut response = Countdown::default();
            response.start(self.now_ms(), timeout_ms);

            while !response.expired(self.now_ms()) {
                let head_type = self.queue.head_type();
                match self.queue.head_status() {
                    Some(SendStatus::Complete) => return self.finish_head(),
                    _ if self.qos == QoS::AtMostOnce && head_type != Some(MessageType::PINGREQ) => {
                        return self.finish_head();
                    }
                    _ if head_type == Some(MessageType::PUBACK) => return self.finish_head(),
                    Some(SendStatus::Rejected) => return Err(Error::Rejected),
                    Some(SendStatus::ResendReq) => {
                        self.transmit_head();
                        self.queue.set_status(0, SendStatus::WaitAck);
                    }
                    Some(SendStatus::Request) => self.queue.set_status(0, SendStatus::WaitAck),
                    _ => {}
                }
                self.poll_once(POLL_INTERVAL_MS)?;
            }

            self.queue.set_status(0, SendStatus::Request);
            retry += 1;
        }
        Err(Error::RetryOver)
    }

    /// Broadcast variant of the retry loop; only SEARCHGW waits for an
    /// answer (its GWINFO), everything else completes on transmit at QoS 0.
    fn broadcast(&mut self, timeout_ms: u64) -> Result<()> {
        let mut retry = 0;
        while retry < self.max_retry {
            self.transmit_head_broadcast();
            let mut response = Countdown::default();
            response.start(self.now_ms(), timeout_ms);

            while !response.expired(self.now_ms()) {
                match self.queue.head_status() {
                    Some(SendStatus::Complete) => {
                        self.queue.pop_front();
                        return Ok(());
                    }
                    _ if self.qos == QoS::AtMostOnce
                        && self.queue.head_type() != Some(MessageType::SEARCHGW) =>
                    {
                        self.queue.pop_front();
                        return Ok(());
                    }
                    Some(SendStatus::Request) => self.queue.set_status(0, SendStatus::WaitAck),
                    _ => {}
                }
                self.poll_once(POLL_INTERVAL_MS)?;
            }

            self.queue.set_status(0, SendStatus::Request);
            retry += 1;
        }
        Err(Error::RetryOver)
    }

    /// Pops an acknowledged head and restarts the keep-alive window.
    fn finish_head(&mut self) -> Result<()> {
        self.queue.pop_front();
        let now = self.now_ms();
        self.gateway.mark_send(now);
        Ok(())
    }

    fn transmit_head(&mut self) {
        let Self {
            queue,
            link,
            gateway,
            ..
        } = self;
        if let Some(frame) = queue.frame(0) {
            trace!(
                "unicast {} bytes to gateway {:04x}:\n{}",
                frame.len(),
                gateway.addr16(),
                HexViewBuilder::new(frame).finish()
            );
            if let Err(err) = link.send_unicast(gateway.addr64(), gateway.addr16(), frame) {
                warn!("unicast send failed: {}", err);
            }
        }
    }

    fn transmit_head_broadcast(&mut self) {
        let radius = match self.queue.head_message() {
            Some(Message::SearchGw(search_gw)) => search_gw.radius,
            _ => SEARCHGW_RADIUS,
        };
        let Self { queue, link, .. } = self;
        if let Some(frame) = queue.frame(0) {
            trace!(
                "broadcast {} bytes, radius {}:\n{}",
                frame.len(),
                radius,
                HexViewBuilder::new(frame).finish()
            );
            if let Err(err) = link.send_broadcast(frame, radius) {
                warn!("broadcast send failed: {}", err);
            }
        }
    }

    /// Reads at most one inbound frame and runs it through the dispatcher.
    pub(crate) fn poll_once(&mut self, timeout_ms: u64) -> Result<()> {
        match self.link.poll_incoming(timeout_ms) {
            Ok(Some(frame)) => self.dispatch(&frame),
            Ok(None) => Ok(()),
            Err(err) => {
                warn!("link poll failed: {}", err);
                Ok(())
            }
        }
    }

    /// The random delay the protocol prescribes before SEARCHGW so colliding
    /// clients do not all broadcast at once. Inbound frames keep flowing
    /// while waiting.
    fn searchgw_delay(&mut self) -> Result<()> {
        let jitter = rand::thread_rng().gen_range(0, T_SEARCHGW_MS);
        let mut timer = Countdown::default();
        timer.start(self.now_ms(), jitter);
        while !timer.expired(self.now_ms()) {
            self.poll_once(POLL_INTERVAL_MS)?;
        }
        Ok(())
    }

    /// Drives queued requests until the queue drains. A failing head is
    /// dropped and its error returned.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.exec_msg_request() {
                Ok(()) => {
                    if self.queue.is_empty() {
                        return Ok(());
                    }
                    // drain heads another path already completed
                    if self.queue.head_status() != Some(SendStatus::Request) {
                        self.queue.pop_front();
                    }
                }
                Err(err) => {
                    self.queue.pop_front();
                    return Err(err);
                }
            }
        }
    }

    /// Drives discovery and the connect handshake until the gateway is
    /// `Connected`. A failed SEARCHGW is re-armed; any other failing head is
    /// dropped.
    pub fn run_connect(&mut self) -> Result<()> {
        loop {
            let rc = self.exec_msg_request();
            if self.gateway.is_connected() {
                return Ok(());
            }
            if rc.is_err() {
                if self.queue.head_type() == Some(MessageType::SEARCHGW) {
                    self.queue.set_status(0, SendStatus::Request);
                } else {
                    self.queue.pop_front();
                }
            }
        }
    }

    /// Steady-state service loop; never returns. Heads that fail and are no
    /// longer in `Request` state are dropped.
    pub fn run_loop(&mut self) -> ! {
        loop {
            let rc = self.exec_msg_request();
            if (rc.is_err() || !self.queue.is_empty())
                && self.queue.head_status() != Some(SendStatus::Request)
            {
                self.queue.pop_front();
            }
        }
    }
}
