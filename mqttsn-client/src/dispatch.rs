//! Inbound frame dispatch: every received message advances the state
//! machine here, synchronously, before control returns to the poll site.

use crate::client::Client;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::gateway::GatewayStatus;
use crate::link::{Frame, LinkLayer};
use crate::packet::{
    self, Advertise, ConnectAck, GwInfo, Message, MessageType, Publish, PublishAck, QoS, Register,
    RegisterAck, ReturnCode, SubscribeAck, SubscribeTopic, UnsubscribeAck, WillMsg, WillTopic,
};
use crate::queue::SendStatus;

impl<L: LinkLayer, C: Clock> Client<L, C> {
    /// Routes one inbound frame into the state machine. Malformed frames
    /// are logged and dropped; they never abort the client.
    pub(crate) fn dispatch(&mut self, frame: &Frame) -> Result<()> {
        let message = match packet::parse(&frame.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    "dropping inbound frame from {:04x}: {}",
                    frame.sender_addr16, err
                );
                return Ok(());
            }
        };
        trace!("received {:?} from {:04x}", message, frame.sender_addr16);

        // while searching, nothing but the discovery answer is of interest
        if self.gateway.status() == GatewayStatus::Searching
            && !matches!(message, Message::GwInfo(_))
        {
            return Ok(());
        }

        match message {
            Message::Advertise(advertise) => {
                self.on_advertise(&advertise);
                Ok(())
            }
            Message::GwInfo(info) => {
                self.on_gw_info(&info, frame);
                Ok(())
            }
            Message::ConnectAck(ack) => {
                self.on_connect_ack(&ack);
                Ok(())
            }
            Message::WillTopicReq => self.on_will_topic_req(),
            Message::WillMsgReq => self.on_will_msg_req(),
            Message::Register(register) => {
                self.on_register(&register);
                Ok(())
            }
            Message::RegisterAck(ack) => {
                self.on_register_ack(&ack);
                Ok(())
            }
            Message::Publish(publish) => {
                self.on_publish(&publish, frame);
                Ok(())
            }
            Message::PublishAck(ack) => {
                self.on_publish_ack(&ack);
                Ok(())
            }
            Message::SubscribeAck(ack) => {
                self.on_subscribe_ack(&ack);
                Ok(())
            }
            Message::UnsubscribeAck(ack) => {
                self.on_unsubscribe_ack(&ack);
                Ok(())
            }
            Message::PingReq(_) => {
                if let Err(err) = self.ping_resp() {
                    warn!("cannot answer gateway ping: {}", err);
                }
                Ok(())
            }
            Message::PingResp => {
                self.on_ping_resp();
                Ok(())
            }
            Message::Disconnect(_) => {
                self.on_disconnect();
                Ok(())
            }
            // requests only a gateway handles
            Message::SearchGw(_)
            | Message::Connect(_)
            | Message::WillTopic(_)
            | Message::WillMsg(_)
            | Message::Subscribe(_)
            | Message::Unsubscribe(_) => Ok(()),
        }
    }

    fn on_advertise(&mut self, advertise: &Advertise) {
        let now = self.now_ms();
        self.gateway.recv_advertise(advertise, now);
    }

    fn on_gw_info(&mut self, info: &GwInfo, frame: &Frame) {
        self.gateway.recv_gw_info(info, frame);
        if self.queue.head_type() == Some(MessageType::SEARCHGW) {
            self.queue.set_status(0, SendStatus::Complete);
        }
    }

    fn on_connect_ack(&mut self, ack: &ConnectAck) {
        if self.qos != QoS::AtLeastOnce || self.queue.head_status() != Some(SendStatus::WaitAck) {
            return;
        }
        match ack.return_code {
            ReturnCode::Accepted => {
                self.queue.set_status(0, SendStatus::Complete);
                self.gateway.set_status(GatewayStatus::Connected);
            }
            ReturnCode::RejectedCongestion => self.queue.set_status(0, SendStatus::ResendReq),
            _ => self.queue.set_status(0, SendStatus::Rejected),
        }
    }

    /// The will sub-handshake: the gateway answers CONNECT with WILLTOPICREQ,
    /// and the reply is slotted in front of the completed CONNECT so the
    /// observed outbound order is CONNECT, WILLTOPIC, WILLMSG.
    fn on_will_topic_req(&mut self) -> Result<()> {
        if self.queue.head_type() != Some(MessageType::CONNECT) {
            return Ok(());
        }
        self.queue.set_status(0, SendStatus::Complete);

        let topic = self.will_topic.clone().unwrap_or_default();
        let frame = Message::WillTopic(WillTopic {
            qos: self.qos,
            retain: self.retain,
            topic: &topic,
        })
        .encode();
        if self.queue.push_front(frame).is_err() {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }

    fn on_will_msg_req(&mut self) -> Result<()> {
        if self.queue.head_type() != Some(MessageType::WILLTOPIC) {
            return Ok(());
        }
        self.queue.set_status(0, SendStatus::Complete);

        let message = self.will_message.clone().unwrap_or_default();
        let frame = Message::WillMsg(WillMsg { message: &message }).encode();
        if self.queue.push_front(frame).is_err() {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }

    /// A gateway-sent REGISTER announces an id for a topic the client has
    /// not registered itself, typically after a wildcard subscription. The
    /// wildcard's callback is cloned onto a new owned entry.
    fn on_register(&mut self, register: &Register) {
        if self.topics.topic_id(register.topic_name) != 0 {
            return;
        }
        let callback = match self.topics.wildcard_match(register.topic_name) {
            Some(wildcard) => wildcard.callback(),
            None => return,
        };
        debug!(
            "topic '{}' registered by the gateway as id {}",
            register.topic_name, register.topic_id
        );
        let entry = self.topics.add(register.topic_name);
        entry.set_id(register.topic_id);
        if let Some(callback) = callback {
            entry.set_callback(callback);
        }
    }

    fn on_register_ack(&mut self, ack: &RegisterAck) {
        if self.queue.head_status() != Some(SendStatus::WaitAck) {
            return;
        }
        let topic = match self.queue.head_message() {
            Some(Message::Register(register)) if register.msg_id == ack.msg_id => {
                register.topic_name.to_owned()
            }
            _ => return,
        };
        match ack.return_code {
            ReturnCode::Accepted => {
                self.queue.set_status(0, SendStatus::Complete);
                self.topics.set_id(&topic, ack.topic_id);
            }
            ReturnCode::RejectedCongestion => self.queue.set_status(0, SendStatus::ResendReq),
            _ => self.queue.set_status(0, SendStatus::Rejected),
        }
    }

    /// Only the gateway may publish to this client; frames from any other
    /// node are dropped. QoS 1 publishes are acknowledged right away.
    fn on_publish(&mut self, publish: &Publish, frame: &Frame) {
        if frame.sender_addr16 != self.gateway.addr16() {
            debug!(
                "publish from {:04x} is not the gateway; ignored",
                frame.sender_addr16
            );
            return;
        }
        self.topics.exec_callback(publish.topic_id, publish);
        if publish.qos == QoS::AtLeastOnce {
            if let Err(err) = self.pub_ack(publish.topic_id, publish.msg_id, ReturnCode::Accepted) {
                warn!("cannot acknowledge publish: {}", err);
            }
        }
    }

    fn on_publish_ack(&mut self, ack: &PublishAck) {
        if self.queue.head_status() != Some(SendStatus::WaitAck) {
            return;
        }
        match self.queue.head_message() {
            Some(Message::Publish(publish)) if publish.msg_id == ack.msg_id => {}
            _ => {
                debug!("puback msg id {} does not match the outstanding request", ack.msg_id);
                return;
            }
        }
        match ack.return_code {
            ReturnCode::Accepted => self.queue.set_status(0, SendStatus::Complete),
            ReturnCode::RejectedCongestion => self.queue.set_status(0, SendStatus::ResendReq),
            _ => self.queue.set_status(0, SendStatus::Rejected),
        }
    }

    fn on_subscribe_ack(&mut self, ack: &SubscribeAck) {
        if self.queue.head_status() != Some(SendStatus::WaitAck) {
            return;
        }
        let name = match self.queue.head_message() {
            Some(Message::Subscribe(subscribe)) if subscribe.msg_id == ack.msg_id => {
                match subscribe.topic {
                    SubscribeTopic::Name(name) => Some(name.to_owned()),
                    _ => None,
                }
            }
            _ => return,
        };
        match ack.return_code {
            ReturnCode::Accepted => {
                self.queue.set_status(0, SendStatus::Complete);
                // subscribing by name also teaches us the assigned id
                if let Some(name) = name {
                    self.topics.set_id(&name, ack.topic_id);
                }
            }
            // congestion backs a SUBSCRIBE off to a full re-request
            ReturnCode::RejectedCongestion => self.queue.set_status(0, SendStatus::Request),
            _ => self.queue.set_status(0, SendStatus::Rejected),
        }
    }

    fn on_unsubscribe_ack(&mut self, ack: &UnsubscribeAck) {
        if self.queue.head_status() != Some(SendStatus::WaitAck) {
            return;
        }
        let acknowledged = match self.queue.head_message() {
            Some(Message::Unsubscribe(unsubscribe)) => unsubscribe.msg_id == ack.msg_id,
            _ => false,
        };
        if acknowledged {
            self.queue.set_status(0, SendStatus::Complete);
        }
    }

    fn on_ping_resp(&mut self) {
        let now = self.now_ms();
        self.gateway.recv_ping_resp(now);
        if self.queue.head_type() == Some(MessageType::PINGREQ) {
            self.queue.set_status(0, SendStatus::Complete);
        }
    }

    fn on_disconnect(&mut self) {
        if self.queue.head_status() == Some(SendStatus::WaitAck) {
            self.queue.set_status(0, SendStatus::Complete);
        }
        self.gateway.set_status(GatewayStatus::Disconnected);
    }
}
