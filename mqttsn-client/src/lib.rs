//! A cooperative MQTT-SN v1.2 client for resource-constrained nodes.
//!
//! The client talks to a single gateway over a datagram link (typically an
//! 802.15.4/ZigBee API-frame radio whose coordinator is the gateway). It is
//! single-threaded: the application drives it by queueing requests and
//! calling one of the run modes, which transmit the queue head, wait for the
//! expected acknowledgement and feed inbound frames back into the state
//! machine.

#[macro_use]
extern crate log;

pub extern crate mqttsn_packet as packet;

mod client;
mod clock;
mod dispatch;
mod error;
mod gateway;
mod link;
mod queue;
mod topics;

pub use self::client::{Client, MAX_RETRY, SEARCHGW_RADIUS, T_RESPONSE_MS, T_SEARCHGW_MS};
pub use self::clock::{Clock, Countdown, SystemClock};
pub use self::error::{Error, Result};
pub use self::gateway::{Gateway, GatewayStatus, KEEPALIVE_DEFAULT_MS};
pub use self::link::{Frame, LinkLayer};
pub use self::queue::{SendQueue, SendStatus};
pub use self::topics::{Topic, TopicCallback, TopicTable, Wildcard};
