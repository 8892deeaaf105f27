//! MQTT-SN (MQTT for Sensor Networks) v1.2 works by exchanging small
//! length-prefixed messages over a datagram link: byte 0 of every frame is
//! the total frame length, byte 1 the message type, the remainder the
//! type-specific body. After registration, topics travel as 16-bit ids
//! instead of names.
//!
//! This crate describes the format of these messages.
#![warn(missing_docs)]

#[macro_use]
extern crate bitflags;

mod decode;
mod encode;
mod packet;

pub use crate::decode::{parse, DecodeError};
pub use crate::encode::WriteTo;
pub use crate::packet::*;
