use crate::clock::Countdown;
use crate::link::Frame;
use crate::packet::{Advertise, GwInfo};

/// Gateway lifecycle as seen by the client.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum GatewayStatus {
    /// No gateway has ever been seen.
    Init,
    /// A SEARCHGW broadcast is outstanding.
    Searching,
    /// A gateway answered but the session is not established yet.
    Found,
    /// The connect handshake completed.
    Connected,
    /// The gateway acknowledged a DISCONNECT.
    Disconnected,
    /// The gateway stopped advertising or ignored a keep-alive ping.
    Lost,
}

/// Keep-alive applied until `set_keep_alive` overrides it.
pub const KEEPALIVE_DEFAULT_MS: u64 = 60_000;

/// ADVERTISE announces its period in seconds; the client tolerates missing
/// one and a half periods before giving the gateway up.
const ADVERTISE_GRACE_MS_PER_S: u64 = 1_500;

/// The single gateway this client talks to: its link addresses, lifecycle
/// state and the two liveness timers.
pub struct Gateway {
    gw_id: u8,
    addr64: u64,
    addr16: u16,
    status: GatewayStatus,
    keep_alive_ms: u64,
    keep_alive_timer: Countdown,
    advertise_timer: Countdown,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    pub fn new() -> Self {
        Gateway {
            gw_id: 0,
            addr64: 0,
            addr16: 0,
            status: GatewayStatus::Init,
            keep_alive_ms: KEEPALIVE_DEFAULT_MS,
            keep_alive_timer: Countdown::default(),
            advertise_timer: Countdown::default(),
        }
    }

    pub fn status(&self) -> GatewayStatus {
        self.status
    }

    pub fn set_status(&mut self, status: GatewayStatus) {
        if self.status != status {
            debug!("gateway {:?} -> {:?}", self.status, status);
        }
        self.status = status;
    }

    pub fn gw_id(&self) -> u8 {
        self.gw_id
    }

    pub fn addr64(&self) -> u64 {
        self.addr64
    }

    pub fn addr16(&self) -> u16 {
        self.addr16
    }

    pub fn keep_alive_ms(&self) -> u64 {
        self.keep_alive_ms
    }

    pub fn set_keep_alive(&mut self, ms: u64) {
        self.keep_alive_ms = ms;
    }

    pub fn is_connected(&self) -> bool {
        self.status == GatewayStatus::Connected
    }

    /// Checks liveness as a side effect: an expired advertise timer demotes
    /// the gateway to `Lost` no matter its current state.
    pub fn is_lost(&mut self, now: u64) -> bool {
        if self.advertise_timer.expired(now) {
            self.advertise_timer.stop();
            self.set_status(GatewayStatus::Lost);
        }
        self.status == GatewayStatus::Lost
    }

    /// True once the keep-alive window since the last unicast has elapsed on
    /// a connected gateway.
    pub fn is_ping_required(&self, now: u64) -> bool {
        self.status == GatewayStatus::Connected && self.keep_alive_timer.expired(now)
    }

    /// Accepts a gateway announcement while detached, recording the sender's
    /// link addresses.
    pub fn recv_gw_info(&mut self, info: &GwInfo, frame: &Frame) {
        match self.status {
            GatewayStatus::Lost | GatewayStatus::Init | GatewayStatus::Searching => {
                self.addr64 = frame.sender_addr64;
                self.addr16 = frame.sender_addr16;
                self.gw_id = info.gw_id;
                self.set_status(GatewayStatus::Found);
            }
            _ => {}
        }
    }

    /// Re-arms the advertise timer for 1.5x the announced period.
    pub fn recv_advertise(&mut self, advertise: &Advertise, now: u64) {
        if advertise.gw_id == self.gw_id {
            self.advertise_timer
                .start(now, u64::from(advertise.duration) * ADVERTISE_GRACE_MS_PER_S);
        }
    }

    /// Restarts the keep-alive window; called after every successful
    /// unicast and on PINGRESP.
    pub fn mark_send(&mut self, now: u64) {
        self.keep_alive_timer.start(now, self.keep_alive_ms);
    }

    pub fn recv_ping_resp(&mut self, now: u64) {
        self.keep_alive_timer.start(now, self.keep_alive_ms);
    }
}
