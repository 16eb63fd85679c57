use std::collections::VecDeque;

use frame::Ping;
use proto::{Outbox, PingPayload};

/// Acknowledges ping requests from the remote.
///
/// Pongs are queued and flushed ahead of other egress the next time the
/// write loop runs.
#[derive(Debug)]
pub struct PingPong {
    sending_pongs: VecDeque<PingPayload>,
}

impl PingPong {
    pub fn new() -> PingPong {
        PingPong {
            sending_pongs: VecDeque::new(),
        }
    }

    /// Receivers of a PING frame that does not include an ACK flag MUST
    /// send a PING frame with the ACK flag set in response, with an
    /// identical payload.
    pub fn recv_ping(&mut self, ping: Ping) {
        if ping.is_ack() {
            // The connection never sends pings of its own; stray acks
            // are ignored.
            trace!("received stray PING ack");
            return;
        }

        self.sending_pongs.push_back(ping.into_payload());
    }

    /// PING responses SHOULD be given higher priority than any other
    /// frame.
    pub fn send_pending_pongs(&mut self, out: &mut Outbox) {
        while let Some(payload) = self.sending_pongs.pop_front() {
            out.frame(Ping::pong(payload).into());
        }
    }
}
