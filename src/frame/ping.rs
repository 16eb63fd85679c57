use bytes::{BufMut, BytesMut};

use frame::{Error, Frame, Head, Kind, StreamId};

const ACK_FLAG: u8 = 0x1;

pub type Payload = [u8; 8];

#[derive(Debug)]
pub struct Ping {
    ack: bool,
    payload: Payload,
}

impl Ping {
    pub fn pong(payload: Payload) -> Ping {
        Ping {
            ack: true,
            payload: payload,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Ping, Error> {
        debug_assert_eq!(head.kind(), Kind::Ping);

        // PING frames are not associated with any individual stream. If a PING
        // frame is received with a stream identifier field value other than
        // 0x0, the recipient MUST respond with a connection error
        // (Section 5.4.1) of type PROTOCOL_ERROR.
        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        // In addition to the frame header, PING frames MUST contain 8 octets of
        // opaque data in the payload.
        if payload.len() != 8 {
            return Err(Error::BadFrameSize);
        }

        let mut bytes = [0; 8];
        bytes.copy_from_slice(payload);

        Ok(Ping {
            ack: head.flag() & ACK_FLAG != 0,
            payload: bytes,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        trace!("encoding PING; ack={}", self.ack);

        let flags = if self.ack { ACK_FLAG } else { 0 };
        let head = Head::new(Kind::Ping, flags, StreamId::ZERO);

        head.encode(8, dst);
        dst.put_slice(&self.payload);
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Frame {
        Frame::Ping(src)
    }
}
