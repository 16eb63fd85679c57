use bytes::{BufMut, BytesMut};

use error::Reason;
use frame::{Error, Frame, Head, Kind, StreamId};

/// RST_STREAM frame: immediate termination of a stream.
#[derive(Debug, Clone, Copy)]
pub struct Reset {
    stream_id: StreamId,
    error_code: Reason,
}

impl Reset {
    pub fn new(stream_id: StreamId, error: Reason) -> Reset {
        Reset {
            stream_id: stream_id,
            error_code: error,
        }
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Reset, Error> {
        debug_assert_eq!(head.kind(), Kind::Reset);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if payload.len() != 4 {
            return Err(Error::InvalidPayloadLength);
        }

        let error_code = unpack_octets_4!(payload, 0, u32);

        Ok(Reset {
            stream_id: head.stream_id(),
            error_code: error_code.into(),
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn reason(&self) -> Reason {
        self.error_code
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        trace!(
            "encoding RST_STREAM; id={:?} code={:?}",
            self.stream_id,
            self.error_code
        );

        let head = Head::new(Kind::Reset, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.error_code.into());
    }
}

impl From<Reset> for Frame {
    fn from(src: Reset) -> Frame {
        Frame::Reset(src)
    }
}
