use bytes::{BufMut, Bytes, BytesMut};

use error::Reason;
use frame::{Error, Frame, Head, Kind, StreamId};

#[derive(Debug, Clone)]
pub struct GoAway {
    last_stream_id: StreamId,
    error_code: Reason,
    debug_data: Bytes,
}

impl GoAway {
    pub fn new(last_stream_id: StreamId, reason: Reason) -> GoAway {
        GoAway {
            last_stream_id: last_stream_id,
            error_code: reason,
            debug_data: Bytes::new(),
        }
    }

    pub fn with_debug_data(last_stream_id: StreamId, reason: Reason, debug_data: &'static str) -> GoAway {
        GoAway {
            last_stream_id: last_stream_id,
            error_code: reason,
            debug_data: Bytes::from_static(debug_data.as_bytes()),
        }
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<GoAway, Error> {
        debug_assert_eq!(head.kind(), Kind::GoAway);

        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if payload.len() < 8 {
            return Err(Error::BadFrameSize);
        }

        let last_stream_id = StreamId::parse(&payload[..4]);
        let error_code = unpack_octets_4!(payload, 4, u32);

        Ok(GoAway {
            last_stream_id: last_stream_id,
            error_code: error_code.into(),
            debug_data: Bytes::copy_from_slice(&payload[8..]),
        })
    }

    pub fn last_stream_id(&self) -> StreamId {
        self.last_stream_id
    }

    pub fn reason(&self) -> Reason {
        self.error_code
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        trace!(
            "encoding GOAWAY; last={:?} code={:?}",
            self.last_stream_id,
            self.error_code
        );

        let head = Head::new(Kind::GoAway, 0, StreamId::ZERO);
        head.encode(8 + self.debug_data.len(), dst);
        dst.put_u32(self.last_stream_id.into());
        dst.put_u32(self.error_code.into());
        dst.put_slice(&self.debug_data);
    }
}

impl From<GoAway> for Frame {
    fn from(src: GoAway) -> Frame {
        Frame::GoAway(src)
    }
}
