use bytes::{BufMut, Bytes, BytesMut};

use frame::{self, Error, Frame, Head, Kind, StreamId};

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;

/// Data frame
///
/// Carries arbitrary, variable-length sequences of octets associated
/// with a stream.
#[derive(Debug)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    flags: u8,
    pad_len: u8,
}

impl Data {
    pub fn new(stream_id: StreamId, payload: Bytes) -> Data {
        debug_assert!(!stream_id.is_zero());

        Data {
            stream_id: stream_id,
            data: payload,
            flags: 0,
            pad_len: 0,
        }
    }

    pub fn load(head: Head, mut payload: Bytes) -> Result<Data, Error> {
        debug_assert_eq!(head.kind(), Kind::Data);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = head.flag();

        let pad_len = if flags & PADDED == PADDED {
            frame::util::strip_padding(&mut payload)?
        } else {
            0
        };

        Ok(Data {
            stream_id: head.stream_id(),
            data: payload,
            flags: flags,
            pad_len: pad_len,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.flags |= END_STREAM;
    }

    pub fn into_payload(self) -> Bytes {
        self.data
    }

    /// Number of flow-controlled octets, including padding.
    pub fn flow_len(&self) -> usize {
        let pad = if self.flags & PADDED == PADDED {
            self.pad_len as usize + 1
        } else {
            0
        };
        self.data.len() + pad
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        trace!(
            "encoding DATA; id={:?} len={} eos={}",
            self.stream_id,
            self.data.len(),
            self.is_end_stream()
        );

        let head = Head::new(Kind::Data, self.flags & END_STREAM, self.stream_id);
        head.encode(self.data.len(), dst);
        dst.put_slice(&self.data);
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Frame {
        Frame::Data(src)
    }
}
