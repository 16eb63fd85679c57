use bytes::BufMut;

use frame::HEADER_LEN;

/// The parsed 9-byte frame header, minus the length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    kind: Kind,
    flag: u8,
    stream_id: StreamId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data = 0,
    Headers = 1,
    Priority = 2,
    Reset = 3,
    Settings = 4,
    PushPromise = 5,
    Ping = 6,
    GoAway = 7,
    WindowUpdate = 8,
    Continuation = 9,
    Unknown,
}

/// A stream identifier, as described in [Section 5.1.1] of RFC 7540.
///
/// Stream ids are 31 bits; the most significant bit on the wire is
/// reserved and masked off on parse.
///
/// [Section 5.1.1]: https://tools.ietf.org/html/rfc7540#section-5.1.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

// ===== impl Head =====

impl Head {
    pub fn new(kind: Kind, flag: u8, stream_id: StreamId) -> Head {
        Head {
            kind: kind,
            flag: flag,
            stream_id: stream_id,
        }
    }

    /// Parse the frame header, skipping the 3-byte length field.
    ///
    /// The caller is expected to have already consumed the length.
    pub fn parse(header: &[u8]) -> Head {
        debug_assert!(header.len() >= HEADER_LEN);

        Head {
            kind: Kind::new(header[3]),
            flag: header[4],
            stream_id: StreamId::parse(&header[5..9]),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn flag(&self) -> u8 {
        self.flag
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn encode<B: BufMut>(&self, payload_len: usize, dst: &mut B) {
        debug_assert!(payload_len < 1 << 24);

        dst.put_uint(payload_len as u64, 3);
        dst.put_u8(self.kind as u8);
        dst.put_u8(self.flag);
        dst.put_u32(self.stream_id.0);
    }
}

// ===== impl Kind =====

impl Kind {
    pub fn new(byte: u8) -> Kind {
        match byte {
            0 => Kind::Data,
            1 => Kind::Headers,
            2 => Kind::Priority,
            3 => Kind::Reset,
            4 => Kind::Settings,
            5 => Kind::PushPromise,
            6 => Kind::Ping,
            7 => Kind::GoAway,
            8 => Kind::WindowUpdate,
            9 => Kind::Continuation,
            _ => Kind::Unknown,
        }
    }
}

// ===== impl StreamId =====

impl StreamId {
    pub const ZERO: StreamId = StreamId(0);

    /// The maximum allowed stream id.
    pub const MAX: StreamId = StreamId(u32::max_value() >> 1);

    /// Parse a stream id from the first 4 bytes, masking the reserved bit.
    pub fn parse(buf: &[u8]) -> StreamId {
        let val = unpack_octets_4!(buf, 0, u32);
        StreamId(val & (u32::max_value() >> 1))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the stream is client initiated (odd id).
    pub fn is_client_initiated(&self) -> bool {
        self.0 & 1 == 1
    }

    /// Returns true if the stream is server initiated (even, non-zero id).
    pub fn is_server_initiated(&self) -> bool {
        self.0 != 0 && self.0 & 1 == 0
    }

    /// The id of the server-initiated stream following this one.
    pub fn next_push(&self) -> StreamId {
        debug_assert!(self.0 == 0 || self.is_server_initiated());
        StreamId(self.0 + 2)
    }
}

impl From<u32> for StreamId {
    fn from(src: u32) -> StreamId {
        debug_assert_eq!(src & !(u32::max_value() >> 1), 0, "invalid stream id");
        StreamId(src)
    }
}

impl From<StreamId> for u32 {
    fn from(src: StreamId) -> u32 {
        src.0
    }
}

impl PartialEq<u32> for StreamId {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}
