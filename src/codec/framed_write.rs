use bytes::BytesMut;
use hpack;

use frame::{self, Frame};

/// Frame encoder.
///
/// Frames are encoded straight into the connection's staging write
/// buffer; the HPACK encoder state lives here so every header block on
/// the connection shares one dynamic table.
pub struct FramedWrite {
    /// HPACK encoder
    hpack: hpack::Encoder<'static>,

    /// Max frame size, this is specified by the peer
    max_frame_size: usize,
}

impl FramedWrite {
    pub fn new() -> FramedWrite {
        FramedWrite {
            hpack: hpack::Encoder::new(),
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE as usize,
        }
    }

    pub fn buffer(&mut self, dst: &mut BytesMut, item: Frame) {
        trace!("encoding frame; frame={:?}", item);

        match item {
            Frame::Data(v) => v.encode(dst),
            Frame::Headers(v) => v.encode(&mut self.hpack, self.max_frame_size, dst),
            Frame::PushPromise(v) => v.encode(&mut self.hpack, self.max_frame_size, dst),
            Frame::Reset(v) => v.encode(dst),
            Frame::Settings(v) => v.encode(dst),
            Frame::Ping(v) => v.encode(dst),
            Frame::GoAway(v) => v.encode(dst),
            Frame::WindowUpdate(v) => v.encode(dst),
            // Servers have no use for advising the client's priorities.
            Frame::Priority(_) => unreachable!("PRIORITY is never sent"),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Set the peer's max frame size.
    pub fn set_max_frame_size(&mut self, val: usize) {
        debug_assert!(
            frame::DEFAULT_MAX_FRAME_SIZE as usize <= val
                && val <= frame::MAX_MAX_FRAME_SIZE as usize
        );
        self.max_frame_size = val;
    }
}

impl ::std::fmt::Debug for FramedWrite {
    fn fmt(&self, fmt: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        fmt.debug_struct("FramedWrite")
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}
