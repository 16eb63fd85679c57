mod connection;
mod ping_pong;
mod settings;
mod streams;

pub use self::connection::{Connection, DebugState, Ops, StreamDebug};

use bytes::BytesMut;

use codec::FramedWrite;
use error::Reason;
use frame::{self, StreamId};

pub type PingPayload = [u8; 8];

pub type WindowSize = u32;

// Constants
pub const DEFAULT_INITIAL_WINDOW_SIZE: WindowSize = 65_535;
pub const MAX_WINDOW_SIZE: WindowSize = (1 << 31) - 1;

/// Connection tuning, assembled by `server::Builder`.
#[derive(Debug, Clone)]
pub struct Config {
    pub idle_timeout_ms: u64,
    pub graceful_shutdown_timeout_ms: u64,
    pub second_goaway_delay_ms: u64,
    pub write_timeout_ms: u64,

    /// Soft cap on buffered output; reads pause above it.
    pub soft_output_max: usize,

    /// Cap on an accumulated HEADERS+CONTINUATION block.
    pub max_header_block_size: usize,

    pub connection_window_size: WindowSize,
    pub active_stream_window_size: WindowSize,
    pub max_request_entity_size: u64,

    /// Advertised as SETTINGS_MAX_CONCURRENT_STREAMS.
    pub max_concurrent_pull_streams: usize,

    pub max_concurrent_requests: usize,
    pub max_concurrent_streaming_requests: usize,
    pub max_streams_for_priority: usize,

    /// Capacity of the recently-closed priority ring.
    pub closed_stream_priorities: usize,

    pub push_enabled: bool,
    pub max_pushed_paths: usize,
}

/// Staging view over the connection's write buffer.
///
/// Handlers append control frames here directly; DATA frames are
/// produced on demand by the scheduler when the socket is writable.
pub(crate) struct Outbox<'a> {
    pub buf: &'a mut BytesMut,
    pub enc: &'a mut FramedWrite,
}

impl<'a> Outbox<'a> {
    pub fn frame(&mut self, frame: frame::Frame) {
        self.enc.buffer(self.buf, frame);
    }

    pub fn window_update(&mut self, id: StreamId, incr: WindowSize) {
        self.frame(frame::WindowUpdate::new(id, incr).into());
    }

    pub fn reset(&mut self, id: StreamId, reason: Reason) {
        self.frame(frame::Reset::new(id, reason).into());
    }

    pub fn max_frame_size(&self) -> usize {
        self.enc.max_frame_size()
    }
}
