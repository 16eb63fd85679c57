use bytes::BytesMut;
use http::{HeaderMap, Request};

use super::flow_control::FlowControl;
use super::scheduler;
use frame::{StreamDependency, StreamId};
use proto::WindowSize;

/// Per-stream state.
#[derive(Debug)]
pub struct Stream {
    pub id: StreamId,

    pub state: State,

    /// Our receive window for the peer's DATA.
    pub recv_flow: FlowControl,

    /// Our send window, replenished by the peer's WINDOW_UPDATEs.
    pub send_flow: FlowControl,

    /// Receive window restoration not yet advertised to the peer.
    pub bytes_unnotified: WindowSize,

    /// Target receive window; widened while a streamed upload is
    /// active.
    pub recv_window_target: WindowSize,

    pub body: ReqBody,

    /// Counts against idle-timeout suppression while the application is
    /// producing the response.
    pub blocked_by_server: bool,

    pub scheduler_node: scheduler::Key,

    pub received_priority: Option<StreamDependency>,

    pub content_length: Option<u64>,
    pub bytes_received: u64,

    pub is_tunnel: bool,

    pub push: Option<Push>,

    /// The request, retained for `foreach_request` until close.
    pub request: Option<Request<()>>,

    /// Request trailers, when the peer sent any.
    pub trailers: Option<HeaderMap>,

    /// Handed to the application via `process_request`.
    pub dispatched: bool,

    /// Held back until the TLS handshake confirms the early data.
    pub early_data_blocked: bool,

    // ===== egress =====
    /// Staged response body bytes not yet framed.
    pub sendq: BytesMut,

    /// The application finished the response body.
    pub send_final: bool,

    /// END_STREAM went on the wire.
    pub end_sent: bool,

    pub pending_trailers: Option<HeaderMap>,
}

/// Stream states. Transitions are forward-only; `EndStream` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Idle,
    RecvHeaders,
    RecvBody,
    ReqPending,
    SendHeaders,
    SendBody,
    SendBodyIsFinal,
    EndStream,
}

/// Request body phases. Monotonically increasing; `CloseDelivered` is
/// terminal and reached at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReqBodyState {
    None,
    OpenBeforeFirstFrame,
    Open,
    CloseQueued,
    CloseDelivered,
}

#[derive(Debug)]
pub struct ReqBody {
    pub state: ReqBodyState,

    /// Byte accumulator; absent when no body is expected.
    pub buf: Option<BytesMut>,

    /// Chunks are handed to the application as they arrive.
    pub streamed: bool,

    /// A delivered chunk has not been consumed yet.
    pub chunk_in_flight: bool,

    /// Size of the chunk awaiting consumption; credited back to the
    /// receive window once the application takes it.
    pub in_flight_len: usize,

    /// Bytes at the head of `buf` that were already credited to the
    /// window before streaming mode was chosen.
    pub credited_head: usize,
}

#[derive(Debug)]
pub struct Push {
    pub parent_stream_id: StreamId,
    pub promise_sent: bool,
}

impl Stream {
    pub fn new(
        id: StreamId,
        send_window: WindowSize,
        recv_window: WindowSize,
        scheduler_node: scheduler::Key,
    ) -> Stream {
        Stream {
            id: id,
            state: State::Idle,
            recv_flow: FlowControl::new(recv_window),
            send_flow: FlowControl::new(send_window),
            bytes_unnotified: 0,
            recv_window_target: recv_window,
            body: ReqBody {
                state: ReqBodyState::None,
                buf: None,
                streamed: false,
                chunk_in_flight: false,
                in_flight_len: 0,
                credited_head: 0,
            },
            blocked_by_server: false,
            scheduler_node: scheduler_node,
            received_priority: None,
            content_length: None,
            bytes_received: 0,
            is_tunnel: false,
            push: None,
            request: None,
            trailers: None,
            dispatched: false,
            early_data_blocked: false,
            sendq: BytesMut::new(),
            send_final: false,
            end_sent: false,
            pending_trailers: None,
        }
    }

    /// Advance the stream state. States never move backwards.
    pub fn advance(&mut self, to: State) {
        debug_assert!(
            to >= self.state,
            "stream state going backwards; {:?} -> {:?}",
            self.state,
            to
        );

        if to != self.state {
            trace!("stream {:?}; state {:?} -> {:?}", self.id, self.state, to);
            self.state = to;
        }
    }

    /// Advance the request body phase. Phases never move backwards.
    pub fn body_advance(&mut self, to: ReqBodyState) {
        debug_assert!(
            to >= self.body.state,
            "req body state going backwards; {:?} -> {:?}",
            self.body.state,
            to
        );

        if to != self.body.state {
            trace!(
                "stream {:?}; body {:?} -> {:?}",
                self.id,
                self.body.state,
                to
            );
            self.body.state = to;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::EndStream
    }

    /// The peer may still send DATA or trailers on this stream.
    pub fn is_recv_open(&self) -> bool {
        self.state == State::RecvHeaders || self.state == State::RecvBody || {
            // A streamed request keeps receiving while the response is
            // already in flight.
            self.body.buf.is_some()
                && self.body.state >= ReqBodyState::OpenBeforeFirstFrame
                && self.body.state < ReqBodyState::CloseQueued
        }
    }

    /// Bytes of response body awaiting a window.
    pub fn pending_send(&self) -> usize {
        self.sendq.len()
    }
}
