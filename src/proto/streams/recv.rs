use std::collections::VecDeque;

use super::store::Store;
use super::stream::{ReqBodyState, State, Stream};
use super::{Config, Counts};
use error::Reason;
use frame::StreamId;
use proto::{Outbox, WindowSize};

/// Ingress state: stream-id spaces, the connection receive window, and
/// the dispatch queue.
#[derive(Debug)]
pub struct Recv {
    /// Initial receive window advertised for new streams. We never send
    /// SETTINGS_INITIAL_WINDOW_SIZE, so this is the protocol default.
    init_window: WindowSize,

    /// Target for the connection-level receive window.
    conn_window_target: WindowSize,

    /// Per-stream receive window while a streamed upload is active.
    active_stream_window: WindowSize,

    max_body_size: u64,

    max_concurrent_pull: usize,
    max_concurrent_requests: usize,
    max_concurrent_streaming: usize,

    /// Connection-level receive window.
    window: super::flow_control::FlowControl,

    pub pull_max_open: StreamId,
    pub pull_max_processed: StreamId,

    /// Streams awaiting dispatch, FIFO.
    pending_reqs: VecDeque<StreamId>,

    /// Pull streams above this id arrived after shutdown pinned the
    /// GOAWAY cutoff and are quietly refused.
    discard_above: Option<StreamId>,

    /// TLS early data is being replayed; requests are parked.
    early_data: bool,

    pub received_any_request: bool,
}

impl Recv {
    pub fn new(config: &Config) -> Recv {
        Recv {
            init_window: ::proto::DEFAULT_INITIAL_WINDOW_SIZE,
            conn_window_target: config.connection_window_size,
            active_stream_window: config.active_stream_window_size,
            max_body_size: config.max_request_entity_size,
            max_concurrent_pull: config.max_concurrent_pull_streams,
            max_concurrent_requests: config.max_concurrent_requests,
            max_concurrent_streaming: config.max_concurrent_streaming_requests,
            window: super::flow_control::FlowControl::new(config.connection_window_size),
            pull_max_open: StreamId::ZERO,
            pull_max_processed: StreamId::ZERO,
            pending_reqs: VecDeque::new(),
            discard_above: None,
            early_data: false,
            received_any_request: false,
        }
    }

    pub fn init_window(&self) -> WindowSize {
        self.init_window
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    pub fn max_concurrent_pull(&self) -> usize {
        self.max_concurrent_pull
    }

    pub fn conn_window(&self) -> i32 {
        self.window.window()
    }

    /// Record a newly opened pull stream id. Monotonic.
    pub fn note_opened(&mut self, id: StreamId) {
        debug_assert!(id > self.pull_max_open);
        self.pull_max_open = id;
    }

    pub fn note_processed(&mut self, id: StreamId) {
        if id.is_client_initiated() && id > self.pull_max_processed {
            self.pull_max_processed = id;
        }
    }

    pub fn set_discard_above(&mut self, last: StreamId) {
        self.discard_above = Some(last);
    }

    pub fn should_discard(&self, id: StreamId) -> bool {
        match self.discard_above {
            Some(last) => id > last,
            None => false,
        }
    }

    pub fn set_early_data(&mut self, enabled: bool) {
        self.early_data = enabled;
    }

    pub fn in_early_data(&self) -> bool {
        self.early_data
    }

    /// Connection-scope accounting for a received flow-controlled
    /// frame, with half-window replenishment.
    pub fn account_connection(&mut self, sz: WindowSize, out: &mut Outbox) -> Result<(), Reason> {
        self.window.ensure_window(sz)?;
        self.window.dec_window(sz);

        if self.window.window() <= (self.conn_window_target / 2) as i32 {
            let incr = self.conn_window_target - self.window.available();
            trace!("connection window replenish; incr={}", incr);
            out.window_update(StreamId::ZERO, incr);
            let refill = self.window.inc_window(incr);
            debug_assert!(refill.is_ok(), "connection window replenish overflow");
        }

        Ok(())
    }

    /// Stream-scope accounting for a received frame.
    ///
    /// Buffered bodies are their own consumer, so the whole frame is
    /// credited at once; for streamed bodies only the padding is, and
    /// the payload is credited as the application consumes chunks.
    pub fn note_stream_received(
        &self,
        stream: &mut Stream,
        sz: WindowSize,
        payload_len: usize,
        out: &mut Outbox,
    ) {
        stream.recv_flow.dec_window(sz);

        if stream.body.streamed {
            stream.bytes_unnotified += sz - payload_len as WindowSize;
        } else {
            stream.bytes_unnotified += sz;
        }

        self.maybe_advertise(stream, out);
    }

    /// The application consumed delivered body bytes.
    pub fn note_consumed(&self, stream: &mut Stream, sz: usize, out: &mut Outbox) {
        stream.bytes_unnotified += sz as WindowSize;
        self.maybe_advertise(stream, out);
    }

    /// Batched in `bytes_unnotified`; advertised once the batch reaches
    /// the remaining window.
    fn maybe_advertise(&self, stream: &mut Stream, out: &mut Outbox) {
        if !stream.is_recv_open() {
            return;
        }

        if stream.bytes_unnotified > 0 && stream.bytes_unnotified >= stream.recv_flow.available() {
            let incr = stream.bytes_unnotified;
            trace!("stream {:?} window replenish; incr={}", stream.id, incr);
            out.window_update(stream.id, incr);
            let refill = stream.recv_flow.inc_window(incr);
            debug_assert!(refill.is_ok(), "stream window replenish overflow");
            stream.bytes_unnotified = 0;
        }
    }

    /// Widen the stream's receive window for an active upload.
    pub fn widen_stream_window(&self, stream: &mut Stream, out: &mut Outbox) {
        if stream.recv_window_target >= self.active_stream_window {
            return;
        }

        let incr = self.active_stream_window - stream.recv_window_target;
        stream.recv_window_target = self.active_stream_window;
        let widened = stream.recv_flow.inc_window(incr);
        debug_assert!(widened.is_ok(), "active stream window overflow");
        out.window_update(stream.id, incr);
    }

    // ===== dispatch queue =====

    pub fn enqueue_pending(&mut self, id: StreamId) {
        debug_assert!(!self.pending_reqs.contains(&id));
        self.pending_reqs.push_back(id);
    }

    pub fn unqueue(&mut self, id: StreamId) {
        self.pending_reqs.retain(|&p| p != id);
    }

    pub fn pending_ids(&self) -> Vec<StreamId> {
        self.pending_reqs.iter().cloned().collect()
    }

    /// Pop the next dispatchable stream, honoring the per-connection
    /// and streaming concurrency gates. FIFO: a gated head blocks the
    /// queue until capacity frees.
    pub fn next_dispatch(&mut self, store: &mut Store, counts: &Counts) -> Option<StreamId> {
        loop {
            let id = *self.pending_reqs.front()?;

            {
                let stream = match store.find_mut(&id) {
                    Some(stream) => stream,
                    None => {
                        self.pending_reqs.pop_front();
                        continue;
                    }
                };

                if stream.state != State::ReqPending {
                    self.pending_reqs.pop_front();
                    continue;
                }

                if counts.half_closed >= self.max_concurrent_requests {
                    return None;
                }

                if stream.body.streamed
                    && counts.streaming - counts.tunnels >= self.max_concurrent_streaming
                    && !stream.is_tunnel
                {
                    return None;
                }
            }

            self.pending_reqs.pop_front();
            return Some(id);
        }
    }
}

/// Decide whether a stream's request body still permits DATA.
pub fn data_allowed(stream: &Stream) -> bool {
    match stream.state {
        State::RecvBody => true,
        // A streamed request keeps its receive half open while the
        // response is produced.
        _ => {
            stream.body.streamed
                && !stream.is_closed()
                && stream.body.state >= ReqBodyState::Open
                && stream.body.state < ReqBodyState::CloseQueued
        }
    }
}
