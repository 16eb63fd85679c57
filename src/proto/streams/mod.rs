mod flow_control;
mod recv;
mod scheduler;
mod send;
mod store;
mod stream;

pub use proto::Config;

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use http::{response, HeaderMap, Method, Request, StatusCode, Version};

use self::recv::Recv;
use self::send::Send;
use self::stream::{ReqBodyState, State, Stream};
use codec::{RecvError, UserError};
use error::Reason;
use frame::{self, StreamId};
use proto::connection::StreamDebug;
use proto::Outbox;

/// Follow-up work the protocol layer owes the application. Queued
/// during frame dispatch and drained at the top of the event, so
/// service callbacks are never invoked re-entrantly.
#[derive(Debug)]
pub enum Action {
    /// Ask the host whether the request body should be streamed.
    DecideStreaming(StreamId),

    /// Hand the next body chunk to the application.
    Deliver(StreamId),

    /// A dispatched stream was reset.
    NotifyReset(StreamId, Reason),
}

/// Live-stream counters. Every counter is derived state; the
/// invariants are asserted when the connection tears down.
#[derive(Debug, Default)]
pub struct Counts {
    pub pull_live: usize,
    pub push_live: usize,

    /// Requests dispatched to the application and not yet closed.
    pub half_closed: usize,

    pub blocked_by_server: usize,
    pub tunnels: usize,
    pub streaming: usize,
    pub early_data_blocked: usize,
}

impl Counts {
    pub fn all_zero(&self) -> bool {
        self.pull_live == 0
            && self.push_live == 0
            && self.half_closed == 0
            && self.blocked_by_server == 0
            && self.tunnels == 0
            && self.streaming == 0
            && self.early_data_blocked == 0
    }
}

/// The stream registry and everything keyed by it: per-stream state,
/// the dependency scheduler, flow-control windows, and the dispatch
/// queues.
#[derive(Debug)]
pub struct Streams {
    store: store::Store,
    recv: Recv,
    send: Send,
    scheduler: scheduler::Scheduler,
    counts: Counts,
}

impl Streams {
    pub fn new(config: &Config) -> Streams {
        Streams {
            store: store::Store::new(),
            recv: Recv::new(config),
            send: Send::new(config),
            scheduler: scheduler::Scheduler::new(
                config.closed_stream_priorities,
                config.max_streams_for_priority,
            ),
            counts: Counts::default(),
        }
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn has_live(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn pull_max_open(&self) -> StreamId {
        self.recv.pull_max_open
    }

    pub fn received_any_request(&self) -> bool {
        self.recv.received_any_request
    }

    fn is_idle(&self, id: StreamId) -> bool {
        if id.is_client_initiated() {
            id > self.recv.pull_max_open
        } else {
            id > self.send.push_max_open
        }
    }

    // ===== ingress =====

    /// Process inbound headers: either a request opening a stream, or
    /// trailers finishing a request body.
    pub fn recv_headers(
        &mut self,
        frame: frame::Headers,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) -> Result<(), RecvError> {
        let id = frame.stream_id();

        if self.store.contains(&id) {
            return self.recv_trailers(frame, out, actions);
        }

        if !id.is_client_initiated() {
            debug!("connection error PROTOCOL_ERROR -- HEADERS on non-pull stream id");
            return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
        }

        if id <= self.recv.pull_max_open {
            debug!("connection error PROTOCOL_ERROR -- HEADERS on closed stream");
            return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
        }

        // Trailers cannot open a stream. Requests MUST contain a
        // method; header blocks without one are considered malformed.
        if frame.is_trailers() {
            return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
        }

        self.recv.note_opened(id);

        if self.recv.should_discard(id) {
            // Opened after shutdown pinned the GOAWAY cutoff.
            out.reset(id, Reason::REFUSED_STREAM);
            return Ok(());
        }

        if self.counts.pull_live >= self.recv.max_concurrent_pull() {
            return Err(RecvError::Stream {
                id: id,
                reason: Reason::REFUSED_STREAM,
            });
        }

        trace!("recv_headers; opening stream {:?}", id);

        let prio = frame.stream_dep();
        let node = self.scheduler.open_stream(id, prio.as_ref());
        let mut stream = Stream::new(id, self.send.init_window(), self.recv.init_window(), node);
        stream.received_priority = prio;
        stream.advance(State::RecvHeaders);
        self.counts.pull_live += 1;
        self.store.insert(id, stream);

        let end_stream = frame.is_end_stream();
        let bad_chars = frame.has_bad_chars();
        let content_length = frame.content_length();

        if frame.is_malformed() {
            debug!("stream error PROTOCOL_ERROR -- malformed request header block");
            return Err(RecvError::Stream {
                id: id,
                reason: Reason::PROTOCOL_ERROR,
            });
        }

        let (pseudo, fields) = frame.into_parts();
        let request = ::server::Peer::build_request(id, pseudo, fields)?;

        if bad_chars {
            // Not a protocol violation; the request is simply invalid.
            if end_stream {
                if let Some(mut stream) = self.store.find_mut(&id) {
                    stream.advance(State::ReqPending);
                }
            }

            self.synthesize_400(id, out, actions);
            return Ok(());
        }

        self.recv.received_any_request = true;

        let is_connect = *request.method() == Method::CONNECT;

        {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Ok(()),
            };

            stream.content_length = content_length;
            stream.request = Some(request);
        }

        if is_connect {
            // CONNECT is a tunnel: no entity framing applies.
            if content_length.is_some() || end_stream {
                return Err(RecvError::Stream {
                    id: id,
                    reason: Reason::PROTOCOL_ERROR,
                });
            }

            {
                let mut stream = match self.store.find_mut(&id) {
                    Some(stream) => stream,
                    None => return Ok(()),
                };

                stream.is_tunnel = true;
                stream.body.buf = Some(BytesMut::new());
                stream.body.streamed = true;
                stream.body_advance(ReqBodyState::Open);
                stream.advance(State::RecvBody);
                self.recv.widen_stream_window(&mut stream, out);
            }

            self.make_pending(id);
            return Ok(());
        }

        if end_stream {
            self.make_pending(id);
        } else {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Ok(()),
            };

            stream.body.buf = Some(BytesMut::new());
            stream.body_advance(ReqBodyState::OpenBeforeFirstFrame);
            stream.advance(State::RecvBody);
        }

        Ok(())
    }

    fn recv_trailers(
        &mut self,
        frame: frame::Headers,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) -> Result<(), RecvError> {
        let id = frame.stream_id();

        {
            let stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Err(RecvError::Connection(Reason::PROTOCOL_ERROR)),
            };

            if !recv::data_allowed(&stream) {
                debug!("connection error PROTOCOL_ERROR -- HEADERS in invalid stream state");
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }
        }

        // A trailing HEADERS must end the stream.
        if !frame.is_end_stream() {
            return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
        }

        if !frame.is_trailers() || frame.is_malformed() {
            return Err(RecvError::Stream {
                id: id,
                reason: Reason::PROTOCOL_ERROR,
            });
        }

        let (_pseudo, fields) = frame.into_parts();

        {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Ok(()),
            };
            stream.trailers = Some(fields);
        }

        self.finish_request_body(id, actions)
    }

    pub fn recv_data(
        &mut self,
        frame: frame::Data,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) -> Result<(), RecvError> {
        let id = frame.stream_id();
        let sz = frame.flow_len() as ::proto::WindowSize;

        // Connection-scope accounting applies even when the stream is
        // already gone.
        self.recv
            .account_connection(sz, out)
            .map_err(RecvError::Connection)?;

        if !self.store.contains(&id) {
            if self.is_idle(id) {
                debug!("connection error PROTOCOL_ERROR -- DATA on idle stream");
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }

            // Recently closed; drop the payload.
            return Ok(());
        }

        let end_stream = frame.is_end_stream();
        let mut first_frame = false;
        let mut deliver = false;

        {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Ok(()),
            };

            if !recv::data_allowed(&stream) {
                debug!("stream error PROTOCOL_ERROR -- DATA in invalid body state");
                return Err(RecvError::Stream {
                    id: id,
                    reason: Reason::PROTOCOL_ERROR,
                });
            }

            stream
                .recv_flow
                .ensure_window(sz)
                .map_err(|reason| RecvError::Stream { id: id, reason: reason })?;

            let data = frame.into_payload();
            stream.bytes_received += data.len() as u64;

            if let Some(cl) = stream.content_length {
                if stream.bytes_received > cl {
                    debug!("stream error PROTOCOL_ERROR -- body exceeds content-length");
                    return Err(RecvError::Stream {
                        id: id,
                        reason: Reason::PROTOCOL_ERROR,
                    });
                }
            }

            if stream.bytes_received > self.recv.max_body_size() {
                return Err(RecvError::Stream {
                    id: id,
                    reason: Reason::REFUSED_STREAM,
                });
            }

            if stream.body.state == ReqBodyState::OpenBeforeFirstFrame {
                stream.body_advance(ReqBodyState::Open);
                first_frame = true;
            }

            let payload_len = data.len();

            match stream.body.buf {
                Some(ref mut buf) => buf.extend_from_slice(&data),
                None => debug_assert!(false, "DATA accepted without a body buffer"),
            }

            self.recv
                .note_stream_received(&mut stream, sz, payload_len, out);

            deliver = stream.body.streamed
                && stream.dispatched
                && !stream.body.chunk_in_flight
                && !end_stream;
        }

        if first_frame && !end_stream {
            actions.push_back(Action::DecideStreaming(id));
        }

        if deliver {
            actions.push_back(Action::Deliver(id));
        }

        if end_stream {
            return self.finish_request_body(id, actions);
        }

        Ok(())
    }

    /// The request body is complete (END_STREAM on DATA, or trailers).
    fn finish_request_body(
        &mut self,
        id: StreamId,
        actions: &mut VecDeque<Action>,
    ) -> Result<(), RecvError> {
        let (streamed, deliver) = {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Ok(()),
            };

            if let Some(cl) = stream.content_length {
                if stream.bytes_received != cl {
                    debug!(
                        "stream error PROTOCOL_ERROR -- content-length mismatch; declared={} received={}",
                        cl, stream.bytes_received
                    );
                    return Err(RecvError::Stream {
                        id: id,
                        reason: Reason::PROTOCOL_ERROR,
                    });
                }
            }

            if stream.body.streamed {
                stream.body_advance(ReqBodyState::CloseQueued);
                (true, !stream.body.chunk_in_flight)
            } else {
                (false, false)
            }
        };

        if streamed {
            if deliver {
                actions.push_back(Action::Deliver(id));
            }
        } else {
            self.make_pending(id);
        }

        Ok(())
    }

    pub fn recv_priority(&mut self, frame: frame::Priority) -> Result<(), RecvError> {
        let id = frame.stream_id();
        let dep = frame.dependency();

        if let Some(mut stream) = self.store.find_mut(&id) {
            stream.received_priority = Some(dep);
        }

        match self.scheduler.recv_priority(id, &dep) {
            Ok(()) => Ok(()),
            Err(_) => {
                debug!("connection error ENHANCE_YOUR_CALM -- too many idle priority streams");
                Err(RecvError::Connection(Reason::ENHANCE_YOUR_CALM))
            }
        }
    }

    pub fn recv_reset(
        &mut self,
        frame: frame::Reset,
        actions: &mut VecDeque<Action>,
    ) -> Result<(), RecvError> {
        let id = frame.stream_id();

        if !self.store.contains(&id) {
            if self.is_idle(id) {
                debug!("connection error PROTOCOL_ERROR -- RST_STREAM on idle stream");
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }

            return Ok(());
        }

        debug!("stream {:?} reset by peer; reason={:?}", id, frame.reason());
        self.close(id, actions, Some(frame.reason()));
        Ok(())
    }

    pub fn recv_window_update(&mut self, frame: frame::WindowUpdate) -> Result<(), RecvError> {
        let id = frame.stream_id();
        let incr = frame.size_increment();

        if id.is_zero() {
            if incr == 0 {
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }

            return self
                .send
                .recv_connection_window_update(incr)
                .map_err(RecvError::Connection);
        }

        if incr == 0 {
            return Err(RecvError::Stream {
                id: id,
                reason: Reason::PROTOCOL_ERROR,
            });
        }

        if !self.store.contains(&id) {
            if self.is_idle(id) {
                debug!("connection error PROTOCOL_ERROR -- WINDOW_UPDATE on idle stream");
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }

            // The peer may send window updates for streams the local
            // end already closed. It's ok...
            return Ok(());
        }

        let activate = {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Ok(()),
            };

            stream
                .send_flow
                .inc_window(incr)
                .map_err(|reason| RecvError::Stream { id: id, reason: reason })?;

            if stream.send_flow.window() > 0 && (stream.pending_send() > 0 || stream.send_final) {
                Some(stream.scheduler_node)
            } else {
                None
            }
        };

        if let Some(node) = activate {
            self.scheduler.activate(node);
        }

        Ok(())
    }

    /// SETTINGS_INITIAL_WINDOW_SIZE changed.
    pub fn apply_initial_window(&mut self, new_init: ::proto::WindowSize) -> Result<(), Reason> {
        self.send
            .apply_initial_window_delta(new_init, &mut self.store, &mut self.scheduler)
    }

    // ===== dispatch and body delivery =====

    fn make_pending(&mut self, id: StreamId) {
        let early = self.recv.in_early_data();

        match self.store.find_mut(&id) {
            Some(mut stream) => {
                if early {
                    stream.early_data_blocked = true;
                } else {
                    stream.advance(State::ReqPending);
                }
            }
            None => return,
        }

        if early {
            self.counts.early_data_blocked += 1;
        } else {
            self.recv.enqueue_pending(id);
        }
    }

    /// Pop and mark the next dispatchable request, if the concurrency
    /// gates allow one.
    pub fn start_dispatch(&mut self) -> Option<StreamId> {
        let id = self.recv.next_dispatch(&mut self.store, &self.counts)?;

        let (streamed, tunnel) = {
            let mut stream = self.store.find_mut(&id)?;
            stream.dispatched = true;
            stream.blocked_by_server = true;
            (stream.body.streamed, stream.is_tunnel)
        };

        self.counts.half_closed += 1;
        self.counts.blocked_by_server += 1;

        if streamed {
            self.counts.streaming += 1;
            if tunnel {
                self.counts.tunnels += 1;
            }
        }

        self.recv.note_processed(id);

        trace!("dispatching request; id={:?} streamed={}", id, streamed);
        Some(id)
    }

    /// Whether a just-dispatched streaming request already has buffered
    /// body to hand over.
    pub fn wants_delivery(&self, id: StreamId) -> bool {
        match self.store.get(&id) {
            Some(stream) => {
                stream.body.streamed
                    && !stream.body.chunk_in_flight
                    && (stream
                        .body
                        .buf
                        .as_ref()
                        .map(|b| !b.is_empty())
                        .unwrap_or(false)
                        || stream.body.state == ReqBodyState::CloseQueued)
            }
            None => false,
        }
    }

    /// The host decided whether to stream the request body.
    pub fn decide_streaming(&mut self, id: StreamId, wants: bool, out: &mut Outbox) -> bool {
        if !wants {
            return false;
        }

        let ok = {
            match self.store.find_mut(&id) {
                Some(mut stream) => {
                    if stream.dispatched
                        || stream.state != State::RecvBody
                        || stream.body.state >= ReqBodyState::CloseQueued
                    {
                        false
                    } else {
                        stream.body.streamed = true;
                        // Bytes buffered before the decision were
                        // already credited to the window.
                        stream.body.credited_head =
                            stream.body.buf.as_ref().map(|b| b.len()).unwrap_or(0);
                        self.recv.widen_stream_window(&mut stream, out);
                        true
                    }
                }
                None => false,
            }
        };

        if ok {
            self.make_pending(id);
        }

        ok
    }

    /// Take the next chunk for delivery via `write_req`. Returns the
    /// chunk and whether it is the final one.
    pub fn begin_delivery(&mut self, id: StreamId) -> Option<(Bytes, bool)> {
        let mut stream = self.store.find_mut(&id)?;

        if !stream.dispatched
            || !stream.body.streamed
            || stream.body.chunk_in_flight
            || stream.body.state == ReqBodyState::CloseDelivered
        {
            return None;
        }

        let end = stream.body.state == ReqBodyState::CloseQueued;

        let chunk = match stream.body.buf {
            Some(ref mut buf) => buf.split().freeze(),
            None => Bytes::new(),
        };

        if chunk.is_empty() && !end {
            return None;
        }

        stream.body.chunk_in_flight = true;

        // Only the portion not already credited (bytes received before
        // streaming was chosen) counts toward the window on consume.
        let already = ::std::cmp::min(stream.body.credited_head, chunk.len());
        stream.body.credited_head -= already;
        stream.body.in_flight_len = chunk.len() - already;

        if end {
            // Terminal before the application sees the chunk; a reset
            // racing the delivery can no longer produce a second close.
            stream.body_advance(ReqBodyState::CloseDelivered);
        }

        Some((chunk, end))
    }

    /// The application consumed the previously delivered chunk; its
    /// bytes are credited back to the receive window. Returns true when
    /// another delivery should be queued.
    pub fn consume_request_body(&mut self, id: StreamId, out: &mut Outbox) -> bool {
        let mut stream = match self.store.find_mut(&id) {
            Some(stream) => stream,
            None => return false,
        };

        if !stream.body.chunk_in_flight {
            return false;
        }

        stream.body.chunk_in_flight = false;

        let consumed = stream.body.in_flight_len;
        stream.body.in_flight_len = 0;

        if consumed > 0 {
            self.recv.note_consumed(&mut stream, consumed, out);
        }

        let buffered = stream
            .body
            .buf
            .as_ref()
            .map(|b| !b.is_empty())
            .unwrap_or(false);

        buffered || stream.body.state == ReqBodyState::CloseQueued
    }

    // ===== egress (application-facing) =====

    pub fn send_response(
        &mut self,
        id: StreamId,
        parts: response::Parts,
        end_of_stream: bool,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) -> Result<(), UserError> {
        let was_blocked = {
            let mut stream = match self.store.find_mut(&id) {
                Some(stream) => stream,
                None => return Err(UserError::InactiveStreamId),
            };

            self.send
                .stage_response(&mut stream, parts, end_of_stream, out)?;

            let was = stream.blocked_by_server;
            stream.blocked_by_server = false;
            was
        };

        if was_blocked {
            self.counts.blocked_by_server -= 1;
        }

        if end_of_stream {
            self.finish_response(id, out, actions);
        }

        Ok(())
    }

    pub fn send_data(
        &mut self,
        id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    ) -> Result<(), UserError> {
        let mut stream = match self.store.find_mut(&id) {
            Some(stream) => stream,
            None => return Err(UserError::InactiveStreamId),
        };

        self.send
            .stage_data(&mut stream, data, end_of_stream, &mut self.scheduler)
    }

    pub fn send_trailers(&mut self, id: StreamId, trailers: HeaderMap) -> Result<(), UserError> {
        let mut stream = match self.store.find_mut(&id) {
            Some(stream) => stream,
            None => return Err(UserError::InactiveStreamId),
        };

        self.send
            .stage_trailers(&mut stream, trailers, &mut self.scheduler)
    }

    /// Application-initiated reset.
    pub fn send_reset(&mut self, id: StreamId, reason: Reason, out: &mut Outbox) {
        if !self.store.contains(&id) {
            return;
        }

        out.reset(id, reason);
        let mut actions = VecDeque::new();
        self.close(id, &mut actions, None);
        debug_assert!(actions.is_empty());
    }

    /// Host-driven reprioritization, e.g. from a response priority
    /// header. Remembered so the placement heuristic can compensate.
    pub fn host_reprioritize(&mut self, id: StreamId, weight: u16) {
        let node = match self.store.get(&id) {
            Some(stream) => stream.scheduler_node,
            None => return,
        };

        self.scheduler.host_reprioritize(node, weight);
    }

    /// Open a server-initiated stream advertising `path` on the parent
    /// stream. The caller has already checked connection-level policy.
    pub fn open_push(
        &mut self,
        src_id: StreamId,
        path: &str,
        is_critical: bool,
        out: &mut Outbox,
    ) -> Option<StreamId> {
        let (scheme, authority) = {
            let src = self.store.get(&src_id)?;
            let req = src.request.as_ref()?;
            let scheme = req.uri().scheme_str()?.to_owned();
            let authority = req.uri().authority()?.as_str().to_owned();
            (scheme, authority)
        };

        let uri: ::http::Uri = format!("{}://{}{}", scheme, authority, path).parse().ok()?;

        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .version(Version::HTTP_2)
            .body(())
            .ok()?;

        let id = self.send.push_max_open.next_push();
        self.send.push_max_open = id;

        let pseudo = frame::Pseudo::request(
            Method::GET,
            Bytes::from(scheme.into_bytes()),
            Bytes::from(authority.into_bytes()),
            Bytes::from(path.as_bytes().to_vec()),
        );

        out.frame(frame::PushPromise::new(src_id, id, pseudo, HeaderMap::new()).into());

        let (parent, weight) = if is_critical {
            (None, 256)
        } else {
            (Some(src_id), scheduler::DEFAULT_WEIGHT)
        };

        let node = self.scheduler.open_pushed(id, parent, weight);
        let mut stream = Stream::new(id, self.send.init_window(), self.recv.init_window(), node);
        stream.request = Some(request);
        stream.push = Some(stream::Push {
            parent_stream_id: src_id,
            promise_sent: true,
        });
        stream.advance(State::ReqPending);

        self.counts.push_live += 1;
        self.store.insert(id, stream);
        self.recv.enqueue_pending(id);

        info!("pushing {:?} on stream {:?}; promised={:?}", path, src_id, id);
        Some(id)
    }

    // ===== the write loop's DATA production =====

    pub fn produce(
        &mut self,
        out: &mut Outbox,
        budget: usize,
        actions: &mut VecDeque<Action>,
    ) {
        let finished = self
            .send
            .produce(&mut self.store, &mut self.scheduler, out, budget);

        for id in finished {
            self.finish_response(id, out, actions);
        }
    }

    /// The response is fully on the wire (or staged); close the stream,
    /// resetting the request half if the peer is still sending.
    fn finish_response(
        &mut self,
        id: StreamId,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) {
        let recv_open = match self.store.get(&id) {
            Some(stream) => stream.is_recv_open(),
            None => return,
        };

        if recv_open {
            out.reset(id, Reason::NO_ERROR);
        }

        trace!("response complete; id={:?}", id);
        self.close(id, actions, None);
    }

    pub fn take_proceeds(&mut self) -> Vec<StreamId> {
        self.send
            .take_proceeds()
            .into_iter()
            .filter(|id| self.store.contains(id))
            .collect()
    }

    // ===== error and teardown paths =====

    /// Stream-scoped error: RST_STREAM plus local reset.
    pub fn stream_error(
        &mut self,
        id: StreamId,
        reason: Reason,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) {
        debug!("stream error; id={:?} reason={:?}", id, reason);
        out.reset(id, reason);
        self.close(id, actions, Some(reason));
    }

    /// Remove a stream and release everything keyed by it. The node is
    /// parked in the scheduler's closed-stream ring.
    fn close(&mut self, id: StreamId, actions: &mut VecDeque<Action>, notify: Option<Reason>) {
        let mut stream = match self.store.remove(&id) {
            Some(stream) => stream,
            None => return,
        };

        // Terminal body state first: the application observes the close
        // from inside its reset callback, never a delivery after it.
        stream.body_advance(ReqBodyState::CloseDelivered);
        stream.advance(State::EndStream);

        self.scheduler.park(stream.scheduler_node);

        if id.is_client_initiated() {
            self.counts.pull_live -= 1;
        } else {
            self.counts.push_live -= 1;
        }

        if stream.dispatched {
            self.counts.half_closed -= 1;

            if stream.body.streamed {
                self.counts.streaming -= 1;
                if stream.is_tunnel {
                    self.counts.tunnels -= 1;
                }
            }
        }

        if stream.blocked_by_server {
            self.counts.blocked_by_server -= 1;
        }

        if stream.early_data_blocked {
            self.counts.early_data_blocked -= 1;
        }

        self.recv.unqueue(id);
        self.send.unqueue(id);

        if let Some(reason) = notify {
            if stream.dispatched {
                actions.push_back(Action::NotifyReset(id, reason));
            }
        }
    }

    /// Tear down every stream, notifying the application about the ones
    /// it was processing.
    pub fn shutdown(&mut self, actions: &mut VecDeque<Action>) {
        let mut ids = self.store.ids();
        ids.sort();

        for id in ids {
            self.close(id, actions, Some(Reason::CANCEL));
        }

        debug_assert!(self.counts.all_zero(), "counters leaked: {:?}", self.counts);
    }

    fn synthesize_400(
        &mut self,
        id: StreamId,
        out: &mut Outbox,
        actions: &mut VecDeque<Action>,
    ) {
        debug!("responding 400; invalid header characters on stream {:?}", id);

        let mut frame = frame::Headers::response(id, StatusCode::BAD_REQUEST, HeaderMap::new());
        frame.set_end_stream();
        out.frame(frame.into());

        self.finish_response(id, out, actions);
    }

    // ===== shutdown support =====

    pub fn set_discard_above(&mut self, last: StreamId) {
        self.recv.set_discard_above(last);
    }

    // ===== early data =====

    pub fn set_early_data(&mut self) {
        self.recv.set_early_data(true);
    }

    pub fn in_early_data(&self) -> bool {
        self.recv.in_early_data()
    }

    /// The TLS handshake completed; release parked requests in id
    /// order.
    pub fn release_early_data(&mut self) {
        self.recv.set_early_data(false);

        let mut ids = self.store.ids();
        ids.sort();

        for id in ids {
            let blocked = {
                match self.store.find_mut(&id) {
                    Some(mut stream) => {
                        if stream.early_data_blocked {
                            stream.early_data_blocked = false;
                            stream.advance(State::ReqPending);
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                }
            };

            if blocked {
                self.counts.early_data_blocked -= 1;
                self.recv.enqueue_pending(id);
            }
        }
    }

    // ===== application accessors =====

    pub fn request(&self, id: StreamId) -> Option<&Request<()>> {
        self.store.get(&id).and_then(|s| s.request.as_ref())
    }

    pub fn take_body(&mut self, id: StreamId) -> Option<Bytes> {
        let mut stream = self.store.find_mut(&id)?;

        if stream.body.streamed {
            return None;
        }

        stream.body.buf.take().map(|buf| buf.freeze())
    }

    pub fn take_trailers(&mut self, id: StreamId) -> Option<HeaderMap> {
        self.store.find_mut(&id)?.into_mut().trailers.take()
    }

    pub fn foreach_request<F>(&mut self, mut f: F)
    where
        F: FnMut(StreamId, &Request<()>),
    {
        self.store.for_each(|ptr| {
            if let Some(ref request) = ptr.request {
                f(ptr.id, request);
            }
        });
    }

    // ===== debug surface =====

    pub fn conn_recv_window(&self) -> i32 {
        self.recv.conn_window()
    }

    pub fn conn_send_window(&self) -> i32 {
        self.send.conn_window()
    }

    pub fn pull_max_processed(&self) -> StreamId {
        self.recv.pull_max_processed
    }

    pub fn push_max_open(&self) -> StreamId {
        self.send.push_max_open
    }

    pub fn pending_ids(&self) -> Vec<StreamId> {
        self.recv.pending_ids()
    }

    pub fn chromium_shape(&self) -> bool {
        self.scheduler.chromium_shape()
    }

    pub fn scheduler_consistent(&self) -> bool {
        self.scheduler.is_consistent()
    }

    pub fn debug_streams(&self) -> Vec<StreamDebug> {
        let mut ids = self.store.ids();
        ids.sort();

        ids.into_iter()
            .filter_map(|id| {
                let stream = self.store.get(&id)?;

                Some(StreamDebug {
                    id: id.into(),
                    state: state_name(stream.state),
                    body_state: body_state_name(stream.body.state),
                    send_window: stream.send_flow.window(),
                    recv_window: stream.recv_flow.window(),
                    weight: self.scheduler.weight(stream.scheduler_node),
                    parent: self
                        .scheduler
                        .parent_id(stream.scheduler_node)
                        .map(u32::from),
                    queued: stream.pending_send(),
                    dispatched: stream.dispatched,
                    blocked_by_server: stream.blocked_by_server,
                })
            })
            .collect()
    }
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Idle => "IDLE",
        State::RecvHeaders => "RECV_HEADERS",
        State::RecvBody => "RECV_BODY",
        State::ReqPending => "REQ_PENDING",
        State::SendHeaders => "SEND_HEADERS",
        State::SendBody => "SEND_BODY",
        State::SendBodyIsFinal => "SEND_BODY_IS_FINAL",
        State::EndStream => "END_STREAM",
    }
}

fn body_state_name(state: ReqBodyState) -> &'static str {
    match state {
        ReqBodyState::None => "NONE",
        ReqBodyState::OpenBeforeFirstFrame => "OPEN_BEFORE_FIRST_FRAME",
        ReqBodyState::Open => "OPEN",
        ReqBodyState::CloseQueued => "CLOSE_QUEUED",
        ReqBodyState::CloseDelivered => "CLOSE_DELIVERED",
    }
}
