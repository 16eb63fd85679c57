use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Request, Response};
use indexmap::IndexSet;

use codec::{FramedRead, FramedWrite, RecvError, UserError};
use error::Reason;
use frame::{self, Frame, StreamId};
use proto::ping_pong::PingPong;
use proto::settings::Settings;
use proto::streams::{Action, Streams};
use proto::{Config, Outbox, DEFAULT_INITIAL_WINDOW_SIZE};
use server::{Service, Timer, Transport};

const TIMERS: [Timer; 3] = [Timer::Idle, Timer::Write, Timer::Shutdown];

/// An HTTP/2 server connection.
///
/// A single-threaded, cooperative actor: the host event loop feeds it
/// bytes (`on_read`), write completions (`on_write_complete`) and timer
/// fires (`on_timer`); it calls back into the host through the
/// [`Transport`] it writes to and the [`Service`] that produces
/// responses. No entry point blocks.
pub struct Connection<T, S> {
    inner: Inner,
    transport: T,
    service: S,

    /// Mirror of the timers currently linked at the transport.
    timers_armed: [Option<u64>; 3],

    reads_paused: bool,
}

/// Protocol state, split from the transport and service so callbacks
/// can borrow it wholesale.
struct Inner {
    config: Config,
    phase: Phase,

    reader: FramedRead,
    writer: FramedWrite,

    read_buf: BytesMut,

    /// Staging buffer; control frames land here directly.
    write_buf: BytesMut,

    /// The buffer currently owned by the socket. At most one at a time.
    write_buf_in_flight: Option<Bytes>,

    streams: Streams,
    settings: Settings,
    ping_pong: PingPong,

    /// Application follow-ups queued during frame dispatch.
    actions: VecDeque<Action>,

    /// Paths already promised on this connection, bounded FIFO.
    pushed_paths: IndexSet<String>,

    goaway_sent: bool,
    second_goaway_sent: bool,

    /// Close the socket once the write buffers drain.
    close_after_flush: bool,

    /// Tear down without flushing (bad preface, I/O error class).
    want_close_now: bool,

    peer_goaway: bool,
    read_closed: bool,

    /// Desired timer state; synced to the transport after each event.
    timer_want: [Option<u64>; 3],

    /// Force a re-link even when the interval is unchanged.
    timer_touch: [bool; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    HalfClosed,
    IsClosing,
}

/// The connection surface handed to [`Service`] callbacks.
///
/// Everything here stages protocol work; frames written through it go
/// out with the next flush.
pub struct Ops<'a> {
    inner: &'a mut Inner,
}

/// Snapshot of the connection for logging and assertions.
#[derive(Debug, Clone)]
pub struct DebugState {
    pub phase: &'static str,
    pub conn_recv_window: i32,
    pub conn_send_window: i32,
    pub pull_max_open: u32,
    pub pull_max_processed: u32,
    pub push_max_open: u32,
    pub pull_live: usize,
    pub push_live: usize,
    pub half_closed: usize,
    pub blocked_by_server: usize,
    pub tunnels: usize,
    pub streaming: usize,
    pub early_data_blocked: usize,
    pub pending_reqs: Vec<u32>,
    pub goaway_sent: bool,
    pub local_settings_acked: bool,
    pub received_any_request: bool,
    pub is_chromium_dependency_tree: bool,
    pub scheduler_consistent: bool,
    pub write_in_flight: bool,
    pub buffered_output: usize,
    pub streams: Vec<StreamDebug>,
}

#[derive(Debug, Clone)]
pub struct StreamDebug {
    pub id: u32,
    pub state: &'static str,
    pub body_state: &'static str,
    pub send_window: i32,
    pub recv_window: i32,
    pub weight: u16,
    pub parent: Option<u32>,
    pub queued: usize,
    pub dispatched: bool,
    pub blocked_by_server: bool,
}

// ===== impl Connection =====

impl<T, S> Connection<T, S>
where
    T: Transport,
    S: Service,
{
    pub(crate) fn new(transport: T, service: S, config: Config) -> Connection<T, S> {
        let mut inner = Inner {
            reader: FramedRead::new(config.max_header_block_size),
            writer: FramedWrite::new(),
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            write_buf_in_flight: None,
            streams: Streams::new(&config),
            settings: Settings::new(),
            ping_pong: PingPong::new(),
            actions: VecDeque::new(),
            pushed_paths: IndexSet::new(),
            phase: Phase::Open,
            goaway_sent: false,
            second_goaway_sent: false,
            close_after_flush: false,
            want_close_now: false,
            peer_goaway: false,
            read_closed: false,
            timer_want: [None; 3],
            timer_touch: [false; 3],
            config: config,
        };

        inner.send_preface();

        let mut conn = Connection {
            inner: inner,
            transport: transport,
            service: service,
            timers_armed: [None; 3],
            reads_paused: false,
        };

        conn.after_event();
        conn
    }

    /// Bytes arrived from the socket.
    pub fn on_read(&mut self, data: &[u8]) {
        if self.inner.phase == Phase::IsClosing || self.inner.read_closed {
            return;
        }

        trace!("on_read; len={}", data.len());
        self.inner.timer_touch[Timer::Idle.index()] = true;
        self.inner.read_buf.extend_from_slice(data);
        self.inner.process_reads();
        self.drain();
        self.after_event();
    }

    /// The peer closed its write side.
    pub fn on_read_closed(&mut self) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        trace!("read side closed by peer");
        self.inner.read_closed = true;

        if !self.inner.streams.has_live() {
            self.close_now();
            return;
        }

        if self.inner.phase == Phase::Open {
            self.inner.phase = Phase::HalfClosed;
        }

        self.after_event();
    }

    /// The write handed to [`Transport::write`] finished.
    pub fn on_write_complete(&mut self) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        trace!("write complete");
        self.inner.write_buf_in_flight = None;
        self.inner.timer_want[Timer::Write.index()] = None;

        for id in self.inner.streams.take_proceeds() {
            let mut ops = Ops {
                inner: &mut self.inner,
            };
            self.service.proceed_send(&mut ops, id);
        }

        self.drain();
        self.after_event();
    }

    /// A timer armed via [`Transport::set_timer`] fired.
    pub fn on_timer(&mut self, timer: Timer) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        debug!("timer fired; timer={:?}", timer);
        self.timers_armed[timer.index()] = None;
        self.inner.timer_want[timer.index()] = None;

        match timer {
            Timer::Idle => {
                if self.inner.write_buf_in_flight.is_some() {
                    // A write has been stuck for the whole quiet period.
                    self.close_now();
                    return;
                }

                self.inner
                    .send_goaway(Reason::NO_ERROR, "idle timeout");
                self.inner.close_after_flush = true;
            }
            Timer::Write => {
                self.close_now();
                return;
            }
            Timer::Shutdown => {
                if !self.inner.second_goaway_sent {
                    // The precise cutoff is now known to be stable.
                    let last = self.inner.streams.pull_max_open();
                    let frame = frame::GoAway::new(last, Reason::NO_ERROR);
                    self.inner.buffer_frame(frame.into());
                    self.inner.goaway_sent = true;
                    self.inner.second_goaway_sent = true;
                    self.inner.streams.set_discard_above(last);

                    if self.inner.phase == Phase::Open {
                        self.inner.phase = Phase::HalfClosed;
                    }

                    if self.inner.config.graceful_shutdown_timeout_ms > 0 {
                        let idx = Timer::Shutdown.index();
                        self.inner.timer_want[idx] =
                            Some(self.inner.config.graceful_shutdown_timeout_ms);
                        self.inner.timer_touch[idx] = true;
                    }
                } else {
                    debug!("graceful shutdown timeout; forcing close");
                    self.close_now();
                    return;
                }
            }
        }

        self.drain();
        self.after_event();
    }

    /// Host-requested graceful shutdown.
    pub fn close_idle_connection(&mut self) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        self.inner.begin_graceful_shutdown();
        self.after_event();
    }

    /// The TLS layer is replaying early data; park requests until
    /// `early_data_done`.
    pub fn set_early_data(&mut self) {
        self.inner.streams.set_early_data();
    }

    /// The TLS handshake completed; dispatch parked requests.
    pub fn early_data_done(&mut self) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        self.inner.streams.release_early_data();
        self.drain();
        self.after_event();
    }

    pub fn foreach_request<F>(&mut self, f: F)
    where
        F: FnMut(StreamId, &Request<()>),
    {
        self.inner.streams.foreach_request(f);
    }

    /// Host entry for deferred response production: run `f` against the
    /// connection, then pump the resulting work (deliveries, dispatches,
    /// writes) exactly like any other event.
    pub fn perform<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Ops),
    {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        {
            let mut ops = Ops {
                inner: &mut self.inner,
            };
            f(&mut ops);
        }

        self.drain();
        self.after_event();
    }

    pub fn debug_state(&self) -> DebugState {
        self.inner.debug_state()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.phase == Phase::IsClosing
    }

    // ===== private =====

    /// Run queued application callbacks and dispatch pending requests.
    /// Never re-entered from inside a service callback.
    fn drain(&mut self) {
        loop {
            if let Some(action) = self.inner.actions.pop_front() {
                match action {
                    Action::DecideStreaming(id) => {
                        let wants = {
                            let mut ops = Ops {
                                inner: &mut self.inner,
                            };
                            self.service.stream_request_body(&mut ops, id)
                        };
                        self.inner.decide_streaming(id, wants);
                    }
                    Action::Deliver(id) => self.deliver(id),
                    Action::NotifyReset(id, reason) => {
                        let mut ops = Ops {
                            inner: &mut self.inner,
                        };
                        self.service.reset(&mut ops, id, reason);
                    }
                }

                continue;
            }

            if self.inner.close_after_flush
                || self.inner.want_close_now
                || self.inner.phase == Phase::IsClosing
            {
                break;
            }

            match self.inner.streams.start_dispatch() {
                Some(id) => {
                    {
                        let mut ops = Ops {
                            inner: &mut self.inner,
                        };
                        self.service.process_request(&mut ops, id);
                    }

                    // A streamed request may already hold buffered body.
                    if self.inner.streams.wants_delivery(id) {
                        self.inner.actions.push_back(Action::Deliver(id));
                    }
                }
                None => break,
            }
        }
    }

    fn deliver(&mut self, id: StreamId) {
        let (chunk, is_end_stream) = match self.inner.streams.begin_delivery(id) {
            Some(delivery) => delivery,
            None => return,
        };

        trace!(
            "delivering body chunk; id={:?} len={} eos={}",
            id,
            chunk.len(),
            is_end_stream
        );

        let res = {
            let mut ops = Ops {
                inner: &mut self.inner,
            };
            self.service.write_req(&mut ops, id, chunk, is_end_stream)
        };

        if res.is_err() {
            debug!("write_req failed; resetting stream {:?}", id);
            self.inner.reset_stream(id, Reason::INTERNAL_ERROR);
        }
    }

    /// Stage DATA, flip the write buffer, and decide whether the
    /// connection is done.
    fn after_event(&mut self) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        if self.inner.want_close_now {
            self.close_now();
            return;
        }

        self.inner.prepare_write();

        if self.inner.write_buf_in_flight.is_none() && !self.inner.write_buf.is_empty() {
            let buf = self.inner.write_buf.split().freeze();
            trace!("flipping write buffer; len={}", buf.len());
            self.inner.write_buf_in_flight = Some(buf.clone());
            self.transport.write(buf);

            let idx = Timer::Write.index();
            self.inner.timer_want[idx] = Some(self.inner.config.write_timeout_ms);
            self.inner.timer_touch[idx] = true;
        }

        if self.inner.write_buf_in_flight.is_none() {
            if self.inner.close_after_flush {
                self.close_now();
                return;
            }

            // A half-closed connection lingers until the shutdown
            // sequence has told the client the precise cutoff (or the
            // peer is gone anyway).
            let peer_done = self.inner.second_goaway_sent
                || self.inner.read_closed
                || self.inner.peer_goaway;

            if self.inner.phase == Phase::HalfClosed
                && !self.inner.streams.has_live()
                && peer_done
            {
                self.close_now();
                return;
            }
        }

        self.inner.update_idle_want();
        self.sync_transport();
    }

    /// One-path teardown: notify the application, release timers, close
    /// the socket, and assert every counter drained.
    fn close_now(&mut self) {
        if self.inner.phase == Phase::IsClosing {
            return;
        }

        debug!("closing connection now");
        self.inner.streams.shutdown(&mut self.inner.actions);

        while let Some(action) = self.inner.actions.pop_front() {
            if let Action::NotifyReset(id, reason) = action {
                let mut ops = Ops {
                    inner: &mut self.inner,
                };
                self.service.reset(&mut ops, id, reason);
            }
        }

        self.inner.phase = Phase::IsClosing;
        self.inner.write_buf_in_flight = None;
        self.inner.timer_want = [None; 3];
        self.sync_transport();
        self.transport.close();

        debug_assert!(self.inner.streams.counts().all_zero());
    }

    /// Reconcile timers and read backpressure with the transport.
    fn sync_transport(&mut self) {
        for &timer in TIMERS.iter() {
            let idx = timer.index();
            let want = self.inner.timer_want[idx];
            let touch = self.inner.timer_touch[idx];
            self.inner.timer_touch[idx] = false;

            match (self.timers_armed[idx], want) {
                (None, None) => {}
                (Some(_), None) => {
                    self.transport.clear_timer(timer);
                    self.timers_armed[idx] = None;
                }
                (None, Some(ms)) => {
                    self.transport.set_timer(timer, ms);
                    self.timers_armed[idx] = Some(ms);
                }
                (Some(prev), Some(ms)) => {
                    if touch || prev != ms {
                        self.transport.set_timer(timer, ms);
                        self.timers_armed[idx] = Some(ms);
                    }
                }
            }
        }

        let buffered = self.inner.write_buf.len()
            + self
                .inner
                .write_buf_in_flight
                .as_ref()
                .map(|b| b.len())
                .unwrap_or(0);
        let want_paused =
            buffered >= self.inner.config.soft_output_max && self.inner.phase != Phase::IsClosing;

        if want_paused && !self.reads_paused {
            trace!("pausing reads; buffered={}", buffered);
            self.transport.pause_read();
            self.reads_paused = true;
        } else if !want_paused && self.reads_paused {
            trace!("resuming reads");
            self.transport.resume_read();
            self.reads_paused = false;
        }
    }
}

// ===== impl Inner =====

impl Inner {
    fn buffer_frame(&mut self, frame: Frame) {
        let mut out = Outbox {
            buf: &mut self.write_buf,
            enc: &mut self.writer,
        };
        out.frame(frame);
    }

    /// The server preface: a SETTINGS frame, then a connection-level
    /// WINDOW_UPDATE growing the receive window past the default.
    fn send_preface(&mut self) {
        let mut settings = frame::Settings::new();
        settings.set_max_concurrent_streams(Some(self.config.max_concurrent_pull_streams as u32));
        self.buffer_frame(settings.into());
        self.settings.mark_local_sent();

        if self.config.connection_window_size > DEFAULT_INITIAL_WINDOW_SIZE {
            let delta = self.config.connection_window_size - DEFAULT_INITIAL_WINDOW_SIZE;
            self.buffer_frame(frame::WindowUpdate::new(StreamId::ZERO, delta).into());
        }
    }

    fn process_reads(&mut self) {
        loop {
            if self.close_after_flush || self.want_close_now || self.phase == Phase::IsClosing {
                return;
            }

            let frame = {
                let res = self.reader.recv(&mut self.read_buf);
                match res {
                    Ok(Some(frame)) => frame,
                    Ok(None) => return,
                    Err(e) => {
                        self.handle_recv_error(e);
                        continue;
                    }
                }
            };

            if let Err(e) = self.dispatch_frame(frame) {
                self.handle_recv_error(e);
            }
        }
    }

    fn dispatch_frame(&mut self, frame: Frame) -> Result<(), RecvError> {
        match frame {
            Frame::Headers(frame) => {
                trace!("recv HEADERS; id={:?}", frame.stream_id());
                let mut out = Outbox {
                    buf: &mut self.write_buf,
                    enc: &mut self.writer,
                };
                self.streams.recv_headers(frame, &mut out, &mut self.actions)
            }
            Frame::Data(frame) => {
                trace!("recv DATA; id={:?} len={}", frame.stream_id(), frame.flow_len());
                let mut out = Outbox {
                    buf: &mut self.write_buf,
                    enc: &mut self.writer,
                };
                self.streams.recv_data(frame, &mut out, &mut self.actions)
            }
            Frame::Priority(frame) => {
                trace!("recv PRIORITY; id={:?}", frame.stream_id());
                self.streams.recv_priority(frame)
            }
            Frame::Reset(frame) => {
                trace!("recv RST_STREAM; id={:?}", frame.stream_id());
                self.streams.recv_reset(frame, &mut self.actions)
            }
            Frame::Settings(frame) => self.recv_settings(frame),
            Frame::Ping(frame) => {
                trace!("recv PING");
                self.ping_pong.recv_ping(frame);
                Ok(())
            }
            Frame::GoAway(frame) => {
                debug!(
                    "recv GOAWAY; last={:?} code={:?}",
                    frame.last_stream_id(),
                    frame.reason()
                );
                self.peer_goaway = true;

                if !self.streams.has_live() {
                    self.begin_graceful_shutdown();
                }

                Ok(())
            }
            Frame::WindowUpdate(frame) => {
                trace!(
                    "recv WINDOW_UPDATE; id={:?} incr={}",
                    frame.stream_id(),
                    frame.size_increment()
                );
                self.streams.recv_window_update(frame)
            }
            Frame::PushPromise(_) => {
                // The parser rejects client PUSH_PROMISE before frame
                // assembly.
                unreachable!("PUSH_PROMISE is never parsed server-side")
            }
        }
    }

    fn recv_settings(&mut self, frame: frame::Settings) -> Result<(), RecvError> {
        trace!("recv SETTINGS; ack={}", frame.is_ack());

        let applied = {
            let mut out = Outbox {
                buf: &mut self.write_buf,
                enc: &mut self.writer,
            };
            self.settings.recv_settings(frame, &mut out)?
        };

        if let Some(max) = applied.max_frame_size {
            self.writer.set_max_frame_size(max as usize);
        }

        if let Some(init) = applied.initial_window_size {
            self.streams
                .apply_initial_window(init)
                .map_err(RecvError::Connection)?;
        }

        Ok(())
    }

    fn handle_recv_error(&mut self, err: RecvError) {
        match err {
            RecvError::Connection(reason) => {
                self.send_goaway(reason, "");
                self.close_after_flush = true;
            }
            RecvError::Stream { id, reason } => {
                let mut out = Outbox {
                    buf: &mut self.write_buf,
                    enc: &mut self.writer,
                };
                self.streams
                    .stream_error(id, reason, &mut out, &mut self.actions);
            }
            RecvError::CloseImmediately => {
                debug!("closing immediately");
                self.want_close_now = true;
            }
        }
    }

    fn send_goaway(&mut self, reason: Reason, debug_data: &'static str) {
        if self.goaway_sent {
            return;
        }

        debug!("sending GOAWAY; reason={:?}", reason);
        let last = self.streams.pull_max_open();
        self.buffer_frame(frame::GoAway::with_debug_data(last, reason, debug_data).into());
        self.goaway_sent = true;

        if self.phase == Phase::Open {
            self.phase = Phase::HalfClosed;
        }
    }

    fn begin_graceful_shutdown(&mut self) {
        if self.goaway_sent {
            return;
        }

        info!("starting graceful shutdown");
        self.buffer_frame(
            frame::GoAway::with_debug_data(StreamId::MAX, Reason::NO_ERROR, "graceful shutdown")
                .into(),
        );
        self.goaway_sent = true;

        if self.phase == Phase::Open {
            self.phase = Phase::HalfClosed;
        }

        let idx = Timer::Shutdown.index();
        self.timer_want[idx] = Some(self.config.second_goaway_delay_ms);
        self.timer_touch[idx] = true;
    }

    fn decide_streaming(&mut self, id: StreamId, wants: bool) {
        let mut out = Outbox {
            buf: &mut self.write_buf,
            enc: &mut self.writer,
        };

        if self.streams.decide_streaming(id, wants, &mut out) {
            trace!("request body streaming enabled; id={:?}", id);
        }
    }

    fn reset_stream(&mut self, id: StreamId, reason: Reason) {
        let mut out = Outbox {
            buf: &mut self.write_buf,
            enc: &mut self.writer,
        };
        self.streams.send_reset(id, reason, &mut out);
    }

    /// Stage everything that is ready to go: pongs first, then
    /// scheduler-selected DATA up to the output budget.
    fn prepare_write(&mut self) {
        {
            let mut out = Outbox {
                buf: &mut self.write_buf,
                enc: &mut self.writer,
            };
            self.ping_pong.send_pending_pongs(&mut out);
        }

        if self.write_buf_in_flight.is_none() && !self.close_after_flush {
            let budget = self.config.soft_output_max;
            let mut out = Outbox {
                buf: &mut self.write_buf,
                enc: &mut self.writer,
            };
            self.streams.produce(&mut out, budget, &mut self.actions);
        }
    }

    fn update_idle_want(&mut self) {
        let eligible = self.write_buf_in_flight.is_none()
            && self.streams.counts().blocked_by_server == 0
            && !self.streams.in_early_data()
            && !self.close_after_flush
            && self.phase != Phase::IsClosing;

        self.timer_want[Timer::Idle.index()] = if eligible {
            Some(self.config.idle_timeout_ms)
        } else {
            None
        };
    }

    fn push_path(&mut self, src_id: StreamId, path: &str, is_critical: bool) -> bool {
        if self.phase != Phase::Open || self.goaway_sent || self.peer_goaway {
            return false;
        }

        if !self.config.push_enabled || !self.settings.peer().enable_push {
            return false;
        }

        let peer_cap = self
            .settings
            .peer()
            .max_concurrent_streams
            .unwrap_or(100) as usize;

        if self.streams.counts().push_live >= peer_cap {
            return false;
        }

        if self.pushed_paths.contains(path) {
            return false;
        }

        let pushed = {
            let mut out = Outbox {
                buf: &mut self.write_buf,
                enc: &mut self.writer,
            };
            self.streams.open_push(src_id, path, is_critical, &mut out)
        };

        match pushed {
            Some(_) => {
                if self.pushed_paths.len() >= self.config.max_pushed_paths {
                    self.pushed_paths.shift_remove_index(0);
                }
                self.pushed_paths.insert(path.to_owned());
                true
            }
            None => false,
        }
    }

    fn debug_state(&self) -> DebugState {
        let counts = self.streams.counts();

        DebugState {
            phase: match self.phase {
                Phase::Open => "OPEN",
                Phase::HalfClosed => "HALF_CLOSED",
                Phase::IsClosing => "IS_CLOSING",
            },
            conn_recv_window: self.streams.conn_recv_window(),
            conn_send_window: self.streams.conn_send_window(),
            pull_max_open: self.streams.pull_max_open().into(),
            pull_max_processed: self.streams.pull_max_processed().into(),
            push_max_open: self.streams.push_max_open().into(),
            pull_live: counts.pull_live,
            push_live: counts.push_live,
            half_closed: counts.half_closed,
            blocked_by_server: counts.blocked_by_server,
            tunnels: counts.tunnels,
            streaming: counts.streaming,
            early_data_blocked: counts.early_data_blocked,
            pending_reqs: self
                .streams
                .pending_ids()
                .into_iter()
                .map(u32::from)
                .collect(),
            goaway_sent: self.goaway_sent,
            local_settings_acked: self.settings.local_acked(),
            received_any_request: self.streams.received_any_request(),
            is_chromium_dependency_tree: self.streams.chromium_shape(),
            scheduler_consistent: self.streams.scheduler_consistent(),
            write_in_flight: self.write_buf_in_flight.is_some(),
            buffered_output: self.write_buf.len(),
            streams: self.streams.debug_streams(),
        }
    }
}

// ===== impl Ops =====

impl<'a> Ops<'a> {
    /// The stream's request. Present from dispatch until close.
    pub fn request(&self, id: StreamId) -> Option<&Request<()>> {
        self.inner.streams.request(id)
    }

    /// Take the buffered request body. `None` for streamed requests.
    pub fn take_body(&mut self, id: StreamId) -> Option<Bytes> {
        self.inner.streams.take_body(id)
    }

    /// Take the request trailers, if the peer sent any.
    pub fn take_trailers(&mut self, id: StreamId) -> Option<HeaderMap> {
        self.inner.streams.take_trailers(id)
    }

    /// Stage the response headers. With `end_of_stream` the response is
    /// complete and the stream closes.
    pub fn send_response(
        &mut self,
        id: StreamId,
        response: Response<()>,
        end_of_stream: bool,
    ) -> Result<(), UserError> {
        let (parts, _) = response.into_parts();
        let inner = &mut *self.inner;
        let mut out = Outbox {
            buf: &mut inner.write_buf,
            enc: &mut inner.writer,
        };
        inner
            .streams
            .send_response(id, parts, end_of_stream, &mut out, &mut inner.actions)
    }

    /// Queue response body bytes. Egress is scheduled by priority and
    /// bounded by flow control.
    pub fn send_data(
        &mut self,
        id: StreamId,
        data: Bytes,
        end_of_stream: bool,
    ) -> Result<(), UserError> {
        self.inner.streams.send_data(id, data, end_of_stream)
    }

    /// Queue trailers; they are flattened after the final DATA frame.
    pub fn send_trailers(&mut self, id: StreamId, trailers: HeaderMap) -> Result<(), UserError> {
        self.inner.streams.send_trailers(id, trailers)
    }

    pub fn send_reset(&mut self, id: StreamId, reason: Reason) {
        self.inner.reset_stream(id, reason);
    }

    /// Acknowledge the chunk delivered via `write_req`; its bytes are
    /// credited back to the receive window, and the next chunk (if
    /// buffered) is delivered before the current event returns.
    pub fn consume_request_body(&mut self, id: StreamId) {
        let more = {
            let inner = &mut *self.inner;
            let mut out = Outbox {
                buf: &mut inner.write_buf,
                enc: &mut inner.writer,
            };
            inner.streams.consume_request_body(id, &mut out)
        };

        if more {
            self.inner.actions.push_back(Action::Deliver(id));
        }
    }

    /// Open a server push for `path` referencing the given request
    /// stream. A no-op (returning false) when push is disabled, limits
    /// are hit, or the path was already pushed on this connection.
    pub fn push_path(&mut self, src_id: StreamId, path: &str, is_critical: bool) -> bool {
        self.inner.push_path(src_id, path, is_critical)
    }

    /// Host-initiated reprioritization, e.g. from a response priority
    /// header. `weight` is clamped to `[1, 256]`.
    pub fn reprioritize(&mut self, id: StreamId, weight: u16) {
        let weight = ::std::cmp::max(1, ::std::cmp::min(weight, 256));
        self.inner.streams.host_reprioritize(id, weight);
    }

    pub fn foreach_request<F>(&mut self, f: F)
    where
        F: FnMut(StreamId, &Request<()>),
    {
        self.inner.streams.foreach_request(f);
    }

    pub fn request_id(&self, id: StreamId) -> u32 {
        id.into()
    }

    pub fn debug_state(&self) -> DebugState {
        self.inner.debug_state()
    }
}

impl<'a> ::std::fmt::Debug for Ops<'a> {
    fn fmt(&self, fmt: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        fmt.debug_struct("Ops").finish()
    }
}
