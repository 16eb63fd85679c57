//! Shared test harness: a capturing transport, a scripted service, and
//! a `Srv` driver gluing them to a `Connection`.

#![allow(dead_code)]

pub mod frames;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use bytes::Bytes;
use h2d::{Builder, Connection, Ops, Reason, Service, StreamId, Timer, Transport};
use http::Response;

use self::frames::{Mirror, SrvFrame};

// ===== transport =====

#[derive(Default)]
pub struct TransportState {
    /// Completed payloads of `Transport::write`, in order.
    pub writes: Vec<Bytes>,
    pub closed: bool,
    pub paused: bool,
    /// Currently armed timers, by `Timer::index()`-like slot.
    pub timers: HashMap<u8, u64>,
}

#[derive(Clone)]
pub struct MockTransport {
    pub state: Rc<RefCell<TransportState>>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport {
            state: Rc::new(RefCell::new(TransportState::default())),
        }
    }
}

fn timer_slot(timer: Timer) -> u8 {
    match timer {
        Timer::Idle => 0,
        Timer::Write => 1,
        Timer::Shutdown => 2,
    }
}

impl Transport for MockTransport {
    fn write(&mut self, buf: Bytes) {
        self.state.borrow_mut().writes.push(buf);
    }

    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
    }

    fn pause_read(&mut self) {
        self.state.borrow_mut().paused = true;
    }

    fn resume_read(&mut self) {
        self.state.borrow_mut().paused = false;
    }

    fn set_timer(&mut self, timer: Timer, ms: u64) {
        self.state.borrow_mut().timers.insert(timer_slot(timer), ms);
    }

    fn clear_timer(&mut self, timer: Timer) {
        self.state.borrow_mut().timers.remove(&timer_slot(timer));
    }
}

// ===== service =====

/// What the scripted service does when a request is dispatched.
#[derive(Clone)]
pub enum Respond {
    /// Stay silent; the test responds later via `Connection::perform`.
    Manual,

    /// Immediately respond with a status and no body.
    Status(u16),

    /// Respond with a status and a single-frame body.
    Body(u16, Vec<u8>),

    /// Respond with headers, then feed one chunk per `proceed_send`.
    Chunked(u16, Vec<Vec<u8>>),
}

pub struct ServiceState {
    pub respond: Respond,

    /// Answer for `stream_request_body`.
    pub stream_bodies: bool,

    /// Ack every delivered chunk at once.
    pub auto_consume: bool,

    /// Make `write_req` fail.
    pub write_req_fails: bool,

    /// Respond with this status once the streamed body completes.
    pub respond_on_body_end: Option<u16>,

    // ===== observations =====
    pub requests: Vec<(u32, String, String)>,
    pub bodies: Vec<(u32, Vec<u8>)>,
    pub chunks: Vec<(u32, Vec<u8>, bool)>,
    pub proceeds: Vec<u32>,
    pub resets: Vec<(u32, u32)>,

    /// Interleaved event log for ordering assertions.
    pub log: Vec<String>,

    chunk_queues: HashMap<u32, VecDeque<Vec<u8>>>,
}

impl Default for ServiceState {
    fn default() -> ServiceState {
        ServiceState {
            respond: Respond::Status(200),
            stream_bodies: false,
            auto_consume: true,
            write_req_fails: false,
            respond_on_body_end: None,
            requests: Vec::new(),
            bodies: Vec::new(),
            chunks: Vec::new(),
            proceeds: Vec::new(),
            resets: Vec::new(),
            log: Vec::new(),
            chunk_queues: HashMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct MockService {
    pub state: Rc<RefCell<ServiceState>>,
}

impl MockService {
    pub fn new() -> MockService {
        MockService {
            state: Rc::new(RefCell::new(ServiceState::default())),
        }
    }
}

fn response(status: u16) -> Response<()> {
    Response::builder().status(status).body(()).unwrap()
}

impl Service for MockService {
    fn process_request(&mut self, conn: &mut Ops, id: StreamId) {
        let sid = conn.request_id(id);

        let respond = {
            let mut state = self.state.borrow_mut();
            let (method, path) = {
                let req = conn.request(id).expect("dispatched request");
                (
                    req.method().to_string(),
                    req.uri()
                        .path_and_query()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| req.uri().to_string()),
                )
            };

            state.log.push(format!("request:{}", sid));
            state.requests.push((sid, method, path));

            if let Some(body) = conn.take_body(id) {
                state.bodies.push((sid, body.to_vec()));
            }

            state.respond.clone()
        };

        match respond {
            Respond::Manual => {}
            Respond::Status(status) => {
                conn.send_response(id, response(status), true).unwrap();
            }
            Respond::Body(status, body) => {
                conn.send_response(id, response(status), false).unwrap();
                conn.send_data(id, Bytes::from(body), true).unwrap();
            }
            Respond::Chunked(status, chunks) => {
                conn.send_response(id, response(status), false).unwrap();

                let mut queue: VecDeque<Vec<u8>> = chunks.into_iter().collect();
                let first = queue.pop_front().unwrap_or_default();
                let last = queue.is_empty();
                self.state.borrow_mut().chunk_queues.insert(sid, queue);
                conn.send_data(id, Bytes::from(first), last).unwrap();
            }
        }
    }

    fn stream_request_body(&mut self, _conn: &mut Ops, id: StreamId) -> bool {
        let state = self.state.borrow();
        let _ = id;
        state.stream_bodies
    }

    fn write_req(
        &mut self,
        conn: &mut Ops,
        id: StreamId,
        chunk: Bytes,
        is_end_stream: bool,
    ) -> Result<(), ()> {
        let sid = conn.request_id(id);
        let (fails, consume, respond_end) = {
            let mut state = self.state.borrow_mut();
            state.log.push(format!("chunk:{}:{}", sid, is_end_stream));
            state.chunks.push((sid, chunk.to_vec(), is_end_stream));
            (
                state.write_req_fails,
                state.auto_consume,
                state.respond_on_body_end,
            )
        };

        if fails {
            return Err(());
        }

        if is_end_stream {
            if let Some(status) = respond_end {
                conn.send_response(id, response(status), true).unwrap();
            }
        } else if consume {
            conn.consume_request_body(id);
        }

        Ok(())
    }

    fn proceed_send(&mut self, conn: &mut Ops, id: StreamId) {
        let sid = conn.request_id(id);
        let next = {
            let mut state = self.state.borrow_mut();
            state.log.push(format!("proceed:{}", sid));
            state.proceeds.push(sid);

            match state.chunk_queues.get_mut(&sid) {
                Some(queue) => queue.pop_front().map(|chunk| (chunk, queue.is_empty())),
                None => None,
            }
        };

        if let Some((chunk, last)) = next {
            conn.send_data(id, Bytes::from(chunk), last).unwrap();
        }
    }

    fn reset(&mut self, _conn: &mut Ops, id: StreamId, reason: Reason) {
        let mut state = self.state.borrow_mut();
        let sid: u32 = id.into();
        state.log.push(format!("reset:{}", sid));
        state.resets.push((sid, reason.into()));
    }
}

// ===== driver =====

pub struct Srv {
    pub conn: Connection<MockTransport, MockService>,
    pub transport: Rc<RefCell<TransportState>>,
    pub service: Rc<RefCell<ServiceState>>,
    pub enc: hpack::Encoder<'static>,
    mirror: Mirror,
}

impl Srv {
    pub fn new() -> Srv {
        Srv::with_builder(&Builder::new())
    }

    pub fn with_builder(builder: &Builder) -> Srv {
        let _ = env_logger::try_init();

        let transport = MockTransport::new();
        let service = MockService::new();
        let t_state = transport.state.clone();
        let s_state = service.state.clone();

        Srv {
            conn: builder.build(transport, service),
            transport: t_state,
            service: s_state,
            enc: hpack::Encoder::new(),
            mirror: Mirror::new(),
        }
    }

    /// Complete outstanding writes until the connection has nothing
    /// staged.
    pub fn pump(&mut self) {
        while self.conn.debug_state().write_in_flight {
            self.conn.on_write_complete();
        }
    }

    pub fn recv(&mut self, bytes: &[u8]) {
        self.conn.on_read(bytes);
        self.pump();
    }

    /// Everything the server wrote since the last call, decoded.
    pub fn written(&mut self) -> Vec<SrvFrame> {
        let writes: Vec<Bytes> = self.transport.borrow_mut().writes.drain(..).collect();
        let mut all = Vec::new();
        for buf in writes {
            all.extend(self.mirror.parse_all(&buf));
        }
        all
    }

    /// Consume the server preface and run the client-side handshake:
    /// preface bytes plus an empty SETTINGS frame.
    pub fn handshake(&mut self) -> Vec<SrvFrame> {
        self.pump();
        let mut frames = self.written();

        let mut client = Vec::new();
        client.extend_from_slice(frames::PREFACE);
        client.extend_from_slice(&frames::settings(&[]));
        self.recv(&client);

        frames.extend(self.written());
        frames
    }

    pub fn timer_armed(&self, timer: Timer) -> Option<u64> {
        self.transport.borrow().timers.get(&timer_slot(timer)).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.borrow().closed
    }

    /// Frames of a simple GET on the given stream.
    pub fn get(&mut self, stream_id: u32, path: &str) -> Vec<u8> {
        frames::headers(
            &mut self.enc,
            stream_id,
            &[
                (":method", "GET"),
                (":scheme", "https"),
                (":authority", "example.com"),
                (":path", path),
            ],
            frames::END_HEADERS | frames::END_STREAM,
        )
    }

    pub fn post(&mut self, stream_id: u32, path: &str, extra: &[(&str, &str)]) -> Vec<u8> {
        let mut fields = vec![
            (":method", "POST"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", path),
        ];
        fields.extend_from_slice(extra);
        frames::headers(&mut self.enc, stream_id, &fields, frames::END_HEADERS)
    }
}

/// Assert helpers over decoded server frames.
pub fn goaway_code(frames: &[SrvFrame]) -> Option<u32> {
    frames.iter().rev().filter_map(|f| match *f {
        SrvFrame::GoAway { code, .. } => Some(code),
        _ => None,
    }).next()
}

pub fn reset_code(frames: &[SrvFrame], stream: u32) -> Option<u32> {
    frames.iter().filter_map(|f| match *f {
        SrvFrame::Reset { stream_id, code } if stream_id == stream => Some(code),
        _ => None,
    }).next()
}

pub fn data_bytes(frames: &[SrvFrame], stream: u32) -> usize {
    frames.iter().map(|f| match *f {
        SrvFrame::Data { stream_id, len, .. } if stream_id == stream => len,
        _ => 0,
    }).sum()
}
