use std::convert::TryFrom;

use bytes::Bytes;
use http::{uri, HeaderMap, Method, Request, Uri, Version};

use codec::RecvError;
use error::Reason;
use frame::{self, StreamId};
use proto::{self, Config, Connection, Ops};

/// The socket-and-timer surface the host event loop provides.
///
/// All calls are non-blocking notifications; completions come back via
/// the corresponding `Connection::on_*` entry points.
pub trait Transport {
    /// Write a buffer to the socket. At most one write is outstanding;
    /// the host calls `Connection::on_write_complete` when it is done.
    fn write(&mut self, buf: Bytes);

    /// Close the socket immediately.
    fn close(&mut self);

    /// Stop delivering reads (backpressure).
    fn pause_read(&mut self);

    fn resume_read(&mut self);

    /// (Re-)arm a timer. Replaces any previous link for the same timer;
    /// the host calls `Connection::on_timer` when it fires.
    fn set_timer(&mut self, timer: Timer, ms: u64);

    fn clear_timer(&mut self, timer: Timer);
}

/// The timers a connection keeps with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Maximum quiet period.
    Idle,

    /// A socket write has been outstanding too long.
    Write,

    /// Graceful-shutdown sequencing (second GOAWAY, forced close).
    Shutdown,
}

impl Timer {
    pub(crate) fn index(self) -> usize {
        match self {
            Timer::Idle => 0,
            Timer::Write => 1,
            Timer::Shutdown => 2,
        }
    }
}

/// The application the connection dispatches requests to.
///
/// Callbacks are invoked from `Connection::on_*` entry points, never
/// re-entrantly from inside another callback.
pub trait Service {
    /// A fully formed request is ready. The request (and, for buffered
    /// bodies, the entity) is available through `conn`.
    fn process_request(&mut self, conn: &mut Ops, id: StreamId);

    /// Asked once, on the first DATA frame: should this request's body
    /// be handed over chunk by chunk instead of buffered?
    fn stream_request_body(&mut self, _conn: &mut Ops, _id: StreamId) -> bool {
        false
    }

    /// A chunk of a streamed request body. Call
    /// `Ops::consume_request_body` once processed to receive more.
    fn write_req(
        &mut self,
        _conn: &mut Ops,
        _id: StreamId,
        _chunk: Bytes,
        _is_end_stream: bool,
    ) -> Result<(), ()> {
        Err(())
    }

    /// The stream's staged egress flushed; produce more response body.
    fn proceed_send(&mut self, _conn: &mut Ops, _id: StreamId) {}

    /// A dispatched stream was reset (by the peer, or by connection
    /// teardown). The body state is terminal before this is called.
    fn reset(&mut self, _conn: &mut Ops, _id: StreamId, _reason: Reason) {}
}

/// Build a server `Connection`.
#[derive(Debug, Clone)]
pub struct Builder {
    config: Config,
}

impl Default for Builder {
    fn default() -> Builder {
        Builder {
            config: Config {
                idle_timeout_ms: 10_000,
                graceful_shutdown_timeout_ms: 0,
                second_goaway_delay_ms: 1_000,
                write_timeout_ms: 30_000,
                soft_output_max: 32 * 1_024,
                max_header_block_size: 16 * 1_024,
                connection_window_size: 1024 * 1024,
                active_stream_window_size: 2 * 1024 * 1024,
                max_request_entity_size: 64 * 1024 * 1024,
                max_concurrent_pull_streams: 100,
                max_concurrent_requests: 100,
                max_concurrent_streaming_requests: 1,
                max_streams_for_priority: 100,
                closed_stream_priorities: 10,
                push_enabled: true,
                max_pushed_paths: 64,
            },
        }
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Maximum quiet period before the connection is shut down, in
    /// milliseconds.
    pub fn idle_timeout(&mut self, ms: u64) -> &mut Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    /// Grace period after the second GOAWAY before the socket is
    /// force-closed. Zero disables the forced close.
    pub fn graceful_shutdown_timeout(&mut self, ms: u64) -> &mut Self {
        self.config.graceful_shutdown_timeout_ms = ms;
        self
    }

    /// Delay between the initial (max-id) GOAWAY and the second one
    /// carrying the precise cutoff.
    pub fn second_goaway_delay(&mut self, ms: u64) -> &mut Self {
        self.config.second_goaway_delay_ms = ms;
        self
    }

    pub fn write_timeout(&mut self, ms: u64) -> &mut Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Gate on dispatching requests to the application.
    pub fn max_concurrent_requests_per_connection(&mut self, max: usize) -> &mut Self {
        self.config.max_concurrent_requests = max;
        self
    }

    /// Gate on requests entering body-streaming mode.
    pub fn max_concurrent_streaming_requests_per_connection(&mut self, max: usize) -> &mut Self {
        self.config.max_concurrent_streaming_requests = max;
        self
    }

    /// Cap on idle streams tracked for PRIORITY bookkeeping only.
    pub fn max_streams_for_priority(&mut self, max: usize) -> &mut Self {
        self.config.max_streams_for_priority = max;
        self
    }

    /// Per-stream receive window while an upload is actively streamed.
    pub fn active_stream_window_size(&mut self, size: u32) -> &mut Self {
        debug_assert!(size <= proto::MAX_WINDOW_SIZE);
        self.config.active_stream_window_size = size;
        self
    }

    /// Receive-side cap on a request entity.
    pub fn max_request_entity_size(&mut self, size: u64) -> &mut Self {
        self.config.max_request_entity_size = size;
        self
    }

    /// Connection-level receive window advertised in the preface.
    pub fn connection_window_size(&mut self, size: u32) -> &mut Self {
        debug_assert!(size >= proto::DEFAULT_INITIAL_WINDOW_SIZE);
        debug_assert!(size <= proto::MAX_WINDOW_SIZE);
        self.config.connection_window_size = size;
        self
    }

    /// Advertised SETTINGS_MAX_CONCURRENT_STREAMS.
    pub fn max_concurrent_streams(&mut self, max: u32) -> &mut Self {
        self.config.max_concurrent_pull_streams = max as usize;
        self
    }

    pub fn enable_push(&mut self, enabled: bool) -> &mut Self {
        self.config.push_enabled = enabled;
        self
    }

    /// Bind a connection over the given transport, dispatching to the
    /// given service. The server preface is staged and written
    /// immediately.
    pub fn build<T, S>(&self, transport: T, service: S) -> Connection<T, S>
    where
        T: Transport,
        S: Service,
    {
        Connection::new(transport, service, self.config.clone())
    }
}

// ===== impl Peer =====

/// Server-side request construction from a decoded header block.
pub(crate) struct Peer;

impl Peer {
    pub fn build_request(
        stream_id: StreamId,
        pseudo: frame::Pseudo,
        fields: HeaderMap,
    ) -> Result<Request<()>, RecvError> {
        macro_rules! malformed {
            () => {
                return Err(RecvError::Stream {
                    id: stream_id,
                    reason: Reason::PROTOCOL_ERROR,
                })
            };
        }

        let method = match pseudo.method {
            Some(method) => method,
            None => malformed!(),
        };

        // Specifying :status for a request is malformed.
        if pseudo.status.is_some() {
            malformed!();
        }

        let mut parts = uri::Parts::default();

        match pseudo.authority {
            Some(authority) => match uri::Authority::try_from(&authority[..]) {
                Ok(authority) => parts.authority = Some(authority),
                Err(_) => malformed!(),
            },
            None => malformed!(),
        }

        if method == Method::CONNECT {
            // The :scheme and :path pseudo-header fields MUST be
            // omitted on CONNECT.
            if pseudo.scheme.is_some() || pseudo.path.is_some() {
                malformed!();
            }
        } else {
            match pseudo.scheme {
                Some(scheme) => match uri::Scheme::try_from(&scheme[..]) {
                    Ok(scheme) => parts.scheme = Some(scheme),
                    Err(_) => malformed!(),
                },
                None => malformed!(),
            }

            match pseudo.path {
                Some(ref path) if !path.is_empty() => {
                    match uri::PathAndQuery::try_from(&path[..]) {
                        Ok(path) => parts.path_and_query = Some(path),
                        Err(_) => malformed!(),
                    }
                }
                _ => malformed!(),
            }
        }

        let uri = match Uri::from_parts(parts) {
            Ok(uri) => uri,
            Err(_) => malformed!(),
        };

        let mut request = match Request::builder()
            .method(method)
            .uri(uri)
            .version(Version::HTTP_2)
            .body(())
        {
            Ok(request) => request,
            Err(_) => malformed!(),
        };

        *request.headers_mut() = fields;

        Ok(request)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pseudo(method: Option<&str>, scheme: Option<&str>, authority: Option<&str>, path: Option<&str>) -> frame::Pseudo {
        frame::Pseudo {
            method: method.map(|m| m.parse().unwrap()),
            scheme: scheme.map(|s| Bytes::copy_from_slice(s.as_bytes())),
            authority: authority.map(|a| Bytes::copy_from_slice(a.as_bytes())),
            path: path.map(|p| Bytes::copy_from_slice(p.as_bytes())),
            status: None,
        }
    }

    #[test]
    fn builds_a_get_request() {
        let req = Peer::build_request(
            1.into(),
            pseudo(Some("GET"), Some("https"), Some("example.com"), Some("/x?y=1")),
            HeaderMap::new(),
        )
        .unwrap();

        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().path(), "/x");
        assert_eq!(req.uri().authority().unwrap().as_str(), "example.com");
    }

    #[test]
    fn missing_pseudo_headers_are_malformed() {
        for broken in [
            pseudo(None, Some("https"), Some("h"), Some("/")),
            pseudo(Some("GET"), None, Some("h"), Some("/")),
            pseudo(Some("GET"), Some("https"), None, Some("/")),
            pseudo(Some("GET"), Some("https"), Some("h"), None),
            pseudo(Some("GET"), Some("https"), Some("h"), Some("")),
        ] {
            assert!(Peer::build_request(1.into(), broken, HeaderMap::new()).is_err());
        }
    }

    #[test]
    fn connect_omits_scheme_and_path() {
        let req = Peer::build_request(
            1.into(),
            pseudo(Some("CONNECT"), None, Some("example.com:443"), None),
            HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(req.method(), Method::CONNECT);

        assert!(Peer::build_request(
            1.into(),
            pseudo(Some("CONNECT"), Some("https"), Some("example.com:443"), None),
            HeaderMap::new(),
        )
        .is_err());
    }
}
