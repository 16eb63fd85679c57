extern crate bytes;
extern crate env_logger;
extern crate h2d;
extern crate hpack;
extern crate http;

mod support;

use h2d::{Builder, StreamId, Timer};
use http::Response;
use support::frames::{self, SrvFrame};
use support::{goaway_code, reset_code, Respond, Srv};

fn goaways(frames: &[SrvFrame]) -> Vec<(u32, u32, String)> {
    frames
        .iter()
        .filter_map(|f| match *f {
            SrvFrame::GoAway {
                last_stream_id,
                code,
                ref debug,
            } => Some((last_stream_id, code, debug.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn graceful_shutdown_sends_two_goaways_then_closes() {
    let mut builder = Builder::new();
    builder.graceful_shutdown_timeout(5_000);

    let mut srv = Srv::with_builder(&builder);
    srv.service.borrow_mut().respond = Respond::Manual;
    srv.handshake();

    let get = srv.get(1, "/");
    srv.recv(&get);
    srv.written();

    srv.conn.close_idle_connection();
    srv.pump();

    let frames = srv.written();
    assert_eq!(
        goaways(&frames),
        vec![(
            (1u32 << 31) - 1,
            0,
            "graceful shutdown".to_string()
        )]
    );
    assert_eq!(srv.timer_armed(Timer::Shutdown), Some(1_000));
    assert!(!srv.is_closed());

    // After the delay the precise cutoff goes out.
    srv.conn.on_timer(Timer::Shutdown);
    srv.pump();

    let frames = srv.written();
    assert_eq!(goaways(&frames), vec![(1, 0, String::new())]);
    assert_eq!(srv.timer_armed(Timer::Shutdown), Some(5_000));
    assert!(!srv.is_closed());

    // The grace period expires with the stream still open.
    srv.conn.on_timer(Timer::Shutdown);
    assert!(srv.is_closed());

    // The in-flight request was cancelled toward the application.
    assert_eq!(srv.service.borrow().resets, vec![(1, 8)]);
}

#[test]
fn graceful_shutdown_completes_when_streams_drain() {
    let mut srv = Srv::new();
    srv.service.borrow_mut().respond = Respond::Manual;
    srv.handshake();

    let get = srv.get(1, "/");
    srv.recv(&get);

    srv.conn.close_idle_connection();
    srv.pump();
    assert!(!srv.is_closed());

    // The response completes; nothing is live anymore, but the client
    // still gets the precise cutoff first.
    srv.conn.perform(|ops| {
        let response = Response::builder().status(200).body(()).unwrap();
        ops.send_response(StreamId::from(1), response, true).unwrap();
    });
    srv.pump();
    assert!(!srv.is_closed());

    srv.conn.on_timer(Timer::Shutdown);
    srv.pump();

    assert!(srv.is_closed());
}

#[test]
fn streams_past_the_pinned_cutoff_are_quietly_refused() {
    let mut srv = Srv::new();
    srv.service.borrow_mut().respond = Respond::Manual;
    srv.handshake();

    let get = srv.get(1, "/kept");
    srv.recv(&get);

    srv.conn.close_idle_connection();
    srv.pump();
    srv.conn.on_timer(Timer::Shutdown); // second GOAWAY pins last=1
    srv.pump();
    srv.written();

    let late = srv.get(3, "/late");
    srv.recv(&late);

    let frames = srv.written();
    assert_eq!(reset_code(&frames, 3), Some(7)); // REFUSED_STREAM
    assert_eq!(srv.service.borrow().requests.len(), 1);
}

#[test]
fn idle_timeout_sends_goaway_and_closes() {
    let mut srv = Srv::new();
    srv.handshake();

    assert_eq!(srv.timer_armed(Timer::Idle), Some(10_000));

    srv.conn.on_timer(Timer::Idle);
    srv.pump();

    let frames = srv.written();
    let goaways = goaways(&frames);
    assert_eq!(goaways.len(), 1);
    assert_eq!(goaways[0].1, 0);
    assert_eq!(goaways[0].2, "idle timeout");
    assert!(srv.is_closed());
}

#[test]
fn idle_timer_is_suppressed_while_the_server_blocks() {
    let mut srv = Srv::new();
    srv.service.borrow_mut().respond = Respond::Manual;
    srv.handshake();

    assert!(srv.timer_armed(Timer::Idle).is_some());

    // Dispatched but unanswered: the application is on the hook, the
    // idle timer must not fire under it.
    let get = srv.get(1, "/slow");
    srv.recv(&get);
    assert!(srv.timer_armed(Timer::Idle).is_none());

    srv.conn.perform(|ops| {
        let response = Response::builder().status(200).body(()).unwrap();
        ops.send_response(StreamId::from(1), response, true).unwrap();
    });
    srv.pump();

    assert!(srv.timer_armed(Timer::Idle).is_some());
}

#[test]
fn write_timeout_forces_the_connection_down() {
    let mut srv = Srv::new();
    srv.service.borrow_mut().respond = Respond::Body(200, vec![0u8; 1024]);
    srv.handshake();

    let get = srv.get(1, "/");
    srv.conn.on_read(&get); // response write left in flight

    assert!(srv.conn.debug_state().write_in_flight);
    assert_eq!(srv.timer_armed(Timer::Write), Some(30_000));

    srv.conn.on_timer(Timer::Write);
    assert!(srv.is_closed());
}

#[test]
fn peer_goaway_on_an_idle_connection_starts_shutdown() {
    let mut srv = Srv::new();
    srv.handshake();

    srv.recv(&frames::go_away(0, 0));

    let frames = srv.written();
    assert_eq!(goaway_code(&frames), Some(0));
    assert!(srv.conn.debug_state().goaway_sent);
}

#[test]
fn read_side_close_with_no_streams_tears_down() {
    let mut srv = Srv::new();
    srv.handshake();

    srv.conn.on_read_closed();
    assert!(srv.is_closed());
}

#[test]
fn counters_are_zero_at_teardown() {
    let mut srv = Srv::new();
    {
        let mut service = srv.service.borrow_mut();
        service.respond = Respond::Manual;
        service.stream_bodies = true;
    }
    srv.handshake();

    // A mix of live state: a buffered request, a streamed upload, and
    // a pending one.
    let a = srv.post(1, "/a", &[]);
    let b = srv.post(3, "/b", &[]);
    srv.recv(&a);
    srv.recv(&b);
    srv.recv(&frames::data(1, b"x", false));
    srv.recv(&frames::data(3, b"y", false));

    srv.conn.on_timer(Timer::Idle);
    srv.pump();

    assert!(srv.is_closed());
    let state = srv.conn.debug_state();
    assert_eq!(state.phase, "IS_CLOSING");
    assert_eq!(state.pull_live, 0);
    assert_eq!(state.streaming, 0);
    assert_eq!(state.tunnels, 0);
    assert_eq!(state.blocked_by_server, 0);
    assert!(state.pending_reqs.is_empty());
    assert!(state.streams.is_empty());
}
