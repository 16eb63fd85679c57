//! Randomized frame soup against the connection's stated invariants.

extern crate bytes;
extern crate env_logger;
extern crate h2d;
extern crate hpack;
extern crate http;
extern crate rand;

mod support;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use h2d::{DebugState, Timer};
use support::frames;
use support::{Respond, Srv};

fn check_invariants(state: &DebugState, max_open_seen: &mut u32) {
    // Stream-id high-water marks never move backwards.
    assert!(
        state.pull_max_open >= *max_open_seen,
        "pull_max_open went backwards: {} -> {}",
        max_open_seen,
        state.pull_max_open
    );
    *max_open_seen = state.pull_max_open;

    // The registry holds exactly the non-closed streams, and the
    // counters are derived from it.
    assert_eq!(
        state.streams.len(),
        state.pull_live + state.push_live,
        "live stream rows vs counters"
    );
    assert_eq!(
        state.blocked_by_server,
        state
            .streams
            .iter()
            .filter(|s| s.blocked_by_server)
            .count()
    );

    // Pending requests are exactly the REQ_PENDING streams that exist.
    for id in &state.pending_reqs {
        let row = state
            .streams
            .iter()
            .find(|s| s.id == *id)
            .expect("pending id not live");
        assert_eq!(row.state, "REQ_PENDING");
    }

    // The dependency tree stays a tree.
    assert!(state.scheduler_consistent, "scheduler inconsistent");

    // Windows never exceed the protocol bound.
    assert!(state.conn_send_window <= i32::MAX);
    assert!(state.conn_recv_window <= i32::MAX);
    for row in &state.streams {
        assert!(row.send_window <= i32::MAX);
        assert!(row.recv_window <= i32::MAX);
    }

    if state.phase == "IS_CLOSING" {
        assert!(state.streams.is_empty());
        assert!(state.pending_reqs.is_empty());
        assert_eq!(state.blocked_by_server, 0);
        assert_eq!(state.tunnels, 0);
        assert_eq!(state.streaming, 0);
    }
}

fn random_frame(rng: &mut StdRng, enc: &mut hpack::Encoder, next_stream: &mut u32) -> Vec<u8> {
    let any_id = |rng: &mut StdRng| rng.gen_range(0u32..12);

    match rng.gen_range(0u32..12) {
        0 | 1 => {
            let id = *next_stream;
            *next_stream += 2;
            let end = rng.gen_bool(0.6);
            let flags = frames::END_HEADERS | if end { frames::END_STREAM } else { 0 };
            let fields = [
                (":method", "GET"),
                (":scheme", "https"),
                (":authority", "fuzz.example"),
                (":path", "/p"),
            ];

            if rng.gen_bool(0.3) {
                frames::headers_with_priority(
                    enc,
                    id,
                    &fields,
                    flags,
                    rng.gen_range(0u32..id + 2),
                    rng.gen(),
                    rng.gen_bool(0.5),
                )
            } else {
                frames::headers(enc, id, &fields, flags)
            }
        }
        2 | 3 => {
            let len = rng.gen_range(0usize..2048);
            let id = rng.gen_range(1u32..12);
            frames::data(id, &vec![0u8; len], rng.gen_bool(0.3))
        }
        4 => frames::priority(
            rng.gen_range(1u32..40),
            rng.gen_range(0u32..40),
            rng.gen(),
            rng.gen_bool(0.5),
        ),
        5 => frames::rst_stream(any_id(rng), rng.gen_range(0u32..14)),
        6 => frames::window_update(any_id(rng), rng.gen_range(1u32..100_000)),
        7 => frames::settings(&[
            (0x4, rng.gen_range(0u32..200_000)),
            (0x3, rng.gen_range(0u32..200)),
        ]),
        8 => frames::ping(rng.gen()),
        9 => frames::unknown(rng.gen_range(0x20u8..0xff), any_id(rng), b"noise"),
        10 => frames::settings(&[]),
        _ => {
            let len = rng.gen_range(0usize..64);
            let id = rng.gen_range(1u32..8);
            frames::data(id, &vec![1u8; len], true)
        }
    }
}

fn run_seed(seed: u64) {
    let mut srv = Srv::new();
    {
        let mut service = srv.service.borrow_mut();
        service.respond = if seed % 3 == 0 {
            Respond::Manual
        } else {
            Respond::Status(200)
        };
        service.stream_bodies = seed % 2 == 0;
        service.respond_on_body_end = Some(200);
    }
    srv.handshake();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut next_stream = 1u32;
    let mut max_open_seen = 0u32;

    for _ in 0..200 {
        let frame = random_frame(&mut rng, &mut srv.enc, &mut next_stream);

        // Occasionally split the frame across reads.
        if frame.len() > 2 && rng.gen_bool(0.3) {
            let mid = rng.gen_range(1..frame.len());
            srv.conn.on_read(&frame[..mid]);
            srv.conn.on_read(&frame[mid..]);
        } else {
            srv.conn.on_read(&frame);
        }

        if rng.gen_bool(0.7) {
            srv.pump();
        }

        if rng.gen_bool(0.02) {
            srv.conn.on_timer(Timer::Idle);
        }

        let state = srv.conn.debug_state();
        check_invariants(&state, &mut max_open_seen);

        if srv.is_closed() {
            break;
        }
    }

    // Wind down whatever survived and re-check the terminal state.
    srv.pump();
    srv.conn.close_idle_connection();
    srv.pump();
    srv.conn.on_timer(Timer::Shutdown);
    srv.pump();
    srv.conn.on_timer(Timer::Idle);
    srv.pump();

    let state = srv.conn.debug_state();
    let mut max = max_open_seen;
    check_invariants(&state, &mut max);
}

#[test]
fn random_frame_sequences_hold_the_invariants() {
    for seed in 0..32u64 {
        run_seed(seed);
    }
}
