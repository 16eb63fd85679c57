extern crate bytes;
extern crate env_logger;
extern crate h2d;
extern crate hpack;
extern crate http;

mod support;

use support::frames::{self, SrvFrame};
use support::{goaway_code, reset_code, Srv};

#[test]
fn headers_reassemble_across_continuation() {
    let mut srv = Srv::new();
    srv.handshake();

    let block = frames::encode_block(
        &mut srv.enc,
        &[
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/split"),
        ],
    );

    let mid = block.len() / 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&frames::headers_raw(3, &block[..mid], frames::END_STREAM));
    bytes.extend_from_slice(&frames::continuation(3, &block[mid..], true));
    srv.recv(&bytes);

    let service = srv.service.borrow();
    assert_eq!(
        service.requests,
        vec![(3, "GET".to_string(), "/split".to_string())]
    );
}

#[test]
fn continuation_may_span_many_frames() {
    let mut srv = Srv::new();
    srv.handshake();

    let block = frames::encode_block(
        &mut srv.enc,
        &[
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/many"),
        ],
    );

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&frames::headers_raw(1, &block[..4], frames::END_STREAM));
    for chunk in block[4..].chunks(3) {
        bytes.extend_from_slice(&frames::continuation(1, chunk, false));
    }
    bytes.extend_from_slice(&frames::continuation(1, &[], true));
    srv.recv(&bytes);

    assert_eq!(srv.service.borrow().requests.len(), 1);
}

#[test]
fn frame_between_headers_and_continuation_is_fatal() {
    let mut srv = Srv::new();
    srv.handshake();

    let block = frames::encode_block(
        &mut srv.enc,
        &[
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/"),
        ],
    );

    let mid = block.len() / 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&frames::headers_raw(3, &block[..mid], frames::END_STREAM));
    bytes.extend_from_slice(&frames::data(3, b"nope", false));
    srv.recv(&bytes);

    let frames = srv.written();
    assert_eq!(goaway_code(&frames), Some(1)); // PROTOCOL_ERROR
    assert!(srv.is_closed());
    assert!(srv.service.borrow().requests.is_empty());
}

#[test]
fn continuation_for_a_different_stream_is_fatal() {
    let mut srv = Srv::new();
    srv.handshake();

    let block = frames::encode_block(
        &mut srv.enc,
        &[(":method", "GET"), (":scheme", "https"), (":authority", "h"), (":path", "/")],
    );

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&frames::headers_raw(3, &block[..2], frames::END_STREAM));
    bytes.extend_from_slice(&frames::continuation(5, &block[2..], true));
    srv.recv(&bytes);

    assert_eq!(goaway_code(&srv.written()), Some(1));
    assert!(srv.is_closed());
}

#[test]
fn continuation_without_headers_is_fatal() {
    let mut srv = Srv::new();
    srv.handshake();

    srv.recv(&frames::continuation(1, b"junk", true));

    assert_eq!(goaway_code(&srv.written()), Some(1));
    assert!(srv.is_closed());
}

#[test]
fn oversized_header_block_refuses_the_stream() {
    let mut srv = Srv::new();
    srv.handshake();

    // The default accumulation cap is 16 KiB; build a block well past
    // it (but under the hard connection-fatal limit).
    let big = "x".repeat(40 * 1024);
    let block = frames::encode_block(
        &mut srv.enc,
        &[
            (":method", "GET"),
            (":scheme", "https"),
            (":authority", "example.com"),
            (":path", "/"),
            ("x-large", &big),
        ],
    );
    assert!(block.len() > 16 * 1024);

    let mid = 10;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&frames::headers_raw(1, &block[..mid], frames::END_STREAM));

    for chunk in block[mid..].chunks(16_000) {
        bytes.extend_from_slice(&frames::continuation(1, chunk, false));
    }
    bytes.extend_from_slice(&frames::continuation(1, &[], true));
    srv.recv(&bytes);

    let frames = srv.written();
    assert_eq!(reset_code(&frames, 1), Some(7)); // REFUSED_STREAM
    assert!(!srv.is_closed());
    assert!(srv.service.borrow().requests.is_empty());

    // The shared HPACK state survived the refusal.
    let get = srv.get(3, "/after");
    srv.recv(&get);
    assert_eq!(srv.service.borrow().requests.len(), 1);

    match srv.written()[0] {
        SrvFrame::Headers { stream_id: 3, .. } => {}
        ref other => panic!("expected response on stream 3, got {:?}", other),
    }
}
