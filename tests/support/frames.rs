//! Raw client-side frame builders and a mirror parser for the server's
//! output.

use hpack;

pub const PREFACE: &'static [u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const END_STREAM: u8 = 0x1;
pub const END_HEADERS: u8 = 0x4;
pub const FLAG_PRIORITY: u8 = 0x20;

fn frame(kind: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + payload.len());
    let len = payload.len() as u32;
    buf.push((len >> 16) as u8);
    buf.push((len >> 8) as u8);
    buf.push(len as u8);
    buf.push(kind);
    buf.push(flags);
    buf.extend_from_slice(&stream_id.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub fn settings(pairs: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for &(id, value) in pairs {
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    frame(0x4, 0, 0, &payload)
}

pub fn settings_ack() -> Vec<u8> {
    frame(0x4, 0x1, 0, &[])
}

pub fn encode_block(enc: &mut hpack::Encoder, headers: &[(&str, &str)]) -> Vec<u8> {
    enc.encode(headers.iter().map(|&(n, v)| (n.as_bytes(), v.as_bytes())))
}

pub fn headers(
    enc: &mut hpack::Encoder,
    stream_id: u32,
    fields: &[(&str, &str)],
    flags: u8,
) -> Vec<u8> {
    let block = encode_block(enc, fields);
    frame(0x1, flags, stream_id, &block)
}

/// HEADERS with the PRIORITY flag: E/dep(4) + weight(1) + block.
pub fn headers_with_priority(
    enc: &mut hpack::Encoder,
    stream_id: u32,
    fields: &[(&str, &str)],
    flags: u8,
    depends_on: u32,
    weight: u8,
    exclusive: bool,
) -> Vec<u8> {
    let block = encode_block(enc, fields);
    let mut payload = Vec::new();
    let dep = depends_on | if exclusive { 1 << 31 } else { 0 };
    payload.extend_from_slice(&dep.to_be_bytes());
    payload.push(weight);
    payload.extend_from_slice(&block);
    frame(0x1, flags | FLAG_PRIORITY, stream_id, &payload)
}

/// A HEADERS frame carrying a raw (possibly partial) block.
pub fn headers_raw(stream_id: u32, fragment: &[u8], flags: u8) -> Vec<u8> {
    frame(0x1, flags, stream_id, fragment)
}

pub fn continuation(stream_id: u32, fragment: &[u8], end_headers: bool) -> Vec<u8> {
    frame(0x9, if end_headers { END_HEADERS } else { 0 }, stream_id, fragment)
}

pub fn data(stream_id: u32, payload: &[u8], end_stream: bool) -> Vec<u8> {
    frame(0x0, if end_stream { END_STREAM } else { 0 }, stream_id, payload)
}

pub fn priority(stream_id: u32, depends_on: u32, weight: u8, exclusive: bool) -> Vec<u8> {
    let mut payload = Vec::new();
    let dep = depends_on | if exclusive { 1 << 31 } else { 0 };
    payload.extend_from_slice(&dep.to_be_bytes());
    payload.push(weight);
    frame(0x2, 0, stream_id, &payload)
}

pub fn rst_stream(stream_id: u32, code: u32) -> Vec<u8> {
    frame(0x3, 0, stream_id, &code.to_be_bytes())
}

pub fn ping(payload: [u8; 8]) -> Vec<u8> {
    frame(0x6, 0, 0, &payload)
}

pub fn go_away(last_stream_id: u32, code: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&last_stream_id.to_be_bytes());
    payload.extend_from_slice(&code.to_be_bytes());
    frame(0x7, 0, 0, &payload)
}

pub fn window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    frame(0x8, 0, stream_id, &increment.to_be_bytes())
}

pub fn push_promise_raw(stream_id: u32, promised: u32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&promised.to_be_bytes());
    frame(0x5, END_HEADERS, stream_id, &payload)
}

pub fn unknown(kind: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    frame(kind, 0, stream_id, payload)
}

// ===== mirror parser =====

/// Server-to-client frames, decoded just enough for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum SrvFrame {
    Settings {
        ack: bool,
        max_concurrent_streams: Option<u32>,
    },
    Headers {
        stream_id: u32,
        end_stream: bool,
        status: Option<u16>,
        fields: Vec<(String, String)>,
    },
    Data {
        stream_id: u32,
        len: usize,
        end_stream: bool,
        payload: Vec<u8>,
    },
    Reset {
        stream_id: u32,
        code: u32,
    },
    GoAway {
        last_stream_id: u32,
        code: u32,
        debug: String,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    PushPromise {
        stream_id: u32,
        promised_id: u32,
        path: String,
    },
}

pub struct Mirror {
    dec: hpack::Decoder<'static>,
}

fn be32(buf: &[u8]) -> u32 {
    ((buf[0] as u32) << 24) | ((buf[1] as u32) << 16) | ((buf[2] as u32) << 8) | buf[3] as u32
}

impl Mirror {
    pub fn new() -> Mirror {
        Mirror {
            dec: hpack::Decoder::new(),
        }
    }

    fn decode_fields(&mut self, block: &[u8]) -> (Option<u16>, Vec<(String, String)>) {
        let decoded = self.dec.decode(block).expect("mirror hpack decode");
        let mut status = None;
        let mut fields = Vec::new();

        for (name, value) in decoded {
            let name = String::from_utf8(name).unwrap();
            let value = String::from_utf8(value).unwrap();

            if name == ":status" {
                status = Some(value.parse().unwrap());
            } else {
                fields.push((name, value));
            }
        }

        (status, fields)
    }

    pub fn parse_all(&mut self, mut buf: &[u8]) -> Vec<SrvFrame> {
        let mut frames = Vec::new();

        while buf.len() >= 9 {
            let len = ((buf[0] as usize) << 16) | ((buf[1] as usize) << 8) | buf[2] as usize;
            let kind = buf[3];
            let flags = buf[4];
            let stream_id = be32(&buf[5..9]) & 0x7fff_ffff;

            assert!(buf.len() >= 9 + len, "truncated server frame");
            let payload = &buf[9..9 + len];

            let frame = match kind {
                0x0 => SrvFrame::Data {
                    stream_id: stream_id,
                    len: len,
                    end_stream: flags & END_STREAM != 0,
                    payload: payload.to_vec(),
                },
                0x1 => {
                    assert!(flags & END_HEADERS != 0, "mirror does not join CONTINUATION");
                    let (status, fields) = self.decode_fields(payload);
                    SrvFrame::Headers {
                        stream_id: stream_id,
                        end_stream: flags & END_STREAM != 0,
                        status: status,
                        fields: fields,
                    }
                }
                0x3 => SrvFrame::Reset {
                    stream_id: stream_id,
                    code: be32(payload),
                },
                0x4 => {
                    let mut max_concurrent_streams = None;
                    for raw in payload.chunks(6) {
                        let id = ((raw[0] as u16) << 8) | raw[1] as u16;
                        if id == 0x3 {
                            max_concurrent_streams = Some(be32(&raw[2..6]));
                        }
                    }
                    SrvFrame::Settings {
                        ack: flags & 0x1 != 0,
                        max_concurrent_streams: max_concurrent_streams,
                    }
                }
                0x5 => {
                    let promised = be32(&payload[..4]) & 0x7fff_ffff;
                    let (_, fields) = self.decode_fields(&payload[4..]);
                    let path = fields
                        .iter()
                        .find(|&&(ref n, _)| n == ":path")
                        .map(|&(_, ref v)| v.clone())
                        .unwrap_or_default();
                    SrvFrame::PushPromise {
                        stream_id: stream_id,
                        promised_id: promised,
                        path: path,
                    }
                }
                0x6 => {
                    let mut p = [0; 8];
                    p.copy_from_slice(payload);
                    SrvFrame::Ping {
                        ack: flags & 0x1 != 0,
                        payload: p,
                    }
                }
                0x7 => SrvFrame::GoAway {
                    last_stream_id: be32(&payload[..4]) & 0x7fff_ffff,
                    code: be32(&payload[4..8]),
                    debug: String::from_utf8_lossy(&payload[8..]).into_owned(),
                },
                0x8 => SrvFrame::WindowUpdate {
                    stream_id: stream_id,
                    increment: be32(payload) & 0x7fff_ffff,
                },
                other => panic!("unexpected frame type from server: {:#x}", other),
            };

            frames.push(frame);
            buf = &buf[9 + len..];
        }

        assert!(buf.is_empty(), "trailing bytes from server");
        frames
    }
}
