use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use hpack;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};

use frame::{self, Frame, Head, Kind, StreamDependency, StreamId};

/// Header frame
///
/// Either a request (ingress), a response, or a trailer block. Ingress
/// frames are assembled from a complete (possibly CONTINUATION-joined)
/// header block after HPACK decoding.
#[derive(Debug)]
pub struct Headers {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// The stream dependency information, if any.
    stream_dep: Option<StreamDependency>,

    /// The decoded header fields
    fields: HeaderMap,

    /// Pseudo headers, these are broken out as they must be sent as part of the
    /// headers frame.
    pseudo: Pseudo,

    /// The associated flags
    flags: HeadersFlag,

    /// Structural violation of the header block rules; the stream must
    /// be reset with PROTOCOL_ERROR.
    malformed: bool,

    /// Field names or values with invalid characters. Not a protocol
    /// error: the request is answered with a plain 400.
    bad_chars: bool,

    /// Parsed `content-length`, when present and well-formed.
    content_length: Option<u64>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeadersFlag(u8);

/// PUSH_PROMISE frame (egress only; receiving one is rejected before
/// frame assembly since clients cannot promise).
#[derive(Debug)]
pub struct PushPromise {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// The ID of the stream being reserved by this PushPromise.
    promised_id: StreamId,

    /// The synthesized request advertised to the peer.
    pseudo: Pseudo,
    fields: HeaderMap,
}

#[derive(Debug, Default)]
pub struct Pseudo {
    // Request
    pub method: Option<Method>,
    pub scheme: Option<Bytes>,
    pub authority: Option<Bytes>,
    pub path: Option<Bytes>,

    // Response
    pub status: Option<StatusCode>,
}

pub const END_STREAM: u8 = 0x1;
pub const END_HEADERS: u8 = 0x4;
pub const PADDED: u8 = 0x8;
pub const PRIORITY: u8 = 0x20;
const ALL: u8 = END_STREAM | END_HEADERS | PADDED | PRIORITY;

// ===== impl Headers =====

impl Headers {
    /// Build a response headers frame.
    pub fn response(stream_id: StreamId, status: StatusCode, fields: HeaderMap) -> Self {
        Headers {
            stream_id: stream_id,
            stream_dep: None,
            fields: fields,
            pseudo: Pseudo::response(status),
            flags: HeadersFlag::default(),
            malformed: false,
            bad_chars: false,
            content_length: None,
        }
    }

    /// Build a trailers frame. Trailers always end the stream.
    pub fn trailers(stream_id: StreamId, fields: HeaderMap) -> Self {
        let mut flags = HeadersFlag::default();
        flags.set_end_stream();

        Headers {
            stream_id: stream_id,
            stream_dep: None,
            fields: fields,
            pseudo: Pseudo::default(),
            flags: flags,
            malformed: false,
            bad_chars: false,
            content_length: None,
        }
    }

    /// Assemble a received headers frame from a decoded header block.
    ///
    /// The field list is scanned once: pseudo headers are split out and
    /// request-level violations are recorded on the frame rather than
    /// failing fast, so the caller can pick the right error scope.
    pub fn assemble(
        stream_id: StreamId,
        flags: HeadersFlag,
        stream_dep: Option<StreamDependency>,
        decoded: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Headers {
        let mut frame = Headers {
            stream_id: stream_id,
            stream_dep: stream_dep,
            fields: HeaderMap::new(),
            pseudo: Pseudo::default(),
            flags: flags,
            malformed: false,
            bad_chars: false,
            content_length: None,
        };

        let mut pseudo_done = false;

        for (name, value) in decoded {
            if name.is_empty() {
                frame.malformed = true;
                continue;
            }

            if name[0] == b':' {
                // Pseudo-header fields MUST NOT appear after regular
                // fields, and each may appear at most once.
                if pseudo_done {
                    frame.malformed = true;
                    continue;
                }

                frame.set_pseudo(&name, value);
                continue;
            }

            pseudo_done = true;

            if name.iter().any(|b| b.is_ascii_uppercase()) {
                // Field names are transmitted lowercase in HTTP/2;
                // anything else makes the message malformed.
                frame.malformed = true;
                continue;
            }

            match &name[..] {
                b"connection" | b"proxy-connection" | b"keep-alive" | b"transfer-encoding"
                | b"upgrade" => {
                    frame.malformed = true;
                    continue;
                }
                b"te" => {
                    if &value[..] != b"trailers" {
                        frame.malformed = true;
                        continue;
                    }
                }
                b"content-length" => {
                    match parse_content_length(&value) {
                        Some(len) => match frame.content_length {
                            Some(prev) if prev != len => frame.malformed = true,
                            _ => frame.content_length = Some(len),
                        },
                        None => frame.malformed = true,
                    }
                    continue;
                }
                _ => {}
            }

            let name = match HeaderName::from_bytes(&name) {
                Ok(name) => name,
                Err(_) => {
                    frame.bad_chars = true;
                    continue;
                }
            };

            let value = match HeaderValue::from_bytes(&value) {
                Ok(value) => value,
                Err(_) => {
                    frame.bad_chars = true;
                    continue;
                }
            };

            frame.fields.append(name, value);
        }

        frame
    }

    fn set_pseudo(&mut self, name: &[u8], value: Vec<u8>) {
        macro_rules! set {
            ($field:ident, $val:expr) => {{
                if self.pseudo.$field.is_some() {
                    self.malformed = true;
                } else {
                    self.pseudo.$field = Some($val);
                }
            }};
        }

        match name {
            b":method" => match Method::from_bytes(&value) {
                Ok(method) => set!(method, method),
                Err(_) => self.malformed = true,
            },
            b":scheme" => set!(scheme, value.into()),
            b":authority" => set!(authority, value.into()),
            b":path" => set!(path, value.into()),
            b":status" => match StatusCode::from_bytes(&value) {
                Ok(status) => set!(status, status),
                Err(_) => self.malformed = true,
            },
            _ => self.malformed = true,
        }
    }

    /// Returns `true` if the frame represents trailers.
    ///
    /// Trailers are header frames that contain no pseudo headers.
    pub fn is_trailers(&self) -> bool {
        self.pseudo.method.is_none() && self.pseudo.status.is_none()
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn set_end_stream(&mut self) {
        self.flags.set_end_stream()
    }

    pub fn stream_dep(&self) -> Option<StreamDependency> {
        self.stream_dep
    }

    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    pub fn has_bad_chars(&self) -> bool {
        self.bad_chars
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn fields(&self) -> &HeaderMap {
        &self.fields
    }

    pub fn into_parts(self) -> (Pseudo, HeaderMap) {
        (self.pseudo, self.fields)
    }

    pub fn encode(self, encoder: &mut hpack::Encoder, max_frame_size: usize, dst: &mut BytesMut) {
        let block = encode_block(encoder, &self.pseudo, &self.fields);
        let first_flags = self.flags.0 & END_STREAM;

        encode_fragmented(
            Kind::Headers,
            self.stream_id,
            first_flags,
            &[],
            &block,
            max_frame_size,
            dst,
        );
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Self {
        Frame::Headers(src)
    }
}

// ===== impl PushPromise =====

impl PushPromise {
    pub fn new(
        stream_id: StreamId,
        promised_id: StreamId,
        pseudo: Pseudo,
        fields: HeaderMap,
    ) -> PushPromise {
        debug_assert!(promised_id.is_server_initiated());

        PushPromise {
            stream_id: stream_id,
            promised_id: promised_id,
            pseudo: pseudo,
            fields: fields,
        }
    }

    pub fn encode(self, encoder: &mut hpack::Encoder, max_frame_size: usize, dst: &mut BytesMut) {
        trace!(
            "encoding PUSH_PROMISE; id={:?} promised={:?}",
            self.stream_id,
            self.promised_id
        );

        let block = encode_block(encoder, &self.pseudo, &self.fields);

        let mut promised = [0; 4];
        BigEndian::write_u32(&mut promised, self.promised_id.into());

        encode_fragmented(
            Kind::PushPromise,
            self.stream_id,
            0,
            &promised,
            &block,
            max_frame_size,
            dst,
        );
    }
}

impl From<PushPromise> for Frame {
    fn from(src: PushPromise) -> Self {
        Frame::PushPromise(src)
    }
}

// ===== impl Pseudo =====

impl Pseudo {
    pub fn request(method: Method, scheme: Bytes, authority: Bytes, path: Bytes) -> Self {
        Pseudo {
            method: Some(method),
            scheme: Some(scheme),
            authority: Some(authority),
            path: Some(path),
            status: None,
        }
    }

    pub fn response(status: StatusCode) -> Self {
        Pseudo {
            method: None,
            scheme: None,
            authority: None,
            path: None,
            status: Some(status),
        }
    }
}

// ===== impl HeadersFlag =====

impl HeadersFlag {
    pub fn load(bits: u8) -> HeadersFlag {
        HeadersFlag(bits & ALL)
    }

    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn is_priority(&self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }
}

impl Default for HeadersFlag {
    /// Returns a `HeadersFlag` value with `END_HEADERS` set.
    fn default() -> Self {
        HeadersFlag(END_HEADERS)
    }
}

impl From<HeadersFlag> for u8 {
    fn from(src: HeadersFlag) -> u8 {
        src.0
    }
}

// ===== encoding helpers =====

fn encode_block(encoder: &mut hpack::Encoder, pseudo: &Pseudo, fields: &HeaderMap) -> Vec<u8> {
    let mut pairs: Vec<(&[u8], &[u8])> = Vec::with_capacity(fields.len() + 4);

    if let Some(ref method) = pseudo.method {
        pairs.push((b":method", method.as_str().as_bytes()));
    }

    if let Some(ref scheme) = pseudo.scheme {
        pairs.push((b":scheme", &scheme[..]));
    }

    if let Some(ref authority) = pseudo.authority {
        pairs.push((b":authority", &authority[..]));
    }

    if let Some(ref path) = pseudo.path {
        pairs.push((b":path", &path[..]));
    }

    let status;
    if let Some(st) = pseudo.status {
        status = st.as_str().to_owned();
        pairs.push((b":status", status.as_bytes()));
    }

    for (name, value) in fields {
        pairs.push((name.as_str().as_bytes(), value.as_bytes()));
    }

    encoder.encode(pairs)
}

/// Write a header block as one HEADERS or PUSH_PROMISE frame, splitting
/// the overflow into CONTINUATION frames. `intro` is encoded at the
/// start of the first frame's payload (the promised stream id).
fn encode_fragmented(
    kind: Kind,
    stream_id: StreamId,
    first_flags: u8,
    intro: &[u8],
    block: &[u8],
    max_frame_size: usize,
    dst: &mut BytesMut,
) {
    debug_assert!(max_frame_size > intro.len());

    let first_len = ::std::cmp::min(block.len(), max_frame_size - intro.len());
    let done = first_len == block.len();

    let flags = if done {
        first_flags | END_HEADERS
    } else {
        first_flags
    };

    // The frame length is patched once the payload is in place.
    let pos = dst.len();
    let head = Head::new(kind, flags, stream_id);
    head.encode(0, dst);
    dst.put_slice(intro);
    dst.put_slice(&block[..first_len]);

    let len = (dst.len() - pos) - frame::HEADER_LEN;
    BigEndian::write_uint(&mut dst[pos..pos + 3], len as u64, 3);

    let mut rem = &block[first_len..];

    while !rem.is_empty() {
        let len = ::std::cmp::min(rem.len(), max_frame_size);
        let flags = if len == rem.len() { END_HEADERS } else { 0 };

        let head = Head::new(Kind::Continuation, flags, stream_id);
        head.encode(len, dst);
        dst.put_slice(&rem[..len]);

        rem = &rem[len..];
    }
}

fn parse_content_length(value: &[u8]) -> Option<u64> {
    if value.is_empty() {
        return None;
    }

    let mut len: u64 = 0;

    for &b in value {
        if b < b'0' || b > b'9' {
            return None;
        }

        len = len.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }

    Some(len)
}
