use bytes::{Buf, Bytes, BytesMut};
use hpack;

use codec::RecvError;
use error::Reason;
use frame::{self, Frame, Head, HeadersFlag, Kind, StreamDependency, StreamId};

/// The client connection preface.
pub const PREFACE: [u8; 24] = *b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Accumulated CONTINUATION state beyond which the connection is torn
/// down rather than the stream refused.
const HARD_HEADER_BLOCK_FACTOR: usize = 4;

/// Incremental frame parser.
///
/// Consumes the client preface, then one frame per call. While a header
/// block is open the parser expects only CONTINUATION frames for the
/// same stream; the expectation is the `partial` state.
pub struct FramedRead {
    state: State,

    /// Partially received header block.
    partial: Option<Partial>,

    // hpack decoder state
    hpack: hpack::Decoder<'static>,

    max_frame_size: u32,

    max_header_block_size: usize,
}

impl ::std::fmt::Debug for FramedRead {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        f.debug_struct("FramedRead")
            .field("state", &self.state)
            .field("partial", &self.partial)
            .field("max_frame_size", &self.max_frame_size)
            .field("max_header_block_size", &self.max_header_block_size)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ClientPreface { pos: usize },
    Frames,
}

/// Partially loaded headers frame
struct Partial {
    stream_id: StreamId,
    flags: HeadersFlag,
    stream_dep: Option<StreamDependency>,

    /// Partial header block payload
    buf: BytesMut,

    /// The block overflowed the accumulation cap; the stream has been
    /// refused but the block is still consumed (and decoded, to keep
    /// the shared dynamic table in sync).
    refused: bool,
}

impl FramedRead {
    pub fn new(max_header_block_size: usize) -> FramedRead {
        FramedRead {
            state: State::ClientPreface { pos: 0 },
            partial: None,
            hpack: hpack::Decoder::new(),
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
            max_header_block_size: max_header_block_size,
        }
    }

    /// Try to consume one frame from `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Bytes of skipped
    /// frames (unknown types, non-final continuations) are consumed
    /// internally.
    pub fn recv(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, RecvError> {
        loop {
            if let State::ClientPreface { pos } = self.state {
                let n = ::std::cmp::min(src.len(), PREFACE.len() - pos);

                if n == 0 {
                    return Ok(None);
                }

                if src[..n] != PREFACE[pos..pos + n] {
                    debug!("bad client preface");
                    return Err(RecvError::CloseImmediately);
                }

                src.advance(n);

                if pos + n < PREFACE.len() {
                    self.state = State::ClientPreface { pos: pos + n };
                    return Ok(None);
                }

                trace!("client preface consumed");
                self.state = State::Frames;
            }

            if src.len() < frame::HEADER_LEN {
                return Ok(None);
            }

            let len = ((src[0] as usize) << 16) | ((src[1] as usize) << 8) | src[2] as usize;

            if len > self.max_frame_size as usize {
                debug!("connection error FRAME_SIZE_ERROR -- frame len={}", len);
                return Err(RecvError::Connection(Reason::FRAME_SIZE_ERROR));
            }

            if src.len() < frame::HEADER_LEN + len {
                return Ok(None);
            }

            let mut bytes = src.split_to(frame::HEADER_LEN + len);
            let head = Head::parse(&bytes);
            let payload = bytes.split_off(frame::HEADER_LEN).freeze();

            trace!("decoding frame; kind={:?} len={}", head.kind(), len);

            if self.partial.is_some() && head.kind() != Kind::Continuation {
                debug!(
                    "connection error PROTOCOL_ERROR -- expected CONTINUATION, got {:?}",
                    head.kind()
                );
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }

            let frame = match head.kind() {
                Kind::Data => frame::Data::load(head, payload)
                    .map_err(|e| {
                        debug!("failed to load DATA frame; err={:?}", e);
                        RecvError::Connection(e.reason())
                    })?
                    .into(),
                Kind::Headers => match self.recv_headers(head, payload)? {
                    Some(frame) => frame,
                    None => continue,
                },
                Kind::Priority => {
                    if head.stream_id().is_zero() {
                        return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
                    }

                    match frame::Priority::load(head, &payload) {
                        Ok(frame) => frame.into(),
                        Err(frame::Error::InvalidDependencyId) => {
                            // A stream cannot depend on itself. An endpoint MUST
                            // treat this as a stream error (Section 5.4.2) of type
                            // PROTOCOL_ERROR.
                            debug!("stream error PROTOCOL_ERROR -- PRIORITY invalid dependency ID");
                            return Err(RecvError::Stream {
                                id: head.stream_id(),
                                reason: Reason::PROTOCOL_ERROR,
                            });
                        }
                        Err(frame::Error::InvalidPayloadLength) => {
                            return Err(RecvError::Stream {
                                id: head.stream_id(),
                                reason: Reason::FRAME_SIZE_ERROR,
                            });
                        }
                        Err(_) => return Err(RecvError::Connection(Reason::PROTOCOL_ERROR)),
                    }
                }
                Kind::Reset => frame::Reset::load(head, &payload)
                    .map_err(|e| RecvError::Connection(e.reason()))?
                    .into(),
                Kind::Settings => frame::Settings::load(head, &payload)
                    .map_err(|e| {
                        debug!("failed to load SETTINGS frame; err={:?}", e);
                        RecvError::Connection(e.reason())
                    })?
                    .into(),
                Kind::PushPromise => {
                    // A client cannot push. An endpoint MUST treat the
                    // receipt of a PUSH_PROMISE frame as a connection
                    // error if it is acting as a server.
                    debug!("connection error PROTOCOL_ERROR -- received PUSH_PROMISE");
                    return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
                }
                Kind::Ping => frame::Ping::load(head, &payload)
                    .map_err(|e| RecvError::Connection(e.reason()))?
                    .into(),
                Kind::GoAway => frame::GoAway::load(head, &payload)
                    .map_err(|e| RecvError::Connection(e.reason()))?
                    .into(),
                Kind::WindowUpdate => frame::WindowUpdate::load(head, &payload)
                    .map_err(|e| RecvError::Connection(e.reason()))?
                    .into(),
                Kind::Continuation => match self.recv_continuation(head, payload)? {
                    Some(frame) => frame,
                    None => continue,
                },
                Kind::Unknown => {
                    // Implementations MUST ignore and discard any frame
                    // that has a type that is unknown.
                    debug!("ignoring unknown frame; flag={:#x}", head.flag());
                    continue;
                }
            };

            return Ok(Some(frame));
        }
    }

    fn recv_headers(&mut self, head: Head, mut payload: Bytes) -> Result<Option<Frame>, RecvError> {
        let id = head.stream_id();

        if id.is_zero() {
            return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
        }

        let flags = HeadersFlag::load(head.flag());

        if flags.is_padded() {
            frame::util::strip_padding(&mut payload)
                .map_err(|e| RecvError::Connection(e.reason()))?;
        }

        // A stream cannot depend on itself. An endpoint MUST treat this
        // as a stream error (Section 5.4.2) of type PROTOCOL_ERROR; the
        // header block is still fed to the decoder so the dynamic table
        // stays in sync.
        let mut reject = None;

        let stream_dep = if flags.is_priority() {
            if payload.len() < 5 {
                return Err(RecvError::Connection(Reason::FRAME_SIZE_ERROR));
            }

            let dep = StreamDependency::load(&payload[..5])
                .map_err(|e| RecvError::Connection(e.reason()))?;
            payload.advance(5);

            if dep.dependency_id() == id {
                debug!("stream error PROTOCOL_ERROR -- invalid HEADERS dependency ID");
                reject = Some(Reason::PROTOCOL_ERROR);
                None
            } else {
                Some(dep)
            }
        } else {
            None
        };

        if flags.is_end_headers() {
            if payload.len() > self.max_header_block_size {
                reject = reject.or(Some(Reason::REFUSED_STREAM));
            }

            let decoded = self.decode_block(&payload)?;

            if let Some(reason) = reject {
                return Err(RecvError::Stream {
                    id: id,
                    reason: reason,
                });
            }

            let frame = frame::Headers::assemble(id, flags, stream_dep, decoded);
            return Ok(Some(frame.into()));
        }

        // Expectation switches to continuation-of-headers.
        if payload.len() > self.max_header_block_size {
            reject = reject.or(Some(Reason::REFUSED_STREAM));
        }

        self.partial = Some(Partial {
            stream_id: id,
            flags: flags,
            stream_dep: stream_dep,
            buf: BytesMut::from(&payload[..]),
            refused: reject.is_some(),
        });

        if let Some(reason) = reject {
            return Err(RecvError::Stream {
                id: id,
                reason: reason,
            });
        }

        Ok(None)
    }

    fn recv_continuation(&mut self, head: Head, payload: Bytes) -> Result<Option<Frame>, RecvError> {
        let end_of_headers = HeadersFlag::load(head.flag()).is_end_headers();

        let mut partial = match self.partial.take() {
            Some(partial) => partial,
            None => {
                debug!("connection error PROTOCOL_ERROR -- unexpected CONTINUATION frame");
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }
        };

        // The stream identifiers must match
        if partial.stream_id != head.stream_id() {
            debug!("connection error PROTOCOL_ERROR -- CONTINUATION stream ID mismatch");
            return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
        }

        if partial.buf.len() + payload.len()
            > self.max_header_block_size * HARD_HEADER_BLOCK_FACTOR
        {
            debug!("connection error ENHANCE_YOUR_CALM -- runaway header block");
            return Err(RecvError::Connection(Reason::ENHANCE_YOUR_CALM));
        }

        partial.buf.extend_from_slice(&payload);

        let id = partial.stream_id;
        let overflowed = !partial.refused && partial.buf.len() > self.max_header_block_size;

        if overflowed {
            partial.refused = true;
        }

        if !end_of_headers {
            self.partial = Some(partial);

            if overflowed {
                return Err(RecvError::Stream {
                    id: id,
                    reason: Reason::REFUSED_STREAM,
                });
            }

            return Ok(None);
        }

        let decoded = self.decode_block(&partial.buf)?;

        if partial.refused {
            // The stream was already refused when the cap was hit; the
            // decode above only kept the table in sync.
            if overflowed {
                return Err(RecvError::Stream {
                    id: id,
                    reason: Reason::REFUSED_STREAM,
                });
            }

            return Ok(None);
        }

        let mut flags = partial.flags;
        flags.set_end_headers();

        let frame = frame::Headers::assemble(id, flags, partial.stream_dep, decoded);
        Ok(Some(frame.into()))
    }

    fn decode_block(&mut self, src: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RecvError> {
        self.hpack.decode(src).map_err(|e| {
            debug!("connection error COMPRESSION_ERROR -- failed HPACK decoding; err={:?}", e);
            RecvError::Connection(Reason::COMPRESSION_ERROR)
        })
    }
}

impl ::std::fmt::Debug for Partial {
    fn fmt(&self, fmt: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        fmt.debug_struct("Partial")
            .field("stream_id", &self.stream_id)
            .field("buffered", &self.buf.len())
            .field("refused", &self.refused)
            .finish()
    }
}
