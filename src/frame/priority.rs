use frame::{Error, Frame, Head, Kind, StreamId};

/// Priority frame
///
/// Specifies the sender-advised priority of a stream.
#[derive(Debug, Clone, Copy)]
pub struct Priority {
    stream_id: StreamId,
    dependency: StreamDependency,
}

/// The dependency portion of a PRIORITY frame, or of a HEADERS frame
/// carrying the PRIORITY flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDependency {
    /// The stream the sender depends on.
    dependency_id: StreamId,

    /// Weight on the wire: `[0, 255]`, representing `[1, 256]`.
    weight: u8,

    is_exclusive: bool,
}

impl Priority {
    pub fn load(head: Head, payload: &[u8]) -> Result<Priority, Error> {
        debug_assert_eq!(head.kind(), Kind::Priority);

        if payload.len() != 5 {
            return Err(Error::InvalidPayloadLength);
        }

        let dependency = StreamDependency::load(payload)?;

        // A stream cannot depend on itself. An endpoint MUST treat this
        // as a stream error (Section 5.4.2) of type PROTOCOL_ERROR.
        if dependency.dependency_id() == head.stream_id() {
            return Err(Error::InvalidDependencyId);
        }

        Ok(Priority {
            stream_id: head.stream_id(),
            dependency: dependency,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn dependency(&self) -> StreamDependency {
        self.dependency
    }
}

impl From<Priority> for Frame {
    fn from(src: Priority) -> Frame {
        Frame::Priority(src)
    }
}

// ===== impl StreamDependency =====

impl StreamDependency {
    pub fn new(dependency_id: StreamId, weight: u8, is_exclusive: bool) -> StreamDependency {
        StreamDependency {
            dependency_id: dependency_id,
            weight: weight,
            is_exclusive: is_exclusive,
        }
    }

    pub fn load(src: &[u8]) -> Result<StreamDependency, Error> {
        if src.len() < 5 {
            return Err(Error::PayloadLengthTooShort);
        }

        let is_exclusive = src[0] & 0x80 != 0;
        let dependency_id = StreamId::parse(&src[..4]);

        Ok(StreamDependency::new(dependency_id, src[4], is_exclusive))
    }

    pub fn dependency_id(&self) -> StreamId {
        self.dependency_id
    }

    /// The effective weight, in `[1, 256]`.
    pub fn weight(&self) -> u16 {
        self.weight as u16 + 1
    }

    pub fn is_exclusive(&self) -> bool {
        self.is_exclusive
    }
}
