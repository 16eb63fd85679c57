use bytes::{BufMut, BytesMut};

use frame::{Error, Frame, Head, Kind, StreamId};

const ACK_FLAG: u8 = 0x1;

const ENABLE_PUSH: u16 = 2;
const MAX_CONCURRENT_STREAMS: u16 = 3;
const INITIAL_WINDOW_SIZE: u16 = 4;
const MAX_FRAME_SIZE: u16 = 5;

/// SETTINGS frame
///
/// Raw setting values as they appeared on the wire; range validation is
/// the receiver's concern since the error codes differ per setting.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    flags: u8,
    enable_push: Option<u32>,
    max_concurrent_streams: Option<u32>,
    initial_window_size: Option<u32>,
    max_frame_size: Option<u32>,
}

impl Settings {
    pub fn new() -> Settings {
        Settings::default()
    }

    pub fn ack() -> Settings {
        Settings {
            flags: ACK_FLAG,
            ..Settings::default()
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & ACK_FLAG == ACK_FLAG
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Settings, Error> {
        debug_assert_eq!(head.kind(), Kind::Settings);

        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if head.flag() & ACK_FLAG == ACK_FLAG {
            if !payload.is_empty() {
                return Err(Error::InvalidPayloadAckSettings);
            }

            return Ok(Settings::ack());
        }

        if payload.len() % 6 != 0 {
            return Err(Error::PartialSettingLength);
        }

        let mut settings = Settings::new();

        for raw in payload.chunks(6) {
            let id = ((raw[0] as u16) << 8) | raw[1] as u16;
            let value = unpack_octets_4!(raw, 2, u32);

            match id {
                ENABLE_PUSH => settings.enable_push = Some(value),
                MAX_CONCURRENT_STREAMS => settings.max_concurrent_streams = Some(value),
                INITIAL_WINDOW_SIZE => settings.initial_window_size = Some(value),
                MAX_FRAME_SIZE => settings.max_frame_size = Some(value),
                // An endpoint that receives a SETTINGS frame with any
                // unknown or unsupported identifier MUST ignore that
                // setting. The header-table and header-list settings
                // are deliberately left to their defaults here.
                _ => {}
            }
        }

        Ok(settings)
    }

    pub fn enable_push(&self) -> Option<u32> {
        self.enable_push
    }

    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    pub fn set_max_concurrent_streams(&mut self, val: Option<u32>) {
        self.max_concurrent_streams = val;
    }

    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    pub fn max_frame_size(&self) -> Option<u32> {
        self.max_frame_size
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let payload_len = self.payload_len();

        trace!("encoding SETTINGS; len={} ack={}", payload_len, self.is_ack());

        let head = Head::new(Kind::Settings, self.flags, StreamId::ZERO);
        head.encode(payload_len, dst);

        let mut put = |id: u16, val: Option<u32>| {
            if let Some(val) = val {
                dst.put_u16(id);
                dst.put_u32(val);
            }
        };

        put(ENABLE_PUSH, self.enable_push);
        put(MAX_CONCURRENT_STREAMS, self.max_concurrent_streams);
        put(INITIAL_WINDOW_SIZE, self.initial_window_size);
        put(MAX_FRAME_SIZE, self.max_frame_size);
    }

    fn payload_len(&self) -> usize {
        let mut len = 0;
        let mut count = |val: Option<u32>| {
            if val.is_some() {
                len += 6;
            }
        };

        count(self.enable_push);
        count(self.max_concurrent_streams);
        count(self.initial_window_size);
        count(self.max_frame_size);

        len
    }
}

impl From<Settings> for Frame {
    fn from(src: Settings) -> Frame {
        Frame::Settings(src)
    }
}
