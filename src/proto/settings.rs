use codec::RecvError;
use error::Reason;
use frame;
use proto::{Outbox, WindowSize, MAX_WINDOW_SIZE};

/// SETTINGS negotiation state: the peer's current values and whether
/// our own frame has been acknowledged.
#[derive(Debug)]
pub struct Settings {
    peer: PeerSettings,

    /// Our SETTINGS frame is on the wire, awaiting the peer's ack.
    local_pending_ack: bool,
}

/// The peer's view, updated by every (non-ack) SETTINGS frame.
#[derive(Debug)]
pub struct PeerSettings {
    pub enable_push: bool,
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: WindowSize,
    pub max_frame_size: u32,
}

impl Default for PeerSettings {
    fn default() -> PeerSettings {
        PeerSettings {
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: ::proto::DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// What the frame handler must apply after validation.
#[derive(Debug, Default)]
pub struct Applied {
    pub initial_window_size: Option<WindowSize>,
    pub max_frame_size: Option<u32>,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            peer: PeerSettings::default(),
            local_pending_ack: false,
        }
    }

    pub fn peer(&self) -> &PeerSettings {
        &self.peer
    }

    pub fn mark_local_sent(&mut self) {
        self.local_pending_ack = true;
    }

    pub fn local_acked(&self) -> bool {
        !self.local_pending_ack
    }

    /// Validate and record a received SETTINGS frame, then queue the
    /// acknowledgement. Settings are applied before the ack is sent.
    pub fn recv_settings(
        &mut self,
        frame: frame::Settings,
        out: &mut Outbox,
    ) -> Result<Applied, RecvError> {
        if frame.is_ack() {
            trace!("received SETTINGS ack");
            self.local_pending_ack = false;
            return Ok(Applied::default());
        }

        let mut applied = Applied::default();

        if let Some(val) = frame.enable_push() {
            // Any value other than 0 or 1 MUST be treated as a
            // connection error of type PROTOCOL_ERROR.
            if val > 1 {
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }
            self.peer.enable_push = val == 1;
        }

        if let Some(val) = frame.max_concurrent_streams() {
            self.peer.max_concurrent_streams = Some(val);
        }

        if let Some(val) = frame.initial_window_size() {
            // Values above the maximum flow-control window size MUST be
            // treated as a connection error of type FLOW_CONTROL_ERROR.
            if val > MAX_WINDOW_SIZE {
                return Err(RecvError::Connection(Reason::FLOW_CONTROL_ERROR));
            }

            if val != self.peer.initial_window_size {
                self.peer.initial_window_size = val;
                applied.initial_window_size = Some(val);
            }
        }

        if let Some(val) = frame.max_frame_size() {
            if val < frame::DEFAULT_MAX_FRAME_SIZE || val > frame::MAX_MAX_FRAME_SIZE {
                return Err(RecvError::Connection(Reason::PROTOCOL_ERROR));
            }

            if val != self.peer.max_frame_size {
                self.peer.max_frame_size = val;
                applied.max_frame_size = Some(val);
            }
        }

        out.frame(frame::Settings::ack().into());
        Ok(applied)
    }
}
