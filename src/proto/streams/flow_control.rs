use error::Reason;
use proto::{WindowSize, MAX_WINDOW_SIZE};

/// A single flow-control window, usable for either scope and either
/// direction.
#[derive(Copy, Clone, Debug)]
pub struct FlowControl {
    /// Window size as seen by the peer. This can go negative after the
    /// peer lowers SETTINGS_INITIAL_WINDOW_SIZE.
    window: i32,
}

impl FlowControl {
    pub fn new(sz: WindowSize) -> FlowControl {
        debug_assert!(sz <= MAX_WINDOW_SIZE);
        FlowControl { window: sz as i32 }
    }

    /// The signed window value.
    pub fn window(&self) -> i32 {
        self.window
    }

    /// Window capacity currently available to the consumer.
    pub fn available(&self) -> WindowSize {
        if self.window < 0 {
            0
        } else {
            self.window as WindowSize
        }
    }

    /// Grow the window, from a WINDOW_UPDATE or local replenishment.
    ///
    /// The window may never exceed 2^31-1 octets.
    pub fn inc_window(&mut self, sz: WindowSize) -> Result<(), Reason> {
        let next = self.window as i64 + sz as i64;

        if next > MAX_WINDOW_SIZE as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        self.window = next as i32;
        Ok(())
    }

    /// Consume window capacity; data was sent or received.
    ///
    /// The caller must have established that the capacity is available.
    pub fn dec_window(&mut self, sz: WindowSize) {
        debug_assert!(self.window >= sz as i32);
        self.window -= sz as i32;
    }

    /// Check that `sz` octets fit in the window.
    pub fn ensure_window(&self, sz: WindowSize) -> Result<(), Reason> {
        if sz as i64 > self.window as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        Ok(())
    }

    /// Apply a SETTINGS_INITIAL_WINDOW_SIZE delta. The result is allowed
    /// to go negative.
    pub fn apply_delta(&mut self, delta: i64) -> Result<(), Reason> {
        let next = self.window as i64 + delta;

        if next > MAX_WINDOW_SIZE as i64 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        debug_assert!(next >= -(MAX_WINDOW_SIZE as i64));
        self.window = next as i32;
        Ok(())
    }
}
