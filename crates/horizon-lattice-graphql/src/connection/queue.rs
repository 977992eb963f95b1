//! Outbound frame queue with activation gating.

use std::collections::VecDeque;

use super::state::ConnectionState;

/// An encoded frame waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutboundFrame {
    /// The encoded text frame.
    pub text: String,
    /// Set for `start` frames: the subscription the frame opens.
    pub starts: Option<String>,
}

impl OutboundFrame {
    pub(crate) fn new(text: String, starts: Option<String>) -> Self {
        Self { text, starts }
    }
}

/// FIFO of encoded frames with at most one frame in flight.
///
/// Frames are released only while the connection is [`ConnectionState::Active`],
/// one at a time: the next frame is handed out after the writer reports the
/// previous send as complete, whether it succeeded or not.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    frames: VecDeque<OutboundFrame>,
    in_flight: bool,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a frame to the tail.
    pub(crate) fn enqueue(&mut self, frame: OutboundFrame) {
        self.frames.push_back(frame);
    }

    /// Pop the head frame if it may be sent now.
    ///
    /// Returns `None` while not Active, while a frame is in flight, or when
    /// empty. A returned frame is in flight until [`complete`](Self::complete).
    pub(crate) fn drain(&mut self, state: ConnectionState) -> Option<OutboundFrame> {
        if !state.is_active() || self.in_flight {
            return None;
        }
        let frame = self.frames.pop_front()?;
        self.in_flight = true;
        Some(frame)
    }

    /// Mark the in-flight frame as finished.
    pub(crate) fn complete(&mut self) {
        self.in_flight = false;
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    /// Drop everything still waiting.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        self.in_flight = false;
        dropped
    }
}
