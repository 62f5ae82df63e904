// SPDX-License-Identifier: MIT OR Apache-2.0
//! The dispatch state machine, common to every protocol driver (§4.4).

use gottp_error::Error;

/// States a single dispatch attempt moves through.
///
/// Cancellation from any non-terminal state moves directly to `Failed` with
/// a `Canceled` cause. `Streaming` terminates on explicit close,
/// end-of-stream, or error, never by timeout alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No work has started.
    Idle,
    /// Variables are being resolved and auth is being applied.
    Preparing,
    /// The wire request has been sent; awaiting the first response bytes.
    InFlight,
    /// A complete, non-streaming response is being assembled.
    Responding,
    /// Frames are arriving incrementally (WebSocket, gRPC streaming).
    Streaming,
    /// The attempt ended in an error (including cancellation).
    Failed,
    /// The attempt reached a terminal, successful end.
    Completed,
}

impl DispatchState {
    /// `true` for `Failed` and `Completed` — no further transitions occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Failed | DispatchState::Completed)
    }

    /// Validate a single transition against the state machine in §4.4.
    ///
    /// Cancellation (`Failed` from any non-terminal state) is always legal
    /// and is checked by the caller before consulting this table.
    pub fn can_transition(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, InFlight)
                | (Preparing, Failed)
                | (InFlight, Responding)
                | (InFlight, Streaming)
                | (InFlight, Failed)
                | (Responding, Completed)
                | (Responding, Failed)
                | (Streaming, Completed)
                | (Streaming, Failed)
        )
    }
}

/// Tracks one dispatch attempt's current [`DispatchState`] and rejects any
/// transition `can_transition` doesn't allow, so the state machine is
/// actually enforced during dispatch rather than just described by it.
#[derive(Debug)]
pub struct StateCursor {
    current: DispatchState,
}

impl StateCursor {
    /// Start a fresh cursor in `Idle`.
    pub fn new() -> Self {
        Self { current: DispatchState::Idle }
    }

    /// The cursor's current state.
    pub fn state(&self) -> DispatchState {
        self.current
    }

    /// Move to `next`. A move to `Failed` from any non-terminal state is
    /// always legal (cancellation can land from anywhere); every other
    /// transition is checked against [`DispatchState::can_transition`].
    pub fn advance(&mut self, next: DispatchState) -> Result<(), Error> {
        let legal = (next == DispatchState::Failed && !self.current.is_terminal()) || self.current.can_transition(next);
        if !legal {
            return Err(Error::internal(format!("illegal dispatch state transition: {:?} -> {:?}", self.current, next)));
        }
        self.current = next;
        Ok(())
    }
}

impl Default for StateCursor {
    fn default() -> Self {
        Self::new()
    }
}
