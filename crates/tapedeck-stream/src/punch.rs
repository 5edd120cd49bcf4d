//! Punch-in/punch-out slicing of capture batches.
//!
//! The capture disk thread moves audio in batches covering `[bS, bE)`. Each
//! batch is checked against the current window `[pS, pE)` by [`transition`],
//! a pure function returning the next state and the sub-range to persist.
//! When a window closes the caller re-arms for the next window of its
//! [`PunchPlan`] and feeds the rest of the same batch through again.

use std::collections::VecDeque;
use std::ops::Range;
use tapedeck_core::Error;

/// Window end meaning "until stopped".
pub const UNBOUNDED: u64 = u64::MAX;

/// Frames `[start, end)` to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunchWindow {
    pub start: u64,
    pub end: u64,
}

impl PunchWindow {
    pub fn new(start: u64, end: u64) -> Result<Self, Error> {
        if end <= start {
            return Err(Error::InvalidPunchWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window that stays open until the capture is stopped.
    pub fn unbounded(start: u64) -> Self {
        Self {
            start,
            end: UNBOUNDED,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.end == UNBOUNDED
    }

    pub fn contains(&self, frame: u64) -> bool {
        (self.start..self.end).contains(&frame)
    }

    /// Intersection with `[from, to)`, if not empty.
    pub fn clamp(&self, from: u64, to: u64) -> Option<Self> {
        let start = self.start.max(from);
        let end = self.end.min(to);
        (start < end).then_some(Self { start, end })
    }
}

/// Where the capture is relative to the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PunchState {
    /// Waiting for the window to open.
    #[default]
    Recording,
    /// Inside the window, capture object open.
    PunchedIn,
}

/// What to do with one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PunchAction {
    /// Batch lies before the window.
    Discard,
    /// Window opens inside the batch: open a capture, write the range.
    PunchIn(Range<u64>),
    /// Batch lies inside the window.
    Write(Range<u64>),
    /// Window closes inside the batch: write the range, finalize.
    PunchOut(Range<u64>),
    /// Window opens and closes inside the same batch.
    PunchInOut(Range<u64>),
}

impl PunchAction {
    /// Frames to persist, if any.
    pub fn write_range(&self) -> Option<Range<u64>> {
        match self {
            PunchAction::Discard => None,
            PunchAction::PunchIn(r)
            | PunchAction::Write(r)
            | PunchAction::PunchOut(r)
            | PunchAction::PunchInOut(r) => (!r.is_empty()).then(|| r.clone()),
        }
    }

    /// The window is closed after this action.
    pub fn closes(&self) -> bool {
        matches!(self, PunchAction::PunchOut(_) | PunchAction::PunchInOut(_))
    }
}

/// Advance the punch state over `batch`.
pub fn transition(
    state: PunchState,
    batch: Range<u64>,
    window: PunchWindow,
) -> (PunchState, PunchAction) {
    match state {
        PunchState::Recording => {
            if batch.end <= window.start {
                return (PunchState::Recording, PunchAction::Discard);
            }
            let from = batch.start.max(window.start);
            if batch.end >= window.end {
                let to = window.end.max(from);
                (PunchState::Recording, PunchAction::PunchInOut(from..to))
            } else {
                (PunchState::PunchedIn, PunchAction::PunchIn(from..batch.end))
            }
        }
        PunchState::PunchedIn => {
            if batch.end >= window.end {
                let to = window.end.max(batch.start);
                (PunchState::Recording, PunchAction::PunchOut(batch.start..to))
            } else {
                (PunchState::PunchedIn, PunchAction::Write(batch))
            }
        }
    }
}

/// Ordered windows of one capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PunchPlan {
    windows: VecDeque<PunchWindow>,
}

impl PunchPlan {
    /// Windows for a session recording `[record_start, record_stop)`.
    ///
    /// Without punch windows the whole session is one window. Punch windows
    /// are clipped to the session and sorted; windows outside it are dropped.
    pub fn new(record_start: u64, record_stop: u64, punch: &[PunchWindow]) -> Self {
        let windows = if punch.is_empty() {
            PunchWindow {
                start: record_start,
                end: record_stop,
            }
            .clamp(record_start, record_stop)
            .into_iter()
            .collect()
        } else {
            let mut clipped: Vec<_> = punch
                .iter()
                .filter_map(|w| w.clamp(record_start, record_stop))
                .collect();
            clipped.sort_by_key(|w| w.start);
            clipped.into()
        };
        Self { windows }
    }

    /// Current window with its end clamped to `stop`. `None` once no window
    /// starts before `stop`.
    pub fn current(&self, stop: u64) -> Option<PunchWindow> {
        self.windows.front().and_then(|w| w.clamp(w.start, stop))
    }

    /// Re-arm for the next window.
    pub fn advance(&mut self) -> Option<PunchWindow> {
        self.windows.pop_front();
        self.windows.front().copied()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn windows(&self) -> impl Iterator<Item = &PunchWindow> {
        self.windows.iter()
    }
}
