//! Single-buffer engine.
//!
//! One fixed-capacity byte array serves either as read-ahead (bytes fetched
//! from the descriptor and not yet consumed) or as write-behind staging
//! (bytes accepted from the caller and not yet written). Which role it plays
//! is a tagged state, so a read cursor can never coexist with pending writes.
//!
//! Invariants:
//! - `Reading { size, cursor }`: `cursor <= size <= capacity`, `size > 0`
//! - `Writing { cursor }`: `0 < cursor <= capacity`
//! - capacity is fixed at creation and never zero

/// What the buffer currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Nothing pending in either direction.
    Empty,
    /// `size` bytes were filled from the descriptor; `cursor` were consumed.
    Reading { size: usize, cursor: usize },
    /// `cursor` bytes are staged for write-back.
    Writing { cursor: usize },
}

/// Direction of the most recent buffered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastOp {
    None,
    Read,
    Write,
}

/// Fixed-capacity stream buffer.
#[derive(Debug)]
pub struct StreamBuffer {
    data: Box<[u8]>,
    state: BufferState,
}

impl StreamBuffer {
    /// Create an empty buffer. A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            state: BufferState::Empty,
        }
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current state.
    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Direction implied by the current state.
    pub fn last_op(&self) -> LastOp {
        match self.state {
            BufferState::Empty => LastOp::None,
            BufferState::Reading { .. } => LastOp::Read,
            BufferState::Writing { .. } => LastOp::Write,
        }
    }

    /// Drop everything; back to [`BufferState::Empty`].
    pub fn reset(&mut self) {
        self.state = BufferState::Empty;
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Take the next read-ahead byte, if one is loaded and unconsumed.
    pub fn next_byte(&mut self) -> Option<u8> {
        match self.state {
            BufferState::Reading { size, cursor } if cursor < size => {
                self.state = BufferState::Reading {
                    size,
                    cursor: cursor + 1,
                };
                Some(self.data[cursor])
            }
            _ => None,
        }
    }

    /// Bytes filled but not yet consumed.
    pub fn unread(&self) -> usize {
        match self.state {
            BufferState::Reading { size, cursor } => size - cursor,
            _ => 0,
        }
    }

    /// Whole buffer as a fill target. Any previous contents are discarded.
    ///
    /// Follow with [`commit_fill`](Self::commit_fill) once the read returned.
    pub fn fill_target(&mut self) -> &mut [u8] {
        self.state = BufferState::Empty;
        &mut self.data
    }

    /// Record that `n` bytes were filled. `n == 0` leaves the buffer empty.
    pub fn commit_fill(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.state = if n == 0 {
            BufferState::Empty
        } else {
            BufferState::Reading { size: n, cursor: 0 }
        };
    }

    // -----------------------------------------------------------------------
    // Write side
    // -----------------------------------------------------------------------

    /// Stage one byte. Returns `true` once the buffer is full.
    ///
    /// The caller must flush a full buffer before staging more, and must
    /// have left read mode first.
    pub fn push(&mut self, byte: u8) -> bool {
        let cursor = match self.state {
            BufferState::Writing { cursor } => cursor,
            _ => 0,
        };
        debug_assert!(cursor < self.data.len(), "push into a full buffer");
        self.data[cursor] = byte;
        self.state = BufferState::Writing { cursor: cursor + 1 };
        cursor + 1 == self.data.len()
    }

    /// Bytes staged for write-back.
    pub fn pending_write(&self) -> &[u8] {
        match self.state {
            BufferState::Writing { cursor } => &self.data[..cursor],
            _ => &[],
        }
    }
}
