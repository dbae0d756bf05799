//! Packed states and the status of successor computations.

use bitflags::bitflags;
use std::ops::{Deref, DerefMut};

/// A packed state: the values of all variables, channel buffers and control states of a model,
/// laid out according to a [`StateLayout`](crate::StateLayout).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct State(Box<[u8]>);

impl State {
    /// An all-zero state of the given size.
    pub fn zeroed(size: usize) -> Self {
        Self(vec![0; size].into_boxed_slice())
    }

    /// Size of the state in bytes.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Consumes the state and returns its bytes.
    pub fn into_bytes(self) -> Box<[u8]> {
        self.0
    }
}

impl From<Vec<u8>> for State {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl Deref for State {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for State {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

bitflags! {
    /// Outcome of a successor computation.
    ///
    /// A state that is neither erroneous nor deadlocked has [`Status::NORMAL`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u8 {
        /// At least one successor is the error state.
        const ERROR = 1;
        /// The system (property process excluded) cannot move.
        const DEADLOCK = 2;
    }
}

impl Status {
    /// No error and no deadlock.
    pub const NORMAL: Status = Status::empty();
}
