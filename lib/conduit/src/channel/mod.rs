//! The channel modules implement the lifecycle engine: a pure transition
//! diagram, the state machines applying it under concurrency, the channel
//! facade bracketing user work between lock and unlock, and the pool of
//! shared channels.

pub mod base;
pub mod diagram;
pub mod machine;
pub mod pool;
pub mod support;

use crate::bits::BitField;
use std::sync::atomic::Ordering;

/// Bit word describing where a channel is in its lifecycle.
pub type State = BitField;

/// Bit word declaring the capabilities a channel was created with.
pub type Flags = BitField;

/// Capability flags. Declared once at channel construction, never changed
/// afterwards.
pub mod flags {
    use crate::bits::Constant;

    pub const READABLE: Constant = 1 << 0;
    pub const WRITABLE: Constant = 1 << 1;
}

/// State bits. The main-state bits (`OPENING`, `OPEN`, `CLOSING`,
/// `CLOSED`) are mutually exclusive at all times; the `READABLE` and
/// `WRITABLE` modifier bits ride on top of `OPEN`/`CLOSING`. Bits above
/// the low byte are reserved for callers and are preserved verbatim by
/// every transition.
pub mod states {
    use super::{flags, Flags, State};
    use crate::bits::Constant;

    pub const NONE: Constant = 0;
    pub const OPENING: Constant = 1 << 0;
    pub const OPEN: Constant = 1 << 1;
    pub const READABLE: Constant = 1 << 2;
    pub const WRITABLE: Constant = 1 << 3;
    pub const CLOSING: Constant = 1 << 4;
    pub const CLOSED: Constant = 1 << 5;

    /// Maps declared capability flags onto the state bits that must be
    /// idle for a close to proceed.
    #[inline]
    pub fn operable(declared: Flags) -> State {
        let mut op = State::default();

        if declared.has_any(flags::READABLE) {
            op += READABLE;
        }
        if declared.has_any(flags::WRITABLE) {
            op += WRITABLE;
        }

        op
    }
}

/// The four channel operations sequenced by the engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Op {
    Open,
    Read,
    Write,
    Close,
}

/// Outcome reported when unlocking an operation. `Guarantee` is the
/// detached-path special: no state change, only a release fence.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OpResult {
    Success,
    Failure,
    Guarantee,
}

/// Memory ordering installed by a transition, so that user work executed
/// between lock and unlock is correctly synchronized.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Guarantee {
    Acquire,
    Release,
    AcqRel,
}

impl Guarantee {
    /// The atomic ordering to use when the transition is published via a
    /// compare-and-swap.
    #[inline]
    pub fn ordering(self) -> Ordering {
        match self {
            Guarantee::Acquire => Ordering::Acquire,
            Guarantee::Release => Ordering::Release,
            Guarantee::AcqRel => Ordering::AcqRel,
        }
    }
}
