use super::{states, Flags, Guarantee, Op, OpResult, State};

/// Outcome of consulting the diagram for a single transition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Verdict {
    pub permitted: bool,
    /// The calculated state on a permitted transition, the unchanged
    /// input state otherwise.
    pub state: State,
    /// The memory ordering the machine must install when publishing the
    /// transition.
    pub guarantee: Guarantee,
}

impl Verdict {
    #[inline]
    fn permit(state: State, guarantee: Guarantee) -> Verdict {
        Verdict {
            permitted: true,
            state,
            guarantee,
        }
    }

    #[inline]
    fn reject(state: State, guarantee: Guarantee) -> Verdict {
        Verdict {
            permitted: false,
            state,
            guarantee,
        }
    }
}

/// A pure transition function deciding, for every operation, whether it
/// may proceed from the observed state and what state it moves the
/// channel into. Diagrams are stateless; all bookkeeping lives in the
/// state machine applying them.
pub trait StateDiagram: Send + Sync {
    /// Consulted before user work runs. A permitted verdict carries an
    /// acquire guarantee so the work observes everything published by
    /// the previous unlock.
    fn lock_op(&self, op: Op, started_with: State, flags: Flags) -> Verdict;

    /// Consulted after user work finished (or detached). A permitted
    /// verdict carries a release guarantee so the next lock observes the
    /// work's effects. `OpResult::Guarantee` requests the fence alone,
    /// with no state change.
    fn unlock_op(
        &self,
        op: Op,
        started_with: State,
        locked_with: State,
        flags: Flags,
        op_result: OpResult,
    ) -> Verdict;
}

/// The standard channel lifecycle:
/// `NONE -> OPENING -> OPEN(+r,+w) -> CLOSING -> CLOSED`, with the
/// readable/writable modifier bits taken down while a read/write is in
/// flight and restored on completion. Bits outside the recognized set
/// pass through every transition unchanged.
pub struct BasicDiagram;

impl StateDiagram for BasicDiagram {
    fn lock_op(&self, op: Op, started_with: State, flags: Flags) -> Verdict {
        let s = started_with;

        match op {
            Op::Open => {
                // Only a channel that never started opening may open.
                if s.has_any(states::OPENING | states::OPEN | states::CLOSING | states::CLOSED) {
                    return Verdict::reject(s, Guarantee::Acquire);
                }
                Verdict::permit(s + states::OPENING, Guarantee::Acquire)
            }
            Op::Close => {
                // Close is a synchronization point: every capability the
                // channel was declared with must currently be idle, i.e.
                // its state bit present.
                if s.has_any(states::OPENING | states::CLOSING | states::CLOSED) {
                    return Verdict::reject(s, Guarantee::Acquire);
                }
                if !s.has_all(states::operable(flags)) {
                    return Verdict::reject(s, Guarantee::Acquire);
                }
                Verdict::permit(s - states::OPEN + states::CLOSING, Guarantee::Acquire)
            }
            Op::Read => {
                if !s.has_all(states::OPEN | states::READABLE) {
                    return Verdict::reject(s, Guarantee::Acquire);
                }
                Verdict::permit(s - states::READABLE, Guarantee::Acquire)
            }
            Op::Write => {
                if !s.has_all(states::OPEN | states::WRITABLE) {
                    return Verdict::reject(s, Guarantee::Acquire);
                }
                Verdict::permit(s - states::WRITABLE, Guarantee::Acquire)
            }
        }
    }

    fn unlock_op(
        &self,
        op: Op,
        started_with: State,
        _locked_with: State,
        flags: Flags,
        op_result: OpResult,
    ) -> Verdict {
        let s = started_with;

        // The detached path flushes a release fence after the work has
        // been launched; the state stays locked.
        if op_result == OpResult::Guarantee {
            return Verdict::permit(s, Guarantee::Release);
        }

        match op {
            Op::Open => {
                if !s.has_all(states::OPENING) {
                    return Verdict::reject(s, Guarantee::Release);
                }
                match op_result {
                    OpResult::Success => Verdict::permit(
                        s - states::OPENING + states::OPEN + states::operable(flags),
                        Guarantee::Release,
                    ),
                    // A failed open returns the channel to square one.
                    _ => Verdict::permit(s - states::OPENING, Guarantee::Release),
                }
            }
            Op::Close => {
                if !s.has_all(states::CLOSING) {
                    return Verdict::reject(s, Guarantee::Release);
                }
                // Closed is terminal whether the close succeeded or not;
                // the caller decides on a retry policy.
                Verdict::permit(s - states::CLOSING + states::CLOSED, Guarantee::Release)
            }
            Op::Read => {
                if !s.has_all(states::OPEN) || s.has_any(states::READABLE) {
                    return Verdict::reject(s, Guarantee::Release);
                }
                Verdict::permit(s + states::READABLE, Guarantee::Release)
            }
            Op::Write => {
                if !s.has_all(states::OPEN) || s.has_any(states::WRITABLE) {
                    return Verdict::reject(s, Guarantee::Release);
                }
                Verdict::permit(s + states::WRITABLE, Guarantee::Release)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::Constant;
    use crate::channel::flags;

    // Caller-reserved bit that must survive every transition.
    const UNKNOWN_BIT: Constant = 1 << 8;

    fn locks(initial: Constant, op: Op, declared: Constant, expected: Constant) {
        let diagram = BasicDiagram;
        let started = State::new(initial) + UNKNOWN_BIT;

        let verdict = diagram.lock_op(op, started, Flags::new(declared));

        assert!(verdict.permitted, "lock {:?} from {:?}", op, started);
        assert_eq!(verdict.state, State::new(expected) + UNKNOWN_BIT);
        assert_eq!(verdict.guarantee, Guarantee::Acquire);
    }

    fn lock_rejected(initial: Constant, op: Op, declared: Constant) {
        let diagram = BasicDiagram;
        let started = State::new(initial) + UNKNOWN_BIT;

        let verdict = diagram.lock_op(op, started, Flags::new(declared));

        assert!(!verdict.permitted, "lock {:?} from {:?}", op, started);
        assert_eq!(verdict.state, started);
    }

    fn unlocks(
        initial: Constant,
        op: Op,
        declared: Constant,
        op_result: OpResult,
        expected: Constant,
    ) {
        let diagram = BasicDiagram;
        let started = State::new(initial) + UNKNOWN_BIT;

        let verdict =
            diagram.unlock_op(op, started, State::default(), Flags::new(declared), op_result);

        assert!(verdict.permitted, "unlock {:?} from {:?}", op, started);
        assert_eq!(verdict.state, State::new(expected) + UNKNOWN_BIT);
        assert_eq!(verdict.guarantee, Guarantee::Release);
    }

    fn unlock_rejected(initial: Constant, op: Op, op_result: OpResult) {
        let diagram = BasicDiagram;
        let started = State::new(initial) + UNKNOWN_BIT;

        let verdict =
            diagram.unlock_op(op, started, State::default(), Flags::default(), op_result);

        assert!(!verdict.permitted, "unlock {:?} from {:?}", op, started);
        assert_eq!(verdict.state, started);
    }

    #[test]
    fn test_locking_from_none_state() {
        locks(states::NONE, Op::Open, 0, states::OPENING);
        locks(
            states::NONE,
            Op::Open,
            flags::READABLE | flags::WRITABLE,
            states::OPENING,
        );

        lock_rejected(states::NONE, Op::Read, 0);
        lock_rejected(states::NONE, Op::Write, 0);
        lock_rejected(states::NONE, Op::Close, flags::READABLE);
    }

    #[test]
    fn test_locking_from_opening_state() {
        lock_rejected(states::OPENING, Op::Open, 0);
        lock_rejected(states::OPENING, Op::Read, 0);
        lock_rejected(states::OPENING, Op::Write, 0);
        lock_rejected(states::OPENING, Op::Close, 0);
    }

    #[test]
    fn test_locking_reads_and_writes_from_open_state() {
        locks(states::OPEN | states::READABLE, Op::Read, 0, states::OPEN);
        locks(
            states::OPEN | states::READABLE | states::WRITABLE,
            Op::Read,
            0,
            states::OPEN | states::WRITABLE,
        );
        locks(states::OPEN | states::WRITABLE, Op::Write, 0, states::OPEN);
        locks(
            states::OPEN | states::READABLE | states::WRITABLE,
            Op::Write,
            0,
            states::OPEN | states::READABLE,
        );

        // A read in flight blocks further reads; same for writes.
        lock_rejected(states::OPEN, Op::Read, 0);
        lock_rejected(states::OPEN | states::WRITABLE, Op::Read, 0);
        lock_rejected(states::OPEN, Op::Write, 0);
        lock_rejected(states::OPEN | states::READABLE, Op::Write, 0);

        lock_rejected(states::OPEN, Op::Open, 0);
    }

    #[test]
    fn test_locking_close_requires_idle_capabilities() {
        locks(
            states::OPEN | states::READABLE | states::WRITABLE,
            Op::Close,
            flags::READABLE | flags::WRITABLE,
            states::CLOSING | states::READABLE | states::WRITABLE,
        );
        locks(
            states::OPEN | states::WRITABLE,
            Op::Close,
            flags::WRITABLE,
            states::CLOSING | states::WRITABLE,
        );
        locks(
            states::OPEN | states::READABLE,
            Op::Close,
            flags::READABLE,
            states::CLOSING | states::READABLE,
        );
        locks(states::OPEN, Op::Close, 0, states::CLOSING);

        // A declared capability whose bit is down means the stream is
        // busy, so the close must wait.
        lock_rejected(
            states::OPEN | states::WRITABLE,
            Op::Close,
            flags::READABLE | flags::WRITABLE,
        );
        lock_rejected(
            states::OPEN | states::READABLE,
            Op::Close,
            flags::READABLE | flags::WRITABLE,
        );
        lock_rejected(states::OPEN, Op::Close, flags::READABLE | flags::WRITABLE);
        lock_rejected(states::OPEN, Op::Close, flags::WRITABLE);
        lock_rejected(states::OPEN, Op::Close, flags::READABLE);
    }

    #[test]
    fn test_locking_from_closing_state() {
        lock_rejected(states::CLOSING, Op::Open, 0);
        lock_rejected(states::CLOSING, Op::Read, 0);
        lock_rejected(states::CLOSING, Op::Write, 0);
        lock_rejected(states::CLOSING, Op::Close, 0);
    }

    #[test]
    fn test_locking_from_closed_state() {
        lock_rejected(states::CLOSED, Op::Open, 0);
        lock_rejected(states::CLOSED, Op::Read, 0);
        lock_rejected(states::CLOSED, Op::Write, 0);
        lock_rejected(states::CLOSED, Op::Close, 0);
    }

    #[test]
    fn test_unlocking_from_none_state() {
        unlock_rejected(states::NONE, Op::Open, OpResult::Success);
        unlock_rejected(states::NONE, Op::Read, OpResult::Success);
        unlock_rejected(states::NONE, Op::Write, OpResult::Success);
        unlock_rejected(states::NONE, Op::Close, OpResult::Success);
    }

    #[test]
    fn test_unlocking_open_applies_declared_capabilities() {
        unlocks(
            states::OPENING,
            Op::Open,
            flags::READABLE | flags::WRITABLE,
            OpResult::Success,
            states::OPEN | states::READABLE | states::WRITABLE,
        );
        unlocks(
            states::OPENING,
            Op::Open,
            flags::READABLE,
            OpResult::Success,
            states::OPEN | states::READABLE,
        );
        unlocks(
            states::OPENING,
            Op::Open,
            flags::WRITABLE,
            OpResult::Success,
            states::OPEN | states::WRITABLE,
        );
        unlocks(states::OPENING, Op::Open, 0, OpResult::Success, states::OPEN);

        // A failed open falls back to square one regardless of flags.
        unlocks(states::OPENING, Op::Open, 0, OpResult::Failure, states::NONE);
        unlocks(
            states::OPENING,
            Op::Open,
            flags::READABLE | flags::WRITABLE,
            OpResult::Failure,
            states::NONE,
        );

        unlock_rejected(states::OPENING, Op::Read, OpResult::Success);
        unlock_rejected(states::OPENING, Op::Write, OpResult::Success);
        unlock_rejected(states::OPENING, Op::Close, OpResult::Success);
    }

    #[test]
    fn test_unlocking_reads_and_writes_restore_bits() {
        for &result in &[OpResult::Success, OpResult::Failure] {
            unlocks(
                states::OPEN | states::WRITABLE,
                Op::Read,
                0,
                result,
                states::OPEN | states::READABLE | states::WRITABLE,
            );
            unlocks(
                states::OPEN,
                Op::Read,
                0,
                result,
                states::OPEN | states::READABLE,
            );
            unlocks(
                states::OPEN | states::READABLE,
                Op::Write,
                0,
                result,
                states::OPEN | states::READABLE | states::WRITABLE,
            );
            unlocks(
                states::OPEN,
                Op::Write,
                0,
                result,
                states::OPEN | states::WRITABLE,
            );

            // Unlocking an operation that is not in flight fails
            // explicitly.
            unlock_rejected(states::OPEN | states::READABLE, Op::Read, result);
            unlock_rejected(states::OPEN | states::WRITABLE, Op::Write, result);
        }

        unlock_rejected(states::OPEN, Op::Open, OpResult::Success);
        unlock_rejected(states::OPEN, Op::Close, OpResult::Success);
    }

    #[test]
    fn test_unlocking_close_is_terminal_either_way() {
        for &result in &[OpResult::Success, OpResult::Failure] {
            unlocks(
                states::CLOSING | states::READABLE | states::WRITABLE,
                Op::Close,
                0,
                result,
                states::CLOSED | states::READABLE | states::WRITABLE,
            );
            unlocks(
                states::CLOSING | states::WRITABLE,
                Op::Close,
                0,
                result,
                states::CLOSED | states::WRITABLE,
            );
            unlocks(
                states::CLOSING | states::READABLE,
                Op::Close,
                0,
                result,
                states::CLOSED | states::READABLE,
            );
            unlocks(states::CLOSING, Op::Close, 0, result, states::CLOSED);
        }

        unlock_rejected(states::CLOSING, Op::Open, OpResult::Success);
        unlock_rejected(states::CLOSING, Op::Read, OpResult::Success);
        unlock_rejected(states::CLOSING, Op::Write, OpResult::Success);
    }

    #[test]
    fn test_unlocking_from_closed_state() {
        unlock_rejected(states::CLOSED, Op::Open, OpResult::Success);
        unlock_rejected(states::CLOSED, Op::Read, OpResult::Success);
        unlock_rejected(states::CLOSED, Op::Write, OpResult::Success);
        unlock_rejected(states::CLOSED, Op::Close, OpResult::Success);
    }

    #[test]
    fn test_guarantee_result_is_a_pure_fence() {
        let diagram = BasicDiagram;
        let started = State::new(states::OPENING) + UNKNOWN_BIT;

        let verdict = diagram.unlock_op(
            Op::Open,
            started,
            State::default(),
            Flags::default(),
            OpResult::Guarantee,
        );

        assert!(verdict.permitted);
        assert_eq!(verdict.state, started);
        assert_eq!(verdict.guarantee, Guarantee::Release);
    }
}
