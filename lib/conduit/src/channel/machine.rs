use super::diagram::StateDiagram;
use super::{states, Flags, Guarantee, Op, OpResult, State};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Outcome of applying a transition to a machine: whether it took hold,
/// the state observed on invocation and the state left behind.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Transition {
    pub ok: bool,
    pub observed: State,
    pub resulting: State,
}

impl Transition {
    #[inline]
    pub(crate) fn applied(observed: State, resulting: State) -> Transition {
        Transition {
            ok: true,
            observed,
            resulting,
        }
    }

    #[inline]
    pub(crate) fn denied(current: State) -> Transition {
        Transition {
            ok: false,
            observed: current,
            resulting: current,
        }
    }
}

/// Stateful holder of the state word. The machine applies diagram
/// transitions atomically and publishes the ordering the diagram asks
/// for, so user work bracketed by `lock_op`/`unlock_op` is synchronized
/// across threads.
///
/// Flags are single-writer: they are declared before the first operation
/// and only read afterwards.
pub trait StateMachine: Send + Sync {
    /// Snapshot of the current state word. Never tears.
    fn state(&self) -> State;

    fn flags(&self) -> Flags;

    fn set_flags(&self, desired: Flags);

    /// Compare-and-set with the given ordering. On mismatch returns
    /// `ok = false` carrying the current word.
    fn set_state(&self, expected: State, desired: State, guarantee: Guarantee) -> Transition;

    /// Consults the diagram against a snapshot and applies the permitted
    /// transition, retrying on concurrent interference until the diagram
    /// itself rejects.
    fn lock_op(&self, diagram: &dyn StateDiagram, op: Op) -> Transition;

    /// The unlock counterpart of `lock_op`. `OpResult::Guarantee` turns
    /// the call into a pure release fence.
    fn unlock_op(
        &self,
        diagram: &dyn StateDiagram,
        op: Op,
        locked_with: State,
        op_result: OpResult,
    ) -> Transition;

    /// Publishes a no-op transition to install the requested fence
    /// without changing the state.
    fn provide_guarantee(&self, guarantee: Guarantee) {
        let mut current = self.state();

        loop {
            let result = self.set_state(current, current, guarantee);
            if result.ok {
                return;
            }
            current = result.observed;
        }
    }

    /// Blocking variants park the caller until the predicate holds and
    /// report `true`; non-blocking variants report `false` immediately.
    fn wait_unconditionally(&self, predicate: &dyn Fn(State) -> bool) -> bool;
}

/// Lock-free machine over two atomic words. Reads are relaxed; the
/// acquire/release discipline rides on the compare-and-swap publishing
/// each transition (and on `provide_guarantee` for fences without a
/// state change).
///
/// Known limitation: concurrent READ and WRITE on the same channel are
/// sequenced only through the r/w state bits. The engine orders its own
/// bookkeeping, not user payload; two observers of shared user data under
/// a read held while a write begins can still see intermediates.
pub struct AtomicMachine {
    state: AtomicU32,
    flags: AtomicU32,
}

impl AtomicMachine {
    #[inline]
    pub fn new() -> AtomicMachine {
        AtomicMachine {
            state: AtomicU32::new(states::NONE),
            flags: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn with_flags(flags: Flags) -> AtomicMachine {
        let machine = AtomicMachine::new();
        machine.set_flags(flags);
        machine
    }
}

impl StateMachine for AtomicMachine {
    #[inline]
    fn state(&self) -> State {
        State::new(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    fn flags(&self) -> Flags {
        Flags::new(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    fn set_flags(&self, desired: Flags) {
        self.flags.store(desired.value, Ordering::Release);
    }

    fn set_state(&self, expected: State, desired: State, guarantee: Guarantee) -> Transition {
        match self.state.compare_exchange(
            expected.value,
            desired.value,
            guarantee.ordering(),
            Ordering::Relaxed,
        ) {
            Ok(previous) => Transition::applied(State::new(previous), desired),
            Err(current) => Transition::denied(State::new(current)),
        }
    }

    fn lock_op(&self, diagram: &dyn StateDiagram, op: Op) -> Transition {
        loop {
            let observed = self.state();
            let verdict = diagram.lock_op(op, observed, self.flags());

            if !verdict.permitted {
                return Transition::denied(observed);
            }

            // The CAS can lose to a concurrent transition; re-read and
            // consult the diagram again.
            if self.set_state(observed, verdict.state, verdict.guarantee).ok {
                return Transition::applied(observed, verdict.state);
            }
        }
    }

    fn unlock_op(
        &self,
        diagram: &dyn StateDiagram,
        op: Op,
        locked_with: State,
        op_result: OpResult,
    ) -> Transition {
        loop {
            let observed = self.state();
            let verdict = diagram.unlock_op(op, observed, locked_with, self.flags(), op_result);

            if !verdict.permitted {
                return Transition::denied(observed);
            }

            if self.set_state(observed, verdict.state, verdict.guarantee).ok {
                return Transition::applied(observed, verdict.state);
            }
        }
    }

    #[inline]
    fn wait_unconditionally(&self, _predicate: &dyn Fn(State) -> bool) -> bool {
        false
    }
}

struct Shared {
    state: State,
    // Monotonically increasing count of forced wake-ups. A waiter
    // comparing against its entry snapshot can tell a notify() from a
    // spurious wake-up.
    signals: u64,
}

/// Mutex-and-condvar machine. The mutex release/acquire semantics
/// subsume the diagram's fences; on top of the `StateMachine` contract it
/// offers predicate waits with timeout and force cancellation.
pub struct BlockingMachine {
    shared: Mutex<Shared>,
    cv: Condvar,
    flags: AtomicU32,
}

impl BlockingMachine {
    #[inline]
    pub fn new() -> BlockingMachine {
        BlockingMachine {
            shared: Mutex::new(Shared {
                state: State::new(states::NONE),
                signals: 0,
            }),
            cv: Condvar::new(),
            flags: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn with_flags(flags: Flags) -> BlockingMachine {
        let machine = BlockingMachine::new();
        machine.set_flags(flags);
        machine
    }

    /// Forces every pending `wait` awake. Woken waiters re-evaluate their
    /// predicate and return whatever it yields.
    pub fn notify(&self) {
        {
            let mut shared = self.lock();
            shared.signals += 1;
        }
        self.cv.notify_all();
    }

    /// Parks the caller until the predicate holds, the state turns
    /// `CLOSED`, or `notify` is called. Returns the predicate value after
    /// wake-up along with the states observed before and after.
    pub fn wait<P: Fn(State) -> bool>(&self, predicate: P) -> Transition {
        self.wait_internal(None, predicate)
    }

    /// Like `wait`, additionally bounded by the supplied timeout.
    pub fn wait_for<P: Fn(State) -> bool>(&self, timeout: Duration, predicate: P) -> Transition {
        self.wait_internal(Some(timeout), predicate)
    }

    fn wait_internal<P: Fn(State) -> bool>(
        &self,
        timeout: Option<Duration>,
        predicate: P,
    ) -> Transition {
        let mut shared = self.lock();
        let before = shared.state;

        if predicate(before) {
            return Transition::applied(before, before);
        }
        if before.has_any(states::CLOSED) {
            return Transition::denied(before);
        }

        let entry_signals = shared.signals;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            shared = match deadline {
                None => self
                    .cv
                    .wait(shared)
                    .expect("State machine mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();

                    if now >= deadline {
                        let after = shared.state;
                        return Transition {
                            ok: predicate(after),
                            observed: before,
                            resulting: after,
                        };
                    }

                    let (guard, _) = self
                        .cv
                        .wait_timeout(shared, deadline - now)
                        .expect("State machine mutex poisoned");
                    guard
                }
            };

            let after = shared.state;

            // Absorb spurious wake-ups by re-evaluating everything under
            // the lock.
            if predicate(after)
                || after.has_any(states::CLOSED)
                || shared.signals != entry_signals
            {
                return Transition {
                    ok: predicate(after),
                    observed: before,
                    resulting: after,
                };
            }
        }
    }

    #[inline]
    fn lock(&self) -> std::sync::MutexGuard<Shared> {
        self.shared.lock().expect("State machine mutex poisoned")
    }
}

impl StateMachine for BlockingMachine {
    #[inline]
    fn state(&self) -> State {
        self.lock().state
    }

    #[inline]
    fn flags(&self) -> Flags {
        Flags::new(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    fn set_flags(&self, desired: Flags) {
        self.flags.store(desired.value, Ordering::Release);
    }

    fn set_state(&self, expected: State, desired: State, _guarantee: Guarantee) -> Transition {
        let changed = {
            let mut shared = self.lock();

            if shared.state != expected {
                return Transition::denied(shared.state);
            }

            shared.state = desired;
            expected != desired
        };

        // Waiters only care about actual state changes.
        if changed {
            self.cv.notify_all();
        }

        Transition::applied(expected, desired)
    }

    fn lock_op(&self, diagram: &dyn StateDiagram, op: Op) -> Transition {
        let (observed, verdict) = {
            let mut shared = self.lock();
            let observed = shared.state;
            let verdict = diagram.lock_op(op, observed, self.flags());

            if !verdict.permitted {
                return Transition::denied(observed);
            }

            shared.state = verdict.state;
            (observed, verdict)
        };

        if observed != verdict.state {
            self.cv.notify_all();
        }

        Transition::applied(observed, verdict.state)
    }

    fn unlock_op(
        &self,
        diagram: &dyn StateDiagram,
        op: Op,
        locked_with: State,
        op_result: OpResult,
    ) -> Transition {
        let (observed, verdict) = {
            let mut shared = self.lock();
            let observed = shared.state;
            let verdict = diagram.unlock_op(op, observed, locked_with, self.flags(), op_result);

            if !verdict.permitted {
                return Transition::denied(observed);
            }

            shared.state = verdict.state;
            (observed, verdict)
        };

        if observed != verdict.state {
            self.cv.notify_all();
        }

        Transition::applied(observed, verdict.state)
    }

    #[inline]
    fn wait_unconditionally(&self, predicate: &dyn Fn(State) -> bool) -> bool {
        self.wait(predicate).ok
    }
}
