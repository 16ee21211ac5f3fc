use super::diagram::StateDiagram;
use super::machine::{StateMachine, Transition};
use super::support::{ChannelError, ChannelResult};
use super::{Flags, Op, OpResult, State};
use crate::bytes::ByteBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub type SuccessSink = Box<dyn FnOnce() + Send>;
pub type FailureSink = Box<dyn FnOnce(ChannelError) + Send>;

struct Core {
    diagram: Box<dyn StateDiagram>,
    machine: Box<dyn StateMachine>,
}

/// Facade bracketing user work between a diagram-governed lock and
/// unlock. A clone is a share of the same machine, so a channel can be
/// held by its owner, by pools and by in-flight detached operations at
/// the same time.
#[derive(Clone)]
pub struct ChannelBase {
    core: Arc<Core>,
}

impl ChannelBase {
    #[inline]
    pub fn new(diagram: Box<dyn StateDiagram>, machine: Box<dyn StateMachine>) -> ChannelBase {
        ChannelBase {
            core: Arc::new(Core { diagram, machine }),
        }
    }

    #[inline]
    pub fn diagram(&self) -> &dyn StateDiagram {
        &*self.core.diagram
    }

    #[inline]
    pub fn machine(&self) -> &dyn StateMachine {
        &*self.core.machine
    }

    #[inline]
    pub fn state(&self) -> State {
        self.core.machine.state()
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        self.core.machine.flags()
    }

    /// Runs `work` bracketed by the lock and unlock transitions of `op`.
    ///
    /// If the diagram rejects the lock, returns the denied transition and
    /// `work` never runs. If `work` returns `Ok`, the operation unlocks
    /// with `Success` and the returned transition carries the state
    /// observed before the lock and the state after the unlock. If `work`
    /// fails (or panics), the operation unlocks with `Failure` before the
    /// error continues on its way.
    pub fn do_as<F>(&self, op: Op, work: F) -> ChannelResult<Transition>
    where
        F: FnOnce() -> ChannelResult<()>,
    {
        let locked = self.core.machine.lock_op(&*self.core.diagram, op);

        if !locked.ok {
            return Ok(locked);
        }

        let locked_with = locked.resulting;

        let mut guard = FailureUnlock::arm(self, op, locked_with);
        let outcome = work();
        guard.disarm();

        match outcome {
            Ok(()) => {
                let unlocked = self.unlock(op, locked_with, OpResult::Success);
                Ok(Transition::applied(locked.observed, unlocked.resulting))
            }
            Err(err) => {
                self.unlock(op, locked_with, OpResult::Failure);
                Err(err)
            }
        }
    }

    /// Launches `op` without waiting for it to finish. `work` receives a
    /// one-shot [`Completion`] token it may resolve on the spot or carry
    /// off to another thread; the engine unlocks the operation when the
    /// token fires and then forwards to the matching sink.
    ///
    /// Three shapes of a launched operation:
    ///
    /// - `work` fired the token (either way): the transition is already
    ///   unlocked and the sink has run.
    /// - `work` returned a domain error without firing: the engine
    ///   unlocks with `Failure`, hands the error to `on_failure`, and the
    ///   launch still counts as successful.
    /// - `work` returned `Ok` without firing: the operation is in flight.
    ///   The engine installs a release fence and leaves the state locked
    ///   until the token fires.
    ///
    /// The returned transition carries the locked state, not the final
    /// one. A panic in `work` unlocks with `Failure` and propagates; no
    /// sink runs.
    pub fn do_as_detached<F>(
        &self,
        op: Op,
        work: F,
        on_success: SuccessSink,
        on_failure: FailureSink,
    ) -> ChannelResult<Transition>
    where
        F: FnOnce(Completion) -> ChannelResult<()>,
    {
        let locked = self.core.machine.lock_op(&*self.core.diagram, op);

        if !locked.ok {
            return Ok(locked);
        }

        let locked_with = locked.resulting;
        let shared = Arc::new(CompletionShared {
            fired: AtomicBool::new(false),
            on_success: Mutex::new(Some(on_success)),
            on_failure: Mutex::new(Some(on_failure)),
        });

        let completion = Completion {
            base: self.clone(),
            op,
            locked_with,
            shared: shared.clone(),
        };

        let mut guard = DetachedFailureUnlock::arm(self, op, locked_with, &shared);
        let outcome = work(completion);
        guard.disarm();

        let launched = Transition::applied(locked.observed, locked_with);

        match outcome {
            Ok(()) => {
                if !shared.fired.load(Ordering::Acquire) {
                    // The work detached. Flush a release fence so the
                    // resolving thread observes everything done so far;
                    // the state stays locked until the token fires.
                    self.unlock(op, locked_with, OpResult::Guarantee);
                }
                Ok(launched)
            }
            Err(err) => {
                if !shared.fired.swap(true, Ordering::AcqRel) {
                    self.unlock(op, locked_with, OpResult::Failure);
                }
                if let Some(sink) = shared.take_failure() {
                    sink(err);
                }
                Ok(launched)
            }
        }
    }

    /// Unlocks a previously locked operation. A rejection here means the
    /// diagram contradicted itself, which no caller can recover from.
    fn unlock(&self, op: Op, locked_with: State, op_result: OpResult) -> Transition {
        let unlocked = self
            .core
            .machine
            .unlock_op(&*self.core.diagram, op, locked_with, op_result);

        if !unlocked.ok {
            panic!(
                "Unlock of {:?} rejected after a successful lock - diagram invariant broken",
                op
            );
        }

        unlocked
    }
}

struct CompletionShared {
    fired: AtomicBool,
    on_success: Mutex<Option<SuccessSink>>,
    on_failure: Mutex<Option<FailureSink>>,
}

impl CompletionShared {
    #[inline]
    fn take_success(&self) -> Option<SuccessSink> {
        self.on_success
            .lock()
            .expect("Completion sink mutex poisoned")
            .take()
    }

    #[inline]
    fn take_failure(&self) -> Option<FailureSink> {
        self.on_failure
            .lock()
            .expect("Completion sink mutex poisoned")
            .take()
    }
}

/// One-shot resolution token for a detached operation. Firing it unlocks
/// the pending transition and forwards to the corresponding sink; a token
/// that is never fired leaves the operation in flight.
pub struct Completion {
    base: ChannelBase,
    op: Op,
    locked_with: State,
    shared: Arc<CompletionShared>,
}

impl Completion {
    /// Resolves the operation as successful: unlocks with `Success`, then
    /// runs the success sink.
    pub fn succeed(self) {
        if self.shared.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        self.base.unlock(self.op, self.locked_with, OpResult::Success);

        if let Some(sink) = self.shared.take_success() {
            sink();
        }
    }

    /// Resolves the operation as failed: unlocks with `Failure`, then
    /// hands the error to the failure sink.
    pub fn fail(self, err: ChannelError) {
        if self.shared.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        self.base.unlock(self.op, self.locked_with, OpResult::Failure);

        if let Some(sink) = self.shared.take_failure() {
            sink(err);
        }
    }
}

// Restores the machine with a failure unlock when blocking work unwinds.
struct FailureUnlock<'a> {
    base: &'a ChannelBase,
    op: Op,
    locked_with: State,
    armed: bool,
}

impl<'a> FailureUnlock<'a> {
    #[inline]
    fn arm(base: &'a ChannelBase, op: Op, locked_with: State) -> FailureUnlock<'a> {
        FailureUnlock {
            base,
            op,
            locked_with,
            armed: true,
        }
    }

    #[inline]
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<'a> Drop for FailureUnlock<'a> {
    fn drop(&mut self) {
        if self.armed {
            self.base.unlock(self.op, self.locked_with, OpResult::Failure);
        }
    }
}

// Same for detached work, except a token that already fired owns the
// unlock and the guard must stand down.
struct DetachedFailureUnlock<'a> {
    base: &'a ChannelBase,
    op: Op,
    locked_with: State,
    shared: &'a Arc<CompletionShared>,
    armed: bool,
}

impl<'a> DetachedFailureUnlock<'a> {
    #[inline]
    fn arm(
        base: &'a ChannelBase,
        op: Op,
        locked_with: State,
        shared: &'a Arc<CompletionShared>,
    ) -> DetachedFailureUnlock<'a> {
        DetachedFailureUnlock {
            base,
            op,
            locked_with,
            shared,
            armed: true,
        }
    }

    #[inline]
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<'a> Drop for DetachedFailureUnlock<'a> {
    fn drop(&mut self) {
        if self.armed && !self.shared.fired.swap(true, Ordering::AcqRel) {
            self.base.unlock(self.op, self.locked_with, OpResult::Failure);
        }
    }
}

/// A single I/O endpoint with its lifecycle run by the engine. Concrete
/// channels implement the operations they support by bracketing device
/// I/O with `do_as`; the default bodies make unsupported operations
/// explicit.
pub trait Channel: Send + Sync {
    fn base(&self) -> &ChannelBase;

    #[inline]
    fn state(&self) -> State {
        self.base().state()
    }

    #[inline]
    fn flags(&self) -> Flags {
        self.base().flags()
    }

    fn open(&self) -> ChannelResult<Transition> {
        Err(ChannelError::unsupported())
    }

    fn close(&self) -> ChannelResult<Transition> {
        Err(ChannelError::unsupported())
    }

    fn read(&self, _dst: &mut ByteBuffer) -> ChannelResult<Transition> {
        Err(ChannelError::unsupported())
    }

    fn write(&self, _src: &mut ByteBuffer) -> ChannelResult<Transition> {
        Err(ChannelError::unsupported())
    }
}
