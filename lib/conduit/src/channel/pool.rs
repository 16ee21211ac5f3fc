use super::base::Channel;
use super::State;
use crate::bits::Constant;
use ballast::choose;
use ballast::logging;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Key a channel is registered under. Keys are issued monotonically
/// starting right above `CHANNEL_NONE` and are never reused.
pub type ChannelKey = Constant;

pub const CHANNEL_NONE: ChannelKey = 0;

/// Raised by every pool operation (other than `close`/`closed`) once the
/// pool has been closed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PoolClosed;

impl fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "channel pool closed")
    }
}

pub type PoolResult<T> = Result<T, PoolClosed>;

/// A located channel: its key and the pool's share of it.
pub type PoolEntry = (ChannelKey, Arc<dyn Channel>);

struct Registry {
    entries: IndexMap<ChannelKey, (Arc<dyn Channel>, State)>,
    next_key: ChannelKey,
    closed: bool,
    // Monotonically increasing count of forced wake-ups, compared against
    // a snapshot taken at wait entry to tell signal() from a spurious
    // wake-up.
    signals: u64,
}

/// Registry of shared channels, each cached with the last state the pool
/// observed for it. The cache is written only by `put` and `report`;
/// predicates and lookups run against the cache, never against the live
/// machine.
///
/// A single mutex guards the map, the caches, the force counter and the
/// closed flag; waiters park on one condition variable and are woken by
/// `put`, by a cache change in `report`, by `signal` and by `close`.
pub struct ChannelPool {
    registry: Mutex<Registry>,
    cv: Condvar,
    log: logging::Logger,
}

impl ChannelPool {
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(log: L) -> ChannelPool {
        let pool_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        ChannelPool {
            registry: Mutex::new(Registry {
                entries: IndexMap::new(),
                next_key: CHANNEL_NONE,
                closed: false,
                signals: 0,
            }),
            cv: Condvar::new(),
            log: pool_log,
        }
    }

    /// Admits a channel, assigning it the next key and caching the state
    /// it shows at insertion time. The same channel may be admitted any
    /// number of times; every admission is an independent entry.
    pub fn put(&self, channel: Arc<dyn Channel>) -> PoolResult<PoolEntry> {
        let (key, state) = {
            let mut registry = self.lock();

            if registry.closed {
                return Err(PoolClosed);
            }

            registry.next_key += 1;
            let key = registry.next_key;
            let state = channel.state();

            registry.entries.insert(key, (channel.clone(), state));

            (key, state)
        };

        self.cv.notify_all();

        logging::debug!(self.log, "channel admitted";
                        "context" => "put",
                        "channel_key" => key,
                        "cached_state" => ?state);

        Ok((key, channel))
    }

    /// Resamples the channel's live state into the cache, waking waiters
    /// iff the cached value actually changed. This is the only way the
    /// pool learns of state changes after `put`.
    pub fn report(&self, key: ChannelKey) -> PoolResult<Option<PoolEntry>> {
        let (entry, changed) = {
            let mut registry = self.lock();

            if registry.closed {
                return Err(PoolClosed);
            }

            match registry.entries.get_mut(&key) {
                Some((channel, cached)) => {
                    let fresh = channel.state();
                    let changed = fresh != *cached;

                    *cached = fresh;

                    (Some((key, channel.clone())), changed)
                }
                None => (None, false),
            }
        };

        if changed {
            self.cv.notify_all();
        }

        logging::trace!(self.log, "channel state reported";
                        "context" => "report",
                        "channel_key" => key,
                        "found" => entry.is_some(),
                        "changed" => changed);

        Ok(entry)
    }

    /// Pure lookup, no cache refresh.
    pub fn get(&self, key: ChannelKey) -> PoolResult<Option<PoolEntry>> {
        let registry = self.lock();

        if registry.closed {
            return Err(PoolClosed);
        }

        Ok(registry
            .entries
            .get(&key)
            .map(|(channel, _)| (key, channel.clone())))
    }

    /// Drops the pool's share of the channel. The returned handle is the
    /// former pool reference.
    pub fn remove(&self, key: ChannelKey) -> PoolResult<Option<PoolEntry>> {
        let entry = {
            let mut registry = self.lock();

            if registry.closed {
                return Err(PoolClosed);
            }

            // shift_remove keeps the remaining entries in ascending key
            // order for the scans.
            registry
                .entries
                .shift_remove(&key)
                .map(|(channel, _)| (key, channel))
        };

        logging::debug!(self.log, "channel removed";
                        "context" => "remove",
                        "channel_key" => key,
                        "found" => entry.is_some());

        Ok(entry)
    }

    /// Scans the registry in ascending key order and returns the first
    /// entry whose `(key, channel, cached_state)` satisfies the
    /// predicate.
    pub fn try_get<P>(&self, mut predicate: P) -> PoolResult<Option<PoolEntry>>
    where
        P: FnMut(ChannelKey, &dyn Channel, State) -> bool,
    {
        let registry = self.lock();

        if registry.closed {
            return Err(PoolClosed);
        }

        Ok(Self::query(&registry, &mut predicate))
    }

    /// `try_get` over the cached state alone.
    #[inline]
    pub fn try_get_state<P>(&self, mut predicate: P) -> PoolResult<Option<PoolEntry>>
    where
        P: FnMut(State) -> bool,
    {
        self.try_get(|_, _, state| predicate(state))
    }

    /// `try_get` matching the expected bits: all of them when
    /// `require_all` is set, any of them otherwise.
    #[inline]
    pub fn try_get_expected(
        &self,
        expected: State,
        require_all: bool,
    ) -> PoolResult<Option<PoolEntry>> {
        self.try_get(|_, _, state| {
            choose!(require_all => state.has_all(expected), state.has_any(expected))
        })
    }

    /// Like `try_get`, but parks the caller until a match appears, the
    /// pool closes, `signal` fires or the timeout elapses. A zero timeout
    /// means no timeout at all.
    ///
    /// A match observed together with closure wins: `PoolClosed` is
    /// raised only when the woken scan comes up empty.
    pub fn wait<P>(&self, timeout: Duration, mut predicate: P) -> PoolResult<Option<PoolEntry>>
    where
        P: FnMut(ChannelKey, &dyn Channel, State) -> bool,
    {
        let mut registry = self.lock();

        if registry.closed {
            return Err(PoolClosed);
        }

        let entry_signals = registry.signals;
        let deadline = choose!(timeout == Duration::from_secs(0) => None,
                               Some(Instant::now() + timeout));

        loop {
            if let Some(found) = Self::query(&registry, &mut predicate) {
                return Ok(Some(found));
            }
            if registry.closed {
                return Err(PoolClosed);
            }
            if registry.signals != entry_signals {
                return Ok(None);
            }

            registry = match deadline {
                None => self
                    .cv
                    .wait(registry)
                    .expect("Channel pool mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();

                    if now >= deadline {
                        return Ok(None);
                    }

                    self.cv
                        .wait_timeout(registry, deadline - now)
                        .expect("Channel pool mutex poisoned")
                        .0
                }
            };
        }
    }

    /// `wait` over the cached state alone.
    #[inline]
    pub fn wait_state<P>(&self, timeout: Duration, mut predicate: P) -> PoolResult<Option<PoolEntry>>
    where
        P: FnMut(State) -> bool,
    {
        self.wait(timeout, |_, _, state| predicate(state))
    }

    /// `wait` matching the expected bits, as `try_get_expected`.
    #[inline]
    pub fn wait_expected(
        &self,
        timeout: Duration,
        expected: State,
        require_all: bool,
    ) -> PoolResult<Option<PoolEntry>> {
        self.wait(timeout, |_, _, state| {
            choose!(require_all => state.has_all(expected), state.has_any(expected))
        })
    }

    /// Forces every pending `wait` awake; waiters that still find no
    /// match then give up without an error.
    pub fn signal(&self) -> PoolResult<()> {
        {
            let mut registry = self.lock();

            if registry.closed {
                return Err(PoolClosed);
            }

            registry.signals += 1;
        }

        self.cv.notify_all();

        logging::trace!(self.log, "pool force signalled"; "context" => "signal");

        Ok(())
    }

    /// Marks the pool closed and wakes everyone. Channels are not
    /// touched; only the pool's shares are dropped when it goes away.
    pub fn close(&self) {
        {
            let mut registry = self.lock();
            registry.closed = true;
        }

        self.cv.notify_all();

        logging::debug!(self.log, "pool closed"; "context" => "close");
    }

    #[inline]
    pub fn closed(&self) -> bool {
        self.lock().closed
    }

    fn query<P>(registry: &Registry, predicate: &mut P) -> Option<PoolEntry>
    where
        P: FnMut(ChannelKey, &dyn Channel, State) -> bool,
    {
        for (&key, (channel, state)) in registry.entries.iter() {
            if predicate(key, &**channel, *state) {
                return Some((key, channel.clone()));
            }
        }

        None
    }

    #[inline]
    fn lock(&self) -> MutexGuard<Registry> {
        self.registry.lock().expect("Channel pool mutex poisoned")
    }
}
