//! Admission control for incoming probes.
//!
//! Every accepted probe holds a slot in its source's window for a fixed
//! period. A source at its ceiling is refused with OVERLOAD until slots
//! expire. Windows are created on first use and dropped once empty, so idle
//! peers cost nothing.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use libp2p::PeerId;

/// Where a probe request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Started by this node
    Local,
    /// Received from a connected peer
    Peer(PeerId),
}

/// Bounded count of accepted probes.
#[derive(Debug)]
pub struct Counter {
    count: usize,
    max: usize,
}

impl Counter {
    pub fn new(max: usize) -> Self {
        Self { count: 0, max }
    }

    pub fn value(&self) -> usize {
        self.count
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.max
    }

    /// # Panics
    ///
    /// If the counter is already at its maximum. Callers check
    /// [`Counter::is_full`] first under the same lock.
    pub fn increment(&mut self) {
        assert!(
            self.count < self.max,
            "number of accepted probes would exceed the maximum of {}",
            self.max
        );
        self.count += 1;
    }

    /// # Panics
    ///
    /// If the counter is already zero. Every decrement pairs with an earlier
    /// increment.
    pub fn decrement(&mut self) {
        assert!(self.count > 0, "number of accepted probes would become negative");
        self.count -= 1;
    }
}

/// Admission windows for every source, behind one lock.
#[derive(Debug)]
pub struct AdmissionTable {
    windows: Mutex<HashMap<Source, Counter>>,
    peer_limit: usize,
    local_limit: usize,
}

impl AdmissionTable {
    pub fn new(peer_limit: usize, local_limit: usize) -> Self {
        Self { windows: Mutex::new(HashMap::new()), peer_limit, local_limit }
    }

    fn limit(&self, source: &Source) -> usize {
        match source {
            Source::Local => self.local_limit,
            Source::Peer(_) => self.peer_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Source, Counter>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot for `source` if one is free.
    ///
    /// Every successful admission must be paired with exactly one
    /// [`AdmissionTable::release`].
    pub fn try_admit(&self, source: &Source) -> bool {
        let max = self.limit(source);
        let mut windows = self.lock();
        match windows.get_mut(source) {
            Some(counter) if counter.is_full() => false,
            Some(counter) => {
                counter.increment();
                true
            },
            None if max == 0 => false,
            None => {
                let mut counter = Counter::new(max);
                counter.increment();
                windows.insert(*source, counter);
                true
            },
        }
    }

    /// Return a slot taken by [`AdmissionTable::try_admit`].
    ///
    /// # Panics
    ///
    /// If `source` holds no slots.
    pub fn release(&self, source: &Source) {
        let mut windows = self.lock();
        let Some(counter) = windows.get_mut(source) else {
            panic!("released an admission slot for {source:?} which holds none");
        };
        counter.decrement();
        // Recreated on demand; keeping empty windows would accumulate them over time.
        if counter.value() == 0 {
            windows.remove(source);
        }
    }

    /// Slots currently held by `source`.
    pub fn accepted(&self, source: &Source) -> usize {
        self.lock().get(source).map(Counter::value).unwrap_or(0)
    }

    /// Number of sources holding at least one slot.
    pub fn tracked_sources(&self) -> usize {
        self.lock().len()
    }
}
