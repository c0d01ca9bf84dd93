//! Reference-counted pool of reusable [`DataRecord`]s.
//!
//! The pool is an arena of indexed slots. Each slot owns one record, an
//! atomic holder count and a generation number that is bumped every time the
//! slot goes back on the free list. Free slot indices live on a guarded stack.
//!
//! Holders are [`PooledRecord`] handles. [`RecordPool::rent`] hands out the
//! first holder with a count of one, [`PooledRecord::increment`] adds a
//! holder, and [`PooledRecord::dispose`] (or dropping the handle) removes
//! one. When the count reaches zero the record is cleared and its slot is
//! returned. A record whose property storage grew past
//! [`PoolConfig::max_retained_properties`] has that storage dropped instead of
//! kept for reuse.
//!
//! The pool never blocks or fails a rent: it grows as needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::error::PoolError;
use crate::record::DataRecord;

/// Sizing policy for a [`RecordPool`].
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Property capacity above which a returned record's storage is dropped.
    #[serde(default = "default_max_retained_properties")]
    pub max_retained_properties: usize,
    /// Number of free slots that keep their storage; slots freed beyond this
    /// are returned empty.
    #[serde(default = "default_max_free_slots")]
    pub max_free_slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_retained_properties: default_max_retained_properties(),
            max_free_slots: default_max_free_slots(),
        }
    }
}

fn default_max_retained_properties() -> usize {
    64
}

fn default_max_free_slots() -> usize {
    4096
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Records currently rented (count > 0).
    pub outstanding: usize,
    /// Slots waiting on the free list.
    pub free: usize,
    /// Slots ever allocated.
    pub slots: usize,
    /// Total number of rents.
    pub rents: u64,
    /// Rents served from the free list.
    pub recycled: u64,
    /// Returns whose storage was dropped rather than kept.
    pub discarded: u64,
}

#[derive(Debug)]
struct Slot {
    index: usize,
    refs: AtomicU32,
    generation: AtomicU32,
    record: RwLock<DataRecord>,
}

impl Slot {
    fn new(index: usize) -> Self {
        Self {
            index,
            refs: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            record: RwLock::new(DataRecord::default()),
        }
    }

    fn check_generation(&self, held: u32) -> Result<(), PoolError> {
        let current = self.generation.load(Ordering::Acquire);
        if current == held {
            Ok(())
        } else {
            Err(PoolError::StaleHandle {
                index: self.index,
                held,
                current,
            })
        }
    }

    /// Add a holder. Fails if the slot has no live holder.
    fn acquire(&self, generation: u32) -> Result<(), PoolError> {
        self.check_generation(generation)?;
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n == 0 { None } else { n.checked_add(1) }
            })
            .map(|_| ())
            .map_err(|_| PoolError::DoubleDispose { index: self.index })
    }

    /// Remove a holder. Returns `true` when this was the last one.
    ///
    /// The decrement is checked and never goes below zero.
    fn release(&self, generation: u32) -> Result<bool, PoolError> {
        self.check_generation(generation)?;
        let previous = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| PoolError::DoubleDispose { index: self.index })?;
        Ok(previous == 1)
    }
}

#[derive(Debug)]
struct PoolShared {
    config: PoolConfig,
    slots: RwLock<Vec<Arc<Slot>>>,
    free: Mutex<Vec<usize>>,
    outstanding: AtomicUsize,
    rents: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
}

impl PoolShared {
    fn give_back(&self, slot: &Slot) {
        let mut free = self.free.lock();
        {
            let mut record = slot.record.write();
            if record.properties.capacity() > self.config.max_retained_properties
                || free.len() >= self.config.max_free_slots
            {
                *record = DataRecord::default();
                self.discarded.fetch_add(1, Ordering::Relaxed);
                trace!(slot = slot.index, "dropped record storage on return");
            } else {
                record.reset();
            }
        }
        slot.generation.fetch_add(1, Ordering::AcqRel);
        free.push(slot.index);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Thread-safe pool of [`DataRecord`]s. Cloning shares the same pool.
#[derive(Debug, Clone)]
pub struct RecordPool {
    shared: Arc<PoolShared>,
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl RecordPool {
    /// Empty pool; records are allocated on first rent.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                slots: RwLock::new(Vec::new()),
                free: Mutex::new(Vec::new()),
                outstanding: AtomicUsize::new(0),
                rents: AtomicU64::new(0),
                recycled: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Rent an empty record with a holder count of one.
    pub fn rent(&self) -> PooledRecord {
        let shared = &self.shared;
        let reused = shared.free.lock().pop();
        let slot = match reused {
            Some(index) => {
                shared.recycled.fetch_add(1, Ordering::Relaxed);
                let slot = Arc::clone(&shared.slots.read()[index]);
                let mut record = slot.record.write();
                if !record.is_reset(shared.config.max_retained_properties) {
                    *record = DataRecord::default();
                }
                drop(record);
                slot
            }
            None => {
                let mut slots = shared.slots.write();
                let slot = Arc::new(Slot::new(slots.len()));
                slots.push(Arc::clone(&slot));
                slot
            }
        };

        let previous = slot.refs.swap(1, Ordering::AcqRel);
        if previous != 0 {
            error!(slot = slot.index, previous, "rented a slot that still had holders");
        }
        let generation = slot.generation.load(Ordering::Acquire);
        shared.outstanding.fetch_add(1, Ordering::AcqRel);
        shared.rents.fetch_add(1, Ordering::Relaxed);

        PooledRecord {
            shared: Arc::clone(shared),
            slot,
            generation,
            released: false,
        }
    }

    /// Rent a record and fill it from `source`.
    pub fn rent_copy(&self, source: &DataRecord) -> PooledRecord {
        let handle = self.rent();
        handle.write().copy_from(source);
        handle
    }

    /// Register another holder of `handle`'s record.
    pub fn increment(&self, handle: &PooledRecord) -> Result<PooledRecord, PoolError> {
        handle.increment()
    }

    /// Release one holder.
    pub fn dispose(&self, handle: PooledRecord) -> Result<(), PoolError> {
        handle.dispose()
    }

    /// Number of records with at least one holder.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Point-in-time counters for this pool.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            outstanding: self.outstanding(),
            free: self.shared.free.lock().len(),
            slots: self.shared.slots.read().len(),
            rents: self.shared.rents.load(Ordering::Relaxed),
            recycled: self.shared.recycled.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }

    /// Settings the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

/// One holder of a pooled [`DataRecord`].
///
/// The holder that rented the record populates it through
/// [`PooledRecord::write`]; every holder may read it. Dropping the handle
/// releases the holder like [`PooledRecord::dispose`] does, but swallows the
/// error after logging it.
#[derive(Debug)]
pub struct PooledRecord {
    shared: Arc<PoolShared>,
    slot: Arc<Slot>,
    generation: u32,
    released: bool,
}

impl PooledRecord {
    /// Shared access to the pooled record.
    pub fn read(&self) -> RwLockReadGuard<'_, DataRecord> {
        self.slot.record.read()
    }

    /// Exclusive access to the pooled record, for filling it in.
    pub fn write(&self) -> RwLockWriteGuard<'_, DataRecord> {
        self.slot.record.write()
    }

    /// Arena index of the backing slot.
    pub fn slot_index(&self) -> usize {
        self.slot.index
    }

    /// Tenancy of the backing slot this handle belongs to.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Current number of holders.
    pub fn ref_count(&self) -> u32 {
        self.slot.refs.load(Ordering::Acquire)
    }

    /// Add a holder and return its handle.
    pub fn increment(&self) -> Result<Self, PoolError> {
        self.slot.acquire(self.generation)?;
        Ok(Self {
            shared: Arc::clone(&self.shared),
            slot: Arc::clone(&self.slot),
            generation: self.generation,
            released: false,
        })
    }

    /// Release this holder.
    pub fn dispose(mut self) -> Result<(), PoolError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), PoolError> {
        self.released = true;
        if self.slot.release(self.generation)? {
            self.shared.give_back(&self.slot);
        }
        Ok(())
    }
}

impl Drop for PooledRecord {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.release() {
            error!(error = %e, "pooled record release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::DataProperty;

    #[test]
    fn rent_starts_with_one_holder() {
        let pool = RecordPool::default();
        let handle = pool.rent();
        assert_eq!(handle.ref_count(), 1);
        assert_eq!(pool.outstanding(), 1);
        handle.dispose().unwrap();
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn record_returns_only_when_last_holder_disposes() {
        let pool = RecordPool::default();
        let first = pool.rent();
        first.write().push(DataProperty::integer("n", 1));
        let second = pool.increment(&first).unwrap();
        assert_eq!(first.ref_count(), 2);

        first.dispose().unwrap();
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(second.read().properties.len(), 1, "still readable");

        second.dispose().unwrap();
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.stats().free, 1);
    }

    #[test]
    fn recycled_record_is_empty_and_new_generation() {
        let pool = RecordPool::default();
        let handle = pool.rent();
        handle.write().push(DataProperty::string("k", "v"));
        handle.write().message.push_str("hello");
        let (index, generation) = (handle.slot_index(), handle.generation());
        handle.dispose().unwrap();

        let again = pool.rent();
        assert_eq!(again.slot_index(), index);
        assert_ne!(again.generation(), generation);
        assert!(again.read().properties.is_empty());
        assert!(again.read().message.is_empty());
        assert_eq!(pool.stats().recycled, 1);
    }

    #[test]
    fn oversized_record_storage_is_dropped() {
        let pool = RecordPool::new(PoolConfig {
            max_retained_properties: 4,
            max_free_slots: 16,
        });
        let handle = pool.rent();
        for i in 0..32 {
            handle.write().push(DataProperty::integer("n", i));
        }
        handle.dispose().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        let again = pool.rent();
        assert!(again.read().properties.capacity() <= 4);
    }

    #[test]
    fn extra_release_is_detected() {
        let pool = RecordPool::default();
        let handle = pool.rent();
        // Simulate a holder that released without owning a count.
        assert!(handle.slot.release(handle.generation).unwrap());
        assert_eq!(handle.ref_count(), 0);

        let err = handle.dispose().unwrap_err();
        assert!(matches!(err, PoolError::DoubleDispose { .. }));
    }

    #[test]
    fn increment_after_last_release_is_rejected() {
        let pool = RecordPool::default();
        let handle = pool.rent();
        assert!(handle.slot.release(handle.generation).unwrap());
        assert!(matches!(
            handle.increment(),
            Err(PoolError::DoubleDispose { .. })
        ));
        // Drop logs the failed release instead of panicking.
        drop(handle);
    }

    #[test]
    fn stale_generation_is_rejected() {
        let pool = RecordPool::default();
        let handle = pool.rent();
        let err = handle.slot.release(handle.generation + 1).unwrap_err();
        assert!(matches!(err, PoolError::StaleHandle { .. }));
        handle.dispose().unwrap();
    }

    #[test]
    fn dropping_a_handle_releases_it() {
        let pool = RecordPool::default();
        {
            let _handle = pool.rent();
            assert_eq!(pool.outstanding(), 1);
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn pool_grows_without_bound() {
        let pool = RecordPool::default();
        let handles: Vec<_> = (0..100).map(|_| pool.rent()).collect();
        assert_eq!(pool.stats().slots, 100);
        for handle in handles {
            handle.dispose().unwrap();
        }
        assert_eq!(pool.stats().free, 100);
    }
}
