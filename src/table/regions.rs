//! # Region-Striped Read/Write Locking
//!
//! The hash table partitions its mapped address space into fixed-size
//! regions and guards each with its own `RwLock`. A bucket is accessed
//! only while the lock of the region holding its start address is held
//! in the appropriate mode.
//!
//! ## Why Striping?
//!
//! A single table-wide lock would serialize every operation. With one
//! lock per 16 KiB region, writers to different parts of the table and
//! readers on unrelated chains proceed in parallel; only neighbors in
//! the same region contend.
//!
//! ## Growth Without Invalidation
//!
//! The lock vector grows when the file grows. Guards hand out an `Arc`
//! of the underlying lock, so appending new locks never invalidates a
//! guard that is already held: growth takes the vector mutex briefly,
//! pushes fresh (uncontended) locks, and leaves existing entries alone.
//!
//! ## Guard Mechanics
//!
//! The RAII guards own the `Arc` they lock. `parking_lot`'s borrowing
//! guards cannot be stored next to the lock they borrow from, so the
//! guards here acquire the lock, forget the borrowing guard, and release
//! through `force_unlock_*` on drop.

use std::mem;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Growable vector of region locks.
pub struct RegionLocks {
    locks: Mutex<Vec<Arc<RwLock<()>>>>,
}

impl RegionLocks {
    /// Creates `regions` locks (at least one).
    pub fn new(regions: usize) -> Self {
        let count = regions.max(1);
        Self {
            locks: Mutex::new((0..count).map(|_| Arc::new(RwLock::new(()))).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    fn lock_for(&self, region: usize) -> Arc<RwLock<()>> {
        Arc::clone(&self.locks.lock()[region])
    }

    /// Acquires the region's lock in shared mode (blocking).
    pub fn read(&self, region: usize) -> RegionReadGuard {
        let lock = self.lock_for(region);
        let guard = lock.read();
        // Forget the borrowing guard; RegionReadGuard releases via
        // force_unlock_read on drop.
        mem::forget(guard);
        RegionReadGuard { lock }
    }

    /// Acquires the region's lock in exclusive mode (blocking).
    pub fn write(&self, region: usize) -> RegionWriteGuard {
        let lock = self.lock_for(region);
        let guard = lock.write();
        mem::forget(guard);
        RegionWriteGuard { lock }
    }

    /// Acquires every lock that exists at call time, exclusively, in
    /// index order. Locks appended afterwards are not covered; the
    /// caller serializes growth so none can appear mid-barrier.
    pub fn lock_all(&self) -> Vec<RegionWriteGuard> {
        let snapshot: Vec<_> = self.locks.lock().iter().map(Arc::clone).collect();
        snapshot
            .into_iter()
            .map(|lock| {
                let guard = lock.write();
                mem::forget(guard);
                RegionWriteGuard { lock }
            })
            .collect()
    }

    /// Appends `more` fresh, uncontended locks.
    pub fn extend(&self, more: usize) {
        let mut locks = self.locks.lock();
        locks.extend((0..more).map(|_| Arc::new(RwLock::new(()))));
    }
}

/// Shared hold on one region. Released on drop.
pub struct RegionReadGuard {
    lock: Arc<RwLock<()>>,
}

impl Drop for RegionReadGuard {
    fn drop(&mut self) {
        // SAFETY: a read lock was acquired in RegionLocks::read and its
        // borrowing guard forgotten, so this context holds exactly one
        // read lock on self.lock.
        unsafe { self.lock.force_unlock_read() };
    }
}

/// Exclusive hold on one region. Released on drop.
pub struct RegionWriteGuard {
    lock: Arc<RwLock<()>>,
}

impl Drop for RegionWriteGuard {
    fn drop(&mut self) {
        // SAFETY: a write lock was acquired in RegionLocks::write or
        // lock_all and its borrowing guard forgotten, so this context
        // holds the write lock on self.lock.
        unsafe { self.lock.force_unlock_write() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_reads_coexist() {
        let locks = RegionLocks::new(4);

        let a = locks.read(2);
        let b = locks.read(2);
        drop(a);
        drop(b);
    }

    #[test]
    fn write_excludes_readers() {
        let locks = Arc::new(RegionLocks::new(4));
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = locks.write(1);

        let locks2 = Arc::clone(&locks);
        let acquired2 = Arc::clone(&acquired);
        let reader = thread::spawn(move || {
            let _r = locks2.read(1);
            acquired2.store(true, Ordering::Release);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::Acquire));

        drop(guard);
        reader.join().unwrap();
        assert!(acquired.load(Ordering::Acquire));
    }

    #[test]
    fn different_regions_do_not_contend() {
        let locks = Arc::new(RegionLocks::new(4));

        let guard = locks.write(0);
        let locks2 = Arc::clone(&locks);
        let other = thread::spawn(move || locks2.write(1));
        let other_guard = other.join().unwrap();

        drop(guard);
        drop(other_guard);
    }

    #[test]
    fn extend_does_not_invalidate_held_guards() {
        let locks = RegionLocks::new(2);

        let guard = locks.read(1);
        locks.extend(64);
        assert_eq!(locks.len(), 66);
        drop(guard);

        let reacquired = locks.write(1);
        drop(reacquired);
    }

    #[test]
    fn lock_all_covers_every_region() {
        let locks = RegionLocks::new(8);

        let barrier = locks.lock_all();
        assert_eq!(barrier.len(), 8);
        drop(barrier);

        let guard = locks.write(7);
        drop(guard);
    }
}
