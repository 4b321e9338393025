//! # Static-Bucket Chained Hash Table
//!
//! This module implements `HashTable`, a persistent hash index of u64
//! key-value pairs stored directly in a [`MappedFile`].
//!
//! ## On-Disk Layout
//!
//! The mapped window is an array of fixed-size buckets:
//!
//! ```text
//! Bucket i at byte offset i * bucket_size:
//! +----------------------+----------+----------+-----+
//! | header (10 bytes)    | entry 0  | entry 1  | ... |
//! | varint: next bucket  | 21 bytes | 21 bytes |     |
//! +----------------------+----------+----------+-----+
//!
//! Entry:
//! +------+---------------------+---------------------+
//! | flag | varint key (10 B)   | varint value (10 B) |
//! +------+---------------------+---------------------+
//! ```
//!
//! The first `2^hash_bits` buckets are **heads**, one per hash slot; a
//! key selects its head by masking to the low `hash_bits` bits. When a
//! head's chain fills, a fresh bucket is appended at the file tail and
//! linked in through the chain tail's `next` header. A `next` of zero
//! means end of chain, which is exactly what freshly zeroed file bytes
//! decode to. The same property gives the entry scan its early-exit
//! sentinel: an invalid flag with key and value both zero marks a slot
//! that was never written, so nothing lives beyond it in that bucket.
//!
//! `hash_bits` and `per_bucket` are NOT stored in the file; callers must
//! supply the same values on every open or the layout will be misread.
//!
//! ## Concurrency
//!
//! The mapped address space is partitioned into 16 KiB regions, each
//! guarded by its own `RwLock` (see [`super::regions`]). A scan crossing
//! from one bucket to the next releases the current region lock before
//! acquiring the next, so operations are not linearizable across chain
//! boundaries; within one region they are totally ordered by the lock.
//!
//! Appending a bucket is serialized by a table-wide grow mutex. When the
//! file itself must grow, every existing region lock is taken
//! exclusively first: remapping moves the window, so no reader or writer
//! may hold a byte window across it. The lock vector is extended under
//! that barrier and the new locks cover the new regions.
//!
//! ## Failure Semantics
//!
//! I/O errors during growth are unrecoverable: the table instance must
//! be discarded (the mapping is its only handle on the data). Structural
//! corruption found while walking a chain (a header pointing backwards
//! or out of range) is logged at error severity and treated as end of
//! chain, trading completeness for availability.

use std::cell::UnsafeCell;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{ensure, Result};
use parking_lot::Mutex;
use tracing::error;

use crate::config::{
    BUCKET_HEADER_SIZE, ENTRY_INVALID, ENTRY_SIZE, ENTRY_VALID, FILE_GROWTH, GROWTH_REGION_LOCKS,
    REGION_SIZE, VARINT_FIELD_SIZE,
};
use crate::encoding::varint::{decode_varint, encode_varint};
use crate::storage::MappedFile;
use crate::table::regions::RegionLocks;

pub struct HashTable {
    file: UnsafeCell<MappedFile>,
    hash_bits: u64,
    per_bucket: u64,
    bucket_size: u64,
    initial_buckets: u64,
    num_buckets: AtomicU64,
    grow_mutex: Mutex<()>,
    regions: RegionLocks,
}

// SAFETY: HashTable is shared across threads under the following
// discipline, which every method upholds:
// 1. Byte windows into the mapped file are created only while the
//    covering region lock is held (shared for reads, exclusive for
//    writes) and die before the lock is released
// 2. The file is remapped only under the global barrier (every region
//    lock held exclusively), so no byte window can span a remap
// 3. used_size and num_buckets are atomics; both are advanced only
//    under grow_mutex and only grow
unsafe impl Send for HashTable {}
unsafe impl Sync for HashTable {}

impl HashTable {
    /// Opens (or creates) a hash table file.
    ///
    /// `hash_bits` fixes the number of head buckets at `2^hash_bits`;
    /// `per_bucket` fixes the entries per bucket. Both must match the
    /// values the file was created with.
    ///
    /// On reopen the bucket count is reconstructed by walking every head
    /// chain, tolerating up to one partially written bucket at the tail.
    pub fn open<P: AsRef<Path>>(path: P, hash_bits: u64, per_bucket: u64) -> Result<Self> {
        ensure!(
            hash_bits >= 2 && per_bucket >= 2,
            "hash table is too small ({} hash bits, {} per bucket)",
            hash_bits,
            per_bucket
        );
        ensure!(
            hash_bits <= 32,
            "hash table is too large ({} hash bits)",
            hash_bits
        );

        let file = MappedFile::open(path, FILE_GROWTH)?;
        let bucket_size = BUCKET_HEADER_SIZE + ENTRY_SIZE * per_bucket;
        let initial_buckets = 1u64 << hash_bits;

        // Chains may reach anywhere in the mapped file, so let the walk
        // below see all of it; the exact frontier is derived afterwards.
        file.set_used_size(file.size());
        let tentative_buckets = file.size() / bucket_size;
        let regions = RegionLocks::new((file.size() / REGION_SIZE) as usize + 1);

        let table = Self {
            file: UnsafeCell::new(file),
            hash_bits,
            per_bucket,
            bucket_size,
            initial_buckets,
            num_buckets: AtomicU64::new(tentative_buckets),
            grow_mutex: Mutex::new(()),
            regions,
        };

        // The real bucket count is one past the furthest chain tail,
        // never less than the head array itself.
        let mut max_buckets = initial_buckets;
        for head in 0..initial_buckets {
            let one_past = table.last_bucket(head) + 1;
            if one_past > max_buckets {
                max_buckets = one_past;
            }
        }

        table.num_buckets.store(max_buckets, Ordering::Release);

        // SAFETY: the table has not been shared yet, so the &mut cannot
        // alias a byte window or another reference.
        let file = unsafe { &mut *table.file.get() };
        file.set_used_size(max_buckets * bucket_size);
        file.ensure_size(0)?;

        let wanted_regions = (file.size() / REGION_SIZE) as usize + 1;
        if wanted_regions > table.regions.len() {
            table.regions.extend(wanted_regions - table.regions.len());
        }

        Ok(table)
    }

    /// Inserts a key-value pair. Duplicate pairs are kept, not merged.
    ///
    /// An error means file growth failed; the table must be discarded.
    pub fn put(&self, key: u64, val: u64) -> Result<()> {
        let head = self.mask_key(key);
        'restart: loop {
            let mut bucket = head;
            loop {
                let guard = self.regions.write(self.region_of(bucket));
                let entries = bucket * self.bucket_size + BUCKET_HEADER_SIZE;
                for slot in 0..self.per_bucket {
                    // SAFETY: exclusive region lock held; window dies
                    // before the guard drops
                    let entry =
                        unsafe { self.file().bytes_mut(entries + slot * ENTRY_SIZE, ENTRY_SIZE) };
                    if entry[0] != ENTRY_VALID {
                        entry[0] = ENTRY_VALID;
                        // a reused tombstone may hold stale varints;
                        // restore the zero padding before encoding
                        entry[1..].fill(0);
                        encode_varint(key, &mut entry[1..1 + VARINT_FIELD_SIZE]);
                        encode_varint(val, &mut entry[1 + VARINT_FIELD_SIZE..]);
                        return Ok(());
                    }
                }
                let next = self.next_bucket(bucket);
                drop(guard);
                if next == 0 {
                    self.grow(head)?;
                    continue 'restart;
                }
                bucket = next;
            }
        }
    }

    /// Returns the key-value pairs stored under `key` that pass `filter`,
    /// in chain order. `limit` of zero means unbounded.
    ///
    /// `filter` runs under a shared region lock and must not re-enter the
    /// table. Its key argument always equals the queried key.
    pub fn get<F>(&self, key: u64, limit: u64, mut filter: F) -> (Vec<u64>, Vec<u64>)
    where
        F: FnMut(u64, u64) -> bool,
    {
        let cap = if limit == 0 { 10 } else { limit as usize };
        let mut keys = Vec::with_capacity(cap);
        let mut vals = Vec::with_capacity(cap);

        let mut count = 0u64;
        let mut bucket = self.mask_key(key);
        loop {
            let guard = self.regions.read(self.region_of(bucket));
            let entries = bucket * self.bucket_size + BUCKET_HEADER_SIZE;
            for slot in 0..self.per_bucket {
                // SAFETY: shared region lock held; window dies before the
                // guard drops
                let entry = unsafe { self.file().bytes(entries + slot * ENTRY_SIZE, ENTRY_SIZE) };
                let (entry_key, entry_val) = decode_entry(entry);
                if entry[0] == ENTRY_VALID {
                    if entry_key == key && filter(entry_key, entry_val) {
                        keys.push(entry_key);
                        vals.push(entry_val);
                        count += 1;
                        if count == limit {
                            return (keys, vals);
                        }
                    }
                } else if entry_key == 0 && entry_val == 0 {
                    // never-written sentinel: nothing lives beyond it
                    return (keys, vals);
                }
            }
            let next = self.next_bucket(bucket);
            drop(guard);
            if next == 0 {
                return (keys, vals);
            }
            bucket = next;
        }
    }

    /// Removes the first entry matching `(key, val)` exactly, flipping its
    /// flag to invalid. The slot stays reusable for later inserts into the
    /// same bucket. Duplicates require repeated calls. Missing pairs are a
    /// no-op.
    pub fn remove(&self, key: u64, val: u64) {
        let mut bucket = self.mask_key(key);
        loop {
            let guard = self.regions.write(self.region_of(bucket));
            let entries = bucket * self.bucket_size + BUCKET_HEADER_SIZE;
            for slot in 0..self.per_bucket {
                // SAFETY: exclusive region lock held; window dies before
                // the guard drops
                let entry =
                    unsafe { self.file().bytes_mut(entries + slot * ENTRY_SIZE, ENTRY_SIZE) };
                let (entry_key, entry_val) = decode_entry(entry);
                if entry[0] == ENTRY_VALID {
                    if entry_key == key && entry_val == val {
                        entry[0] = ENTRY_INVALID;
                        return;
                    }
                } else if entry_key == 0 && entry_val == 0 {
                    return;
                }
            }
            let next = self.next_bucket(bucket);
            drop(guard);
            if next == 0 {
                return;
            }
            bucket = next;
        }
    }

    /// Returns every valid entry in the table: heads in index order, and
    /// within a chain, bucket order then slot order. `limit` of zero means
    /// unbounded.
    pub fn get_all(&self, limit: u64) -> (Vec<u64>, Vec<u64>) {
        let mut keys = Vec::with_capacity(100);
        let mut vals = Vec::with_capacity(100);

        let mut count = 0u64;
        for head in 0..self.initial_buckets {
            let mut bucket = head;
            'chain: loop {
                let guard = self.regions.read(self.region_of(bucket));
                let entries = bucket * self.bucket_size + BUCKET_HEADER_SIZE;
                for slot in 0..self.per_bucket {
                    // SAFETY: shared region lock held; window dies before
                    // the guard drops
                    let entry =
                        unsafe { self.file().bytes(entries + slot * ENTRY_SIZE, ENTRY_SIZE) };
                    let (entry_key, entry_val) = decode_entry(entry);
                    if entry[0] == ENTRY_VALID {
                        keys.push(entry_key);
                        vals.push(entry_val);
                        count += 1;
                        if count == limit {
                            return (keys, vals);
                        }
                    } else if entry_key == 0 && entry_val == 0 {
                        drop(guard);
                        break 'chain;
                    }
                }
                let next = self.next_bucket(bucket);
                drop(guard);
                if next == 0 {
                    break 'chain;
                }
                bucket = next;
            }
        }
        (keys, vals)
    }

    /// Flushes the mapping to disk.
    pub fn flush(&self) -> Result<()> {
        self.file().flush()
    }

    /// Flushes, unmaps, and closes the backing file.
    pub fn close(self) -> Result<()> {
        self.file.into_inner().close()
    }

    pub fn num_buckets(&self) -> u64 {
        self.num_buckets.load(Ordering::Acquire)
    }

    pub fn bucket_size(&self) -> u64 {
        self.bucket_size
    }

    pub fn initial_buckets(&self) -> u64 {
        self.initial_buckets
    }

    pub fn used_size(&self) -> u64 {
        self.file().used_size()
    }

    pub fn file_size(&self) -> u64 {
        self.file().size()
    }

    /// Masks away the non-hash bits of a key, selecting its head bucket.
    fn mask_key(&self, key: u64) -> u64 {
        key & ((1 << self.hash_bits) - 1)
    }

    /// Region lock index covering a bucket's start address.
    fn region_of(&self, bucket: u64) -> usize {
        ((bucket * self.bucket_size) / REGION_SIZE) as usize
    }

    fn file(&self) -> &MappedFile {
        // SAFETY: a &mut to the file exists only during open (unshared)
        // and under the grow barrier, which excludes every caller of this
        // accessor
        unsafe { &*self.file.get() }
    }

    /// Number of the bucket chained after `bucket`, or zero at end of
    /// chain. A header pointing backwards, below the head array, or past
    /// the bucket count is corruption: logged and treated as end.
    fn next_bucket(&self, bucket: u64) -> u64 {
        let num_buckets = self.num_buckets.load(Ordering::Acquire);
        if bucket >= num_buckets {
            return 0;
        }
        let addr = bucket * self.bucket_size;
        // SAFETY: header bytes are written only under grow_mutex with the
        // region lock held; callers hold the region lock (scans),
        // grow_mutex itself (chain-tail walks), or sole ownership (open)
        let header = unsafe { self.file().bytes(addr, BUCKET_HEADER_SIZE) };
        let next = match decode_varint(header) {
            Ok((next, _)) => next,
            Err(_) => {
                error!(
                    path = %self.file().path().display(),
                    bucket,
                    addr,
                    "unreadable bucket header, treating as end of chain"
                );
                return 0;
            }
        };
        if next == 0 {
            0
        } else if next <= bucket {
            error!(
                path = %self.file().path().display(),
                bucket,
                next,
                addr,
                "bucket chain loops backwards, treating as end of chain"
            );
            0
        } else if next < self.initial_buckets || next >= num_buckets {
            error!(
                path = %self.file().path().display(),
                bucket,
                next,
                addr,
                "bucket chain leaves the table, treating as end of chain"
            );
            0
        } else {
            next
        }
    }

    /// Last bucket of the chain containing `bucket`.
    fn last_bucket(&self, bucket: u64) -> u64 {
        let mut curr = bucket;
        loop {
            let next = self.next_bucket(curr);
            if next == 0 {
                return curr;
            }
            curr = next;
        }
    }

    /// Appends a fresh bucket to the chain rooted at `bucket`'s head.
    ///
    /// Growth is serialized table-wide. If the file is full, every region
    /// lock is taken exclusively before remapping: no thread may hold a
    /// byte window while the mapping moves. The new bucket is published
    /// in the bucket count before it is linked, so a concurrent scan sees
    /// either the old chain end or a fully valid link, never a dangling
    /// reference.
    fn grow(&self, bucket: u64) -> Result<()> {
        let _grow = self.grow_mutex.lock();

        if !self.file().check_size(self.bucket_size) {
            let barrier = self.regions.lock_all();
            // SAFETY: every region lock is held exclusively, so no byte
            // window exists anywhere and no reference to the file is
            // live; remapping cannot invalidate anything in use
            unsafe { (*self.file.get()).ensure_size(self.bucket_size)? };
            self.regions.extend(GROWTH_REGION_LOCKS);
            drop(barrier);
        }

        let last = self.last_bucket(bucket);
        let new_bucket = self.num_buckets.fetch_add(1, Ordering::AcqRel);
        self.file().advance_used_size(self.bucket_size);

        {
            let _tail = self.regions.write(self.region_of(last));
            // SAFETY: exclusive region lock over the chain tail's header
            let header =
                unsafe { self.file().bytes_mut(last * self.bucket_size, BUCKET_HEADER_SIZE) };
            header.fill(0);
            encode_varint(new_bucket, header);
        }
        // the new bucket's header stays zero: end of chain

        Ok(())
    }
}

/// Decodes an entry's key and value fields. Unreadable fields decode as
/// zero, matching the sentinel convention for never-written bytes.
fn decode_entry(entry: &[u8]) -> (u64, u64) {
    let key = decode_varint(&entry[1..1 + VARINT_FIELD_SIZE])
        .map(|(v, _)| v)
        .unwrap_or(0);
    let val = decode_varint(&entry[1 + VARINT_FIELD_SIZE..])
        .map(|(v, _)| v)
        .unwrap_or(0);
    (key, val)
}
