//! # Hash Table Module
//!
//! The chained hash table built on the storage layer:
//!
//! - `hash`: the `HashTable` type — put/get/remove/scan over a mapped
//!   bucket array with chained overflow
//! - `regions`: region-striped read/write locking for the mapped
//!   address space
//!
//! ## Concurrency Model
//!
//! Readers and writers run in parallel, each holding the lock of the
//! 16 KiB region their bucket starts in. Chain walks hand the lock over
//! at bucket boundaries (release, then acquire the next), so a single
//! operation is atomic within a region but not across a whole chain.
//! Appending buckets is serialized by a table-wide mutex; growing the
//! file escalates to an exclusive barrier over every region because the
//! remap moves the whole window.

mod hash;
mod regions;

pub use hash::HashTable;
