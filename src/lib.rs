//! # chainhash - Persistent Chained Hash Index
//!
//! chainhash is the memory-mapped hash index that backs a document
//! database's secondary-index layer: u64 keys mapped to u64 values
//! (typically document identifiers), persisted in a single append-growing
//! file, readable and writable from many threads at once.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chainhash::HashTable;
//!
//! let index = HashTable::open("./people.idx", 12, 16)?;
//!
//! index.put(hash_of_name, doc_id)?;
//! let (keys, vals) = index.get(hash_of_name, 0, |_, _| true);
//! index.remove(hash_of_name, doc_id);
//!
//! index.flush()?;
//! index.close()?;
//! ```
//!
//! ## Architecture
//!
//! Two layers, bottom-up:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │      HashTable (table::hash)             │
//! │  static head buckets, chained overflow,  │
//! │  region-striped RwLocks, growth barrier  │
//! ├──────────────────────────────────────────┤
//! │      MappedFile (storage::mmap)          │
//! │  append-growing mmap window, zero tail,  │
//! │  write-frontier recovery, remap on grow  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The file is an array of fixed-size buckets. The first `2^hash_bits`
//! buckets are heads; a key is assigned to a head by masking its low
//! bits. Overflow buckets are appended at the tail and linked through a
//! varint `next` header. All unused bytes are zero, which doubles as the
//! end-of-chain and never-written-entry sentinel.
//!
//! ## Guarantees and Limits
//!
//! - Multi-threaded within one process; never share the file between
//!   processes
//! - Entries are never rehashed and deleted slots are reused in place;
//!   the file only grows
//! - Crash recovery is best-effort reconstruction from the on-disk
//!   chains; in-flight writes at crash time may be lost
//! - `hash_bits` and `per_bucket` are not stored in the file and must be
//!   identical on every open
//!
//! ## Module Overview
//!
//! - [`config`]: layout and locking constants
//! - [`encoding`]: varint encoding for headers and entry fields
//! - [`storage`]: the memory-mapped file
//! - [`table`]: the hash table

pub mod config;
pub mod encoding;
pub mod storage;
pub mod table;

pub use storage::MappedFile;
pub use table::HashTable;
