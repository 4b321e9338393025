//! # Layout and Locking Constants
//!
//! All on-disk layout and concurrency constants live here, grouped by the
//! structures they describe. Several values are interdependent; the
//! relationships are documented below and enforced by compile-time
//! assertions where possible.
//!
//! ## Dependency Graph
//!
//! ```text
//! VARINT_FIELD_SIZE (10 bytes, fits any u64 varint)
//!       │
//!       ├─> BUCKET_HEADER_SIZE (one field: the next-bucket number)
//!       │
//!       └─> ENTRY_SIZE (flag byte + key field + value field)
//!
//! FILE_GROWTH (1 MiB)
//!       │
//!       └─> GROWTH_REGION_LOCKS (locks added per file growth)
//!             Must cover every region the new mapping can contain, so
//!             growth never leaves a bucket without a lock.
//!
//! REGION_SIZE (16 KiB)
//!       │
//!       └─> One RwLock per region of the mapped address space. Smaller
//!           regions mean less contention but more lock memory.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `ENTRY_SIZE == 1 + 2 * VARINT_FIELD_SIZE` (flag + key + value)
//! 2. `FILE_GROWTH` is a whole number of regions, so the lock vector
//!    grows by a fixed amount per file growth
//! 3. `VARINT_FIELD_SIZE` is at least the longest u64 varint (10 bytes)

use crate::encoding::varint::MAX_VARINT_LEN;

/// Growth increment for hash table files. The file length is always a
/// multiple of this value.
pub const FILE_GROWTH: u64 = 1 << 20;

/// Bytes of the mapped address space covered by one region lock.
pub const REGION_SIZE: u64 = 16 * 1024;

/// Number of region locks appended when the file grows by `FILE_GROWTH`.
/// The `+ 1` covers the region a growth boundary can straddle.
pub const GROWTH_REGION_LOCKS: usize = (FILE_GROWTH / REGION_SIZE) as usize + 1;

/// Entry flag marking a slot that holds a live key-value pair.
pub const ENTRY_VALID: u8 = 1;

/// Entry flag marking a slot that is empty or logically removed.
pub const ENTRY_INVALID: u8 = 0;

/// Fixed on-disk width of one varint-encoded u64. Encodings shorter than
/// the field are padded with trailing zero bytes.
pub const VARINT_FIELD_SIZE: usize = 10;

/// Bucket header: a single varint field holding the next bucket number
/// (zero means end of chain).
pub const BUCKET_HEADER_SIZE: u64 = VARINT_FIELD_SIZE as u64;

/// One entry: flag byte, key field, value field.
pub const ENTRY_SIZE: u64 = 1 + 2 * VARINT_FIELD_SIZE as u64;

const _: () = assert!(
    ENTRY_SIZE == 1 + 2 * VARINT_FIELD_SIZE as u64,
    "ENTRY_SIZE must be flag byte + key field + value field"
);

const _: () = assert!(
    FILE_GROWTH % REGION_SIZE == 0,
    "FILE_GROWTH must be a whole number of regions so lock coverage stays aligned"
);

const _: () = assert!(
    VARINT_FIELD_SIZE >= MAX_VARINT_LEN,
    "a varint field must hold the longest possible u64 encoding"
);
