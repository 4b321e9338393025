//! # Storage Module
//!
//! The foundational storage layer for chainhash: an append-growing,
//! memory-mapped file with zero-copy byte access.
//!
//! ## Architecture Overview
//!
//! Instead of copying data between kernel buffers and user space, the
//! index file is mapped directly into the process address space. This
//! enables:
//!
//! - **Zero-copy access**: byte windows point directly into the mapping
//! - **Minimal syscall overhead**: page faults handled by the OS
//! - **Efficient caching**: the OS page cache is the only cache
//!
//! ## Growth Model
//!
//! Files grow by a fixed increment (the `growth` constructor argument)
//! and never shrink. New bytes are always zero, which gives the layer
//! above a cheap end-of-data sentinel and lets the write frontier be
//! recovered on reopen by searching for the zero tail.
//!
//! ## Safety Model
//!
//! A memory-mapped region becomes invalid when the file is grown and
//! remapped. `MappedFile` keeps the mapping private and exposes two
//! access paths:
//!
//! - safe methods (`ensure_size`, `flush`, ...) that take `&self`/`&mut
//!   self` and let the borrow checker rule out windows held across a
//!   remap
//! - `unsafe` byte-window accessors for callers that synchronize access
//!   themselves (the hash table's region locks), with the documented
//!   contract that no window survives `ensure_size`
//!
//! ## Module Organization
//!
//! - `mmap`: the `MappedFile` type

mod mmap;

pub use mmap::MappedFile;
