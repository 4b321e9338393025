//! # Append-Growing Memory-Mapped File
//!
//! This module implements `MappedFile`, the disk-backed byte window under
//! the chained hash table. It tracks two sizes:
//!
//! - `size`: bytes currently mapped, always grown in whole `growth`
//!   increments
//! - `used_size`: the high-water mark of meaningful bytes; everything in
//!   `[used_size, size)` is zero after open or growth
//!
//! ## Write Frontier Recovery
//!
//! On reopen the file carries no explicit length metadata, so `used_size`
//! is recovered by binary search for the boundary between the written
//! prefix and the zero tail. The search assumes the prefix ends with a
//! non-zero byte; if the last written byte happens to be zero it lands
//! short. Callers that know their own layout (the hash table does) must
//! override the recovered value via [`MappedFile::set_used_size`].
//!
//! ## Growth
//!
//! `ensure_size` appends whole `growth` increments of zero bytes, fsyncs,
//! and remaps until the requested room exists. Remapping invalidates
//! every previously obtained byte window; the safe API prevents this via
//! `&mut self`, the unsafe window accessors document it as a caller
//! contract. An I/O failure during growth leaves the instance unusable:
//! the mapping is the file's only handle on its data, so callers must
//! discard the `MappedFile` (and anything built on it) on error.
//!
//! ## Error Handling
//!
//! All fallible operations return `eyre::Result` with the file path and
//! operation context attached.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;
use tracing::debug;

/// Zero buffer size for appending growth increments.
const ZERO_CHUNK: usize = 1 << 20;

pub struct MappedFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    ptr: *mut u8,
    size: u64,
    used_size: AtomicU64,
    growth: u64,
}

impl MappedFile {
    /// Opens the file at `path`, creating it if absent, and maps it.
    ///
    /// A freshly created (or empty) file is pre-grown by one `growth`
    /// increment. A non-empty file is mapped whole and `used_size` is
    /// recovered heuristically from the zero tail; callers with layout
    /// knowledge should override it afterwards.
    pub fn open<P: AsRef<Path>>(path: P, growth: u64) -> Result<Self> {
        let path = path.as_ref();

        ensure!(
            growth >= 1,
            "growth increment must be at least 1 byte (opening '{}')",
            path.display()
        );

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .wrap_err_with(|| format!("failed to open index file '{}'", path.display()))?;

        let mut size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        let fresh = size == 0;
        if fresh {
            append_zeros(&mut file, growth)
                .wrap_err_with(|| format!("failed to pre-grow '{}'", path.display()))?;
            size = growth;
        }

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can
        // be modified externally, leading to undefined behavior. This is safe
        // because:
        // 1. The file is opened read-write and owned by this process for the
        //    lifetime of the index (mode 0600, single-process contract)
        // 2. The mapping lifetime is tied to MappedFile, preventing
        //    use-after-unmap through the safe API
        // 3. All raw access goes through bytes()/bytes_mut(), whose contract
        //    forbids holding a window across a remap
        let mut mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };
        let ptr = mmap.as_mut_ptr();

        let mapped = Self {
            path: path.to_path_buf(),
            file,
            mmap,
            ptr,
            size,
            used_size: AtomicU64::new(0),
            growth,
        };

        if !fresh {
            mapped.recover_used_size();
            debug!(
                path = %mapped.path.display(),
                used = mapped.used_size(),
                size = mapped.size,
                "recovered write frontier"
            );
        }

        Ok(mapped)
    }

    /// Locates the boundary between the written prefix and the zero tail.
    ///
    /// Heuristic: lands short when the prefix itself ends in a zero byte.
    fn recover_used_size(&self) {
        let buf = &self.mmap[..];
        let mut low = 0u64;
        let mut mid = self.size / 2;
        let mut high = self.size;
        loop {
            if high - mid == 1 {
                let used = if buf[mid as usize] == 0 {
                    if mid > 0 && buf[mid as usize - 1] != 0 {
                        mid
                    } else {
                        mid.saturating_sub(1)
                    }
                } else {
                    high
                };
                self.used_size.store(used, Ordering::Release);
                return;
            }
            if buf[mid as usize] == 0 {
                high = mid;
                mid = low + (mid - low) / 2;
            } else {
                low = mid;
                mid += (high - mid) / 2;
            }
        }
    }

    /// Returns true iff `more` additional bytes fit without growing.
    pub fn check_size(&self, more: u64) -> bool {
        self.used_size() + more <= self.size
    }

    /// Grows the file until `more` additional bytes fit, in whole `growth`
    /// increments. No-op when the room already exists.
    ///
    /// Remapping invalidates every byte window obtained before the call.
    /// An error leaves the instance in an unusable state: the caller must
    /// discard it rather than retry.
    pub fn ensure_size(&mut self, more: u64) -> Result<()> {
        while !self.check_size(more) {
            append_zeros(&mut self.file, self.growth)
                .wrap_err_with(|| format!("failed to grow '{}'", self.path.display()))?;

            // SAFETY: see the mapping justification in open(). The old
            // mapping is dropped on assignment; no byte window can outlive
            // it because:
            // 1. ensure_size takes &mut self, so the borrow checker rules
            //    out safe windows
            // 2. bytes()/bytes_mut() callers are contractually required to
            //    release windows before calling ensure_size
            self.mmap = unsafe {
                MmapMut::map_mut(&self.file)
                    .wrap_err_with(|| format!("failed to remap '{}' after growth", self.path.display()))?
            };
            self.ptr = self.mmap.as_mut_ptr();
            self.size += self.growth;

            debug!(
                path = %self.path.display(),
                grown = self.growth,
                size = self.size,
                "file grown"
            );
        }
        Ok(())
    }

    /// Flushes the mapping to the storage device.
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .wrap_err_with(|| format!("failed to flush '{}'", self.path.display()))
    }

    /// Flushes, unmaps, and closes the file.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        // mapping and file handle are released on drop
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn used_size(&self) -> u64 {
        self.used_size.load(Ordering::Acquire)
    }

    /// Overrides the recovered write frontier. The zero-tail search is a
    /// heuristic; callers that can derive the frontier from their own
    /// layout invariants must install the exact value after open.
    pub fn set_used_size(&self, used: u64) {
        self.used_size.store(used, Ordering::Release);
    }

    pub(crate) fn advance_used_size(&self, more: u64) {
        self.used_size.fetch_add(more, Ordering::AcqRel);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a shared byte window over `[offset, offset + len)`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that:
    /// 1. `offset + len <= size()`
    /// 2. no thread concurrently writes the same range (external
    ///    synchronization, e.g. a region lock)
    /// 3. the window is released before any call to `ensure_size`
    pub unsafe fn bytes(&self, offset: u64, len: u64) -> &[u8] {
        debug_assert!(offset + len <= self.size);
        std::slice::from_raw_parts(self.ptr.add(offset as usize), len as usize)
    }

    /// Returns a mutable byte window over `[offset, offset + len)`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that:
    /// 1. `offset + len <= size()`
    /// 2. no other window over the same range exists while this one lives
    ///    (external synchronization, e.g. an exclusive region lock)
    /// 3. the window is released before any call to `ensure_size`
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self, offset: u64, len: u64) -> &mut [u8] {
        debug_assert!(offset + len <= self.size);
        std::slice::from_raw_parts_mut(self.ptr.add(offset as usize), len as usize)
    }
}

/// Appends `count` zero bytes at the end of the file and syncs.
fn append_zeros(file: &mut File, count: u64) -> Result<()> {
    file.seek(SeekFrom::End(0)).wrap_err("failed to seek to end")?;

    let chunk = vec![0u8; ZERO_CHUNK.min(count as usize)];
    let mut remaining = count;
    while remaining > 0 {
        let n = chunk.len().min(remaining as usize);
        file.write_all(&chunk[..n]).wrap_err("failed to append zero bytes")?;
        remaining -= n as u64;
    }

    file.sync_all().wrap_err("failed to sync after growth")
}
