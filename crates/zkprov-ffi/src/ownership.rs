//! Ownership transfer for native allocations.
//!
//! Every pointer the native side writes goes through these states, each one
//! a distinct type so the compiler enforces the order:
//!
//! ```text
//! OutSlot (unowned) ──adopt──▶ NativeAlloc (owned by bridge) ──drop──▶ released
//!                                   │
//!                                   ├──▶ NativeString ──copy──▶ String   (released)
//!                                   └──▶ NativeBuffer ──wrap──▶ HostBuffer (transferred;
//!                                                               released with last handle)
//! ```
//!
//! ## Invariants
//! - A non-null pointer is released exactly once: [`NativeAlloc`] is not
//!   `Clone` and releases in `Drop`.
//! - A slot the native side wrote is released even if the call failed and
//!   nobody adopted it ([`OutSlot`]'s `Drop`). Failure codes are never taken
//!   to imply null outputs.
//! - Null outputs are observed and never passed to `free`.
//!
//! Strategy per buffer type: strings are always copied eagerly; proof buffers
//! follow [`TransferStrategy`] (zero-copy by default).

use std::ffi::{c_void, CStr};
use std::fmt;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::library::Library;

/// How proof bytes produced by the native side reach the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferStrategy {
    /// Wrap the native allocation; `zkp_free` runs when the host drops the
    /// last [`HostBuffer`] handle.
    #[default]
    ZeroCopy,
    /// Copy into bridge-owned memory and release the native allocation
    /// immediately.
    EagerCopy,
}

impl TransferStrategy {
    /// Canonical spelling, as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ZeroCopy => "zero-copy",
            Self::EagerCopy => "eager-copy",
        }
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero-copy" | "zerocopy" | "deferred" => Ok(Self::ZeroCopy),
            "eager-copy" | "eagercopy" | "copy" | "eager" => Ok(Self::EagerCopy),
            other => Err(format!(
                "unknown transfer strategy '{other}' (expected zero-copy or eager-copy)"
            )),
        }
    }
}

/* ------------------------------- accounting ------------------------------- */

/// Per-library counters of pointer custody.
#[derive(Debug, Default)]
pub struct Ledger {
    adopted: AtomicU64,
    released: AtomicU64,
    transferred: AtomicU64,
}

/// Point-in-time copy of a [`Ledger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    /// Non-null pointers taken into custody.
    pub adopted: u64,
    /// Pointers handed back to `zkp_free`.
    pub released: u64,
    /// Pointers wrapped for the host (zero-copy), released or not.
    pub transferred: u64,
}

impl LedgerSnapshot {
    /// Pointers adopted and not yet released.
    #[must_use]
    pub const fn live(&self) -> u64 {
        self.adopted.saturating_sub(self.released)
    }
}

impl Ledger {
    pub(crate) fn note_adopted(&self) {
        self.adopted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_transferred(&self) {
        self.transferred.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counts.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            adopted: self.adopted.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            transferred: self.transferred.load(Ordering::Relaxed),
        }
    }
}

/* ------------------------------ custody types ----------------------------- */

/// A native out-parameter, null until the native call writes it.
///
/// Dropping a slot that still holds a pointer releases it.
pub(crate) struct OutSlot<'a, T> {
    ptr: *mut T,
    lib: &'a Library,
}

impl<'a, T> OutSlot<'a, T> {
    pub(crate) fn new(lib: &'a Library) -> Self {
        Self {
            ptr: ptr::null_mut(),
            lib,
        }
    }

    /// Address to pass as the `T**` argument.
    pub(crate) fn as_out(&mut self) -> *mut *mut T {
        &mut self.ptr
    }

    /// Take custody of whatever was written (`None` for null).
    pub(crate) fn adopt(mut self) -> Option<NativeAlloc> {
        let raw = std::mem::replace(&mut self.ptr, ptr::null_mut());
        NonNull::new(raw.cast::<c_void>()).map(|p| NativeAlloc::adopt(self.lib.clone(), p))
    }
}

impl<T> Drop for OutSlot<'_, T> {
    fn drop(&mut self) {
        if let Some(p) = NonNull::new(self.ptr.cast::<c_void>()) {
            tracing::debug!(ptr = ?p, "releasing unclaimed out-parameter");
            drop(NativeAlloc::adopt(self.lib.clone(), p));
        }
    }
}

/// A non-null native allocation owned by the bridge.
pub(crate) struct NativeAlloc {
    ptr: NonNull<c_void>,
    lib: Library,
}

// SAFETY: the allocation is uniquely owned, never written through after
// adoption, and `zkp_free` is callable from any thread (NativeAbi contract).
unsafe impl Send for NativeAlloc {}
// SAFETY: shared access is read-only.
unsafe impl Sync for NativeAlloc {}

impl NativeAlloc {
    fn adopt(lib: Library, ptr: NonNull<c_void>) -> Self {
        lib.counters().note_adopted();
        tracing::trace!(ptr = ?ptr, "adopted native allocation");
        Self { ptr, lib }
    }

    const fn as_ptr(&self) -> *const c_void {
        self.ptr.as_ptr()
    }

    pub(crate) fn into_string(self) -> NativeString {
        NativeString { alloc: self }
    }

    pub(crate) fn into_buffer(self, len: usize) -> NativeBuffer {
        NativeBuffer { alloc: self, len }
    }
}

impl Drop for NativeAlloc {
    fn drop(&mut self) {
        self.lib.release(self.ptr);
    }
}

impl fmt::Debug for NativeAlloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeAlloc").field(&self.ptr).finish()
    }
}

/// A NUL-terminated native string.
///
/// Strings are never exposed zero-copy: the only way out is a copy, after
/// which the native allocation is released.
#[derive(Debug)]
pub struct NativeString {
    alloc: NativeAlloc,
}

impl NativeString {
    fn copy_bytes(&self) -> Vec<u8> {
        // SAFETY: NativeAbi guarantees a live, NUL-terminated allocation that
        // nobody mutates while we hold it.
        unsafe { CStr::from_ptr(self.alloc.as_ptr().cast()) }
            .to_bytes()
            .to_vec()
    }

    /// Copy out as UTF-8 and release.
    pub fn into_string(self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.copy_bytes())
    }

    /// Copy out, replacing invalid UTF-8, and release.
    #[must_use]
    pub fn into_string_lossy(self) -> String {
        String::from_utf8_lossy(&self.copy_bytes()).into_owned()
    }
}

/// Proof bytes still living in native memory.
#[derive(Debug)]
pub struct NativeBuffer {
    alloc: NativeAlloc,
    len: usize,
}

impl NativeBuffer {
    /// The bytes, borrowed from the native allocation.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: NativeAbi guarantees `len` readable bytes behind the pointer
        // until we free it, which only happens when `self` is dropped.
        unsafe { std::slice::from_raw_parts(self.alloc.as_ptr().cast::<u8>(), self.len) }
    }

    /// Apply `strategy`: wrap as-is, or copy and release now.
    #[must_use]
    pub fn into_host(self, strategy: TransferStrategy) -> HostBuffer {
        match strategy {
            TransferStrategy::ZeroCopy => {
                self.alloc.lib.counters().note_transferred();
                HostBuffer(Arc::new(Repr::Native(self)))
            }
            TransferStrategy::EagerCopy => HostBuffer::from(self.as_slice()),
        }
    }
}

/* ------------------------------- host side -------------------------------- */

enum Repr {
    Owned(Box<[u8]>),
    Native(NativeBuffer),
}

/// A proof buffer as the host sees it.
///
/// Cheap to clone (shared handle). When it wraps native memory, `zkp_free`
/// runs after the last clone is dropped; this is the release callback the
/// host's memory manager triggers.
#[derive(Clone)]
pub struct HostBuffer(Arc<Repr>);

impl HostBuffer {
    /// An empty, bridge-owned buffer.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::new(Repr::Owned(Box::default())))
    }

    /// The bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match &*self.0 {
            Repr::Owned(b) => &b[..],
            Repr::Native(n) => n.as_slice(),
        }
    }

    /// Whether the bytes still live in a native allocation.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(&*self.0, Repr::Native(_))
    }
}

impl Deref for HostBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for HostBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for HostBuffer {
    fn from(v: Vec<u8>) -> Self {
        Self(Arc::new(Repr::Owned(v.into_boxed_slice())))
    }
}

impl From<&[u8]> for HostBuffer {
    fn from(s: &[u8]) -> Self {
        Self(Arc::new(Repr::Owned(s.into())))
    }
}

impl PartialEq for HostBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for HostBuffer {}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("len", &self.len())
            .field("native", &self.is_native())
            .finish()
    }
}
