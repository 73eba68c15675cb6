//! In-process reference engine implementing [`NativeAbi`].
//!
//! [`StubEngine`] behaves like a tiny `libzkprov`:
//! - one backend (`native@0.0`) and one profile (`balanced`);
//! - `prove` derives 128 deterministic proof bytes from its inputs (BLAKE3 in
//!   XOF mode) and reports `{"digest", "proof_len"}`;
//! - `verify` recomputes the proof and compares.
//!
//! Every pointer it hands out is a real heap allocation recorded in a table,
//! so tests can assert that the bridge frees each one exactly once. Faults can
//! be injected per entry point.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use zkprov_core::{
    ZKP_ERR_BACKEND, ZKP_ERR_INVALID_ARG, ZKP_ERR_PROFILE, ZKP_ERR_PROOF_CORRUPT,
    ZKP_ERR_VERIFY_FAIL, ZKP_OK,
};

use crate::abi::{NativeAbi, NativeArgs};

/// Backend id the engine recognises.
pub const BACKEND_ID: &str = "native@0.0";
/// Profile id the engine recognises.
pub const PROFILE_ID: &str = "balanced";
/// Length of every proof the engine produces.
pub const PROOF_LEN: usize = 128;

const PROOF_CONTEXT: &str = "zkprov stub engine 2024-01 proof";

/// Native entry points, for counters and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    /// `zkp_init`.
    Init,
    /// `zkp_list_backends`.
    ListBackends,
    /// `zkp_list_profiles`.
    ListProfiles,
    /// `zkp_prove`.
    Prove,
    /// `zkp_verify`.
    Verify,
}

impl Entry {
    const ALL: [Self; 5] = [
        Self::Init,
        Self::ListBackends,
        Self::ListProfiles,
        Self::Prove,
        Self::Verify,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// A forced failure for one entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// Status to return instead of running the entry point.
    pub status: i32,
    /// Write freshly allocated values to every out-parameter before failing.
    pub partial_writes: bool,
}

#[derive(Debug, Default)]
struct Faults {
    forced: [Option<Fault>; 5],
    // Outer `None`: no override. Inner `None`: write a null pointer.
    text: [Option<Option<String>>; 5],
    latency: Duration,
}

/// Reference implementation of the native ABI. See the module docs.
#[derive(Debug, Default)]
pub struct StubEngine {
    // address -> allocated length
    allocations: Mutex<HashMap<usize, usize>>,
    calls: [AtomicU64; 5],
    free_calls: AtomicU64,
    invalid_frees: AtomicU64,
    faults: Mutex<Faults>,
}

impl StubEngine {
    /// Fresh engine with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /* --------------------------- allocation table --------------------------- */

    fn table(&self) -> MutexGuard<'_, HashMap<usize, usize>> {
        self.allocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a copy of `bytes` that [`NativeAbi::free`] accepts.
    #[must_use]
    pub fn alloc(&self, bytes: &[u8]) -> *mut u8 {
        // Zero-length boxes share a dangling address; keep every pointer unique.
        let boxed: Box<[u8]> = if bytes.is_empty() {
            Box::new([0])
        } else {
            bytes.into()
        };
        let len = boxed.len();
        let raw = Box::into_raw(boxed).cast::<u8>();
        self.table().insert(raw as usize, len);
        raw
    }

    /// Allocate a NUL-terminated copy of `text`.
    #[must_use]
    pub fn alloc_cstr(&self, text: &str) -> *mut c_char {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.alloc(&bytes).cast()
    }

    /// Allocations handed out and not yet freed.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.table().len()
    }

    /* ------------------------------- counters ------------------------------- */

    /// How many times `entry` was called.
    #[must_use]
    pub fn calls(&self, entry: Entry) -> u64 {
        self.calls[entry.index()].load(Ordering::Relaxed)
    }

    /// Calls to any entry point other than `zkp_free`.
    #[must_use]
    pub fn native_calls(&self) -> u64 {
        Entry::ALL.iter().map(|&e| self.calls(e)).sum()
    }

    /// Calls to `zkp_free`, null included.
    #[must_use]
    pub fn free_calls(&self) -> u64 {
        self.free_calls.load(Ordering::Relaxed)
    }

    /// Frees of pointers the engine never handed out (or already freed).
    #[must_use]
    pub fn invalid_frees(&self) -> u64 {
        self.invalid_frees.load(Ordering::Relaxed)
    }

    /* ---------------------------- fault injection --------------------------- */

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force `entry` to return `fault.status`.
    pub fn inject(&self, entry: Entry, fault: Fault) {
        self.faults().forced[entry.index()] = Some(fault);
    }

    /// Force `entry` to fail with `status`, writing nothing.
    pub fn fail(&self, entry: Entry, status: i32) {
        self.inject(
            entry,
            Fault {
                status,
                partial_writes: false,
            },
        );
    }

    /// Force `entry` to fail with `status` after writing every out-parameter.
    pub fn fail_with_partial_writes(&self, entry: Entry, status: i32) {
        self.inject(
            entry,
            Fault {
                status,
                partial_writes: true,
            },
        );
    }

    /// Replace the metadata `zkp_prove` / `zkp_verify` writes on success.
    /// `None` writes a null pointer.
    pub fn override_meta(&self, entry: Entry, text: Option<&str>) {
        self.faults().text[entry.index()] = Some(text.map(str::to_owned));
    }

    /// Replace the JSON a listing entry point writes. `None` writes null.
    pub fn override_listing(&self, entry: Entry, text: Option<&str>) {
        self.override_meta(entry, text);
    }

    /// Sleep this long inside `zkp_prove` and `zkp_verify`.
    pub fn set_latency(&self, latency: Duration) {
        self.faults().latency = latency;
    }

    /// Remove every fault and override.
    pub fn clear_faults(&self) {
        *self.faults() = Faults::default();
    }

    /* -------------------------------- engine -------------------------------- */

    fn enter(&self, entry: Entry) -> (Option<Fault>, Option<Option<String>>) {
        self.calls[entry.index()].fetch_add(1, Ordering::Relaxed);
        let faults = self.faults();
        let latency = if matches!(entry, Entry::Prove | Entry::Verify) {
            faults.latency
        } else {
            Duration::ZERO
        };
        let state = (
            faults.forced[entry.index()],
            faults.text[entry.index()].clone(),
        );
        drop(faults);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        state
    }

    fn text_or_null(&self, text: Option<&str>) -> *mut c_char {
        text.map_or(ptr::null_mut(), |t| self.alloc_cstr(t))
    }

    fn listing(entry: Entry) -> String {
        let items = match entry {
            Entry::ListBackends => json!([{
                "id": BACKEND_ID,
                "name": "Native Toy Backend",
                "protocol": "toy",
            }]),
            _ => json!([{ "id": PROFILE_ID, "name": "Balanced Toy Profile" }]),
        };
        json!({ "items": items }).to_string()
    }

    /// # Safety
    /// `out_json` must be null or valid for a pointer write.
    unsafe fn list(&self, entry: Entry, out_json: *mut *mut c_char) -> i32 {
        let (fault, text) = self.enter(entry);
        if out_json.is_null() {
            return ZKP_ERR_INVALID_ARG;
        }
        if let Some(f) = fault {
            if f.partial_writes {
                // SAFETY: checked non-null; caller guarantees writability.
                unsafe { out_json.write(self.alloc_cstr(&Self::listing(entry))) };
            }
            return f.status;
        }
        let out = match text {
            Some(t) => self.text_or_null(t.as_deref()),
            None => self.alloc_cstr(&Self::listing(entry)),
        };
        // SAFETY: checked non-null; caller guarantees writability.
        unsafe { out_json.write(out) };
        ZKP_OK
    }

    /// Deterministic proof for `args`, or the status explaining why not.
    fn expected_proof(args: &NativeArgs) -> Result<[u8; PROOF_LEN], i32> {
        if args.backend_id().to_bytes() != BACKEND_ID.as_bytes() {
            return Err(ZKP_ERR_BACKEND);
        }
        if args.profile_id().to_bytes() != PROFILE_ID.as_bytes() {
            return Err(ZKP_ERR_PROFILE);
        }
        let inputs = args.public_inputs_json().to_bytes();
        if !inputs.is_empty() && serde_json::from_slice::<serde_json::Value>(inputs).is_err() {
            return Err(ZKP_ERR_INVALID_ARG);
        }

        let mut hasher = blake3::Hasher::new_derive_key(PROOF_CONTEXT);
        for part in [
            args.backend_id(),
            args.field(),
            args.hash_id(),
            args.profile_id(),
            args.air_path(),
            args.public_inputs_json(),
        ] {
            absorb(&mut hasher, part);
        }
        hasher.update(&args.fri_arity().to_le_bytes());

        let mut proof = [0u8; PROOF_LEN];
        hasher.finalize_xof().fill(&mut proof);
        Ok(proof)
    }
}

fn absorb(hasher: &mut blake3::Hasher, part: &CStr) {
    let bytes = part.to_bytes();
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn digest_of(proof: &[u8]) -> String {
    hex::encode(blake3::hash(proof).as_bytes())
}

// SAFETY: every pointer written is a fresh, uniquely owned heap allocation
// recorded in the table; `free` only releases recorded pointers and removes
// them first, so a second free is counted instead of performed. All state is
// behind atomics or mutexes.
unsafe impl NativeAbi for StubEngine {
    fn init(&self) -> i32 {
        let (fault, _) = self.enter(Entry::Init);
        fault.map_or(ZKP_OK, |f| f.status)
    }

    unsafe fn list_backends(&self, out_json: *mut *mut c_char) -> i32 {
        // SAFETY: forwarded caller contract.
        unsafe { self.list(Entry::ListBackends, out_json) }
    }

    unsafe fn list_profiles(&self, out_json: *mut *mut c_char) -> i32 {
        // SAFETY: forwarded caller contract.
        unsafe { self.list(Entry::ListProfiles, out_json) }
    }

    unsafe fn prove(
        &self,
        args: &NativeArgs,
        out_proof: *mut *mut u8,
        out_proof_len: *mut u64,
        out_json_meta: *mut *mut c_char,
    ) -> i32 {
        let (fault, text) = self.enter(Entry::Prove);
        if out_proof.is_null() || out_proof_len.is_null() || out_json_meta.is_null() {
            return ZKP_ERR_INVALID_ARG;
        }

        if let Some(f) = fault {
            if f.partial_writes {
                // SAFETY: all three checked non-null above.
                unsafe {
                    out_proof.write(self.alloc(&[0xAB; 16]));
                    out_proof_len.write(16);
                    out_json_meta.write(self.alloc_cstr(r#"{"partial":true}"#));
                }
            }
            return f.status;
        }

        let proof = match Self::expected_proof(args) {
            Ok(p) => p,
            Err(rc) => return rc,
        };
        let meta = match text {
            Some(t) => self.text_or_null(t.as_deref()),
            None => self.alloc_cstr(
                &json!({ "digest": digest_of(&proof), "proof_len": PROOF_LEN }).to_string(),
            ),
        };

        // SAFETY: all three checked non-null above.
        unsafe {
            out_proof.write(self.alloc(&proof));
            out_proof_len.write(PROOF_LEN as u64);
            out_json_meta.write(meta);
        }
        ZKP_OK
    }

    unsafe fn verify(
        &self,
        args: &NativeArgs,
        proof_ptr: *const u8,
        proof_len: u64,
        out_json_meta: *mut *mut c_char,
    ) -> i32 {
        let (fault, text) = self.enter(Entry::Verify);
        if out_json_meta.is_null() || (proof_ptr.is_null() && proof_len != 0) {
            return ZKP_ERR_INVALID_ARG;
        }

        if let Some(f) = fault {
            if f.partial_writes {
                // SAFETY: checked non-null above.
                unsafe { out_json_meta.write(self.alloc_cstr(r#"{"partial":true}"#)) };
            }
            return f.status;
        }

        let expected = match Self::expected_proof(args) {
            Ok(p) => p,
            Err(rc) => return rc,
        };
        let Ok(len) = usize::try_from(proof_len) else {
            return ZKP_ERR_PROOF_CORRUPT;
        };
        if len != PROOF_LEN {
            return ZKP_ERR_PROOF_CORRUPT;
        }
        // SAFETY: caller guarantees `proof_len` readable bytes; non-null
        // because `len` is non-zero here.
        let given = unsafe { std::slice::from_raw_parts(proof_ptr, len) };
        let verified = given == &expected[..];

        let meta = match text {
            Some(t) => self.text_or_null(t.as_deref()),
            None => self.alloc_cstr(
                &json!({
                    "digest": digest_of(given),
                    "proof_len": proof_len,
                    "verified": verified,
                })
                .to_string(),
            ),
        };
        // SAFETY: checked non-null above.
        unsafe { out_json_meta.write(meta) };

        if verified {
            ZKP_OK
        } else {
            ZKP_ERR_VERIFY_FAIL
        }
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        self.free_calls.fetch_add(1, Ordering::Relaxed);
        if ptr.is_null() {
            return;
        }
        let Some(len) = self.table().remove(&(ptr as usize)) else {
            self.invalid_frees.fetch_add(1, Ordering::Relaxed);
            tracing::error!(?ptr, "free of unknown pointer");
            return;
        };
        let slice = ptr::slice_from_raw_parts_mut(ptr.cast::<u8>(), len);
        // SAFETY: `ptr` came from `Box::into_raw` of a `len`-byte boxed slice
        // in `alloc`, and removing it from the table makes this the only free.
        drop(unsafe { Box::from_raw(slice) });
    }
}

impl Drop for StubEngine {
    fn drop(&mut self) {
        // Release anything the bridge leaked so test runs stay clean under
        // leak checkers; the leak itself has already been observed.
        let table = std::mem::take(
            self.allocations
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (addr, len) in table {
            let slice = ptr::slice_from_raw_parts_mut(addr as *mut u8, len);
            // SAFETY: as in `free`; each recorded allocation is freed once.
            drop(unsafe { Box::from_raw(slice) });
        }
    }
}
