//! The native ABI as a Rust trait.
//!
//! [`NativeAbi`] mirrors `zkprov.h` one function per method, keeping raw
//! out-parameters so the ownership layer above can see exactly what the
//! native side wrote. `zkp_alloc` is not bound: no entry point takes ownership
//! of a host pointer. Implementations:
//! - [`LinkedAbi`] (feature `link`): the real `libzkprov` symbols;
//! - [`crate::stub::StubEngine`]: an in-process reference engine.

use std::ffi::{c_char, c_void, CStr, CString, NulError};

use zkprov_core::CallConfig;

/// Owned, NUL-terminated copies of a [`CallConfig`]'s strings.
///
/// Built once per call on the worker; the pointers handed to the native side
/// stay valid for as long as this value is borrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeArgs {
    backend_id: CString,
    field: CString,
    hash_id: CString,
    fri_arity: u32,
    profile_id: CString,
    air_path: CString,
    public_inputs_json: CString,
}

impl NativeArgs {
    /// Convert a validated config. Fails only on interior NULs, which the
    /// validator already refuses.
    pub fn new(cfg: &CallConfig) -> Result<Self, NulError> {
        Ok(Self {
            backend_id: CString::new(cfg.backend_id.as_str())?,
            field: CString::new(cfg.field.as_str())?,
            hash_id: CString::new(cfg.hash_id.as_str())?,
            fri_arity: cfg.fri_arity,
            profile_id: CString::new(cfg.profile_id.as_str())?,
            air_path: CString::new(cfg.air_path.as_str())?,
            public_inputs_json: CString::new(cfg.public_inputs_json.as_str())?,
        })
    }

    /// `backend_id`.
    #[must_use]
    pub fn backend_id(&self) -> &CStr {
        &self.backend_id
    }

    /// `field`.
    #[must_use]
    pub fn field(&self) -> &CStr {
        &self.field
    }

    /// `hash_id`.
    #[must_use]
    pub fn hash_id(&self) -> &CStr {
        &self.hash_id
    }

    /// `fri_arity`.
    #[must_use]
    pub const fn fri_arity(&self) -> u32 {
        self.fri_arity
    }

    /// `profile_id`.
    #[must_use]
    pub fn profile_id(&self) -> &CStr {
        &self.profile_id
    }

    /// `air_path`.
    #[must_use]
    pub fn air_path(&self) -> &CStr {
        &self.air_path
    }

    /// `public_inputs_json` (possibly empty).
    #[must_use]
    pub fn public_inputs_json(&self) -> &CStr {
        &self.public_inputs_json
    }
}

/// One method per native entry point. Status `0` is success.
///
/// # Safety
/// Implementors promise the `zkprov.h` contract:
/// - every non-null pointer written to an out-parameter is a distinct live
///   allocation that [`NativeAbi::free`] accepts exactly once;
/// - `out_proof` points to at least `*out_proof_len` readable bytes and
///   string outputs are NUL-terminated;
/// - nothing written is mutated or freed by the native side afterwards;
/// - all methods may be called from any thread, concurrently (`init` is
///   idempotent).
pub unsafe trait NativeAbi: Send + Sync {
    /// `zkp_init`.
    fn init(&self) -> i32;

    /// `zkp_list_backends`.
    ///
    /// # Safety
    /// `out_json` must be valid for a pointer write.
    unsafe fn list_backends(&self, out_json: *mut *mut c_char) -> i32;

    /// `zkp_list_profiles`.
    ///
    /// # Safety
    /// `out_json` must be valid for a pointer write.
    unsafe fn list_profiles(&self, out_json: *mut *mut c_char) -> i32;

    /// `zkp_prove`.
    ///
    /// # Safety
    /// All three out-parameters must be valid for writes.
    unsafe fn prove(
        &self,
        args: &NativeArgs,
        out_proof: *mut *mut u8,
        out_proof_len: *mut u64,
        out_json_meta: *mut *mut c_char,
    ) -> i32;

    /// `zkp_verify`.
    ///
    /// # Safety
    /// `proof_ptr` must be readable for `proof_len` bytes (or null with
    /// `proof_len == 0`); `out_json_meta` must be valid for a pointer write.
    unsafe fn verify(
        &self,
        args: &NativeArgs,
        proof_ptr: *const u8,
        proof_len: u64,
        out_json_meta: *mut *mut c_char,
    ) -> i32;

    /// `zkp_free`; a no-op on null.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer this implementation handed out and
    /// that has not been freed yet.
    unsafe fn free(&self, ptr: *mut c_void);
}

#[cfg(feature = "link")]
mod linked {
    use super::{c_char, c_void, NativeAbi, NativeArgs};

    #[link(name = "zkprov")]
    extern "C" {
        fn zkp_init() -> i32;
        fn zkp_list_backends(out_json: *mut *mut c_char) -> i32;
        fn zkp_list_profiles(out_json: *mut *mut c_char) -> i32;
        fn zkp_prove(
            backend_id: *const c_char,
            field: *const c_char,
            hash_id: *const c_char,
            fri_arity: u32,
            profile_id: *const c_char,
            air_path: *const c_char,
            public_inputs_json: *const c_char,
            out_proof: *mut *mut u8,
            out_proof_len: *mut u64,
            out_json_meta: *mut *mut c_char,
        ) -> i32;
        fn zkp_verify(
            backend_id: *const c_char,
            field: *const c_char,
            hash_id: *const c_char,
            fri_arity: u32,
            profile_id: *const c_char,
            air_path: *const c_char,
            public_inputs_json: *const c_char,
            proof_ptr: *const u8,
            proof_len: u64,
            out_json_meta: *mut *mut c_char,
        ) -> i32;
        fn zkp_free(ptr: *mut c_void);
    }

    /// The system `libzkprov`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct LinkedAbi;

    // SAFETY: forwards verbatim to libzkprov, whose header documents exactly
    // the contract `NativeAbi` requires.
    unsafe impl NativeAbi for LinkedAbi {
        fn init(&self) -> i32 {
            // SAFETY: no arguments; documented idempotent.
            unsafe { zkp_init() }
        }

        unsafe fn list_backends(&self, out_json: *mut *mut c_char) -> i32 {
            // SAFETY: caller upholds the out-parameter contract.
            unsafe { zkp_list_backends(out_json) }
        }

        unsafe fn list_profiles(&self, out_json: *mut *mut c_char) -> i32 {
            // SAFETY: caller upholds the out-parameter contract.
            unsafe { zkp_list_profiles(out_json) }
        }

        unsafe fn prove(
            &self,
            args: &NativeArgs,
            out_proof: *mut *mut u8,
            out_proof_len: *mut u64,
            out_json_meta: *mut *mut c_char,
        ) -> i32 {
            // SAFETY: string pointers borrow `args` for the duration of the
            // call; out-parameters are the caller's responsibility.
            unsafe {
                zkp_prove(
                    args.backend_id().as_ptr(),
                    args.field().as_ptr(),
                    args.hash_id().as_ptr(),
                    args.fri_arity(),
                    args.profile_id().as_ptr(),
                    args.air_path().as_ptr(),
                    args.public_inputs_json().as_ptr(),
                    out_proof,
                    out_proof_len,
                    out_json_meta,
                )
            }
        }

        unsafe fn verify(
            &self,
            args: &NativeArgs,
            proof_ptr: *const u8,
            proof_len: u64,
            out_json_meta: *mut *mut c_char,
        ) -> i32 {
            // SAFETY: as for `prove`; the proof slice is borrowed by the caller.
            unsafe {
                zkp_verify(
                    args.backend_id().as_ptr(),
                    args.field().as_ptr(),
                    args.hash_id().as_ptr(),
                    args.fri_arity(),
                    args.profile_id().as_ptr(),
                    args.air_path().as_ptr(),
                    args.public_inputs_json().as_ptr(),
                    proof_ptr,
                    proof_len,
                    out_json_meta,
                )
            }
        }

        unsafe fn free(&self, ptr: *mut c_void) {
            // SAFETY: caller guarantees `ptr` came from libzkprov and is live.
            unsafe { zkp_free(ptr) }
        }
    }
}

#[cfg(feature = "link")]
pub use linked::LinkedAbi;

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CallConfig {
        CallConfig {
            backend_id: "native@0.0".into(),
            field: "Prime254".into(),
            hash_id: "blake3".into(),
            fri_arity: 4,
            profile_id: "balanced".into(),
            air_path: "toy.air".into(),
            public_inputs_json: String::new(),
        }
    }

    #[test]
    fn args_are_nul_terminated_copies() {
        let args = NativeArgs::new(&cfg()).unwrap();
        assert_eq!(args.backend_id().to_bytes_with_nul(), b"native@0.0\0");
        assert_eq!(args.public_inputs_json().to_bytes(), b"");
        assert_eq!(args.fri_arity(), 4);
    }

    #[test]
    fn interior_nul_is_refused() {
        let mut c = cfg();
        c.air_path = "a\0b".into();
        assert!(NativeArgs::new(&c).is_err());
    }
}
