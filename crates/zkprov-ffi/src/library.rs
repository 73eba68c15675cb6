//! Safe, owning wrapper over a [`NativeAbi`] implementation.
//!
//! Each method performs one native call, routes every out-parameter through
//! an [`OutSlot`], and returns either bridge-owned values or a single
//! [`ErrorValue`]. By the time a method returns, every pointer the native side
//! wrote is released, copied, or wrapped in a [`HostBuffer`].
//!
//! Calls here block for as long as the native library does; scheduling them
//! off the host thread is the dispatch layer's job.

use std::ffi::{c_char, c_void};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use zkprov_core::{ErrorValue, ZKP_ERR_VERIFY_FAIL, ZKP_OK};

use crate::abi::{NativeAbi, NativeArgs};
use crate::ownership::{HostBuffer, Ledger, LedgerSnapshot, OutSlot, TransferStrategy};

/// Which listing entry point to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// `zkp_list_backends`.
    Backends,
    /// `zkp_list_profiles`.
    Profiles,
}

impl ListKind {
    /// Native symbol name, used in error details and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Backends => "zkp_list_backends",
            Self::Profiles => "zkp_list_profiles",
        }
    }
}

/// Successful `zkp_prove`.
#[derive(Debug, Clone)]
pub struct ProveReply {
    /// Proof bytes (empty if the native side wrote a null pointer).
    pub proof: HostBuffer,
    /// Metadata text, copied; `None` if the native side wrote null.
    pub meta: Option<String>,
}

/// `zkp_verify` returning `ZKP_OK` or `ZKP_ERR_VERIFY_FAIL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReply {
    /// `true` for `ZKP_OK`, `false` for `ZKP_ERR_VERIFY_FAIL`.
    pub verified: bool,
    /// Metadata text, copied; `None` if the native side wrote null.
    pub meta: Option<String>,
}

struct Inner {
    abi: Arc<dyn NativeAbi>,
    ledger: Ledger,
}

/// Handle to a native library. Cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct Library {
    inner: Arc<Inner>,
}

impl Library {
    /// Take ownership of an ABI implementation.
    #[must_use]
    pub fn new<A: NativeAbi + 'static>(abi: A) -> Self {
        Self::from_shared(Arc::new(abi))
    }

    /// Share an ABI implementation the caller keeps a handle to.
    #[must_use]
    pub fn from_shared(abi: Arc<dyn NativeAbi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                abi,
                ledger: Ledger::default(),
            }),
        }
    }

    /// The system `libzkprov`.
    #[cfg(feature = "link")]
    #[must_use]
    pub fn linked() -> Self {
        Self::new(crate::abi::LinkedAbi)
    }

    /// Custody counters for pointers handled through this library.
    #[must_use]
    pub fn ledger(&self) -> LedgerSnapshot {
        self.inner.ledger.snapshot()
    }

    pub(crate) fn counters(&self) -> &Ledger {
        &self.inner.ledger
    }

    pub(crate) fn release(&self, ptr: NonNull<c_void>) {
        // SAFETY: only `NativeAlloc::drop` calls this, once per adopted
        // pointer, and every adopted pointer came from this ABI.
        unsafe { self.inner.abi.free(ptr.as_ptr()) };
        self.inner.ledger.note_released();
        tracing::trace!(ptr = ?ptr, "released native allocation");
    }

    /// `zkp_init`; returns the raw status.
    pub fn init(&self) -> i32 {
        self.inner.abi.init()
    }

    /// Call a listing entry point and copy its JSON text.
    ///
    /// Listings are advisory, so invalid UTF-8 is replaced rather than refused.
    pub fn list(&self, kind: ListKind) -> Result<Option<String>, ErrorValue> {
        let mut out: OutSlot<'_, c_char> = OutSlot::new(self);
        // SAFETY: `out` is a valid, null-initialised out-parameter.
        let rc = unsafe {
            match kind {
                ListKind::Backends => self.inner.abi.list_backends(out.as_out()),
                ListKind::Profiles => self.inner.abi.list_profiles(out.as_out()),
            }
        };
        if rc != ZKP_OK {
            tracing::warn!(call = kind.name(), rc, "native listing failed");
            // `out` drops here and releases any partial write.
            return Err(ErrorValue::native(rc, format!("{} failed", kind.name())));
        }
        Ok(out
            .adopt()
            .map(|a| a.into_string().into_string_lossy()))
    }

    /// `zkp_prove`.
    ///
    /// On failure, partial writes to any out-parameter are released before the
    /// error is returned.
    pub fn prove(
        &self,
        args: &NativeArgs,
        strategy: TransferStrategy,
    ) -> Result<ProveReply, ErrorValue> {
        let mut proof: OutSlot<'_, u8> = OutSlot::new(self);
        let mut proof_len: u64 = 0;
        let mut meta: OutSlot<'_, c_char> = OutSlot::new(self);

        // SAFETY: every out-parameter is a valid, initialised local.
        let rc = unsafe {
            self.inner
                .abi
                .prove(args, proof.as_out(), &mut proof_len, meta.as_out())
        };
        if rc != ZKP_OK {
            tracing::warn!(rc, "zkp_prove failed");
            return Err(ErrorValue::native(rc, "zkp_prove failed"));
        }

        // Adopt both before anything can fail so neither leaks.
        let proof = proof.adopt();
        let meta = meta.adopt();

        let proof = match proof {
            Some(alloc) => {
                let len = usize::try_from(proof_len).map_err(|_| {
                    ErrorValue::contract(
                        "Invalid proof returned from zkp_prove",
                        format!("proof_len {proof_len} exceeds addressable memory"),
                    )
                })?;
                alloc.into_buffer(len).into_host(strategy)
            }
            None => {
                if proof_len != 0 {
                    tracing::warn!(proof_len, "zkp_prove wrote a null proof with non-zero length");
                }
                HostBuffer::empty()
            }
        };

        let meta = meta
            .map(|a| a.into_string().into_string())
            .transpose()
            .map_err(|e| {
                ErrorValue::contract(
                    "Invalid meta returned from zkp_prove",
                    format!("Meta is not valid UTF-8: {e}"),
                )
            })?;

        Ok(ProveReply { proof, meta })
    }

    /// `zkp_verify` over a caller-owned proof.
    ///
    /// `ZKP_ERR_VERIFY_FAIL` is a normal negative result, not an error.
    pub fn verify(&self, args: &NativeArgs, proof: &[u8]) -> Result<VerifyReply, ErrorValue> {
        let mut meta: OutSlot<'_, c_char> = OutSlot::new(self);
        let proof_ptr = if proof.is_empty() {
            std::ptr::null()
        } else {
            proof.as_ptr()
        };

        // SAFETY: `proof` outlives the call; `meta` is a valid out-parameter.
        let rc = unsafe {
            self.inner
                .abi
                .verify(args, proof_ptr, proof.len() as u64, meta.as_out())
        };
        let verified = match rc {
            ZKP_OK => true,
            ZKP_ERR_VERIFY_FAIL => false,
            _ => {
                tracing::warn!(rc, "zkp_verify failed");
                return Err(ErrorValue::native(rc, "zkp_verify failed"));
            }
        };

        let meta = meta
            .adopt()
            .map(|a| a.into_string().into_string())
            .transpose()
            .map_err(|e| {
                ErrorValue::contract(
                    "Invalid meta returned from zkp_verify",
                    format!("Meta is not valid UTF-8: {e}"),
                )
            })?;

        Ok(VerifyReply { verified, meta })
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("ledger", &self.ledger())
            .finish_non_exhaustive()
    }
}
