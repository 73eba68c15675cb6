//! The three native operations as [`Job`]s.
//!
//! Each job owns everything it needs (config, proof handle) so it can move to
//! a worker thread. All of them call `zkp_init` first; the engine treats it as
//! idempotent.

use serde_json::{json, Value};
use zkprov_core::{
    parse_listing, parse_prove_meta, parse_verify_meta, CallConfig, ErrorValue, Listing, ZKP_OK,
};
use zkprov_ffi::{HostBuffer, Library, ListKind, NativeArgs, TransferStrategy};

use crate::dispatch::Job;
use crate::result::{ProveOutput, VerifyOutput};

fn init(lib: &Library, detail: impl FnOnce() -> String) -> Result<(), ErrorValue> {
    match lib.init() {
        ZKP_OK => Ok(()),
        rc => Err(ErrorValue::native(rc, detail())),
    }
}

fn native_args(config: &CallConfig) -> Result<NativeArgs, ErrorValue> {
    // Interior NULs are refused during validation; this only guards the
    // typed API, where a `CallConfig` can be built by hand.
    NativeArgs::new(config).map_err(|e| ErrorValue::invalid_argument(e.to_string()))
}

fn byte_len(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/* -------------------------------- listing --------------------------------- */

/// `zkp_list_backends` or `zkp_list_profiles`.
#[derive(Debug, Clone, Copy)]
pub struct ListJob {
    kind: ListKind,
}

impl ListJob {
    /// Listing of `kind`.
    #[must_use]
    pub const fn new(kind: ListKind) -> Self {
        Self { kind }
    }
}

impl Job for ListJob {
    type Output = Value;
    const NAME: &'static str = "list";

    fn execute(self, lib: &Library) -> Result<Value, ErrorValue> {
        let name = self.kind.name();
        init(lib, || format!("zkp_init failed during {name}"))?;
        let text = lib.list(self.kind)?;

        let listing = parse_listing(text.as_deref());
        match &listing {
            Listing::Parsed(_) => {}
            Listing::Empty => tracing::warn!(call = name, "empty listing, resolving with {{}}"),
            Listing::Raw { text, reason } => {
                tracing::warn!(call = name, len = text.len(), %reason, "listing is not JSON");
            }
        }
        Ok(listing.into_value())
    }
}

/* --------------------------------- prove ---------------------------------- */

/// `zkp_prove` plus the strict metadata check.
#[derive(Debug, Clone)]
pub struct ProveJob {
    config: CallConfig,
    strategy: TransferStrategy,
}

impl ProveJob {
    /// Prove with `config`, delivering proof bytes by `strategy`.
    #[must_use]
    pub const fn new(config: CallConfig, strategy: TransferStrategy) -> Self {
        Self { config, strategy }
    }
}

impl Job for ProveJob {
    type Output = ProveOutput;
    const NAME: &'static str = "prove";

    fn execute(self, lib: &Library) -> Result<ProveOutput, ErrorValue> {
        let args = native_args(&self.config)?;
        init(lib, || "zkp_init failed".to_owned())?;

        let reply = lib.prove(&args, self.strategy)?;
        tracing::debug!(
            proof_len = reply.proof.len(),
            native = reply.proof.is_native(),
            "zkp_prove returned"
        );

        // On error `reply.proof` drops here, releasing a zero-copy proof.
        let meta = parse_prove_meta(
            reply.meta.as_deref().unwrap_or_default(),
            byte_len(reply.proof.len()),
        )
        .map_err(|e| ErrorValue::contract("Invalid meta returned from zkp_prove", e.to_string()))?;

        Ok(ProveOutput {
            proof: reply.proof,
            meta,
        })
    }
}

/* --------------------------------- verify --------------------------------- */

/// `zkp_verify` plus the lenient metadata check.
#[derive(Debug, Clone)]
pub struct VerifyJob {
    config: CallConfig,
    // A clone keeps the caller's bytes alive for the native call.
    proof: HostBuffer,
    check_proof_len: bool,
}

impl VerifyJob {
    /// Verify `proof` under `config`. With `check_proof_len`, a `proof_len`
    /// in the returned metadata must equal `proof.len()`.
    #[must_use]
    pub const fn new(config: CallConfig, proof: HostBuffer, check_proof_len: bool) -> Self {
        Self {
            config,
            proof,
            check_proof_len,
        }
    }
}

impl Job for VerifyJob {
    type Output = VerifyOutput;
    const NAME: &'static str = "verify";

    fn execute(self, lib: &Library) -> Result<VerifyOutput, ErrorValue> {
        let args = native_args(&self.config)?;
        init(lib, || "zkp_init failed".to_owned())?;

        let reply = lib.verify(&args, &self.proof)?;
        tracing::debug!(verified = reply.verified, "zkp_verify returned");

        let input_len = self
            .check_proof_len
            .then(|| byte_len(self.proof.len()));
        let meta = parse_verify_meta(reply.meta.as_deref().unwrap_or_default(), input_len)
            .map_err(|e| {
                ErrorValue::contract("Invalid meta returned from zkp_verify", e.to_string())
            })?;

        Ok(VerifyOutput {
            verified: reply.verified,
            meta: meta.map_or_else(|| json!({}), zkprov_core::ProofMeta::into_value),
        })
    }
}
