//! What operations resolve with.

use serde::Serialize;
use serde_json::{json, Value};
use zkprov_core::ProofMeta;
use zkprov_ffi::HostBuffer;

/// Resolved `prove`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProveOutput {
    /// Proof bytes; may still live in native memory (zero-copy).
    pub proof: HostBuffer,
    /// Checked metadata; `proof_len` equals `proof.len()`.
    pub meta: ProofMeta,
}

/// Resolved `verify`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyOutput {
    /// `false` when the engine reported a verification failure.
    pub verified: bool,
    /// Metadata object, `{}` when the engine wrote none.
    pub meta: Value,
}

/// Any operation's resolved value.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// From `list_backends` / `list_profiles`: the parsed listing or its
    /// fallback.
    Listing(Value),
    /// From `prove`.
    Prove(ProveOutput),
    /// From `verify`.
    Verify(VerifyOutput),
}

impl OperationResult {
    /// Plain-data view with the proof bytes hex-encoded, for logs and hosts
    /// without a byte type.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Listing(v) => v.clone(),
            Self::Prove(p) => json!({
                "proof": hex::encode(&*p.proof),
                "meta": p.meta,
            }),
            Self::Verify(v) => json!({ "verified": v.verified, "meta": v.meta }),
        }
    }
}

impl From<Value> for OperationResult {
    fn from(v: Value) -> Self {
        Self::Listing(v)
    }
}

impl From<ProveOutput> for OperationResult {
    fn from(p: ProveOutput) -> Self {
        Self::Prove(p)
    }
}

impl From<VerifyOutput> for OperationResult {
    fn from(v: VerifyOutput) -> Self {
        Self::Verify(v)
    }
}
