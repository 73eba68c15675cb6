//! Bridge configuration.
//!
//! | field              | env var                   | default     |
//! |--------------------|---------------------------|-------------|
//! | `worker_threads`   | `ZKPROV_WORKER_THREADS`   | `2`         |
//! | `listing_dispatch` | `ZKPROV_LISTING_DISPATCH` | `inline`    |
//! | `proof_transfer`   | `ZKPROV_PROOF_TRANSFER`   | `zero-copy` |
//! | `verify_proof_len` | `ZKPROV_VERIFY_PROOF_LEN` | `true`      |

use std::fmt;
use std::str::FromStr;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use zkprov_ffi::TransferStrategy;

/// Env var for [`BridgeConfig::worker_threads`].
pub const ENV_WORKER_THREADS: &str = "ZKPROV_WORKER_THREADS";
/// Env var for [`BridgeConfig::listing_dispatch`].
pub const ENV_LISTING_DISPATCH: &str = "ZKPROV_LISTING_DISPATCH";
/// Env var for [`BridgeConfig::proof_transfer`].
pub const ENV_PROOF_TRANSFER: &str = "ZKPROV_PROOF_TRANSFER";
/// Env var for [`BridgeConfig::verify_proof_len`].
pub const ENV_VERIFY_PROOF_LEN: &str = "ZKPROV_VERIFY_PROOF_LEN";

/// Where listing calls run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchMode {
    /// On the submitting thread; the result is still delivered through a
    /// pending future.
    #[default]
    Inline,
    /// On the worker pool, like prove/verify.
    Worker,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inline => "inline",
            Self::Worker => "worker",
        })
    }
}

impl FromStr for DispatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "worker" | "pool" | "async" => Ok(Self::Worker),
            other => anyhow::bail!("unknown dispatch mode '{other}' (expected inline or worker)"),
        }
    }
}

/// Tunables for a [`crate::Bridge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Maximum blocking threads of the pool the bridge owns. Ignored when the
    /// bridge runs on a caller-provided runtime.
    pub worker_threads: usize,
    /// Where listing calls run.
    pub listing_dispatch: DispatchMode,
    /// How proof bytes from `prove` reach the caller.
    #[serde(with = "strategy_text")]
    pub proof_transfer: TransferStrategy,
    /// Check a `proof_len` in verify metadata against the input proof.
    pub verify_proof_len: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            listing_dispatch: DispatchMode::Inline,
            proof_transfer: TransferStrategy::ZeroCopy,
            verify_proof_len: true,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `ZKPROV_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns per variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup(ENV_WORKER_THREADS) {
            cfg.worker_threads = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {ENV_WORKER_THREADS}={raw:?}"))?;
        }
        if let Some(raw) = lookup(ENV_LISTING_DISPATCH) {
            cfg.listing_dispatch = raw
                .parse()
                .with_context(|| format!("invalid {ENV_LISTING_DISPATCH}={raw:?}"))?;
        }
        if let Some(raw) = lookup(ENV_PROOF_TRANSFER) {
            cfg.proof_transfer = raw
                .parse::<TransferStrategy>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {ENV_PROOF_TRANSFER}={raw:?}"))?;
        }
        if let Some(raw) = lookup(ENV_VERIFY_PROOF_LEN) {
            cfg.verify_proof_len =
                parse_flag(&raw).with_context(|| format!("invalid {ENV_VERIFY_PROOF_LEN}={raw:?}"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values no bridge can run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.worker_threads >= 1, "worker_threads must be at least 1");
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}

mod strategy_text {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use zkprov_ffi::TransferStrategy;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(v: &TransferStrategy, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(v.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TransferStrategy, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(de::Error::custom)
    }
}
