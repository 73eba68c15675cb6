//! `zkprov-node`: a promise-style front end over the blocking `zkp_*` ABI.
//!
//! ## What this crate does
//! - [`Bridge`] exposes `list_backends`, `list_profiles`, `prove` and
//!   `verify`. Each returns a [`Pending`] immediately; native calls run on a
//!   tokio blocking pool ([`dispatch`]).
//! - Host arguments arrive untyped ([`HostValue`]) and are validated before
//!   anything is queued. Bad input never reaches the native library.
//! - Results are contract-checked ([`ops`]) and every native allocation is
//!   released or handed over exactly once (see `zkprov_ffi::ownership`).
//! - With the `node` feature, the same operations are exported to
//!   JavaScript through N-API.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use serde_json::json;
//! use zkprov_ffi::{Library, StubEngine};
//! use zkprov_node::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::current(Library::new(StubEngine::new()), BridgeConfig::default())?;
//! let cfg = json!({
//!     "backendId": "native@0.0", "field": "Prime254", "hashId": "blake3",
//!     "friArity": 2, "profileId": "balanced", "airPath": "toy.air",
//!     "publicInputsJson": "",
//! });
//! let out = bridge.prove(cfg.clone()).await?;
//! assert!(bridge.verify(cfg, out.proof).await?.verified);
//! # Ok(())
//! # }
//! ```
//!
//! ## Building the addon (locally)
//! ```bash
//! # Default: Rust-only library (no Node toolchain or libzkprov required)
//! cargo build -p zkprov-node
//!
//! # N-API addon (requires Node toolchain / napi-rs prerequisites and libzkprov)
//! cargo build -p zkprov-node --features node --release
//! ```

#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod bridge;
pub mod dispatch;
pub mod host;
pub mod logging;
pub mod ops;
pub mod result;
pub mod settings;

// The only module allowed raw pointers: borrowed-memory `Buffer`s.
#[cfg(feature = "node")]
#[allow(unsafe_code)]
mod napi_binding;

#[cfg(feature = "node")]
pub use napi_binding::{list_backends, list_profiles, prove, verify};

pub use bridge::Bridge;
pub use dispatch::{Completion, Dispatcher, Job, Lifecycle, Pending, Phase};
pub use host::HostValue;
pub use logging::init_tracing;
pub use result::{OperationResult, ProveOutput, VerifyOutput};
pub use settings::{BridgeConfig, DispatchMode};
pub use zkprov_core::ErrorValue;
