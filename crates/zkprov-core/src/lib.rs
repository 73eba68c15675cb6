//! `zkprov-core`: error taxonomy and contract validation for the native bridge.
//!
//! This crate holds everything about the bridge that is **pure data**:
//! - the native status table and the single [`ErrorValue`] an operation
//!   rejects with,
//! - the inbound contract turning an untyped host value into a [`CallConfig`],
//! - the outbound contract turning native JSON text into a checked
//!   [`ProofMeta`] (strict for prove, lenient for verify) or a best-effort
//!   [`Listing`].
//!
//! ```
//! use serde_json::json;
//! use zkprov_core::{parse_call_config, parse_prove_meta};
//!
//! let cfg = parse_call_config(&json!({
//!     "backendId": "native@0.0", "field": "Prime254", "hashId": "blake3",
//!     "friArity": 2, "profileId": "balanced", "airPath": "toy.air",
//!     "publicInputsJson": "",
//! }))?;
//! assert_eq!(cfg.fri_arity, 2);
//!
//! let meta = parse_prove_meta(r#"{"digest":"D1","proof_len":16}"#, 16).unwrap();
//! assert_eq!(meta.digest(), "D1");
//! # Ok::<(), zkprov_core::ValidationError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Inbound contract: host configuration → [`CallConfig`].
pub mod config;
/// Native status codes and [`ErrorValue`].
pub mod error;
/// Outbound contract: metadata and listing JSON.
pub mod meta;

pub use config::*;
pub use error::*;
pub use meta::*;

/// Commonly-used items for quick imports.
pub mod prelude {
    pub use crate::{
        config::{parse_call_config, CallConfig, ValidationError},
        error::{ErrorCode, ErrorValue},
        meta::{parse_listing, parse_prove_meta, parse_verify_meta, Listing, ProofMeta},
    };
}
