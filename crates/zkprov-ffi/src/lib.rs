//! `zkprov-ffi`: the native ABI seam and pointer ownership.
//!
//! Everything that touches a raw pointer lives here:
//! - [`abi`]: the `zkp_*` entry points as the [`NativeAbi`] trait, plus
//!   [`LinkedAbi`] over the system `libzkprov` with `--features link`;
//! - [`ownership`]: RAII custody types so each native allocation is released
//!   exactly once, or handed to the host as a [`HostBuffer`];
//! - [`library`]: [`Library`], the safe blocking API the dispatch layer calls;
//! - [`stub`]: [`StubEngine`], an in-process engine with allocation tracking
//!   and fault injection.
//!
//! ```
//! use zkprov_ffi::{ListKind, Library, StubEngine};
//!
//! let lib = Library::new(StubEngine::new());
//! assert_eq!(lib.init(), 0);
//! let json = lib.list(ListKind::Backends).unwrap().unwrap();
//! assert!(json.contains("native@0.0"));
//! assert_eq!(lib.ledger().live(), 0);
//! ```
//!
//! ```bash
//! cargo build -p zkprov-ffi                  # no native library needed
//! cargo build -p zkprov-ffi --features link  # links -lzkprov
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

pub mod abi;
pub mod library;
pub mod ownership;
pub mod stub;

pub use abi::{NativeAbi, NativeArgs};
#[cfg(feature = "link")]
pub use abi::LinkedAbi;
pub use library::{Library, ListKind, ProveReply, VerifyReply};
pub use ownership::{HostBuffer, LedgerSnapshot, NativeBuffer, NativeString, TransferStrategy};
pub use stub::{Entry, Fault, StubEngine};
