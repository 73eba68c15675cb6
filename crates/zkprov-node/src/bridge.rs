//! The public operations: `list_backends`, `list_profiles`, `prove`, `verify`.
//!
//! Every method returns immediately. Argument and validation failures settle
//! the result before the method returns and never reach the native library;
//! everything else settles once the worker is done.

use anyhow::Result;
use serde_json::Value;
use tokio::runtime::Handle;
use zkprov_core::ErrorValue;
use zkprov_ffi::{HostBuffer, Library, ListKind};

use crate::dispatch::{Completion, Dispatcher, Job, Lifecycle, Pending, Phase};
use crate::host::HostValue;
use crate::ops::{ListJob, ProveJob, VerifyJob};
use crate::result::{ProveOutput, VerifyOutput};
use crate::settings::{BridgeConfig, DispatchMode};

/// Message when `prove` gets no configuration.
pub const MSG_PROVE_ARGS: &str = "Expected configuration object as first argument";
/// Message when `verify` is missing an argument.
pub const MSG_VERIFY_ARGS: &str = "Expected configuration object and proof buffer";
/// Message when `verify` gets something other than bytes as the proof.
pub const MSG_PROOF_TYPE: &str = "Proof must be a Buffer";

/// Promise-style front end over a native [`Library`].
#[derive(Debug)]
pub struct Bridge {
    lib: Library,
    dispatcher: Dispatcher,
    config: BridgeConfig,
}

impl Bridge {
    /// Bridge with its own worker runtime.
    pub fn new(lib: Library, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.worker_threads)?;
        tracing::debug!(?config, "bridge started with private runtime");
        Ok(Self {
            lib,
            dispatcher,
            config,
        })
    }

    /// Bridge that schedules on an existing tokio runtime.
    pub fn with_handle(lib: Library, config: BridgeConfig, handle: Handle) -> Result<Self> {
        config.validate()?;
        tracing::debug!(?config, "bridge attached to caller runtime");
        Ok(Self {
            lib,
            dispatcher: Dispatcher::with_handle(handle),
            config,
        })
    }

    /// Bridge on the current tokio runtime.
    ///
    /// # Panics
    /// Outside a tokio runtime.
    pub fn current(lib: Library, config: BridgeConfig) -> Result<Self> {
        Self::with_handle(lib, config, Handle::current())
    }

    /// The native library.
    #[must_use]
    pub const fn library(&self) -> &Library {
        &self.lib
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /* ------------------------------- listings ------------------------------- */

    /// Available backends as JSON; `{}` or `{"raw": …}` if the engine's text
    /// is empty or not JSON.
    pub fn list_backends(&self) -> Pending<Value> {
        let (tx, pending) = Pending::channel();
        self.list_into(ListKind::Backends, tx);
        pending
    }

    /// Available profiles, with the same fallbacks as
    /// [`Bridge::list_backends`].
    pub fn list_profiles(&self) -> Pending<Value> {
        let (tx, pending) = Pending::channel();
        self.list_into(ListKind::Profiles, tx);
        pending
    }

    /// Listing with an arbitrary completion sink.
    pub fn list_into<C: Completion<Value>>(&self, kind: ListKind, done: C) {
        let mut life = Lifecycle::new(kind.name());
        life.advance(Phase::Validating);
        let job = ListJob::new(kind);
        match self.config.listing_dispatch {
            DispatchMode::Inline => self.dispatcher.run_inline(&self.lib, job, life, done),
            DispatchMode::Worker => self.dispatcher.submit(&self.lib, job, life, done),
        }
    }

    /* -------------------------------- prove --------------------------------- */

    /// Produce a proof for `config`.
    pub fn prove(&self, config: impl Into<HostValue>) -> Pending<ProveOutput> {
        let (tx, pending) = Pending::channel();
        self.prove_into(&config.into(), tx);
        pending
    }

    /// `prove` with an arbitrary completion sink.
    pub fn prove_into<C: Completion<ProveOutput>>(&self, config: &HostValue, done: C) {
        let mut life = Lifecycle::new(ProveJob::NAME);
        life.advance(Phase::Validating);

        let checked = if config.is_defined() {
            config.to_call_config()
        } else {
            Err(ErrorValue::invalid_argument(MSG_PROVE_ARGS))
        };
        match checked {
            Ok(cfg) => {
                let job = ProveJob::new(cfg, self.config.proof_transfer);
                self.dispatcher.submit(&self.lib, job, life, done);
            }
            Err(err) => reject(life, err, done),
        }
    }

    /* -------------------------------- verify -------------------------------- */

    /// Check `proof` against `config`.
    ///
    /// A proof that fails verification resolves with `verified: false`; it is
    /// not an error.
    pub fn verify(
        &self,
        config: impl Into<HostValue>,
        proof: impl Into<HostValue>,
    ) -> Pending<VerifyOutput> {
        let (tx, pending) = Pending::channel();
        self.verify_into(&config.into(), &proof.into(), tx);
        pending
    }

    /// `verify` with an arbitrary completion sink.
    pub fn verify_into<C: Completion<VerifyOutput>>(
        &self,
        config: &HostValue,
        proof: &HostValue,
        done: C,
    ) {
        let mut life = Lifecycle::new(VerifyJob::NAME);
        life.advance(Phase::Validating);

        match verify_args(config, proof) {
            Ok((cfg, proof)) => {
                let job = VerifyJob::new(cfg, proof, self.config.verify_proof_len);
                self.dispatcher.submit(&self.lib, job, life, done);
            }
            Err(err) => reject(life, err, done),
        }
    }
}

fn verify_args(
    config: &HostValue,
    proof: &HostValue,
) -> Result<(zkprov_core::CallConfig, HostBuffer), ErrorValue> {
    if !config.is_defined() || !proof.is_defined() {
        return Err(ErrorValue::invalid_argument(MSG_VERIFY_ARGS));
    }
    let cfg = config.to_call_config()?;
    let proof = proof
        .as_buffer()
        .cloned()
        .ok_or_else(|| ErrorValue::invalid_argument(MSG_PROOF_TYPE))?;
    Ok((cfg, proof))
}

fn reject<T, C: Completion<T>>(mut life: Lifecycle, err: ErrorValue, done: C) {
    life.reject_early(&err);
    done.complete(Err(err));
}
