//! N-API addon: `listBackends`, `listProfiles`, `prove`, `verify`.
//!
//! Each export returns a promise. Results resolve as plain objects; proofs as
//! `Buffer`s that borrow the native allocation and release it from the
//! buffer's finalizer. Errors reject with `{code, msg, detail?}`.
//!
//! ```js
//! const zk = require('./zkprov.node');
//! const { proof, meta } = await zk.prove(cfg);
//! const { verified } = await zk.verify(cfg, proof);
//! ```

use std::sync::OnceLock;

use napi::{Env, JsBuffer, JsDeferred, JsObject, JsUnknown, ValueType};
use napi_derive::napi;
use zkprov_core::ErrorValue;
use zkprov_ffi::{HostBuffer, Library, ListKind};

use crate::bridge::Bridge;
use crate::dispatch::Completion;
use crate::host::HostValue;
use crate::result::OperationResult;
use crate::settings::BridgeConfig;

static BRIDGE: OnceLock<Result<Bridge, String>> = OnceLock::new();

fn bridge() -> napi::Result<&'static Bridge> {
    BRIDGE
        .get_or_init(|| {
            crate::logging::init_tracing();
            BridgeConfig::from_env()
                .and_then(|cfg| Bridge::new(Library::linked(), cfg))
                .map_err(|e| format!("{e:#}"))
        })
        .as_ref()
        .map_err(|e| napi::Error::from_reason(e.clone()))
}

/* ------------------------------- arguments -------------------------------- */

fn host_value(env: &Env, value: Option<JsUnknown>) -> napi::Result<HostValue> {
    let Some(value) = value else {
        return Ok(HostValue::Undefined);
    };
    let host = match value.get_type()? {
        ValueType::Undefined => HostValue::Undefined,
        ValueType::Function => HostValue::Opaque("function"),
        ValueType::Symbol => HostValue::Opaque("symbol"),
        ValueType::External => HostValue::Opaque("external"),
        _ if value.is_buffer()? => {
            // SAFETY: `is_buffer` just confirmed the type.
            let buf: JsBuffer = unsafe { value.cast() };
            // JS memory cannot be borrowed off the main thread; copy it.
            HostValue::Buffer(HostBuffer::from(&buf.into_value()?[..]))
        }
        _ => env
            .from_js_value::<serde_json::Value, _>(value)
            .map_or(HostValue::Opaque("object"), HostValue::Json),
    };
    Ok(host)
}

/* ------------------------------- settlement ------------------------------- */

type Settle = Box<dyn FnOnce(Env) -> napi::Result<JsUnknown> + Send>;

// The dispatcher rejects with code 6 if this is dropped unsettled.
struct JsCompletion(JsDeferred<JsUnknown, Settle>);

impl<T> Completion<T> for JsCompletion
where
    T: Into<OperationResult> + Send + 'static,
{
    fn complete(self, result: Result<T, ErrorValue>) {
        let result = result.map(Into::into);
        // Runs on the JS thread.
        self.0.resolve(Box::new(move |env| settle(env, result)));
    }
}

fn settle(env: Env, result: Result<OperationResult, ErrorValue>) -> napi::Result<JsUnknown> {
    match result {
        Ok(value) => to_js(env, value),
        Err(err) => Err(napi::Error::from(env.to_js_value(&err)?)),
    }
}

fn to_js(env: Env, value: OperationResult) -> napi::Result<JsUnknown> {
    match value {
        OperationResult::Listing(v) => env.to_js_value(&v),
        OperationResult::Verify(v) => env.to_js_value(&v),
        OperationResult::Prove(p) => {
            let mut obj = env.create_object()?;
            obj.set_named_property("proof", proof_buffer(env, p.proof)?)?;
            obj.set_named_property("meta", env.to_js_value(&p.meta)?)?;
            Ok(obj.into_unknown())
        }
    }
}

fn proof_buffer(env: Env, proof: HostBuffer) -> napi::Result<JsBuffer> {
    if !proof.is_native() || proof.is_empty() {
        return Ok(env.create_buffer_with_data(proof.to_vec())?.into_raw());
    }
    let (ptr, len) = (proof.as_ptr(), proof.len());
    // SAFETY: the hint is a handle to the native allocation, so `ptr` stays
    // valid until the finalizer drops it; nothing writes to it.
    let buf = unsafe {
        env.create_buffer_with_borrowed_data(ptr, len, proof, |hint: HostBuffer, _env| {
            drop(hint);
        })
    }?;
    Ok(buf.into_raw())
}

fn promise_for(env: Env, submit: impl FnOnce(JsCompletion)) -> napi::Result<JsObject> {
    let (deferred, promise) = env.create_deferred::<JsUnknown, Settle>()?;
    submit(JsCompletion(deferred));
    Ok(promise)
}

/* --------------------------------- exports -------------------------------- */

/// Resolve with the engine's backend listing.
#[napi]
pub fn list_backends(env: Env) -> napi::Result<JsObject> {
    let bridge = bridge()?;
    promise_for(env, |done| bridge.list_into(ListKind::Backends, done))
}

/// Resolve with the engine's profile listing.
#[napi]
pub fn list_profiles(env: Env) -> napi::Result<JsObject> {
    let bridge = bridge()?;
    promise_for(env, |done| bridge.list_into(ListKind::Profiles, done))
}

/// Resolve with `{proof: Buffer, meta}`.
#[napi]
pub fn prove(env: Env, config: Option<JsUnknown>) -> napi::Result<JsObject> {
    let bridge = bridge()?;
    let config = host_value(&env, config)?;
    promise_for(env, |done| bridge.prove_into(&config, done))
}

/// Resolve with `{verified, meta}`.
#[napi]
pub fn verify(
    env: Env,
    config: Option<JsUnknown>,
    proof: Option<JsUnknown>,
) -> napi::Result<JsObject> {
    let bridge = bridge()?;
    let config = host_value(&env, config)?;
    let proof = host_value(&env, proof)?;
    promise_for(env, |done| bridge.verify_into(&config, &proof, done))
}
