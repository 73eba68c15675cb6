//! `Library` over `StubEngine`: every native pointer is released exactly once
//! on success and failure paths, under both transfer strategies.

use std::sync::Arc;

use zkprov_core::{CallConfig, ZKP_ERR_BACKEND, ZKP_ERR_INTERNAL, ZKP_ERR_PROOF_CORRUPT};
use zkprov_ffi::stub::PROOF_LEN;
use zkprov_ffi::{Entry, Library, ListKind, NativeArgs, StubEngine, TransferStrategy};

fn setup() -> (Arc<StubEngine>, Library) {
    let stub = Arc::new(StubEngine::new());
    let lib = Library::from_shared(stub.clone());
    assert_eq!(lib.init(), 0);
    (stub, lib)
}

fn args() -> NativeArgs {
    NativeArgs::new(&CallConfig {
        backend_id: "native@0.0".into(),
        field: "Prime254".into(),
        hash_id: "blake3".into(),
        fri_arity: 2,
        profile_id: "balanced".into(),
        air_path: "examples/air/toy.air".into(),
        public_inputs_json: r#"{"demo":true,"n":7}"#.into(),
    })
    .unwrap()
}

fn assert_clean(stub: &StubEngine, lib: &Library) {
    assert_eq!(stub.live_allocations(), 0, "native allocations leaked");
    assert_eq!(stub.invalid_frees(), 0, "double or foreign free");
    assert_eq!(lib.ledger().live(), 0);
}

#[test]
fn listings_are_copied_and_released() {
    let (stub, lib) = setup();
    let backends = lib.list(ListKind::Backends).unwrap().unwrap();
    let profiles = lib.list(ListKind::Profiles).unwrap().unwrap();
    assert!(backends.contains("Native Toy Backend"));
    assert!(profiles.contains("balanced"));
    assert_clean(&stub, &lib);
}

#[test]
fn null_listing_is_none() {
    let (stub, lib) = setup();
    stub.override_listing(Entry::ListBackends, None);
    assert_eq!(lib.list(ListKind::Backends).unwrap(), None);
    assert_eq!(stub.free_calls(), 0);
}

#[test]
fn listing_failure_releases_partial_write() {
    let (stub, lib) = setup();
    stub.fail_with_partial_writes(Entry::ListProfiles, ZKP_ERR_INTERNAL);
    let err = lib.list(ListKind::Profiles).unwrap_err();
    assert_eq!(err.code(), ZKP_ERR_INTERNAL);
    assert_eq!(err.detail(), Some("zkp_list_profiles failed"));
    assert_clean(&stub, &lib);
}

#[test]
fn zero_copy_proof_is_released_with_last_handle() {
    let (stub, lib) = setup();
    let reply = lib.prove(&args(), TransferStrategy::ZeroCopy).unwrap();
    assert_eq!(reply.proof.len(), PROOF_LEN);
    assert!(reply.proof.is_native());
    assert!(reply.meta.as_deref().unwrap().contains("\"proof_len\":128"));

    // Metadata was copied; only the proof is still native.
    assert_eq!(stub.live_allocations(), 1);
    let held = reply.proof.clone();
    drop(reply);
    assert_eq!(stub.live_allocations(), 1);
    drop(held);
    assert_clean(&stub, &lib);
    assert_eq!(lib.ledger().transferred, 1);
}

#[test]
fn eager_copy_proof_releases_before_returning() {
    let (stub, lib) = setup();
    let reply = lib.prove(&args(), TransferStrategy::EagerCopy).unwrap();
    assert!(!reply.proof.is_native());
    assert_eq!(stub.live_allocations(), 0);
    assert_eq!(reply.proof.len(), PROOF_LEN);
    assert_eq!(lib.ledger().transferred, 0);
}

#[test]
fn both_strategies_yield_identical_bytes() {
    let (_stub, lib) = setup();
    let a = lib.prove(&args(), TransferStrategy::ZeroCopy).unwrap();
    let b = lib.prove(&args(), TransferStrategy::EagerCopy).unwrap();
    assert_eq!(a.proof, b.proof);
    assert_eq!(a.meta, b.meta);
}

#[test]
fn prove_failure_with_partial_writes_leaks_nothing() {
    let (stub, lib) = setup();
    stub.fail_with_partial_writes(Entry::Prove, ZKP_ERR_BACKEND);
    let err = lib.prove(&args(), TransferStrategy::ZeroCopy).unwrap_err();
    assert_eq!(err.code(), ZKP_ERR_BACKEND);
    assert_eq!(err.message(), "Backend error");
    assert_eq!(err.detail(), Some("zkp_prove failed"));
    assert_eq!(lib.ledger().adopted, 2);
    assert_clean(&stub, &lib);
}

#[test]
fn unknown_status_keeps_raw_code() {
    let (stub, lib) = setup();
    stub.fail(Entry::Prove, 42);
    let err = lib.prove(&args(), TransferStrategy::ZeroCopy).unwrap_err();
    assert_eq!(err.code(), 42);
    assert_eq!(err.message(), "Internal error");
}

#[test]
fn null_meta_is_none() {
    let (stub, lib) = setup();
    stub.override_meta(Entry::Prove, None);
    let reply = lib.prove(&args(), TransferStrategy::EagerCopy).unwrap();
    assert!(reply.meta.is_none());
    assert_clean(&stub, &lib);
}

#[test]
fn verify_borrows_caller_proof() {
    let (stub, lib) = setup();
    let proof = lib.prove(&args(), TransferStrategy::EagerCopy).unwrap().proof;

    let ok = lib.verify(&args(), &proof).unwrap();
    assert!(ok.verified);
    assert!(ok.meta.as_deref().unwrap().contains("\"verified\":true"));

    let mut tampered = proof.to_vec();
    tampered[0] ^= 0x80;
    let bad = lib.verify(&args(), &tampered).unwrap();
    assert!(!bad.verified);

    let err = lib.verify(&args(), &proof[..10]).unwrap_err();
    assert_eq!(err.code(), ZKP_ERR_PROOF_CORRUPT);
    assert_eq!(err.detail(), Some("zkp_verify failed"));

    assert_clean(&stub, &lib);
}

#[test]
fn verify_failure_with_partial_write_is_released() {
    let (stub, lib) = setup();
    stub.fail_with_partial_writes(Entry::Verify, ZKP_ERR_INTERNAL);
    let err = lib.verify(&args(), &[0u8; PROOF_LEN]).unwrap_err();
    assert_eq!(err.code(), ZKP_ERR_INTERNAL);
    assert_clean(&stub, &lib);
}

#[test]
fn concurrent_calls_balance_the_ledger() {
    let (stub, lib) = setup();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lib = lib.clone();
            std::thread::spawn(move || {
                let strategy = if i % 2 == 0 {
                    TransferStrategy::ZeroCopy
                } else {
                    TransferStrategy::EagerCopy
                };
                let reply = lib.prove(&args(), strategy).unwrap();
                lib.verify(&args(), &reply.proof).unwrap().verified
            })
        })
        .collect();
    for h in handles {
        assert!(h.join().unwrap());
    }
    assert_eq!(stub.calls(Entry::Prove), 8);
    assert_clean(&stub, &lib);
}
