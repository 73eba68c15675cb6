//! End-to-end behaviour of `Bridge` over the in-process engine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use zkprov_ffi::{Entry, Library, StubEngine, TransferStrategy};
use zkprov_node::bridge::{MSG_PROOF_TYPE, MSG_PROVE_ARGS, MSG_VERIFY_ARGS};
use zkprov_node::{Bridge, BridgeConfig, DispatchMode, HostValue, OperationResult};

fn cfg() -> Value {
    json!({
        "backendId": "native@0.0",
        "field": "Prime254",
        "hashId": "blake3",
        "friArity": 2,
        "profileId": "balanced",
        "airPath": "examples/air/toy.air",
        "publicInputsJson": "{\"demo\":true,\"n\":7}",
    })
}

fn cfg_with(key: &str, value: Value) -> Value {
    let mut c = cfg();
    c[key] = value;
    c
}

fn setup_with(config: BridgeConfig) -> (Arc<StubEngine>, Bridge) {
    let stub = Arc::new(StubEngine::new());
    let bridge = Bridge::current(Library::from_shared(stub.clone()), config).unwrap();
    (stub, bridge)
}

fn setup() -> (Arc<StubEngine>, Bridge) {
    setup_with(BridgeConfig::default())
}

fn assert_no_leaks(stub: &StubEngine, bridge: &Bridge) {
    assert_eq!(stub.live_allocations(), 0, "native allocations leaked");
    assert_eq!(stub.invalid_frees(), 0, "double or foreign free");
    assert_eq!(bridge.library().ledger().live(), 0);
}

/* --------------------------------- prove/verify --------------------------------- */

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prove_then_verify_roundtrip() {
    let (stub, bridge) = setup();

    let out = bridge.prove(cfg()).await.unwrap();
    assert_eq!(out.proof.len(), 128);
    assert_eq!(out.meta.proof_len(), Some(128));
    let digest = out.meta.digest().to_owned();

    let v = bridge.verify(cfg(), out.proof.clone()).await.unwrap();
    assert!(v.verified);
    assert_eq!(v.meta["verified"], json!(true));
    assert_eq!(v.meta["digest"], json!(digest));

    drop(out);
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flipped_bit_is_not_verified() {
    let (stub, bridge) = setup();
    let proof = bridge.prove(cfg()).await.unwrap().proof;

    let mut tampered = proof.to_vec();
    tampered[17] ^= 0x04;
    let v = bridge.verify(cfg(), tampered).await.unwrap();
    assert!(!v.verified);
    assert_eq!(v.meta["verified"], json!(false));

    drop(proof);
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn truncated_proof_rejects_as_corrupt() {
    let (stub, bridge) = setup();
    let proof = bridge.prove(cfg()).await.unwrap().proof;

    let err = bridge.verify(cfg(), proof[..100].to_vec()).await.unwrap_err();
    assert_eq!(err.code(), 4);
    assert_eq!(err.message(), "Proof corrupt");
    assert_eq!(err.detail(), Some("zkp_verify failed"));

    drop(proof);
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn native_prove_failure_leaks_nothing() {
    let (stub, bridge) = setup();
    stub.fail_with_partial_writes(Entry::Prove, 3);

    let err = bridge.prove(cfg()).await.unwrap_err();
    assert_eq!(err.code(), 3);
    assert_eq!(err.message(), "Profile error");
    assert_eq!(err.detail(), Some("zkp_prove failed"));
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_statuses_pass_through() {
    let (_stub, bridge) = setup();
    let err = bridge
        .prove(cfg_with("backendId", json!("gpu@1.0")))
        .await
        .unwrap_err();
    assert_eq!((err.code(), err.message()), (2, "Backend error"));

    let err = bridge
        .prove(cfg_with("publicInputsJson", json!("{not json")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn proof_len_mismatch_rejects_and_releases_proof() {
    let (stub, bridge) = setup();
    stub.override_meta(Entry::Prove, Some(r#"{"digest":"abc","proof_len":64}"#));

    let err = bridge.prove(cfg()).await.unwrap_err();
    assert_eq!(err.code(), 6);
    assert_eq!(err.message(), "Invalid meta returned from zkp_prove");
    let detail = err.detail().unwrap();
    assert!(detail.contains("64") && detail.contains("128"), "{detail}");
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn verify_meta_checked_when_enabled() {
    let (stub, bridge) = setup();
    let proof = bridge.prove(cfg()).await.unwrap().proof;
    stub.override_meta(Entry::Verify, Some(r#"{"digest":"abc","proof_len":7}"#));

    let err = bridge.verify(cfg(), proof.clone()).await.unwrap_err();
    assert_eq!(err.message(), "Invalid meta returned from zkp_verify");

    let (stub2, lenient) = setup_with(BridgeConfig {
        verify_proof_len: false,
        ..BridgeConfig::default()
    });
    stub2.override_meta(Entry::Verify, Some(r#"{"digest":"abc","proof_len":7}"#));
    let v = lenient.verify(cfg(), proof).await.unwrap();
    assert!(v.verified);
}

/* ------------------------------ validation ------------------------------ */

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_field_never_reaches_native() {
    let (stub, bridge) = setup();
    for key in ["backendId", "field", "hashId", "friArity", "profileId", "airPath"] {
        let mut c = cfg();
        c.as_object_mut().unwrap().remove(key);
        let err = bridge.prove(c).await.unwrap_err();
        assert_eq!(err.code(), 1);
        assert_eq!(
            err.detail(),
            Some(format!("Missing required property '{key}'").as_str())
        );
    }
    assert_eq!(stub.native_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_fri_arity_never_reaches_native() {
    let (stub, bridge) = setup();
    for bad in [json!(0), json!(-3), json!(2.5), json!(4_294_967_296_u64)] {
        let err = bridge.prove(cfg_with("friArity", bad)).await.unwrap_err();
        assert_eq!(err.code(), 1);
        assert_eq!(
            err.detail(),
            Some("Property 'friArity' must be a positive integer")
        );
        let err = bridge
            .verify(cfg_with("friArity", json!(0)), vec![0u8; 4])
            .await
            .unwrap_err();
        assert_eq!(err.code(), 1);
    }
    assert_eq!(stub.native_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn argument_shape_messages() {
    let (stub, bridge) = setup();

    let err = bridge.prove(HostValue::Undefined).await.unwrap_err();
    assert_eq!(err.detail(), Some(MSG_PROVE_ARGS));

    let err = bridge.prove(json!("cfg")).await.unwrap_err();
    assert_eq!(err.detail(), Some("Configuration must be an object"));

    let err = bridge.verify(cfg(), HostValue::Undefined).await.unwrap_err();
    assert_eq!(err.detail(), Some(MSG_VERIFY_ARGS));

    let err = bridge.verify(cfg(), json!("deadbeef")).await.unwrap_err();
    assert_eq!(err.detail(), Some(MSG_PROOF_TYPE));

    // Config is checked before the proof.
    let err = bridge
        .verify(cfg_with("field", json!("")), json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.detail(), Some("Property 'field' must be a non-empty string"));

    assert_eq!(stub.native_calls(), 0);
}

/* -------------------------------- listings -------------------------------- */

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listings_parse() {
    let (stub, bridge) = setup();
    let backends = bridge.list_backends().await.unwrap();
    assert_eq!(backends["items"][0]["id"], json!("native@0.0"));
    let profiles = bridge.list_profiles().await.unwrap();
    assert_eq!(profiles["items"][0]["id"], json!("balanced"));
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_fallbacks() {
    for mode in [DispatchMode::Inline, DispatchMode::Worker] {
        let (stub, bridge) = setup_with(BridgeConfig {
            listing_dispatch: mode,
            ..BridgeConfig::default()
        });

        stub.override_listing(Entry::ListBackends, None);
        assert_eq!(bridge.list_backends().await.unwrap(), json!({}));

        stub.override_listing(Entry::ListBackends, Some(""));
        assert_eq!(bridge.list_backends().await.unwrap(), json!({}));

        stub.override_listing(Entry::ListProfiles, Some("balanced;fast"));
        assert_eq!(
            bridge.list_profiles().await.unwrap(),
            json!({"raw": "balanced;fast"})
        );
        assert_no_leaks(&stub, &bridge);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_rejects_on_native_failure() {
    let (stub, bridge) = setup();
    stub.fail(Entry::Init, 6);
    let err = bridge.list_backends().await.unwrap_err();
    assert_eq!(err.code(), 6);
    assert_eq!(
        err.detail(),
        Some("zkp_init failed during zkp_list_backends")
    );

    stub.clear_faults();
    stub.fail_with_partial_writes(Entry::ListProfiles, 2);
    let err = bridge.list_profiles().await.unwrap_err();
    assert_eq!(err.detail(), Some("zkp_list_profiles failed"));
    assert_no_leaks(&stub, &bridge);
}

/* ------------------------------ concurrency ------------------------------- */

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_does_not_wait_for_native() {
    let (stub, bridge) = setup();
    stub.set_latency(Duration::from_millis(300));

    let mut pending = bridge.prove(cfg());
    assert!(pending.try_take().is_none(), "prove settled before the engine returned");

    let out = pending.await.unwrap();
    assert_eq!(out.proof.len(), 128);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_pending_still_releases() {
    let (stub, bridge) = setup();
    stub.set_latency(Duration::from_millis(50));

    drop(bridge.prove(cfg()));
    // Proof and meta are adopted only after the engine wakes up.
    for _ in 0..100 {
        let ledger = bridge.library().ledger();
        if ledger.adopted == 2 && ledger.live() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let ledger = bridge.library().ledger();
    assert_eq!(stub.calls(Entry::Prove), 1);
    assert_eq!(ledger.adopted, 2, "zkp_prove never produced its outputs");
    assert_eq!(ledger.released, 2);
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_operations_settle_independently() {
    let (stub, bridge) = setup();
    let proofs: Vec<_> = (0..6).map(|_| bridge.prove(cfg())).collect();
    let failing = bridge.prove(cfg_with("profileId", json!("fast")));

    for p in proofs {
        let out = p.await.unwrap();
        assert!(bridge.verify(cfg(), out.proof).await.unwrap().verified);
    }
    assert_eq!(failing.await.unwrap_err().code(), 3);
    assert_no_leaks(&stub, &bridge);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn eager_copy_releases_before_resolving() {
    let (stub, bridge) = setup_with(BridgeConfig {
        proof_transfer: TransferStrategy::EagerCopy,
        ..BridgeConfig::default()
    });
    let out = bridge.prove(cfg()).await.unwrap();
    assert!(!out.proof.is_native());
    assert_eq!(stub.live_allocations(), 0);
}

#[test]
fn private_runtime_bridge() {
    let stub = Arc::new(StubEngine::new());
    let bridge = Bridge::new(
        Library::from_shared(stub.clone()),
        BridgeConfig {
            listing_dispatch: DispatchMode::Worker,
            ..BridgeConfig::default()
        },
    )
    .unwrap();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let listing = rt.block_on(bridge.list_backends()).unwrap();
    let out = rt.block_on(bridge.prove(cfg())).unwrap();

    let as_json = OperationResult::from(out).to_json();
    assert_eq!(as_json["proof"].as_str().unwrap().len(), 256);
    assert_eq!(as_json["meta"]["proof_len"], json!(128));
    assert!(OperationResult::from(listing).to_json()["items"].is_array());
    assert_eq!(stub.live_allocations(), 0);
}

#[test]
fn zero_workers_is_a_config_error() {
    let cfg = BridgeConfig {
        worker_threads: 0,
        ..BridgeConfig::default()
    };
    assert!(Bridge::new(Library::new(StubEngine::new()), cfg).is_err());
}
