//! Contract Test: Reconciliation Pass
//!
//! Verifies the ordered pass of the Reconciler against counting doubles.
//!
//! Constraints verified:
//! - `update` is never called when the provider reports the record up to date
//! - `lastUpdate.hostname`/`address` record the attempted values, whatever the outcome
//! - `lastUpdate.failed` follows the provider result and is cleared on success
//! - The requeue directive depends only on `checkIntervalMinutes`
//! - Credential, address and status-write failures are surfaced; provider failures are not
//! - Status writes are merge patches that preserve concurrent edits

mod common;

use common::*;
use dnsync_core::error::Error;
use dnsync_core::patch::MergePatch;
use dnsync_core::resource::{ResourceId, SecretRef};
use dnsync_core::traits::{AUTH_TOKEN_KEY, ResourceStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);

#[tokio::test]
async fn successful_update_records_attempt_and_requeues() {
    let fx = Fixture::new().await;
    let home = home();
    fx.store.apply(home.clone()).await;

    let action = fx.reconciler().reconcile(&home.id()).await.unwrap();

    assert_eq!(action.requeue_after(), Some(FIVE_MINUTES));
    assert_eq!(
        fx.script.updates(),
        vec![("home.example.com".to_string(), "203.0.113.7".to_string())]
    );
    assert_eq!(fx.script.tokens(), vec![TOKEN.to_string()]);

    let last = fx.status_of(&home.id()).await.last_update.unwrap();
    assert_eq!(last.hostname, "home.example.com");
    assert_eq!(last.address, "203.0.113.7");
    assert!(!last.failed);
    assert!(last.scheduled_at.is_some());
}

#[tokio::test]
async fn provider_failure_is_recorded_not_surfaced() {
    let fx = Fixture::new().await;
    fx.script.set_fail_update(true);
    let home = home();
    fx.store.apply(home.clone()).await;

    let action = fx
        .reconciler()
        .reconcile(&home.id())
        .await
        .expect("provider errors must not fail the pass");

    assert_eq!(action.requeue_after(), Some(FIVE_MINUTES));
    let last = fx.status_of(&home.id()).await.last_update.unwrap();
    assert!(last.failed);
    assert_eq!(last.hostname, "home.example.com");
    assert_eq!(last.address, "203.0.113.7");
}

#[tokio::test]
async fn initialize_failure_counts_as_provider_failure() {
    let fx = Fixture::new().await;
    fx.script.set_fail_initialize(true);
    let home = home();
    fx.store.apply(home.clone()).await;

    fx.reconciler().reconcile(&home.id()).await.unwrap();

    assert_eq!(fx.script.check_calls(), 0);
    assert!(fx.status_of(&home.id()).await.last_update.unwrap().failed);
}

#[tokio::test]
async fn up_to_date_record_is_never_updated() {
    let fx = Fixture::new().await;
    fx.script.set_up_to_date(true);
    let home = home();
    fx.store.apply(home.clone()).await;
    let reconciler = fx.reconciler();

    for _ in 0..3 {
        reconciler.reconcile(&home.id()).await.unwrap();
    }

    assert_eq!(fx.script.check_calls(), 3);
    assert_eq!(fx.script.update_calls(), 0);
    let last = fx.status_of(&home.id()).await.last_update.unwrap();
    assert!(!last.failed);
    assert_eq!(last.address, "203.0.113.7");
}

#[tokio::test]
async fn successful_pass_clears_previous_failure() {
    let fx = Fixture::new().await;
    let home = home();
    fx.store.apply(home.clone()).await;
    let reconciler = fx.reconciler();

    fx.script.set_fail_update(true);
    reconciler.reconcile(&home.id()).await.unwrap();
    assert!(fx.status_of(&home.id()).await.last_update.unwrap().failed);

    fx.script.set_fail_update(false);
    reconciler.reconcile(&home.id()).await.unwrap();
    assert!(!fx.status_of(&home.id()).await.last_update.unwrap().failed);

    // Already-up-to-date is also a success
    fx.script.set_fail_update(true);
    reconciler.reconcile(&home.id()).await.unwrap();
    fx.script.set_up_to_date(true);
    reconciler.reconcile(&home.id()).await.unwrap();
    assert!(!fx.status_of(&home.id()).await.last_update.unwrap().failed);
}

#[tokio::test]
async fn requeue_depends_only_on_interval() {
    let cases = [
        (None, None),
        (Some(0), None),
        (Some(-3), None),
        (Some(1), Some(Duration::from_secs(60))),
        (Some(90), Some(Duration::from_secs(90 * 60))),
    ];

    for fail in [false, true] {
        for (interval, expected) in cases {
            let fx = Fixture::new().await;
            fx.script.set_fail_update(fail);
            let resource = hostname("r", "r.example.com", "", interval, "Cloudflare");
            fx.store.apply(resource.clone()).await;

            let action = fx.reconciler().reconcile(&resource.id()).await.unwrap();
            assert_eq!(
                action.requeue_after(),
                expected,
                "interval {:?}, provider failing: {}",
                interval,
                fail
            );
        }
    }
}

#[tokio::test]
async fn missing_resource_is_a_no_op() {
    let fx = Fixture::new().await;

    let action = fx
        .reconciler()
        .reconcile(&ResourceId::new(NAMESPACE, "deleted"))
        .await
        .unwrap();

    assert_eq!(action.requeue_after(), None);
    assert_eq!(fx.secrets.calls(), 0);
    assert_eq!(fx.ip_source.calls(), 0);
    assert_eq!(fx.script.passes(), 0);
}

#[tokio::test]
async fn missing_secret_fails_without_touching_status() {
    let fx = Fixture::new().await;
    fx.secrets.inner.remove(NAMESPACE, SECRET_NAME).await;

    let home = home();
    fx.store.apply(home.clone()).await;
    let prior = MergePatch::from_value(json!({
        "status": { "lastUpdate": {
            "failed": true,
            "hostname": "old.example.com",
            "address": "192.0.2.1"
        } }
    }));
    fx.store.patch_status(&home.id(), &prior).await.unwrap();
    let before = fx.status_of(&home.id()).await;

    let err = fx.reconciler().reconcile(&home.id()).await.unwrap_err();

    assert!(matches!(err, Error::Credentials(_)), "got {:?}", err);
    assert_eq!(fx.status_of(&home.id()).await, before);
    assert_eq!(fx.ip_source.calls(), 0);
    assert_eq!(fx.script.passes(), 0);
}

#[tokio::test]
async fn secret_without_auth_token_key_fails() {
    let fx = Fixture::new().await;
    fx.secrets
        .inner
        .insert_key(NAMESPACE, SECRET_NAME, "password", "hunter2")
        .await;
    let home = home();
    fx.store.apply(home.clone()).await;

    let err = fx.reconciler().reconcile(&home.id()).await.unwrap_err();

    assert!(matches!(err, Error::Credentials(_)), "got {:?}", err);
    assert!(fx.status_of(&home.id()).await.last_update.is_none());
    assert_eq!(fx.script.passes(), 0);
}

#[tokio::test]
async fn address_detection_failure_fails_without_touching_status() {
    let fx = Fixture::new().await;
    fx.ip_source.set_fail(true);
    let home = home();
    fx.store.apply(home.clone()).await;

    let err = fx.reconciler().reconcile(&home.id()).await.unwrap_err();

    assert!(matches!(err, Error::AddressResolution(_)), "got {:?}", err);
    assert!(fx.status_of(&home.id()).await.last_update.is_none());
    assert_eq!(fx.script.passes(), 0);
}

#[tokio::test]
async fn declared_address_skips_detection() {
    let fx = Fixture::new().await;
    let office = hostname("office", "office.example.com", "198.51.100.4", None, "Dyn");
    fx.store.apply(office.clone()).await;

    fx.reconciler().reconcile(&office.id()).await.unwrap();

    assert_eq!(fx.ip_source.calls(), 0);
    assert_eq!(
        fx.script.updates(),
        vec![("office.example.com".to_string(), "198.51.100.4".to_string())]
    );
}

#[tokio::test]
async fn invalid_spec_fails_before_any_lookup() {
    let fx = Fixture::new().await;
    let broken = hostname("broken", "", "", Some(5), "Dyn");
    fx.store.apply(broken.clone()).await;

    let err = fx.reconciler().reconcile(&broken.id()).await.unwrap_err();

    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
    assert_eq!(fx.secrets.calls(), 0);
    assert!(fx.status_of(&broken.id()).await.last_update.is_none());
}

#[tokio::test]
async fn status_write_failure_is_surfaced() {
    let fx = Fixture::new().await;
    let home = home();
    fx.store.apply(home.clone()).await;
    let store = Arc::new(RejectingPatchStore {
        inner: fx.store.clone(),
    });

    let err = fx
        .reconciler_with_store(store)
        .reconcile(&home.id())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StatusPatch(_)), "got {:?}", err);
    assert_eq!(fx.script.update_calls(), 1);
}

#[tokio::test]
async fn concurrent_condition_survives_status_write() {
    let fx = Fixture::new().await;
    let home = home();
    fx.store.apply(home.clone()).await;
    let store = Arc::new(ConcurrentWriterStore {
        inner: fx.store.clone(),
        concurrent_patch: MergePatch::from_value(json!({
            "status": { "conditions": [{
                "type": "Ready",
                "status": "True",
                "reason": "ExternalCheck",
                "message": "",
                "lastTransitionTime": "2026-01-01T00:00:00Z"
            }] }
        })),
    });

    fx.reconciler_with_store(store)
        .reconcile(&home.id())
        .await
        .unwrap();

    let status = fx.status_of(&home.id()).await;
    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].type_, "Ready");
    assert_eq!(status.last_update.unwrap().address, "203.0.113.7");
}

#[tokio::test]
async fn custom_endpoint_overrides_fallback_strategy() {
    let fx = Fixture::new().await;
    let custom = hostname(
        "custom",
        "lab.example.com",
        "",
        None,
        "https://ddns.example.net/nic/update",
    );
    fx.store.apply(custom.clone()).await;

    fx.reconciler().reconcile(&custom.id()).await.unwrap();

    assert_eq!(
        fx.script.endpoints(),
        vec!["https://ddns.example.net/nic/update".to_string()]
    );
    assert_eq!(fx.script.update_calls(), 1);
}

#[tokio::test]
async fn unregistered_provider_is_recorded_as_failure() {
    let fx = Fixture::new().await;
    let noip = hostname("noip", "noip.example.com", "", Some(5), "NoIP");
    fx.store.apply(noip.clone()).await;

    let action = fx.reconciler().reconcile(&noip.id()).await.unwrap();

    assert_eq!(action.requeue_after(), Some(FIVE_MINUTES));
    let last = fx.status_of(&noip.id()).await.last_update.unwrap();
    assert!(last.failed);
    assert_eq!(last.hostname, "noip.example.com");
}

#[tokio::test]
async fn secret_namespace_defaults_to_resource_namespace() {
    let fx = Fixture::new().await;
    fx.secrets
        .inner
        .insert_key("infra", "shared", AUTH_TOKEN_KEY, "other:token\n")
        .await;

    let home = home();
    let mut shared = hostname("shared", "shared.example.com", "", None, "Dyn");
    shared.spec.ddns_service.auth_secret_ref = SecretRef {
        name: "shared".to_string(),
        namespace: Some("infra".to_string()),
    };
    fx.store.apply(home.clone()).await;
    fx.store.apply(shared.clone()).await;

    let reconciler = fx.reconciler();
    reconciler.reconcile(&home.id()).await.unwrap();
    reconciler.reconcile(&shared.id()).await.unwrap();

    assert_eq!(
        fx.secrets.lookups(),
        vec![
            (NAMESPACE.to_string(), SECRET_NAME.to_string()),
            ("infra".to_string(), "shared".to_string()),
        ]
    );
    assert_eq!(
        fx.script.tokens(),
        vec![TOKEN.to_string(), "other:token".to_string()],
        "trailing newline of mounted secrets is stripped"
    );
}
