//! Integration tests for ModuleLifecycleManager - version switching.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{v, Harness};
use playground_core::compiler::Capability;
use playground_core::lifecycle::{ModuleLoadError, SwitchError, SwitchStatus};
use playground_core::storage::{CompatibilityStatus, VerdictLookup};

#[tokio::test]
async fn test_first_switch_checks_and_records_verdict() {
    let h = Harness::new(&["2.1.0", "2.0.9"]);
    let module = h.install("2.0.9");

    let report = h.lifecycle().switch_to(&v("2.0.9")).await.unwrap();
    assert!(report.probed);
    assert_eq!(report.version, v("2.0.9"));

    let lookup = h.playground.store.get_verdict(&v("2.0.9"));
    assert!(lookup.is_verified_fit());
    let record = lookup.record().unwrap();
    let ttl = record.expires - chrono::Utc::now();
    assert!(ttl > chrono::Duration::hours(23) && ttl <= chrono::Duration::days(1));

    assert_eq!(h.playground.store.last_used_version(), Some(v("2.0.9")));
    assert_eq!(h.lifecycle().active_version().await, Some(v("2.0.9")));
    // Check init + install init, check teardown
    assert_eq!(module.inits(), 2);
    assert_eq!(module.teardowns(), 1);
    assert!(module.is_initialized());
}

#[tokio::test]
async fn test_stored_verdict_skips_compatibility_check() {
    let h = Harness::new(&["2.0.9"]);
    let module = h.install("2.0.9");
    h.mark_fit("2.0.9");

    let report = h.lifecycle().switch_to(&v("2.0.9")).await.unwrap();
    assert!(!report.probed);
    assert_eq!(module.inits(), 1);
    assert_eq!(module.teardowns(), 0);
}

#[tokio::test]
async fn test_sequential_switches_leave_one_active_handle() {
    let h = Harness::new(&["3.0.0", "2.0.0", "1.0.0"]);
    let modules: Vec<_> = ["1.0.0", "2.0.0", "3.0.0"]
        .iter()
        .map(|version| {
            h.mark_fit(version);
            h.install(version)
        })
        .collect();

    let mut handles = Vec::new();
    for version in ["1.0.0", "2.0.0", "3.0.0"] {
        handles.push(h.lifecycle().switch_to(&v(version)).await.unwrap().handle);
    }

    assert_eq!(h.monitor.live(), 1);
    assert_eq!(h.monitor.peak(), 1);
    assert_eq!(modules[0].teardowns(), 1);
    assert_eq!(modules[1].teardowns(), 1);
    assert_eq!(modules[2].teardowns(), 0);
    assert!(modules[2].is_initialized());

    let active = h.lifecycle().active_handle().await.unwrap();
    assert_eq!(active.id(), handles[2]);
    assert!(handles.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_reselecting_active_version_reinstalls() {
    let h = Harness::new(&["1.0.0"]);
    let module = h.install("1.0.0");
    h.mark_fit("1.0.0");

    let first = h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    let second = h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    assert_ne!(first.handle, second.handle);
    assert_eq!(module.inits(), 2);
    assert_eq!(module.teardowns(), 1);
    assert_eq!(h.monitor.live(), 1);
}

#[tokio::test]
async fn test_probing_never_overlaps_active_runtime() {
    let h = Harness::new(&["2.0.0", "1.0.0"]);
    let old = h.install("1.0.0");
    let new = h.install("2.0.0");
    h.mark_fit("1.0.0");

    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    let report = h.lifecycle().switch_to(&v("2.0.0")).await.unwrap();

    assert!(report.probed);
    assert_eq!(h.monitor.peak(), 1);
    assert_eq!(old.teardowns(), 1);
    assert!(!old.is_initialized());
    assert!(new.is_initialized());
}

#[tokio::test]
async fn test_single_failing_capability_rejects_version() {
    let h = Harness::new(&["2.0.0", "1.0.0"]);
    let good = h.install("1.0.0");
    let bad = h.install("2.0.0");
    bad.transform_broken.store(true, std::sync::atomic::Ordering::SeqCst);
    h.mark_fit("1.0.0");
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();

    let err = h.lifecycle().switch_to(&v("2.0.0")).await.unwrap_err();
    match &err {
        SwitchError::Incompatible { version, unfit } => {
            assert_eq!(version, &v("2.0.0"));
            assert_eq!(unfit, &vec![(Capability::Transform, CompatibilityStatus::Incompatible)]);
        }
        other => panic!("expected incompatible, got {:?}", other),
    }
    assert!(err.is_soft());

    let VerdictLookup::Verified(record) = h.playground.store.get_verdict(&v("2.0.0")) else {
        panic!("checked verdict was not stored");
    };
    assert_eq!(record.compatibility_map.get(Capability::Parse), Some(CompatibilityStatus::Compatible));
    assert_eq!(
        record.compatibility_map.get(Capability::ConvertToAlternateSyntax),
        Some(CompatibilityStatus::Compatible)
    );

    // Previous module is back in service
    assert_eq!(h.lifecycle().active_version().await, Some(v("1.0.0")));
    assert!(good.is_initialized());
    assert!(!bad.is_initialized());
    assert_eq!(h.monitor.peak(), 1);
    assert_eq!(h.playground.store.last_used_version(), Some(v("1.0.0")));
    assert!(h.playground.outputs.bound_handle().is_some());
}

#[tokio::test]
async fn test_partially_compatible_verdict_is_unfit() {
    let h = Harness::new(&["1.0.0"]);
    h.install("1.0.0");
    h.playground.store.store_verdict(
        &v("1.0.0"),
        playground_core::storage::CompatibilityVerdict::uniform(CompatibilityStatus::Compatible)
            .with(Capability::Parse, CompatibilityStatus::PartiallyCompatible),
    );

    let err = h.lifecycle().switch_to(&v("1.0.0")).await.unwrap_err();
    assert!(matches!(err, SwitchError::Incompatible { .. }));
}

#[tokio::test]
async fn test_missing_version_is_load_failure() {
    let h = Harness::new(&["1.0.0"]);
    let err = h.lifecycle().switch_to(&v("9.9.9")).await.unwrap_err();
    assert!(matches!(err, SwitchError::Load { source: ModuleLoadError::ImportFailed { .. }, .. }));
    assert_eq!(h.resolver.imports_of(&Harness::module_url("9.9.9")), 1);

    let err = h.lifecycle().switch_to(&v("../escape")).await.unwrap_err();
    assert!(matches!(err, SwitchError::Load { source: ModuleLoadError::InvalidVersion(_), .. }));
    assert_eq!(h.resolver.imports_of(&Harness::module_url("../escape")), 0);
}

#[tokio::test]
async fn test_runtime_falls_back_to_secondary_asset() {
    let h = Harness::new(&["1.0.0"]);
    let module = h.install("1.0.0");
    module.primary_asset_missing.store(true, std::sync::atomic::Ordering::SeqCst);
    h.mark_fit("1.0.0");

    let report = h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    assert_eq!(report.asset_url, format!("{}/{}", Harness::module_url("1.0.0"), common::RUNTIME_ASSET));
    assert_eq!(
        *module.init_urls.lock(),
        vec![
            format!("{}/dist/{}", Harness::module_url("1.0.0"), common::RUNTIME_ASSET),
            format!("{}/{}", Harness::module_url("1.0.0"), common::RUNTIME_ASSET),
        ]
    );
}

#[tokio::test]
async fn test_runtime_double_failure_escalates_and_leaves_handle_uninitialized() {
    let h = Harness::new(&["2.0.0", "1.0.0"]);
    let old = h.install("1.0.0");
    let broken = h.install("2.0.0");
    broken.all_assets_missing.store(true, std::sync::atomic::Ordering::SeqCst);
    h.mark_fit("1.0.0");
    h.mark_fit("2.0.0");
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();

    let err = h.lifecycle().switch_to(&v("2.0.0")).await.unwrap_err();
    assert!(err.requires_escalation());
    assert!(!err.is_soft());
    match &err {
        SwitchError::RuntimeInitialization(e) => {
            assert!(e.primary_url.ends_with("/dist/compiler.wasm"));
            assert!(e.fallback_url.ends_with("@2.0.0/compiler.wasm"));
        }
        other => panic!("expected runtime initialization failure, got {:?}", other),
    }

    // Installed but not initialized; previous one is gone
    let handle = h.lifecycle().active_handle().await.unwrap();
    assert_eq!(handle.version(), &v("2.0.0"));
    assert!(!h.lifecycle().is_runtime_initialized().await);
    assert_eq!(h.lifecycle().active_version().await, None);
    assert_eq!(old.teardowns(), 1);
    assert_eq!(h.monitor.live(), 0);
    assert_eq!(h.playground.store.last_used_version(), Some(v("1.0.0")));
    assert_eq!(h.playground.outputs.bound_handle(), None);
    let status = h.lifecycle().status();
    assert!(matches!(status, SwitchStatus::Failed { reload_required: true, .. }));
    assert!(status.notice().unwrap().contains("reload"));

    // Recoverable by another full switch
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    assert!(h.lifecycle().is_runtime_initialized().await);
    assert_eq!(broken.teardowns(), 0);
}

#[tokio::test]
async fn test_concurrent_switches_are_serialized() {
    let h = Arc::new(Harness::new(&["2.0.0", "1.0.0"]));
    let first = h.install("1.0.0");
    let second = h.install("2.0.0");
    h.mark_fit("1.0.0");
    h.mark_fit("2.0.0");
    first.init_gate.close();

    let h1 = h.clone();
    let a = tokio::spawn(async move { h1.lifecycle().switch_to(&v("1.0.0")).await });
    first.init_gate.entered().await;

    let h2 = h.clone();
    let b = tokio::spawn(async move { h2.lifecycle().switch_to(&v("2.0.0")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(second.inits(), 0, "second switch must wait for the first");

    first.init_gate.open();
    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert!(a.handle < b.handle);
    assert_eq!(h.lifecycle().active_version().await, Some(v("2.0.0")));
    assert_eq!(first.teardowns(), 1);
    assert_eq!(h.monitor.peak(), 1);
}

#[tokio::test]
async fn test_queued_switch_is_superseded_by_newer_request() {
    let h = Arc::new(Harness::new(&["3.0.0", "2.0.0", "1.0.0"]));
    let first = h.install("1.0.0");
    let skipped = h.install("2.0.0");
    h.install("3.0.0");
    for version in ["1.0.0", "2.0.0", "3.0.0"] {
        h.mark_fit(version);
    }
    first.init_gate.close();

    let h1 = h.clone();
    let a = tokio::spawn(async move { h1.lifecycle().switch_to(&v("1.0.0")).await });
    first.init_gate.entered().await;

    let h2 = h.clone();
    let b = tokio::spawn(async move { h2.lifecycle().switch_to(&v("2.0.0")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let h3 = h.clone();
    let c = tokio::spawn(async move { h3.lifecycle().switch_to(&v("3.0.0")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    first.init_gate.open();
    assert!(a.await.unwrap().is_ok());
    let b = b.await.unwrap();
    assert!(matches!(b, Err(SwitchError::Superseded { ref version }) if version == &v("2.0.0")));
    assert!(c.await.unwrap().is_ok());

    assert_eq!(skipped.inits(), 0);
    assert_eq!(h.resolver.imports_of(&Harness::module_url("2.0.0")), 0);
    assert_eq!(h.lifecycle().active_version().await, Some(v("3.0.0")));
    assert_eq!(h.lifecycle().status(), SwitchStatus::Active { version: v("3.0.0") });
}

#[tokio::test]
async fn test_switch_overtaken_during_import_leaves_active_module_alone() {
    let h = Arc::new(Harness::new(&["3.0.0", "2.0.0", "1.0.0"]));
    let active = h.install("1.0.0");
    let overtaken = h.install("2.0.0");
    h.install("3.0.0");
    h.mark_fit("1.0.0");
    h.mark_fit("3.0.0");
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    h.resolver.import_gate.close();

    // 2.0.0 has no stored verdict, so reaching validation would initialize it
    let h1 = h.clone();
    let a = tokio::spawn(async move { h1.lifecycle().switch_to(&v("2.0.0")).await });
    h.resolver.import_gate.entered().await;
    let h2 = h.clone();
    let b = tokio::spawn(async move { h2.lifecycle().switch_to(&v("3.0.0")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.resolver.import_gate.open();
    let a = a.await.unwrap();
    assert!(matches!(a, Err(SwitchError::Superseded { ref version }) if version == &v("2.0.0")));
    assert!(b.await.unwrap().is_ok());

    assert_eq!(overtaken.inits(), 0);
    assert_eq!(h.playground.store.get_verdict(&v("2.0.0")), VerdictLookup::Unknown);
    // Only the winning switch touched the active module
    assert_eq!(active.inits(), 1);
    assert_eq!(active.teardowns(), 1);
    assert_eq!(h.monitor.peak(), 1);
    assert_eq!(h.lifecycle().active_version().await, Some(v("3.0.0")));
}

#[tokio::test]
async fn test_failed_resume_after_rejection_requires_reload() {
    let h = Harness::new(&["2.0.0", "1.0.0"]);
    let previous = h.install("1.0.0");
    let bad = h.install("2.0.0");
    bad.transform_broken.store(true, std::sync::atomic::Ordering::SeqCst);
    h.mark_fit("1.0.0");
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();

    // The running module cannot come back once suspended for the check
    previous.all_assets_missing.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = h.lifecycle().switch_to(&v("2.0.0")).await.unwrap_err();
    assert!(err.requires_escalation());
    assert_eq!(err.version(), &v("1.0.0"));

    let status = h.lifecycle().status();
    assert!(matches!(status, SwitchStatus::Failed { reload_required: true, .. }));
    assert!(!h.lifecycle().is_runtime_initialized().await);
    assert_eq!(h.lifecycle().active_handle().await.unwrap().version(), &v("1.0.0"));
    assert_eq!(h.playground.outputs.bound_handle(), None);
    assert_eq!(h.monitor.live(), 0);
    assert!(!h.playground.store.get_verdict(&v("2.0.0")).is_verified_fit());

    previous.all_assets_missing.store(false, std::sync::atomic::Ordering::SeqCst);
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    assert!(h.lifecycle().is_runtime_initialized().await);
}

#[tokio::test]
async fn test_status_channel_tracks_switch() {
    let h = Harness::new(&["1.0.0"]);
    h.install("1.0.0");
    h.mark_fit("1.0.0");
    let mut status = h.lifecycle().subscribe_status();
    assert_eq!(*status.borrow(), SwitchStatus::Idle);

    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();
    assert!(status.has_changed().unwrap());
    let current = status.borrow_and_update().clone();
    assert_eq!(current, SwitchStatus::Active { version: v("1.0.0") });
    assert!(!current.is_loading());
    assert_eq!(current.notice(), None);

    h.lifecycle().switch_to(&v("4.0.0")).await.unwrap_err();
    match h.lifecycle().status() {
        SwitchStatus::Failed { requested, reload_required, .. } => {
            assert_eq!(requested, v("4.0.0"));
            assert!(!reload_required);
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_tears_down_active_module() {
    let h = Harness::new(&["1.0.0"]);
    let module = h.install("1.0.0");
    h.mark_fit("1.0.0");
    h.lifecycle().switch_to(&v("1.0.0")).await.unwrap();

    h.lifecycle().shutdown().await;
    assert_eq!(module.teardowns(), 1);
    assert_eq!(h.monitor.live(), 0);
    assert!(h.lifecycle().active_handle().await.is_none());
    assert_eq!(h.playground.outputs.bound_handle(), None);
    assert_eq!(h.lifecycle().status(), SwitchStatus::Idle);
}
