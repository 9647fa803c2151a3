//! Rollback and cleanup reports

mod common;

use common::*;
use hearth_install::cleanup::post_install_clean;
use hearth_install::rollback::rollback_packages;
use hearth_types::{CleanupStep, RollbackStep};

#[tokio::test]
async fn test_update_rollback_restores_exact_prior_state() {
    let h = Harness::new().await;
    let mut a = h.package("a.dnp.dappnode.eth", "2.0.0", true).await;
    a.docker_timeout = Some(45);
    tokio::fs::write(&a.image_path, b"new archive").await.unwrap();

    let report = rollback_packages(&h.ctx, &[a.clone()]).await;

    assert!(report.is_clean());
    assert_eq!(
        tokio::fs::read_to_string(&a.compose_path).await.unwrap(),
        OLD_COMPOSE
    );
    assert_eq!(
        tokio::fs::read_to_string(&a.manifest_path).await.unwrap(),
        OLD_MANIFEST
    );
    assert!(!a.compose_backup_path.exists());
    assert!(!a.manifest_backup_path.exists());
    assert!(!a.image_path.exists());

    let up = h.runtime.calls().into_iter().find_map(|call| match call {
        Call::ComposeUp(path, options) => Some((path, options)),
        _ => None,
    });
    let (path, options) = up.unwrap();
    assert_eq!(path, a.compose_path);
    assert_eq!(options.timeout, Some(45));
    assert!(!options.force_recreate);
}

#[tokio::test]
async fn test_fresh_install_rollback_removes_containers() {
    let h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "1.0.0", false).await;

    let report = rollback_packages(&h.ctx, &[a.clone()]).await;

    assert!(report.is_clean());
    assert!(report.outcome(&a.dnp_name, RollbackStep::RestoreCompose).is_none());
    assert!(report.outcome(&a.dnp_name, RollbackStep::RemoveContainers).is_some());
    assert_eq!(h.runtime.calls(), vec![Call::ComposeRm(a.compose_path.clone())]);
}

#[tokio::test]
async fn test_self_package_has_no_container_step() {
    let h = Harness::new().await;
    let core = h.package(SELF_PACKAGE, "0.3.0", true).await;

    let report = rollback_packages(&h.ctx, &[core.clone()]).await;

    assert!(report.outcome(SELF_PACKAGE, RollbackStep::RestoreCompose).is_some());
    assert!(report.outcome(SELF_PACKAGE, RollbackStep::RestartContainers).is_none());
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_failed_steps_do_not_stop_rollback() {
    let mut h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "2.0.0", true).await;
    let b = h.package("b.dnp.dappnode.eth", "1.0.0", true).await;
    // A missing backup makes the restore step fail
    tokio::fs::remove_file(&a.compose_backup_path).await.unwrap();
    h.runtime
        .failing_compose
        .lock()
        .unwrap()
        .insert(a.compose_path.clone());

    let report = rollback_packages(&h.ctx, &[a.clone(), b.clone()]).await;

    assert_eq!(report.failures().count(), 2);
    assert!(report
        .outcome(&a.dnp_name, RollbackStep::RestoreManifest)
        .unwrap()
        .result
        .is_ok());
    assert!(report
        .outcome(&b.dnp_name, RollbackStep::RestartContainers)
        .unwrap()
        .result
        .is_ok());

    let events = h.drain_events();
    let step_failures = install_events(&events)
        .into_iter()
        .filter(|event| matches!(event, hearth_events::InstallEvent::StepFailed { .. }))
        .count();
    assert_eq!(step_failures, 2);
}

#[tokio::test]
async fn test_cleanup_removes_stale_archives_and_keeps_first_install_time() {
    let h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "1.1.0", true).await;
    let dir = a.image_path.parent().unwrap().to_path_buf();
    let stale_txz = dir.join("a.dnp.dappnode.eth_1.0.0.txz");
    let stale_tar_xz = dir.join("a.dnp.dappnode.eth_0.9.0.tar.xz");
    tokio::fs::write(&stale_txz, b"old").await.unwrap();
    tokio::fs::write(&stale_tar_xz, b"older").await.unwrap();
    tokio::fs::write(&a.image_path, b"current").await.unwrap();

    let first = post_install_clean(&h.ctx, &[a.clone()]).await;
    assert!(first.is_clean());
    assert!(!stale_txz.exists());
    assert!(!stale_tar_xz.exists());
    assert!(!a.image_path.exists());
    assert!(a.compose_path.exists());
    assert!(a.manifest_path.exists());
    let installed = h
        .ctx
        .store
        .installed_metadata(&a.dnp_name)
        .await
        .unwrap()
        .unwrap();

    // A second run is harmless and keeps the first install time
    let second = post_install_clean(&h.ctx, &[a.clone()]).await;
    assert!(second.outcome(&a.dnp_name, CleanupStep::DeleteBackups).unwrap().result.is_ok());
    let again = h
        .ctx
        .store
        .installed_metadata(&a.dnp_name)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.installed_at, installed.installed_at);
}
