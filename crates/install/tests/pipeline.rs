//! End-to-end scenarios for the install pipeline

mod common;

use common::*;
use hearth_errors::{Error, InstallError};
use hearth_events::{AppEvent, GeneralEvent, InstallEvent, NotificationEvent};
use hearth_install::restart::{render_restart_script, RestartScriptParams};
use hearth_install::Installer;
use hearth_platform::ImageSummary;
use std::collections::BTreeMap;
use std::time::Duration;

#[tokio::test]
async fn test_batch_installs_and_cleans_up() {
    let mut h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "1.0.0", false).await;
    let b = h.package("b.dnp.dappnode.eth", "2.1.0", true).await;
    h.serve_good(&a).await;
    h.serve_good(&b).await;
    // Make the first package the slowest so loading would overtake it
    // without the barrier
    h.fetcher
        .delay(&a.image_file.source, Duration::from_millis(100));
    h.runtime.images.lock().unwrap().extend([
        ImageSummary {
            repository: b.dnp_name.clone(),
            tag: "2.0.0".to_string(),
            id: "sha256:old".to_string(),
        },
        ImageSummary {
            repository: b.dnp_name.clone(),
            tag: "2.1.0".to_string(),
            id: "sha256:new".to_string(),
        },
    ]);

    let installer = Installer::new(h.ctx.clone());
    let batch = vec![a.clone(), b.clone()];
    installer.install(&batch).await.unwrap();

    let timeline = entries(&h.timeline);
    let last_fetch = timeline
        .iter()
        .rposition(|entry| entry.starts_with("fetched:"))
        .unwrap();
    let first_load = position(&timeline, "load:").unwrap();
    assert!(last_fetch < first_load, "{timeline:?}");

    let up_a = position(&timeline, "up:a.dnp").unwrap();
    let up_b = position(&timeline, "up:b.dnp").unwrap();
    assert!(up_a < up_b);

    // Cleanup finalized the update
    assert!(!b.compose_backup_path.exists());
    assert!(!b.manifest_backup_path.exists());
    assert!(!a.image_path.exists());
    assert!(!b.image_path.exists());
    assert!(timeline.contains(&format!("rmi:{}:2.0.0", b.dnp_name)));
    assert!(!timeline.contains(&format!("rmi:{}:2.1.0", b.dnp_name)));

    let meta = h.ctx.store.installed_metadata(&b.dnp_name).await.unwrap().unwrap();
    assert_eq!(meta.version, b.sem_version);

    assert!(!installer.package_is_installing(&a.dnp_name));
    let events = h.drain_events();
    assert!(notifications(&events).contains(&&NotificationEvent::PackagesChanged {
        names: vec![a.dnp_name.clone(), b.dnp_name.clone()],
    }));
    assert!(install_events(&events)
        .iter()
        .any(|event| matches!(event, InstallEvent::BatchCompleted { .. })));
    assert!(install_events(&events)
        .iter()
        .any(|event| matches!(event, InstallEvent::LoadProgress { percent: 100, .. })));
}

#[tokio::test]
async fn test_overlapping_install_is_reported() {
    let mut h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "1.0.0", false).await;
    let b = h.package("b.dnp.dappnode.eth", "1.0.0", false).await;
    h.serve_good(&a).await;
    h.serve_good(&b).await;
    h.ctx
        .flags
        .flag_packages_are_installing([b.dnp_name.as_str(), "other.dnp.dappnode.eth"]);

    let installer = Installer::new(h.ctx.clone());
    installer.install(&[a.clone(), b.clone()]).await.unwrap();

    let events = h.drain_events();
    let warnings: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            AppEvent::General(GeneralEvent::Warning { message, context })
                if message.contains("in flight") =>
            {
                context.clone()
            }
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![b.dnp_name.clone()]);
    assert!(!installer.package_is_installing(&b.dnp_name));
    assert!(installer.package_is_installing("other.dnp.dappnode.eth"));
}

#[tokio::test]
async fn test_bad_image_aborts_before_container_activation() {
    let mut h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "1.0.0", false).await;
    let b = h.package("b.dnp.dappnode.eth", "1.0.0", true).await;
    h.serve_good(&a).await;
    h.fetcher
        .serve(&b.image_file.source, image_archive("someone-else:1.0.0").await);

    let installer = Installer::new(h.ctx.clone());
    let err = installer.install(&[a.clone(), b.clone()]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::VerificationFailed { ref package, .. }) if package == &b.dnp_name
    ));

    let timeline = entries(&h.timeline);
    assert!(position(&timeline, "load:").is_none(), "{timeline:?}");
    assert!(position(&timeline, "up:").is_none(), "{timeline:?}");

    // Rollback: fresh install removed, update restored
    assert!(timeline.contains(&"rm:a.dnp.dappnode.eth".to_string()));
    assert!(!a.image_path.exists());
    assert_eq!(
        tokio::fs::read_to_string(&b.compose_path).await.unwrap(),
        OLD_COMPOSE
    );
    assert!(!installer.package_is_installing(&a.dnp_name));

    let events = h.drain_events();
    assert!(install_events(&events)
        .iter()
        .any(|event| matches!(event, InstallEvent::RollbackCompleted { failed_steps: 0, .. })));
}

#[tokio::test]
async fn test_core_verification_failure_does_not_abort() {
    let mut h = Harness::new().await;
    let mut core = h.package("bind.dnp.dappnode.eth", "0.2.0", false).await;
    core.is_core = true;
    let a = h.package("a.dnp.dappnode.eth", "1.0.0", false).await;
    h.fetcher
        .serve(&core.image_file.source, image_archive("bind.dnp.dappnode.eth:0.1.0").await);
    h.serve_good(&a).await;

    Installer::new(h.ctx.clone())
        .install(&[core.clone(), a])
        .await
        .unwrap();

    let events = h.drain_events();
    assert!(install_events(&events).iter().any(|event| matches!(
        event,
        InstallEvent::CoreVerificationFailed { package, .. } if package == &core.dnp_name
    )));
}

#[tokio::test]
async fn test_container_failure_rolls_back() {
    let h = Harness::new().await;
    let a = h.package("a.dnp.dappnode.eth", "1.0.0", true).await;
    h.serve_good(&a).await;
    h.runtime
        .failing_compose
        .lock()
        .unwrap()
        .insert(a.compose_path.clone());

    let err = Installer::new(h.ctx.clone())
        .install(&[a.clone()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::ContainerActivationFailed { .. })
    ));
    assert_eq!(
        tokio::fs::read_to_string(&a.compose_path).await.unwrap(),
        OLD_COMPOSE
    );
    assert!(!a.compose_backup_path.exists());
}

#[tokio::test]
async fn test_invalid_batch_touches_nothing() {
    let h = Harness::new().await;
    let core = h.package(SELF_PACKAGE, "0.2.0", true).await;

    let installer = Installer::new(h.ctx.clone());
    let err = installer
        .install(&[core.clone(), core.clone()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::DuplicateSelfPackage { count: 2, .. })
    ));
    assert!(installer.install(&[]).await.is_err());
    assert!(h.runtime.calls().is_empty());
    assert!(entries(&h.timeline).is_empty());
}

#[tokio::test]
async fn test_file_uploads_are_copied_before_start() {
    let h = Harness::new().await;
    let mut a = h.package("a.dnp.dappnode.eth", "1.0.0", false).await;
    tokio::fs::write(
        &a.compose_path,
        "services:\n  web:\n    container_name: custom-web\n  worker:\n    image: w\n",
    )
    .await
    .unwrap();
    let mut uploads = BTreeMap::new();
    uploads.insert(
        "web".to_string(),
        BTreeMap::from([("/etc/app.conf".to_string(), "key=value".to_string())]),
    );
    uploads.insert(
        "worker".to_string(),
        BTreeMap::from([("/data/seed".to_string(), "seed".to_string())]),
    );
    a.file_uploads = Some(uploads);
    h.serve_good(&a).await;

    Installer::new(h.ctx.clone())
        .install(&[a.clone()])
        .await
        .unwrap();

    let timeline = entries(&h.timeline);
    let create = position(&timeline, "create:a.dnp").unwrap();
    let copy_web = position(&timeline, "copy:custom-web:/etc/app.conf").unwrap();
    let copy_worker = position(
        &timeline,
        "copy:HearthPackage-worker.a.dnp.dappnode.eth:/data/seed",
    )
    .unwrap();
    let up = position(&timeline, "up:a.dnp").unwrap();
    assert!(create < copy_web && copy_web < copy_worker && copy_worker < up);
}

#[tokio::test]
async fn test_self_update_starts_others_then_restarts() {
    let h = Harness::new().await;
    let core = h.package(SELF_PACKAGE, "0.3.0", true).await;
    let x = h.package("x.dnp.dappnode.eth", "1.0.0", false).await;
    h.serve_good(&core).await;
    h.serve_good(&x).await;

    let batch = vec![core.clone(), x.clone()];
    let err = Installer::new(h.ctx.clone())
        .install(&batch)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::SelfRestartReturned { .. })
    ));

    let timeline = entries(&h.timeline);
    let up_x = position(&timeline, "up:x.dnp").unwrap();
    let remove_helper = position(&timeline, &format!("remove:{HELPER}")).unwrap();
    let launch = position(&timeline, "launch").unwrap();
    assert!(up_x < remove_helper && remove_helper < launch, "{timeline:?}");
    assert!(position(&timeline, &format!("up:{SELF_PACKAGE}")).is_none());

    // The batch is checkpointed and the helper script rendered
    let persisted = h.ctx.store.core_update_batch().await.unwrap();
    assert_eq!(persisted, Some(batch));
    let script = tokio::fs::read_to_string(&h.ctx.settings.restart_script_path)
        .await
        .unwrap();
    assert_eq!(
        script,
        render_restart_script(&RestartScriptParams::new(&h.ctx.settings, &core))
    );

    let launch_command = h
        .runtime
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Launch(command) => Some(command),
            _ => None,
        })
        .unwrap();
    assert!(launch_command.contains("--name restart-helper"));
    assert!(launch_command.ends_with(&h.ctx.settings.restart_script_path.display().to_string()));

    // The helper settles the batch, so nothing was rolled back here
    assert!(core.compose_backup_path.exists());
    assert!(position(&timeline, "rm:").is_none());
}

#[tokio::test]
async fn test_self_restart_launch_failure_keeps_checkpoint() {
    let h = Harness::new().await;
    let mut core = h.package(SELF_PACKAGE, "0.3.0", true).await;
    core.metadata.restart_launch_command = Some("custom-launch".to_string());
    h.serve_good(&core).await;
    // The helper ran the script and reported failure
    *h.runtime.launch_error.lock().unwrap() = Some("exit status 1".to_string());
    *h.runtime.helper_after_launch.lock().unwrap() = Some(exited(1));

    let installer = Installer::new(h.ctx.clone());
    let err = installer.install(&[core.clone()]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::SelfRestartFailed { .. })
    ));

    assert!(h.runtime.calls().contains(&Call::Launch("custom-launch".to_string())));
    assert!(h.ctx.store.core_update_batch().await.unwrap().is_some());
    assert!(core.compose_backup_path.exists());
    assert!(!installer.package_is_installing(SELF_PACKAGE));
}

#[tokio::test]
async fn test_self_restart_that_never_starts_rolls_back() {
    let h = Harness::new().await;
    let core = h.package(SELF_PACKAGE, "0.3.0", true).await;
    let x = h.package("x.dnp.dappnode.eth", "1.0.0", true).await;
    h.serve_good(&core).await;
    h.serve_good(&x).await;
    *h.runtime.launch_error.lock().unwrap() = Some("no such image".to_string());

    let installer = Installer::new(h.ctx.clone());
    let err = installer.install(&[x.clone(), core.clone()]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::SelfRestartNotStarted { .. })
    ));

    // Nothing is left for the next start, the batch is reverted here
    assert!(h.ctx.store.core_update_batch().await.unwrap().is_none());
    for state in [&x, &core] {
        assert_eq!(
            tokio::fs::read_to_string(&state.compose_path).await.unwrap(),
            OLD_COMPOSE
        );
        assert!(!state.compose_backup_path.exists());
    }
    let timeline = entries(&h.timeline);
    let launch = position(&timeline, "launch").unwrap();
    let restart_x = timeline
        .iter()
        .rposition(|entry| entry == "up:x.dnp.dappnode.eth")
        .unwrap();
    assert!(launch < restart_x, "{timeline:?}");

    installer.post_restart_patch().await;
    assert_eq!(
        tokio::fs::read_to_string(&x.compose_path).await.unwrap(),
        OLD_COMPOSE
    );
}

#[tokio::test]
async fn test_unwritable_restart_script_rolls_back() {
    let mut h = Harness::new().await;
    let blocker = h.temp.path().join("blocker");
    tokio::fs::write(&blocker, "not a directory").await.unwrap();
    h.ctx.settings.restart_script_path = blocker.join("restart.sh");

    let core = h.package(SELF_PACKAGE, "0.3.0", true).await;
    let x = h.package("x.dnp.dappnode.eth", "1.0.0", true).await;
    h.serve_good(&core).await;
    h.serve_good(&x).await;

    let installer = Installer::new(h.ctx.clone());
    let err = installer.install(&[x.clone(), core]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::SelfRestartNotStarted { .. })
    ));

    assert!(position(&entries(&h.timeline), "launch").is_none());
    assert_eq!(
        tokio::fs::read_to_string(&x.compose_path).await.unwrap(),
        OLD_COMPOSE
    );
    assert!(!x.compose_backup_path.exists());
    assert!(h.ctx.store.core_update_batch().await.unwrap().is_none());
    let events = h.drain_events();
    assert!(install_events(&events)
        .iter()
        .any(|event| matches!(event, InstallEvent::RollbackCompleted { .. })));
}
