//! End-to-end checkout and install runs

use redeploy::deploy::checkout::checkout;
use redeploy::deploy::pipeline::StepStatus;
use redeploy::errors::DeployError;

use crate::support::{branch, target, FakeHost, UNIT};

#[tokio::test]
async fn test_fresh_host() {
    let host = FakeHost::new();

    let report = checkout(&host, &host.settings, &branch("main"), &target("bot.example.com"))
        .await
        .unwrap();

    assert_eq!(report.checkout.applied(), vec!["ensure-clone"]);
    assert_eq!(report.install.failed_step(), None);

    assert_eq!(host.hostname(), "bot.example.com");
    for package in &host.settings.host.packages {
        assert!(host.has_package(package), "{} not installed", package);
    }
    assert!(host.layout.toolchain_env().exists().await);
    assert!(host.layout.hushlogin().exists().await);
    assert_eq!(host.binary().await.as_deref(), Some("build of c1"));
    assert_eq!(host.backup().await, None);
    assert!(host.has_user("cratebot"));
    assert_eq!(host.layout.unit().read_string().await.unwrap(), UNIT);
    assert!(host.is_active("cratebot.service"));
}

#[tokio::test]
async fn test_redeploy_after_push() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    host.push("main", "c2");
    host.clear_commands();
    let report = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    assert_eq!(report.checkout.status_of("ensure-clone"), Some(&StepStatus::Satisfied));
    assert_eq!(report.checkout.status_of("fetch-origin"), Some(&StepStatus::Applied));
    assert_eq!(report.checkout.status_of("pin-branch"), Some(&StepStatus::Applied));
    assert_eq!(host.head().as_deref(), Some("c2"));

    assert_eq!(host.binary().await.as_deref(), Some("build of c2"));
    assert_eq!(host.backup().await.as_deref(), Some("build of c1"));
    assert!(!host.ran("git clone"));
    assert!(!host.ran(crate::support::INSTALLER));
    assert!(!host.ran("useradd"));
    assert!(!host.ran("apt-get"));
}

#[tokio::test]
async fn test_unchanged_rerun_only_rebuilds() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    let report = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    assert!(report.checkout.applied().is_empty());
    assert_eq!(
        report.install.applied(),
        vec!["build-release", "swap-binary", "reconcile-unit"]
    );
    assert_eq!(host.binary().await.as_deref(), Some("build of c1"));
    assert_eq!(host.backup().await.as_deref(), Some("build of c1"));
}

#[tokio::test]
async fn test_branch_switch() {
    let host = FakeHost::new();
    host.push("feature-x", "f7");
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    checkout(&host, &host.settings, &branch("feature-x"), &domain)
        .await
        .unwrap();

    assert_eq!(host.head_branch().as_deref(), Some("feature-x"));
    assert_eq!(host.head().as_deref(), Some("f7"));
    assert_eq!(host.binary().await.as_deref(), Some("build of f7"));
    assert_eq!(host.backup().await.as_deref(), Some("build of c1"));
}

#[tokio::test]
async fn test_untracked_files_are_removed() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.make_dirty();

    let report = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    assert_eq!(report.checkout.status_of("reset-to-tip"), Some(&StepStatus::Applied));
    assert!(!host.is_dirty());
}

#[tokio::test]
async fn test_local_commits_are_discarded() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.commit_locally("l1");

    let report = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    assert_eq!(report.checkout.status_of("fetch-origin"), Some(&StepStatus::Satisfied));
    assert_eq!(report.checkout.status_of("pin-branch"), Some(&StepStatus::Applied));
    assert_eq!(host.head().as_deref(), Some("c1"));
    assert_eq!(host.local_tip("main").as_deref(), Some("c1"));
    assert_eq!(host.binary().await.as_deref(), Some("build of c1"));
}

#[tokio::test]
async fn test_local_commits_discarded_when_origin_moves() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.commit_locally("l1");
    host.commit_locally("l2");
    host.push("main", "c2");

    let report = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    assert_eq!(report.checkout.status_of("pin-branch"), Some(&StepStatus::Applied));
    assert_eq!(host.head().as_deref(), Some("c2"));
    assert_eq!(host.binary().await.as_deref(), Some("build of c2"));
    assert_eq!(host.backup().await.as_deref(), Some("build of c1"));
}

#[tokio::test]
async fn test_unknown_branch_stops_before_install() {
    let host = FakeHost::new();

    let err = checkout(&host, &host.settings, &branch("nope"), &target("bot.example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::StepFailed { ref step, .. } if step == "fetch-origin"));
    assert_eq!(err.exit_code(), 1);
    assert!(!host.ran("hostnamectl"));
    assert_eq!(host.binary().await, None);
}

#[tokio::test]
async fn test_fetch_failure_status_propagates() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.fail_fetch(Some(128));

    let err = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 128);
    let log = err.step_log().unwrap();
    assert_eq!(log.pipeline, "checkout");
    assert_eq!(log.failed_step(), Some("fetch-origin"));
    assert_eq!(log.status_of("ensure-clone"), Some(&StepStatus::Satisfied));
}

#[tokio::test]
async fn test_missing_repository_setting() {
    let mut host = FakeHost::new();
    host.settings.source.repository.clear();

    let err = checkout(&host, &host.settings, &branch("main"), &target("bot.example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ConfigError(_)));
    assert!(!host.ran("git"));
}
