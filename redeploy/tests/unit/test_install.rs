//! Build & install pipeline against the fake host

use redeploy::deploy::checkout::checkout;
use redeploy::deploy::pipeline::StepStatus;
use redeploy::installer::install::install;

use crate::support::{branch, target, FakeHost};

#[tokio::test]
async fn test_build_failure_leaves_binary_untouched() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    host.push("main", "c2");
    host.fail_build(Some(101));
    host.clear_commands();
    let err = checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 101);
    let log = err.step_log().unwrap();
    assert_eq!(log.pipeline, "install");
    assert_eq!(log.failed_step(), Some("build-release"));
    assert_eq!(log.status_of("swap-binary"), None);

    assert_eq!(host.binary().await.as_deref(), Some("build of c1"));
    assert_eq!(host.backup().await, None);
    assert!(!host.ran("systemctl"));
}

#[tokio::test]
async fn test_failed_build_then_fixed_build() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.push("main", "c2");
    host.fail_build(Some(101));
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap_err();

    host.push("main", "c3");
    host.fail_build(None);
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    assert_eq!(host.binary().await.as_deref(), Some("build of c3"));
    assert_eq!(host.backup().await.as_deref(), Some("build of c1"));
}

#[tokio::test]
async fn test_rerun_install_skips_provisioning() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    let first = host.count(crate::support::INSTALLER);

    let log = install(&host, &host.settings, &domain).await.unwrap();

    assert_eq!(first, 1);
    assert_eq!(host.count(crate::support::INSTALLER), 1);
    assert_eq!(log.status_of("ensure-toolchain"), Some(&StepStatus::Satisfied));
    assert_eq!(log.status_of("ensure-account"), Some(&StepStatus::Satisfied));
    assert_eq!(log.status_of("install-packages"), Some(&StepStatus::Satisfied));
}

#[tokio::test]
async fn test_hostname_follows_domain() {
    let host = FakeHost::new();
    checkout(&host, &host.settings, &branch("main"), &target("a.example.com"))
        .await
        .unwrap();

    let log = install(&host, &host.settings, &target("b.example.com"))
        .await
        .unwrap();

    assert_eq!(log.status_of("set-hostname"), Some(&StepStatus::Applied));
    assert_eq!(host.hostname(), "b.example.com");
}

#[tokio::test]
async fn test_missing_unit_file_is_install_error() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.layout.unit_source().delete().await.unwrap();

    let err = install(&host, &host.settings, &domain).await.unwrap_err();

    assert_eq!(err.step_log().unwrap().failed_step(), Some("reconcile-unit"));
    assert_eq!(err.exit_code(), 1);
}
