//! Status report after deploys

use redeploy::app::status::collect;
use redeploy::deploy::checkout::checkout;
use redeploy::deploy::fsm::BinaryState;
use redeploy::utils::sha256_hash;

use crate::support::{branch, target, FakeHost};

#[tokio::test]
async fn test_status_after_two_deploys() {
    let host = FakeHost::new();
    let domain = target("bot.example.com");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();
    host.push("main", "c2");
    checkout(&host, &host.settings, &branch("main"), &domain)
        .await
        .unwrap();

    let report = collect(&host.settings).await.unwrap();

    assert_eq!(report.service, "cratebot");
    assert_eq!(report.binary_state, BinaryState::BackedUpInstalled);
    assert_eq!(report.binary_sha256, Some(sha256_hash(b"build of c2")));
    assert_eq!(report.backup_sha256, Some(sha256_hash(b"build of c1")));
    assert!(report.clone_present);
    assert!(report.toolchain_present);
    assert!(report.unit_installed);
}
