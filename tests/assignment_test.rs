// Integration tests for the key assignment state machine: the
// status/assignment-link invariant, idempotent revocation, the concurrent
// assign race and the inventory read paths.

use vaultkey::models::KeyFilter;
use vaultkey::storage::KeyRepository;
use vaultkey::testing::{SoftwareAuthenticator, TestHarness};
use vaultkey::{
    AssignmentStatus, AuditAction, AuthenticatedCaller, Credential, Error, KeyStatus, Role,
};

/// Register a key for `user_id` through the real ceremony
async fn register(harness: &TestHarness, user_id: &str) -> Credential {
    let user = TestHarness::user(user_id);
    let options = harness.engine.begin_registration(&user).await.unwrap();
    let authenticator = SoftwareAuthenticator::new();
    let response =
        authenticator.attestation_response(&options.challenge, harness.origin(), harness.rp_id());
    harness
        .engine
        .complete_registration(&response, user_id)
        .await
        .unwrap()
}

async fn stored(harness: &TestHarness, key_id: &str) -> Credential {
    harness
        .repository
        .credential(key_id)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn revoke_releases_the_key_and_closes_the_assignment() {
    let harness = TestHarness::new();
    let credential = register(&harness, "user-1").await;
    assert_eq!(credential.status, KeyStatus::Assigned);

    let revoked = harness
        .keys
        .revoke_key(&credential.id, "admin-1")
        .await
        .unwrap();
    assert_eq!(revoked.status, AssignmentStatus::Revoked);
    assert_eq!(revoked.revoked_by.as_deref(), Some("admin-1"));
    assert!(revoked.revoked_at.is_some());

    let credential = stored(&harness, &credential.id).await;
    assert_eq!(credential.status, KeyStatus::Available);
    assert!(credential.current_assignment_id.is_none());
    assert!(credential.user_handle.is_none());
    assert_eq!(credential.revoked_by.as_deref(), Some("admin-1"));
    assert!(credential.assignment_link_consistent());
}

#[tokio::test]
async fn revoke_without_active_assignment_is_rejected_and_mutates_nothing() {
    let harness = TestHarness::new();
    let credential = register(&harness, "user-1").await;
    harness
        .keys
        .revoke_key(&credential.id, "admin-1")
        .await
        .unwrap();
    let before = stored(&harness, &credential.id).await;

    let err = harness
        .keys
        .revoke_key(&credential.id, "admin-2")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotAssigned));

    let after = stored(&harness, &credential.id).await;
    assert_eq!(after.version, before.version);
    assert_eq!(after.revoked_by.as_deref(), Some("admin-1"));
}

#[tokio::test]
async fn revoking_an_unknown_key_is_not_found() {
    let harness = TestHarness::new();
    let err = harness
        .keys
        .revoke_key("no-such-key", "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CredentialNotFound));
}

#[tokio::test]
async fn reassignment_appends_to_the_ledger() {
    let harness = TestHarness::new();
    let credential = register(&harness, "user-1").await;
    harness
        .keys
        .revoke_key(&credential.id, "admin-1")
        .await
        .unwrap();

    let admin = AuthenticatedCaller::new("admin-1", Role::Admin);
    let assignment = harness
        .keys
        .assign_key_for(&credential.id, "user-2", &admin)
        .await
        .unwrap();
    assert_eq!(assignment.user_ref, "user-2");
    assert_eq!(assignment.assigned_by, "admin-1");

    let credential = stored(&harness, &credential.id).await;
    assert_eq!(credential.status, KeyStatus::Assigned);
    assert_eq!(
        credential.current_assignment_id.as_deref(),
        Some(assignment.id.as_str())
    );
    assert!(credential.assignment_link_consistent());

    let details = harness.keys.key_details(&credential.id).await.unwrap();
    assert_eq!(details.history.len(), 2);
    assert_eq!(details.history[0].id, assignment.id);
    assert_eq!(
        details.current_assignment.as_ref().map(|a| a.id.as_str()),
        Some(assignment.id.as_str())
    );

    // Assigning an already assigned key is a conflict
    let err = harness
        .keys
        .assign_key(&credential.id, "user-3", "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::KeyNotAvailable));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_assigns_produce_exactly_one_winner() {
    let harness = TestHarness::new();
    let credential = register(&harness, "user-1").await;
    harness
        .keys
        .revoke_key(&credential.id, "admin-1")
        .await
        .unwrap();

    let keys_a = harness.keys.clone();
    let keys_b = harness.keys.clone();
    let key_id_a = credential.id.clone();
    let key_id_b = credential.id.clone();

    let task_a =
        tokio::spawn(async move { keys_a.assign_key(&key_id_a, "user-a", "admin-1").await });
    let task_b =
        tokio::spawn(async move { keys_b.assign_key(&key_id_b, "user-b", "admin-2").await });

    let result_a = task_a.await.unwrap();
    let result_b = task_b.await.unwrap();

    let successes = [&result_a, &result_b]
        .iter()
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(successes, 1);
    let loser = if result_a.is_err() { result_a } else { result_b };
    assert!(matches!(loser.unwrap_err(), Error::KeyNotAvailable));

    // Exactly one Active assignment exists for the key
    let history = harness
        .repository
        .assignments_for_key(&credential.id)
        .await
        .unwrap();
    let active = history.iter().filter(|a| a.is_active()).count();
    assert_eq!(active, 1);

    let credential = stored(&harness, &credential.id).await;
    assert_eq!(credential.status, KeyStatus::Assigned);
    assert!(credential.assignment_link_consistent());
}

#[tokio::test]
async fn search_count_and_inventory_reflect_assignments() {
    let harness = TestHarness::new();
    let first = register(&harness, "user-1").await;
    let second = register(&harness, "user-2").await;
    harness
        .keys
        .revoke_key(&second.id, "admin-1")
        .await
        .unwrap();

    let all = harness.keys.search_keys(&KeyFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let assigned = harness
        .keys
        .search_keys(&KeyFilter {
            status: Some(KeyStatus::Assigned),
            ..KeyFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id, first.id);

    let by_serial = harness
        .keys
        .search_keys(&KeyFilter {
            search: Some(first.serial_number.to_lowercase()),
            ..KeyFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_serial.len(), 1);
    assert_eq!(by_serial[0].id, first.id);

    assert_eq!(
        harness
            .keys
            .count_keys(&KeyFilter {
                status: Some(KeyStatus::Available),
                ..KeyFilter::default()
            })
            .await
            .unwrap(),
        1
    );

    let report = harness.keys.inventory_report().await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.assigned, 1);
    assert_eq!(report.available, 1);
}

#[tokio::test]
async fn assignment_operations_leave_an_audit_trail() {
    let harness = TestHarness::new();
    let credential = register(&harness, "user-1").await;
    harness
        .keys
        .revoke_key(&credential.id, "admin-1")
        .await
        .unwrap();
    harness
        .keys
        .assign_key(&credential.id, "user-2", "admin-1")
        .await
        .unwrap();

    let actions = harness.audit.actions();
    assert_eq!(
        actions,
        vec![
            AuditAction::KeyRegistered,
            AuditAction::KeyAssigned,
            AuditAction::KeyRevoked,
            AuditAction::KeyAssigned,
        ]
    );

    let revoked = harness
        .audit
        .records()
        .into_iter()
        .find(|record| record.action == AuditAction::KeyRevoked)
        .unwrap();
    assert_eq!(revoked.performed_by, "admin-1");
    assert_eq!(revoked.details["keyId"], credential.id.as_str());
}
