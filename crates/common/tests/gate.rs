//! Integration tests for a bucket behind the rate limited gate

mod common;

use ::common::access::{AccessError, LimitedAction, PaymentLedger, Role};
use ::common::bucket::{BucketError, ContentType, CreateBatch, ElementId, RemoveBatch};
use ::common::crypto::KeyHash;

#[tokio::test]
async fn test_missing_role_rejected() {
    let (env, _) = common::setup_gated_bucket(100).await;

    let err = env
        .bucket
        .create_elements(
            &env.bob,
            CreateBatch::single(common::triple(1), None, ContentType(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::Access(AccessError::MissingRole {
            role: Role::Participant,
            ..
        })
    ));
    assert!(err.to_string().contains("is missing role"));
}

#[tokio::test]
async fn test_close_requires_owner() {
    let (env, owner) = common::setup_gated_bucket(100).await;

    let err = env.bucket.close(&env.alice).await.unwrap_err();
    assert!(matches!(
        err,
        BucketError::Access(AccessError::MissingRole {
            role: Role::Owner,
            ..
        })
    ));

    env.bucket.close(&owner).await.unwrap();
    assert!(env.bucket.is_closed().await.unwrap());
}

#[tokio::test]
async fn test_batches_charge_bucket_account() {
    let (env, _) = common::setup_gated_bucket(5).await;
    let ledger = env.bucket.policy().ledger();

    let batch = CreateBatch::new(ContentType(0))
        .push(common::triple(1), None)
        .push(common::triple(2), None)
        .push(common::triple(3), None);
    env.bucket.create_elements(&env.alice, batch).await.unwrap();

    assert_eq!(ledger.limit(&env.account, LimitedAction::Add).await.unwrap(), 2);
    assert_eq!(ledger.fees_charged(&env.account, LimitedAction::Add), 1);
    // the sender's own quota is untouched
    assert_eq!(ledger.limit(&env.alice, LimitedAction::Add).await.unwrap(), 5);

    let batch = CreateBatch::new(ContentType(0))
        .push(common::triple(4), None)
        .push(common::triple(5), None)
        .push(common::triple(6), None);
    let err = env
        .bucket
        .create_elements(&env.alice, batch)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::Access(AccessError::LimitDepleted {
            requested: 3,
            remaining: 2,
            ..
        })
    ));
    assert_eq!(env.bucket.element_count().await.unwrap(), 9);
    assert_eq!(ledger.limit(&env.account, LimitedAction::Add).await.unwrap(), 2);
}

#[tokio::test]
async fn test_rejected_call_is_not_charged() {
    let (env, _) = common::setup_gated_bucket(5).await;
    let ledger = env.bucket.policy().ledger();

    env.bucket
        .create_elements(
            &env.alice,
            CreateBatch::single(common::triple(1), None, ContentType(0)),
        )
        .await
        .unwrap();
    let err = env
        .bucket
        .create_elements(
            &env.alice,
            CreateBatch::single(common::triple(1), None, ContentType(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::HashExists { .. }));

    assert_eq!(ledger.limit(&env.account, LimitedAction::Add).await.unwrap(), 4);
    assert_eq!(ledger.fees_charged(&env.account, LimitedAction::Add), 1);
}

#[tokio::test]
async fn test_remove_and_reparent_draw_own_quotas() {
    let (env, _) = common::setup_gated_bucket(5).await;
    let ledger = env.bucket.policy().ledger();

    let batch = CreateBatch::new(ContentType(0))
        .push(common::triple(1), None)
        .push(common::triple(2), None);
    env.bucket.create_elements(&env.alice, batch).await.unwrap();

    env.bucket
        .set_element_parent(&env.alice, ElementId(5), Some(ElementId(2)))
        .await
        .unwrap();
    env.bucket
        .set_element_parent(&env.alice, ElementId(5), None)
        .await
        .unwrap();
    env.bucket
        .remove_elements(&env.alice, RemoveBatch::single(common::triple(2)))
        .await
        .unwrap();

    assert_eq!(ledger.limit(&env.account, LimitedAction::Add).await.unwrap(), 3);
    assert_eq!(ledger.limit(&env.account, LimitedAction::Update).await.unwrap(), 3);
    assert_eq!(ledger.limit(&env.account, LimitedAction::Remove).await.unwrap(), 4);
}

#[tokio::test]
async fn test_unlimited_actions_need_role_only() {
    let (env, _) = common::setup_gated_bucket(0).await;

    let err = env
        .bucket
        .create_elements(
            &env.alice,
            CreateBatch::single(common::triple(1), None, ContentType(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::Access(AccessError::LimitDepleted { .. })
    ));

    // keys are not metered
    env.bucket
        .add_keys(&env.alice, vec![KeyHash::commit(b"bob-0")], vec![env.bob])
        .await
        .unwrap();

    // but still need a role
    let err = env
        .bucket
        .add_keys(&env.bob, vec![KeyHash::commit(b"carol-0")], vec![common::key("carol")])
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::Access(AccessError::MissingRole { .. })));
}
