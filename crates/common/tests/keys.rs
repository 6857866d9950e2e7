//! Integration tests for the key-epoch directory

mod common;

use ::common::bucket::BucketError;
use ::common::crypto::KeyHash;

#[tokio::test]
async fn test_set_key_bounds() {
    let env = common::setup_test_bucket().await;
    let k = KeyHash::commit(b"bob-0");

    let err = env
        .bucket
        .set_key(&env.alice, &env.bob, k.clone(), common::GENESIS - 1)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::BeforeGenesis { .. }));
    assert!(err.to_string().contains("before genesis"));

    env.bucket
        .set_key(&env.alice, &env.bob, k.clone(), common::GENESIS)
        .await
        .unwrap();

    // same epoch, different height
    let err = env
        .bucket
        .set_key(&env.alice, &env.bob, KeyHash::commit(b"bob-1"), common::GENESIS)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::KeyAlreadyAvailable { epoch: 0, .. }));

    let err = env
        .bucket
        .set_key(&env.alice, &env.bob, k, common::GENESIS + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::InFuture { .. }));
}

#[tokio::test]
async fn test_get_key_has_no_fallback() {
    let env = common::setup_test_bucket().await;

    assert_eq!(
        env.bucket
            .get_key(&env.alice, common::GENESIS + common::EPOCH_SIZE - 1)
            .await
            .unwrap(),
        KeyHash::commit(b"alice-0")
    );

    let err = env
        .bucket
        .get_key(&env.alice, common::GENESIS + common::EPOCH_SIZE)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::NoKeyAvailable { epoch: 1, .. }));

    let err = env
        .bucket
        .get_key(&env.bob, common::GENESIS)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::NoKeyAvailable { epoch: 0, .. }));

    let err = env
        .bucket
        .get_key(&env.alice, common::GENESIS - 1)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::BeforeGenesis { .. }));
}

#[tokio::test]
async fn test_historic_epochs_can_be_filled_later() {
    let env = common::setup_test_bucket().await;
    env.clock.advance(3 * common::EPOCH_SIZE);

    env.bucket
        .set_key(
            &env.alice,
            &env.alice,
            KeyHash::commit(b"alice-2"),
            common::GENESIS + 2 * common::EPOCH_SIZE + 5,
        )
        .await
        .unwrap();
    assert_eq!(
        env.bucket
            .get_key(&env.alice, common::GENESIS + 2 * common::EPOCH_SIZE)
            .await
            .unwrap(),
        KeyHash::commit(b"alice-2")
    );
}

#[tokio::test]
async fn test_add_keys_for_current_epoch() {
    let env = common::setup_test_bucket().await;
    env.clock.advance(common::EPOCH_SIZE + 10);

    let carol = common::key("carol");
    env.bucket
        .add_keys(
            &env.alice,
            vec![KeyHash::commit(b"bob-1"), KeyHash::commit(b"carol-1")],
            vec![env.bob, carol],
        )
        .await
        .unwrap();

    let height = env.bucket.block_height();
    assert_eq!(
        env.bucket.get_key(&carol, height).await.unwrap(),
        KeyHash::commit(b"carol-1")
    );
    assert!(env.bucket.get_key(&carol, common::GENESIS).await.is_err());
}

#[tokio::test]
async fn test_add_keys_input_validation() {
    let env = common::setup_test_bucket().await;

    let err = env
        .bucket
        .add_keys(&env.alice, vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::InvalidKeyInput));

    let err = env
        .bucket
        .add_keys(&env.alice, vec![KeyHash::commit(b"x")], vec![env.bob, env.alice])
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::InvalidKeyInput));
}

#[tokio::test]
async fn test_add_keys_is_atomic() {
    let env = common::setup_test_bucket().await;

    // alice already holds a genesis key, so the whole call is rejected
    let err = env
        .bucket
        .add_keys(
            &env.alice,
            vec![KeyHash::commit(b"bob-0"), KeyHash::commit(b"alice-again")],
            vec![env.bob, env.alice],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::KeyAlreadyAvailable { .. }));
    assert!(env.bucket.get_key(&env.bob, common::GENESIS).await.is_err());
}
