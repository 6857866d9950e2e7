//! Integration tests for element updates and version chains

mod common;

use ::common::bucket::{
    BucketError, ContentHash, ContentType, CreateBatch, ElementId, ElementKind, ElementStatus,
    HashTriple, Operation, RemoveBatch, UpdateBatch,
};

async fn create(env: &common::TestEnv<common::TestBucket>, n: u32, parent: Option<ElementId>) {
    env.bucket
        .create_elements(
            &env.alice,
            CreateBatch::single(common::triple(n), parent, ContentType(0)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_update_supersedes_once() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;

    let ids = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(1), common::triple(2), None, ContentType(0)),
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![ElementId(3), ElementId(4), ElementId(5)]);

    assert_eq!(
        env.bucket.version_of(&ContentHash::new("m1")).await.unwrap(),
        Some(ContentHash::new("m2"))
    );
    assert_eq!(
        env.bucket.version_of(&ContentHash::new("c1")).await.unwrap(),
        Some(ContentHash::new("c2"))
    );

    // a second update of the same version is rejected
    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(1), common::triple(3), None, ContentType(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::AlreadySuperseded {
            kind: ElementKind::Meta,
            ..
        }
    ));
    assert!(err.to_string().contains("already superseded"));
    assert_eq!(env.bucket.element_count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_update_links_versions_and_history() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;
    env.bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(1), common::triple(2), None, ContentType(0)),
        )
        .await
        .unwrap();

    let old = env.bucket.element(ElementId(0)).await.unwrap().unwrap();
    let new = env.bucket.element(ElementId(3)).await.unwrap().unwrap();
    assert_eq!(old.next(), ElementId(3));
    assert!(!old.is_terminal());
    assert_eq!(new.previous(), Some(ElementId(0)));
    assert!(new.is_terminal());
    assert_eq!(new.parent(), Some(ElementId(5)));

    assert_eq!(
        env.bucket.status(ElementId(0)).await.unwrap(),
        ElementStatus::Superseded(ContentHash::new("m2"))
    );
    assert_eq!(env.bucket.status(ElementId(3)).await.unwrap(), ElementStatus::Live);

    let history = env.bucket.history(3, 10).await.unwrap();
    let ops: Vec<_> = history.iter().map(|e| (e.element, e.operation)).collect();
    assert_eq!(
        ops,
        vec![
            (ElementId(3), Operation::Create),
            (ElementId(3), Operation::Update),
            (ElementId(4), Operation::Create),
            (ElementId(4), Operation::Update),
            (ElementId(5), Operation::Create),
            (ElementId(5), Operation::Update),
        ]
    );
    assert_eq!(history[1].previous, Some(ElementId(0)));

    assert_eq!(
        env.bucket.children_of(ElementId(5)).await.unwrap(),
        vec![ElementId(3), ElementId(4)]
    );
}

#[tokio::test]
async fn test_unchanged_hash_keeps_record() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;

    let ids = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(1),
                HashTriple::new("m1", "d2", "c1"),
                None,
                ContentType(0),
            ),
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![ElementId(3)]);
    assert_eq!(env.bucket.element_count().await.unwrap(), 4);
    assert_eq!(env.bucket.version_of(&ContentHash::new("m1")).await.unwrap(), None);

    // carried-over records now belong to the new triple
    let meta = env.bucket.element(ElementId(0)).await.unwrap().unwrap();
    assert_eq!(meta.triple(), &HashTriple::new("m1", "d2", "c1"));
    assert_eq!(
        env.bucket.live_children(ElementId(2)).await.unwrap(),
        vec![ElementId(0), ElementId(3)]
    );

    // so an instance update starts from the refreshed triple
    let handle = env.bucket.handle(ElementId(0)).await.unwrap();
    handle
        .update(&env.alice, HashTriple::new("m3", "d2", "c1"), None)
        .await
        .unwrap();
    assert_eq!(
        env.bucket.version_of(&ContentHash::new("m1")).await.unwrap(),
        Some(ContentHash::new("m3"))
    );
}

#[tokio::test]
async fn test_identical_triple_is_noop() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;

    let ids = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(1), common::triple(1), None, ContentType(0)),
        )
        .await
        .unwrap();
    assert!(ids.is_empty());
    assert_eq!(env.bucket.history_len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_new_version_cannot_reuse_old_hash() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;
    env.bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(1), common::triple(2), None, ContentType(0)),
        )
        .await
        .unwrap();

    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(2),
                HashTriple::new("m1", "d3", "c3"),
                None,
                ContentType(0),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::CollidesWithOlderVersion {
            kind: ElementKind::Meta,
            ..
        }
    ));
}

#[tokio::test]
async fn test_new_version_cannot_reuse_live_hash() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;
    create(&env, 2, None).await;

    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(1),
                HashTriple::new("m3", "d2", "c3"),
                None,
                ContentType(0),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::HashExists {
            kind: ElementKind::Data,
            ..
        }
    ));
    // m3 was staged before the data collision and must not leak
    assert!(!env.bucket.hash_exists(&ContentHash::new("m3")).await.unwrap());
}

#[tokio::test]
async fn test_update_checks_relationships() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;
    create(&env, 2, Some(ElementId(2))).await;

    // m1 belongs to c1, not c2
    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                HashTriple::new("m1", "d2", "c2"),
                common::triple(3),
                Some(ElementId(2)),
                ContentType(0),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::NotChildOfParent {
            kind: ElementKind::Meta,
            ..
        }
    ));

    // c2 is not a root
    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(2), common::triple(3), None, ContentType(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::NotChildOfParent {
            kind: ElementKind::Container,
            ..
        }
    ));

    // c1 is a root
    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(1),
                common::triple(3),
                Some(ElementId(5)),
                ContentType(0),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::NotChildOfParent { .. }));

    env.bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(2),
                common::triple(3),
                Some(ElementId(2)),
                ContentType(0),
            ),
        )
        .await
        .unwrap();
    let container = env.bucket.element(ElementId(8)).await.unwrap().unwrap();
    assert_eq!(container.parent(), Some(ElementId(2)));
    assert_eq!(
        env.bucket.live_children(ElementId(2)).await.unwrap(),
        vec![ElementId(0), ElementId(1), ElementId(8)]
    );
}

#[tokio::test]
async fn test_replacing_container_repoints_children() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;
    create(&env, 2, Some(ElementId(2))).await;

    let ids = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(1),
                HashTriple::new("m1", "d1", "c9"),
                None,
                ContentType(0),
            ),
        )
        .await
        .unwrap();
    assert_eq!(ids, vec![ElementId(6)]);

    assert_eq!(
        env.bucket.children_of(ElementId(6)).await.unwrap(),
        vec![ElementId(0), ElementId(1), ElementId(5)]
    );
    assert!(env.bucket.live_children(ElementId(2)).await.unwrap().is_empty());
    for id in [0, 1, 5] {
        let record = env.bucket.element(ElementId(id)).await.unwrap().unwrap();
        assert_eq!(record.parent(), Some(ElementId(6)));
    }

    let history = env.bucket.history(6, 10).await.unwrap();
    let ops: Vec<_> = history.iter().map(|e| (e.element, e.operation)).collect();
    assert_eq!(
        ops,
        vec![
            (ElementId(6), Operation::Create),
            (ElementId(6), Operation::Update),
            (ElementId(0), Operation::UpdateParent),
            (ElementId(1), Operation::UpdateParent),
            (ElementId(5), Operation::UpdateParent),
        ]
    );
    assert_eq!(history[4].parent, Some(ElementId(6)));

    // the child triple is now updated under the successor container
    env.bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                common::triple(2),
                common::triple(3),
                Some(ElementId(6)),
                ContentType(0),
            ),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_version_chain_terminates() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;
    for n in 1..4 {
        env.bucket
            .update_elements(
                &env.alice,
                UpdateBatch::single(
                    common::triple(n),
                    common::triple(n + 1),
                    None,
                    ContentType(0),
                ),
            )
            .await
            .unwrap();
    }

    assert_eq!(
        env.bucket
            .latest_version(&ContentHash::new("m1"))
            .await
            .unwrap(),
        Some(ContentHash::new("m4"))
    );

    env.bucket
        .remove_elements(&env.alice, RemoveBatch::single(common::triple(4)))
        .await
        .unwrap();
    assert_eq!(
        env.bucket
            .latest_version(&ContentHash::new("d1"))
            .await
            .unwrap(),
        Some(ContentHash::zero())
    );
    assert_eq!(
        env.bucket
            .latest_version(&ContentHash::new("unknown"))
            .await
            .unwrap(),
        None
    );

    let versions = env.bucket.version_map().await.unwrap();
    assert_eq!(versions.len(), 12);
    assert_eq!(versions[&ContentHash::new("m4")], ContentHash::zero());
}

#[tokio::test]
async fn test_update_unknown_previous_not_found() {
    let env = common::setup_test_bucket().await;
    create(&env, 1, None).await;

    // d1 exists but is not a meta
    let err = env
        .bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(
                HashTriple::new("d1", "d1", "c1"),
                common::triple(2),
                None,
                ContentType(0),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::NotFound {
            kind: ElementKind::Meta,
            ..
        }
    ));
}

#[tokio::test]
async fn test_update_workload_ceiling_rejects_whole_batch() {
    let env = common::setup_test_bucket().await;
    for chunk in [0..31, 31..62] {
        let batch = chunk.fold(CreateBatch::new(ContentType(0)), |batch, n| {
            batch.push(common::triple(n), None)
        });
        env.bucket.create_elements(&env.alice, batch).await.unwrap();
    }
    env.bucket
        .update_elements(
            &env.alice,
            UpdateBatch::single(common::triple(61), common::triple(200), None, ContentType(0)),
        )
        .await
        .unwrap();

    let count = env.bucket.element_count().await.unwrap();
    let history = env.bucket.history_len().await.unwrap();
    let versions = env.bucket.version_map().await.unwrap();

    let batch = (0..61).fold(UpdateBatch::new(ContentType(0)), |batch, n| {
        batch.push(common::triple(n), common::triple(1_000 + n), None)
    });
    let err = env
        .bucket
        .update_elements(&env.alice, batch)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BucketError::WorkloadExceeded {
            requested: 61,
            ceiling: 60
        }
    ));

    assert_eq!(env.bucket.element_count().await.unwrap(), count);
    assert_eq!(env.bucket.history_len().await.unwrap(), history);
    assert_eq!(env.bucket.version_map().await.unwrap(), versions);
    assert_eq!(
        env.bucket.version_of(&ContentHash::new("m0")).await.unwrap(),
        None
    );
}
