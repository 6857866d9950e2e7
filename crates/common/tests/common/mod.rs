//! Shared test utilities for bucket integration tests
#![allow(dead_code)]

use std::sync::Arc;

use common::access::{
    BlockClock, ManualClock, MemoryPaymentLedger, MemoryRoster, RateLimitedAccessGate, Role,
    Unrestricted,
};
use common::bucket::{Bucket, BucketBuilder, BucketConfig, HashTriple};
use common::crypto::{KeyHash, PublicKey, SecretKey};
use common::element_store::MemoryElementStore;
use uuid::Uuid;

pub const GENESIS: u64 = 1_000;
pub const EPOCH_SIZE: u64 = 100;
pub const WORKLOAD_CEILING: usize = 60;

pub type TestBucket = Bucket<MemoryElementStore, Unrestricted>;
pub type GatedBucket =
    Bucket<MemoryElementStore, RateLimitedAccessGate<MemoryRoster, MemoryPaymentLedger>>;

pub struct TestEnv<B> {
    pub bucket: B,
    pub clock: Arc<ManualClock>,
    /// Participant with a key for the genesis epoch
    pub alice: PublicKey,
    /// Participant without any key
    pub bob: PublicKey,
    /// The bucket's payment account
    pub account: PublicKey,
}

pub fn key(seed: &str) -> PublicKey {
    SecretKey::from_seed(seed).public()
}

pub fn triple(n: u32) -> HashTriple {
    HashTriple::new(format!("m{n}"), format!("d{n}"), format!("c{n}"))
}

pub fn config() -> BucketConfig {
    BucketConfig {
        workload_ceiling: WORKLOAD_CEILING,
        epoch_size: EPOCH_SIZE,
        ..Default::default()
    }
}

/// Set up an unrestricted bucket at genesis with a key for alice
pub async fn setup_test_bucket() -> TestEnv<TestBucket> {
    let clock = Arc::new(ManualClock::new(GENESIS));
    let account = key("bucket");
    let bucket = BucketBuilder::new(
        Uuid::new_v4(),
        MemoryElementStore::new(),
        Unrestricted,
        clock.clone() as Arc<dyn BlockClock>,
    )
    .config(config())
    .create(account)
    .await
    .unwrap();

    let alice = key("alice");
    bucket
        .set_key(&alice, &alice, KeyHash::commit(b"alice-0"), GENESIS)
        .await
        .unwrap();

    TestEnv {
        bucket,
        clock,
        alice,
        bob: key("bob"),
        account,
    }
}

/// Set up a bucket behind the rate limited gate.
///
/// alice is a participant with a key, bob holds no role, and the owner
/// may close the bucket.
pub async fn setup_gated_bucket(limit: u64) -> (TestEnv<GatedBucket>, PublicKey) {
    let clock = Arc::new(ManualClock::new(GENESIS));
    let account = key("bucket");
    let alice = key("alice");
    let owner = key("owner");

    let roster = MemoryRoster::new();
    roster.grant(alice, Role::Participant);
    roster.grant(owner, Role::Participant);
    roster.grant(owner, Role::Owner);
    let ledger = MemoryPaymentLedger::with_default_limit(limit);

    let bucket = BucketBuilder::new(
        Uuid::new_v4(),
        MemoryElementStore::new(),
        RateLimitedAccessGate::new(account, roster, ledger),
        clock.clone() as Arc<dyn BlockClock>,
    )
    .config(config())
    .create(account)
    .await
    .unwrap();

    bucket
        .set_key(&alice, &alice, KeyHash::commit(b"alice-0"), GENESIS)
        .await
        .unwrap();

    (
        TestEnv {
            bucket,
            clock,
            alice,
            bob: key("bob"),
            account,
        },
        owner,
    )
}
