//! Replay of JSON operation scripts against an in-memory bucket
//!
//! A script names its participants and lists steps. Every name maps to a
//! deterministic identity, so the same script always produces the same
//! element table and history. Listed participants hold the participant role
//! in the bucket's roster, the `owner` (or the first participant) may close
//! it, and any other name acts as an outsider without roles.
//!
//! ```json
//! {
//!   "participants": ["alice", "bob"],
//!   "steps": [
//!     { "op": "set_key", "sender": "alice", "participant": "alice", "key": "k0" },
//!     { "op": "create", "sender": "alice",
//!       "elements": [{ "meta": "m1", "data": "d1", "container": "c1" }] }
//!   ]
//! }
//! ```
//!
//! A failing step is recorded with its error and the replay moves on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use common::access::{
    BlockClock, ManualClock, MemoryPaymentLedger, MemoryRoster, RateLimitedAccessGate, Role,
};
use common::bucket::{
    Bucket, BucketBuilder, BucketError, ContentHash, ContentType, CreateBatch, ElementId,
    ElementRecord, HashTriple, HistoryEntry, RedundancyLevel, RemoveBatch, UpdateBatch,
};
use common::crypto::{KeyHash, PublicKey, SecretKey};
use common::element_store::MemoryElementStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppConfig;

pub type ReplayBucket =
    Bucket<MemoryElementStore, RateLimitedAccessGate<MemoryRoster, MemoryPaymentLedger>>;

pub const DEFAULT_GENESIS: u64 = 1;

const PAGE_SIZE: usize = 256;

fn default_genesis() -> u64 {
    DEFAULT_GENESIS
}

/// Deterministic identity for a script name
pub fn identity(name: &str) -> PublicKey {
    SecretKey::from_seed(name).public()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    pub participants: Vec<String>,
    /// Holder of the owner role; defaults to the first participant
    #[serde(default)]
    pub owner: Option<String>,
    /// Block height the bucket is created at
    #[serde(default = "default_genesis")]
    pub genesis: u64,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    fn owner(&self) -> Option<&String> {
        self.owner.as_ref().or(self.participants.first())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTriple {
    pub meta: ContentHash,
    pub data: ContentHash,
    pub container: ContentHash,
    #[serde(default)]
    pub parent: Option<ElementId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripleUpdate {
    pub prev: HashTriple,
    pub new: HashTriple,
    #[serde(default)]
    pub parent: Option<ElementId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyGrant {
    pub participant: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Move the block clock forward
    Advance { blocks: u64 },
    AddKeys {
        sender: String,
        keys: Vec<KeyGrant>,
    },
    /// Set a key at `height`, or at the current height when omitted
    SetKey {
        sender: String,
        participant: String,
        key: String,
        #[serde(default)]
        height: Option<u64>,
    },
    Create {
        sender: String,
        elements: Vec<NewTriple>,
        #[serde(default)]
        content_type: ContentType,
    },
    Update {
        sender: String,
        elements: Vec<TripleUpdate>,
        #[serde(default)]
        content_type: ContentType,
    },
    Remove {
        sender: String,
        elements: Vec<HashTriple>,
    },
    SetParent {
        sender: String,
        element: ElementId,
        #[serde(default)]
        parent: Option<ElementId>,
    },
    AnnounceHolding {
        sender: String,
        element: ElementId,
    },
    AnnounceRemoval {
        sender: String,
        element: ElementId,
    },
    SetRedundancy {
        sender: String,
        element: ElementId,
        level: RedundancyLevel,
    },
    SetMinRedundancy {
        sender: String,
        level: RedundancyLevel,
    },
    Close {
        sender: String,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Advance { .. } => "advance",
            Step::AddKeys { .. } => "add_keys",
            Step::SetKey { .. } => "set_key",
            Step::Create { .. } => "create",
            Step::Update { .. } => "update",
            Step::Remove { .. } => "remove",
            Step::SetParent { .. } => "set_parent",
            Step::AnnounceHolding { .. } => "announce_holding",
            Step::AnnounceRemoval { .. } => "announce_removal",
            Step::SetRedundancy { .. } => "set_redundancy",
            Step::SetMinRedundancy { .. } => "set_min_redundancy",
            Step::Close { .. } => "close",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    Ok {
        /// Elements allocated by the step, if any
        #[serde(skip_serializing_if = "Vec::is_empty")]
        elements: Vec<ElementId>,
    },
    Failed {
        error: String,
    },
}

impl StepResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepResult::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    /// Block height after the step ran
    pub block_height: u64,
    #[serde(flatten)]
    pub result: StepResult,
}

/// Final state of a replayed bucket
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub bucket: Uuid,
    pub account: PublicKey,
    pub block_height: u64,
    pub closed: bool,
    pub participants: BTreeMap<String, PublicKey>,
    pub steps: Vec<StepOutcome>,
    pub all_elements: Vec<ElementRecord>,
    pub versions: BTreeMap<ContentHash, ContentHash>,
    pub history: Vec<HistoryEntry>,
}

impl Report {
    pub fn to_json(&self) -> Result<String, ReplayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.result.is_ok()).count()
    }

    fn name_of(&self, key: &PublicKey) -> String {
        self.participants
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| key.short())
    }

    fn status_of(&self, hash: &ContentHash) -> &'static str {
        match self.versions.get(hash) {
            None => "live",
            Some(next) if next.is_zero() => "removed",
            Some(_) => "superseded",
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "bucket {} (account {}) at height {}{}",
            self.bucket,
            self.account.short(),
            self.block_height,
            if self.closed { ", closed" } else { "" }
        )?;

        writeln!(f, "steps:")?;
        for step in &self.steps {
            write!(f, "  [{}] {} @{}: ", step.index, step.op, step.block_height)?;
            match &step.result {
                StepResult::Ok { elements } if elements.is_empty() => writeln!(f, "ok")?,
                StepResult::Ok { elements } => {
                    let ids: Vec<String> = elements.iter().map(ToString::to_string).collect();
                    writeln!(f, "ok -> {}", ids.join(" "))?
                }
                StepResult::Failed { error } => writeln!(f, "failed: {}", error)?,
            }
        }

        writeln!(f, "elements:")?;
        for record in &self.all_elements {
            let parent = record
                .parent()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "root".to_string());
            writeln!(
                f,
                "  {} {} {} parent {} next {} redundancy {} holders {} [{}]",
                record.id(),
                record.kind(),
                record.hash(),
                parent,
                record.next(),
                record.redundancy(),
                record.holders_count(),
                self.status_of(record.hash()),
            )?;
        }

        writeln!(f, "versions:")?;
        for (old, new) in &self.versions {
            writeln!(f, "  {} -> {}", old, new)?;
        }

        writeln!(f, "history:")?;
        for (index, entry) in self.history.iter().enumerate() {
            write!(
                f,
                "  [{}] {} {} @{} by {}",
                index,
                entry.element,
                entry.operation,
                entry.block_height,
                self.name_of(&entry.sender)
            )?;
            if let Some(previous) = entry.previous {
                write!(f, " previous {}", previous)?;
            }
            if let Some(parent) = entry.parent {
                write!(f, " parent {}", parent)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid script: {0}")]
    Script(#[from] serde_json::Error),
    #[error("failed to set up bucket: {0}")]
    Bucket(#[from] BucketError),
}

/// Why a single step failed
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Bucket(#[from] BucketError),
    #[error("clock overflow advancing {blocks} blocks from height {height}")]
    ClockOverflow { height: u64, blocks: u64 },
}

/// Drives one script against a fresh bucket
pub struct Replayer {
    bucket: ReplayBucket,
    clock: Arc<ManualClock>,
    participants: BTreeMap<String, PublicKey>,
}

impl Replayer {
    /// Create the bucket for `script`, charged to `account`
    pub async fn new(
        script: &Script,
        account: PublicKey,
        config: &AppConfig,
    ) -> Result<Self, ReplayError> {
        let clock = Arc::new(ManualClock::new(script.genesis));

        let roster = MemoryRoster::new();
        let participants: BTreeMap<String, PublicKey> = script
            .participants
            .iter()
            .map(|name| (name.clone(), identity(name)))
            .collect();
        for key in participants.values() {
            roster.grant(*key, Role::Participant);
        }
        if let Some(owner) = script.owner() {
            roster.grant(identity(owner), Role::Owner);
        }

        let ledger = MemoryPaymentLedger::with_default_limit(config.default_limit);
        let bucket = BucketBuilder::new(
            Uuid::new_v4(),
            MemoryElementStore::new(),
            RateLimitedAccessGate::new(account, roster, ledger),
            clock.clone() as Arc<dyn BlockClock>,
        )
        .config(config.bucket.clone())
        .create(account)
        .await?;

        tracing::info!(
            bucket = %bucket.id(),
            participants = participants.len(),
            genesis = script.genesis,
            "replay bucket created"
        );

        Ok(Self {
            bucket,
            clock,
            participants,
        })
    }

    pub fn bucket(&self) -> &ReplayBucket {
        &self.bucket
    }

    fn key(&self, name: &str) -> PublicKey {
        self.participants
            .get(name)
            .copied()
            .unwrap_or_else(|| identity(name))
    }

    /// Run every step, recording failures instead of stopping
    pub async fn run(&self, steps: &[Step]) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let result = match self.apply(step).await {
                Ok(elements) => StepResult::Ok { elements },
                Err(e) => {
                    tracing::warn!(index, op = step.name(), error = %e, "step failed");
                    StepResult::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(StepOutcome {
                index,
                op: step.name(),
                block_height: self.clock.height(),
                result,
            });
        }
        outcomes
    }

    /// Apply a single step, returning the elements it allocated
    pub async fn apply(&self, step: &Step) -> Result<Vec<ElementId>, StepError> {
        let bucket = &self.bucket;
        match step {
            Step::Advance { blocks } => {
                let height = self.clock.advance(*blocks).ok_or_else(|| StepError::ClockOverflow {
                    height: self.clock.height(),
                    blocks: *blocks,
                })?;
                tracing::debug!(height, "clock advanced");
            }
            Step::AddKeys { sender, keys } => {
                let (participants, hashes): (Vec<_>, Vec<_>) = keys
                    .iter()
                    .map(|grant| (self.key(&grant.participant), KeyHash::new(grant.key.clone())))
                    .unzip();
                bucket.add_keys(&self.key(sender), hashes, participants).await?;
            }
            Step::SetKey {
                sender,
                participant,
                key,
                height,
            } => {
                let height = height.unwrap_or_else(|| self.clock.height());
                bucket
                    .set_key(
                        &self.key(sender),
                        &self.key(participant),
                        KeyHash::new(key.clone()),
                        height,
                    )
                    .await?;
            }
            Step::Create {
                sender,
                elements,
                content_type,
            } => {
                let batch = elements.iter().fold(CreateBatch::new(*content_type), |batch, e| {
                    batch.push(
                        HashTriple::new(e.meta.clone(), e.data.clone(), e.container.clone()),
                        e.parent,
                    )
                });
                return Ok(bucket.create_elements(&self.key(sender), batch).await?);
            }
            Step::Update {
                sender,
                elements,
                content_type,
            } => {
                let batch = elements.iter().fold(UpdateBatch::new(*content_type), |batch, e| {
                    batch.push(e.prev.clone(), e.new.clone(), e.parent)
                });
                return Ok(bucket.update_elements(&self.key(sender), batch).await?);
            }
            Step::Remove { sender, elements } => {
                let batch = RemoveBatch {
                    metas: elements.iter().map(|t| t.meta.clone()).collect(),
                    datas: elements.iter().map(|t| t.data.clone()).collect(),
                    containers: elements.iter().map(|t| t.container.clone()).collect(),
                };
                bucket.remove_elements(&self.key(sender), batch).await?;
            }
            Step::SetParent {
                sender,
                element,
                parent,
            } => {
                bucket
                    .set_element_parent(&self.key(sender), *element, *parent)
                    .await?;
            }
            Step::AnnounceHolding { sender, element } => {
                bucket.announce_holding(&self.key(sender), *element).await?;
            }
            Step::AnnounceRemoval { sender, element } => {
                bucket.announce_removal(&self.key(sender), *element).await?;
            }
            Step::SetRedundancy {
                sender,
                element,
                level,
            } => {
                bucket
                    .set_redundancy_level(&self.key(sender), *element, *level)
                    .await?;
            }
            Step::SetMinRedundancy { sender, level } => {
                bucket
                    .set_min_element_redundancy(&self.key(sender), *level)
                    .await?;
            }
            Step::Close { sender } => {
                bucket.close(&self.key(sender)).await?;
            }
        }
        Ok(Vec::new())
    }

    /// Snapshot the bucket's tables into a report
    pub async fn report(&self, steps: Vec<StepOutcome>) -> Result<Report, ReplayError> {
        let bucket = &self.bucket;

        let mut all_elements = Vec::new();
        loop {
            let page = bucket
                .elements(all_elements.len() as u64, PAGE_SIZE)
                .await?;
            let done = page.len() < PAGE_SIZE;
            all_elements.extend(page);
            if done {
                break;
            }
        }

        let mut history = Vec::new();
        loop {
            let page = bucket.history(history.len() as u64, PAGE_SIZE).await?;
            let done = page.len() < PAGE_SIZE;
            history.extend(page);
            if done {
                break;
            }
        }

        let meta = bucket.meta().await?;
        Ok(Report {
            bucket: bucket.id(),
            account: meta.account,
            block_height: bucket.block_height(),
            closed: meta.closed,
            participants: self.participants.clone(),
            steps,
            all_elements,
            versions: bucket.version_map().await?,
            history,
        })
    }
}

/// Replay `script` against a fresh in-memory bucket
pub async fn replay(
    script: &Script,
    account: PublicKey,
    config: &AppConfig,
) -> Result<Report, ReplayError> {
    let replayer = Replayer::new(script, account, config).await?;
    let steps = replayer.run(&script.steps).await;
    let report = replayer.report(steps).await?;
    tracing::info!(
        steps = report.steps.len(),
        failed = report.failed_steps(),
        elements = report.all_elements.len(),
        "replay finished"
    );
    Ok(report)
}
