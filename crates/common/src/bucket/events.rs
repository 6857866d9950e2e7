use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

use super::types::{ElementId, HistoryEntry};

/// Notifications for off-ledger indexers.
///
/// Published only after a call has committed. `history` remains the source of
/// truth; a lagging receiver can always catch up from there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BucketEvent {
    Recorded(HistoryEntry),
    DataRequested {
        element: ElementId,
        requestor: PublicKey,
        block_height: u64,
    },
}
