use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

use super::AccessError;

/// Actions whose frequency is capped by the payment ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LimitedAction {
    Add,
    Update,
    Remove,
}

impl fmt::Display for LimitedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitedAction::Add => write!(f, "add"),
            LimitedAction::Update => write!(f, "update"),
            LimitedAction::Remove => write!(f, "remove"),
        }
    }
}

/// Fee and quota accounting for an account.
///
/// Implementations must make `decrease_limit` all-or-nothing: when the
/// remaining quota is smaller than `amount` nothing is deducted and
/// [`AccessError::LimitDepleted`] is returned.
#[async_trait]
pub trait PaymentLedger: Send + Sync + fmt::Debug + 'static {
    /// Remaining quota for `action`
    async fn limit(&self, account: &PublicKey, action: LimitedAction) -> Result<u64, AccessError>;

    /// Deduct `amount` from the quota, returning what is left over
    async fn decrease_limit(
        &self,
        account: &PublicKey,
        action: LimitedAction,
        amount: u64,
    ) -> Result<u64, AccessError>;

    /// Credit `amount` back to the quota, returning the new total
    async fn increase_limit(
        &self,
        account: &PublicKey,
        action: LimitedAction,
        amount: u64,
    ) -> Result<u64, AccessError>;

    /// Charge the fee for one call of `action`
    async fn charge_fee(&self, account: &PublicKey, action: LimitedAction)
        -> Result<(), AccessError>;
}
