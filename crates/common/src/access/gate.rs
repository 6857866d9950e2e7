use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

use super::ledger::{LimitedAction, PaymentLedger};
use super::roster::{Role, Roster};
use super::AccessError;

/// Every entry point of a bucket that needs admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    CreateElements,
    UpdateElements,
    RemoveElements,
    UpdateParent,
    SetRedundancy,
    AnnounceHolding,
    AnnounceRemoval,
    RequestData,
    SetKey,
    AddKeys,
    SetMinRedundancy,
    Close,
}

impl Action {
    /// The role an account needs to perform this action
    pub fn required_role(&self) -> Role {
        match self {
            Action::Close => Role::Owner,
            _ => Role::Participant,
        }
    }

    /// The ledger quota this action draws from, if any
    pub fn limited_action(&self) -> Option<LimitedAction> {
        match self {
            Action::CreateElements => Some(LimitedAction::Add),
            Action::UpdateElements | Action::UpdateParent => Some(LimitedAction::Update),
            Action::RemoveElements => Some(LimitedAction::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Policy consulted by a bucket around every mutation.
///
/// `authorize` runs before any validation; `charge` runs after the call has
/// been fully validated and staged, and right before it is committed. If the
/// commit itself fails the bucket calls `refund` with the same arguments.
#[async_trait]
pub trait AccessPolicy: Send + Sync + fmt::Debug + 'static {
    async fn authorize(&self, account: &PublicKey, action: Action) -> Result<(), AccessError>;

    async fn charge(&self, action: Action, units: u64) -> Result<(), AccessError>;

    async fn refund(&self, _action: Action, _units: u64) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Admits every account and never charges
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

#[async_trait]
impl AccessPolicy for Unrestricted {
    async fn authorize(&self, _account: &PublicKey, _action: Action) -> Result<(), AccessError> {
        Ok(())
    }

    async fn charge(&self, _action: Action, _units: u64) -> Result<(), AccessError> {
        Ok(())
    }
}

/// Role check plus quota accounting against external collaborators.
///
/// Quotas are drawn from the bucket's own account, never the sender's, so
/// participants share one budget per bucket.
#[derive(Debug, Clone)]
pub struct RateLimitedAccessGate<R: Roster, P: PaymentLedger> {
    account: PublicKey,
    roster: R,
    ledger: P,
}

impl<R: Roster, P: PaymentLedger> RateLimitedAccessGate<R, P> {
    pub fn new(account: PublicKey, roster: R, ledger: P) -> Self {
        Self {
            account,
            roster,
            ledger,
        }
    }

    pub fn account(&self) -> &PublicKey {
        &self.account
    }

    pub fn roster(&self) -> &R {
        &self.roster
    }

    pub fn ledger(&self) -> &P {
        &self.ledger
    }
}

#[async_trait]
impl<R: Roster, P: PaymentLedger> AccessPolicy for RateLimitedAccessGate<R, P> {
    async fn authorize(&self, account: &PublicKey, action: Action) -> Result<(), AccessError> {
        let role = action.required_role();
        let allowed = self
            .roster
            .has_role(role, account)
            .await
            .map_err(AccessError::Roster)?;
        if !allowed {
            tracing::warn!(account = %account.short(), %action, %role, "rejected: missing role");
            return Err(AccessError::MissingRole {
                account: *account,
                role,
            });
        }
        Ok(())
    }

    async fn charge(&self, action: Action, units: u64) -> Result<(), AccessError> {
        let Some(limited) = action.limited_action() else {
            return Ok(());
        };

        let left = self
            .ledger
            .decrease_limit(&self.account, limited, units)
            .await
            .inspect_err(|e| tracing::warn!(%action, units, "rejected: {}", e))?;

        if let Err(e) = self.ledger.charge_fee(&self.account, limited).await {
            tracing::warn!(%action, units, "fee charge failed, refunding limit: {}", e);
            self.ledger
                .increase_limit(&self.account, limited, units)
                .await?;
            return Err(e);
        }

        tracing::debug!(%action, units, left, "charged bucket quota");
        Ok(())
    }

    async fn refund(&self, action: Action, units: u64) -> Result<(), AccessError> {
        if let Some(limited) = action.limited_action() {
            self.ledger
                .increase_limit(&self.account, limited, units)
                .await?;
        }
        Ok(())
    }
}
