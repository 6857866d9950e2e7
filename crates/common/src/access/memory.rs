use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::crypto::PublicKey;

use super::ledger::{LimitedAction, PaymentLedger};
use super::roster::{Role, Roster};
use super::AccessError;

/// Quota every account starts with for each limited action
pub const DEFAULT_LIMIT: u64 = 100;

// A poisoned lock only means another holder panicked mid-write; the maps
// themselves stay consistent because every write is a single insert/remove.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// In-memory roster backed by a role set per account
#[derive(Debug, Clone, Default)]
pub struct MemoryRoster {
    inner: Arc<RwLock<HashMap<PublicKey, HashSet<Role>>>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, account: PublicKey, role: Role) {
        write(&self.inner).entry(account).or_default().insert(role);
    }

    pub fn revoke(&self, account: &PublicKey, role: Role) {
        let mut inner = write(&self.inner);
        if let Some(roles) = inner.get_mut(account) {
            roles.remove(&role);
            if roles.is_empty() {
                inner.remove(account);
            }
        }
    }

    pub fn roles(&self, account: &PublicKey) -> HashSet<Role> {
        read(&self.inner).get(account).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Roster for MemoryRoster {
    async fn has_role(&self, role: Role, account: &PublicKey) -> Result<bool, anyhow::Error> {
        Ok(read(&self.inner)
            .get(account)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false))
    }
}

/// In-memory payment ledger.
///
/// Accounts start with `default_limit` for every [`LimitedAction`]; an
/// account/action pair can be unleashed to skip quota accounting entirely.
/// Fees are only counted, never priced.
#[derive(Debug, Clone)]
pub struct MemoryPaymentLedger {
    default_limit: u64,
    inner: Arc<RwLock<MemoryPaymentLedgerInner>>,
}

#[derive(Debug, Default)]
struct MemoryPaymentLedgerInner {
    limits: HashMap<(PublicKey, LimitedAction), u64>,
    unleashed: HashSet<(PublicKey, LimitedAction)>,
    fees: HashMap<(PublicKey, LimitedAction), u64>,
}

impl Default for MemoryPaymentLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPaymentLedger {
    pub fn new() -> Self {
        Self::with_default_limit(DEFAULT_LIMIT)
    }

    pub fn with_default_limit(default_limit: u64) -> Self {
        Self {
            default_limit,
            inner: Arc::new(RwLock::new(MemoryPaymentLedgerInner::default())),
        }
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Overwrite the remaining quota for an account
    pub fn set_limit(&self, account: PublicKey, action: LimitedAction, limit: u64) {
        write(&self.inner).limits.insert((account, action), limit);
    }

    /// Stop accounting quota for `action` on `account`
    pub fn unleash(&self, account: PublicKey, action: LimitedAction) {
        write(&self.inner).unleashed.insert((account, action));
    }

    /// Number of fees charged so far
    pub fn fees_charged(&self, account: &PublicKey, action: LimitedAction) -> u64 {
        read(&self.inner)
            .fees
            .get(&(*account, action))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl PaymentLedger for MemoryPaymentLedger {
    async fn limit(&self, account: &PublicKey, action: LimitedAction) -> Result<u64, AccessError> {
        let inner = read(&self.inner);
        if inner.unleashed.contains(&(*account, action)) {
            return Ok(u64::MAX);
        }
        Ok(inner
            .limits
            .get(&(*account, action))
            .copied()
            .unwrap_or(self.default_limit))
    }

    async fn decrease_limit(
        &self,
        account: &PublicKey,
        action: LimitedAction,
        amount: u64,
    ) -> Result<u64, AccessError> {
        let mut inner = write(&self.inner);
        if inner.unleashed.contains(&(*account, action)) {
            return Ok(u64::MAX);
        }

        let remaining = inner
            .limits
            .get(&(*account, action))
            .copied()
            .unwrap_or(self.default_limit);
        if remaining < amount {
            return Err(AccessError::LimitDepleted {
                action,
                requested: amount,
                remaining,
            });
        }

        let left = remaining - amount;
        inner.limits.insert((*account, action), left);
        Ok(left)
    }

    async fn increase_limit(
        &self,
        account: &PublicKey,
        action: LimitedAction,
        amount: u64,
    ) -> Result<u64, AccessError> {
        let mut inner = write(&self.inner);
        if inner.unleashed.contains(&(*account, action)) {
            return Ok(u64::MAX);
        }

        let current = inner
            .limits
            .get(&(*account, action))
            .copied()
            .unwrap_or(self.default_limit);
        let total = current.saturating_add(amount);
        inner.limits.insert((*account, action), total);
        Ok(total)
    }

    async fn charge_fee(
        &self,
        account: &PublicKey,
        action: LimitedAction,
    ) -> Result<(), AccessError> {
        *write(&self.inner).fees.entry((*account, action)).or_insert(0) += 1;
        Ok(())
    }
}
