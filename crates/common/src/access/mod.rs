//! Admission control for bucket mutations
//!
//! The bucket core never decides on its own who may write or how often.
//! Every mutating entry point asks an injected [`AccessPolicy`] first:
//!
//! - **[`Roster`]**: who holds which [`Role`] in the space
//! - **[`PaymentLedger`]**: per-account limits and fees for [`LimitedAction`]s
//! - **[`RateLimitedAccessGate`]**: the production policy combining both
//! - **[`Unrestricted`]**: admits everything, for exercising invariants alone
//!
//! [`BlockClock`] supplies the ledger height that stamps history entries and
//! bounds key epochs.

mod clock;
mod gate;
mod ledger;
mod memory;
mod roster;

pub use clock::{BlockClock, ManualClock};
pub use gate::{AccessPolicy, Action, RateLimitedAccessGate, Unrestricted};
pub use ledger::{LimitedAction, PaymentLedger};
pub use memory::{MemoryPaymentLedger, MemoryRoster, DEFAULT_LIMIT};
pub use roster::{Role, Roster};

use crate::crypto::PublicKey;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("account {account} is missing role {role}")]
    MissingRole { account: PublicKey, role: Role },
    #[error("limit depleted for {action}: requested {requested}, remaining {remaining}")]
    LimitDepleted {
        action: LimitedAction,
        requested: u64,
        remaining: u64,
    },
    #[error("roster error: {0}")]
    Roster(anyhow::Error),
    #[error("payment ledger error: {0}")]
    Ledger(anyhow::Error),
}
