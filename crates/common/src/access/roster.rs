use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// Roles a space grants to its accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Participant,
    Editor,
    Manager,
    Owner,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Participant => write!(f, "PARTICIPANT_ROLE"),
            Role::Editor => write!(f, "EDITOR_ROLE"),
            Role::Manager => write!(f, "MANAGER_ROLE"),
            Role::Owner => write!(f, "OWNER_ROLE"),
            Role::Admin => write!(f, "ADMIN_ROLE"),
        }
    }
}

/// The participant roster of a space.
///  Invitations, sessions and role grants live behind this
///  trait; the bucket only ever asks yes/no questions.
#[async_trait]
pub trait Roster: Send + Sync + fmt::Debug + 'static {
    async fn has_role(&self, role: Role, account: &PublicKey) -> Result<bool, anyhow::Error>;
}
