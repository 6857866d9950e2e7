//! Cryptographic primitives for bucket participants
//!
//! - **Identity**: Ed25519 keypairs ([`SecretKey`]/[`PublicKey`]) name every
//!   account that creates, holds, or receives keys for bucket content
//! - **Key commitments**: [`KeyHash`] is the opaque value stored per
//!   participant and epoch in the bucket's key directory
//!
//! Content itself is encrypted and stored elsewhere; nothing in this crate
//! touches plaintext or key material beyond deriving commitments.

mod commitment;
mod keys;

pub use commitment::{KeyHash, BLAKE3_HASH_SIZE};
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
