//! Types and primitives shared by every Aurora chat crate: participant
//! identities, the pairwise conversation key, the message cipher and the
//! JSON frames exchanged with the backend.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod protocol;

pub use crypto::SharedKey;
pub use identity::Identity;
