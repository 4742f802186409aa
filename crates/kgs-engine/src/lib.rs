//! kgs-engine: drives one access attempt end to end
//!
//! Encryption-time flow: file → KDF → AES-GCM → container codec → stored
//! record + minted capability tokens. Access-time flow runs in reverse:
//! token → verified identity → stored container → decrypt → plaintext,
//! with the download counter advanced only on the Delivered transition.

pub mod api;
pub mod orchestrator;

pub use api::{
    AccessGrant, AccessProof, ChallengeOptions, GrantNotification, GrantRecipient, KeySource,
    PackagedContainer, ProgressStage, ShareEngine,
};
pub use orchestrator::Stage;
