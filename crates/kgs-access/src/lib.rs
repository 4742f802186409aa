//! kgs-access: who may decrypt a container, under what limits
//!
//! A grant binds one recipient email to one container through an opaque
//! capability token. The token string itself carries the access right;
//! resolving it is always a store lookup so deleting the backing record
//! revokes it.

pub mod policy;
pub mod recipient;
pub mod store;
pub mod token;

pub use policy::AccessPolicy;
pub use recipient::Recipient;
pub use store::{ContainerRecord, MemoryStore, RecordStore};
pub use token::{access_url, generate_token, AccessTokenService};
