pub mod config;
pub mod error;
pub mod types;

pub use config::{KdfConfig, KgsConfig, OtpConfig};
pub use error::{KgsError, KgsResult};
pub use types::{unix_now, FilePayload, Passkey};
