use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KgsError, KgsResult};

/// Top-level configuration (loaded from kagishare.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KgsConfig {
    pub kdf: KdfConfig,
    pub otp: OtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// PBKDF2-HMAC-SHA256 iteration count (default: 310000, floor: 100000)
    pub iterations: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: 310_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// One-time code lifetime in seconds (default: 600)
    pub ttl_secs: u64,
    /// Failed submissions tolerated before the code is voided (default: 5)
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            max_attempts: 5,
        }
    }
}

impl KgsConfig {
    /// Load configuration from a TOML file. Missing sections fall back to
    /// defaults; a missing file is an error so typos in paths surface early.
    pub fn load(path: &Path) -> KgsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| KgsError::InvalidInput(format!("parsing {}: {e}", path.display())))
    }
}
