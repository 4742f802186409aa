use thiserror::Error;

pub type KgsResult<T> = Result<T, KgsError>;

/// Failure taxonomy shared by every kagishare crate.
///
/// Cryptographic failures are deliberately opaque: a wrong password, a
/// tampered ciphertext, and a corrupted file all surface as the same
/// `AuthenticationFailure`, and OTP mismatch vs. expiry both surface as
/// `InvalidOrExpired`. Error payloads never carry key material, codes,
/// tokens, or plaintext fragments.
#[derive(Debug, Error)]
pub enum KgsError {
    /// Malformed caller input (empty password, wrong salt length, bad
    /// arguments). Not retryable without correction.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Container bytes that do not parse as the `.kgsr` format.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// AEAD tag check or key unsealing failed. Wrong key, tampering, and
    /// corruption are indistinguishable by design.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// Expired container, exhausted download cap, or revoked grant.
    /// Terminal for the attempt.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Identity gate refused the presented recipient email before any
    /// challenge was issued.
    #[error("unauthorized")]
    Unauthorized,

    /// Verification code wrong, already consumed, over the attempt limit,
    /// or timed out. The recipient may request a fresh code.
    #[error("verification code invalid or expired")]
    InvalidOrExpired,

    /// Unknown or revoked capability token.
    #[error("token invalid")]
    TokenInvalid,

    /// Record store failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KgsError {
    /// Short taxonomy label for operator logs. Only this kind is logged
    /// with stage detail; user-facing surfaces render their own copy.
    pub fn kind(&self) -> &'static str {
        match self {
            KgsError::InvalidInput(_) => "invalid_input",
            KgsError::MalformedContainer(_) => "malformed_container",
            KgsError::AuthenticationFailure => "authentication_failure",
            KgsError::PolicyViolation(_) => "policy_violation",
            KgsError::Unauthorized => "unauthorized",
            KgsError::InvalidOrExpired => "invalid_or_expired",
            KgsError::TokenInvalid => "token_invalid",
            KgsError::Storage(_) => "storage",
            KgsError::Io(_) => "io",
            KgsError::Other(_) => "other",
        }
    }
}
