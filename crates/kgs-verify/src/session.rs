//! Verification sessions and the challenge gate
//!
//! One live session per recipient token. Issuing a new challenge voids any
//! unconsumed predecessor, so only the most recent code is ever valid. A
//! session is consumed exactly once by a successful check and removed, so
//! replaying the same proof fails.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::debug;

use kgs_core::{KgsError, KgsResult, OtpConfig, Passkey};

use crate::otp::{codes_match, generate_code};
use crate::webauthn::{check_counter, verify_signature, Assertion};
use crate::CHALLENGE_SIZE;

/// Which proof the recipient will present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    OneTimeCode,
    WebAuthn,
}

impl ChallengeMethod {
    /// Explicit capability query: WebAuthn when the recipient's device
    /// supports it, one-time code otherwise. OTP is always the fallback.
    pub fn select(webauthn_available: bool) -> Self {
        if webauthn_available {
            ChallengeMethod::WebAuthn
        } else {
            ChallengeMethod::OneTimeCode
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    CodeIssued,
    Verified,
    Failed,
}

enum SessionSecret {
    Code(String),
    Challenge([u8; CHALLENGE_SIZE]),
    /// Cleared on consumption so the value cannot match twice
    Cleared,
}

/// One identity-proof attempt for one recipient.
pub struct VerificationSession {
    pub method: ChallengeMethod,
    pub state: SessionState,
    pub issued_at: u64,
    pub expires_at: u64,
    pub consumed: bool,
    attempts: u32,
    secret: SessionSecret,
}

/// A freshly issued one-time code, for the caller's notification channel.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: u64,
}

/// A freshly issued WebAuthn challenge.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub challenge: [u8; CHALLENGE_SIZE],
    pub expires_at: u64,
}

/// Issues challenges and checks proofs, one live session per token.
pub struct ChallengeGate {
    config: OtpConfig,
    sessions: Mutex<HashMap<String, VerificationSession>>,
}

impl ChallengeGate {
    pub fn new(config: OtpConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a one-time code, voiding any prior unconsumed code for this
    /// token. The code goes to the caller's notifier, never to logs.
    pub fn issue_code(&self, token: &str, now: u64) -> IssuedCode {
        let code = generate_code();
        let expires_at = now + self.config.ttl_secs;
        self.install(
            token,
            VerificationSession {
                method: ChallengeMethod::OneTimeCode,
                state: SessionState::CodeIssued,
                issued_at: now,
                expires_at,
                consumed: false,
                attempts: 0,
                secret: SessionSecret::Code(code.clone()),
            },
        );
        debug!(method = "otp", "verification challenge issued");
        IssuedCode { code, expires_at }
    }

    /// Issue a WebAuthn challenge, voiding any prior session for this token.
    pub fn issue_webauthn(&self, token: &str, now: u64) -> IssuedChallenge {
        let mut challenge = [0u8; CHALLENGE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut challenge);
        let expires_at = now + self.config.ttl_secs;
        self.install(
            token,
            VerificationSession {
                method: ChallengeMethod::WebAuthn,
                state: SessionState::CodeIssued,
                issued_at: now,
                expires_at,
                consumed: false,
                attempts: 0,
                secret: SessionSecret::Challenge(challenge),
            },
        );
        debug!(method = "webauthn", "verification challenge issued");
        IssuedChallenge {
            challenge,
            expires_at,
        }
    }

    fn install(&self, token: &str, session: VerificationSession) {
        let mut sessions = lock_or_recover(&self.sessions);
        // Replacement immediately voids the old code/challenge.
        sessions.insert(token.to_string(), session);
    }

    /// Check a submitted one-time code. On success the session is consumed
    /// and removed; the same value cannot pass twice. Every failure mode is
    /// the same `InvalidOrExpired`.
    pub fn verify_code(&self, token: &str, submitted: &str, now: u64) -> KgsResult<()> {
        let mut sessions = lock_or_recover(&self.sessions);
        let session = sessions.get_mut(token).ok_or(KgsError::InvalidOrExpired)?;

        if session.consumed || session.state != SessionState::CodeIssued {
            return Err(KgsError::InvalidOrExpired);
        }
        if now >= session.expires_at {
            session.state = SessionState::Failed;
            return Err(KgsError::InvalidOrExpired);
        }
        let SessionSecret::Code(ref expected) = session.secret else {
            return Err(KgsError::InvalidOrExpired);
        };

        if !codes_match(expected, submitted) {
            session.attempts += 1;
            if session.attempts >= self.config.max_attempts {
                // Guessing budget spent; force re-issuance.
                sessions.remove(token);
            }
            return Err(KgsError::InvalidOrExpired);
        }

        session.state = SessionState::Verified;
        session.consumed = true;
        session.secret = SessionSecret::Cleared;
        sessions.remove(token);
        debug!(method = "otp", "verification succeeded");
        Ok(())
    }

    /// Check a WebAuthn assertion against the live challenge and the stored
    /// passkey. Returns the new signature counter to persist.
    pub fn verify_assertion(
        &self,
        token: &str,
        passkey: &Passkey,
        assertion: &Assertion,
        now: u64,
    ) -> KgsResult<u32> {
        let mut sessions = lock_or_recover(&self.sessions);
        let session = sessions.get_mut(token).ok_or(KgsError::InvalidOrExpired)?;

        if session.consumed || session.state != SessionState::CodeIssued {
            return Err(KgsError::InvalidOrExpired);
        }
        if now >= session.expires_at {
            session.state = SessionState::Failed;
            return Err(KgsError::InvalidOrExpired);
        }
        let SessionSecret::Challenge(ref issued) = session.secret else {
            return Err(KgsError::InvalidOrExpired);
        };
        if !bool::from(issued.ct_eq(&assertion.challenge)) {
            session.attempts += 1;
            if session.attempts >= self.config.max_attempts {
                sessions.remove(token);
            }
            return Err(KgsError::InvalidOrExpired);
        }

        verify_signature(passkey, assertion)?;
        check_counter(passkey, assertion.signature_counter)?;

        session.state = SessionState::Verified;
        session.consumed = true;
        session.secret = SessionSecret::Cleared;
        sessions.remove(token);
        debug!(method = "webauthn", "verification succeeded");
        Ok(assertion.signature_counter)
    }
}

/// A panic while holding this lock leaves only session bookkeeping behind;
/// recover the map rather than poisoning every later attempt.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn gate() -> ChallengeGate {
        ChallengeGate::new(OtpConfig::default())
    }

    #[test]
    fn test_method_selection() {
        assert_eq!(ChallengeMethod::select(true), ChallengeMethod::WebAuthn);
        assert_eq!(ChallengeMethod::select(false), ChallengeMethod::OneTimeCode);
    }

    #[test]
    fn test_code_verify_roundtrip() {
        let gate = gate();
        let issued = gate.issue_code("tok", 0);
        assert!(gate.verify_code("tok", &issued.code, 10).is_ok());
    }

    #[test]
    fn test_code_single_use() {
        let gate = gate();
        let issued = gate.issue_code("tok", 0);

        gate.verify_code("tok", &issued.code, 10).unwrap();
        // Identical value, still before expiry: must fail.
        let result = gate.verify_code("tok", &issued.code, 20);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_code_expiry_boundary() {
        let gate = gate();
        let issued = gate.issue_code("tok", 0);

        // TTL is 600s; the correct code at t=601 is refused.
        let result = gate.verify_code("tok", &issued.code, 601);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_reissue_voids_old_code() {
        let gate = gate();
        let first = gate.issue_code("tok", 0);
        let second = gate.issue_code("tok", 5);

        if first.code != second.code {
            let result = gate.verify_code("tok", &first.code, 10);
            assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
        }
        assert!(gate.verify_code("tok", &second.code, 10).is_ok());
    }

    #[test]
    fn test_wrong_code_generic_error() {
        let gate = gate();
        gate.issue_code("tok", 0);

        let result = gate.verify_code("tok", "000000", 10);
        // Wrong code and expired code are indistinguishable.
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_attempt_limit_forces_reissue() {
        let gate = ChallengeGate::new(OtpConfig {
            ttl_secs: 600,
            max_attempts: 3,
        });
        let issued = gate.issue_code("tok", 0);
        let wrong = if issued.code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert!(gate.verify_code("tok", wrong, 10).is_err());
        }
        // Budget spent: even the correct code is now refused until reissue.
        let result = gate.verify_code("tok", &issued.code, 10);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));

        let reissued = gate.issue_code("tok", 20);
        assert!(gate.verify_code("tok", &reissued.code, 30).is_ok());
    }

    #[test]
    fn test_no_session_is_generic_error() {
        let gate = gate();
        let result = gate.verify_code("ghost", "123456", 0);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    fn passkey_pair() -> (SigningKey, Passkey) {
        let signing = SigningKey::from_bytes(&[3u8; 32]);
        let passkey = Passkey {
            credential_id: "cred1".into(),
            public_key: signing.verifying_key().to_bytes(),
            signature_counter: 0,
            device_label: "phone".into(),
        };
        (signing, passkey)
    }

    fn sign_challenge(signing: &SigningKey, challenge: [u8; CHALLENGE_SIZE]) -> Assertion {
        let authenticator_data = vec![0x05u8; 37];
        let mut message = challenge.to_vec();
        message.extend_from_slice(&authenticator_data);
        let signature = signing.sign(&message);
        Assertion {
            credential_id: "cred1".into(),
            authenticator_data,
            challenge,
            signature: signature.to_bytes().to_vec(),
            signature_counter: 1,
        }
    }

    #[test]
    fn test_webauthn_roundtrip() {
        let gate = gate();
        let (signing, passkey) = passkey_pair();

        let issued = gate.issue_webauthn("tok", 0);
        let assertion = sign_challenge(&signing, issued.challenge);

        let counter = gate
            .verify_assertion("tok", &passkey, &assertion, 10)
            .unwrap();
        assert_eq!(counter, 1);
    }

    #[test]
    fn test_webauthn_challenge_single_use() {
        let gate = gate();
        let (signing, passkey) = passkey_pair();

        let issued = gate.issue_webauthn("tok", 0);
        let assertion = sign_challenge(&signing, issued.challenge);

        gate.verify_assertion("tok", &passkey, &assertion, 10)
            .unwrap();
        let result = gate.verify_assertion("tok", &passkey, &assertion, 20);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_webauthn_stale_challenge_rejected() {
        let gate = gate();
        let (signing, passkey) = passkey_pair();

        let first = gate.issue_webauthn("tok", 0);
        let _second = gate.issue_webauthn("tok", 5);

        // Assertion over the voided first challenge must fail.
        let assertion = sign_challenge(&signing, first.challenge);
        let result = gate.verify_assertion("tok", &passkey, &assertion, 10);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_webauthn_counter_regression_rejected() {
        let gate = gate();
        let (signing, mut passkey) = passkey_pair();
        passkey.signature_counter = 9;

        let issued = gate.issue_webauthn("tok", 0);
        let assertion = sign_challenge(&signing, issued.challenge);
        // assertion.signature_counter == 1 < 9

        let result = gate.verify_assertion("tok", &passkey, &assertion, 10);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }

    #[test]
    fn test_method_mismatch_rejected() {
        let gate = gate();
        gate.issue_webauthn("tok", 0);

        // An OTP submission against a WebAuthn session cannot succeed.
        let result = gate.verify_code("tok", "123456", 10);
        assert!(matches!(result, Err(KgsError::InvalidOrExpired)));
    }
}
