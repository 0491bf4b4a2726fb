use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
#[error("click.hmac_secret is not configured")]
pub struct ErrMissingSecret;

/// Mints and validates tamper-evident, time-bound click URLs (§4.A).
///
/// The secret is process-wide, acquired at startup, never logged.
#[derive(Clone)]
pub struct ClickSigner {
    secret: Vec<u8>,
    signature_length: usize,
}

impl ClickSigner {
    pub fn new(secret: impl Into<Vec<u8>>, signature_length: usize) -> Result<Self, ErrMissingSecret> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ErrMissingSecret);
        }
        Ok(Self {
            secret,
            signature_length,
        })
    }

    /// Canonical message: `query_id|result_id|position|page|timestamp|destination_url`.
    pub fn canonical_message(
        query_id: &str,
        result_id: &str,
        position: u32,
        page: u32,
        timestamp: i64,
        destination_url: &str,
    ) -> String {
        format!(
            "{query_id}|{result_id}|{position}|{page}|{timestamp}|{destination_url}"
        )
    }

    /// First `signature_length` hex chars of `HMAC-SHA256(secret, message)`.
    pub fn sign(&self, message: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        let digest = mac.finalize().into_bytes();
        let hex = hex::encode(digest);
        hex[..self.signature_length.min(hex.len())].to_string()
    }

    /// Recomputes the MAC and performs constant-time comparison. Any length
    /// mismatch yields false without comparing bytes. Never panics on
    /// malformed input.
    pub fn verify(&self, message: &str, provided: &str) -> bool {
        let expected = self.sign(message);
        if expected.len() != provided.len() {
            return false;
        }
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> ClickSigner {
        ClickSigner::new("test-secret-key", 12).unwrap()
    }

    #[test]
    fn missing_secret_fails_init() {
        assert!(ClickSigner::new("", 12).is_err());
    }

    #[test]
    fn sign_length_matches_configured_length() {
        let s = signer();
        let msg = ClickSigner::canonical_message("q", "r", 1, 1, 1700000000, "https://example.com");
        assert_eq!(s.sign(&msg).len(), 12);
    }

    #[test]
    fn verify_accepts_its_own_signature() {
        let s = signer();
        let msg = ClickSigner::canonical_message("q_abc", "r_doc", 3, 1, 1700000000, "https://example.com/article");
        let sig = s.sign(&msg);
        assert!(s.verify(&msg, &sig));
    }

    #[test]
    fn single_char_mutation_fails_verify() {
        let s = signer();
        let msg = ClickSigner::canonical_message("q", "r", 1, 1, 1700000000, "https://example.com");
        let mut sig = s.sign(&msg);
        let last = sig.pop().unwrap();
        let mutated = if last == '0' { '1' } else { '0' };
        sig.push(mutated);
        assert!(!s.verify(&msg, &sig));
    }

    #[test]
    fn length_mismatch_never_compares_and_fails() {
        let s = signer();
        let msg = ClickSigner::canonical_message("q", "r", 1, 1, 1700000000, "https://example.com");
        assert!(!s.verify(&msg, "short"));
        assert!(!s.verify(&msg, "0000000000000000000000000000"));
    }

    #[test]
    fn known_bad_signature_rejected() {
        let s = signer();
        let msg = ClickSigner::canonical_message("q_abc", "r_doc", 3, 1, 1700000000, "https://example.com/article");
        assert!(!s.verify(&msg, "000000000000"));
    }
}
