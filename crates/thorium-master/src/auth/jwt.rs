//! Token issuance and verification.
//!
//! Tokens are ES256 JWTs. The private key never leaves the master; anything
//! holding the public key can verify.

use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thorium_core::db::unix_timestamp;

use super::claims::{Claims, Subject, TokenKind};

/// Errors from issuing or verifying tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Key error: {0}")]
    Key(String),

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Expected a {expected} token, got a {actual} token")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },
}

/// Issues and verifies signed Thorium credentials.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("algorithm", &Algorithm::ES256)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Build from a PEM-encoded P-256 private key and its public key.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, TokenError> {
        let encoding_key =
            EncodingKey::from_ec_pem(private_pem).map_err(|e| TokenError::Key(e.to_string()))?;
        let decoding_key =
            DecodingKey::from_ec_pem(public_pem).map_err(|e| TokenError::Key(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::ES256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
        })
    }

    /// Load the key pair from PEM files.
    pub fn from_pem_files(private_path: &Path, public_path: &Path) -> Result<Self, TokenError> {
        let private_pem = std::fs::read(private_path).map_err(|e| {
            TokenError::Key(format!("Failed to read {}: {e}", private_path.display()))
        })?;
        let public_pem = std::fs::read(public_path).map_err(|e| {
            TokenError::Key(format!("Failed to read {}: {e}", public_path.display()))
        })?;
        Self::from_pem(&private_pem, &public_pem)
    }

    /// Create an authority with a freshly generated key pair.
    ///
    /// Tokens issued by it do not survive a restart of the process.
    pub fn generate() -> Result<Self, TokenError> {
        let key_pair = rcgen::KeyPair::generate().map_err(|e| TokenError::Key(e.to_string()))?;
        Self::from_pem(
            key_pair.serialize_pem().as_bytes(),
            key_pair.public_key_pem().as_bytes(),
        )
    }

    /// Issue a signed token for `subject`.
    pub fn issue(&self, subject: Subject) -> Result<String, TokenError> {
        let claims = Claims {
            subject,
            iat: unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token's signature and claim shape.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }

    /// Verify an account token, returning the account id.
    pub fn verify_account(&self, token: &str) -> Result<i64, TokenError> {
        match self.verify(token)?.subject {
            Subject::Account { uid } => Ok(uid),
            other => Err(wrong_kind(TokenKind::Account, other)),
        }
    }

    /// Verify a character token, returning `(account id, character id)`.
    pub fn verify_character(&self, token: &str) -> Result<(i64, i64), TokenError> {
        match self.verify(token)?.subject {
            Subject::Character { uid, id } => Ok((uid, id)),
            other => Err(wrong_kind(TokenKind::Character, other)),
        }
    }

    /// Verify a machine token, returning the machine id.
    pub fn verify_machine(&self, token: &str) -> Result<i64, TokenError> {
        match self.verify(token)?.subject {
            Subject::Machine { machine_id } => Ok(machine_id),
            other => Err(wrong_kind(TokenKind::Machine, other)),
        }
    }
}

const fn wrong_kind(expected: TokenKind, actual: Subject) -> TokenError {
    TokenError::WrongKind {
        expected,
        actual: actual.kind(),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::generate().unwrap()
    }

    #[test]
    fn issue_and_verify_each_kind() {
        let auth = authority();
        for subject in [
            Subject::Account { uid: 1 },
            Subject::Character { uid: 1, id: 9 },
            Subject::Machine { machine_id: 3 },
        ] {
            let token = auth.issue(subject).unwrap();
            let claims = auth.verify(&token).unwrap();
            assert_eq!(claims.subject, subject);
            assert!(claims.iat > 0);
        }
    }

    #[test]
    fn typed_verification_extracts_ids() {
        let auth = authority();
        let account = auth.issue(Subject::Account { uid: 11 }).unwrap();
        let character = auth.issue(Subject::Character { uid: 11, id: 5 }).unwrap();
        let machine = auth.issue(Subject::Machine { machine_id: 2 }).unwrap();

        assert_eq!(auth.verify_account(&account).unwrap(), 11);
        assert_eq!(auth.verify_character(&character).unwrap(), (11, 5));
        assert_eq!(auth.verify_machine(&machine).unwrap(), 2);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let auth = authority();
        let machine = auth.issue(Subject::Machine { machine_id: 2 }).unwrap();

        let err = auth.verify_account(&machine).unwrap_err();
        assert!(matches!(
            err,
            TokenError::WrongKind {
                expected: TokenKind::Account,
                actual: TokenKind::Machine
            }
        ));
    }

    #[test]
    fn other_key_pair_fails_verification() {
        let auth1 = authority();
        let auth2 = authority();

        let token = auth1.issue(Subject::Account { uid: 1 }).unwrap();
        assert!(matches!(auth2.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let auth = authority();
        let token = auth.issue(Subject::Account { uid: 1 }).unwrap();
        let forged = auth.issue(Subject::Account { uid: 2 }).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);
        assert!(auth.verify(&spliced).is_err());
    }

    #[test]
    fn garbage_fails_verification() {
        let auth = authority();
        assert!(auth.verify("not-a-token").is_err());
        assert!(auth.verify("").is_err());
    }

    #[test]
    fn textual_numeric_claim_fails_verification() {
        let auth = authority();
        let claims = serde_json::json!({"kind": "account", "uid": "1", "iat": 0, "jti": "x"});
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &auth.encoding_key)
                .unwrap();
        assert!(matches!(
            auth.verify_account(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn reissued_tokens_differ() {
        let auth = authority();
        let a = auth.issue(Subject::Machine { machine_id: 1 }).unwrap();
        let b = auth.issue(Subject::Machine { machine_id: 1 }).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn loads_key_pair_from_files() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let private_path = dir.path().join("app.pem");
        let public_path = dir.path().join("app.pub.pem");
        std::fs::write(&private_path, key_pair.serialize_pem()).unwrap();
        std::fs::write(&public_path, key_pair.public_key_pem()).unwrap();

        let auth = TokenAuthority::from_pem_files(&private_path, &public_path).unwrap();
        let token = auth.issue(Subject::Account { uid: 4 }).unwrap();
        assert_eq!(auth.verify_account(&token).unwrap(), 4);
    }
}
