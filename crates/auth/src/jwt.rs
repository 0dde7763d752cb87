//! Bearer token decoding.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Turns a raw bearer token into trusted claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 shared-secret validator.
///
/// Expiry lives in `issued_at`/`expires_at` rather than the registered `exp`
/// claim, so the library's own time checks are turned off and
/// [`validate_claims`] runs instead.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::BadSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            }
        })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use ledgerdesk_core::{TenantId, UserId};

    fn token(secret: &str, ttl: Duration) -> (String, JwtClaims) {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("accountant")],
            issued_at: now,
            expires_at: now + ttl,
        };
        let raw = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (raw, claims)
    }

    #[test]
    fn accepts_a_token_signed_with_the_same_secret() {
        let (raw, claims) = token("s3cret", Duration::minutes(10));
        let decoded = Hs256JwtValidator::new("s3cret")
            .validate(&raw, Utc::now())
            .unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn rejects_a_foreign_signature() {
        let (raw, _) = token("other", Duration::minutes(10));
        let err = Hs256JwtValidator::new("s3cret")
            .validate(&raw, Utc::now())
            .unwrap_err();
        assert_eq!(err, TokenValidationError::BadSignature);
    }

    #[test]
    fn rejects_an_expired_token() {
        let (raw, _) = token("s3cret", Duration::minutes(1));
        let err = Hs256JwtValidator::new("s3cret")
            .validate(&raw, Utc::now() + Duration::minutes(2))
            .unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Hs256JwtValidator::new("s3cret")
            .validate("not-a-token", Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }
}
