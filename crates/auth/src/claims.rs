use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerdesk_core::{TenantId, UserId};

use crate::Role;

/// Claims carried by an access token once its signature has been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Acting user; recorded as the actor on every event they cause.
    pub sub: UserId,

    /// The only tenant this token may touch.
    pub tenant_id: TenantId,

    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid token signature")]
    BadSignature,
}

/// Check the time window of already decoded claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_at: DateTime<Utc>, ttl: Duration) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("clerk")],
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    #[test]
    fn window_is_half_open() {
        let now = Utc::now();
        let c = claims(now, Duration::minutes(5));
        assert_eq!(validate_claims(&c, now), Ok(()));
        assert_eq!(
            validate_claims(&c, now + Duration::minutes(5)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&c, now - Duration::seconds(1)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let c = claims(now, Duration::minutes(-1));
        assert_eq!(
            validate_claims(&c, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
