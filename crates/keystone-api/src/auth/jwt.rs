//! JWT token issuance and validation
//!
//! Implements HMAC-SHA256 signed tokens for both access and refresh flows.
//! Both kinds share one key; the `sub` claim tells them apart and callers
//! decide which kind they accept.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use keystone_core::config::GuardConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Subject kind carried in the `sub` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "access_token")]
    Access,
    #[serde(rename = "refresh_token")]
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer, the configured application name
    pub iss: String,
    /// Subject kind
    pub sub: TokenKind,
    /// User id
    pub id: Uuid,
    /// Role tag
    pub role: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Not before (Unix seconds), equal to `iat`
    pub nbf: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn kind(&self) -> TokenKind {
        self.sub
    }

    /// Span between issuance and expiry
    pub fn lifetime(&self) -> Duration {
        Duration::seconds(self.exp - self.iat)
    }
}

/// Token issuance and validation errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Signing(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    NotYetValid,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Malformed token: {0}")]
    Malformed(String),
}

impl TokenError {
    /// Signing failures are server misconfiguration; everything else is a bad token
    pub fn is_signing(&self) -> bool {
        matches!(self, TokenError::Signing(_))
    }
}

/// Issues and parses signed claims with one process-wide secret
///
/// Keys are derived once at construction; the codec is immutable afterwards
/// and shared through `Arc` in the application state.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the guard settings
    ///
    /// # Arguments
    ///
    /// * `guard` - Secret and token lifetimes
    /// * `issuer` - Value written to and required in the `iss` claim
    ///
    /// # Returns
    ///
    /// * `Err(TokenError::Signing)` - If the secret is empty or a TTL is not
    ///   positive or out of range
    pub fn new(guard: &GuardConfig, issuer: impl Into<String>) -> Result<Self, TokenError> {
        if guard.jwt_secret.is_empty() {
            return Err(TokenError::Signing("secret is empty".to_string()));
        }

        let access_ttl = guard.access_ttl().ok_or_else(|| {
            TokenError::Signing(format!("access TTL out of range: {}h", guard.access_ttl_hours))
        })?;
        let refresh_ttl = guard.refresh_ttl().ok_or_else(|| {
            TokenError::Signing(format!("refresh TTL out of range: {}d", guard.refresh_ttl_days))
        })?;
        if access_ttl <= Duration::zero() || refresh_ttl <= Duration::zero() {
            return Err(TokenError::Signing("token TTL must be positive".to_string()));
        }

        let secret = guard.jwt_secret.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a token of `kind` valid for `ttl` from now
    ///
    /// `iat` and `nbf` are set to the current UTC second and `exp` to
    /// `iat + ttl`, so `exp - iat` always equals `ttl` in whole seconds.
    pub fn issue(
        &self,
        user_id: Uuid,
        role: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        self.issue_at(user_id, role, kind, ttl, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: Uuid,
        role: &str,
        kind: TokenKind,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl_secs = ttl.num_seconds();
        if ttl_secs <= 0 {
            return Err(TokenError::Signing(format!("non-positive ttl: {ttl_secs}s")));
        }

        let iat = now.timestamp();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: kind,
            id: user_id,
            role: role.to_string(),
            iat,
            nbf: iat,
            exp: iat
                .checked_add(ttl_secs)
                .ok_or_else(|| TokenError::Signing(format!("ttl overflows exp: {ttl_secs}s")))?,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Issue an access token with the configured access TTL
    pub fn issue_access(&self, user_id: Uuid, role: &str) -> Result<String, TokenError> {
        self.issue(user_id, role, TokenKind::Access, self.access_ttl)
    }

    /// Issue a refresh token with the configured refresh TTL
    pub fn issue_refresh(&self, user_id: Uuid, role: &str) -> Result<String, TokenError> {
        self.issue(user_id, role, TokenKind::Refresh, self.refresh_ttl)
    }

    /// Verify signature, issuer and validity window, then return the claims
    ///
    /// No leeway is applied to `nbf` or `exp`.
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn guard(secret: &str) -> GuardConfig {
        GuardConfig {
            jwt_secret: secret.to_string(),
            ..GuardConfig::default()
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(&guard("test-secret-key"), "keystone").unwrap()
    }

    #[test]
    fn test_access_token_round_trip() {
        let codec = codec();
        let user_id = Uuid::new_v4();

        let token = codec.issue_access(user_id, "admin").unwrap();
        let claims = codec.parse(&token).unwrap();

        assert_eq!(claims.id, user_id);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.kind(), TokenKind::Access);
        assert_eq!(claims.iss, "keystone");
        assert_eq!(claims.iat, claims.nbf);
        assert_eq!(claims.lifetime(), Duration::hours(24));
    }

    #[test]
    fn test_refresh_token_differs_only_in_kind_and_lifetime() {
        let codec = codec();
        let user_id = Uuid::new_v4();

        let access = codec.parse(&codec.issue_access(user_id, "user").unwrap()).unwrap();
        let refresh = codec.parse(&codec.issue_refresh(user_id, "user").unwrap()).unwrap();

        assert_eq!(access.id, refresh.id);
        assert_eq!(access.role, refresh.role);
        assert_eq!(refresh.kind(), TokenKind::Refresh);
        assert_eq!(refresh.lifetime(), Duration::days(30));
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_token_has_three_segments() {
        let token = codec().issue_access(Uuid::new_v4(), "user").unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = codec();
        let issued = Utc::now() - Duration::hours(2);
        let token = codec
            .issue_at(Uuid::new_v4(), "user", TokenKind::Access, Duration::hours(1), issued)
            .unwrap();

        assert!(matches!(codec.parse(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_future_token_not_yet_valid() {
        let codec = codec();
        let issued = Utc::now() + Duration::hours(1);
        let token = codec
            .issue_at(Uuid::new_v4(), "user", TokenKind::Access, Duration::hours(1), issued)
            .unwrap();

        assert!(matches!(codec.parse(&token), Err(TokenError::NotYetValid)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = codec().issue_access(Uuid::new_v4(), "user").unwrap();
        let other = TokenCodec::new(&guard("another-secret"), "keystone").unwrap();

        assert!(matches!(other.parse(&token), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let token = codec().issue_access(Uuid::new_v4(), "user").unwrap();
        let other = TokenCodec::new(&guard("test-secret-key"), "someone-else").unwrap();

        assert!(matches!(other.parse(&token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = codec();
        let token = codec.issue_access(Uuid::new_v4(), "user").unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = codec.issue_access(Uuid::new_v4(), "admin").unwrap();
        let forged_payload = forged.split('.').nth(1).unwrap().to_string();
        parts[1] = &forged_payload;

        let result = codec.parse(&parts.join("."));
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = codec();
        assert!(matches!(codec.parse("not-a-token"), Err(TokenError::Malformed(_))));
        assert!(matches!(codec.parse(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_empty_secret_is_signing_error() {
        let err = TokenCodec::new(&guard(""), "keystone").unwrap_err();
        assert!(err.is_signing());
    }

    #[test]
    fn test_non_positive_ttl_is_signing_error() {
        let codec = codec();
        let err = codec
            .issue(Uuid::new_v4(), "user", TokenKind::Access, Duration::zero())
            .unwrap_err();
        assert!(err.is_signing());

        let bad_guard = GuardConfig {
            access_ttl_hours: 0,
            ..guard("secret")
        };
        assert!(TokenCodec::new(&bad_guard, "keystone").is_err());
    }

    #[test]
    fn test_out_of_range_ttl_is_signing_error() {
        let huge_refresh = GuardConfig {
            refresh_ttl_days: 200_000_000_000,
            ..guard("secret")
        };
        let err = TokenCodec::new(&huge_refresh, "keystone").unwrap_err();
        assert!(err.is_signing());

        let huge_access = GuardConfig {
            access_ttl_hours: i64::MAX,
            ..guard("secret")
        };
        let err = TokenCodec::new(&huge_access, "keystone").unwrap_err();
        assert!(err.is_signing());
    }

    #[test]
    fn test_kind_serializes_as_subject_string() {
        assert_eq!(
            serde_json::to_string(&TokenKind::Access).unwrap(),
            "\"access_token\""
        );
        assert_eq!(TokenKind::Refresh.to_string(), "refresh_token");
    }

    proptest! {
        #[test]
        fn prop_lifetime_equals_ttl(ttl_secs in 1i64..=400 * 24 * 3600) {
            let codec = codec();
            let token = codec
                .issue(Uuid::new_v4(), "user", TokenKind::Access, Duration::seconds(ttl_secs))
                .unwrap();
            let claims = codec.parse(&token).unwrap();

            prop_assert!(claims.exp > claims.iat);
            prop_assert_eq!(claims.exp - claims.iat, ttl_secs);
        }
    }
}
