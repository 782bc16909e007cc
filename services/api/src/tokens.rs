//! services/api/src/tokens.rs
//!
//! Short-lived access tokens and single-active refresh tokens.
//!
//! Tokens are HS256 JWTs keyed by the server secret from the credential store.
//! Issuing a refresh token records its `iat` in the store; only the refresh token
//! carrying exactly that `iat` verifies afterwards, which revokes every older one.

use anki_sync_core::TokenType;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::credentials::CredentialStore;

/// Value of the `iss` claim on every token this service mints.
pub const APP_NAME: &str = "Anki Sync Server";

/// Source of "now" for issuing and expiry checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The signed claim set. Timestamps are microseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub exp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Server secret key is not configured")]
    MissingSecret,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token generation failed: {0}")]
    Encoding(String),
}

//=========================================================================================
// TokenIssuer
//=========================================================================================

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    store: Arc<CredentialStore>,
    clock: Clock,
    access_ttl: TimeDelta,
    refresh_ttl: TimeDelta,
}

impl TokenIssuer {
    pub fn new(secret: &str, store: Arc<CredentialStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock with microsecond claims.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            store,
            clock: Arc::new(Utc::now),
            access_ttl: TimeDelta::days(1),
            refresh_ttl: TimeDelta::days(30),
        }
    }

    /// Builds an issuer keyed by the store's current `server_secret_key`.
    pub fn from_store(store: Arc<CredentialStore>) -> Result<Self, TokenError> {
        let secret = store.server_secret_key().ok_or(TokenError::MissingSecret)?;
        Ok(Self::new(&secret, store))
    }

    pub fn with_ttls(mut self, access_ttl: TimeDelta, refresh_ttl: TimeDelta) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        // Claims carry microseconds; anything finer would never compare equal.
        (self.clock)().trunc_subsecs(6)
    }

    pub fn issue_access(&self) -> Result<String, TokenError> {
        self.issue(TokenType::Access, self.access_ttl)
    }

    pub fn issue_refresh(&self) -> Result<String, TokenError> {
        self.issue(TokenType::Refresh, self.refresh_ttl)
    }

    /// Mints a signed token valid for `ttl`.
    ///
    /// A refresh token becomes the only accepted one before this returns.
    pub fn issue(&self, token_type: TokenType, ttl: TimeDelta) -> Result<String, TokenError> {
        let (token, issued_at) = self.sign(token_type, ttl)?;
        if token_type == TokenType::Refresh {
            self.store.set_refresh_token_created_at(issued_at);
            debug!(issued_at = %issued_at, "Refresh token rotated");
        }
        Ok(token)
    }

    /// Trades a valid refresh token for its successor.
    ///
    /// The stored `iat` is compared and replaced in one write, so when several
    /// requests present the same token only one of them gets a successor.
    pub fn rotate_refresh(&self, presented: &str) -> Result<String, TokenError> {
        let claims = self.verify(presented, TokenType::Refresh)?;
        let (token, issued_at) = self.sign(TokenType::Refresh, self.refresh_ttl)?;

        if !self
            .store
            .replace_refresh_token_created_at(claims.iat, issued_at)
        {
            debug!(iat = %claims.iat, "Refresh token was rotated out concurrently");
            return Err(TokenError::InvalidToken);
        }
        debug!(issued_at = %issued_at, "Refresh token rotated");
        Ok(token)
    }

    fn sign(
        &self,
        token_type: TokenType,
        ttl: TimeDelta,
    ) -> Result<(String, DateTime<Utc>), TokenError> {
        let issued_at = self.now();
        let claims = Claims {
            iss: APP_NAME.to_string(),
            iat: issued_at,
            exp: issued_at + ttl,
            token_type,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok((token, issued_at))
    }

    /// Checks signature, expiry, issuer and type, plus rotation state for refresh
    /// tokens. Returns the claims of a valid token.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token failed to decode");
                TokenError::InvalidToken
            })?
            .claims;

        if self.now() >= claims.exp {
            return Err(TokenError::TokenExpired);
        }
        if claims.iss != APP_NAME || claims.token_type != expected {
            return Err(TokenError::InvalidToken);
        }
        if expected == TokenType::Refresh
            && self.store.refresh_token_created_at() != Some(claims.iat)
        {
            debug!(iat = %claims.iat, "Refresh token has been rotated out");
            return Err(TokenError::InvalidToken);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Barrier, Mutex};

    const SECRET: &str = "test_secret";

    fn store() -> Arc<CredentialStore> {
        let store = Arc::new(CredentialStore::new());
        store.set_server_secret_key(SECRET.to_string());
        store
    }

    /// A clock the test can move by hand.
    fn manual_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&now);
        let clock: Clock = Arc::new(move || *handle.lock().unwrap());
        (clock, now)
    }

    #[test]
    fn access_token_verifies_as_access() {
        let issuer = TokenIssuer::new(SECRET, store());
        let token = issuer.issue(TokenType::Access, TimeDelta::minutes(5)).unwrap();

        let claims = issuer.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.iss, APP_NAME);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, TimeDelta::minutes(5));
    }

    #[test]
    fn refresh_token_verifies_right_after_issuance() {
        let store = store();
        let issuer = TokenIssuer::new(SECRET, store.clone());
        let token = issuer.issue_refresh().unwrap();

        let claims = issuer.verify(&token, TokenType::Refresh).unwrap();
        assert_eq!(store.refresh_token_created_at(), Some(claims.iat));
    }

    #[test]
    fn new_refresh_token_revokes_the_previous_one() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let (clock, now) = manual_clock(start);
        let issuer = TokenIssuer::new(SECRET, store()).with_clock(clock);

        let first = issuer.issue_refresh().unwrap();
        *now.lock().unwrap() = start + TimeDelta::microseconds(1);
        let second = issuer.issue_refresh().unwrap();

        assert!(matches!(
            issuer.verify(&first, TokenType::Refresh),
            Err(TokenError::InvalidToken)
        ));
        assert!(issuer.verify(&second, TokenType::Refresh).is_ok());
    }

    #[test]
    fn rotation_hands_out_a_successor_and_revokes_the_presented_token() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let (clock, now) = manual_clock(start);
        let store = store();
        let issuer = TokenIssuer::new(SECRET, store.clone()).with_clock(clock);
        let first = issuer.issue_refresh().unwrap();

        *now.lock().unwrap() = start + TimeDelta::seconds(1);
        let second = issuer.rotate_refresh(&first).unwrap();

        assert_eq!(store.refresh_token_created_at(), Some(start + TimeDelta::seconds(1)));
        assert!(issuer.verify(&second, TokenType::Refresh).is_ok());
        assert!(matches!(
            issuer.rotate_refresh(&first),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn concurrent_rotations_of_one_token_yield_one_successor() {
        const CALLERS: usize = 8;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        // Every reading of the clock is a distinct microsecond.
        let ticks = Arc::new(AtomicI64::new(0));
        let clock: Clock = {
            let ticks = Arc::clone(&ticks);
            Arc::new(move || start + TimeDelta::microseconds(ticks.fetch_add(1, Ordering::SeqCst)))
        };
        let issuer = TokenIssuer::new(SECRET, store()).with_clock(clock);
        let presented = Arc::new(issuer.issue_refresh().unwrap());
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let issuer = issuer.clone();
                let presented = Arc::clone(&presented);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    issuer.rotate_refresh(&presented)
                })
            })
            .collect();
        let successors: Vec<String> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap().ok())
            .collect();

        assert_eq!(successors.len(), 1);
        assert!(issuer.verify(&successors[0], TokenType::Refresh).is_ok());
    }

    #[test]
    fn cleared_rotation_state_rejects_refresh_tokens() {
        let store = store();
        let issuer = TokenIssuer::new(SECRET, store.clone());
        let token = issuer.issue_refresh().unwrap();

        store.set_refresh_token_created_at(None);

        assert!(matches!(
            issuer.verify(&token, TokenType::Refresh),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn access_tokens_ignore_rotation_state() {
        let store = store();
        let issuer = TokenIssuer::new(SECRET, store.clone());
        let token = issuer.issue_access().unwrap();
        issuer.issue_refresh().unwrap();

        assert!(issuer.verify(&token, TokenType::Access).is_ok());
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let (clock, now) = manual_clock(start);
        let issuer = TokenIssuer::new(SECRET, store()).with_clock(clock);
        let token = issuer.issue(TokenType::Access, TimeDelta::minutes(5)).unwrap();

        *now.lock().unwrap() = start + TimeDelta::minutes(5);

        assert!(matches!(
            issuer.verify(&token, TokenType::Access),
            Err(TokenError::TokenExpired)
        ));
        assert_eq!(TokenError::TokenExpired.to_string(), "Token has expired");
    }

    #[test]
    fn wrong_type_is_invalid() {
        let issuer = TokenIssuer::new(SECRET, store());
        let access = issuer.issue_access().unwrap();

        assert!(matches!(
            issuer.verify(&access, TokenType::Refresh),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        let issuer = TokenIssuer::new(SECRET, store());
        assert!(matches!(
            issuer.verify("invalid_token", TokenType::Access),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn token_signed_with_another_secret_is_invalid() {
        let other = TokenIssuer::new("another_secret", store());
        let token = other.issue_access().unwrap();

        let issuer = TokenIssuer::new(SECRET, store());
        assert!(matches!(
            issuer.verify(&token, TokenType::Access),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn foreign_issuer_is_invalid() {
        let now = Utc::now().trunc_subsecs(6);
        let claims = Claims {
            iss: "FakeApp".to_string(),
            iat: now,
            exp: now + TimeDelta::minutes(5),
            token_type: TokenType::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let issuer = TokenIssuer::new(SECRET, store());
        assert!(matches!(
            issuer.verify(&token, TokenType::Access),
            Err(TokenError::InvalidToken)
        ));
    }

    #[test]
    fn issuer_needs_a_configured_secret() {
        let empty = Arc::new(CredentialStore::new());
        assert!(matches!(
            TokenIssuer::from_store(empty),
            Err(TokenError::MissingSecret)
        ));
        assert!(TokenIssuer::from_store(store()).is_ok());
    }
}
