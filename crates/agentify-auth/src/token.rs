use agentify_persist::{NewUser, Session, SessionStore, User, UserStore};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{AuthError, Result};
use crate::password::{hash_password, verify_password};

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_BYTES: usize = 32;
const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;

/// Token lifetimes and signing secret.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl: Duration::minutes(MAX_ACCESS_TTL_MINUTES),
            refresh_token_ttl: Duration::days(7),
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < 16 {
            return Err(AuthError::InvalidConfig("JWT secret must be at least 16 bytes".into()));
        }
        if self.access_token_ttl <= Duration::zero()
            || self.access_token_ttl > Duration::minutes(MAX_ACCESS_TTL_MINUTES)
        {
            return Err(AuthError::InvalidConfig(
                "access token TTL must be between 1 minute and 24 hours".into(),
            ));
        }
        if self.refresh_token_ttl <= self.access_token_ttl {
            return Err(AuthError::InvalidConfig(
                "refresh token TTL must exceed the access token TTL".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: String,
    typ: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Who an access token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Client details recorded alongside a refresh session.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl Registration {
    fn validate(&self) -> Result<()> {
        if self.username.trim().len() < 3 {
            return Err(AuthError::Validation("username must be at least 3 characters".into()));
        }
        let email_ok = self
            .email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !email_ok {
            return Err(AuthError::Validation("email address is invalid".into()));
        }
        if self.password.len() < 8 {
            return Err(AuthError::Validation("password must be at least 8 characters".into()));
        }
        Ok(())
    }
}

/// SHA-256 hex digest under which a refresh token is stored.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn new_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues, verifies, rotates and revokes access/refresh token pairs.
///
/// Access tokens are HS256 JWTs checked without touching storage. Refresh
/// tokens are opaque random strings; only their hash is persisted, and
/// redeeming one removes it atomically so it can be used at most once.
pub struct TokenAuthority {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl TokenAuthority {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            config,
            users,
            sessions,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn register(&self, registration: Registration) -> Result<User> {
        registration.validate()?;

        let user = self
            .users
            .create_user(NewUser {
                username: registration.username.trim().to_string(),
                email: registration.email.trim().to_lowercase(),
                full_name: registration.full_name,
                hashed_password: hash_password(&registration.password),
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// `login` may be a username or an email address.
    pub async fn login(&self, login: &str, password: &str, meta: SessionMeta) -> Result<(User, TokenPair)> {
        let mut user = self
            .users
            .find_user_by_login(login)
            .await?
            .filter(|u| verify_password(password, &u.hashed_password))
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        let now = Utc::now();
        self.users.record_login(&user.id, now).await?;
        user.last_login = Some(now);
        let tokens = self.issue(&user, meta).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, tokens))
    }

    /// Mints a fresh pair and persists the hashed refresh token.
    pub async fn issue(&self, user: &User, meta: SessionMeta) -> Result<TokenPair> {
        let now = Utc::now();
        let access_token = self.encode_access(&user.id, now)?;

        let refresh_token = new_refresh_token();
        self.sessions
            .insert_session(Session {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                token_hash: hash_refresh_token(&refresh_token),
                expires_at: now + self.config.refresh_token_ttl,
                created_at: now,
                user_agent: meta.user_agent,
                ip_address: meta.ip_address,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.config.access_token_ttl.num_seconds(),
        })
    }

    fn encode_access(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + self.config.access_token_ttl).timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            typ: ACCESS_TOKEN_TYPE.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidConfig(format!("failed to sign token: {}", e)))
    }

    /// Self-contained check; never consults storage.
    pub fn verify(&self, access_token: &str) -> Result<UserIdentity> {
        let data = jsonwebtoken::decode::<Claims>(access_token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            })?;

        let claims = data.claims;
        if claims.typ != ACCESS_TOKEN_TYPE {
            return Err(AuthError::Malformed);
        }
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::Malformed)?;

        Ok(UserIdentity { user_id: claims.sub, expires_at })
    }

    /// Rotates a refresh token: the old one is consumed before the new pair
    /// exists, so of two racing callers exactly one gets a pair and the other
    /// sees `Revoked`.
    pub async fn refresh(&self, refresh_token: &str, meta: SessionMeta) -> Result<TokenPair> {
        let session = self
            .sessions
            .consume_session(&hash_refresh_token(refresh_token))
            .await?
            .ok_or(AuthError::Revoked)?;

        if session.is_expired(Utc::now()) {
            return Err(AuthError::Expired);
        }

        let user = match self.users.get_user(&session.user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Err(AuthError::Revoked),
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        let meta = SessionMeta {
            user_agent: meta.user_agent.or(session.user_agent),
            ip_address: meta.ip_address.or(session.ip_address),
        };
        let tokens = self.issue(&user, meta).await?;

        tracing::debug!(user_id = %user.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Ends the caller's own session. A token belonging to another user is
    /// left alone and reported as not removed.
    pub async fn revoke(&self, refresh_token: &str, user_id: &str) -> Result<bool> {
        let removed = self
            .sessions
            .delete_session(&hash_refresh_token(refresh_token), user_id)
            .await?;
        if !removed {
            tracing::debug!(user_id, "Revoke matched no session owned by caller");
        }
        Ok(removed)
    }

    /// Resolves a verified identity to an active account.
    pub async fn current_user(&self, identity: &UserIdentity) -> Result<User> {
        let user = match self.users.get_user(&identity.user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Err(AuthError::Malformed),
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }
        Ok(user)
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        Ok(self.sessions.purge_expired_sessions(Utc::now()).await?)
    }

    /// Periodically deletes expired refresh sessions.
    pub fn spawn_session_sweeper(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "Removed expired sessions"),
                    Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
                }
            }
        })
    }
}
