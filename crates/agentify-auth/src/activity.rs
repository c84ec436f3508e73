use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::token::{SessionMeta, TokenAuthority, TokenPair};

/// The subset of [`TokenAuthority`] the monitor drives.
#[async_trait]
pub trait SessionAuthority: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
    async fn revoke(&self, refresh_token: &str, user_id: &str) -> Result<()>;
}

#[async_trait]
impl SessionAuthority for TokenAuthority {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        TokenAuthority::refresh(self, refresh_token, SessionMeta::default()).await
    }

    async fn revoke(&self, refresh_token: &str, user_id: &str) -> Result<()> {
        TokenAuthority::revoke(self, refresh_token, user_id).await.map(|_| ())
    }
}

const NO_REFRESH: i64 = i64::MIN;

/// A signed-in client's local session: its token cache and last interaction.
///
/// Created at login and torn down on logout; nothing about it is global.
pub struct SessionContext {
    user_id: String,
    tokens: RwLock<Option<TokenPair>>,
    last_activity_ms: AtomicI64,
    /// Activity stamp the last proactive refresh was made for.
    refreshed_for_ms: AtomicI64,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, tokens: TokenPair) -> Self {
        Self::started_at(user_id, tokens, Utc::now())
    }

    pub fn started_at(user_id: impl Into<String>, tokens: TokenPair, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tokens: RwLock::new(Some(tokens)),
            last_activity_ms: AtomicI64::new(at.timestamp_millis()),
            refreshed_for_ms: AtomicI64::new(NO_REFRESH),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Never blocks.
    pub fn record_activity(&self) {
        self.record_activity_at(Utc::now());
    }

    pub fn record_activity_at(&self, at: DateTime<Utc>) {
        self.last_activity_ms.fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        let ms = self.last_activity_ms.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }

    pub async fn tokens(&self) -> Option<TokenPair> {
        self.tokens.read().await.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    async fn replace_tokens(&self, tokens: TokenPair) {
        *self.tokens.write().await = Some(tokens);
    }

    async fn clear(&self) -> Option<TokenPair> {
        self.tokens.write().await.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    None,
    Refresh,
    Logout,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityPolicy {
    pub refresh_after: Duration,
    pub logout_after: Duration,
    pub check_interval: std::time::Duration,
}

impl Default for ActivityPolicy {
    fn default() -> Self {
        Self {
            refresh_after: Duration::minutes(5),
            logout_after: Duration::minutes(10),
            check_interval: std::time::Duration::from_secs(60),
        }
    }
}

/// Sliding-expiration policy over a [`SessionContext`].
///
/// Idle longer than `logout_after`: revoke and clear. Idle longer than
/// `refresh_after`: rotate the pair once per idle period.
pub struct ActivityMonitor {
    context: Arc<SessionContext>,
    authority: Arc<dyn SessionAuthority>,
    policy: ActivityPolicy,
}

impl ActivityMonitor {
    pub fn new(context: Arc<SessionContext>, authority: Arc<dyn SessionAuthority>) -> Self {
        Self {
            context,
            authority,
            policy: ActivityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ActivityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// What a check at `now` would do, without doing it.
    pub fn decide(&self, now: DateTime<Utc>) -> MonitorAction {
        let last_ms = self.context.last_activity_ms.load(Ordering::Relaxed);
        let idle = Duration::milliseconds(now.timestamp_millis() - last_ms);

        if idle > self.policy.logout_after {
            MonitorAction::Logout
        } else if idle > self.policy.refresh_after
            && self.context.refreshed_for_ms.load(Ordering::Relaxed) != last_ms
        {
            MonitorAction::Refresh
        } else {
            MonitorAction::None
        }
    }

    /// One periodic check. A failed refresh ends the session.
    pub async fn tick(&self, now: DateTime<Utc>) -> MonitorAction {
        if !self.context.is_signed_in().await {
            return MonitorAction::None;
        }

        match self.decide(now) {
            MonitorAction::None => MonitorAction::None,
            MonitorAction::Logout => {
                self.logout().await;
                MonitorAction::Logout
            }
            MonitorAction::Refresh => {
                let last_ms = self.context.last_activity_ms.load(Ordering::Relaxed);
                let Some(tokens) = self.context.tokens().await else {
                    return MonitorAction::None;
                };
                match self.authority.refresh(&tokens.refresh_token).await {
                    Ok(fresh) => {
                        self.context.replace_tokens(fresh).await;
                        self.context.refreshed_for_ms.store(last_ms, Ordering::Relaxed);
                        tracing::debug!(user_id = %self.context.user_id, "Session refreshed while idle");
                        MonitorAction::Refresh
                    }
                    Err(e) => {
                        tracing::info!(user_id = %self.context.user_id, error = %e, "Refresh failed, signing out");
                        self.context.clear().await;
                        MonitorAction::Logout
                    }
                }
            }
        }
    }

    async fn logout(&self) {
        if let Some(tokens) = self.context.clear().await {
            if let Err(e) = self.authority.revoke(&tokens.refresh_token, &self.context.user_id).await {
                tracing::warn!(user_id = %self.context.user_id, error = %e, "Revoke on idle logout failed");
            }
        }
        tracing::info!(user_id = %self.context.user_id, "Signed out after inactivity");
    }

    /// Runs checks every `check_interval` until the session ends.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.check_interval);
            loop {
                ticker.tick().await;
                if self.tick(Utc::now()).await == MonitorAction::Logout {
                    break;
                }
                if !self.context.is_signed_in().await {
                    break;
                }
            }
        })
    }
}
