use chrono::{DateTime, TimeDelta, Utc};

use crate::config::DEFAULT_EXPIRATION_TIME;

/// When the auto-refresh guard re-authenticates.
///
/// The api docs describe refresh-ahead: re-authenticate before every request while the
/// tracked window is still open. `OnExpiry` is the conventional lazy variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    #[default]
    Ahead,
    OnExpiry,
}

/// Client id/secret plus the token currently held and when it was obtained
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    /// lifetime requested on refresh, minutes
    expires_in: u64,
    auto_refresh: bool,
    policy: RefreshPolicy,
    token: Option<String>,
    obtained_at: Option<DateTime<Utc>>,
    /// lifetime of the token actually held, minutes
    token_lifetime: u64,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            expires_in: DEFAULT_EXPIRATION_TIME,
            auto_refresh: false,
            policy: RefreshPolicy::default(),
            token: None,
            obtained_at: None,
            token_lifetime: DEFAULT_EXPIRATION_TIME,
        }
    }
}

impl Credentials {
    pub fn auto_refresh(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        expires_in: u64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            expires_in,
            auto_refresh: true,
            ..Self::default()
        }
    }

    /// Switches auto-refresh on with new client credentials. A token already held
    /// (from an explicit `authenticate`) and the policy are kept.
    pub(crate) fn enable_auto_refresh(
        &mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        expires_in: u64,
    ) {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self.expires_in = expires_in;
        self.auto_refresh = true;
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    pub fn is_auto_refresh(&self) -> bool {
        self.auto_refresh
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RefreshPolicy) {
        self.policy = policy;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `obtained_at + lifetime`, `None` before the first token
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let obtained_at = self.obtained_at?;
        let lifetime = i64::try_from(self.token_lifetime)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::MAX);
        Some(
            obtained_at
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// A token is good only while `now < obtained_at + lifetime`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && self.expires_at().is_some_and(|expires_at| now < expires_at)
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if !self.auto_refresh {
            return false;
        }

        // never authenticated: both policies fetch a first token
        let Some(expires_at) = self.expires_at() else {
            return true;
        };

        // a stale token is never sent, whatever the policy
        match self.policy {
            RefreshPolicy::Ahead => now <= expires_at || !self.is_usable(now),
            RefreshPolicy::OnExpiry => !self.is_usable(now),
        }
    }

    /// Records a fresh token and restarts the expiry clock
    pub(crate) fn store(&mut self, token: String, lifetime: u64, now: DateTime<Utc>) {
        self.token = Some(token);
        self.token_lifetime = lifetime;
        self.obtained_at = Some(now);
    }
}

// hand-rolled so secrets never end up in logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("expires_in", &self.expires_in)
            .field("auto_refresh", &self.auto_refresh)
            .field("policy", &self.policy)
            .field("has_token", &self.token.is_some())
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}
