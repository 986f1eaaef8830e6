//! Stored OAuth credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's Spotify OAuth token as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Owner of the token
    pub user_id: String,

    /// Bearer token, absent until the first refresh
    pub access_token: Option<String>,

    /// Refresh token; without it the user must re-authorize
    pub refresh_token: Option<String>,

    /// When the access token stops being valid
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes, space separated
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            scope: None,
        }
    }

    pub fn with_access_token(
        mut self,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Access token that is still valid at `now`
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.access_token, self.expires_at) {
            (Some(token), Some(expires_at)) if expires_at > now => Some(token.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_usable_access_token() {
        let now = Utc::now();

        let token = StoredToken::new("u").with_access_token("abc", now + Duration::minutes(5));
        assert_eq!(token.usable_access_token(now), Some("abc"));

        let expired = StoredToken::new("u").with_access_token("abc", now - Duration::seconds(1));
        assert_eq!(expired.usable_access_token(now), None);

        assert_eq!(StoredToken::new("u").usable_access_token(now), None);
    }
}
