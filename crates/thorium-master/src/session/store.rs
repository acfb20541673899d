//! Single-login session registry on top of [`SessionCache`].

use std::time::Duration;

use thorium_core::model::Character;
use tracing::{debug, warn};

use super::cache::SessionCache;
use crate::auth::TokenAuthority;

const USER_TOKEN: &str = "userToken";
const CHARACTER_TOKEN: &str = "characterToken";
const CHARACTER_DATA: &str = "characterData";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session already active")]
    AlreadyActive,

    #[error("Session not found")]
    NotFound,

    #[error("Invalid session")]
    Invalid,

    #[error("Corrupt character snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

fn session_key(uid: i64) -> String {
    format!("sessions/user/{uid}")
}

/// Maps an account id to its one live session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    cache: SessionCache,
    expire_after: Duration,
}

impl SessionStore {
    pub const fn new(cache: SessionCache, expire_after: Duration) -> Self {
        Self {
            cache,
            expire_after,
        }
    }

    pub const fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Start a session for `uid`. Fails if one is already live, leaving the
    /// existing token in place.
    pub async fn begin_session(&self, uid: i64, token: &str) -> Result<(), SessionError> {
        let key = session_key(uid);
        if !self.cache.hset_if_absent(&key, USER_TOKEN, token).await {
            debug!(uid, "Session already active");
            return Err(SessionError::AlreadyActive);
        }
        self.cache.expire(&key, self.expire_after).await;
        debug!(uid, "Session started");
        Ok(())
    }

    pub async fn active_token(&self, uid: i64) -> Result<String, SessionError> {
        self.cache
            .hget(&session_key(uid), USER_TOKEN)
            .await
            .ok_or(SessionError::NotFound)
    }

    pub async fn end_session(&self, uid: i64) -> Result<(), SessionError> {
        if self.cache.del(&session_key(uid)).await {
            debug!(uid, "Session ended");
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }

    /// Associate the selected character with the session and restart its
    /// expiry window.
    pub async fn attach_character(
        &self,
        uid: i64,
        character_token: &str,
        snapshot: &Character,
    ) -> Result<(), SessionError> {
        let key = session_key(uid);
        let data = serde_json::to_string(snapshot)?;
        let fields = [
            (CHARACTER_TOKEN, character_token.to_owned()),
            (CHARACTER_DATA, data),
        ];
        if !self.cache.hset_existing(&key, &fields).await {
            return Err(SessionError::NotFound);
        }
        self.cache.expire(&key, self.expire_after).await;
        Ok(())
    }

    /// The attached character token and its snapshot.
    pub async fn attached_character(&self, uid: i64) -> Result<(String, Character), SessionError> {
        let key = session_key(uid);
        let token = self
            .cache
            .hget(&key, CHARACTER_TOKEN)
            .await
            .ok_or(SessionError::NotFound)?;
        let data = self
            .cache
            .hget(&key, CHARACTER_DATA)
            .await
            .ok_or(SessionError::NotFound)?;
        Ok((token, serde_json::from_str(&data)?))
    }

    /// Replace the attached snapshot if it belongs to the same character.
    ///
    /// Returns `false` when no session or a different character is attached.
    /// Does not touch the expiry window.
    pub async fn refresh_snapshot(
        &self,
        uid: i64,
        snapshot: &Character,
    ) -> Result<bool, SessionError> {
        match self.attached_character(uid).await {
            Ok((_, current)) if current.character_id == snapshot.character_id => {
                let data = serde_json::to_string(snapshot)?;
                Ok(self
                    .cache
                    .hset_existing(&session_key(uid), &[(CHARACTER_DATA, data)])
                    .await)
            }
            Ok(_) | Err(SessionError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Resolve a session key to its account id.
    ///
    /// The key must verify as an account token and match the token stored
    /// for that account, so ended or expired sessions are rejected even
    /// though their signature is still good.
    pub async fn validate(
        &self,
        tokens: &TokenAuthority,
        session_key: &str,
    ) -> Result<i64, SessionError> {
        let uid = tokens.verify_account(session_key).map_err(|e| {
            warn!(error = %e, "Rejected session key");
            SessionError::Invalid
        })?;
        match self.active_token(uid).await {
            Ok(stored) if stored == session_key => Ok(uid),
            _ => {
                warn!(uid, "Session key is not the live session");
                Err(SessionError::Invalid)
            }
        }
    }
}
