//! Account registration, login and character management.

use std::sync::Arc;

use thorium_core::db::DatabaseError;
use thorium_core::model::{Character, CharacterState};
use thorium_core::wire::LoginResponse;
use tracing::{info, warn};

use crate::auth::{Subject, TokenAuthority, TokenError, password};
use crate::session::{SessionError, SessionStore};
use crate::storage::MasterDatabase;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Character name already taken")]
    NameTaken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session already active")]
    AlreadyActive,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Character not found")]
    CharacterNotFound,

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Corrupt character snapshot: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<SessionError> for AccountError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadyActive => Self::AlreadyActive,
            SessionError::NotFound | SessionError::Invalid => Self::InvalidSession,
            SessionError::Snapshot(e) => Self::Snapshot(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AccountService {
    db: MasterDatabase,
    sessions: SessionStore,
    tokens: Arc<TokenAuthority>,
}

impl AccountService {
    pub const fn new(
        db: MasterDatabase,
        sessions: SessionStore,
        tokens: Arc<TokenAuthority>,
    ) -> Self {
        Self {
            db,
            sessions,
            tokens,
        }
    }

    /// Create an account and log it in.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidInput(
                "username and password are required".into(),
            ));
        }

        let hash =
            password::hash_password(password).map_err(|e| AccountError::Hash(e.to_string()))?;
        let account = match self.db.create_account(username, &hash).await {
            Ok(account) => account,
            Err(DatabaseError::Conflict(_)) => return Err(AccountError::UsernameTaken),
            Err(e) => return Err(e.into()),
        };

        let session_key = self.tokens.issue(Subject::Account {
            uid: account.user_id,
        })?;
        self.sessions
            .begin_session(account.user_id, &session_key)
            .await?;

        info!(uid = account.user_id, username, "Account registered");
        Ok(LoginResponse {
            session_key,
            character_ids: Vec::new(),
        })
    }

    /// Log in, failing if the account already has a live session.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, AccountError> {
        let account = match self.db.get_account_by_username(username).await {
            Ok(account) => account,
            Err(DatabaseError::NotFound(_)) => return Err(AccountError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        if !password::verify_password(password, &account.password_hash) {
            warn!(username, "Failed login attempt");
            return Err(AccountError::InvalidCredentials);
        }

        let session_key = self.tokens.issue(Subject::Account {
            uid: account.user_id,
        })?;
        self.sessions
            .begin_session(account.user_id, &session_key)
            .await?;
        self.db.touch_last_login(account.user_id).await?;

        let character_ids = self.db.character_ids(account.user_id).await?;
        info!(uid = account.user_id, username, "Account logged in");
        Ok(LoginResponse {
            session_key,
            character_ids,
        })
    }

    /// End a session, first writing back any attached character.
    ///
    /// If the write fails the session stays live so nothing is lost.
    pub async fn disconnect(&self, session_key: &str) -> Result<(), AccountError> {
        let uid = self.sessions.validate(&self.tokens, session_key).await?;

        match self.sessions.attached_character(uid).await {
            Ok((_, snapshot)) => self.db.save_character(&snapshot).await?,
            Err(SessionError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        self.db.touch_last_login(uid).await?;
        self.sessions.end_session(uid).await?;

        info!(uid, "Account disconnected");
        Ok(())
    }

    pub async fn create_character(
        &self,
        session_key: &str,
        name: &str,
        class_id: i64,
    ) -> Result<i64, AccountError> {
        let uid = self.sessions.validate(&self.tokens, session_key).await?;
        if name.is_empty() {
            return Err(AccountError::InvalidInput("name is required".into()));
        }

        let state = CharacterState::for_class(class_id);
        match self.db.create_character(uid, name, &state).await {
            Ok(id) => {
                info!(uid, character_id = id, name, "Character created");
                Ok(id)
            }
            Err(DatabaseError::Conflict(_)) => Err(AccountError::NameTaken),
            Err(e) => Err(e.into()),
        }
    }

    /// Select one of the session's characters and attach it to the session.
    pub async fn select_character(
        &self,
        session_key: &str,
        character_id: i64,
    ) -> Result<Character, AccountError> {
        let uid = self.sessions.validate(&self.tokens, session_key).await?;

        let row = match self.db.get_owned_character(uid, character_id).await {
            Ok(row) => row,
            Err(DatabaseError::NotFound(_)) => return Err(AccountError::CharacterNotFound),
            Err(e) => return Err(e.into()),
        };
        let character = row
            .into_character()
            .map_err(|e| AccountError::Snapshot(e.to_string()))?;

        let character_token = self.tokens.issue(Subject::Character {
            uid,
            id: character_id,
        })?;
        self.sessions
            .attach_character(uid, &character_token, &character)
            .await?;

        info!(uid, character_id, "Character selected");
        Ok(character)
    }
}
