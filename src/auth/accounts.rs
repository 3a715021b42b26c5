//! Account registration, login and session resolution.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::auth::password::{hash_password, new_salt, new_session_token, verify_password};
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{ConversationId, UserId};
use crate::chat::engine::core::RequestContext;
use crate::chat::storage::conversation_store::ConversationStore;
use crate::chat::storage::session_store::{SessionRecord, SessionStore};
use crate::chat::storage::user_store::{UserRecord, UserStore, normalize_username};

const USERNAME_MAX_CHARS: usize = 32;
const PASSWORD_MIN_CHARS: usize = 6;

/// A freshly issued session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedSession {
    /// Bearer token.
    pub token: String,
    /// Authenticated user.
    pub user_id: UserId,
    /// Normalized username.
    pub username: String,
    /// Conversation bound at login.
    pub conversation_id: Option<ConversationId>,
}

/// Users and sessions.
pub struct AccountService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl AccountService {
    /// Create a new account service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            users,
            sessions,
            conversations,
        }
    }

    /// Register a user and log them in.
    ///
    /// # Errors
    /// Returns [`ChatError::Validation`] for a malformed username or short
    /// password, [`ChatError::Conflict`] if the name is taken, or an error if
    /// storage access fails.
    pub async fn signup(&self, username: &str, password: &str) -> ChatResult<IssuedSession> {
        let username = validate_username(username)?;
        if password.chars().count() < PASSWORD_MIN_CHARS {
            return Err(ChatError::Validation(format!(
                "Password must be at least {PASSWORD_MIN_CHARS} characters"
            )));
        }

        let salt = new_salt();
        let record = UserRecord {
            user_id: UserId::new(),
            username,
            password_hash: hash_password(password, &salt),
            salt,
            created_at: Utc::now(),
        };
        self.users.create_user(record.clone()).await?;
        info!(user_id = %record.user_id, "User registered");

        self.issue(record.user_id, record.username, None).await
    }

    /// Verify credentials and open a session bound to the user's most recent
    /// conversation.
    ///
    /// # Errors
    /// Returns [`ChatError::InvalidCredentials`] for an unknown user or wrong
    /// password, or an error if storage access fails.
    pub async fn login(&self, username: &str, password: &str) -> ChatResult<IssuedSession> {
        let Some(record) = self.users.find_by_username(username).await? else {
            return Err(ChatError::InvalidCredentials);
        };
        if !verify_password(password, &record.salt, &record.password_hash) {
            return Err(ChatError::InvalidCredentials);
        }

        let recent = self
            .conversations
            .most_recent(record.user_id)
            .await?
            .map(|conversation| conversation.conversation_id);
        info!(user_id = %record.user_id, "User logged in");
        self.issue(record.user_id, record.username, recent).await
    }

    /// Remove a session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn logout(&self, token: &str) -> ChatResult<()> {
        self.sessions.delete(token).await
    }

    /// Resolve a token into a request context.
    ///
    /// # Errors
    /// Returns [`ChatError::AuthenticationRequired`] for an unknown token, or
    /// an error if storage access fails.
    pub async fn authenticate(&self, token: &str) -> ChatResult<RequestContext> {
        let session = self
            .sessions
            .get(token)
            .await?
            .ok_or(ChatError::AuthenticationRequired)?;
        Ok(RequestContext {
            user_id: session.user_id,
            session_token: Some(session.token),
            conversation_id: session.conversation_id,
        })
    }

    async fn issue(
        &self,
        user_id: UserId,
        username: String,
        conversation_id: Option<ConversationId>,
    ) -> ChatResult<IssuedSession> {
        let token = new_session_token();
        self.sessions
            .create(SessionRecord {
                token: token.clone(),
                user_id,
                conversation_id,
                created_at: Utc::now(),
            })
            .await?;
        Ok(IssuedSession {
            token,
            user_id,
            username,
            conversation_id,
        })
    }
}

fn validate_username(username: &str) -> ChatResult<String> {
    let username = normalize_username(username);
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if username.is_empty() || username.chars().count() > USERNAME_MAX_CHARS || !valid_chars {
        return Err(ChatError::Validation(format!(
            "Username must be 1-{USERNAME_MAX_CHARS} letters, digits, '_', '-' or '.'"
        )));
    }
    Ok(username)
}
