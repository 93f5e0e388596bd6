//! User accounts and login sessions.

use chrono::Utc;
use libsql::params;
use studycards_shared::{Result, StudyCardsError, User, UserPreferences, UserUpdate, new_id, new_token};

use crate::{Storage, get_string, get_time, is_unique_violation, storage_err};

const USER_COLUMNS: &str = "id, email, username, preferences_json, created_at, updated_at";

/// A user together with the stored password hash and salt.
///
/// Only the auth layer sees this; API responses carry the bare [`User`].
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
    pub password_salt: String,
}

impl Storage {
    /// Insert a new user. Fails with `Conflict` if the email is taken.
    pub async fn insert_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        password_salt: &str,
    ) -> Result<User> {
        let email = email.trim().to_lowercase();
        let _guard = self.write_lock().await;
        if self.email_taken(&email, None).await? {
            return Err(StudyCardsError::Conflict("Email already registered".into()));
        }

        let now = Utc::now();
        let user = User {
            id: new_id(),
            email,
            username: username.trim().to_string(),
            created_at: now,
            updated_at: now,
            decks: Vec::new(),
            preferences: UserPreferences::default(),
        };

        self.conn
            .execute(
                "INSERT INTO users (id, email, username, password_hash, password_salt, preferences_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.as_str(),
                    user.email.as_str(),
                    user.username.as_str(),
                    password_hash,
                    password_salt,
                    preferences_to_json(&user.preferences)?,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(email_conflict)?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get a user by ID, failing with `NotFound` when absent.
    pub async fn require_user(&self, id: &str) -> Result<User> {
        self.get_user(id)
            .await?
            .ok_or_else(|| StudyCardsError::not_found("user", id))
    }

    /// Look up a user and their password material by email.
    pub async fn get_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {USER_COLUMNS}, password_hash, password_salt FROM users WHERE email = ?1"
                ),
                params![email.trim().to_lowercase()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Credentials {
                user: row_to_user(&row)?,
                password_hash: get_string(&row, 6)?,
                password_salt: get_string(&row, 7)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List all users in registration order.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid"),
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_user(&row)?);
        }
        Ok(results)
    }

    /// Apply a partial profile update and return the updated user.
    pub async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User> {
        let _guard = self.write_lock().await;
        let mut user = self.require_user(id).await?;

        if let Some(email) = update.email {
            let email = email.trim().to_lowercase();
            if self.email_taken(&email, Some(id)).await? {
                return Err(StudyCardsError::Conflict("Email already registered".into()));
            }
            user.email = email;
        }
        if let Some(username) = update.username {
            user.username = username.trim().to_string();
        }
        if let Some(preferences) = update.preferences {
            user.preferences.apply(preferences);
        }
        user.updated_at = Utc::now();

        self.conn
            .execute(
                "UPDATE users SET email = ?1, username = ?2, preferences_json = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    user.email.as_str(),
                    user.username.as_str(),
                    preferences_to_json(&user.preferences)?,
                    user.updated_at.to_rfc3339(),
                    user.id.as_str(),
                ],
            )
            .await
            .map_err(email_conflict)?;

        Ok(user)
    }

    /// Issue a new session token for `user_id`.
    pub async fn create_session(&self, user_id: &str) -> Result<String> {
        let token = new_token();
        let _guard = self.write_lock().await;
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![token.as_str(), user_id, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(user_id, "session created");
        Ok(token)
    }

    /// Resolve a session token to its user ID.
    pub async fn session_user(&self, token: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id FROM sessions WHERE token = ?1",
                params![token],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(get_string(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn email_taken(&self, email: &str, except_id: Option<&str>) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let owner = get_string(&row, 0)?;
                Ok(Some(owner.as_str()) != except_id)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }
}

/// The `users.email` UNIQUE index is the final word on duplicates.
fn email_conflict(e: libsql::Error) -> StudyCardsError {
    if is_unique_violation(&e) {
        StudyCardsError::Conflict("Email already registered".into())
    } else {
        storage_err(e)
    }
}

fn preferences_to_json(preferences: &UserPreferences) -> Result<String> {
    serde_json::to_string(preferences).map_err(storage_err)
}

/// Convert a row selected with `USER_COLUMNS` to a [`User`] without decks.
fn row_to_user(row: &libsql::Row) -> Result<User> {
    let preferences: UserPreferences = serde_json::from_str(&get_string(row, 3)?)
        .map_err(|e| StudyCardsError::Storage(format!("invalid preferences: {e}")))?;

    Ok(User {
        id: get_string(row, 0)?,
        email: get_string(row, 1)?,
        username: get_string(row, 2)?,
        preferences,
        created_at: get_time(row, 4)?,
        updated_at: get_time(row, 5)?,
        decks: Vec::new(),
    })
}
