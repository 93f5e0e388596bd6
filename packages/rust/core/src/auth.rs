//! Registration, login and password hashing.
//!
//! Passwords are stored as a salted SHA-256 digest. Login issues an opaque
//! session token; the HTTP layer only checks that a token is present except
//! on assistant routes, which resolve it to a user.

use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use studycards_shared::validators::validate_registration;
use studycards_shared::{LoginRequest, Result, StudyCardsError, User, UserCreate, new_token};
use studycards_storage::Storage;

/// Successful login: a session token and the user it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Hex-encoded SHA-256 of `salt` followed by `password`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compare in constant time so response timing leaks nothing about the hash.
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let actual = hash_password(password, salt);
    actual.as_bytes().ct_eq(expected_hash.as_bytes()).into()
}

/// Validate and store a new user.
#[instrument(skip_all, fields(email = %dto.email))]
pub async fn register(storage: &Storage, dto: &UserCreate) -> Result<User> {
    validate_registration(dto)?;

    let salt = new_token();
    let hash = hash_password(&dto.password, &salt);
    storage
        .insert_user(&dto.email, &dto.username, &hash, &salt)
        .await
}

/// Check credentials and open a session.
#[instrument(skip_all, fields(email = %req.email))]
pub async fn login(storage: &Storage, req: &LoginRequest) -> Result<LoginResponse> {
    let Some(creds) = storage.get_credentials_by_email(&req.email).await? else {
        warn!("login for unknown email");
        return Err(invalid_credentials());
    };

    if !verify_password(&req.password, &creds.password_salt, &creds.password_hash) {
        warn!(user_id = %creds.user.id, "login with wrong password");
        return Err(invalid_credentials());
    }

    let token = storage.create_session(&creds.user.id).await?;
    info!(user_id = %creds.user.id, "user logged in");

    Ok(LoginResponse {
        token,
        user: creds.user,
    })
}

fn invalid_credentials() -> StudyCardsError {
    StudyCardsError::Unauthorized("Invalid credentials".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(email: &str, password: &str) -> UserCreate {
        UserCreate {
            email: email.into(),
            username: "ada".into(),
            password: password.into(),
        }
    }

    #[test]
    fn hashing_depends_on_salt() {
        let a = hash_password("Passw0rd", "salt-a");
        let b = hash_password("Passw0rd", "salt-b");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(verify_password("Passw0rd", "salt-a", &a));
        assert!(!verify_password("passw0rd", "salt-a", &a));
        assert!(!verify_password("Passw0rd", "salt-a", &a[..63]));
        assert!(!verify_password("Passw0rd", "salt-a", ""));
    }

    #[tokio::test]
    async fn register_then_login() {
        let storage = Storage::open_in_memory().await.unwrap();
        let user = register(&storage, &registration("ada@example.com", "Passw0rd"))
            .await
            .expect("register");

        let session = login(
            &storage,
            &LoginRequest {
                email: "ada@example.com".into(),
                password: "Passw0rd".into(),
            },
        )
        .await
        .expect("login");
        assert_eq!(session.user.id, user.id);
        assert_eq!(
            storage.session_user(&session.token).await.unwrap(),
            Some(user.id)
        );

        // Random v4 tokens, not time-prefixed ids.
        assert_eq!(session.token.len(), 32);
        assert_eq!(&session.token[12..13], "4");
        assert!(session.token.chars().all(|c| c.is_ascii_hexdigit()));

        let json = serde_json::to_value(&session).unwrap();
        assert!(json["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let storage = Storage::open_in_memory().await.unwrap();
        register(&storage, &registration("ada@example.com", "Passw0rd"))
            .await
            .unwrap();

        for (email, password) in [("ada@example.com", "Wr0ngPass"), ("bob@example.com", "Passw0rd")] {
            let err = login(
                &storage,
                &LoginRequest {
                    email: email.into(),
                    password: password.into(),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, StudyCardsError::Unauthorized(ref m) if m == "Invalid credentials"));
        }
    }

    #[tokio::test]
    async fn registration_is_validated() {
        let storage = Storage::open_in_memory().await.unwrap();
        let err = register(&storage, &registration("ada@example.com", "weak"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudyCardsError::Validation { .. }));

        register(&storage, &registration("ada@example.com", "Passw0rd"))
            .await
            .unwrap();
        let err = register(&storage, &registration("ada@example.com", "Passw0rd"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudyCardsError::Conflict(_)));
    }
}
