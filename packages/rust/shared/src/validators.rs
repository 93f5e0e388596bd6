//! Input validation for registration and card/deck payloads.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, StudyCardsError};
use crate::types::{CardCreate, DeckCreate, UserCreate};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// `local@domain.tld` with no whitespace.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Alphanumeric with underscores, 3-20 characters.
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("username regex"));

pub fn is_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// At least 8 alphanumeric characters with one lowercase, one uppercase
/// and one digit.
pub fn is_password_strong(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
        && password.chars().all(|c| c.is_ascii_alphanumeric())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

pub fn is_not_empty(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Validate a card creation payload.
pub fn validate_card(dto: &CardCreate) -> Result<()> {
    if !is_not_empty(&dto.front) {
        return Err(StudyCardsError::validation("card front must not be empty"));
    }
    if !is_not_empty(&dto.back) {
        return Err(StudyCardsError::validation("card back must not be empty"));
    }
    Ok(())
}

/// Validate a deck creation payload.
pub fn validate_deck(dto: &DeckCreate) -> Result<()> {
    if !is_not_empty(&dto.name) {
        return Err(StudyCardsError::validation("deck name must not be empty"));
    }
    Ok(())
}

/// Validate a registration payload.
pub fn validate_registration(dto: &UserCreate) -> Result<()> {
    if !is_email(&dto.email) {
        return Err(StudyCardsError::validation(format!(
            "invalid email address: {}",
            dto.email
        )));
    }
    if !is_username(&dto.username) {
        return Err(StudyCardsError::validation(
            "username must be 3-20 letters, digits or underscores",
        ));
    }
    if !is_password_strong(&dto.password) {
        return Err(StudyCardsError::validation(
            "password must be at least 8 characters with upper, lower case and a digit",
        ));
    }
    Ok(())
}
