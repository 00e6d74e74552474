//! Per-user desktop login secrets
//!
//! These gate the desktop login itself, independently of the provider's
//! identity-aware access policy in front of the hostname.

use std::path::Path;

use rand::rngs::OsRng;
use rand::{CryptoRng, Rng};

use crate::artifact;
use crate::error::SessionError;

pub const SECRET_LEN: usize = 16;

/// Alphanumerics without the look-alikes `0 O o 1 l I`
pub const SECRET_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// One `username:secret` pair
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub username: String,
    pub secret: String,
}

impl UserCredential {
    /// The line written to the credentials file
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.username, self.secret)
    }
}

impl std::fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Validate a login name (alphanumerics, dots, hyphens, underscores)
pub fn validate_username(name: &str) -> Result<(), SessionError> {
    if name.is_empty() {
        return Err(SessionError::InvalidInput(
            "username cannot be empty".to_string(),
        ));
    }
    if name.len() > 32 {
        return Err(SessionError::InvalidInput(format!(
            "username '{}' is longer than 32 characters",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(SessionError::InvalidInput(format!(
            "username '{}' may only contain letters, digits, '.', '-' and '_'",
            name
        )));
    }
    Ok(())
}

pub fn mint_secret<R: Rng + CryptoRng>(rng: &mut R) -> String {
    (0..SECRET_LEN)
        .map(|_| SECRET_ALPHABET[rng.gen_range(0..SECRET_ALPHABET.len())] as char)
        .collect()
}

/// Mint one secret per username from the OS entropy source
pub fn mint(usernames: &[String]) -> Vec<UserCredential> {
    let mut rng = OsRng;
    usernames
        .iter()
        .map(|username| UserCredential {
            username: username.clone(),
            secret: mint_secret(&mut rng),
        })
        .collect()
}

/// Append the credentials to a 0600 per-session file
pub async fn write(path: &Path, credentials: &[UserCredential]) -> Result<(), SessionError> {
    let mut contents = String::new();
    for credential in credentials {
        contents.push_str(&credential.to_line());
        contents.push('\n');
    }
    artifact::append_private(path, contents.as_bytes()).await
}
