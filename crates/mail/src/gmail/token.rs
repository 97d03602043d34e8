//! Access token sources for the Gmail client
//!
//! Obtaining and refreshing OAuth tokens happens outside this crate. The
//! client only needs a bearer token, read either from the environment or
//! from the token file an external authorization step left in the config
//! directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding a ready-to-use access token
pub const ACCESS_TOKEN_ENV: &str = "GMAIL_ACCESS_TOKEN";

/// Token filename in the config directory
pub const TOKEN_FILE: &str = "gmail-tokens.json";

/// Seconds before expiry at which a stored token is no longer used
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Something that can hand out a bearer token for API calls
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

/// A fixed token, mostly useful for tests and one-off runs
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Token read from [`ACCESS_TOKEN_ENV`] on every call
pub struct EnvToken;

impl EnvToken {
    pub fn is_set() -> bool {
        std::env::var(ACCESS_TOKEN_ENV).is_ok_and(|t| !t.is_empty())
    }
}

impl TokenSource for EnvToken {
    fn access_token(&self) -> Result<String> {
        std::env::var(ACCESS_TOKEN_ENV)
            .with_context(|| format!("{} environment variable not set", ACCESS_TOKEN_ENV))
    }
}

/// Stored token data
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Token file written by an external authorization step
pub struct StoredTokenFile {
    path: PathBuf,
}

impl StoredTokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The token file in the default config directory
    pub fn default_location() -> Result<Self> {
        let path = config::config_path(TOKEN_FILE).context("Could not determine config directory")?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TokenSource for StoredTokenFile {
    fn access_token(&self) -> Result<String> {
        let token: StoredToken = config::load_json_file(&self.path)
            .with_context(|| format!("No stored token at {}", self.path.display()))?;

        // Tokens without an expiry are trusted as-is
        if let Some(expires_at) = token.expires_at {
            let now = chrono::Utc::now().timestamp();
            if expires_at <= now + EXPIRY_MARGIN_SECS {
                anyhow::bail!(
                    "Stored token at {} has expired; re-authorize to refresh it",
                    self.path.display()
                );
            }
        }
        Ok(token.access_token)
    }
}

/// [`EnvToken`] when the variable is set, else the stored token file
pub fn default_token_source() -> Result<Arc<dyn TokenSource>> {
    if EnvToken::is_set() {
        return Ok(Arc::new(EnvToken));
    }
    Ok(Arc::new(StoredTokenFile::default_location()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_token(dir: &TempDir, expires_at: Option<i64>) -> PathBuf {
        let path = dir.path().join(TOKEN_FILE);
        let token = StoredToken {
            access_token: "ya29.test".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at,
        };
        config::save_json_file(&path, &token).unwrap();
        path
    }

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new("abc").access_token().unwrap(), "abc");
    }

    #[test]
    fn test_stored_token_valid() {
        let dir = TempDir::new().unwrap();
        let expires = chrono::Utc::now().timestamp() + 3600;
        let source = StoredTokenFile::new(write_token(&dir, Some(expires)));
        assert_eq!(source.access_token().unwrap(), "ya29.test");
    }

    #[test]
    fn test_stored_token_expired() {
        let dir = TempDir::new().unwrap();
        let expires = chrono::Utc::now().timestamp() + 60;
        let source = StoredTokenFile::new(write_token(&dir, Some(expires)));
        let err = source.access_token().unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_stored_token_missing() {
        let dir = TempDir::new().unwrap();
        let source = StoredTokenFile::new(dir.path().join("absent.json"));
        assert!(source.access_token().is_err());
    }
}
