use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::User;

/// Durable entry holding the opaque bearer token.
const TOKEN_FILE: &str = "token";

/// Durable entry holding the signed-in identity record.
const USER_FILE: &str = "user.json";

/// The process-wide session: bearer token plus signed-in identity.
///
/// The store is the only writer of the durable entries; they mirror
/// memory and are written or removed together. Token and user are set
/// and cleared as a pair, and the authenticated flag is always derived
/// from token presence, never stored.
pub struct SessionStore {
    state_dir: PathBuf,
    token: Option<String>,
    user: Option<User>,
}

impl SessionStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            token: None,
            user: None,
        }
    }

    /// Restore the session from disk. Called once at process start.
    ///
    /// Both entries must be present and well-formed; anything else leaves
    /// the session empty, and a stray single entry is removed so the disk
    /// layout stays both-or-neither. Returns whether a session was
    /// restored.
    pub fn bootstrap(&mut self) -> bool {
        let token_path = self.state_dir.join(TOKEN_FILE);
        let user_path = self.state_dir.join(USER_FILE);

        let token = std::fs::read_to_string(&token_path)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let user = std::fs::read_to_string(&user_path)
            .ok()
            .and_then(|contents| serde_json::from_str::<User>(&contents).ok());

        match (token, user) {
            (Some(token), Some(user)) => {
                debug!(email = %user.email, "Session restored");
                self.token = Some(token);
                self.user = Some(user);
                true
            }
            (None, None) => false,
            _ => {
                warn!("Inconsistent persisted session, starting empty");
                let _ = std::fs::remove_file(&token_path);
                let _ = std::fs::remove_file(&user_path);
                false
            }
        }
    }

    /// Replace the session wholesale and mirror it to disk.
    ///
    /// A failed write is logged and otherwise ignored: the in-memory
    /// session stays authoritative for the rest of the process.
    pub fn set_credentials(&mut self, token: String, user: User) {
        self.token = Some(token);
        self.user = Some(user);
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Clear the session and remove both durable entries.
    pub fn clear(&mut self) {
        self.token = None;
        self.user = None;
        for name in [TOKEN_FILE, USER_FILE] {
            let path = self.state_dir.join(name);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(error = %e, entry = name, "Failed to remove session entry");
                }
            }
        }
    }

    /// Get the bearer token if a session is held.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Get the signed-in identity if a session is held.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// True iff a token is held.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn persist(&self) -> Result<()> {
        let token = self.token.as_deref().context("no token to persist")?;
        let user = self.user.as_ref().context("no user to persist")?;

        std::fs::create_dir_all(&self.state_dir)
            .context("Failed to create state directory")?;
        std::fs::write(self.state_dir.join(TOKEN_FILE), token)
            .context("Failed to write token entry")?;
        let contents = serde_json::to_string_pretty(user)?;
        std::fs::write(self.state_dir.join(USER_FILE), contents)
            .context("Failed to write user entry")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: "66b1f0c2a4".to_string(),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    #[test]
    fn test_bootstrap_with_nothing_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().to_path_buf());

        assert!(!store.bootstrap());
        assert!(!store.is_authenticated());
        assert!(store.token().is_none());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_set_credentials_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = SessionStore::new(dir.path().to_path_buf());
        store.set_credentials("tok-123".to_string(), test_user());
        assert!(store.is_authenticated());

        // A fresh store over the same directory restores the same session.
        let mut restored = SessionStore::new(dir.path().to_path_buf());
        assert!(restored.bootstrap());
        assert_eq!(restored.token(), Some("tok-123"));
        assert_eq!(restored.user(), Some(&test_user()));
        assert!(restored.is_authenticated());
    }

    #[test]
    fn test_clear_resets_everything() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = SessionStore::new(dir.path().to_path_buf());
        store.set_credentials("tok-123".to_string(), test_user());
        store.clear();

        assert!(!store.is_authenticated());
        assert!(store.token().is_none());
        assert!(store.user().is_none());

        let mut restored = SessionStore::new(dir.path().to_path_buf());
        assert!(!restored.bootstrap());
    }

    #[test]
    fn test_clear_without_prior_session_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(dir.path().to_path_buf());
        store.clear();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_stray_single_entry_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "orphan-token").unwrap();

        let mut store = SessionStore::new(dir.path().to_path_buf());
        assert!(!store.bootstrap());
        assert!(!store.is_authenticated());
        // The orphan entry is gone; a second bootstrap sees a clean slate.
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }

    #[test]
    fn test_malformed_user_record_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "tok-123").unwrap();
        std::fs::write(dir.path().join(USER_FILE), "{not json").unwrap();

        let mut store = SessionStore::new(dir.path().to_path_buf());
        assert!(!store.bootstrap());
        assert!(!store.is_authenticated());
    }
}
