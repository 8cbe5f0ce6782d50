use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

/// The signed-in user and their token. Persisted as JSON so a later run can
/// reuse it; nothing is cached implicitly, callers pass it to each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user: SessionUser,
    pub token: String,
}

impl SessionContext {
    pub fn new(user: SessionUser, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }

    /// `None` when no session was saved.
    pub fn load(path: &Path) -> Result<Option<Self>, ClientError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Removing a session that was never saved is not an error.
    pub fn clear(path: &Path) -> Result<(), ClientError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == "admin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionContext {
        SessionContext::new(
            SessionUser {
                id: Uuid::new_v4(),
                name: "Front Desk".into(),
                email: "desk@example.com".into(),
                role: "receptionist".into(),
            },
            "token-123",
        )
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let original = session();
        original.save(&path).unwrap();

        let loaded = SessionContext::load(&path).unwrap();
        assert_eq!(loaded, Some(original));
    }

    #[test]
    fn test_clear_removes_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        session().save(&path).unwrap();
        SessionContext::clear(&path).unwrap();

        assert!(!path.exists());
        assert_eq!(SessionContext::load(&path).unwrap(), None);
        SessionContext::clear(&path).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(SessionContext::load(&path), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_bearer_header() {
        let s = session();
        assert_eq!(s.bearer(), "Bearer token-123");
        assert!(!s.is_admin());
    }
}
