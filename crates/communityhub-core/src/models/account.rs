//! Account models: the authenticated session principal and its profile row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role tag carried by the privileged principal's session and profile.
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated principal recognized for the current run.
///
/// Deserializes directly from the auth service's `user` object; extra
/// fields on that object are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn is_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }
}

/// Row from the `profiles` table, keyed by the session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Name to show for the principal, falling back to the email.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_auth_user_object() {
        let json = r#"{
            "id": "8f1d2c3b-0000-4000-8000-000000000001",
            "aud": "authenticated",
            "role": "authenticated",
            "email": "user@x.com",
            "email_confirmed_at": "2024-03-01T10:00:00Z",
            "created_at": "2024-02-28T09:30:00.123456Z",
            "app_metadata": {"provider": "email"}
        }"#;
        let session: Session = serde_json::from_str(json).expect("parse user");
        assert_eq!(session.email, "user@x.com");
        assert_eq!(session.role, "authenticated");
        assert!(session.is_confirmed());
        assert!(!session.is_admin());
    }

    #[test]
    fn test_profile_display_name() {
        let mut profile = Profile {
            id: "1".to_string(),
            email: Some("jane@example.com".to_string()),
            full_name: Some("Jane Doe".to_string()),
            role: None,
            created_at: None,
        };
        assert_eq!(profile.display_name(), "Jane Doe");

        profile.full_name = Some(String::new());
        assert_eq!(profile.display_name(), "jane@example.com");

        profile.email = None;
        assert_eq!(profile.display_name(), "Unknown");
    }

    #[test]
    fn test_profile_with_null_columns() {
        let json = r#"{"id":"abc","full_name":null,"role":"admin","created_at":null}"#;
        let profile: Profile = serde_json::from_str(json).expect("parse profile");
        assert!(profile.is_admin());
        assert!(profile.email.is_none());
    }
}
