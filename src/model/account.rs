use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{generate_token, Id};

/// A researcher account. Subjects never get one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_joined: DateTime<Utc>,
}

/// Input model for creating a user; the password is already hashed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
}

/// Registration form as posted by the sign-up page
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Server-side login session, keyed by the token stored in the cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Id, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: generate_token(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let session = Session::new(7, Duration::hours(1));

        assert_eq!(session.user_id, 7);
        assert!(!session.is_expired_at(session.created_at));
        assert!(session.is_expired_at(session.created_at + Duration::hours(1)));
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User {
            id: 1,
            username: "alice".to_string(),
            email: None,
            password_hash: "sha256$1$salt$abc".to_string(),
            date_joined: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }
}
