use serde::{Deserialize, Serialize};

/// The authenticated identity of a signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    /// Minimal shape checks done before the backend sees the request
    pub fn validate(&self) -> Result<(), String> {
        if self.display_name.trim().is_empty() {
            return Err("Display name cannot be empty".to_string());
        }
        if !self.email.contains('@') {
            return Err("Email address is not valid".to_string());
        }
        if self.password.len() < 6 {
            return Err("Password must be at least 6 characters".to_string());
        }
        Ok(())
    }
}

/// Editable profile of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub favorite_genre: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}
