use serde::{ Deserialize, Deserializer, Serialize };
use std::fmt;

/// Identifier of a chat user.
///
/// The backend hands out ids as strings in some payloads and as numbers in
/// others, so every id is normalised to its string form and compared that way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        UserId(id)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: Deserializer<'de> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => UserId(text),
            RawId::Number(number) => UserId(number.to_string()),
        })
    }
}

/// A user as returned by the search and recent-chat endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(rename = "username", default)]
    pub display_name: String,
    #[serde(rename = "profilePicture", default, skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserSummary {
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_path: None,
            email: None,
        }
    }

    /// Secondary line shown under the name in search results.
    pub fn subtitle(&self) -> &str {
        self.email.as_deref().filter(|e| !e.is_empty()).unwrap_or("User")
    }
}

/// The signed-in user's own header data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub avatar_path: Option<String>,
}

// --- HTTP response schemas ---

#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUser {
    #[serde(default)]
    pub username: String,
    #[serde(rename = "profilePicture", default)]
    pub profile_picture: Option<String>,
}

impl From<ProfileResponse> for Profile {
    fn from(resp: ProfileResponse) -> Self {
        Profile {
            username: resp.user.username,
            avatar_path: resp.user.profile_picture.filter(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentChatsResponse {
    #[serde(default)]
    pub chats: Option<Vec<UserSummary>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub users: Option<Vec<UserSummary>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_accepts_numbers_and_strings() {
        let from_number: UserId = serde_json::from_str("42").unwrap();
        let from_text: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(from_number.as_str(), "42");
    }

    #[test]
    fn user_summary_reads_backend_field_names() {
        let json = r#"{"_id":"abc","username":"alice","profilePicture":"/uploads/a.png"}"#;
        let user: UserSummary = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, UserId::from("abc"));
        assert_eq!(user.display_name, "alice");
        assert_eq!(user.avatar_path.as_deref(), Some("/uploads/a.png"));
        assert_eq!(user.subtitle(), "User");
    }

    #[test]
    fn user_summary_without_id_is_rejected() {
        let json = r#"{"username":"ghost"}"#;
        assert!(serde_json::from_str::<UserSummary>(json).is_err());
    }

    #[test]
    fn missing_or_null_lists_decode_as_none() {
        let recent: RecentChatsResponse = serde_json::from_str("{}").unwrap();
        assert!(recent.chats.is_none());
        let search: SearchResponse = serde_json::from_str(r#"{"users":null}"#).unwrap();
        assert!(search.users.is_none());
    }

    #[test]
    fn profile_drops_empty_avatar_path() {
        let resp: ProfileResponse = serde_json
            ::from_str(r#"{"user":{"username":"bob","profilePicture":""}}"#)
            .unwrap();
        let profile = Profile::from(resp);
        assert_eq!(profile.username, "bob");
        assert!(profile.avatar_path.is_none());
    }
}
