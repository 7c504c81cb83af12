mod http;

pub use http::HttpChatApi;

use async_trait::async_trait;

use crate::error::ChatResult;
use crate::models::user::{ Profile, UserSummary };

/// The HTTP backend that serves profile, recent-chat and search data.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn profile(&self) -> ChatResult<Profile>;

    async fn recent_chats(&self) -> ChatResult<Vec<UserSummary>>;

    async fn search(&self, query: &str) -> ChatResult<Vec<UserSummary>>;
}

/// Resolves an avatar path served by the backend into a full URL.
pub fn avatar_url(base_url: &str, path: Option<&str>, placeholder: &str) -> String {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        None => placeholder.to_string(),
        Some(p) if p.starts_with("http://") || p.starts_with("https://") => p.to_string(),
        Some(p) if p.starts_with('/') => format!("{}{}", base_url.trim_end_matches('/'), p),
        Some(p) => format!("{}/{}", base_url.trim_end_matches('/'), p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACEHOLDER: &str = "https://via.placeholder.com/40";

    #[test]
    fn avatar_url_joins_relative_paths() {
        assert_eq!(
            avatar_url("http://localhost:3000/", Some("/uploads/a.png"), PLACEHOLDER),
            "http://localhost:3000/uploads/a.png"
        );
        assert_eq!(
            avatar_url("http://localhost:3000", Some("uploads/a.png"), PLACEHOLDER),
            "http://localhost:3000/uploads/a.png"
        );
    }

    #[test]
    fn avatar_url_falls_back_to_placeholder() {
        assert_eq!(avatar_url("http://localhost:3000", None, PLACEHOLDER), PLACEHOLDER);
        assert_eq!(avatar_url("http://localhost:3000", Some("  "), PLACEHOLDER), PLACEHOLDER);
    }

    #[test]
    fn absolute_avatar_urls_pass_through() {
        let cdn = "https://cdn.example.com/a.png";
        assert_eq!(avatar_url("http://localhost:3000", Some(cdn), PLACEHOLDER), cdn);
    }
}
