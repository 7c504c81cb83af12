use async_trait::async_trait;
use log::{ debug, error };
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use url::Url;

use super::ChatApi;
use crate::error::{ ChatError, ChatResult };
use crate::models::user::{
    Profile,
    ProfileResponse,
    RecentChatsResponse,
    SearchResponse,
    UserSummary,
};
use crate::session::Session;

pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, session: &Session) -> ChatResult<Self> {
        Url::parse(base_url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: session.token().to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, &str)]
    ) -> ChatResult<T> {
        let url = format!("{}{}", self.base_url, route);
        debug!("GET {}", url);

        let resp = self.client
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .query(query)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            error!("{} returned {}", route, status);
            return Err(ChatError::Status {
                endpoint: route.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ChatError::Schema {
            endpoint: route.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn profile(&self) -> ChatResult<Profile> {
        let resp: ProfileResponse = self.get_json("/profile", &[]).await?;
        Ok(resp.into())
    }

    async fn recent_chats(&self) -> ChatResult<Vec<UserSummary>> {
        let resp: RecentChatsResponse = self.get_json("/recent-chats", &[]).await?;
        Ok(resp.chats.unwrap_or_default())
    }

    async fn search(&self, query: &str) -> ChatResult<Vec<UserSummary>> {
        let resp: SearchResponse = self.get_json("/chat-search", &[("q", query)]).await?;
        Ok(resp.users.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_token;
    use serde_json::json;
    use tokio::io::{ AsyncReadExt, AsyncWriteExt };
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accepts one request, answers with a canned response and returns the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{}", addr), handle)
    }

    fn session() -> Session {
        Session::from_token(&test_token(&json!({ "id": "me" }))).unwrap()
    }

    #[tokio::test]
    async fn search_sends_query_and_bearer_token() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"users":[{"_id":"1","username":"alice","email":"a@x.io"}]}"#
        ).await;
        let api = HttpChatApi::new(&base, &session()).unwrap();

        let users = api.search("ali ce").await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name, "alice");

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /chat-search?q=ali+ce "));
        assert!(request.contains(&format!("authorization: bearer {}", session().token().to_lowercase())));
    }

    #[tokio::test]
    async fn recent_chats_without_list_is_empty() {
        let (base, _server) = serve_once("200 OK", r#"{"chats":null}"#).await;
        let api = HttpChatApi::new(&base, &session()).unwrap();
        assert!(api.recent_chats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let (base, _server) = serve_once("401 Unauthorized", r#"{"message":"nope"}"#).await;
        let api = HttpChatApi::new(&base, &session()).unwrap();
        match api.profile().await {
            Err(ChatError::Status { endpoint, status }) => {
                assert_eq!(endpoint, "/profile");
                assert_eq!(status, 401);
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn schema_mismatch_fails_closed() {
        let (base, _server) = serve_once("200 OK", r#"{"user":"not an object"}"#).await;
        let api = HttpChatApi::new(&base, &session()).unwrap();
        assert!(matches!(api.profile().await, Err(ChatError::Schema { .. })));
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(HttpChatApi::new("not a url", &session()), Err(ChatError::Url(_))));
    }
}
