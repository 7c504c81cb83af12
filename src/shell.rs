use std::collections::HashSet;
use std::sync::Arc;

use log::{ debug, error, info, warn };

use crate::api::{ avatar_url, ChatApi };
use crate::error::ChatResult;
use crate::models::user::{ Profile, UserSummary };
use crate::store::{ LocalStore, ASSISTANT_KEY, DARK_MODE_KEY, SELECTED_USER_KEY };

pub const DEFAULT_PLACEHOLDER_AVATAR: &str = "https://via.placeholder.com/40/007bff/ffffff?text=U";

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub api_base_url: String,
    pub placeholder_avatar: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            placeholder_avatar: DEFAULT_PLACEHOLDER_AVATAR.to_string(),
        }
    }
}

/// What the main panel is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    None,
    Assistant,
    User(UserSummary),
}

/// A search the host should run. Only the newest one is allowed to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub token: u64,
    pub query: String,
}

/// Owns which conversation (or the assistant) is open, plus the sidebar data.
///
/// The open target is mirrored into durable state so it survives a restart.
/// Store write failures are logged and otherwise ignored.
pub struct Shell {
    store: Arc<dyn LocalStore>,
    config: ShellConfig,
    profile: Option<Profile>,
    recent: Vec<UserSummary>,
    query: String,
    results: Vec<UserSummary>,
    search_token: u64,
    target: Target,
    dark_mode: bool,
    failed_avatars: HashSet<String>,
}

impl Shell {
    /// Rebuilds the shell from durable state. A stored user beats a stored
    /// assistant flag; with neither, the welcome panel shows.
    pub fn restore(store: Arc<dyn LocalStore>, config: ShellConfig) -> Self {
        let dark_mode = store.get_flag(DARK_MODE_KEY);

        let stored_user = store
            .get(SELECTED_USER_KEY)
            .and_then(|raw| match serde_json::from_str::<UserSummary>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Ignoring unreadable selected user record: {}", e);
                    None
                }
            });

        let target = match stored_user {
            Some(user) => Target::User(user),
            None if store.get_flag(ASSISTANT_KEY) => Target::Assistant,
            None => Target::None,
        };
        info!("Restored shell target: {:?}", target);

        Self {
            store,
            config,
            profile: None,
            recent: Vec::new(),
            query: String::new(),
            results: Vec::new(),
            search_token: 0,
            target,
            dark_mode,
            failed_avatars: HashSet::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn selected_user(&self) -> Option<&UserSummary> {
        match &self.target {
            Target::User(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.target == Target::Assistant
    }

    pub fn is_active(&self, user: &UserSummary) -> bool {
        self.selected_user().map_or(false, |selected| selected.id == user.id)
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn recent_chats(&self) -> &[UserSummary] {
        &self.recent
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn search_results(&self) -> &[UserSummary] {
        &self.results
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    // --- target transitions ---

    pub fn open_conversation(&mut self, user: UserSummary) {
        info!("Opening conversation with {} ({})", user.display_name, user.id);
        match serde_json::to_string(&user) {
            Ok(record) => self.persist_set(SELECTED_USER_KEY, &record),
            Err(e) => error!("Failed to encode selected user: {}", e),
        }
        self.persist_remove(ASSISTANT_KEY);

        if !self.recent.iter().any(|chat| chat.id == user.id) {
            self.recent.push(user.clone());
        }

        self.target = Target::User(user);
        self.clear_search();
    }

    pub fn open_recent(&mut self, index: usize) -> bool {
        match self.recent.get(index).cloned() {
            Some(user) => {
                self.open_conversation(user);
                true
            }
            None => false,
        }
    }

    pub fn select_search_result(&mut self, index: usize) -> bool {
        match self.results.get(index).cloned() {
            Some(user) => {
                self.open_conversation(user);
                true
            }
            None => false,
        }
    }

    pub fn toggle_assistant(&mut self) {
        if self.is_assistant() {
            self.target = Target::None;
            self.persist_remove(ASSISTANT_KEY);
        } else {
            self.target = Target::Assistant;
            self.persist_set(ASSISTANT_KEY, "true");
            self.persist_remove(SELECTED_USER_KEY);
        }
        debug!("Assistant panel now {}", if self.is_assistant() { "on" } else { "off" });
    }

    pub fn clear_current(&mut self) {
        self.target = Target::None;
        self.persist_remove(SELECTED_USER_KEY);
        self.persist_remove(ASSISTANT_KEY);
    }

    /// Leaving the chat area forgets the open target so the next visit starts
    /// at the welcome panel.
    pub fn leave(&mut self) {
        info!("Leaving chat");
        self.clear_current();
    }

    pub fn toggle_dark_mode(&mut self) {
        self.dark_mode = !self.dark_mode;
        let value = if self.dark_mode { "true" } else { "false" };
        self.persist_set(DARK_MODE_KEY, value);
    }

    // --- search ---

    /// Records the query. Blank queries clear results at once and need no
    /// request; anything else returns the request to run.
    pub fn set_query(&mut self, text: &str) -> Option<SearchRequest> {
        self.query = text.to_string();
        self.search_token += 1;

        if text.trim().is_empty() {
            self.results.clear();
            return None;
        }
        Some(SearchRequest {
            token: self.search_token,
            query: self.query.clone(),
        })
    }

    pub fn is_current_search(&self, token: u64) -> bool {
        token == self.search_token
    }

    /// Installs search results if `token` is still the newest request.
    pub fn apply_search(&mut self, token: u64, result: ChatResult<Vec<UserSummary>>) -> bool {
        if !self.is_current_search(token) {
            debug!("Discarding stale search response (token {} < {})", token, self.search_token);
            return false;
        }
        match result {
            Ok(users) => {
                self.results = users;
                true
            }
            Err(e) => {
                error!("Failed to fetch results: {}", e);
                false
            }
        }
    }

    pub async fn search(&mut self, api: &dyn ChatApi, text: &str) {
        if let Some(request) = self.set_query(text) {
            let result = api.search(&request.query).await;
            self.apply_search(request.token, result);
        }
    }

    fn clear_search(&mut self) {
        self.query.clear();
        self.results.clear();
        self.search_token += 1;
    }

    // --- remote data ---

    pub fn apply_profile(&mut self, result: ChatResult<Profile>) {
        match result {
            Ok(profile) => {
                self.profile = Some(profile);
            }
            Err(e) => error!("Failed to fetch profile: {}", e),
        }
    }

    /// Replaces the recent list with the server's, keeping conversations
    /// opened locally before the response arrived.
    pub fn apply_recent_chats(&mut self, result: ChatResult<Vec<UserSummary>>) {
        match result {
            Ok(chats) => {
                let local = std::mem::replace(&mut self.recent, chats);
                for user in local {
                    if !self.recent.iter().any(|chat| chat.id == user.id) {
                        self.recent.push(user);
                    }
                }
            }
            Err(e) => error!("Failed to fetch recent chats: {}", e),
        }
    }

    pub async fn load_profile(&mut self, api: &dyn ChatApi) {
        let result = api.profile().await;
        self.apply_profile(result);
    }

    pub async fn load_recent_chats(&mut self, api: &dyn ChatApi) {
        let result = api.recent_chats().await;
        self.apply_recent_chats(result);
    }

    // --- avatars ---

    /// URL to display for an avatar path; placeholder when absent or when
    /// that image already failed to load.
    pub fn avatar_for(&self, path: Option<&str>) -> String {
        let url = avatar_url(&self.config.api_base_url, path, &self.config.placeholder_avatar);
        if self.failed_avatars.contains(&url) {
            self.config.placeholder_avatar.clone()
        } else {
            url
        }
    }

    /// Marks an image as broken. It is not retried.
    pub fn avatar_failed(&mut self, url: &str) {
        if url != self.config.placeholder_avatar && self.failed_avatars.insert(url.to_string()) {
            warn!("Avatar failed to load, using placeholder: {}", url);
        }
    }

    fn persist_set(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            error!("Failed to persist {}: {}", key, e);
        }
    }

    fn persist_remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            error!("Failed to clear {}: {}", key, e);
        }
    }
}
