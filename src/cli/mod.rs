use clap::Parser;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::conversation::{ ConversationConfig, MAX_DRAFT_CHARS };
use crate::shell::ShellConfig;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Collaborator Args ---
    /// Origin of the HTTP API serving profile, recent chats and search. Avatar paths are resolved against it.
    #[arg(long, env = "CHAT_API_BASE_URL", default_value = "http://localhost:3000")]
    pub api_base_url: String,

    /// WebSocket endpoint of the real-time messaging service.
    #[arg(long, env = "CHAT_SOCKET_URL", default_value = "ws://localhost:3000/ws")]
    pub socket_url: String,

    // --- Local State Args ---
    /// File holding durable client state (session token, open conversation, display preferences).
    #[arg(long, env = "CHAT_STATE_PATH", default_value = "chat_state.json")]
    pub state_path: String,

    /// Session token to store before starting. Without it the stored token is used.
    #[arg(long, env = "CHAT_TOKEN")]
    pub token: Option<String>,

    // --- Conversation Args ---
    /// How long the typing indicator stays up after the last signal, in milliseconds.
    #[arg(long, env = "CHAT_TYPING_TIMEOUT_MS", default_value = "3000")]
    pub typing_timeout_ms: u64,

    /// Gap between messages that earns a time separator, in milliseconds.
    #[arg(long, env = "CHAT_SEPARATOR_GAP_MS", default_value = "300000")]
    pub separator_gap_ms: u64,

    /// Maximum outbound typing signals per second.
    #[arg(long, env = "CHAT_TYPING_PER_SECOND", default_value = "2")]
    pub typing_per_second: NonZeroU32,

    // --- Shell Args ---
    /// Quiet period after the last search edit before the request goes out, in milliseconds.
    #[arg(long, env = "CHAT_SEARCH_DEBOUNCE_MS", default_value = "250")]
    pub search_debounce_ms: u64,

    /// Image shown when an avatar is missing or fails to load.
    #[arg(
        long,
        env = "CHAT_PLACEHOLDER_AVATAR",
        default_value = "https://via.placeholder.com/40/007bff/ffffff?text=U"
    )]
    pub placeholder_avatar: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Args {
    pub fn shell_config(&self) -> ShellConfig {
        ShellConfig {
            api_base_url: self.api_base_url.clone(),
            placeholder_avatar: self.placeholder_avatar.clone(),
        }
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            typing_timeout: Duration::from_millis(self.typing_timeout_ms),
            separator_gap: Duration::from_millis(self.separator_gap_ms),
            typing_per_second: self.typing_per_second,
            max_draft_chars: MAX_DRAFT_CHARS,
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}
