mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::ChatResult;

pub const TOKEN_KEY: &str = "token";
pub const SELECTED_USER_KEY: &str = "selectedUser";
pub const ASSISTANT_KEY: &str = "showChatbot";
pub const DARK_MODE_KEY: &str = "darkMode";

/// Durable client-side key-value state that survives restarts.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> ChatResult<()>;

    fn remove(&self, key: &str) -> ChatResult<()>;

    fn get_flag(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }

    fn set_flag(&self, key: &str, value: bool) -> ChatResult<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}
