//! Plain-text rendering of the shell and conversation for the terminal host.
//!
//! Everything here is a pure function of state and is recomputed on every
//! draw; nothing derived (separators, online flag) is cached.

use chrono::{ DateTime, Local, Utc };
use tokio::time::Instant;

use crate::conversation::Conversation;
use crate::models::chat::DeliveryStatus;
use crate::shell::{ Shell, Target };

pub fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

fn status_mark(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => " …",
        DeliveryStatus::Sent => " ✓",
        DeliveryStatus::Delivered => " ✓✓",
        DeliveryStatus::Failed => " ! not sent",
        DeliveryStatus::Received => "",
    }
}

pub fn sidebar(shell: &Shell) -> Vec<String> {
    let mut lines = Vec::new();

    let (name, avatar) = match shell.profile() {
        Some(profile) => (profile.username.as_str(), shell.avatar_for(profile.avatar_path.as_deref())),
        None => ("", shell.avatar_for(None)),
    };
    lines.push(
        format!(
            "{} · Active now {}",
            if name.is_empty() { "(loading profile)" } else { name },
            if shell.dark_mode() { "[dark]" } else { "[light]" }
        )
    );
    lines.push(format!("  avatar: {}", avatar));

    let assistant = if shell.is_assistant() { "[AI on]" } else { "[AI]" };
    let close = if shell.target() != &Target::None { " (/close)" } else { "" };
    lines.push(format!("{} search: {}{}", assistant, shell.query(), close));

    let results = shell.search_results();
    if !results.is_empty() {
        lines.push(format!("Users ({})", results.len()));
        for (i, user) in results.iter().enumerate() {
            lines.push(format!("  /pick {}  {} · {}", i, user.display_name, user.subtitle()));
        }
    }

    lines.push("Recent Chats".to_string());
    if shell.recent_chats().is_empty() {
        lines.push("  No recent chats".to_string());
        lines.push("  Search for users to start chatting".to_string());
    } else {
        for (i, user) in shell.recent_chats().iter().enumerate() {
            let marker = if shell.is_active(user) { "*" } else { " " };
            lines.push(format!("{} /open {}  {}", marker, i, user.display_name));
        }
    }

    lines
}

pub fn main_panel(shell: &Shell, conversation: Option<&Conversation>, now: Instant) -> Vec<String> {
    match shell.target() {
        Target::None =>
            vec![
                "Welcome to Chat".to_string(),
                "  Chat with AI: /ai starts an AI conversation".to_string(),
                "  Find Users: /search <name> to start a new conversation".to_string(),
                "  Recent Chats: /open <n> continues a previous conversation".to_string()
            ],
        Target::Assistant => vec!["AI Assistant · Always online".to_string()],
        Target::User(user) => {
            let mut lines = vec![
                format!("{} · Active now", user.display_name),
                format!("  avatar: {}", shell.avatar_for(user.avatar_path.as_deref()))
            ];
            if let Some(conversation) = conversation {
                lines.extend(thread(conversation, now));
            }
            lines
        }
    }
}

pub fn thread(conversation: &Conversation, now: Instant) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(
        if conversation.is_online() {
            "Friend · Online".to_string()
        } else {
            "Friend · Last seen recently".to_string()
        }
    );

    let messages = conversation.messages();
    if messages.is_empty() {
        lines.push("Start your conversation".to_string());
        lines.push("Send a message to begin chatting with your friend".to_string());
    } else {
        let separators = conversation.separators();
        for (i, message) in messages.iter().enumerate() {
            if separators.contains(&i) {
                lines.push(format!("──── {} ────", format_time(message.timestamp)));
            }
            let own = message.is_from(conversation.local_id());
            lines.push(
                format!(
                    "{}: {}  {}{}",
                    if own { "You" } else { "Friend" },
                    message.text,
                    format_time(message.timestamp),
                    status_mark(message.status)
                )
            );
        }
    }

    if conversation.is_typing(now) {
        lines.push("Friend is typing...".to_string());
    }

    if conversation.can_send() {
        lines.push(
            format!("{}/{}", conversation.char_count(), conversation.config().max_draft_chars)
        );
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationConfig;
    use crate::models::realtime::{ InboundMessage, ServerEvent, TypingNotice };
    use crate::models::user::{ UserId, UserSummary };
    use crate::realtime::MemoryChannel;
    use crate::session::{ test_token, Session };
    use crate::shell::ShellConfig;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn conversation(channel: &Arc<MemoryChannel>) -> Conversation {
        let session = Session::from_token(&test_token(&json!({ "id": "7" }))).unwrap();
        Conversation::mount(
            channel.clone(),
            &session,
            UserId::from("42"),
            ConversationConfig::default()
        )
    }

    fn inbound(ms: i64, text: &str) -> ServerEvent {
        ServerEvent::ReceiveMessage(InboundMessage {
            sender_id: UserId::from("42"),
            receiver_id: UserId::from("7"),
            message: text.into(),
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + ms).single(),
        })
    }

    #[test]
    fn empty_thread_shows_prompt() {
        let channel = Arc::new(MemoryChannel::new());
        let lines = thread(&conversation(&channel), Instant::now());
        assert_eq!(lines[0], "Friend · Last seen recently");
        assert_eq!(lines[1], "Start your conversation");
    }

    #[test]
    fn thread_draws_separators_labels_and_typing() {
        let channel = Arc::new(MemoryChannel::new());
        let mut conversation = conversation(&channel);
        let now = Instant::now();
        conversation.handle(inbound(0, "one"), now);
        conversation.handle(inbound(100_000, "two"), now);
        conversation.handle(inbound(400_000, "three"), now);
        conversation.handle(ServerEvent::Typing(TypingNotice::default()), now);
        conversation.set_draft("reply");

        let lines = thread(&conversation, now);
        let separators = lines
            .iter()
            .filter(|l| l.starts_with("────"))
            .count();
        assert_eq!(separators, 2);
        assert!(lines.iter().any(|l| l.starts_with("Friend: two")));
        assert!(lines.contains(&"Friend is typing...".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("5/1000"));
    }

    #[test]
    fn own_messages_are_labelled_you() {
        let channel = Arc::new(MemoryChannel::new());
        let mut conversation = conversation(&channel);
        conversation.set_draft("hi");
        conversation.send();

        let lines = thread(&conversation, Instant::now());
        assert!(lines.iter().any(|l| l.starts_with("You: hi") && l.ends_with("✓")));
    }

    #[test]
    fn sidebar_lists_results_and_marks_active_chat() {
        let store = Arc::new(MemoryStore::new());
        let mut shell = Shell::restore(store, ShellConfig::default());
        let alice = UserSummary::new("1", "alice");
        shell.open_conversation(alice);
        let request = shell.set_query("b").unwrap();
        shell.apply_search(request.token, Ok(vec![UserSummary::new("2", "bob")]));

        let lines = sidebar(&shell);
        assert!(lines.contains(&"Users (1)".to_string()));
        assert!(lines.contains(&"  /pick 0  bob · User".to_string()));
        assert!(lines.contains(&"* /open 0  alice".to_string()));
    }

    #[test]
    fn welcome_panel_when_nothing_open() {
        let store = Arc::new(MemoryStore::new());
        let shell = Shell::restore(store, ShellConfig::default());
        let lines = main_panel(&shell, None, Instant::now());
        assert_eq!(lines[0], "Welcome to Chat");
    }
}
