//! Line-oriented terminal host for the shell and conversation views.
//!
//! Only whole lines reach the composer here, so per-keystroke typing signals
//! (`Conversation::notify_typing`) and image load failures
//! (`Shell::avatar_failed`) are never produced by this host. They are library
//! hooks for a richer front-end.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use log::{ debug, info, warn };
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::api::{ ChatApi, HttpChatApi };
use crate::cli::Args;
use crate::conversation::{ Conversation, ConversationConfig, KeyPress, Update };
use crate::error::ChatResult;
use crate::models::user::UserSummary;
use crate::realtime::{ RealtimeChannel, RealtimeClient };
use crate::render;
use crate::session::Session;
use crate::shell::{ SearchRequest, Shell };
use crate::store::{ FileStore, LocalStore, TOKEN_KEY };

const HELP: &str =
    "/search <text>  /pick <n>  /open <n>  /ai  /close  /dark  /back  /quit  (anything else is sent)";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Long-lived collaborators shared by every view for the whole run.
struct Context {
    session: Session,
    api: Arc<dyn ChatApi>,
    realtime: Arc<dyn RealtimeChannel>,
    conversation_config: ConversationConfig,
    search_debounce: Duration,
}

struct PendingSearch {
    request: SearchRequest,
    fire_at: Instant,
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Chat Configuration ---");
    info!("API Base URL: {}", args.api_base_url);
    info!("Socket URL: {}", args.socket_url);
    info!("State Path: {}", args.state_path);
    info!("Typing Timeout (ms): {}", args.typing_timeout_ms);
    info!("Separator Gap (ms): {}", args.separator_gap_ms);
    info!("Search Debounce (ms): {}", args.search_debounce_ms);
    info!("--------------------------");

    let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(&args.state_path)?);
    if let Some(token) = args.token.as_deref().filter(|t| !t.trim().is_empty()) {
        store.set(TOKEN_KEY, token)?;
    }
    let session = Session::load(store.as_ref())?;
    info!("Signed in as {}", session.user_id());

    let api: Arc<dyn ChatApi> = Arc::new(HttpChatApi::new(&args.api_base_url, &session)?);
    let client = Arc::new(RealtimeClient::connect(&args.socket_url, Some(session.token())).await?);

    let ctx = Context {
        session,
        api,
        realtime: client.clone(),
        conversation_config: args.conversation_config(),
        search_debounce: args.search_debounce(),
    };

    let mut shell = Shell::restore(store, args.shell_config());
    let (profile, recent) = tokio::join!(ctx.api.profile(), ctx.api.recent_chats());
    shell.apply_profile(profile);
    shell.apply_recent_chats(recent);

    let result = event_loop(&ctx, &mut shell).await;
    client.close().await;
    result
}

async fn event_loop(ctx: &Context, shell: &mut Shell) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut conversation: Option<Conversation> = None;
    sync_conversation(ctx, shell, &mut conversation);

    let (search_tx, mut search_rx) = mpsc::unbounded_channel::<(u64, ChatResult<Vec<UserSummary>>)>();
    let mut pending: Option<PendingSearch> = None;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    draw(shell, conversation.as_ref());
    println!("{}", HELP);

    loop {
        let fire_at = pending.as_ref().map_or_else(Instant::now, |p| p.fire_at);

        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if handle_line(ctx, shell, &mut conversation, &mut pending, line.trim_end()) == Flow::Quit {
                    break;
                }
                sync_conversation(ctx, shell, &mut conversation);
                draw(shell, conversation.as_ref());
            }
            _ = tokio::time::sleep_until(fire_at), if pending.is_some() => {
                if let Some(PendingSearch { request, .. }) = pending.take() {
                    if shell.is_current_search(request.token) {
                        spawn_search(ctx, request, search_tx.clone());
                    }
                }
            }
            Some((token, result)) = search_rx.recv() => {
                if shell.apply_search(token, result) {
                    draw(shell, conversation.as_ref());
                }
            }
            Some(update) = conversation_update(&mut conversation) => {
                debug!("Conversation update: {:?}", update);
                // A full redraw leaves the newest message last, which is the scroll-to-bottom.
                draw(shell, conversation.as_ref());
            }
        }
    }

    Ok(())
}

fn handle_line(
    ctx: &Context,
    shell: &mut Shell,
    conversation: &mut Option<Conversation>,
    pending: &mut Option<PendingSearch>,
    line: &str
) -> Flow {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/search" => {
            *pending = shell.set_query(rest).map(|request| PendingSearch {
                request,
                fire_at: Instant::now() + ctx.search_debounce,
            });
        }
        "/pick" | "/open" => {
            let opened = rest
                .parse::<usize>()
                .ok()
                .map_or(false, |index| {
                    if command == "/pick" {
                        shell.select_search_result(index)
                    } else {
                        shell.open_recent(index)
                    }
                });
            if !opened {
                warn!("No entry '{}' to open", rest);
            }
        }
        "/ai" => shell.toggle_assistant(),
        "/close" => shell.clear_current(),
        "/dark" => shell.toggle_dark_mode(),
        "/back" => {
            shell.leave();
            return Flow::Quit;
        }
        "/quit" => {
            return Flow::Quit;
        }
        "/help" => println!("{}", HELP),
        _ =>
            match conversation.as_mut() {
                Some(conversation) => {
                    conversation.set_draft(line);
                    conversation.key_press(KeyPress::Enter);
                }
                None if shell.is_assistant() => {
                    println!("The AI assistant panel is handled by its own component.");
                }
                None => println!("Open a conversation first. {}", HELP),
            }
    }

    Flow::Continue
}

/// Mounts a conversation for the shell's selected user, replacing any other.
fn sync_conversation(ctx: &Context, shell: &Shell, conversation: &mut Option<Conversation>) {
    let wanted = shell.selected_user().map(|user| user.id.clone());
    let current = conversation.as_ref().map(|c| c.counterpart().clone());
    if wanted == current {
        return;
    }

    if let Some(mut previous) = conversation.take() {
        previous.unmount();
    }
    *conversation = wanted.map(|receiver| {
        Conversation::mount(
            ctx.realtime.clone(),
            &ctx.session,
            receiver,
            ctx.conversation_config.clone()
        )
    });
}

fn spawn_search(
    ctx: &Context,
    request: SearchRequest,
    tx: mpsc::UnboundedSender<(u64, ChatResult<Vec<UserSummary>>)>
) {
    let api = Arc::clone(&ctx.api);
    tokio::spawn(async move {
        let result = api.search(&request.query).await;
        let _ = tx.send((request.token, result));
    });
}

async fn conversation_update(conversation: &mut Option<Conversation>) -> Option<Update> {
    match conversation {
        Some(conversation) if conversation.is_mounted() => conversation.next_update().await,
        _ => std::future::pending().await,
    }
}

fn draw(shell: &Shell, conversation: Option<&Conversation>) {
    let now = Instant::now();
    println!();
    for line in render::sidebar(shell) {
        println!("{}", line);
    }
    println!("--------------------------------");
    for line in render::main_panel(shell, conversation, now) {
        println!("{}", line);
    }
}
