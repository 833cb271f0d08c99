use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{Duration as Elapsed, Utc};
use tokio::{
    runtime::{Builder, Handle},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{
    cli::{Cli, Command},
    domain::{
        self,
        channel::{Channel, ChannelId},
        events::ServerEvent,
        item_list::ListItem,
        message::Message,
        user::User,
    },
    infra::{self, error::AppError, memory_backend::InMemoryBackend},
    usecases::{
        self, bootstrap,
        change_feed::FeedItem,
        channel_list_lane::ChannelListLane,
        context::AppContext,
        contracts::EphemeralAction,
        send_message::SendMessageCommand,
    },
};

const DEMO_SESSION_FINISHED: &str = "DEMO_SESSION_FINISHED";
const FEED_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const EVENT_SETTLE_DELAY: Duration = Duration::from_millis(50);

pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(
        domain = domain::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        "module boundaries loaded"
    );

    match cli.command_or_default() {
        Command::Run => {
            let (context, _log_guard) = bootstrap::bootstrap(cli.config.as_deref())?;
            let runtime = Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(AppError::Runtime)?;
            runtime.block_on(run_demo(&context))?;
        }
    }

    Ok(())
}

async fn run_demo(context: &AppContext) -> Result<()> {
    let bob = User::new("bob", "Bob");
    let backend = Arc::new(seed_backend(&context.current_user, &bob));
    let presenter = bootstrap::compose_channel_list(context, backend.clone());

    let (events, events_rx) = mpsc::unbounded_channel();
    let lane = ChannelListLane::start(&Handle::current(), presenter, events_rx);
    let channel_log = spawn_change_logger("channels", lane.subscribe());

    lane.load_next_page();
    tokio::time::sleep(EVENT_SETTLE_DELAY).await;

    let general = ChannelId::new("messaging", "general");
    let random = ChannelId::new("messaging", "random");
    for event in [
        ServerEvent::TypingStart {
            channel: random.clone(),
            user: bob.clone(),
        },
        ServerEvent::MessageNew {
            channel: random.clone(),
            message: Message::new("random-2", bob.clone(), "anyone around?", Utc::now()),
            unread_count: None,
        },
        ServerEvent::NotificationAddedToChannel {
            channel: support_channel(),
        },
    ] {
        events.send(event)?;
    }
    tokio::time::sleep(EVENT_SETTLE_DELAY).await;

    let mut chat = lane
        .open_channel(general.clone())
        .await
        .ok_or_else(|| anyhow!("channel {general} is not listed"))?;
    let chat_log = spawn_change_logger("general", chat.subscribe());

    chat.load_next_page().await?;
    chat.send_message(SendMessageCommand::text("morning all"))
        .await?;
    chat.send_message(SendMessageCommand::text("/giphy coffee"))
        .await?;
    chat.dispatch_ephemeral(EphemeralAction::Shuffle).await?;
    chat.dispatch_ephemeral(EphemeralAction::Send).await?;
    chat.toggle_reaction("general-1", "like").await?;
    chat.send_typing(true).await?;
    chat.mark_read().await?;

    events.send(ServerEvent::MessageNew {
        channel: general.clone(),
        message: Message::new("general-9", bob.clone(), "coffee is ready", Utc::now()),
        unread_count: None,
    })?;
    tokio::time::sleep(EVENT_SETTLE_DELAY).await;
    let routed = chat.apply_pending_events();
    tracing::debug!(routed, "live events applied to general");

    let parent = chat
        .items()
        .iter()
        .filter_map(ListItem::as_message)
        .find(|message| message.id == "general-1")
        .cloned()
        .ok_or_else(|| anyhow!("thread parent is not loaded"))?;
    let mut thread = chat.open_thread(parent);
    thread.load_next_page().await?;
    thread
        .send_message(SendMessageCommand::text("on my way"))
        .await?;
    print_rows("thread", &thread.items());
    print_rows("general", &chat.items());
    drop(chat);

    let presenter = lane
        .shutdown()
        .await
        .ok_or_else(|| anyhow!("channel list lane did not stop cleanly"))?;
    print_rows("channels", &presenter.items());
    drop(presenter);

    for logger in [channel_log, chat_log] {
        let _ = tokio::time::timeout(FEED_DRAIN_TIMEOUT, logger).await;
    }

    tracing::info!(
        code = DEMO_SESSION_FINISHED,
        backend_calls = backend.calls().len(),
        "demo session finished"
    );
    Ok(())
}

fn seed_backend(me: &User, bob: &User) -> InMemoryBackend {
    let backend = InMemoryBackend::new(me.clone());
    let now = Utc::now();

    let mut general = Channel::new(ChannelId::new("messaging", "general"), "General");
    general.members = vec![me.clone(), bob.clone()];
    let mut reply = Message::new("general-2", bob.clone(), "agenda is in the doc", now);
    reply.parent_id = Some("general-1".to_owned());
    backend.add_channel(
        general,
        vec![
            Message::new("general-0", me.clone(), "hi team", now - Elapsed::days(1)),
            Message::new("general-1", bob.clone(), "standup in 5", now - Elapsed::minutes(30)),
            reply,
        ],
    );

    let mut random = Channel::new(ChannelId::new("messaging", "random"), "Random");
    random.members = vec![me.clone(), bob.clone()];
    backend.add_channel(
        random,
        vec![Message::new("random-1", bob.clone(), "lunch?", now - Elapsed::hours(2))],
    );

    let welcome = Message::new(
        "support-1",
        User::new("support-bot", "Support"),
        "welcome to support",
        now - Elapsed::minutes(5),
    );
    backend.add_channel(support_channel(), vec![welcome]);
    backend
}

/// Channel the session user is only added to once the demo is running.
fn support_channel() -> Channel {
    let mut support = Channel::new(ChannelId::new("messaging", "support"), "Support");
    support.members = vec![User::new("support-bot", "Support")];
    support
}

fn spawn_change_logger(
    feed: &'static str,
    mut changes: mpsc::UnboundedReceiver<FeedItem>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            match change {
                Ok(change) => tracing::info!(
                    feed,
                    change = change.label(),
                    rows = change.items().map_or(0, <[_]>::len),
                    "presenter change"
                ),
                Err(error) => tracing::warn!(feed, error = %error, "presenter feed closed"),
            }
        }
    })
}

fn print_rows(title: &str, items: &[ListItem]) {
    println!("== {title}");
    for item in items {
        match item {
            ListItem::Channel(row) => println!(
                "  #{} ({} unread) {}",
                row.channel.name,
                row.unread_count,
                row.last_message
                    .as_ref()
                    .map(Message::display_content)
                    .unwrap_or_default()
            ),
            ListItem::Message { message, read_by } => println!(
                "  {}: {}{}",
                message.user.name,
                message.display_content(),
                if read_by.is_empty() { "" } else { " (read)" }
            ),
            ListItem::Status { title, .. } => println!("  -- {title} --"),
            ListItem::Loading { is_error } => {
                println!("  {}", if *is_error { "[load failed]" } else { "[loading]" })
            }
        }
    }
}
