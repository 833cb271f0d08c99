use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::domain::{channel::ChannelId, events::ServerEvent};

use super::{
    change_feed::{ChangeFeed, FeedItem},
    channel_list_presenter::{ChannelListPresenter, NestedLoadResult},
    event_router::{ChannelLink, EventRouter, LocalEvent},
    message_presenter::MessagePresenter,
};

const LANE_STARTED: &str = "CHANNEL_LANE_STARTED";
const LANE_STOPPED: &str = "CHANNEL_LANE_STOPPED";
const LANE_SHUTDOWN_SIGNALLED: &str = "CHANNEL_LANE_SHUTDOWN_SIGNALLED";
const NESTED_LOAD_DROPPED: &str = "CHANNEL_LANE_NESTED_LOAD_DROPPED";

enum LaneCommand {
    LoadNextPage,
    NestedPageLoaded(NestedLoadResult),
    OpenChannel {
        channel_id: ChannelId,
        reply: oneshot::Sender<Option<MessagePresenter>>,
    },
}

/// Task that owns a channel list presenter and feeds it live events and
/// commands one at a time.
///
/// Presenters opened through the lane stay linked to it: every event is
/// routed to them after the channel list applied it, and their confirmed
/// writes come back to refresh the matching row.
#[derive(Debug)]
pub struct ChannelListLane {
    stop_tx: Option<watch::Sender<bool>>,
    commands: mpsc::UnboundedSender<LaneCommand>,
    feed: ChangeFeed,
    router: EventRouter,
    task: Option<JoinHandle<ChannelListPresenter>>,
}

impl ChannelListLane {
    pub fn start(
        handle: &Handle,
        presenter: ChannelListPresenter,
        events: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        let feed = presenter.feed().clone();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let router = EventRouter::new();
        let task = handle.spawn(run_lane(
            presenter,
            router.clone(),
            commands.downgrade(),
            command_rx,
            events,
            stop_rx,
        ));

        tracing::info!(code = LANE_STARTED, "channel list lane started");

        Self {
            stop_tx: Some(stop_tx),
            commands,
            feed,
            router,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FeedItem> {
        self.feed.subscribe()
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Queues a page request; `false` once the lane has stopped.
    pub fn load_next_page(&self) -> bool {
        self.commands.send(LaneCommand::LoadNextPage).is_ok()
    }

    /// Opened presenters still alive, threads included.
    pub fn linked_presenters(&self) -> usize {
        self.router.route_count()
    }

    /// Message presenter for a loaded channel, linked to this lane.
    pub async fn open_channel(&self, channel_id: ChannelId) -> Option<MessagePresenter> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(LaneCommand::OpenChannel { channel_id, reply })
            .ok()?;
        response.await.ok().flatten()
    }

    /// Stops the lane and hands the presenter back.
    pub async fn shutdown(mut self) -> Option<ChannelListPresenter> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.task.take()?.await.ok()
    }
}

impl Drop for ChannelListLane {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
            tracing::info!(
                code = LANE_SHUTDOWN_SIGNALLED,
                "channel list lane shutdown signal sent"
            );
        }
    }
}

async fn run_lane(
    mut presenter: ChannelListPresenter,
    router: EventRouter,
    weak_commands: mpsc::WeakUnboundedSender<LaneCommand>,
    mut commands: mpsc::UnboundedReceiver<LaneCommand>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut stop_rx: watch::Receiver<bool>,
) -> ChannelListPresenter {
    let (echo_tx, mut echoes) = mpsc::unbounded_channel::<LocalEvent>();
    let mut events_open = true;

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    router.close();
                    tracing::info!(code = LANE_STOPPED, "channel list lane stopped");
                    return presenter;
                }
            }
            Some(command) = commands.recv() => {
                handle_command(&mut presenter, command, &router, &echo_tx).await;
            }
            event = events.recv(), if events_open => {
                match event {
                    Some(event) => {
                        tracing::debug!(event_kind = event.kind(), "channel lane event");
                        presenter.apply_event(&event);
                        router.route(&event);
                        spawn_nested_loads(&mut presenter, &weak_commands);
                    }
                    None => {
                        tracing::debug!("channel lane event stream closed");
                        events_open = false;
                    }
                }
            }
            Some(local) = echoes.recv() => {
                tracing::debug!(event_kind = local.event.kind(), "channel lane local event");
                presenter.apply_event(&local.event);
                router.route_from(local.origin, &local.event);
            }
        }
    }
}

async fn handle_command(
    presenter: &mut ChannelListPresenter,
    command: LaneCommand,
    router: &EventRouter,
    echo: &mpsc::UnboundedSender<LocalEvent>,
) {
    match command {
        LaneCommand::LoadNextPage => {
            // Failures already reached subscribers through the feed.
            if let Err(error) = presenter.load_next_page().await {
                tracing::debug!(error = %error, "channel lane page load failed");
            }
        }
        LaneCommand::NestedPageLoaded(loaded) => {
            presenter.apply_nested_page(loaded);
        }
        LaneCommand::OpenChannel { channel_id, reply } => {
            let opened = presenter.open_channel(&channel_id).map(|opened| {
                opened.linked(ChannelLink::new(router, &channel_id, echo.downgrade()))
            });
            let _ = reply.send(opened);
        }
    }
}

fn spawn_nested_loads(
    presenter: &mut ChannelListPresenter,
    commands: &mpsc::WeakUnboundedSender<LaneCommand>,
) {
    for load in presenter.take_nested_loads() {
        let fetch = presenter.fetch_nested(load);
        let commands = commands.clone();

        tokio::spawn(async move {
            let loaded = fetch.await;
            let channel = loaded.load.channel_id.clone();
            let delivered = commands
                .upgrade()
                .is_some_and(|tx| tx.send(LaneCommand::NestedPageLoaded(loaded)).is_ok());

            if !delivered {
                tracing::debug!(
                    code = NESTED_LOAD_DROPPED,
                    channel = %channel,
                    "lane is gone; nested load result dropped"
                );
            }
        });
    }
}
