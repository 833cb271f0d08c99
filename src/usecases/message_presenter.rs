use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::domain::{
    change::ChangeDescriptor,
    events::ServerEvent,
    item_list::ListItem,
    message::{Message, MessageRead, Reaction},
    message_list_state::MessageListState,
};

use super::{
    change_feed::{ChangeFeed, FeedItem},
    contracts::{ChatBackend, EphemeralAction, ExtraDataProvider},
    errors::{map_command_error, CommandError, QueryError},
    event_router::ChannelLink,
    load_messages::{load_messages, load_replies},
    retry::RetryPolicy,
    send_message::{send_message, SendMessageCommand},
};

const MESSAGE_QUERY_FAILED: &str = "MESSAGE_QUERY_FAILED";
const MARK_READ_FAILED: &str = "MARK_READ_FAILED";
const ECHO_DROPPED: &str = "MESSAGE_ECHO_DROPPED";

/// Message list of one channel or thread, wired to the backend and a change
/// feed.
pub struct MessagePresenter {
    state: MessageListState,
    backend: Arc<dyn ChatBackend>,
    feed: ChangeFeed,
    retry: RetryPolicy,
    extra_data: Option<Arc<dyn ExtraDataProvider>>,
    link: Option<ChannelLink>,
}

impl std::fmt::Debug for MessagePresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePresenter")
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("linked", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

impl MessagePresenter {
    pub fn new(
        state: MessageListState,
        backend: Arc<dyn ChatBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            state,
            backend,
            feed: ChangeFeed::new(),
            retry,
            extra_data: None,
            link: None,
        }
    }

    /// Attaches the presenter to a lane: it then receives the channel's
    /// live events and reports its confirmed writes back.
    pub fn linked(mut self, link: ChannelLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Waits for the next routed event and applies it. `None` when the
    /// presenter is not linked or its lane has stopped.
    pub async fn next_event(&mut self) -> Option<ChangeDescriptor> {
        let event = self.link.as_mut()?.next().await?;
        Some(self.apply_event(&event))
    }

    /// Applies every routed event already queued; returns how many.
    pub fn apply_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.link.as_mut().and_then(ChannelLink::try_next) {
            self.apply_event(&event);
            applied += 1;
        }
        applied
    }

    pub fn with_extra_data(mut self, provider: Arc<dyn ExtraDataProvider>) -> Self {
        self.extra_data = Some(provider);
        self
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FeedItem> {
        self.feed.subscribe()
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn state(&self) -> &MessageListState {
        &self.state
    }

    /// Current rows, ephemeral overlay included.
    pub fn items(&self) -> Vec<ListItem> {
        self.state.snapshot()
    }

    /// Loads the next page of history. A failure after retries closes the
    /// feed.
    pub async fn load_next_page(&mut self) -> Result<ChangeDescriptor, QueryError> {
        let Some(requested) = self.state.begin_load() else {
            return Ok(ChangeDescriptor::None);
        };

        let parent_id = self.state.parent().map(|parent| parent.id.clone());
        let channel_id = self.state.channel().id.clone();
        let result = match &parent_id {
            Some(parent_id) => {
                load_replies(self.backend.as_ref(), parent_id, &requested, &self.retry).await
            }
            None => load_messages(self.backend.as_ref(), &channel_id, &requested, &self.retry).await,
        };

        match result {
            Ok(page) => {
                let change = self.state.merge_page(page, &requested, Utc::now());
                Ok(self.publish(change))
            }
            Err(error) => {
                tracing::warn!(
                    code = MESSAGE_QUERY_FAILED,
                    channel = %channel_id,
                    error = %error,
                    "message page failed; closing change feed"
                );
                self.state.fail_load();
                self.feed.fail(error.clone());
                Err(error)
            }
        }
    }

    pub fn apply_event(&mut self, event: &ServerEvent) -> ChangeDescriptor {
        let change = self.state.apply_event(event);
        self.publish(change)
    }

    /// Sends a message; inside a thread it is sent as a reply to the parent.
    pub async fn send_message(
        &mut self,
        mut command: SendMessageCommand,
    ) -> Result<ChangeDescriptor, CommandError> {
        self.apply_pending_events();
        if let Some(parent) = self.state.parent() {
            command.parent_id = Some(parent.id.clone());
        }

        let message = send_message(
            self.backend.as_ref(),
            self.state.channel(),
            command,
            self.extra_data.as_ref(),
        )
        .await?;

        let change = if message.is_ephemeral() {
            self.state.set_ephemeral(message)
        } else {
            self.echo_sent(&message);
            self.state.apply_sent_message(message)
        };
        Ok(self.publish(change))
    }

    /// Resolves the pending ephemeral command preview.
    pub async fn dispatch_ephemeral(
        &mut self,
        action: EphemeralAction,
    ) -> Result<ChangeDescriptor, CommandError> {
        self.apply_pending_events();
        let Some(ephemeral) = self.state.ephemeral().cloned() else {
            return Err(CommandError::NoEphemeralMessage);
        };

        if action == EphemeralAction::Cancel {
            let change = self.state.clear_ephemeral();
            return Ok(self.publish(change));
        }

        let response = self
            .backend
            .send_ephemeral_action(&self.state.channel().id, &ephemeral, action)
            .await
            .map_err(map_command_error)?;

        let change = match response {
            Some(message) if message.is_ephemeral() => self.state.set_ephemeral(message),
            Some(message) => {
                let cleared = self.state.clear_ephemeral();
                self.publish(cleared);
                self.echo_sent(&message);
                self.state.apply_sent_message(message)
            }
            None => self.state.clear_ephemeral(),
        };
        Ok(self.publish(change))
    }

    pub async fn delete_message(&mut self, message_id: &str) -> Result<ChangeDescriptor, CommandError> {
        self.apply_pending_events();
        let message = self
            .backend
            .delete_message(message_id)
            .await
            .map_err(map_command_error)?;

        let event = ServerEvent::MessageDeleted {
            channel: self.state.channel().id.clone(),
            message,
        };
        self.echo(&event);
        Ok(self.apply_event(&event))
    }

    /// Adds the current user's reaction of `kind`, or removes it when present.
    pub async fn toggle_reaction(
        &mut self,
        message_id: &str,
        kind: &str,
    ) -> Result<ChangeDescriptor, CommandError> {
        self.apply_pending_events();
        let had_reaction = self
            .find_message(message_id)
            .ok_or_else(|| CommandError::NotFound(format!("message {message_id}")))?
            .has_own_reaction(kind);

        let response = if had_reaction {
            self.backend.delete_reaction(message_id, kind).await
        } else {
            self.backend.add_reaction(message_id, kind).await
        };
        let message = response.map_err(map_command_error)?;

        let channel = self.state.channel().id.clone();
        let reaction = Reaction {
            kind: kind.to_owned(),
            user: self.state.current_user().clone(),
            message_id: message_id.to_owned(),
            created_at: Utc::now(),
        };
        let event = if had_reaction {
            ServerEvent::ReactionDeleted {
                channel,
                reaction,
                message,
            }
        } else {
            ServerEvent::ReactionNew {
                channel,
                reaction,
                message,
            }
        };

        self.echo(&event);
        Ok(self.apply_event(&event))
    }

    /// Tells other members the current user started or stopped typing.
    pub async fn send_typing(&self, started: bool) -> Result<(), CommandError> {
        if !self.state.channel().config.typing_events {
            return Ok(());
        }

        self.backend
            .send_typing(&self.state.channel().id, started)
            .await
            .map_err(map_command_error)
    }

    /// Marks the channel read, clearing the unread marker up front.
    pub async fn mark_read(&mut self) -> Result<(), CommandError> {
        if !self.state.channel().config.read_events {
            return Ok(());
        }

        let marker = self.state.take_unread_marker();
        let result = self.backend.mark_read(&self.state.channel().id).await;

        if let Err(error) = result {
            tracing::warn!(
                code = MARK_READ_FAILED,
                channel = %self.state.channel().id,
                error = %error,
                "mark read failed; unread marker restored"
            );
            if let Some(marker) = marker {
                self.state.restore_unread_marker(marker);
            }
            return Err(map_command_error(error));
        }

        self.echo(&ServerEvent::MessageRead {
            channel: self.state.channel().id.clone(),
            read: MessageRead {
                user: self.state.current_user().clone(),
                last_read_at: Utc::now(),
            },
        });
        Ok(())
    }

    /// Presenter for the reply thread of `parent`, sharing this presenter's
    /// backend and settings.
    pub fn open_thread(&self, parent: Message) -> MessagePresenter {
        let state = MessageListState::for_thread(
            self.state.channel().clone(),
            parent,
            self.state.current_user().clone(),
            self.state.limits(),
        );

        MessagePresenter {
            state,
            backend: Arc::clone(&self.backend),
            feed: ChangeFeed::new(),
            retry: self.retry,
            extra_data: self.extra_data.clone(),
            link: self
                .link
                .as_ref()
                .map(|link| link.for_channel(&self.state.channel().id)),
        }
    }

    fn find_message(&self, message_id: &str) -> Option<&Message> {
        let items = self.state.items();
        items
            .position_of_message(message_id)
            .and_then(|index| items.message_at(index))
    }

    fn echo_sent(&self, message: &Message) {
        self.echo(&ServerEvent::MessageNew {
            channel: self.state.channel().id.clone(),
            message: message.clone(),
            unread_count: None,
        });
    }

    fn echo(&self, event: &ServerEvent) {
        if let Some(link) = &self.link {
            if !link.echo(event.clone()) {
                tracing::debug!(
                    code = ECHO_DROPPED,
                    event_kind = event.kind(),
                    "lane is gone; local event not echoed"
                );
            }
        }
    }

    fn publish(&self, change: ChangeDescriptor) -> ChangeDescriptor {
        self.feed.publish(change.clone());
        change
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone};

    use super::*;
    use crate::{
        domain::{
            channel::{Channel, ChannelId},
            message::MessageKind,
            message_list_state::{LoadPhase, PageLimits},
            pagination::Pagination,
            user::User,
        },
        infra::memory_backend::InMemoryBackend,
    };

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn me() -> User {
        User::new("me", "Me")
    }

    fn bob() -> User {
        User::new("bob", "Bob")
    }

    fn channel() -> Channel {
        Channel::new(ChannelId::new("messaging", "general"), "General")
    }

    fn history(count: usize) -> Vec<Message> {
        (0..count)
            .map(|index| Message::new(format!("m{index}"), bob(), "hi", at(index as i64 + 1)))
            .collect()
    }

    fn setup_with(channel: Channel, messages: Vec<Message>) -> (Arc<InMemoryBackend>, MessagePresenter) {
        let backend = Arc::new(InMemoryBackend::new(me()));
        backend.add_channel(channel.clone(), messages);
        let state = MessageListState::new(channel, me(), PageLimits::default());
        let presenter = MessagePresenter::new(
            state,
            backend.clone(),
            RetryPolicy {
                attempts: 3,
                backoff: Duration::ZERO,
            },
        );
        (backend, presenter)
    }

    fn setup(messages: Vec<Message>) -> (Arc<InMemoryBackend>, MessagePresenter) {
        setup_with(channel(), messages)
    }

    fn message_ids(items: &[ListItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(ListItem::as_message)
            .map(|message| message.id.clone())
            .collect()
    }

    #[tokio::test]
    async fn full_first_page_publishes_reload_with_loading_row() {
        let (_backend, mut presenter) = setup(history(30));
        let mut rx = presenter.subscribe();

        let change = presenter.load_next_page().await.expect("load");

        assert!(matches!(change, ChangeDescriptor::Reloaded { anchor: 25, .. }));
        assert_eq!(rx.try_recv(), Ok(Ok(change)));
        assert_eq!(presenter.items().len(), 26);
        assert!(presenter.items()[0].is_loading());
        assert_eq!(
            presenter.state().next_page(),
            &Pagination::Before {
                limit: 50,
                message_id: "m5".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn second_page_exhausts_history() {
        let (backend, mut presenter) = setup(history(30));

        presenter.load_next_page().await.expect("first page");
        presenter.load_next_page().await.expect("second page");

        let items = presenter.items();
        assert_eq!(items.len(), 30);
        assert_eq!(message_ids(&items).first().map(String::as_str), Some("m0"));
        assert!(!presenter.state().has_more_pages());

        presenter.load_next_page().await.expect("no-op");
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_close_the_feed() {
        let (backend, mut presenter) = setup(history(3));
        backend.fail_next_queries(3);
        let mut rx = presenter.subscribe();

        let error = presenter.load_next_page().await.expect_err("must fail");

        assert_eq!(error, QueryError::TemporarilyUnavailable { attempts: 3 });
        assert_eq!(rx.try_recv(), Ok(Err(error)));
        assert!(rx.try_recv().is_err());
        assert_eq!(presenter.state().phase(), LoadPhase::Empty);
    }

    #[tokio::test]
    async fn giphy_preview_is_an_overlay_until_cancelled() {
        let (backend, mut presenter) = setup(history(2));
        presenter.load_next_page().await.expect("load");

        presenter
            .send_message(SendMessageCommand::text("/giphy cats"))
            .await
            .expect("send");

        assert_eq!(presenter.items().len(), 3);
        assert!(presenter.items()[2]
            .as_message()
            .is_some_and(Message::is_ephemeral));
        assert_eq!(presenter.state().items().len(), 2);

        let change = presenter
            .dispatch_ephemeral(EphemeralAction::Cancel)
            .await
            .expect("cancel");

        assert!(matches!(change, ChangeDescriptor::ItemRemoved { index: 2, .. }));
        assert_eq!(presenter.items().len(), 2);
        assert!(!backend
            .calls()
            .contains(&"send_ephemeral_action".to_owned()));
    }

    #[tokio::test]
    async fn sending_ephemeral_replaces_overlay_with_stored_message() {
        let (backend, mut presenter) = setup(history(2));
        presenter.load_next_page().await.expect("load");
        presenter
            .send_message(SendMessageCommand::text("/giphy cats"))
            .await
            .expect("send");

        presenter
            .dispatch_ephemeral(EphemeralAction::Send)
            .await
            .expect("dispatch");

        let items = presenter.items();
        assert_eq!(items.len(), 3);
        assert!(presenter.state().ephemeral().is_none());
        assert_eq!(items[2].as_message().map(|m| m.kind), Some(MessageKind::Regular));
        assert_eq!(backend.stored_messages(&channel().id).len(), 3);
    }

    #[tokio::test]
    async fn dispatch_without_preview_is_rejected() {
        let (_backend, mut presenter) = setup(Vec::new());

        let result = presenter.dispatch_ephemeral(EphemeralAction::Send).await;

        assert_eq!(result, Err(CommandError::NoEphemeralMessage));
    }

    #[tokio::test]
    async fn own_message_is_appended_with_forced_scroll() {
        let (_backend, mut presenter) = setup(history(1));
        presenter.load_next_page().await.expect("load");

        let change = presenter
            .send_message(SendMessageCommand::text("hello"))
            .await
            .expect("send");

        assert!(matches!(
            change,
            ChangeDescriptor::ItemsAdded {
                force_scroll: true,
                ..
            }
        ));
        assert_eq!(presenter.items().len(), 2);
    }

    #[tokio::test]
    async fn toggle_reaction_adds_then_removes_own_reaction() {
        let (_backend, mut presenter) = setup(history(1));
        presenter.load_next_page().await.expect("load");

        presenter.toggle_reaction("m0", "like").await.expect("add");
        let reacted = presenter.items()[0].as_message().cloned().expect("message");
        assert!(reacted.has_own_reaction("like"));
        assert_eq!(reacted.reaction_counts.get("like"), Some(&1));

        presenter.toggle_reaction("m0", "like").await.expect("remove");
        let cleared = presenter.items()[0].as_message().cloned().expect("message");
        assert!(!cleared.has_own_reaction("like"));
    }

    #[tokio::test]
    async fn reacting_to_unknown_message_fails() {
        let (_backend, mut presenter) = setup(history(1));

        let result = presenter.toggle_reaction("missing", "like").await;

        assert_eq!(
            result,
            Err(CommandError::NotFound("message missing".to_owned()))
        );
    }

    #[tokio::test]
    async fn delete_replaces_row_with_deleted_message() {
        let (_backend, mut presenter) = setup(history(2));
        presenter.load_next_page().await.expect("load");

        let change = presenter.delete_message("m1").await.expect("delete");

        assert!(matches!(change, ChangeDescriptor::ItemsUpdated { .. }));
        assert!(presenter.items()[1]
            .as_message()
            .is_some_and(Message::is_deleted));
    }

    #[tokio::test]
    async fn failed_mark_read_restores_unread_marker() {
        let (backend, mut presenter) = setup(history(1));
        presenter.load_next_page().await.expect("load");
        presenter.apply_event(&ServerEvent::MessageNew {
            channel: channel().id,
            message: Message::new("m9", bob(), "ping", at(100)),
            unread_count: None,
        });
        assert!(presenter.state().unread_marker().is_some());

        backend.set_failing_writes(true);
        let result = presenter.mark_read().await;

        assert_eq!(result, Err(CommandError::TemporarilyUnavailable));
        assert!(presenter.state().unread_marker().is_some());

        backend.set_failing_writes(false);
        presenter.mark_read().await.expect("mark read");
        assert!(presenter.state().unread_marker().is_none());
    }

    #[tokio::test]
    async fn typing_is_not_sent_when_disabled() {
        let mut quiet = channel();
        quiet.config.typing_events = false;
        let (backend, presenter) = setup_with(quiet, Vec::new());

        presenter.send_typing(true).await.expect("typing");

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn thread_lists_parent_above_its_replies() {
        let parent = Message::new("p", bob(), "question", at(1));
        let mut reply = Message::new("r", bob(), "answer", at(2));
        reply.parent_id = Some("p".to_owned());
        let (backend, presenter) = setup(vec![parent.clone(), reply]);

        let mut thread = presenter.open_thread(parent);
        thread.load_next_page().await.expect("load");
        thread
            .send_message(SendMessageCommand::text("me too"))
            .await
            .expect("reply");

        let items = thread.items();
        assert_eq!(message_ids(&items)[..2], ["p", "r"]);
        assert_eq!(items.len(), 3);
        assert_eq!(backend.calls()[0], "query_replies");
        assert_eq!(
            items[2].as_message().and_then(|m| m.parent_id.clone()),
            Some("p".to_owned())
        );
    }

    #[tokio::test]
    async fn linked_presenter_applies_routed_events_and_echoes_writes() {
        use crate::usecases::event_router::EventRouter;

        let (_backend, presenter) = setup(history(1));
        let router = EventRouter::new();
        let (echo_tx, mut echo_rx) = mpsc::unbounded_channel();
        let mut presenter =
            presenter.linked(ChannelLink::new(&router, &channel().id, echo_tx.downgrade()));
        presenter.load_next_page().await.expect("load");

        router.route(&ServerEvent::MessageNew {
            channel: channel().id,
            message: Message::new("m9", bob(), "ping", at(100)),
            unread_count: None,
        });
        router.route(&ServerEvent::MessageNew {
            channel: ChannelId::new("messaging", "elsewhere"),
            message: Message::new("x1", bob(), "other", at(100)),
            unread_count: None,
        });
        assert_eq!(presenter.apply_pending_events(), 1);
        assert_eq!(message_ids(&presenter.items()), ["m0", "m9"]);

        let change = presenter
            .send_message(SendMessageCommand::text("pong"))
            .await
            .expect("send");

        let echoed = echo_rx.try_recv().expect("echo");
        assert!(matches!(
            echoed.event,
            ServerEvent::MessageNew { ref message, .. }
                if change.items().is_some_and(|items| {
                    items.last().and_then(ListItem::as_message) == Some(message)
                })
        ));

        let thread = presenter.open_thread(Message::new("m0", bob(), "hi", at(1)));
        assert!(thread.is_linked());
        assert_eq!(router.route_count(), 2);
        drop(thread);
        assert_eq!(router.route_count(), 1);
    }
}
