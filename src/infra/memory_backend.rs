use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    domain::{
        channel::{Channel, ChannelId},
        channel_list_state::ChannelResponse,
        message::{Attachment, AttachmentKind, Message, MessageKind, MessageRead, Reaction},
        message_list_state::MessagePage,
        pagination::Pagination,
        user::User,
    },
    usecases::contracts::{
        BackendError, ChannelSort, ChannelsQuery, ChatBackend, EphemeralAction, MessageDraft,
    },
};

const GIPHY_COMMAND: &str = "/giphy";

#[derive(Debug, Clone)]
struct StoredChannel {
    channel: Channel,
    /// Oldest first.
    messages: Vec<Message>,
    reads: Vec<MessageRead>,
    unread_count: u32,
}

impl StoredChannel {
    fn visible_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| message.parent_id.is_none() || message.show_in_channel)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct BackendState {
    channels: Vec<StoredChannel>,
    failing_queries: usize,
    failing_writes: bool,
    calls: Vec<String>,
    next_id: u64,
}

impl BackendState {
    fn record(&mut self, call: &str) {
        self.calls.push(call.to_owned());
    }

    fn check_query(&mut self) -> Result<(), BackendError> {
        if self.failing_queries > 0 {
            self.failing_queries -= 1;
            return Err(BackendError::Unavailable);
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), BackendError> {
        if self.failing_writes {
            return Err(BackendError::Unavailable);
        }
        Ok(())
    }

    fn next_message_id(&mut self) -> String {
        self.next_id += 1;
        format!("local-{}", self.next_id)
    }

    fn channel_mut(&mut self, channel_id: &ChannelId) -> Result<&mut StoredChannel, BackendError> {
        self.channels
            .iter_mut()
            .find(|stored| &stored.channel.id == channel_id)
            .ok_or_else(|| BackendError::NotFound(format!("channel {channel_id}")))
    }

    fn message_mut(&mut self, message_id: &str) -> Result<&mut Message, BackendError> {
        self.channels
            .iter_mut()
            .flat_map(|stored| stored.messages.iter_mut())
            .find(|message| message.id == message_id)
            .ok_or_else(|| BackendError::NotFound(format!("message {message_id}")))
    }
}

/// Chat service kept in memory, with switches for injecting failures.
#[derive(Debug)]
pub struct InMemoryBackend {
    current_user: User,
    inner: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new(current_user: User) -> Self {
        Self {
            current_user,
            inner: Mutex::new(BackendState::default()),
        }
    }

    pub fn current_user(&self) -> &User {
        &self.current_user
    }

    /// Seeds a channel with history ordered oldest first.
    pub fn add_channel(&self, channel: Channel, messages: Vec<Message>) {
        if let Ok(mut state) = self.inner.lock() {
            state.channels.push(StoredChannel {
                channel,
                messages,
                reads: Vec::new(),
                unread_count: 0,
            });
        }
    }

    pub fn add_reads(&self, channel_id: &ChannelId, reads: Vec<MessageRead>) {
        if let Ok(mut state) = self.inner.lock() {
            if let Ok(stored) = state.channel_mut(channel_id) {
                stored.reads.extend(reads);
            }
        }
    }

    /// Makes the next `count` queries fail with a transient error.
    pub fn fail_next_queries(&self, count: usize) {
        if let Ok(mut state) = self.inner.lock() {
            state.failing_queries = count;
        }
    }

    pub fn set_failing_writes(&self, failing: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.failing_writes = failing;
        }
    }

    /// Names of the backend calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn stored_messages(&self, channel_id: &ChannelId) -> Vec<Message> {
        let Ok(mut state) = self.inner.lock() else {
            return Vec::new();
        };
        let messages = state
            .channel_mut(channel_id)
            .map(|stored| stored.messages.clone())
            .unwrap_or_default();
        messages
    }

    fn lock(&self) -> Result<MutexGuard<'_, BackendState>, BackendError> {
        self.inner.lock().map_err(|_| BackendError::Unavailable)
    }

    fn own_reaction(&self, message_id: &str, kind: &str) -> Reaction {
        Reaction {
            kind: kind.to_owned(),
            user: self.current_user.clone(),
            message_id: message_id.to_owned(),
            created_at: Utc::now(),
        }
    }
}

/// Newest `limit` messages, optionally older than a given id.
fn window(messages: &[Message], pagination: &Pagination) -> Vec<Message> {
    let end = match pagination {
        Pagination::Before { message_id, .. } => messages
            .iter()
            .position(|message| &message.id == message_id)
            .unwrap_or(0),
        Pagination::Initial { .. } | Pagination::Offset { .. } => messages.len(),
    };
    let start = end.saturating_sub(pagination.limit());

    messages[start..end].to_vec()
}

#[async_trait]
impl ChatBackend for InMemoryBackend {
    async fn query_channels(
        &self,
        query: &ChannelsQuery,
    ) -> Result<Vec<ChannelResponse>, BackendError> {
        let mut state = self.lock()?;
        state.record("query_channels");
        state.check_query()?;

        let mut channels: Vec<&StoredChannel> = state
            .channels
            .iter()
            .filter(|stored| {
                query
                    .filter
                    .kind
                    .as_ref()
                    .map_or(true, |kind| &stored.channel.id.kind == kind)
            })
            .filter(|stored| {
                query.filter.member_id.as_ref().map_or(true, |member_id| {
                    stored
                        .channel
                        .members
                        .iter()
                        .any(|member| &member.id == member_id)
                })
            })
            .collect();

        match query.sort {
            ChannelSort::LastMessageDesc => channels.sort_by_key(|stored| {
                std::cmp::Reverse(stored.messages.last().map(|message| message.created_at))
            }),
            ChannelSort::NameAsc => channels.sort_by(|a, b| a.channel.name.cmp(&b.channel.name)),
        }

        let offset = match query.pagination {
            Pagination::Offset { offset, .. } => offset,
            Pagination::Initial { .. } | Pagination::Before { .. } => 0,
        };

        Ok(channels
            .into_iter()
            .skip(offset)
            .take(query.pagination.limit())
            .map(|stored| ChannelResponse {
                channel: stored.channel.clone(),
                messages: window(
                    &stored.visible_messages(),
                    &Pagination::initial(query.message_limit),
                ),
                reads: stored.reads.clone(),
                unread_count: stored.unread_count,
            })
            .collect())
    }

    async fn query_messages(
        &self,
        channel: &ChannelId,
        pagination: &Pagination,
    ) -> Result<MessagePage, BackendError> {
        let mut state = self.lock()?;
        state.record("query_messages");
        state.check_query()?;

        let stored = state.channel_mut(channel)?;
        Ok(MessagePage {
            messages: window(&stored.visible_messages(), pagination),
            reads: stored.reads.clone(),
        })
    }

    async fn query_replies(
        &self,
        parent_id: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Message>, BackendError> {
        let mut state = self.lock()?;
        state.record("query_replies");
        state.check_query()?;

        let replies: Vec<Message> = state
            .channels
            .iter()
            .flat_map(|stored| stored.messages.iter())
            .filter(|message| message.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();

        Ok(window(&replies, pagination))
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        draft: &MessageDraft,
    ) -> Result<Message, BackendError> {
        let mut state = self.lock()?;
        state.record("send_message");
        state.check_write()?;

        let id = state.next_message_id();
        let mut message = Message::new(id, self.current_user.clone(), &draft.text, Utc::now());
        message.parent_id = draft.parent_id.clone();
        message.show_in_channel = draft.show_in_channel;
        message.attachments = draft.attachments.clone();
        message.extra_data = draft.extra_data.clone();

        if let Some(query) = draft.text.strip_prefix(GIPHY_COMMAND) {
            state.channel_mut(channel)?;
            message.kind = MessageKind::Ephemeral;
            message.attachments.push(Attachment {
                kind: AttachmentKind::Giphy,
                title: query.trim().to_owned(),
                url: None,
            });
            return Ok(message);
        }

        if let Some(parent_id) = &draft.parent_id {
            message.kind = MessageKind::Reply;
            state.message_mut(parent_id)?.reply_count += 1;
        }

        state.channel_mut(channel)?.messages.push(message.clone());
        Ok(message)
    }

    async fn send_ephemeral_action(
        &self,
        channel: &ChannelId,
        message: &Message,
        action: EphemeralAction,
    ) -> Result<Option<Message>, BackendError> {
        let mut state = self.lock()?;
        state.record("send_ephemeral_action");
        state.check_write()?;

        match action {
            EphemeralAction::Cancel => Ok(None),
            EphemeralAction::Shuffle => {
                let mut shuffled = message.clone();
                shuffled.id = state.next_message_id();
                Ok(Some(shuffled))
            }
            EphemeralAction::Send => {
                let mut sent = message.clone();
                sent.id = state.next_message_id();
                sent.kind = MessageKind::Regular;
                sent.created_at = Utc::now();
                sent.updated_at = sent.created_at;
                state.channel_mut(channel)?.messages.push(sent.clone());
                Ok(Some(sent))
            }
        }
    }

    async fn delete_message(&self, message_id: &str) -> Result<Message, BackendError> {
        let mut state = self.lock()?;
        state.record("delete_message");
        state.check_write()?;

        let message = state.message_mut(message_id)?;
        let now = Utc::now();
        message.kind = MessageKind::Deleted;
        message.deleted_at = Some(now);
        message.updated_at = now;
        Ok(message.clone())
    }

    async fn add_reaction(&self, message_id: &str, kind: &str) -> Result<Message, BackendError> {
        let reaction = self.own_reaction(message_id, kind);
        let mut state = self.lock()?;
        state.record("add_reaction");
        state.check_write()?;

        let message = state.message_mut(message_id)?;
        if !message.has_own_reaction(kind) {
            *message.reaction_counts.entry(kind.to_owned()).or_insert(0) += 1;
        }
        message.add_own_reaction(reaction);
        Ok(message.clone())
    }

    async fn delete_reaction(
        &self,
        message_id: &str,
        kind: &str,
    ) -> Result<Message, BackendError> {
        let mut state = self.lock()?;
        state.record("delete_reaction");
        state.check_write()?;

        let message = state.message_mut(message_id)?;
        if message.has_own_reaction(kind) {
            if let Some(count) = message.reaction_counts.get_mut(kind) {
                *count = count.saturating_sub(1);
            }
            message.remove_own_reaction(kind);
        }
        Ok(message.clone())
    }

    async fn send_typing(&self, channel: &ChannelId, started: bool) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        state.record(if started { "typing_start" } else { "typing_stop" });
        state.check_write()?;
        state.channel_mut(channel).map(|_| ())
    }

    async fn mark_read(&self, channel: &ChannelId) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        state.record("mark_read");
        state.check_write()?;
        state.channel_mut(channel)?.unread_count = 0;
        Ok(())
    }
}
