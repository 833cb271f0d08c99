use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::{
    change::ChangeDescriptor,
    channel::Channel,
    events::ServerEvent,
    item_list::{ItemList, ListItem},
    message::{Message, MessageRead, Reaction},
    pagination::Pagination,
    user::User,
};

const TODAY_TITLE: &str = "Today";
const YESTERDAY_TITLE: &str = "Yesterday";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Empty,
    Loading,
    Loaded,
    LoadingNextPage,
}

/// Page sizes for the first and every following history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub first: usize,
    pub next: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            first: 25,
            next: 50,
        }
    }
}

/// One fetched page of history, oldest message first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Read receipts known to the server when the page was fetched.
    pub reads: Vec<MessageRead>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OwnMessage {
    id: String,
    created_at: DateTime<Utc>,
}

/// Message list of one channel or one reply thread.
///
/// Every mutation returns the [`ChangeDescriptor`] the UI needs; the ephemeral
/// message, if any, is appended to each emitted snapshot but never stored in
/// the canonical list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageListState {
    channel: Channel,
    parent: Option<Message>,
    current_user: User,
    limits: PageLimits,
    items: ItemList,
    phase: LoadPhase,
    next_page: Pagination,
    has_more: bool,
    pending_reads: Vec<MessageRead>,
    /// user id -> id of the message currently carrying that user's read mark
    read_marks: BTreeMap<String, String>,
    last_own_message: Option<OwnMessage>,
    unread_marker: Option<MessageRead>,
    typing: BTreeSet<User>,
    ephemeral: Option<Message>,
}

impl MessageListState {
    pub fn new(channel: Channel, current_user: User, limits: PageLimits) -> Self {
        Self {
            channel,
            parent: None,
            current_user,
            limits,
            items: ItemList::new(),
            phase: LoadPhase::Empty,
            next_page: Pagination::initial(limits.first),
            has_more: true,
            pending_reads: Vec::new(),
            read_marks: BTreeMap::new(),
            last_own_message: None,
            unread_marker: None,
            typing: BTreeSet::new(),
            ephemeral: None,
        }
    }

    pub fn for_thread(
        channel: Channel,
        parent: Message,
        current_user: User,
        limits: PageLimits,
    ) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(channel, current_user, limits)
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn parent(&self) -> Option<&Message> {
        self.parent.as_ref()
    }

    pub fn is_thread(&self) -> bool {
        self.parent.is_some()
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    pub fn current_user(&self) -> &User {
        &self.current_user
    }

    /// Canonical rows, without the ephemeral overlay.
    pub fn items(&self) -> &ItemList {
        &self.items
    }

    /// Rows as displayed, ephemeral overlay included.
    pub fn snapshot(&self) -> Vec<ListItem> {
        let mut items = self.items.to_vec();
        if let Some(ephemeral) = &self.ephemeral {
            items.push(ListItem::message(ephemeral.clone()));
        }
        items
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn next_page(&self) -> &Pagination {
        &self.next_page
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    pub fn typing_users(&self) -> &BTreeSet<User> {
        &self.typing
    }

    pub fn unread_marker(&self) -> Option<&MessageRead> {
        self.unread_marker.as_ref()
    }

    pub fn ephemeral(&self) -> Option<&Message> {
        self.ephemeral.as_ref()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.items.last_message().map(|(_, message)| message)
    }

    /// Marks a fetch as started and returns its cursor, or `None` when a
    /// fetch is already running or history is exhausted.
    pub fn begin_load(&mut self) -> Option<Pagination> {
        match self.phase {
            LoadPhase::Loading | LoadPhase::LoadingNextPage => None,
            LoadPhase::Loaded if !self.has_more => None,
            LoadPhase::Empty => {
                self.phase = LoadPhase::Loading;
                Some(self.next_page.clone())
            }
            LoadPhase::Loaded => {
                self.phase = LoadPhase::LoadingNextPage;
                Some(self.next_page.clone())
            }
        }
    }

    /// Rolls the phase back after a failed fetch so it can be retried.
    pub fn fail_load(&mut self) {
        self.phase = if self.items.is_empty() {
            LoadPhase::Empty
        } else {
            LoadPhase::Loaded
        };
    }

    /// Merges a fetched page requested with `requested` into the list.
    pub fn merge_page(
        &mut self,
        page: MessagePage,
        requested: &Pagination,
        now: DateTime<Utc>,
    ) -> ChangeDescriptor {
        let is_continuation = !requested.is_initial();
        if !is_continuation {
            self.items.clear();
            self.read_marks.clear();
            self.pending_reads.clear();
            self.last_own_message = None;
        }

        self.items.remove_loading();

        let fetched = page.messages.len();
        let oldest_id = page.messages.first().map(|message| message.id.clone());
        let current_user_id = self.current_user.id.clone();
        self.pending_reads.extend(
            page.reads
                .into_iter()
                .filter(|read| read.user.id != current_user_id),
        );

        let messages: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|message| self.items.position_of_message(&message.id).is_none())
            .collect();
        self.track_newest_own(&messages);

        let page_items = build_page_items(messages, now);
        let mut leading = page_items.len();
        self.items.prepend(page_items);
        self.backfill_reads(leading);
        self.items.dedup_status_titles();

        match oldest_id {
            Some(message_id) if requested.is_page_full(fetched) => {
                self.items.insert(0, ListItem::Loading { is_error: false });
                leading += 1;
                self.next_page = Pagination::Before {
                    limit: self.limits.next,
                    message_id,
                };
                self.has_more = true;
            }
            _ => {
                self.next_page = Pagination::initial(self.limits.first);
                self.has_more = false;
                if self.insert_thread_parent() {
                    leading += 1;
                }
            }
        }

        self.phase = LoadPhase::Loaded;

        tracing::debug!(
            channel = %self.channel.id,
            fetched,
            continuation = is_continuation,
            has_more = self.has_more,
            "message page merged"
        );

        let anchor = if is_continuation {
            leading
        } else {
            self.items.len().saturating_sub(1)
        };

        self.with_ephemeral(ChangeDescriptor::Reloaded {
            anchor,
            items: self.items.to_vec(),
        })
    }

    /// Applies one live event; events for other channels are ignored.
    pub fn apply_event(&mut self, event: &ServerEvent) -> ChangeDescriptor {
        if event
            .channel_id()
            .is_some_and(|channel_id| channel_id != &self.channel.id)
        {
            return ChangeDescriptor::None;
        }

        let change = match event {
            ServerEvent::TypingStart { user, .. } => self.on_typing(user, true),
            ServerEvent::TypingStop { user, .. } => self.on_typing(user, false),
            ServerEvent::MessageNew { message, .. } => self.on_message_new(message),
            ServerEvent::MessageUpdated { message, .. }
            | ServerEvent::MessageDeleted { message, .. } => self.on_message_replaced(message),
            ServerEvent::ReactionNew {
                reaction, message, ..
            } => self.on_reaction(reaction, message, true),
            ServerEvent::ReactionDeleted {
                reaction, message, ..
            } => self.on_reaction(reaction, message, false),
            ServerEvent::MessageRead { read, .. } => self.on_message_read(read),
            ServerEvent::ChannelUpdated { channel } => {
                self.channel = channel.clone();
                ChangeDescriptor::None
            }
            ServerEvent::ConnectionRecovered => self.clear_typing(),
            ServerEvent::ChannelDeleted { .. }
            | ServerEvent::ChannelHidden { .. }
            | ServerEvent::NotificationAddedToChannel { .. }
            | ServerEvent::NotificationMarkRead { .. }
            | ServerEvent::NotificationMarkAllRead => ChangeDescriptor::None,
        };

        self.with_ephemeral(change)
    }

    /// Appends a message confirmed by a send request.
    pub fn apply_sent_message(&mut self, message: Message) -> ChangeDescriptor {
        let change = self.on_message_new(&message);
        self.with_ephemeral(change)
    }

    pub fn set_ephemeral(&mut self, message: Message) -> ChangeDescriptor {
        self.ephemeral = Some(message);
        ChangeDescriptor::ItemsAdded {
            indices: vec![self.items.len()],
            reload: None,
            force_scroll: true,
            items: self.snapshot(),
        }
    }

    pub fn clear_ephemeral(&mut self) -> ChangeDescriptor {
        if self.ephemeral.take().is_none() {
            return ChangeDescriptor::None;
        }

        ChangeDescriptor::ItemRemoved {
            index: self.items.len(),
            items: self.items.to_vec(),
        }
    }

    /// Clears the unread marker ahead of a mark-read request.
    pub fn take_unread_marker(&mut self) -> Option<MessageRead> {
        self.unread_marker.take()
    }

    /// Puts back a marker cleared by a mark-read request that failed.
    pub fn restore_unread_marker(&mut self, marker: MessageRead) {
        if self.unread_marker.is_none() {
            self.unread_marker = Some(marker);
        }
    }

    fn with_ephemeral(&self, change: ChangeDescriptor) -> ChangeDescriptor {
        match &self.ephemeral {
            Some(ephemeral) => change.with_trailing_item(ListItem::message(ephemeral.clone())),
            None => change,
        }
    }

    fn is_own(&self, user: &User) -> bool {
        user.id == self.current_user.id
    }

    /// Whether `message` belongs in this list: top-level or shown in the
    /// channel for a channel list, a reply to the parent for a thread.
    pub fn accepts(&self, message: &Message) -> bool {
        match &self.parent {
            Some(parent) => message.parent_id.as_deref() == Some(parent.id.as_str()),
            None => message.parent_id.is_none() || message.show_in_channel,
        }
    }

    fn track_newest_own(&mut self, messages: &[Message]) {
        let newest_own = messages
            .iter()
            .rev()
            .find(|message| self.is_own(&message.user) && !message.is_ephemeral());

        if let Some(message) = newest_own {
            let is_newer = self
                .last_own_message
                .as_ref()
                .map_or(true, |own| message.created_at > own.created_at);
            if is_newer {
                self.last_own_message = Some(OwnMessage {
                    id: message.id.clone(),
                    created_at: message.created_at,
                });
            }
        }
    }

    /// Attaches pending receipts to the own messages among the first `count`
    /// rows, newest message first.
    fn backfill_reads(&mut self, count: usize) {
        for index in (0..count).rev() {
            if self.pending_reads.is_empty() {
                break;
            }

            let Some(message) = self.items.message_at(index) else {
                continue;
            };
            if !self.is_own(&message.user) {
                continue;
            }

            let message_id = message.id.clone();
            let created_at = message.created_at;
            let (matched, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_reads)
                .into_iter()
                .partition(|read| read.last_read_at > created_at);
            self.pending_reads = pending;

            for read in matched {
                if self.read_marks.contains_key(&read.user.id) {
                    continue;
                }
                if let Some(read_by) = self.items.read_by_mut(index) {
                    read_by.insert(read.user.clone());
                }
                self.read_marks.insert(read.user.id, message_id.clone());
            }
        }
    }

    fn insert_thread_parent(&mut self) -> bool {
        let Some(parent) = &self.parent else {
            return false;
        };
        if self.items.position_of_message(&parent.id).is_some() {
            return false;
        }

        self.items.insert(0, ListItem::message(parent.clone()));
        true
    }

    fn on_typing(&mut self, user: &User, started: bool) -> ChangeDescriptor {
        if self.is_thread() || !self.channel.config.typing_events || self.is_own(user) {
            return ChangeDescriptor::None;
        }

        let changed = if started {
            self.typing.insert(user.clone())
        } else {
            let before = self.typing.len();
            self.typing.retain(|typing| typing.id != user.id);
            before != self.typing.len()
        };

        if !changed {
            return ChangeDescriptor::None;
        }

        ChangeDescriptor::FooterUpdated {
            visible: !self.typing.is_empty(),
        }
    }

    fn clear_typing(&mut self) -> ChangeDescriptor {
        if self.typing.is_empty() {
            return ChangeDescriptor::None;
        }

        self.typing.clear();
        ChangeDescriptor::FooterUpdated { visible: false }
    }

    fn on_message_new(&mut self, message: &Message) -> ChangeDescriptor {
        if !self.accepts(message) {
            return ChangeDescriptor::None;
        }

        let previous = self
            .items
            .last_message()
            .map(|(index, last)| (index, last.clone()));

        if let Some((index, last)) = &previous {
            if last.id == message.id {
                if last == message {
                    return ChangeDescriptor::None;
                }
                return self.replace_message(*index, message.clone());
            }
        }

        if self.items.position_of_message(&message.id).is_some() {
            return ChangeDescriptor::None;
        }

        let is_own = self.is_own(&message.user);
        if !is_own && self.channel.config.read_events {
            self.unread_marker = Some(match &previous {
                Some((_, last)) => MessageRead {
                    user: last.user.clone(),
                    last_read_at: last.updated_at,
                },
                None => MessageRead {
                    user: message.user.clone(),
                    last_read_at: message.updated_at,
                },
            });
        }

        let reload = previous
            .filter(|(_, last)| last.user.id == message.user.id)
            .map(|(index, _)| index);

        if is_own {
            self.last_own_message = Some(OwnMessage {
                id: message.id.clone(),
                created_at: message.created_at,
            });
        }

        let index = self.items.len();
        self.items.push(ListItem::message(message.clone()));

        ChangeDescriptor::ItemsAdded {
            indices: vec![index],
            reload,
            force_scroll: is_own,
            items: self.items.to_vec(),
        }
    }

    fn on_message_replaced(&mut self, message: &Message) -> ChangeDescriptor {
        if let Some(parent) = self.parent.as_mut().filter(|parent| parent.id == message.id) {
            *parent = message.clone();
        }

        match self.items.position_of_message(&message.id) {
            Some(index) => self.replace_message(index, message.clone()),
            None => ChangeDescriptor::None,
        }
    }

    fn on_reaction(
        &mut self,
        reaction: &Reaction,
        message: &Message,
        added: bool,
    ) -> ChangeDescriptor {
        let Some(index) = self.items.position_of_message(&message.id) else {
            return ChangeDescriptor::None;
        };

        let mut message = message.clone();
        if let Some(existing) = self.items.message_at(index) {
            message.own_reactions = existing.own_reactions.clone();
        }

        if self.is_own(&reaction.user) {
            if added {
                message.add_own_reaction(reaction.clone());
            } else {
                message.remove_own_reaction(&reaction.kind);
            }
        }

        self.replace_message(index, message)
    }

    fn on_message_read(&mut self, read: &MessageRead) -> ChangeDescriptor {
        if !self.channel.config.read_events || self.is_own(&read.user) {
            return ChangeDescriptor::None;
        }

        let Some(own) = self
            .last_own_message
            .as_ref()
            .filter(|own| own.created_at <= read.last_read_at)
        else {
            return ChangeDescriptor::None;
        };
        let own_id = own.id.clone();

        let Some(new_index) = self.items.position_of_message(&own_id) else {
            return ChangeDescriptor::None;
        };

        let old_index = self
            .read_marks
            .get(&read.user.id)
            .and_then(|message_id| self.items.position_of_message(message_id));
        if old_index == Some(new_index) {
            return ChangeDescriptor::None;
        }

        let mut indices = Vec::with_capacity(2);
        if let Some(old_index) = old_index {
            if let Some(read_by) = self.items.read_by_mut(old_index) {
                read_by.retain(|user| user.id != read.user.id);
            }
            indices.push(old_index);
        }

        if let Some(read_by) = self.items.read_by_mut(new_index) {
            read_by.insert(read.user.clone());
        }
        indices.push(new_index);
        self.read_marks.insert(read.user.id.clone(), own_id);

        self.updated(indices)
    }

    /// Swaps the message at `index`, keeping its accumulated read marks.
    fn replace_message(&mut self, index: usize, message: Message) -> ChangeDescriptor {
        if self.items.message_at(index) == Some(&message) {
            return ChangeDescriptor::None;
        }

        let read_by = self.items.get(index).and_then(ListItem::read_by).cloned();
        self.items.replace(
            index,
            ListItem::Message {
                message,
                read_by: read_by.unwrap_or_default(),
            },
        );

        self.updated(vec![index])
    }

    fn updated(&self, indices: Vec<usize>) -> ChangeDescriptor {
        let updated = indices
            .iter()
            .filter_map(|index| self.items.get(*index).cloned())
            .collect();

        ChangeDescriptor::ItemsUpdated {
            indices,
            updated,
            items: self.items.to_vec(),
        }
    }
}

/// Builds the rows of one page, adding "Yesterday"/"Today" separators before
/// the first message of the page on that day.
fn build_page_items(messages: Vec<Message>, now: DateTime<Utc>) -> Vec<ListItem> {
    let today = now.date_naive();
    let yesterday = today.pred_opt();
    let mut today_added = false;
    let mut yesterday_added = false;
    let mut items = Vec::with_capacity(messages.len() + 2);

    for message in messages {
        let day = message.created_at.date_naive();

        if !yesterday_added && Some(day) == yesterday {
            items.push(ListItem::status(YESTERDAY_TITLE));
            yesterday_added = true;
        }

        if !today_added && day == today {
            items.push(ListItem::status(TODAY_TITLE));
            today_added = true;
        }

        items.push(ListItem::message(message));
    }

    items
}
