use std::collections::BTreeSet;

use super::{
    channel::{Channel, ChannelId},
    message::Message,
    user::User,
};

/// Summary rendered for one channel in a channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub channel: Channel,
    pub last_message: Option<Message>,
    pub unread_count: u32,
}

/// One display row of a presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    Channel(ChannelRow),
    Message {
        message: Message,
        /// Users whose latest read receipt points at this message.
        read_by: BTreeSet<User>,
    },
    /// Informational row, e.g. a "Today" date separator.
    Status {
        title: String,
        subtitle: Option<String>,
        is_error: bool,
    },
    /// Pagination sentinel shown while more pages exist.
    Loading { is_error: bool },
}

impl ListItem {
    pub fn message(message: Message) -> Self {
        Self::Message {
            message,
            read_by: BTreeSet::new(),
        }
    }

    pub fn status(title: impl Into<String>) -> Self {
        Self::Status {
            title: title.into(),
            subtitle: None,
            is_error: false,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&ChannelRow> {
        match self {
            Self::Channel(row) => Some(row),
            _ => None,
        }
    }

    pub fn read_by(&self) -> Option<&BTreeSet<User>> {
        match self {
            Self::Message { read_by, .. } => Some(read_by),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// Ordered rows of one presenter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemList {
    items: Vec<ListItem>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[ListItem] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<ListItem> {
        self.items.clone()
    }

    pub fn get(&self, index: usize) -> Option<&ListItem> {
        self.items.get(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn push(&mut self, item: ListItem) {
        self.items.push(item);
    }

    pub fn insert(&mut self, index: usize, item: ListItem) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    pub fn remove(&mut self, index: usize) -> Option<ListItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Swaps the row at `index`, returning the previous one.
    pub fn replace(&mut self, index: usize, item: ListItem) -> Option<ListItem> {
        self.items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, item))
    }

    /// Inserts `items` in order before the current first row.
    pub fn prepend(&mut self, items: Vec<ListItem>) {
        self.items.splice(0..0, items);
    }

    /// Finds a message by id, most recent rows first.
    pub fn position_of_message(&self, message_id: &str) -> Option<usize> {
        self.items
            .iter()
            .rposition(|item| item.as_message().is_some_and(|message| message.id == message_id))
    }

    pub fn position_of_channel(&self, channel_id: &ChannelId) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.as_channel().is_some_and(|row| &row.channel.id == channel_id))
    }

    pub fn message_at(&self, index: usize) -> Option<&Message> {
        self.items.get(index).and_then(ListItem::as_message)
    }

    pub fn last_message(&self) -> Option<(usize, &Message)> {
        self.items
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, item)| item.as_message().map(|message| (index, message)))
    }

    pub fn read_by_mut(&mut self, index: usize) -> Option<&mut BTreeSet<User>> {
        match self.items.get_mut(index) {
            Some(ListItem::Message { read_by, .. }) => Some(read_by),
            _ => None,
        }
    }

    pub fn channel_row_mut(&mut self, index: usize) -> Option<&mut ChannelRow> {
        match self.items.get_mut(index) {
            Some(ListItem::Channel(row)) => Some(row),
            _ => None,
        }
    }

    pub fn has_loading(&self) -> bool {
        self.items.iter().any(ListItem::is_loading)
    }

    /// Drops every loading row, returning whether one was present.
    pub fn remove_loading(&mut self) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.is_loading());
        before != self.items.len()
    }

    /// Keeps only the first non-error status row for each title.
    pub fn dedup_status_titles(&mut self) -> usize {
        let mut seen = BTreeSet::new();
        let before = self.items.len();

        self.items.retain(|item| match item {
            ListItem::Status {
                title,
                is_error: false,
                ..
            } => seen.insert(title.clone()),
            _ => true,
        });

        before - self.items.len()
    }
}

impl From<Vec<ListItem>> for ItemList {
    fn from(items: Vec<ListItem>) -> Self {
        Self { items }
    }
}
