use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{
    change::ChangeDescriptor,
    channel::{Channel, ChannelId},
    events::ServerEvent,
    item_list::{ChannelRow, ItemList, ListItem},
    message::{Message, MessageRead},
    message_list_state::{LoadPhase, MessageListState, MessagePage, PageLimits},
    pagination::Pagination,
    user::User,
};

/// One channel of a channel-list page, with its newest messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelResponse {
    pub channel: Channel,
    /// Oldest first.
    pub messages: Vec<Message>,
    pub reads: Vec<MessageRead>,
    pub unread_count: u32,
}

impl ChannelResponse {
    pub fn into_parts(self) -> (Channel, MessagePage, u32) {
        (
            self.channel,
            MessagePage {
                messages: self.messages,
                reads: self.reads,
            },
            self.unread_count,
        )
    }
}

/// Channel rows ordered by most recent interaction, plus the nested message
/// state of every listed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListState {
    current_user: User,
    page_size: usize,
    message_limits: PageLimits,
    items: ItemList,
    nested: BTreeMap<ChannelId, MessageListState>,
    phase: LoadPhase,
    next_page: Pagination,
    has_more: bool,
    /// Rows fetched from the server plus rows inserted by notifications.
    loaded_offset: usize,
    pending_loads: Vec<ChannelId>,
}

impl ChannelListState {
    pub fn new(current_user: User, page_size: usize, message_limits: PageLimits) -> Self {
        Self {
            current_user,
            page_size,
            message_limits,
            items: ItemList::new(),
            nested: BTreeMap::new(),
            phase: LoadPhase::Empty,
            next_page: Pagination::initial(page_size),
            has_more: true,
            loaded_offset: 0,
            pending_loads: Vec::new(),
        }
    }

    pub fn items(&self) -> &ItemList {
        &self.items
    }

    pub fn nested(&self, channel_id: &ChannelId) -> Option<&MessageListState> {
        self.nested.get(channel_id)
    }

    pub fn message_limits(&self) -> PageLimits {
        self.message_limits
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

    pub fn fail_load(&mut self) {
        self.phase = if self.items.is_empty() {
            LoadPhase::Empty
        } else {
            LoadPhase::Loaded
        };
    }

    /// Merges a page of channels: an initial page replaces the list, a
    /// continuation page is appended.
    pub fn merge_page(
        &mut self,
        page: Vec<ChannelResponse>,
        requested: &Pagination,
        now: DateTime<Utc>,
    ) -> ChangeDescriptor {
        let is_continuation = !requested.is_initial();
        if !is_continuation {
            self.items.clear();
            self.nested.clear();
            self.loaded_offset = 0;
        }

        self.items.remove_loading();

        let fetched = page.len();
        let start = self.items.len();
        for response in page {
            if self.items.position_of_channel(&response.channel.id).is_some() {
                continue;
            }

            let (channel, messages, unread_count) = response.into_parts();
            let mut nested = MessageListState::new(
                channel.clone(),
                self.current_user.clone(),
                self.message_limits,
            );
            if let Some(requested) = nested.begin_load() {
                nested.merge_page(messages, &requested, now);
            }

            self.items.push(ListItem::Channel(ChannelRow {
                channel: channel.clone(),
                last_message: nested.last_message().cloned(),
                unread_count,
            }));
            self.nested.insert(channel.id, nested);
        }
        let added: Vec<usize> = (start..self.items.len()).collect();

        self.loaded_offset += fetched;
        if requested.is_page_full(fetched) {
            self.items.push(ListItem::Loading { is_error: false });
            self.next_page = Pagination::Offset {
                limit: self.page_size,
                offset: self.loaded_offset,
            };
            self.has_more = true;
        } else {
            self.next_page = Pagination::initial(self.page_size);
            self.has_more = false;
        }

        self.phase = LoadPhase::Loaded;

        tracing::debug!(
            fetched,
            continuation = is_continuation,
            has_more = self.has_more,
            "channel page merged"
        );

        if is_continuation {
            ChangeDescriptor::ItemsAdded {
                indices: added,
                reload: None,
                force_scroll: false,
                items: self.items.to_vec(),
            }
        } else {
            ChangeDescriptor::Reloaded {
                anchor: 0,
                items: self.items.to_vec(),
            }
        }
    }

    /// Routes a live event to the matching row and its nested state.
    pub fn apply_event(&mut self, event: &ServerEvent) -> ChangeDescriptor {
        match event {
            ServerEvent::NotificationAddedToChannel { channel } => {
                return self.add_channel(channel.clone());
            }
            ServerEvent::NotificationMarkAllRead => return self.mark_all_read(),
            ServerEvent::ConnectionRecovered => {
                for nested in self.nested.values_mut() {
                    nested.apply_event(event);
                }
                return ChangeDescriptor::None;
            }
            _ => {}
        }

        let Some(channel_id) = event.channel_id() else {
            return ChangeDescriptor::None;
        };
        let Some(index) = self.items.position_of_channel(channel_id) else {
            return ChangeDescriptor::None;
        };
        let channel_id = channel_id.clone();

        match event {
            ServerEvent::ChannelDeleted { .. } | ServerEvent::ChannelHidden { .. } => {
                self.items.remove(index);
                self.nested.remove(&channel_id);
                self.loaded_offset = self.loaded_offset.saturating_sub(1);
                if let Pagination::Offset { offset, .. } = &mut self.next_page {
                    *offset = offset.saturating_sub(1);
                }
                ChangeDescriptor::ItemRemoved {
                    index,
                    items: self.items.to_vec(),
                }
            }
            ServerEvent::MessageNew {
                message,
                unread_count,
                ..
            } => {
                let accepted = self.nested.get(&channel_id).map_or(
                    message.parent_id.is_none() || message.show_in_channel,
                    |nested| nested.accepts(message),
                );
                self.forward(&channel_id, event);
                if !accepted {
                    return ChangeDescriptor::None;
                }
                self.refresh_row(index, &channel_id);
                let is_own = message.user.id == self.current_user.id;
                if let Some(row) = self.items.channel_row_mut(index) {
                    if row.last_message.is_none() {
                        row.last_message = Some(message.clone());
                    }
                    match unread_count {
                        Some(count) => row.unread_count = *count,
                        None if !is_own => row.unread_count = row.unread_count.saturating_add(1),
                        None => {}
                    }
                }
                self.move_to_top(index)
            }
            ServerEvent::ChannelUpdated { .. }
            | ServerEvent::MessageUpdated { .. }
            | ServerEvent::MessageDeleted { .. } => {
                self.forward(&channel_id, event);
                self.refresh_row(index, &channel_id);
                self.updated(vec![index])
            }
            ServerEvent::MessageRead { read, .. } => {
                self.forward(&channel_id, event);
                if read.user.id == self.current_user.id {
                    if let Some(row) = self.items.channel_row_mut(index) {
                        row.unread_count = 0;
                    }
                }
                self.updated(vec![index])
            }
            ServerEvent::NotificationMarkRead { unread_count, .. } => {
                if let Some(row) = self.items.channel_row_mut(index) {
                    row.unread_count = *unread_count;
                }
                self.updated(vec![index])
            }
            ServerEvent::TypingStart { .. }
            | ServerEvent::TypingStop { .. }
            | ServerEvent::ReactionNew { .. }
            | ServerEvent::ReactionDeleted { .. } => {
                self.forward(&channel_id, event);
                ChangeDescriptor::None
            }
            ServerEvent::NotificationAddedToChannel { .. }
            | ServerEvent::NotificationMarkAllRead
            | ServerEvent::ConnectionRecovered => ChangeDescriptor::None,
        }
    }

    /// Channels added by notifications that still need their first page.
    pub fn take_pending_loads(&mut self) -> Vec<ChannelId> {
        std::mem::take(&mut self.pending_loads)
    }

    pub fn begin_nested_load(&mut self, channel_id: &ChannelId) -> Option<Pagination> {
        self.nested.get_mut(channel_id)?.begin_load()
    }

    pub fn fail_nested_load(&mut self, channel_id: &ChannelId) {
        if let Some(nested) = self.nested.get_mut(channel_id) {
            nested.fail_load();
        }
    }

    /// Merges a background page into a nested state; `None` if the channel
    /// left the list meanwhile.
    pub fn merge_nested_page(
        &mut self,
        channel_id: &ChannelId,
        page: MessagePage,
        requested: &Pagination,
        now: DateTime<Utc>,
    ) -> ChangeDescriptor {
        let Some(index) = self.items.position_of_channel(channel_id) else {
            return ChangeDescriptor::None;
        };
        let Some(nested) = self.nested.get_mut(channel_id) else {
            return ChangeDescriptor::None;
        };

        nested.merge_page(page, requested, now);
        self.refresh_row(index, channel_id);
        self.updated(vec![index])
    }

    fn add_channel(&mut self, channel: Channel) -> ChangeDescriptor {
        if self.items.position_of_channel(&channel.id).is_some() {
            return ChangeDescriptor::None;
        }

        let nested = MessageListState::new(
            channel.clone(),
            self.current_user.clone(),
            self.message_limits,
        );
        self.items.insert(
            0,
            ListItem::Channel(ChannelRow {
                channel: channel.clone(),
                last_message: None,
                unread_count: 0,
            }),
        );
        self.nested.insert(channel.id.clone(), nested);
        self.pending_loads.push(channel.id);

        self.loaded_offset += 1;
        if let Pagination::Offset { offset, .. } = &mut self.next_page {
            *offset += 1;
        }

        ChangeDescriptor::ItemsAdded {
            indices: vec![0],
            reload: None,
            force_scroll: false,
            items: self.items.to_vec(),
        }
    }

    fn mark_all_read(&mut self) -> ChangeDescriptor {
        let mut indices = Vec::new();
        for index in 0..self.items.len() {
            if let Some(row) = self.items.channel_row_mut(index) {
                row.unread_count = 0;
                indices.push(index);
            }
        }

        if indices.is_empty() {
            return ChangeDescriptor::None;
        }
        self.updated(indices)
    }

    fn forward(&mut self, channel_id: &ChannelId, event: &ServerEvent) {
        if let Some(nested) = self.nested.get_mut(channel_id) {
            nested.apply_event(event);
        }
    }

    fn refresh_row(&mut self, index: usize, channel_id: &ChannelId) {
        let Some(nested) = self.nested.get(channel_id) else {
            return;
        };
        let channel = nested.channel().clone();
        let last_message = nested.last_message().cloned();

        if let Some(row) = self.items.channel_row_mut(index) {
            row.channel = channel;
            if last_message.is_some() {
                row.last_message = last_message;
            }
        }
    }

    fn move_to_top(&mut self, index: usize) -> ChangeDescriptor {
        if index == 0 {
            return self.updated(vec![0]);
        }

        if let Some(row) = self.items.remove(index) {
            self.items.insert(0, row);
        }

        ChangeDescriptor::ItemMoved {
            from: index,
            to: 0,
            items: self.items.to_vec(),
        }
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

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn me() -> User {
        User::new("me", "Me")
    }

    fn bob() -> User {
        User::new("bob", "Bob")
    }

    fn id(name: &str) -> ChannelId {
        ChannelId::new("messaging", name)
    }

    fn response(name: &str, last_message_at: i64) -> ChannelResponse {
        ChannelResponse {
            channel: Channel::new(id(name), name),
            messages: vec![Message::new(
                format!("{name}-last"),
                bob(),
                "hello",
                at(last_message_at),
            )],
            reads: vec![],
            unread_count: 0,
        }
    }

    fn state(page_size: usize) -> ChannelListState {
        ChannelListState::new(me(), page_size, PageLimits::default())
    }

    fn loaded(page: Vec<ChannelResponse>, page_size: usize) -> ChannelListState {
        let mut state = state(page_size);
        let requested = state.begin_load().expect("first load");
        state.merge_page(page, &requested, at(0));
        state
    }

    fn message_new(name: &str, message_id: &str, user: User) -> ServerEvent {
        ServerEvent::MessageNew {
            channel: id(name),
            message: Message::new(message_id, user, "new", at(9_000)),
            unread_count: None,
        }
    }

    fn row(state: &ChannelListState, index: usize) -> &ChannelRow {
        state
            .items()
            .get(index)
            .and_then(ListItem::as_channel)
            .expect("channel row")
    }

    #[test]
    fn full_initial_page_appends_loading_row_and_offset_cursor() {
        let state = loaded(vec![response("b", 200), response("a", 100)], 2);

        assert_eq!(state.items().len(), 3);
        assert!(state.items().get(2).is_some_and(ListItem::is_loading));
        assert_eq!(
            state.next_page(),
            &Pagination::Offset {
                limit: 2,
                offset: 2
            }
        );
    }

    #[test]
    fn hiding_a_channel_pulls_the_offset_cursor_back() {
        let mut state = loaded(vec![response("a", 200), response("b", 100)], 2);

        let change = state.apply_event(&ServerEvent::ChannelHidden { channel: id("a") });

        assert!(matches!(change, ChangeDescriptor::ItemRemoved { index: 0, .. }));
        assert_eq!(
            state.next_page(),
            &Pagination::Offset {
                limit: 2,
                offset: 1
            }
        );
    }

    #[test]
    fn thread_reply_hidden_from_channel_leaves_row_in_place() {
        let mut state = loaded(vec![response("a", 200), response("b", 100)], 20);
        let mut reply = Message::new("b-reply", bob(), "in thread", at(9_000));
        reply.parent_id = Some("b-last".to_owned());

        let change = state.apply_event(&ServerEvent::MessageNew {
            channel: id("b"),
            message: reply,
            unread_count: None,
        });

        assert!(change.is_none());
        assert_eq!(row(&state, 1).channel.id, id("b"));
        assert_eq!(row(&state, 1).unread_count, 0);
        assert_eq!(
            row(&state, 1).last_message.as_ref().map(|m| m.id.as_str()),
            Some("b-last")
        );
    }

    #[test]
    fn short_initial_page_exhausts_channel_pagination() {
        let state = loaded(vec![response("a", 100)], 20);

        assert_eq!(state.items().len(), 1);
        assert!(!state.items().has_loading());
        assert_eq!(state.next_page(), &Pagination::initial(20));
        assert!(!state.has_more_pages());
    }

    #[test]
    fn rows_are_seeded_with_nested_message_state() {
        let state = loaded(vec![response("a", 100)], 20);

        let nested = state.nested(&id("a")).expect("nested state");
        assert_eq!(nested.items().len(), 1);
        assert_eq!(
            row(&state, 0).last_message.as_ref().map(|m| m.id.as_str()),
            Some("a-last")
        );
    }

    #[test]
    fn continuation_page_appends_rows() {
        let mut state = loaded(vec![response("d", 400), response("c", 300)], 2);
        let requested = state.begin_load().expect("next page");

        let change = state.merge_page(vec![response("b", 200)], &requested, at(0));

        assert!(matches!(change, ChangeDescriptor::ItemsAdded { ref indices, .. } if indices == &vec![2]));
        assert_eq!(state.items().len(), 3);
        assert!(!state.items().has_loading());
    }

    #[test]
    fn new_message_moves_channel_to_top_then_updates_in_place() {
        let mut state = loaded(vec![response("b", 200), response("a", 100)], 20);

        let moved = state.apply_event(&message_new("a", "a-2", bob()));
        let updated = state.apply_event(&message_new("a", "a-3", bob()));

        assert!(matches!(moved, ChangeDescriptor::ItemMoved { from: 1, to: 0, .. }));
        assert!(matches!(updated, ChangeDescriptor::ItemsUpdated { ref indices, .. } if indices == &vec![0]));
        assert_eq!(row(&state, 0).channel.id, id("a"));
        assert_eq!(
            row(&state, 0).last_message.as_ref().map(|m| m.id.as_str()),
            Some("a-3")
        );
        assert_eq!(
            state.nested(&id("a")).map(|nested| nested.items().len()),
            Some(3)
        );
    }

    #[test]
    fn unread_count_grows_for_incoming_messages_only() {
        let mut state = loaded(vec![response("a", 100)], 20);

        state.apply_event(&message_new("a", "a-2", bob()));
        state.apply_event(&message_new("a", "a-3", me()));
        assert_eq!(row(&state, 0).unread_count, 1);

        state.apply_event(&ServerEvent::MessageNew {
            channel: id("a"),
            message: Message::new("a-4", bob(), "x", at(9_500)),
            unread_count: Some(7),
        });
        assert_eq!(row(&state, 0).unread_count, 7);
    }

    #[test]
    fn deleted_and_hidden_channels_are_removed() {
        let mut state = loaded(vec![response("b", 200), response("a", 100)], 20);

        let change = state.apply_event(&ServerEvent::ChannelHidden { channel: id("a") });

        assert!(matches!(change, ChangeDescriptor::ItemRemoved { index: 1, .. }));
        assert!(state.nested(&id("a")).is_none());
        assert!(state
            .apply_event(&ServerEvent::ChannelDeleted { channel: id("a") })
            .is_none());
    }

    #[test]
    fn events_for_unknown_channels_are_ignored() {
        let mut state = loaded(vec![response("a", 100)], 20);

        assert!(state.apply_event(&message_new("zzz", "z-1", bob())).is_none());
    }

    #[test]
    fn channel_update_refreshes_row_and_nested_config() {
        let mut state = loaded(vec![response("b", 200), response("a", 100)], 20);
        let mut channel = Channel::new(id("a"), "Renamed");
        channel.config.typing_events = false;

        let change = state.apply_event(&ServerEvent::ChannelUpdated { channel });

        assert!(matches!(change, ChangeDescriptor::ItemsUpdated { ref indices, .. } if indices == &vec![1]));
        assert_eq!(row(&state, 1).channel.name, "Renamed");
        assert!(state
            .nested(&id("a"))
            .is_some_and(|nested| !nested.channel().config.typing_events));
    }

    #[test]
    fn added_to_channel_inserts_row_and_queues_initial_load() {
        let mut state = loaded(vec![response("b", 200), response("a", 100)], 2);
        let channel = Channel::new(id("new"), "New");

        let change = state.apply_event(&ServerEvent::NotificationAddedToChannel {
            channel: channel.clone(),
        });
        let again = state.apply_event(&ServerEvent::NotificationAddedToChannel { channel });

        assert!(matches!(change, ChangeDescriptor::ItemsAdded { ref indices, .. } if indices == &vec![0]));
        assert!(again.is_none());
        assert_eq!(state.take_pending_loads(), vec![id("new")]);
        assert!(state.take_pending_loads().is_empty());
        assert_eq!(
            state.next_page(),
            &Pagination::Offset {
                limit: 2,
                offset: 3
            }
        );
    }

    #[test]
    fn nested_page_refreshes_row_of_added_channel() {
        let mut state = loaded(vec![response("a", 100)], 20);
        state.apply_event(&ServerEvent::NotificationAddedToChannel {
            channel: Channel::new(id("new"), "New"),
        });
        let requested = state.begin_nested_load(&id("new")).expect("nested load");

        let change = state.merge_nested_page(
            &id("new"),
            MessagePage {
                messages: vec![Message::new("n1", bob(), "welcome", at(50))],
                reads: vec![],
            },
            &requested,
            at(0),
        );

        assert!(matches!(change, ChangeDescriptor::ItemsUpdated { ref indices, .. } if indices == &vec![0]));
        assert_eq!(
            row(&state, 0).last_message.as_ref().map(|m| m.id.as_str()),
            Some("n1")
        );
    }

    #[test]
    fn nested_page_for_removed_channel_is_dropped() {
        let mut state = loaded(vec![response("a", 100)], 20);
        state.apply_event(&ServerEvent::NotificationAddedToChannel {
            channel: Channel::new(id("new"), "New"),
        });
        let requested = state.begin_nested_load(&id("new")).expect("nested load");
        state.apply_event(&ServerEvent::ChannelDeleted { channel: id("new") });

        let change =
            state.merge_nested_page(&id("new"), MessagePage::default(), &requested, at(0));

        assert!(change.is_none());
    }

    #[test]
    fn read_notifications_reset_unread_counts() {
        let mut state = loaded(vec![response("b", 200), response("a", 100)], 20);
        state.apply_event(&message_new("b", "b-2", bob()));
        state.apply_event(&message_new("a", "a-2", bob()));

        let own_read = state.apply_event(&ServerEvent::MessageRead {
            channel: id("a"),
            read: MessageRead {
                user: me(),
                last_read_at: at(10_000),
            },
        });
        assert!(matches!(own_read, ChangeDescriptor::ItemsUpdated { .. }));
        assert_eq!(row(&state, 0).unread_count, 0);
        assert_eq!(row(&state, 1).unread_count, 1);

        let all = state.apply_event(&ServerEvent::NotificationMarkAllRead);
        assert!(matches!(all, ChangeDescriptor::ItemsUpdated { ref indices, .. } if indices == &vec![0, 1]));
        assert_eq!(row(&state, 1).unread_count, 0);
    }
}
