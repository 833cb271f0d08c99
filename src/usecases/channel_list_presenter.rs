use std::{future::Future, sync::Arc};

use chrono::Utc;
use tokio::sync::mpsc;

use crate::domain::{
    change::ChangeDescriptor,
    channel::ChannelId,
    channel_list_state::ChannelListState,
    events::ServerEvent,
    item_list::ListItem,
    message_list_state::MessagePage,
    pagination::Pagination,
};

use super::{
    change_feed::{ChangeFeed, FeedItem},
    contracts::{ChannelFilter, ChannelSort, ChannelsQuery, ChatBackend, ExtraDataProvider},
    errors::QueryError,
    load_channels::load_channels,
    load_messages::load_messages,
    message_presenter::MessagePresenter,
    retry::RetryPolicy,
};

const CHANNEL_QUERY_FAILED: &str = "CHANNEL_QUERY_FAILED";
const NESTED_LOAD_FAILED: &str = "NESTED_LOAD_FAILED";

/// First-page request for a channel that joined the list after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedLoad {
    pub channel_id: ChannelId,
    pub requested: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedLoadResult {
    pub load: NestedLoad,
    pub result: Result<MessagePage, QueryError>,
}

/// Paginated channel list with one nested message state per row.
pub struct ChannelListPresenter {
    state: ChannelListState,
    backend: Arc<dyn ChatBackend>,
    feed: ChangeFeed,
    retry: RetryPolicy,
    filter: ChannelFilter,
    sort: ChannelSort,
    extra_data: Option<Arc<dyn ExtraDataProvider>>,
}

impl std::fmt::Debug for ChannelListPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListPresenter")
            .field("state", &self.state)
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .finish_non_exhaustive()
    }
}

impl ChannelListPresenter {
    pub fn new(
        state: ChannelListState,
        backend: Arc<dyn ChatBackend>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            state,
            backend,
            feed: ChangeFeed::new(),
            retry,
            filter: ChannelFilter::default(),
            sort: ChannelSort::default(),
            extra_data: None,
        }
    }

    pub fn with_query(mut self, filter: ChannelFilter, sort: ChannelSort) -> Self {
        self.filter = filter;
        self.sort = sort;
        self
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

    pub fn state(&self) -> &ChannelListState {
        &self.state
    }

    pub fn items(&self) -> Vec<ListItem> {
        self.state.items().to_vec()
    }

    pub async fn load_next_page(&mut self) -> Result<ChangeDescriptor, QueryError> {
        let Some(requested) = self.state.begin_load() else {
            return Ok(ChangeDescriptor::None);
        };

        let query = ChannelsQuery {
            filter: self.filter.clone(),
            sort: self.sort,
            pagination: requested.clone(),
            message_limit: self.state.message_limits().first,
        };

        match load_channels(self.backend.as_ref(), query, &self.retry).await {
            Ok(page) => {
                let change = self.state.merge_page(page, &requested, Utc::now());
                Ok(self.publish(change))
            }
            Err(error) => {
                tracing::warn!(
                    code = CHANNEL_QUERY_FAILED,
                    error = %error,
                    "channel page failed; closing change feed"
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

    /// Starts the first-page loads queued by channel notifications.
    pub fn take_nested_loads(&mut self) -> Vec<NestedLoad> {
        self.state
            .take_pending_loads()
            .into_iter()
            .filter_map(|channel_id| {
                let requested = self.state.begin_nested_load(&channel_id)?;
                Some(NestedLoad {
                    channel_id,
                    requested,
                })
            })
            .collect()
    }

    /// Detached fetch for `load`; it owns everything it needs so it can run
    /// on another task.
    pub fn fetch_nested(
        &self,
        load: NestedLoad,
    ) -> impl Future<Output = NestedLoadResult> + Send + 'static {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry;

        async move {
            let result =
                load_messages(backend.as_ref(), &load.channel_id, &load.requested, &retry).await;
            NestedLoadResult { load, result }
        }
    }

    /// Merges a background load; a channel that left the list is skipped.
    pub fn apply_nested_page(&mut self, loaded: NestedLoadResult) -> ChangeDescriptor {
        let NestedLoadResult { load, result } = loaded;

        match result {
            Ok(page) => {
                let change =
                    self.state
                        .merge_nested_page(&load.channel_id, page, &load.requested, Utc::now());
                self.publish(change)
            }
            Err(error) => {
                tracing::warn!(
                    code = NESTED_LOAD_FAILED,
                    channel = %load.channel_id,
                    error = %error,
                    "nested channel load failed"
                );
                self.state.fail_nested_load(&load.channel_id);
                ChangeDescriptor::None
            }
        }
    }

    /// Message presenter seeded with the row's nested state. It stays
    /// detached until a lane links it.
    pub fn open_channel(&self, channel_id: &ChannelId) -> Option<MessagePresenter> {
        let nested = self.state.nested(channel_id)?.clone();
        let presenter = MessagePresenter::new(nested, Arc::clone(&self.backend), self.retry);

        Some(match &self.extra_data {
            Some(provider) => presenter.with_extra_data(Arc::clone(provider)),
            None => presenter,
        })
    }

    fn publish(&self, change: ChangeDescriptor) -> ChangeDescriptor {
        self.feed.publish(change.clone());
        change
    }
}
