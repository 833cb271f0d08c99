use crate::domain::channel_list_state::ChannelResponse;

use super::{
    contracts::{ChannelsQuery, ChatBackend},
    errors::{map_query_failure, QueryError},
    retry::{with_retry, RetryPolicy},
};

const DEFAULT_CHANNEL_PAGE_SIZE: usize = 20;
const MAX_CHANNEL_PAGE_SIZE: usize = 30;
const DEFAULT_CHANNEL_MESSAGE_LIMIT: usize = 25;
const MAX_CHANNEL_MESSAGE_LIMIT: usize = 300;

fn normalized(value: usize, default: usize, max: usize) -> usize {
    match value {
        0 => default,
        value if value > max => max,
        value => value,
    }
}

/// Fetches one page of channels, retrying transient failures.
pub async fn load_channels(
    backend: &dyn ChatBackend,
    query: ChannelsQuery,
    policy: &RetryPolicy,
) -> Result<Vec<ChannelResponse>, QueryError> {
    let limit = normalized(
        query.pagination.limit(),
        DEFAULT_CHANNEL_PAGE_SIZE,
        MAX_CHANNEL_PAGE_SIZE,
    );
    let query = ChannelsQuery {
        pagination: query.pagination.with_limit(limit),
        message_limit: normalized(
            query.message_limit,
            DEFAULT_CHANNEL_MESSAGE_LIMIT,
            MAX_CHANNEL_MESSAGE_LIMIT,
        ),
        ..query
    };

    with_retry(policy, "query_channels", || backend.query_channels(&query))
        .await
        .map_err(map_query_failure)
}
