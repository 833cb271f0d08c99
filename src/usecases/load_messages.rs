use crate::domain::{
    channel::ChannelId, message::Message, message_list_state::MessagePage,
    pagination::Pagination,
};

use super::{
    contracts::ChatBackend,
    errors::{map_query_failure, QueryError},
    retry::{with_retry, RetryPolicy},
};

/// Fetches one page of channel history, retrying transient failures.
pub async fn load_messages(
    backend: &dyn ChatBackend,
    channel: &ChannelId,
    pagination: &Pagination,
    policy: &RetryPolicy,
) -> Result<MessagePage, QueryError> {
    with_retry(policy, "query_messages", || {
        backend.query_messages(channel, pagination)
    })
    .await
    .map_err(map_query_failure)
}

/// Fetches one page of a reply thread.
///
/// Replies carry no read state, so the page has no receipts.
pub async fn load_replies(
    backend: &dyn ChatBackend,
    parent_id: &str,
    pagination: &Pagination,
    policy: &RetryPolicy,
) -> Result<MessagePage, QueryError> {
    let messages: Vec<Message> = with_retry(policy, "query_replies", || {
        backend.query_replies(parent_id, pagination)
    })
    .await
    .map_err(map_query_failure)?;

    Ok(MessagePage {
        messages,
        reads: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        domain::{channel::Channel, user::User},
        infra::memory_backend::InMemoryBackend,
    };

    fn instant() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        }
    }

    fn general() -> ChannelId {
        ChannelId::new("messaging", "general")
    }

    fn backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new(User::new("me", "Me"));
        let bob = User::new("bob", "Bob");
        let parent = Message::new("p", bob.clone(), "question", Utc.timestamp_opt(1, 0).unwrap());
        let mut reply = Message::new("r", bob, "answer", Utc.timestamp_opt(2, 0).unwrap());
        reply.parent_id = Some("p".to_owned());
        backend.add_channel(Channel::new(general(), "General"), vec![parent, reply]);
        backend
    }

    #[tokio::test]
    async fn thread_replies_are_excluded_from_channel_history() {
        let backend = backend();

        let page = load_messages(&backend, &general(), &Pagination::initial(25), &instant())
            .await
            .expect("load should succeed");

        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].id, "p");
    }

    #[tokio::test]
    async fn loads_replies_of_parent() {
        let backend = backend();

        let page = load_replies(&backend, "p", &Pagination::initial(25), &instant())
            .await
            .expect("load should succeed");

        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].id, "r");
        assert!(page.reads.is_empty());
    }

    #[tokio::test]
    async fn reports_attempts_after_exhausting_retries() {
        let backend = backend();
        backend.fail_next_queries(5);

        let err = load_messages(&backend, &general(), &Pagination::initial(25), &instant())
            .await
            .expect_err("must fail");

        assert_eq!(err, QueryError::TemporarilyUnavailable { attempts: 3 });
        assert_eq!(backend.calls().len(), 3);
    }

    #[tokio::test]
    async fn maps_missing_channel_to_not_found() {
        let backend = backend();

        let err = load_messages(
            &backend,
            &ChannelId::new("messaging", "missing"),
            &Pagination::initial(25),
            &instant(),
        )
        .await
        .expect_err("must fail");

        assert_eq!(err, QueryError::NotFound("channel messaging:missing".to_owned()));
    }
}
