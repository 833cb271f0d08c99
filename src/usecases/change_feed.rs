use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::domain::change::ChangeDescriptor;

use super::errors::QueryError;

pub type FeedItem = Result<ChangeDescriptor, QueryError>;

/// Fan-out of change descriptors to every subscriber of a presenter.
///
/// New subscribers first receive the latest descriptor. A query error ends
/// the feed: it is delivered once and every receiver is closed afterwards.
#[derive(Clone, Debug, Default)]
pub struct ChangeFeed {
    inner: Arc<Mutex<FeedState>>,
}

#[derive(Debug, Default)]
struct FeedState {
    latest: Option<FeedItem>,
    subscribers: Vec<mpsc::UnboundedSender<FeedItem>>,
    terminated: bool,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FeedItem> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.inner.lock() {
            if let Some(latest) = &state.latest {
                let _ = tx.send(latest.clone());
            }
            if !state.terminated {
                state.subscribers.push(tx);
            }
        }
        rx
    }

    /// Delivers `change` to all live subscribers; empty changes are dropped.
    pub fn publish(&self, change: ChangeDescriptor) {
        if change.is_none() {
            return;
        }

        if let Ok(mut state) = self.inner.lock() {
            if state.terminated {
                return;
            }
            let item: FeedItem = Ok(change);
            state
                .subscribers
                .retain(|subscriber| subscriber.send(item.clone()).is_ok());
            state.latest = Some(item);
        }
    }

    /// Delivers `error` and closes the feed.
    pub fn fail(&self, error: QueryError) {
        if let Ok(mut state) = self.inner.lock() {
            if state.terminated {
                return;
            }
            let item: FeedItem = Err(error);
            for subscriber in state.subscribers.drain(..) {
                let _ = subscriber.send(item.clone());
            }
            state.latest = Some(item);
            state.terminated = true;
        }
    }

    pub fn latest(&self) -> Option<FeedItem> {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.latest.clone())
    }

    pub fn is_terminated(&self) -> bool {
        self.inner
            .lock()
            .map(|state| state.terminated)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footer(visible: bool) -> ChangeDescriptor {
        ChangeDescriptor::FooterUpdated { visible }
    }

    #[test]
    fn late_subscriber_receives_latest_change() {
        let feed = ChangeFeed::new();
        feed.publish(footer(true));
        feed.publish(footer(false));

        let mut rx = feed.subscribe();

        assert_eq!(rx.try_recv(), Ok(Ok(footer(false))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_changes_are_not_published() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        feed.publish(ChangeDescriptor::None);

        assert!(rx.try_recv().is_err());
        assert_eq!(feed.latest(), None);
    }

    #[test]
    fn failure_is_delivered_once_and_closes_subscribers() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();

        feed.fail(QueryError::Unauthorized);
        feed.publish(footer(true));

        assert_eq!(rx.try_recv(), Ok(Err(QueryError::Unauthorized)));
        assert_eq!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
        assert!(feed.is_terminated());
    }

    #[test]
    fn subscribing_to_terminated_feed_replays_error_then_closes() {
        let feed = ChangeFeed::new();
        feed.fail(QueryError::DataContractViolation);

        let mut rx = feed.subscribe();

        assert_eq!(rx.try_recv(), Ok(Err(QueryError::DataContractViolation)));
        assert_eq!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ChangeFeed::new();
        drop(feed.subscribe());
        let mut rx = feed.subscribe();

        feed.publish(footer(true));

        assert_eq!(rx.try_recv(), Ok(Ok(footer(true))));
        assert_eq!(feed.inner.lock().unwrap().subscribers.len(), 1);
    }
}
