use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::domain::{channel::ChannelId, events::ServerEvent};

/// Identity of one subscription, used to keep a presenter's own echo away
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteId(u64);

/// Event raised locally by a linked presenter after a confirmed write.
#[derive(Debug)]
pub struct LocalEvent {
    pub origin: RouteId,
    pub event: ServerEvent,
}

/// Fans live events out to the presenters opened for a channel.
///
/// Events without a channel reach every route. A route is pruned once its
/// receiver is dropped, and `close` ends every receiver.
#[derive(Clone, Debug, Default)]
pub struct EventRouter {
    inner: Arc<Mutex<RouterState>>,
}

#[derive(Debug, Default)]
struct RouterState {
    next_id: u64,
    routes: Vec<Route>,
    closed: bool,
}

#[derive(Debug)]
struct Route {
    id: RouteId,
    channel: ChannelId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &ChannelId) -> Subscription {
        let (tx, events) = mpsc::unbounded_channel();
        let mut id = RouteId(0);

        if let Ok(mut state) = self.inner.lock() {
            id = RouteId(state.next_id);
            state.next_id += 1;
            if !state.closed {
                state.routes.push(Route {
                    id,
                    channel: channel.clone(),
                    tx,
                });
            }
        }

        Subscription { id, events }
    }

    /// Delivers `event` to every matching route; returns how many got it.
    pub fn route(&self, event: &ServerEvent) -> usize {
        self.deliver(event, None)
    }

    /// Like `route`, skipping the subscription that raised the event.
    pub fn route_from(&self, origin: RouteId, event: &ServerEvent) -> usize {
        self.deliver(event, Some(origin))
    }

    /// Live routes, after pruning dropped receivers.
    pub fn route_count(&self) -> usize {
        self.inner
            .lock()
            .map(|mut state| {
                state.routes.retain(|route| !route.tx.is_closed());
                state.routes.len()
            })
            .unwrap_or(0)
    }

    /// Drops every route; receivers see the end of their stream.
    pub fn close(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.closed = true;
            state.routes.clear();
        }
    }

    fn deliver(&self, event: &ServerEvent, skip: Option<RouteId>) -> usize {
        let Ok(mut state) = self.inner.lock() else {
            return 0;
        };

        let target = event.channel_id();
        let mut delivered = 0;
        state.routes.retain(|route| {
            let matches = target.map_or(true, |channel| *channel == route.channel);
            if !matches || skip == Some(route.id) {
                return !route.tx.is_closed();
            }
            let sent = route.tx.send(event.clone()).is_ok();
            delivered += usize::from(sent);
            sent
        });
        delivered
    }
}

/// Receiving end of one route.
#[derive(Debug)]
pub struct Subscription {
    id: RouteId,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Subscription {
    pub fn id(&self) -> RouteId {
        self.id
    }
}

/// Connection of an opened presenter to the lane that owns its channel:
/// routed events come in, confirmed writes go back out.
#[derive(Debug)]
pub struct ChannelLink {
    subscription: Subscription,
    router: EventRouter,
    echo: mpsc::WeakUnboundedSender<LocalEvent>,
}

impl ChannelLink {
    pub fn new(
        router: &EventRouter,
        channel: &ChannelId,
        echo: mpsc::WeakUnboundedSender<LocalEvent>,
    ) -> Self {
        Self {
            subscription: router.subscribe(channel),
            router: router.clone(),
            echo,
        }
    }

    /// Another link on the same lane, e.g. for a thread of this channel.
    pub fn for_channel(&self, channel: &ChannelId) -> Self {
        Self::new(&self.router, channel, self.echo.clone())
    }

    /// Waits for the next routed event; `None` once the lane stopped.
    pub async fn next(&mut self) -> Option<ServerEvent> {
        self.subscription.events.recv().await
    }

    pub fn try_next(&mut self) -> Option<ServerEvent> {
        self.subscription.events.try_recv().ok()
    }

    /// Hands a locally confirmed event to the lane; `false` if it is gone.
    pub fn echo(&self, event: ServerEvent) -> bool {
        let origin = self.subscription.id();
        self.echo
            .upgrade()
            .is_some_and(|tx| tx.send(LocalEvent { origin, event }).is_ok())
    }
}
