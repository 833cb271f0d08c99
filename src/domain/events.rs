use super::{
    channel::{Channel, ChannelId},
    message::{Message, MessageRead, Reaction},
    user::User,
};

/// Typed event delivered by the realtime connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    TypingStart {
        channel: ChannelId,
        user: User,
    },
    TypingStop {
        channel: ChannelId,
        user: User,
    },
    MessageNew {
        channel: ChannelId,
        message: Message,
        /// Unread count of the current user after this message, when known.
        unread_count: Option<u32>,
    },
    MessageUpdated {
        channel: ChannelId,
        message: Message,
    },
    MessageDeleted {
        channel: ChannelId,
        message: Message,
    },
    ReactionNew {
        channel: ChannelId,
        reaction: Reaction,
        message: Message,
    },
    ReactionDeleted {
        channel: ChannelId,
        reaction: Reaction,
        message: Message,
    },
    MessageRead {
        channel: ChannelId,
        read: MessageRead,
    },
    ChannelUpdated {
        channel: Channel,
    },
    ChannelDeleted {
        channel: ChannelId,
    },
    ChannelHidden {
        channel: ChannelId,
    },
    NotificationAddedToChannel {
        channel: Channel,
    },
    NotificationMarkRead {
        channel: ChannelId,
        unread_count: u32,
    },
    NotificationMarkAllRead,
    /// The realtime connection was re-established; transient state is stale.
    ConnectionRecovered,
}

impl ServerEvent {
    /// Channel the event is routed to; `None` for connection-wide events.
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::TypingStart { channel, .. }
            | Self::TypingStop { channel, .. }
            | Self::MessageNew { channel, .. }
            | Self::MessageUpdated { channel, .. }
            | Self::MessageDeleted { channel, .. }
            | Self::ReactionNew { channel, .. }
            | Self::ReactionDeleted { channel, .. }
            | Self::MessageRead { channel, .. }
            | Self::ChannelDeleted { channel }
            | Self::ChannelHidden { channel }
            | Self::NotificationMarkRead { channel, .. } => Some(channel),
            Self::ChannelUpdated { channel } | Self::NotificationAddedToChannel { channel } => {
                Some(&channel.id)
            }
            Self::NotificationMarkAllRead | Self::ConnectionRecovered => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TypingStart { .. } => "typing.start",
            Self::TypingStop { .. } => "typing.stop",
            Self::MessageNew { .. } => "message.new",
            Self::MessageUpdated { .. } => "message.updated",
            Self::MessageDeleted { .. } => "message.deleted",
            Self::ReactionNew { .. } => "reaction.new",
            Self::ReactionDeleted { .. } => "reaction.deleted",
            Self::MessageRead { .. } => "message.read",
            Self::ChannelUpdated { .. } => "channel.updated",
            Self::ChannelDeleted { .. } => "channel.deleted",
            Self::ChannelHidden { .. } => "channel.hidden",
            Self::NotificationAddedToChannel { .. } => "notification.added_to_channel",
            Self::NotificationMarkRead { .. } => "notification.mark_read",
            Self::NotificationMarkAllRead => "notification.mark_all_read",
            Self::ConnectionRecovered => "connection.recovered",
        }
    }
}
