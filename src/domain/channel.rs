use std::fmt;

use super::user::User;

const DEFAULT_MAX_MESSAGE_LENGTH: usize = 5_000;

/// Composite channel key: channel type plus id, unique only together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId {
    pub kind: String,
    pub id: String,
}

impl ChannelId {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Per-channel feature flags delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Whether read receipts are sent and tracked.
    pub read_events: bool,
    /// Whether typing indicators are sent and tracked.
    pub typing_events: bool,
    /// Whether reply threads are allowed.
    pub replies: bool,
    pub max_message_length: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_events: true,
            typing_events: true,
            replies: true,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub config: ChannelConfig,
    pub members: Vec<User>,
}

impl Channel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            config: ChannelConfig::default(),
            members: Vec::new(),
        }
    }

    pub fn is_member(&self, user: &User) -> bool {
        self.members.iter().any(|member| member.id == user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_display_joins_kind_and_id() {
        assert_eq!(ChannelId::new("messaging", "general").to_string(), "messaging:general");
    }

    #[test]
    fn membership_is_checked_by_user_id() {
        let mut channel = Channel::new(ChannelId::new("messaging", "general"), "General");
        channel.members.push(User::new("alice", "Alice"));

        assert!(channel.is_member(&User::new("alice", "Alice Renamed")));
        assert!(!channel.is_member(&User::new("bob", "Bob")));
    }
}
