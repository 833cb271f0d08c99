use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::user::User;

/// Server-side classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Regular,
    /// Visible only to the current user, never persisted (command previews).
    Ephemeral,
    Error,
    Reply,
    System,
    Deleted,
}

/// Type of attachment carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentKind {
    #[default]
    Image,
    Video,
    File,
    Giphy,
    Link,
    Other,
}

impl AttachmentKind {
    /// Returns a display label for the attachment type.
    pub fn display_label(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "[Photo]",
            AttachmentKind::Video => "[Video]",
            AttachmentKind::File => "[File]",
            AttachmentKind::Giphy => "[GIF]",
            AttachmentKind::Link => "[Link]",
            AttachmentKind::Other => "[Attachment]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub title: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub kind: String,
    pub user: User,
    pub message_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub user: User,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Thread parent; `None` for top-level messages.
    pub parent_id: Option<String>,
    /// Replies flagged this way are shown in the channel as well as the thread.
    pub show_in_channel: bool,
    pub reply_count: u32,
    pub reaction_counts: BTreeMap<String, u32>,
    pub own_reactions: Vec<Reaction>,
    /// Host-defined payload attached when the message is composed locally.
    pub extra_data: BTreeMap<String, String>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        user: User,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Regular,
            user,
            created_at,
            updated_at: created_at,
            deleted_at: None,
            text: text.into(),
            attachments: Vec::new(),
            parent_id: None,
            show_in_channel: false,
            reply_count: 0,
            reaction_counts: BTreeMap::new(),
            own_reactions: Vec::new(),
            extra_data: BTreeMap::new(),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.kind == MessageKind::Ephemeral
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some() || self.kind == MessageKind::Deleted
    }

    pub fn has_own_reaction(&self, kind: &str) -> bool {
        self.own_reactions.iter().any(|reaction| reaction.kind == kind)
    }

    /// Records a reaction of the current user, replacing one of the same kind.
    pub fn add_own_reaction(&mut self, reaction: Reaction) {
        self.remove_own_reaction(&reaction.kind);
        self.own_reactions.push(reaction);
    }

    pub fn remove_own_reaction(&mut self, kind: &str) {
        self.own_reactions.retain(|reaction| reaction.kind != kind);
    }

    /// Returns the display content: attachment label + text, or just text.
    pub fn display_content(&self) -> String {
        if self.is_deleted() {
            return "[Deleted]".to_owned();
        }

        match (self.attachments.first(), self.text.is_empty()) {
            (Some(attachment), true) => attachment.kind.display_label().to_owned(),
            (Some(attachment), false) => {
                format!("{} {}", attachment.kind.display_label(), self.text)
            }
            (None, _) => self.text.clone(),
        }
    }
}

/// A user has read the channel up to `last_read_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRead {
    pub user: User,
    pub last_read_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn msg(text: &str, attachment: Option<AttachmentKind>) -> Message {
        let mut message = Message::new(
            "m1",
            User::new("u1", "User"),
            text,
            Utc.timestamp_opt(1_000, 0).unwrap(),
        );
        if let Some(kind) = attachment {
            message.attachments.push(Attachment {
                kind,
                title: "file".to_owned(),
                url: None,
            });
        }
        message
    }

    fn reaction(kind: &str) -> Reaction {
        Reaction {
            kind: kind.to_owned(),
            user: User::new("u1", "User"),
            message_id: "m1".to_owned(),
            created_at: Utc.timestamp_opt(2_000, 0).unwrap(),
        }
    }

    #[test]
    fn display_content_returns_text_only_without_attachments() {
        assert_eq!(msg("Hello world", None).display_content(), "Hello world");
    }

    #[test]
    fn display_content_returns_label_only_when_text_empty() {
        assert_eq!(
            msg("", Some(AttachmentKind::Image)).display_content(),
            "[Photo]"
        );
    }

    #[test]
    fn display_content_combines_label_and_text() {
        assert_eq!(
            msg("Check this out", Some(AttachmentKind::Giphy)).display_content(),
            "[GIF] Check this out"
        );
    }

    #[test]
    fn display_content_hides_deleted_text() {
        let mut message = msg("secret", None);
        message.deleted_at = Some(Utc.timestamp_opt(3_000, 0).unwrap());

        assert_eq!(message.display_content(), "[Deleted]");
    }

    #[test]
    fn own_reactions_are_unique_per_kind() {
        let mut message = msg("hi", None);

        message.add_own_reaction(reaction("like"));
        message.add_own_reaction(reaction("like"));
        message.add_own_reaction(reaction("love"));
        assert_eq!(message.own_reactions.len(), 2);

        message.remove_own_reaction("like");
        assert!(!message.has_own_reaction("like"));
        assert!(message.has_own_reaction("love"));
    }
}
