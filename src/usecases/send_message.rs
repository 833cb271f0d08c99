//! Composing and sending outgoing messages.
//!
//! Validation runs before the backend is called, so rejected drafts never
//! produce a request.

use std::sync::Arc;

use crate::domain::{
    channel::Channel,
    message::{Attachment, Message},
};

use super::{
    contracts::{ChatBackend, ExtraDataProvider, MessageDraft},
    errors::{map_command_error, CommandError},
};

/// Message typed by the user, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendMessageCommand {
    pub text: String,
    /// Set when replying inside a thread.
    pub parent_id: Option<String>,
    /// Also show a thread reply in the channel.
    pub show_in_channel: bool,
    pub attachments: Vec<Attachment>,
}

impl SendMessageCommand {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Validates `command` against the channel config and builds the draft.
///
/// # Errors
/// Returns `CommandError::EmptyMessage` when there is neither text nor an
/// attachment, and `CommandError::MessageTooLong` when the trimmed text
/// exceeds the channel's limit.
pub fn compose_message(
    channel: &Channel,
    command: SendMessageCommand,
    extra_data: Option<&Arc<dyn ExtraDataProvider>>,
) -> Result<MessageDraft, CommandError> {
    let text = command.text.trim();
    if text.is_empty() && command.attachments.is_empty() {
        return Err(CommandError::EmptyMessage);
    }

    let max = channel.config.max_message_length;
    if text.chars().count() > max {
        return Err(CommandError::MessageTooLong { max });
    }

    let mut draft = MessageDraft {
        text: text.to_owned(),
        show_in_channel: command.show_in_channel && command.parent_id.is_some(),
        parent_id: command.parent_id,
        attachments: command.attachments,
        extra_data: Default::default(),
    };
    if let Some(provider) = extra_data {
        draft.extra_data = provider.extra_data(&channel.id, &draft);
    }

    Ok(draft)
}

/// Sends a composed message and returns what the server stored, or an
/// ephemeral preview for slash commands.
pub async fn send_message(
    backend: &dyn ChatBackend,
    channel: &Channel,
    command: SendMessageCommand,
    extra_data: Option<&Arc<dyn ExtraDataProvider>>,
) -> Result<Message, CommandError> {
    let draft = compose_message(channel, command, extra_data)?;

    backend
        .send_message(&channel.id, &draft)
        .await
        .map_err(map_command_error)
}
