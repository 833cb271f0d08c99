use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    channel::ChannelId,
    channel_list_state::ChannelResponse,
    message::{Attachment, Message},
    message_list_state::MessagePage,
    pagination::Pagination,
};

/// Failure reported by the backend for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("request is not authorized")]
    Unauthorized,
    #[error("service is temporarily unavailable")]
    Unavailable,
    #[error("response violates the data contract")]
    InvalidData,
    #[error("{0} not found")]
    NotFound(String),
}

impl BackendError {
    /// Only transient failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelFilter {
    pub kind: Option<String>,
    /// Restricts the query to channels this user is a member of.
    pub member_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelSort {
    #[default]
    LastMessageDesc,
    NameAsc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelsQuery {
    pub filter: ChannelFilter,
    pub sort: ChannelSort,
    pub pagination: Pagination,
    /// Newest messages returned with every channel.
    pub message_limit: usize,
}

/// Outgoing message before the server assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageDraft {
    pub text: String,
    pub parent_id: Option<String>,
    pub show_in_channel: bool,
    pub attachments: Vec<Attachment>,
    pub extra_data: std::collections::BTreeMap<String, String>,
}

/// Action on an ephemeral command preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralAction {
    Send,
    Shuffle,
    Cancel,
}

/// REST side of the chat service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn query_channels(
        &self,
        query: &ChannelsQuery,
    ) -> Result<Vec<ChannelResponse>, BackendError>;

    async fn query_messages(
        &self,
        channel: &ChannelId,
        pagination: &Pagination,
    ) -> Result<MessagePage, BackendError>;

    async fn query_replies(
        &self,
        parent_id: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Message>, BackendError>;

    /// Returns the stored message, or an ephemeral preview for commands.
    async fn send_message(
        &self,
        channel: &ChannelId,
        draft: &MessageDraft,
    ) -> Result<Message, BackendError>;

    /// Returns the resulting message, if the action produced one.
    async fn send_ephemeral_action(
        &self,
        channel: &ChannelId,
        message: &Message,
        action: EphemeralAction,
    ) -> Result<Option<Message>, BackendError>;

    async fn delete_message(&self, message_id: &str) -> Result<Message, BackendError>;

    async fn add_reaction(&self, message_id: &str, kind: &str) -> Result<Message, BackendError>;

    async fn delete_reaction(&self, message_id: &str, kind: &str)
        -> Result<Message, BackendError>;

    async fn send_typing(&self, channel: &ChannelId, started: bool) -> Result<(), BackendError>;

    async fn mark_read(&self, channel: &ChannelId) -> Result<(), BackendError>;
}

/// Hook for host applications to attach custom data to composed messages.
pub trait ExtraDataProvider: Send + Sync {
    fn extra_data(
        &self,
        channel: &ChannelId,
        draft: &MessageDraft,
    ) -> std::collections::BTreeMap<String, String>;
}
