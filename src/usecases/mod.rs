//! Use case layer: presenters, queries with retry, and message commands.

pub mod bootstrap;
pub mod change_feed;
pub mod channel_list_lane;
pub mod channel_list_presenter;
pub mod context;
pub mod contracts;
pub mod errors;
pub mod event_router;
pub mod load_channels;
pub mod load_messages;
pub mod message_presenter;
pub mod retry;
pub mod send_message;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
