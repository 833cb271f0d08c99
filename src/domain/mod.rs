//! Domain layer: chat entities and the pure reconciliation engine.

pub mod change;
pub mod channel;
pub mod channel_list_state;
pub mod events;
pub mod item_list;
pub mod message;
pub mod message_list_state;
pub mod pagination;
pub mod user;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
