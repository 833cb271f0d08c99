use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{message_list_state::PageLimits, user::User},
    usecases::retry::RetryPolicy,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub session: SessionConfig,
    pub presenter: PresenterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// Logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub user_id: String,
    pub user_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: "local-user".to_owned(),
            user_name: "Local User".to_owned(),
        }
    }
}

impl SessionConfig {
    pub fn current_user(&self) -> User {
        User::new(&self.user_id, &self.user_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenterConfig {
    pub channel_page_size: usize,
    pub message_page_size: usize,
    pub next_page_size: usize,
    pub query_attempts: usize,
    pub retry_backoff_ms: u64,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            channel_page_size: 20,
            message_page_size: 25,
            next_page_size: 50,
            query_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl PresenterConfig {
    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            first: self.message_page_size,
            next: self.next_page_size,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.query_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}
