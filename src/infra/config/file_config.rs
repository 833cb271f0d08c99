use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, LogConfig, PresenterConfig, SessionConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub session: Option<FileSessionConfig>,
    pub presenter: Option<FilePresenterConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(session) = self.session {
            session.merge_into(&mut config.session);
        }

        if let Some(presenter) = self.presenter {
            presenter.merge_into(&mut config.presenter);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(file) = self.file {
            config.file = Some(file);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSessionConfig {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

impl FileSessionConfig {
    fn merge_into(self, config: &mut SessionConfig) {
        if let Some(user_id) = self.user_id {
            config.user_id = user_id;
        }

        if let Some(user_name) = self.user_name {
            config.user_name = user_name;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FilePresenterConfig {
    pub channel_page_size: Option<usize>,
    pub message_page_size: Option<usize>,
    pub next_page_size: Option<usize>,
    pub query_attempts: Option<usize>,
    pub retry_backoff_ms: Option<u64>,
}

impl FilePresenterConfig {
    fn merge_into(self, config: &mut PresenterConfig) {
        if let Some(size) = self.channel_page_size {
            config.channel_page_size = size;
        }

        if let Some(size) = self.message_page_size {
            config.message_page_size = size;
        }

        if let Some(size) = self.next_page_size {
            config.next_page_size = size;
        }

        if let Some(attempts) = self.query_attempts {
            config.query_attempts = attempts;
        }

        if let Some(backoff_ms) = self.retry_backoff_ms {
            config.retry_backoff_ms = backoff_ms;
        }
    }
}
