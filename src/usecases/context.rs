use crate::{domain::user::User, infra::config::AppConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    pub config: AppConfig,
    pub current_user: User,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let current_user = config.session.current_user();
        Self {
            config,
            current_user,
        }
    }
}
