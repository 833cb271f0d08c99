use std::{path::Path, sync::Arc};

use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    domain::channel_list_state::ChannelListState,
    infra::{self, config::FileConfigAdapter, contracts::ConfigAdapter, error::AppError},
    usecases::{
        channel_list_presenter::ChannelListPresenter,
        context::AppContext,
        contracts::{ChannelFilter, ChannelSort, ChatBackend},
    },
};

/// Loads config and installs logging; the guard keeps file logging alive.
pub fn bootstrap(
    config_path: Option<&Path>,
) -> Result<(AppContext, Option<WorkerGuard>), AppError> {
    let context = build_context(config_path)?;
    let guard = infra::logging::init(&context.config.logging)?;

    Ok((context, guard))
}

/// Channel list of the session user, configured from `context`.
pub fn compose_channel_list(
    context: &AppContext,
    backend: Arc<dyn ChatBackend>,
) -> ChannelListPresenter {
    let presenter_config = &context.config.presenter;
    let state = ChannelListState::new(
        context.current_user.clone(),
        presenter_config.channel_page_size,
        presenter_config.page_limits(),
    );
    let filter = ChannelFilter {
        kind: None,
        member_id: Some(context.current_user.id.clone()),
    };

    ChannelListPresenter::new(state, backend, presenter_config.retry_policy())
        .with_query(filter, ChannelSort::LastMessageDesc)
}

fn build_context(config_path: Option<&Path>) -> Result<AppContext, AppError> {
    let config_adapter = FileConfigAdapter::new(config_path);
    let config = config_adapter.load().map_err(AppError::Other)?;

    Ok(AppContext::new(config))
}
