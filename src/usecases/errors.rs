use thiserror::Error;

use super::{contracts::BackendError, retry::RetryFailure};

/// A page could not be loaded; terminal for the presenter's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("not authorized to load this page")]
    Unauthorized,
    #[error("page is temporarily unavailable after {attempts} attempts")]
    TemporarilyUnavailable { attempts: usize },
    #[error("page violates the data contract")]
    DataContractViolation,
    #[error("{0} not found")]
    NotFound(String),
}

/// A write command failed; reported to its caller only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("message is longer than {max} characters")]
    MessageTooLong { max: usize },
    #[error("there is no ephemeral message to act on")]
    NoEphemeralMessage,
    #[error("{0} not found")]
    NotFound(String),
    #[error("not authorized")]
    Unauthorized,
    #[error("service is temporarily unavailable")]
    TemporarilyUnavailable,
    #[error("response violates the data contract")]
    DataContractViolation,
}

pub fn map_query_failure(failure: RetryFailure) -> QueryError {
    match failure.error {
        BackendError::Unauthorized => QueryError::Unauthorized,
        BackendError::Unavailable => QueryError::TemporarilyUnavailable {
            attempts: failure.attempts,
        },
        BackendError::InvalidData => QueryError::DataContractViolation,
        BackendError::NotFound(what) => QueryError::NotFound(what),
    }
}

pub fn map_command_error(error: BackendError) -> CommandError {
    match error {
        BackendError::Unauthorized => CommandError::Unauthorized,
        BackendError::Unavailable => CommandError::TemporarilyUnavailable,
        BackendError::InvalidData => CommandError::DataContractViolation,
        BackendError::NotFound(what) => CommandError::NotFound(what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_transient_failure_keeps_attempt_count() {
        let error = map_query_failure(RetryFailure {
            error: BackendError::Unavailable,
            attempts: 3,
        });

        assert_eq!(error, QueryError::TemporarilyUnavailable { attempts: 3 });
    }

    #[test]
    fn maps_not_found_for_queries_and_commands() {
        let failure = RetryFailure {
            error: BackendError::NotFound("channel".to_owned()),
            attempts: 1,
        };

        assert_eq!(
            map_query_failure(failure),
            QueryError::NotFound("channel".to_owned())
        );
        assert_eq!(
            map_command_error(BackendError::NotFound("message".to_owned())),
            CommandError::NotFound("message".to_owned())
        );
    }

    #[test]
    fn maps_invalid_data_to_contract_violation() {
        assert_eq!(
            map_command_error(BackendError::InvalidData),
            CommandError::DataContractViolation
        );
    }
}
