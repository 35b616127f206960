use thiserror::Error;

use crate::domain::EventId;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Torque event not found: {0}")]
    EventNotFound(EventId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to publish session update: {0}")]
    PublishError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
