//! Error taxonomy exposed by the catalog service.

use crate::model::song::SongValidationError;
use crate::repo::song_repo::{RepoError, SongLookup};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Stable, externally visible failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Short outcome text rendered to clients.
    pub fn signal(self) -> &'static str {
        match self {
            Self::InvalidInput => "bad request",
            Self::Conflict => "already exists",
            Self::NotFound => "no such song",
            Self::Internal => "internal error",
        }
    }

    /// Status code an HTTP adapter should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::Conflict => 403,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("bad request: {field}: {message}")]
    InvalidInput { field: &'static str, message: String },
    #[error("already exists: song `{name}` by `{group_name}`")]
    Conflict { name: String, group_name: String },
    #[error("no such song: {0}")]
    NotFound(SongLookup),
    #[error("internal error")]
    Internal(#[source] RepoError),
}

impl ServiceError {
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether an internal failure came from a cancelled or expired context.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Internal(source) if source.is_cancelled())
    }

    /// Response body for outer adapters. Never carries raw storage errors.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            error: self.to_string(),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => {
                let field = match err {
                    SongValidationError::EmptyName => "name",
                    SongValidationError::EmptyGroupName => "group_name",
                };
                Self::invalid_input(field, err.to_string())
            }
            RepoError::Conflict { name, group_name } => Self::Conflict { name, group_name },
            RepoError::NotFound(lookup) => Self::NotFound(lookup),
            other => Self::Internal(other),
        }
    }
}

/// Error body shape returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
}
