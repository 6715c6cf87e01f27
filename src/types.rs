//! Shared error and result types for Portico

use serde::Serialize;
use std::fmt;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, PorticoError>;

/// Stable error classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    Forbidden,
    NotFound,
    KeyNotFound,
    TransportError,
    ProtocolError,
    AlreadyExists,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// HTTP status code used by the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::ValidationError => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound | ErrorKind::KeyNotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => 409,
            ErrorKind::TransportError | ErrorKind::ProtocolError => 502,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::KeyNotFound => "key_not_found",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A durable side effect that happened before a request failed.
///
/// Reported alongside a later failure so callers know which parts of the
/// operation already took effect and must not be blindly repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum CompletedEffect {
    /// Content was added to the network's endpoint
    ContentAdded { content_hash: String },
    /// A naming record was published on the endpoint
    RecordPublished {
        record_name: String,
        record_value: String,
        entry_persisted: bool,
    },
}

/// Portico error type
#[derive(Debug, thiserror::Error)]
pub enum PorticoError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("concurrent update: {0}")]
    Conflict(String),

    /// Storage endpoint unreachable or timed out
    #[error("storage endpoint error: {0}")]
    Endpoint(String),

    /// Malformed response from a collaborator
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("nats error: {0}")]
    Nats(String),

    /// Enqueue failed; `completed` lists what already happened upstream
    #[error("failed to enqueue message: {message}")]
    Publish {
        message: String,
        completed: Option<CompletedEffect>,
    },

    #[error("internal error: {0}")]
    Internal(String),

    /// A later step failed after an earlier one took durable effect
    #[error("{source}")]
    Partial {
        source: Box<PorticoError>,
        completed: CompletedEffect,
    },
}

impl PorticoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PorticoError::Validation(_) => ErrorKind::ValidationError,
            PorticoError::Forbidden(_) => ErrorKind::Forbidden,
            PorticoError::NotFound(_) => ErrorKind::NotFound,
            PorticoError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            PorticoError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            PorticoError::Conflict(_) => ErrorKind::Conflict,
            PorticoError::Endpoint(_)
            | PorticoError::Database(_)
            | PorticoError::Nats(_)
            | PorticoError::Publish { .. } => ErrorKind::TransportError,
            PorticoError::Protocol(_) => ErrorKind::ProtocolError,
            PorticoError::Internal(_) => ErrorKind::Internal,
            PorticoError::Partial { source, .. } => source.kind(),
        }
    }

    /// Side effect that survived this failure, if any
    pub fn completed(&self) -> Option<&CompletedEffect> {
        match self {
            PorticoError::Publish { completed, .. } => completed.as_ref(),
            PorticoError::Partial { completed, .. } => Some(completed),
            _ => None,
        }
    }

    /// Record a side effect that already happened before this failure
    pub fn with_completed(self, effect: CompletedEffect) -> Self {
        match self {
            PorticoError::Publish { message, .. } => PorticoError::Publish {
                message,
                completed: Some(effect),
            },
            PorticoError::Partial { source, .. } => PorticoError::Partial {
                source,
                completed: effect,
            },
            other => PorticoError::Partial {
                source: Box::new(other),
                completed: effect,
            },
        }
    }

    /// Message safe to show to callers.
    ///
    /// Database and internal errors are collapsed so driver details never leak.
    pub fn public_message(&self) -> String {
        match self {
            PorticoError::Database(_) => "persistence layer unavailable".to_string(),
            PorticoError::Internal(_) => "internal error".to_string(),
            PorticoError::Partial { source, .. } => source.public_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PorticoError::Validation("x".into()).kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            PorticoError::Nats("down".into()).kind(),
            ErrorKind::TransportError
        );
        assert_eq!(
            PorticoError::KeyNotFound("k1".into()).kind().status_code(),
            404
        );
        assert_eq!(ErrorKind::AlreadyExists.to_string(), "already_exists");
    }

    #[test]
    fn test_with_completed_keeps_kind() {
        let effect = CompletedEffect::ContentAdded {
            content_hash: "QmHash".into(),
        };
        let err = PorticoError::Publish {
            message: "no ack".into(),
            completed: None,
        }
        .with_completed(effect.clone());
        assert_eq!(err.completed(), Some(&effect));

        let other = PorticoError::Database("down".into()).with_completed(effect.clone());
        assert_eq!(other.completed(), Some(&effect));
        assert_eq!(other.kind(), ErrorKind::TransportError);
        assert_eq!(other.public_message(), "persistence layer unavailable");
    }

    #[test]
    fn test_public_message_hides_database_details() {
        let err = PorticoError::Database("E11000 duplicate key on users.address".into());
        assert_eq!(err.public_message(), "persistence layer unavailable");
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }

    #[test]
    fn test_completed_effect_serialization() {
        let effect = CompletedEffect::RecordPublished {
            record_name: "k51abc".into(),
            record_value: "/ipfs/Qm123".into(),
            entry_persisted: true,
        };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["effect"], "record_published");
        assert_eq!(json["entry_persisted"], true);
    }
}
