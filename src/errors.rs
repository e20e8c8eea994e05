//! Typed error hierarchy for Flame.
//!
//! - `FlameError`: domain failures raised by the database layer and handlers
//! - `IntegrationError`: inventory fetch failures from Docker or Kubernetes
//! - `ClientError`: failures seen by the HTTP client
//!
//! Database methods return `anyhow::Result`; a `FlameError` travels inside the
//! `anyhow::Error` and is recovered with `downcast_ref` when mapping to HTTP.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlameError {
    #[error("Category with id of {id} was not found")]
    CategoryNotFound { id: i64 },

    #[error("App with id of {id} was not found")]
    AppNotFound { id: i64 },

    #[error("Bookmark with id of {id} was not found")]
    BookmarkNotFound { id: i64 },

    #[error("Query with prefix of {prefix} was not found")]
    QueryNotFound { prefix: String },

    #[error("Config key {key} was not found")]
    SettingNotFound { key: String },

    #[error("Reorder rejected, unknown ids: {ids:?}")]
    UnknownReorderIds { ids: Vec<i64> },

    #[error("{0}")]
    Validation(String),

    #[error("Invalid value for config key {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

impl FlameError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CategoryNotFound { .. }
                | Self::AppNotFound { .. }
                | Self::BookmarkNotFound { .. }
                | Self::QueryNotFound { .. }
                | Self::SettingNotFound { .. }
                | Self::UnknownReorderIds { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("Cannot connect to Docker at {host}: {source}")]
    DockerUnavailable {
        host: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Kubernetes API request failed: {0}")]
    KubernetesRequest(#[source] reqwest::Error),

    #[error("Not running inside a Kubernetes cluster: {0}")]
    NotInCluster(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}
