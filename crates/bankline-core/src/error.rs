//! Error types for Bankline

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Provider credentials or other required settings are missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider reported the requested user or connection does not exist
    #[error("Provider resource not found (HTTP {status}): {body}")]
    NotFound { status: u16, body: String },

    /// Provider refused to create a resource that already exists
    #[error("Provider resource already exists (HTTP {status}): {body}")]
    Conflict { status: u16, body: String },

    /// Any other non-2xx provider response, or a not-found/conflict we could not recover from
    #[error("Provider request failed (HTTP {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("A sync is already running for user {0}")]
    SyncInProgress(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Turn an unrecovered not-found or conflict into an upstream failure
    pub(crate) fn into_upstream(self) -> Self {
        match self {
            Error::NotFound { status, body } | Error::Conflict { status, body } => {
                Error::Upstream { status, body }
            }
            other => other,
        }
    }

    /// Upstream status code, if this error came from a provider response
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Error::NotFound { status, .. }
            | Error::Conflict { status, .. }
            | Error::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One account whose transactions could not be fetched during a sync
///
/// Not an `Error` variant: these are collected and reported, never propagated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFetchError {
    pub item_id: String,
    pub account_id: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, Error>;
