//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod bank;
pub mod health;
pub mod transactions;

// Re-export all handlers for use in router
pub use bank::*;
pub use health::*;
pub use transactions::*;

use crate::AppError;

/// Reject blank user ids before they reach storage or the provider
pub(crate) fn require_user_id(user_id: &str) -> Result<&str, AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::bad_request("user_id is required"));
    }
    Ok(user_id)
}
