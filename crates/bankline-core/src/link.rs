//! Link session management
//!
//! Creating a session returns the provider-hosted URL right away; the user
//! finishes authorization out of band. Completion is detected either from the
//! callback query string or by diffing connection lists before and after.

use std::collections::HashSet;

use reqwest::Url;
use serde::Serialize;
use tracing::info;

use crate::config::ProviderConfig;
use crate::credentials::CredentialGateway;
use crate::error::{Error, Result};
use crate::models::{BankConnection, LinkSession};
use crate::provider::{AggregationApi, ConnectSessionRequest};

pub struct LinkSessionManager<'a, A: AggregationApi + ?Sized> {
    api: &'a A,
    config: &'a ProviderConfig,
}

impl<'a, A: AggregationApi + ?Sized> LinkSessionManager<'a, A> {
    pub fn new(api: &'a A, config: &'a ProviderConfig) -> Self {
        Self { api, config }
    }

    /// Create a hosted authorization session for `local_user_id`
    pub async fn create_link_session(&self, local_user_id: &str) -> Result<LinkSession> {
        let gateway = CredentialGateway::new(self.api);
        gateway.ensure_provider_user(local_user_id).await?;
        let credential = gateway.access_credential(local_user_id).await?;

        let request = ConnectSessionRequest {
            user_email: contact_email(local_user_id, &self.config.user_email_domain),
            callback_url: self.config.callback_url.clone(),
        };
        let session_url = self
            .api
            .create_connect_session(&credential, &request)
            .await
            .map_err(Error::into_upstream)?;

        info!(user = %local_user_id, "Created link session");
        Ok(LinkSession {
            session_url,
            user_id: local_user_id.to_string(),
        })
    }
}

/// Synthetic contact address the provider requires with each session
pub fn contact_email(local_user_id: &str, domain: &str) -> String {
    format!("user-{}@{}", local_user_id, domain)
}

/// Query parameters the provider appends when sending the user back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkCallback {
    pub item_id: Option<String>,
    pub success: Option<bool>,
    pub step: Option<String>,
    pub source: Option<String>,
}

impl LinkCallback {
    /// Parse a raw query string (with or without the leading `?`)
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut callback = Self::default();

        let Ok(url) = Url::parse(&format!("http://callback.invalid/?{}", query)) else {
            return callback;
        };

        for (key, value) in url.query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "item_id" => callback.item_id = Some(value.to_string()),
                "success" => callback.success = value.parse().ok(),
                "step" => callback.step = Some(value.to_string()),
                "source" => callback.source = Some(value.to_string()),
                _ => {}
            }
        }
        callback
    }

    /// True when the provider reported a completed authorization for an item
    pub fn is_success(&self) -> bool {
        self.item_id.is_some() && self.success != Some(false)
    }
}

/// Connections present in `after` but not in `before`
pub fn new_connections(before: &[BankConnection], after: &[BankConnection]) -> Vec<BankConnection> {
    let known: HashSet<&str> = before.iter().map(|c| c.item_id.as_str()).collect();
    after
        .iter()
        .filter(|c| !known.contains(c.item_id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn connection(item_id: &str) -> BankConnection {
        BankConnection {
            item_id: item_id.into(),
            bank_name: "Bank".into(),
            connected_at: Utc::now(),
            last_sync_at: None,
        }
    }

    #[test]
    fn test_callback_success() {
        let cb = LinkCallback::from_query("?item_id=8412345&success=true&step=sync_success&source=connect");
        assert_eq!(cb.item_id.as_deref(), Some("8412345"));
        assert_eq!(cb.success, Some(true));
        assert_eq!(cb.step.as_deref(), Some("sync_success"));
        assert!(cb.is_success());
    }

    #[test]
    fn test_callback_failure_and_garbage() {
        let cb = LinkCallback::from_query("item_id=1&success=false");
        assert!(!cb.is_success());

        let cb = LinkCallback::from_query("success=true");
        assert!(!cb.is_success());

        let cb = LinkCallback::from_query("success=maybe&item_id=&unknown=x");
        assert_eq!(cb, LinkCallback::default());
    }

    #[test]
    fn test_callback_decodes_values() {
        let cb = LinkCallback::from_query("step=user%20cancelled&item_id=42");
        assert_eq!(cb.step.as_deref(), Some("user cancelled"));
        assert!(cb.is_success());
    }

    #[test]
    fn test_new_connections_diff() {
        let before = vec![connection("1"), connection("2")];
        let after = vec![connection("2"), connection("3"), connection("1")];
        let fresh = new_connections(&before, &after);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].item_id, "3");

        assert!(new_connections(&after, &before).is_empty());
    }

    #[test]
    fn test_contact_email() {
        assert_eq!(contact_email("42", "bankline.app"), "user-42@bankline.app");
    }
}
