//! Credential gateway
//!
//! Obtains a fresh access credential for a local user. The provider knows
//! nothing about a user until first use, so a "not found" answer triggers
//! provisioning followed by exactly one retry. Provider-side user creation is
//! not idempotent: an "already exists" answer is resolved by listing users and
//! matching on the external id.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{AccessCredential, ProviderUser};
use crate::provider::AggregationApi;

/// Upper bound on user-listing pages scanned while resolving a conflict
const MAX_USER_PAGES: usize = 100;

pub struct CredentialGateway<'a, A: AggregationApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: AggregationApi + ?Sized> CredentialGateway<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Request a fresh credential, provisioning the provider user if needed
    ///
    /// Never cached: every sync cycle calls this again.
    pub async fn access_credential(&self, local_user_id: &str) -> Result<AccessCredential> {
        validate_user_id(local_user_id)?;

        match self.api.issue_token(local_user_id).await {
            Ok(credential) => Ok(credential),
            Err(Error::NotFound { .. }) => {
                info!(user = %local_user_id, "Provider user missing, provisioning");
                self.ensure_provider_user(local_user_id).await?;
                // Single retry; a second "not found" is surfaced as-is
                self.api
                    .issue_token(local_user_id)
                    .await
                    .map_err(Error::into_upstream)
            }
            Err(e) => Err(e.into_upstream()),
        }
    }

    /// Make sure a provider user exists for `local_user_id` and return it
    ///
    /// Needs no credential. Safe to call for users that already exist.
    pub async fn ensure_provider_user(&self, local_user_id: &str) -> Result<ProviderUser> {
        validate_user_id(local_user_id)?;

        match self.api.create_user(local_user_id).await {
            Ok(user) => {
                debug!(user = %local_user_id, uuid = %user.uuid, "Created provider user");
                Ok(user)
            }
            Err(Error::Conflict { status, body }) => {
                debug!(user = %local_user_id, "Provider user already exists, resolving");
                match self.find_provider_user(local_user_id).await? {
                    Some(user) => Ok(user),
                    None => {
                        warn!(
                            user = %local_user_id,
                            "Provider reported an existing user but none matched"
                        );
                        Err(Error::Upstream { status, body })
                    }
                }
            }
            Err(e) => Err(e.into_upstream()),
        }
    }

    /// Scan the provider's user list for a matching external id
    async fn find_provider_user(&self, local_user_id: &str) -> Result<Option<ProviderUser>> {
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_USER_PAGES {
            let page = self
                .api
                .list_users(cursor.as_deref())
                .await
                .map_err(Error::into_upstream)?;

            if let Some(user) = page
                .resources
                .into_iter()
                .find(|u| u.external_user_id == local_user_id)
            {
                return Ok(Some(user));
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(None),
            }
        }

        warn!(user = %local_user_id, "Gave up scanning provider users");
        Ok(None)
    }
}

pub(crate) fn validate_user_id(local_user_id: &str) -> Result<()> {
    if local_user_id.trim().is_empty() {
        return Err(Error::InvalidData("user id must not be empty".into()));
    }
    Ok(())
}
