//! Bridge aggregation API client
//!
//! HTTP client for the Bridge v3 aggregation endpoints. Every call carries the
//! client id, client secret and `Bridge-Version` headers; user-scoped calls add
//! a bearer token.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::models::{AccessCredential, ProviderUser};

use super::types::{
    AccountRecord, ConnectSessionRequest, ConnectSessionResponse, ErrorBody, ExternalUserRequest,
    ItemRecord, ListResponse, TokenResponse, TransactionRecord, UserRecord,
};
use super::{AggregationApi, Page};

const USERS_PATH: &str = "/v3/aggregation/users";
const TOKEN_PATH: &str = "/v3/aggregation/authorization/token";
const CONNECT_SESSIONS_PATH: &str = "/v3/aggregation/connect-sessions";
const ITEMS_PATH: &str = "/v3/aggregation/items";
const ACCOUNTS_PATH: &str = "/v3/aggregation/accounts";
const TRANSACTIONS_PATH: &str = "/v3/aggregation/transactions";

/// Bridge v3 client
#[derive(Clone)]
pub struct BridgeClient {
    http_client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    version: String,
}

impl BridgeClient {
    /// Create a client from a validated config
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            version: config.version.clone(),
        })
    }

    /// Resolve a path or a `next_uri` cursor into a full URL
    fn url(&self, path_or_uri: &str) -> String {
        if path_or_uri.starts_with("http://") || path_or_uri.starts_with("https://") {
            path_or_uri.to_string()
        } else {
            format!("{}{}", self.base_url, path_or_uri)
        }
    }

    fn request(&self, method: Method, path_or_uri: &str) -> RequestBuilder {
        self.http_client
            .request(method, self.url(path_or_uri))
            .header("Bridge-Version", &self.version)
            .header("Client-Id", &self.client_id)
            .header("Client-Secret", &self.client_secret)
    }

    fn authorized(
        &self,
        method: Method,
        path_or_uri: &str,
        credential: &AccessCredential,
    ) -> RequestBuilder {
        self.request(method, path_or_uri)
            .bearer_auth(&credential.token)
    }

    async fn list<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Page<T>> {
        let response = check(builder.send().await?).await?;
        let list: ListResponse<T> = response.json().await?;
        let next_cursor = list.next_uri();
        Ok(Page {
            resources: list.resources,
            next_cursor,
        })
    }
}

/// Pass 2xx responses through, classify everything else
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "Provider error response");
    Err(classify_error(status.as_u16(), body))
}

/// Map a non-2xx response onto the error taxonomy
///
/// The structured `errors[].code` wins over the status code when present.
pub(crate) fn classify_error(status: u16, body: String) -> Error {
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let codes: Vec<String> = parsed
        .errors
        .iter()
        .filter_map(|e| e.code.as_deref())
        .chain(parsed.kind.as_deref())
        .map(|c| c.to_lowercase())
        .collect();
    let has_code = |needle: &str| codes.iter().any(|c| c.contains(needle));

    if has_code("already_exists") || has_code("conflict") || (codes.is_empty() && status == 409)
    {
        Error::Conflict { status, body }
    } else if has_code("not_found") || (codes.is_empty() && status == 404) {
        Error::NotFound { status, body }
    } else {
        Error::Upstream { status, body }
    }
}

#[async_trait]
impl AggregationApi for BridgeClient {
    async fn create_user(&self, external_user_id: &str) -> Result<ProviderUser> {
        let response = self
            .request(Method::POST, USERS_PATH)
            .json(&ExternalUserRequest { external_user_id })
            .send()
            .await?;
        let record: UserRecord = check(response).await?.json().await?;
        Ok(record.into_provider_user(external_user_id))
    }

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<ProviderUser>> {
        let builder = self.request(Method::GET, cursor.unwrap_or(USERS_PATH));
        let page: Page<UserRecord> = self.list(builder).await?;
        Ok(Page {
            resources: page
                .resources
                .into_iter()
                .filter(|u| u.external_user_id.is_some())
                .map(|u| u.into_provider_user(""))
                .collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn issue_token(&self, external_user_id: &str) -> Result<AccessCredential> {
        let response = self
            .request(Method::POST, TOKEN_PATH)
            .json(&ExternalUserRequest { external_user_id })
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        Ok(AccessCredential {
            token: token.access_token,
            issued_for_user_id: external_user_id.to_string(),
            expires_at: token.expires_at,
        })
    }

    async fn create_connect_session(
        &self,
        credential: &AccessCredential,
        request: &ConnectSessionRequest,
    ) -> Result<String> {
        let response = self
            .authorized(Method::POST, CONNECT_SESSIONS_PATH, credential)
            .json(request)
            .send()
            .await?;
        let session: ConnectSessionResponse = check(response).await?.json().await?;
        Ok(session.url)
    }

    async fn list_items(
        &self,
        credential: &AccessCredential,
        cursor: Option<&str>,
    ) -> Result<Page<ItemRecord>> {
        self.list(self.authorized(Method::GET, cursor.unwrap_or(ITEMS_PATH), credential))
            .await
    }

    async fn list_accounts(
        &self,
        credential: &AccessCredential,
        cursor: Option<&str>,
    ) -> Result<Page<AccountRecord>> {
        self.list(self.authorized(Method::GET, cursor.unwrap_or(ACCOUNTS_PATH), credential))
            .await
    }

    async fn list_transactions(
        &self,
        credential: &AccessCredential,
        account_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<TransactionRecord>> {
        let builder = match cursor {
            Some(next_uri) => self.authorized(Method::GET, next_uri, credential),
            None => self
                .authorized(Method::GET, TRANSACTIONS_PATH, credential)
                .query(&[("account_id", account_id), ("limit", &limit.to_string())]),
        };
        self.list(builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_code() {
        let body = r#"{"type":"not_found","message":"User not found","errors":[{"code":"users.not_found","message":"x"}]}"#;
        assert!(matches!(
            classify_error(404, body.to_string()),
            Error::NotFound { status: 404, .. }
        ));

        let body = r#"{"errors":[{"code":"users.creation.already_exists"}]}"#;
        assert!(matches!(
            classify_error(400, body.to_string()),
            Error::Conflict { status: 400, .. }
        ));
    }

    #[test]
    fn test_classify_by_status_when_body_is_opaque() {
        assert!(matches!(
            classify_error(404, "Not Found".into()),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            classify_error(409, String::new()),
            Error::Conflict { .. }
        ));
    }

    #[test]
    fn test_structured_code_overrides_status() {
        // A 404 whose code says something else is not a "user missing" signal
        let body = r#"{"errors":[{"code":"route.unknown"}]}"#;
        match classify_error(404, body.to_string()) {
            Error::Upstream { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("route.unknown"));
            }
            other => panic!("expected upstream, got {:?}", other),
        }
    }

    #[test]
    fn test_other_failures_are_upstream() {
        assert!(matches!(
            classify_error(401, r#"{"errors":[{"code":"invalid_client"}]}"#.into()),
            Error::Upstream { status: 401, .. }
        ));
        assert!(matches!(
            classify_error(500, "boom".into()),
            Error::Upstream { status: 500, .. }
        ));
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = ProviderConfig::new("http://localhost:1", "", "");
        assert!(matches!(
            BridgeClient::new(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_url_resolution() {
        let client =
            BridgeClient::new(&ProviderConfig::new("http://localhost:1/", "id", "secret")).unwrap();
        assert_eq!(
            client.url("/v3/aggregation/items"),
            "http://localhost:1/v3/aggregation/items"
        );
        assert_eq!(
            client.url("https://other/v3/aggregation/items?after=x"),
            "https://other/v3/aggregation/items?after=x"
        );
    }
}
