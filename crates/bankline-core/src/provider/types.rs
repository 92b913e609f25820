//! Wire types for the Bridge v3 aggregation API

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::ProviderUser;

/// Paginated list envelope: `{"resources": [...], "pagination": {"next_uri": ...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> ListResponse<T> {
    pub fn next_uri(&self) -> Option<String> {
        self.pagination
            .as_ref()
            .and_then(|p| p.next_uri.clone())
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pagination {
    pub next_uri: Option<String>,
}

/// Error body: `{"type": ..., "message": ..., "errors": [{"code": ..., "message": ...}]}`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExternalUserRequest<'a> {
    pub external_user_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub uuid: String,
    #[serde(default)]
    pub external_user_id: Option<String>,
}

impl UserRecord {
    pub fn into_provider_user(self, fallback_external_id: &str) -> ProviderUser {
        ProviderUser {
            uuid: self.uuid,
            external_user_id: self
                .external_user_id
                .unwrap_or_else(|| fallback_external_id.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Body of a hosted session request
#[derive(Debug, Clone, Serialize)]
pub struct ConnectSessionRequest {
    pub user_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectSessionResponse {
    pub url: String,
}

/// A provider item (one authorized bank connection)
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    /// Display name for the bank behind this item
    pub fn display_name(&self) -> String {
        match (&self.bank_name, self.provider_id) {
            (Some(name), _) if !name.trim().is_empty() => name.trim().to_string(),
            (_, Some(provider)) => format!("Bank #{}", provider),
            _ => "Bank".to_string(),
        }
    }
}

/// A provider bank account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub item_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A provider transaction
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub clean_description: Option<String>,
    #[serde(default)]
    pub provider_description: Option<String>,
    #[serde(default)]
    pub bank_description: Option<String>,
    #[serde(deserialize_with = "amount_value")]
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// Ids come back as JSON numbers from some endpoints and strings from others
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Amounts are signed decimals, sent either as a number or a numeric string
fn amount_value<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("amount out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid amount: {}", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected numeric amount, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_record_numeric_ids_and_string_amount() {
        let json = r#"{
            "id": 38000012345,
            "clean_description": "Carrefour",
            "provider_description": "CB CARREFOUR 12/01",
            "amount": "-42.10",
            "date": "2025-01-12",
            "currency_code": "EUR",
            "category_id": 273,
            "account_id": 9001,
            "deleted": false
        }"#;
        let record: TransactionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "38000012345");
        assert_eq!(record.amount, -42.10);
        assert_eq!(record.account_id.as_deref(), Some("9001"));
        assert_eq!(record.category_id, Some(273));
        assert!(record.bank_description.is_none());
    }

    #[test]
    fn test_list_response_without_pagination() {
        let json = r#"{"resources": [{"id": 1, "item_id": 7, "name": "Checking"}]}"#;
        let list: ListResponse<AccountRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(list.resources.len(), 1);
        assert_eq!(list.resources[0].item_id, "7");
        assert!(list.next_uri().is_none());
    }

    #[test]
    fn test_item_display_name() {
        let named: ItemRecord =
            serde_json::from_str(r#"{"id": 1, "bank_name": "Boursorama"}"#).unwrap();
        assert_eq!(named.display_name(), "Boursorama");

        let by_provider: ItemRecord =
            serde_json::from_str(r#"{"id": 2, "provider_id": 574}"#).unwrap();
        assert_eq!(by_provider.display_name(), "Bank #574");
    }
}
