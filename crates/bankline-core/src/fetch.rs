//! Transaction fetcher
//!
//! Walks one connection's accounts and pulls their transactions page by page.
//! One failing account never aborts its siblings: the failure is logged and
//! collected as a `PartialFetchError`.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{Error, PartialFetchError, Result};
use crate::models::{
    AccessCredential, BankConnection, ProviderAccount, RawTransaction, DEFAULT_ACCOUNT_NAME,
};
use crate::provider::{AggregationApi, TransactionRecord};

/// Safety net against a provider that keeps handing out cursors
const MAX_PAGES: usize = 1000;

/// Everything fetched for one connection
#[derive(Debug, Clone, Default)]
pub struct FetchedTransactions {
    /// Accounts belonging to the connection
    pub accounts: Vec<ProviderAccount>,
    pub transactions: Vec<RawTransaction>,
    /// Accounts whose transactions could not be fetched
    pub failures: Vec<PartialFetchError>,
}

/// Split the global account list by the connection each account belongs to
pub fn group_by_connection(
    accounts: Vec<ProviderAccount>,
) -> HashMap<String, Vec<ProviderAccount>> {
    let mut grouped: HashMap<String, Vec<ProviderAccount>> = HashMap::new();
    for account in accounts {
        grouped.entry(account.item_id.clone()).or_default().push(account);
    }
    grouped
}

pub struct TransactionFetcher<'a, A: AggregationApi + ?Sized> {
    api: &'a A,
    page_size: u32,
    max_per_account: usize,
    max_pages: usize,
}

impl<'a, A: AggregationApi + ?Sized> TransactionFetcher<'a, A> {
    pub fn new(api: &'a A, config: &ProviderConfig) -> Self {
        Self {
            api,
            page_size: config.page_size.max(1),
            max_per_account: config.max_transactions_per_account,
            max_pages: MAX_PAGES,
        }
    }

    /// Cap how many pages any single listing may walk
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// List every connection (provider item) visible to the credential
    pub async fn list_connections(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<BankConnection>> {
        let mut connections = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = self
                .api
                .list_items(credential, cursor.as_deref())
                .await
                .map_err(Error::into_upstream)?;

            connections.extend(page.resources.into_iter().map(|item| BankConnection {
                bank_name: item.display_name(),
                connected_at: item.created_at.unwrap_or_else(Utc::now),
                item_id: item.id,
                last_sync_at: None,
            }));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    debug!(count = connections.len(), "Listed provider connections");
                    return Ok(connections);
                }
            }
        }

        warn!(
            max_pages = self.max_pages,
            count = connections.len(),
            "Stopped listing connections at the page limit, list is incomplete"
        );
        Ok(connections)
    }

    /// Every account visible to the credential, across all connections
    pub async fn list_accounts(
        &self,
        credential: &AccessCredential,
    ) -> Result<Vec<ProviderAccount>> {
        let mut accounts = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = self
                .api
                .list_accounts(credential, cursor.as_deref())
                .await
                .map_err(Error::into_upstream)?;

            accounts.extend(page.resources.into_iter().map(|a| ProviderAccount {
                name: a
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string()),
                id: a.id,
                item_id: a.item_id,
            }));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(accounts),
            }
        }

        warn!(
            max_pages = self.max_pages,
            count = accounts.len(),
            "Stopped listing accounts at the page limit, list is incomplete"
        );
        Ok(accounts)
    }

    /// Fetch all transactions of every account behind `connection_id`
    ///
    /// Fails only if the account list itself cannot be fetched. Callers syncing
    /// several connections should list accounts once and use `fetch_connection`.
    pub async fn fetch_all_transactions(
        &self,
        credential: &AccessCredential,
        connection_id: &str,
    ) -> Result<FetchedTransactions> {
        let accounts = self
            .list_accounts(credential)
            .await?
            .into_iter()
            .filter(|a| a.item_id == connection_id)
            .collect();
        Ok(self.fetch_connection(credential, connection_id, accounts).await)
    }

    /// Fetch the transactions of an already listed set of accounts
    pub async fn fetch_connection(
        &self,
        credential: &AccessCredential,
        connection_id: &str,
        accounts: Vec<ProviderAccount>,
    ) -> FetchedTransactions {
        debug!(
            connection = %connection_id,
            accounts = accounts.len(),
            "Fetching transactions"
        );

        let mut transactions = Vec::new();
        let mut failures = Vec::new();

        for account in &accounts {
            match self.fetch_account(credential, account).await {
                Ok(mut fetched) => transactions.append(&mut fetched),
                Err(e) => {
                    warn!(
                        connection = %connection_id,
                        account = %account.id,
                        error = %e,
                        "Skipping account after fetch failure"
                    );
                    failures.push(PartialFetchError {
                        item_id: connection_id.to_string(),
                        account_id: account.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        FetchedTransactions {
            accounts,
            transactions,
            failures,
        }
    }

    /// Page through one account until the provider runs out or the cap is hit
    async fn fetch_account(
        &self,
        credential: &AccessCredential,
        account: &ProviderAccount,
    ) -> Result<Vec<RawTransaction>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let remaining = self.max_per_account.saturating_sub(out.len());
            if remaining == 0 {
                debug!(account = %account.id, cap = self.max_per_account, "Per-account cap reached");
                return Ok(out);
            }
            let limit = self.page_size.min(u32::try_from(remaining).unwrap_or(u32::MAX));

            let page = self
                .api
                .list_transactions(credential, &account.id, limit, cursor.as_deref())
                .await?;

            out.extend(
                page.resources
                    .into_iter()
                    .filter(|t| !t.deleted)
                    .map(|t| to_raw(t, account)),
            );

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    out.truncate(self.max_per_account);
                    return Ok(out);
                }
            }
        }

        warn!(
            account = %account.id,
            max_pages = self.max_pages,
            "Stopped fetching transactions at the page limit, history is incomplete"
        );
        out.truncate(self.max_per_account);
        Ok(out)
    }
}

fn to_raw(record: TransactionRecord, account: &ProviderAccount) -> RawTransaction {
    RawTransaction {
        provider_transaction_id: record.id,
        date: record.date,
        amount: record.amount,
        clean_description: record.clean_description,
        provider_description: record.provider_description,
        bank_description: record.bank_description,
        category_code: record.category_id,
        provider_account_id: record.account_id.unwrap_or_else(|| account.id.clone()),
        item_id: account.item_id.clone(),
        currency_code: record.currency_code,
    }
}
