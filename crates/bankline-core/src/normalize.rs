//! Provider record normalization
//!
//! Pure mapping from `RawTransaction` to the ledger's `LocalTransaction`.
//! The local id is derived from the provider id alone, so normalizing the same
//! record twice always yields the same id; reconciliation relies on this.

use std::collections::HashMap;

use crate::models::{
    Category, LocalTransaction, ProviderAccount, RawTransaction, TransactionOrigin,
    TransactionStatus, DEFAULT_ACCOUNT_NAME, DEFAULT_DESCRIPTION, SYNCED_ID_PREFIX,
};

/// Looks up the local account label for a provider account id
pub trait AccountNameResolver {
    fn account_name(&self, provider_account_id: &str) -> Option<String>;
}

impl AccountNameResolver for HashMap<String, String> {
    fn account_name(&self, provider_account_id: &str) -> Option<String> {
        self.get(provider_account_id).cloned()
    }
}

/// Build a resolver from fetched provider accounts
pub fn account_names(accounts: &[ProviderAccount]) -> HashMap<String, String> {
    accounts
        .iter()
        .map(|a| (a.id.clone(), a.name.clone()))
        .collect()
}

/// Local id for a provider transaction id
pub fn local_id(provider_transaction_id: &str) -> String {
    format!("{}{}", SYNCED_ID_PREFIX, provider_transaction_id)
}

/// Map one provider record onto the canonical ledger shape
pub fn normalize<R>(raw: &RawTransaction, resolver: &R) -> LocalTransaction
where
    R: AccountNameResolver + ?Sized,
{
    let account = resolver
        .account_name(&raw.provider_account_id)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string());

    LocalTransaction {
        id: local_id(&raw.provider_transaction_id),
        date: raw.date,
        description: description_for(raw),
        amount: raw.amount,
        category: category_for_code(raw.category_code),
        account,
        status: TransactionStatus::Completed,
        origin: TransactionOrigin::Synced,
        provider_transaction_id: Some(raw.provider_transaction_id.clone()),
        provider_account_id: Some(raw.provider_account_id.clone()),
        provider_item_id: Some(raw.item_id.clone()),
    }
}

/// Normalize a batch, preserving order
pub fn normalize_all<R>(raws: &[RawTransaction], resolver: &R) -> Vec<LocalTransaction>
where
    R: AccountNameResolver + ?Sized,
{
    raws.iter().map(|raw| normalize(raw, resolver)).collect()
}

/// Clean description, then provider description, then bank wording, then the placeholder
fn description_for(raw: &RawTransaction) -> String {
    [
        &raw.clean_description,
        &raw.provider_description,
        &raw.bank_description,
    ]
    .into_iter()
    .filter_map(|d| d.as_deref())
    .map(str::trim)
    .find(|d| !d.is_empty())
    .unwrap_or(DEFAULT_DESCRIPTION)
    .to_string()
}

/// Fixed lookup from provider category id to app category
///
/// Covers the provider's parent categories and their common children.
/// Anything unlisted (or absent) is `Other`.
pub fn category_for_code(code: Option<i64>) -> Category {
    let Some(code) = code else {
        return Category::Other;
    };

    match code {
        // Food & groceries
        273 | 274 | 276 => Category::Groceries,
        // Restaurants, bars, fast food, coffee
        83 | 84 | 188 | 260 | 313 => Category::Dining,
        // Auto & transport
        87 | 88 | 196 | 197 | 198 | 247 | 251 | 264 | 309 => Category::Transport,
        // Rent, mortgage, home maintenance
        161 | 162 | 216 | 218 | 219 | 222 => Category::Housing,
        // Energy, water, internet, phone
        180 | 217 | 220 | 258 | 259 | 280 => Category::Utilities,
        // Pharmacy, doctor, health insurance
        163 | 236 | 245 | 261 | 262 => Category::Health,
        // Clothing, electronics, general shopping
        186 | 183 | 184 | 240 | 242 | 243 | 272 | 318 => Category::Shopping,
        // Entertainment, sport, travel, hobbies
        168 | 223 | 224 | 226 | 227 | 248 | 249 | 302 | 303 => Category::Leisure,
        // Salary, pensions, refunds and other income
        2 | 3 | 230 | 231 | 232 | 233 | 234 | 282 | 283 | 314 | 315 => Category::Income,
        // Internal transfers, savings, withdrawals
        9 | 85 | 271 | 326 => Category::Transfer,
        // Bank charges and interest
        79 | 191 | 192 | 293 | 294 => Category::Fees,
        _ => Category::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(id: &str) -> RawTransaction {
        RawTransaction {
            provider_transaction_id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            amount: -12.5,
            clean_description: None,
            provider_description: None,
            bank_description: None,
            category_code: None,
            provider_account_id: "acc-1".to_string(),
            item_id: "item-1".to_string(),
            currency_code: Some("EUR".to_string()),
        }
    }

    struct NoNames;

    impl AccountNameResolver for NoNames {
        fn account_name(&self, _provider_account_id: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = normalize(&raw("t1"), &NoNames);
        let b = normalize(&raw("t1"), &NoNames);
        assert_eq!(a.id, "bank_t1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_scenario_t1() {
        let tx = normalize(&raw("t1"), &NoNames);
        assert_eq!(tx.amount, -12.5);
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.origin, TransactionOrigin::Synced);
        assert_eq!(tx.provider_transaction_id.as_deref(), Some("t1"));
        assert_eq!(tx.provider_account_id.as_deref(), Some("acc-1"));
        assert_eq!(tx.provider_item_id.as_deref(), Some("item-1"));
    }

    #[test]
    fn test_description_precedence() {
        let mut r = raw("t2");
        assert_eq!(normalize(&r, &NoNames).description, "Transaction");

        r.bank_description = Some("PRLV SEPA EDF".into());
        assert_eq!(normalize(&r, &NoNames).description, "PRLV SEPA EDF");

        r.provider_description = Some("EDF prelevement".into());
        assert_eq!(normalize(&r, &NoNames).description, "EDF prelevement");

        r.clean_description = Some("EDF".into());
        assert_eq!(normalize(&r, &NoNames).description, "EDF");
    }

    #[test]
    fn test_blank_descriptions_are_skipped() {
        let mut r = raw("t3");
        r.clean_description = Some("   ".into());
        r.provider_description = Some("".into());
        r.bank_description = Some(" CB MONOPRIX ".into());
        assert_eq!(normalize(&r, &NoNames).description, "CB MONOPRIX");
    }

    #[test]
    fn test_sign_preserved() {
        let mut r = raw("t4");
        r.amount = 1500.0;
        r.category_code = Some(79); // a fee code must not flip the sign
        let tx = normalize(&r, &NoNames);
        assert_eq!(tx.amount, 1500.0);
        assert_eq!(tx.category, Category::Fees);
    }

    #[test]
    fn test_category_lookup() {
        assert_eq!(category_for_code(Some(273)), Category::Groceries);
        assert_eq!(category_for_code(Some(230)), Category::Income);
        assert_eq!(category_for_code(Some(999_999)), Category::Other);
        assert_eq!(category_for_code(None), Category::Other);
    }

    #[test]
    fn test_account_name_resolution() {
        let accounts = vec![ProviderAccount {
            id: "acc-1".into(),
            item_id: "item-1".into(),
            name: "Compte courant".into(),
        }];
        let names = account_names(&accounts);
        assert_eq!(normalize(&raw("t5"), &names).account, "Compte courant");

        let mut other = raw("t6");
        other.provider_account_id = "acc-unknown".into();
        assert_eq!(normalize(&other, &names).account, DEFAULT_ACCOUNT_NAME);
    }
}
