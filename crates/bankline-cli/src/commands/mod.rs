//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `bank` - Link, connections, sync and disconnect
//! - `core` - Init and shared utilities (open_db, open_sync)
//! - `serve` - Web server command
//! - `transactions` - Ledger commands (list, add)

pub mod bank;
pub mod core;
pub mod serve;
pub mod transactions;

// Re-export command functions for main.rs
pub use bank::*;
pub use core::*;
pub use serve::*;
pub use transactions::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Colored amount: red for expenses, green for income
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("\x1b[31m{:.2}\x1b[0m", amount)
    } else {
        format!("\x1b[32m+{:.2}\x1b[0m", amount)
    }
}
