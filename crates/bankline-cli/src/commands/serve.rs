//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    allowed_origins: Vec<String>,
) -> Result<()> {
    println!("🚀 Starting Bankline web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Parse API keys from environment (comma-separated)
    let api_keys =
        bankline_server::parse_api_keys(&std::env::var("BANKLINE_API_KEYS").unwrap_or_default());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   ⚠️  No API keys configured: set BANKLINE_API_KEYS or use --no-auth locally");
    } else {
        println!(
            "   🔑 API keys: {} configured (BANKLINE_API_KEYS)",
            api_keys.len()
        );
    }
    if !allowed_origins.is_empty() {
        println!("   🌐 CORS origins: {}", allowed_origins.join(", "));
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let config = bankline_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
    };

    bankline_server::serve_with_config(db, host, port, config).await?;

    Ok(())
}
