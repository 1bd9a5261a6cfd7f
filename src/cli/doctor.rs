//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::RysenConfig;
use crate::db;

pub fn doctor(config: &RysenConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `rysen serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Rysen Health Report");
    println!("===================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Cache backend:     {}{}", config.cache.backend, if config.cache.enabled { "" } else { " (disabled)" });
    println!("LLM endpoint:      {}", config.llm.base_url);
    println!("API key:           {}", if config.llm.api_key.is_empty() { "(not set)" } else { "set" });
    println!();
    println!("Row counts:");
    println!("  Pastoral memory: {}", report.memory_count);
    println!("  Sessions:        {}", report.session_count);
    println!("  Messages:        {}", report.message_count);
    println!("  Cache entries:   {}", report.cache_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery: restore the database file from a backup, e.g.");
        println!("  cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
