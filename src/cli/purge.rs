//! CLI `cache purge` command: delete expired rows from the shared cache table.

use anyhow::Result;
use chrono::Utc;

use crate::cache::sqlite::purge_expired;
use crate::config::RysenConfig;

pub fn purge(config: &RysenConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let removed = purge_expired(&conn, Utc::now())?;
    tracing::info!(removed, "expired cache entries purged");
    println!("Removed {removed} expired cache entries.");
    if config.cache.backend != "sqlite" {
        println!("Note: configured backend is '{}'; only the sqlite cache is persisted.", config.cache.backend);
    }
    Ok(())
}
