//! CLI `inspect` command: show a user's pastoral memory record.

use anyhow::Result;

use crate::config::RysenConfig;
use crate::memory::{store, THEME_CAPACITY};

pub fn inspect(config: &RysenConfig, user_id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let Some(record) = store::get_record(&conn, user_id)? else {
        println!("No pastoral memory for {user_id}");
        return Ok(());
    };

    println!("Pastoral memory: {}", record.user_id);
    println!("{}", "=".repeat(50));
    println!("  Updated:   {}", record.updated_at);
    println!("  Version:   {}", record.version);
    println!("  Themes:    {}/{THEME_CAPACITY}", record.themes.len());
    for (i, theme) in record.themes.iter().enumerate() {
        // Oldest first; the first entry is evicted next.
        println!("    {}. {theme}", i + 1);
    }
    Ok(())
}
