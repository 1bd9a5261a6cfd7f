//! CLI `reset` command: clear one user's pastoral memory ("fresh start").

use anyhow::Result;
use chrono::Utc;

use crate::config::RysenConfig;
use crate::memory::store;

pub fn reset(config: &RysenConfig, user_id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let previous = store::get_record(&conn, user_id)?;
    store::reset_themes(&conn, user_id, Utc::now())?;

    match previous {
        Some(record) if !record.themes.is_empty() => {
            let labels: Vec<&str> = record.themes.iter().map(|t| t.as_str()).collect();
            println!("Cleared themes for {user_id}: {}", labels.join(", "));
        }
        _ => println!("No themes stored for {user_id}; record is now empty."),
    }
    Ok(())
}
