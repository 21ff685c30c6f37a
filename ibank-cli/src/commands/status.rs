//! Status command - show where each account's next sync starts

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let checkpoints = ctx.store.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }

    println!("{}", "Sync Status".bold());
    println!();

    if checkpoints.is_empty() {
        output::info("No account has been synced yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Account", "Bank", "Next sync from", "Updated"]);
    for checkpoint in &checkpoints {
        table.add_row(vec![
            checkpoint.account.to_string(),
            checkpoint.account.bank_kind.to_string(),
            checkpoint.last_synced_through.to_string(),
            checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{}", table);
    println!();
    println!("Database: {}", ctx.store.db_path().display().to_string().dimmed());

    Ok(())
}
